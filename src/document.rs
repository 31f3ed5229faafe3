//! Input document in the cluster heatmap JSON format.
//!
//! The node maps are kept as ordered entry lists: the order in the file is the
//! insertion order that [`ClusterTree::leaves`](crate::tree::ClusterTree::leaves)
//! reports.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::marker::PhantomData;
use std::path::Path;

use log::info;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::error::Result;
use crate::value::Value;

/// A node as written in the document, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawNode {
    pub count: usize,
    #[serde(default)]
    pub distance: f64,
    #[serde(default, deserialize_with = "optional_ident")]
    pub parent: Option<String>,
    #[serde(default, deserialize_with = "optional_ident")]
    pub left_child: Option<String>,
    #[serde(default, deserialize_with = "optional_ident")]
    pub right_child: Option<String>,
    #[serde(default, deserialize_with = "ident_list")]
    pub objects: Vec<String>,
    #[serde(default)]
    pub features: Vec<Value>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TreeSection {
    #[serde(deserialize_with = "ordered_entries")]
    pub nodes: Vec<(String, RawNode)>,
    #[serde(default)]
    pub feature_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataSection {
    #[serde(deserialize_with = "ordered_entries")]
    pub nodes: Vec<(String, Vec<Value>)>,
    #[serde(default)]
    pub feature_names: Vec<String>,
}

/// Extra rows drawn above the heatmap, one value per data column.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColumnMetadataSection {
    pub features: Vec<Vec<Value>>,
    #[serde(default)]
    pub feature_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputDocument {
    pub data: TreeSection,
    #[serde(default)]
    pub metadata: Option<MetadataSection>,
    #[serde(default)]
    pub column_dendrogram: Option<TreeSection>,
    #[serde(default)]
    pub column_metadata: Option<ColumnMetadataSection>,
    #[serde(default, deserialize_with = "optional_ordered_entries")]
    pub alternative_data: Option<Vec<(String, Vec<Value>)>>,
}

impl InputDocument {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        info!("Loading cluster heatmap from {:?}...", path);
        let file = File::open(path)?;
        let doc = Self::from_reader(BufReader::new(file))?;
        info!(
            "Found {} row nodes{}",
            doc.data.nodes.len(),
            if doc.column_dendrogram.is_some() { " and a column dendrogram" } else { "" }
        );
        Ok(doc)
    }
}

/// Node ids are strings in object keys but often plain integers in references.
#[derive(Deserialize)]
#[serde(untagged)]
enum Ident {
    Text(String),
    Int(i64),
    Float(f64),
}

impl From<Ident> for String {
    fn from(ident: Ident) -> Self {
        match ident {
            Ident::Text(s) => s,
            Ident::Int(i) => i.to_string(),
            Ident::Float(f) => f.to_string(),
        }
    }
}

fn optional_ident<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Ident>::deserialize(deserializer)?.map(String::from))
}

fn ident_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let idents = Vec::<Ident>::deserialize(deserializer)?;
    Ok(idents.into_iter().map(String::from).collect())
}

struct OrderedEntries<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedEntries<T> {
    type Value = Vec<(String, T)>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map keyed by node id")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, T>()? {
            entries.push((key, value));
        }
        Ok(entries)
    }
}

fn ordered_entries<'de, D, T>(deserializer: D) -> std::result::Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    deserializer.deserialize_map(OrderedEntries(PhantomData))
}

fn optional_ordered_entries<'de, D, T>(
    deserializer: D,
) -> std::result::Result<Option<Vec<(String, T)>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct Wrapper<T>(Vec<(String, T)>);

    impl<'de, T: Deserialize<'de>> Deserialize<'de> for Wrapper<T> {
        fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
            ordered_entries(d).map(Wrapper)
        }
    }

    Ok(Option::<Wrapper<T>>::deserialize(deserializer)?.map(|w| w.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "data": {
            "nodes": {
                "z": {"count": 1, "distance": 0, "objects": ["obj-z"], "features": [1, 2], "parent": 7},
                "a": {"count": 1, "distance": 0, "objects": [42], "features": [3, null], "parent": 7},
                "7": {"count": 2, "distance": 1.5, "left_child": "z", "right_child": "a"}
            },
            "feature_names": ["f1", "f2"]
        },
        "metadata": {"nodes": {"z": ["x"], "a": ["y"]}, "feature_names": ["class"]},
        "alternative_data": {"z": ["one", "two"], "a": ["three", "four"]}
    }"#;

    #[test]
    fn keeps_file_order_and_stringifies_ids() {
        let doc = InputDocument::from_json(DOC).unwrap();
        let ids: Vec<&str> = doc.data.nodes.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "7"]);
        assert_eq!(doc.data.nodes[0].1.parent.as_deref(), Some("7"));
        assert_eq!(doc.data.nodes[1].1.objects, vec!["42".to_string()]);
        assert_eq!(doc.data.nodes[2].1.distance, 1.5);
        assert_eq!(doc.data.feature_names, vec!["f1", "f2"]);
    }

    #[test]
    fn optional_sections() {
        let doc = InputDocument::from_json(DOC).unwrap();
        let metadata = doc.metadata.unwrap();
        assert_eq!(metadata.nodes[1].0, "a");
        assert_eq!(metadata.feature_names, vec!["class"]);
        let alternative = doc.alternative_data.unwrap();
        assert_eq!(alternative[0].1[1], Value::Text("two".into()));
        assert!(doc.column_dendrogram.is_none());
        assert!(doc.column_metadata.is_none());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = InputDocument::from_json("{\"data\": 3}").unwrap_err();
        assert!(err.to_string().starts_with("failed to parse input document"));
    }
}
