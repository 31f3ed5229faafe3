use std::fs;
use std::io::Write;

use heatlook::render;
use heatlook::settings::SettingsPatch;
use heatlook::{
    Axis, ClusterHeatmap, ColumnRef, EventLog, HeatmapError, HeatmapEvent, InputDocument, Settings,
};
use image::GenericImageView;
use tempfile::{tempdir, NamedTempFile};

// Four samples over three genes, clustered both ways, with a tissue label per
// sample and a pathway label per gene.
const DOCUMENT: &str = r#"{
    "data": {
        "nodes": {
            "s1": {"count": 1, "objects": ["sample-1"], "features": [0.1, 4.0, 8.0], "parent": "g1"},
            "s2": {"count": 1, "objects": ["sample-2"], "features": [0.3, 5.0, 7.5], "parent": "g1"},
            "s3": {"count": 1, "objects": ["sample-3", "sample-3b"], "features": [2.0, 1.0, null], "parent": "g2"},
            "s4": {"count": 1, "objects": ["sample-4"], "features": [2.5, 0.5, 1.0], "parent": "g2"},
            "g1": {"count": 2, "distance": 0.4, "left_child": "s1", "right_child": "s2", "parent": "top"},
            "g2": {"count": 2, "distance": 0.9, "left_child": "s3", "right_child": "s4", "parent": "top"},
            "top": {"count": 4, "distance": 3.0, "left_child": "g1", "right_child": "g2"}
        },
        "feature_names": ["BRCA1", "TP53", "EGFR"]
    },
    "metadata": {
        "nodes": {"s1": ["liver"], "s2": ["liver"], "s3": ["lung"], "s4": ["lung"]},
        "feature_names": ["tissue"]
    },
    "column_dendrogram": {
        "nodes": {
            "c0": {"count": 1, "parent": "cA"},
            "c1": {"count": 1, "parent": "cA"},
            "c2": {"count": 1, "parent": "cRoot"},
            "cA": {"count": 2, "distance": 0.2, "left_child": "c0", "right_child": "c1", "parent": "cRoot"},
            "cRoot": {"count": 3, "distance": 0.8, "left_child": "cA", "right_child": "c2"}
        }
    },
    "column_metadata": {"features": [["repair", "repair", "growth"]], "feature_names": ["pathway"]}
}"#;

fn document_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(DOCUMENT.as_bytes()).unwrap();
    file
}

fn load() -> ClusterHeatmap<EventLog> {
    let file = document_file();
    let doc = InputDocument::from_path(file.path()).unwrap();
    ClusterHeatmap::new(doc, Settings::default(), EventLog::default()).unwrap()
}

fn row_ids(heatmap: &ClusterHeatmap<EventLog>) -> Vec<String> {
    heatmap.rows().iter().map(|slot| heatmap.row_tree().node(slot.leaf).id.clone()).collect()
}

#[test]
fn loads_from_disk_and_lays_out_both_axes() {
    let heatmap = load();
    assert_eq!(row_ids(&heatmap), vec!["s1", "s2", "s3", "s4"]);

    let ppl = heatmap.pixels_per_leaf();
    let ys: Vec<f64> = heatmap.rows().iter().map(|slot| slot.y).collect();
    for pair in ys.windows(2) {
        assert_eq!(pair[1] - pair[0], ppl);
    }

    let columns = heatmap.column_layout().unwrap();
    assert_eq!(columns.leaf_count(), 3);
    assert_eq!(heatmap.column_metadata_rows(), 1);
    assert_eq!(heatmap.row_layout().unwrap().distance_represented(), 3.0);
}

#[test]
fn zoom_highlight_and_click_session() {
    let mut heatmap = load();

    assert!(heatmap.zoom_into(Axis::Row, "g2").unwrap());
    assert_eq!(row_ids(&heatmap), vec!["s3", "s4"]);
    heatmap.highlight(Axis::Row, "g2").unwrap();
    heatmap.row_click("s3").unwrap();
    let click = heatmap.cell_click("s4", 0).unwrap();
    assert_eq!(click.header, "BRCA1");
    assert!(heatmap.unzoom(Axis::Row).unwrap());
    assert_eq!(row_ids(&heatmap).len(), 4);

    let events = heatmap.events_mut().take();
    let objects_34 = vec!["sample-3".to_string(), "sample-3b".into(), "sample-4".into()];
    assert_eq!(
        events,
        vec![
            HeatmapEvent::Zoom { object_ids: objects_34.clone(), node_id: "g2".into() },
            HeatmapEvent::ClusterHighlight { object_ids: objects_34, node_id: "g2".into() },
            HeatmapEvent::RowClick { object_ids: vec!["sample-3".into(), "sample-3b".into()] },
            HeatmapEvent::CellClick(click),
            HeatmapEvent::Unzoom { node_id: "g2".into() },
        ]
    );
    assert_eq!(heatmap.highlighted(Axis::Row), heatmap.row_tree().index_of("g2"));
}

#[test]
fn column_zoom_narrows_the_heatmap() {
    let mut heatmap = load();
    let full_width = heatmap.sizes().heatmap_width;

    heatmap.zoom_into(Axis::Column, "cA").unwrap();
    let data: Vec<ColumnRef> = heatmap
        .visible_columns()
        .iter()
        .copied()
        .filter(|c| matches!(c, ColumnRef::Data(_)))
        .collect();
    assert_eq!(data, vec![ColumnRef::Data(1), ColumnRef::Data(2)]);
    assert!(heatmap.sizes().heatmap_width < full_width);

    let events = heatmap.events_mut().take();
    assert_eq!(events, vec![HeatmapEvent::ColumnsZoom { columns: vec![1, 2], node_id: "cA".into() }]);
}

#[test]
fn settings_file_then_update() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("settings.json");
    fs::write(&config, r#"{"colors": {"heatmap": "Blues"}, "count_column": true}"#).unwrap();

    let patch = SettingsPatch::from_path(&config).unwrap();
    let settings = Settings::default().merge(&patch).unwrap();
    let file = document_file();
    let doc = InputDocument::from_path(file.path()).unwrap();
    let mut heatmap = ClusterHeatmap::new(doc, settings, EventLog::default()).unwrap();

    assert_eq!(heatmap.settings().colors.heatmap, "Blues");
    assert_eq!(heatmap.visible_columns().last(), Some(&ColumnRef::Count));

    let s3 = heatmap.row_tree().index_of("s3").unwrap();
    let blues = *heatmap.color_scales().get("Blues").unwrap();
    assert_eq!(heatmap.cell_color(s3, ColumnRef::Data(2)).unwrap(), None);
    assert!(heatmap.cell_color(s3, ColumnRef::Data(0)).unwrap().is_some());
    assert_eq!(heatmap.cell_color(s3, ColumnRef::Count).unwrap(), Some(heatmap.color_scales().get("Reds").unwrap().end));

    let rejected: SettingsPatch = serde_json::from_str(r#"{"percentiles": {"max": 101}}"#).unwrap();
    assert!(matches!(heatmap.update_settings(&rejected), Err(HeatmapError::InvalidPercentile { .. })));
    assert_eq!(heatmap.settings().colors.heatmap, "Blues");
    assert_eq!(heatmap.color_scales().get("Blues").unwrap(), &blues);
}

#[test]
fn renders_png_svg_and_row_table() {
    let dir = tempdir().unwrap();
    let mut heatmap = load();
    heatmap.highlight(Axis::Column, "cA").unwrap();
    heatmap.highlight_rows(vec!["sample-4".into()]);

    let png = dir.path().join("map.png");
    render::save(&heatmap, &png).unwrap();
    let image = image::open(&png).unwrap();
    assert_eq!(image.width(), 1000);
    assert_eq!(image.height() as f64, heatmap.image_height().ceil());

    let svg = dir.path().join("map.svg");
    render::save(&heatmap, &svg).unwrap();
    let text = fs::read_to_string(&svg).unwrap();
    assert!(text.contains("BRCA1"));
    assert!(text.contains("pathway"));
    assert!(text.contains(r#"stroke="rgb(255,0,0)""#));

    let tsv = render::write_rows_tsv(&heatmap, &png).unwrap();
    let rows = fs::read_to_string(tsv).unwrap();
    assert_eq!(rows.lines().count(), 5);
    assert!(rows.contains("s3\tsample-3,sample-3b\t"));
}

#[test]
fn broken_tree_names_every_bad_node() {
    let file = document_file();
    let broken = fs::read_to_string(file.path())
        .unwrap()
        .replace(r#""count": 4, "distance": 3.0"#, r#""count": 5, "distance": 3.0"#)
        .replace(r#""right_child": "s4", "parent": "top""#, r#""right_child": "s9", "parent": "top""#);
    let doc = InputDocument::from_json(&broken).unwrap();

    let err = ClusterHeatmap::new(doc, Settings::default(), EventLog::default()).unwrap_err();
    let mut ids = err.violating_ids();
    ids.sort_unstable();
    assert!(ids.contains(&"top"));
    assert!(ids.contains(&"g2"));
    assert!(matches!(err, HeatmapError::TreeIntegrity { axis: Axis::Row, .. }));
}
