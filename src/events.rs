//! Outbound notifications for whatever drives the view.

use log::info;

use crate::value::Value;

/// Payload of a heatmap cell click.
#[derive(Debug, Clone, PartialEq)]
pub struct CellClick {
    /// Displayed value (the alternative value when one is substituted).
    pub value: Value,
    /// Column header, empty when the input has no feature names.
    pub header: String,
    pub object_ids: Vec<String>,
}

/// Observer for view state changes. Every method defaults to doing nothing.
pub trait HeatmapEvents {
    fn on_cluster_highlight(&mut self, _object_ids: &[String], _node_id: &str) {}
    fn on_cluster_unhighlight(&mut self, _node_id: &str) {}
    fn on_column_cluster_highlight(&mut self, _columns: &[usize], _node_id: &str) {}
    fn on_column_cluster_unhighlight(&mut self, _node_id: &str) {}
    fn on_zoom(&mut self, _object_ids: &[String], _node_id: &str) {}
    fn on_unzoom(&mut self, _node_id: &str) {}
    fn on_columns_zoom(&mut self, _columns: &[usize], _node_id: &str) {}
    fn on_columns_unzoom(&mut self, _node_id: &str) {}
    fn on_row_click(&mut self, _object_ids: &[String]) {}
    fn on_cell_click(&mut self, _click: &CellClick) {}
    /// The view went back to the full trees.
    fn on_refresh(&mut self) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvents;

impl HeatmapEvents for NoopEvents {}

/// Logs each event at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEvents;

impl HeatmapEvents for LoggingEvents {
    fn on_cluster_highlight(&mut self, object_ids: &[String], node_id: &str) {
        info!("Highlighted cluster {} ({} objects)", node_id, object_ids.len());
    }

    fn on_cluster_unhighlight(&mut self, node_id: &str) {
        info!("Unhighlighted cluster {}", node_id);
    }

    fn on_column_cluster_highlight(&mut self, columns: &[usize], node_id: &str) {
        info!("Highlighted column cluster {}: columns {:?}", node_id, columns);
    }

    fn on_column_cluster_unhighlight(&mut self, node_id: &str) {
        info!("Unhighlighted column cluster {}", node_id);
    }

    fn on_zoom(&mut self, object_ids: &[String], node_id: &str) {
        info!("Zoomed into {} ({} objects)", node_id, object_ids.len());
    }

    fn on_unzoom(&mut self, node_id: &str) {
        info!("Zoomed out of {}", node_id);
    }

    fn on_columns_zoom(&mut self, columns: &[usize], node_id: &str) {
        info!("Zoomed columns into {} ({} columns)", node_id, columns.len());
    }

    fn on_columns_unzoom(&mut self, node_id: &str) {
        info!("Zoomed columns out of {}", node_id);
    }

    fn on_row_click(&mut self, object_ids: &[String]) {
        info!("Row clicked: {}", object_ids.join(", "));
    }

    fn on_cell_click(&mut self, click: &CellClick) {
        info!("Cell clicked: {} = {}", click.header, click.value);
    }

    fn on_refresh(&mut self) {
        info!("View refreshed");
    }
}

/// One recorded notification.
#[derive(Debug, Clone, PartialEq)]
pub enum HeatmapEvent {
    ClusterHighlight { object_ids: Vec<String>, node_id: String },
    ClusterUnhighlight { node_id: String },
    ColumnClusterHighlight { columns: Vec<usize>, node_id: String },
    ColumnClusterUnhighlight { node_id: String },
    Zoom { object_ids: Vec<String>, node_id: String },
    Unzoom { node_id: String },
    ColumnsZoom { columns: Vec<usize>, node_id: String },
    ColumnsUnzoom { node_id: String },
    RowClick { object_ids: Vec<String> },
    CellClick(CellClick),
    Refresh,
}

/// Keeps every event in arrival order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    pub events: Vec<HeatmapEvent>,
}

impl EventLog {
    pub fn take(&mut self) -> Vec<HeatmapEvent> {
        std::mem::take(&mut self.events)
    }
}

impl HeatmapEvents for EventLog {
    fn on_cluster_highlight(&mut self, object_ids: &[String], node_id: &str) {
        self.events.push(HeatmapEvent::ClusterHighlight {
            object_ids: object_ids.to_vec(),
            node_id: node_id.to_string(),
        });
    }

    fn on_cluster_unhighlight(&mut self, node_id: &str) {
        self.events.push(HeatmapEvent::ClusterUnhighlight { node_id: node_id.to_string() });
    }

    fn on_column_cluster_highlight(&mut self, columns: &[usize], node_id: &str) {
        self.events.push(HeatmapEvent::ColumnClusterHighlight {
            columns: columns.to_vec(),
            node_id: node_id.to_string(),
        });
    }

    fn on_column_cluster_unhighlight(&mut self, node_id: &str) {
        self.events.push(HeatmapEvent::ColumnClusterUnhighlight { node_id: node_id.to_string() });
    }

    fn on_zoom(&mut self, object_ids: &[String], node_id: &str) {
        self.events.push(HeatmapEvent::Zoom {
            object_ids: object_ids.to_vec(),
            node_id: node_id.to_string(),
        });
    }

    fn on_unzoom(&mut self, node_id: &str) {
        self.events.push(HeatmapEvent::Unzoom { node_id: node_id.to_string() });
    }

    fn on_columns_zoom(&mut self, columns: &[usize], node_id: &str) {
        self.events.push(HeatmapEvent::ColumnsZoom {
            columns: columns.to_vec(),
            node_id: node_id.to_string(),
        });
    }

    fn on_columns_unzoom(&mut self, node_id: &str) {
        self.events.push(HeatmapEvent::ColumnsUnzoom { node_id: node_id.to_string() });
    }

    fn on_row_click(&mut self, object_ids: &[String]) {
        self.events.push(HeatmapEvent::RowClick { object_ids: object_ids.to_vec() });
    }

    fn on_cell_click(&mut self, click: &CellClick) {
        self.events.push(HeatmapEvent::CellClick(click.clone()));
    }

    fn on_refresh(&mut self) {
        self.events.push(HeatmapEvent::Refresh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_accepts_everything() {
        let mut events = NoopEvents;
        events.on_zoom(&["a".to_string()], "n1");
        events.on_columns_unzoom("c1");
    }

    #[test]
    fn log_keeps_order() {
        let mut log = EventLog::default();
        log.on_zoom(&["a".to_string()], "n1");
        log.on_unzoom("n1");
        log.on_refresh();
        assert_eq!(
            log.take(),
            vec![
                HeatmapEvent::Zoom { object_ids: vec!["a".into()], node_id: "n1".into() },
                HeatmapEvent::Unzoom { node_id: "n1".into() },
                HeatmapEvent::Refresh,
            ]
        );
        assert!(log.events.is_empty());
    }
}
