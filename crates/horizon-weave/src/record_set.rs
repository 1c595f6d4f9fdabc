//! Record sets: the object-identified row collections exchanged between
//! container widgets and a backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::condition::ConditionGroupSpec;
use crate::value::Value;

/// One row: column key to value.
pub type Row = BTreeMap<String, Value>;

/// A collection of rows owned by one object.
///
/// Wire shape: `{ "oId": ..., "rows": [...], "filters": {...} }`, with
/// `filters` omitted when absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordSet {
    /// Identity of the object the rows belong to.
    #[serde(rename = "oId")]
    pub object_id: String,
    /// The rows, in order.
    #[serde(default)]
    pub rows: Vec<Row>,
    /// Optional filter tree, in the same shape as a condition group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<ConditionGroupSpec>,
}

impl RecordSet {
    /// An empty record set for `object_id`.
    pub fn new(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            rows: Vec::new(),
            filters: None,
        }
    }

    /// Replace the rows.
    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    /// Attach a filter tree.
    pub fn with_filters(mut self, filters: ConditionGroupSpec) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every column key used by any row, sorted.
    pub fn columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self
            .rows
            .iter()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect();
        columns.sort_unstable();
        columns.dedup();
        columns
    }

    /// Serialize to the JSON wire shape.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
