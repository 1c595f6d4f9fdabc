//! Hierarchical data composition.
//!
//! When a container reports its data, the record sets of its descendants are
//! merged row by row into one record set that carries the container's own
//! object id, whatever ids the children used.

use horizon_weave_core::logging::targets;

use crate::condition::ConditionGroupSpec;
use crate::provider::DataExtraction;
use crate::record_set::{RecordSet, Row};
use crate::value::Value;

/// Merges child record sets into a container record set.
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchicalDataComposer;

impl HierarchicalDataComposer {
    /// Merge `children` into one record set owned by `container_id`.
    ///
    /// Row `i` of the result is the deep merge of row `i` of every child, in
    /// order, later children overriding same-named columns. Filters of all
    /// children are combined with AND.
    pub fn compose(container_id: &str, children: impl IntoIterator<Item = RecordSet>) -> RecordSet {
        let mut rows: Vec<Row> = Vec::new();
        let mut filters: Vec<ConditionGroupSpec> = Vec::new();
        let mut merged = 0usize;

        for child in children {
            if child.object_id != container_id {
                tracing::trace!(
                    target: targets::COMPOSER,
                    container = container_id,
                    child = %child.object_id,
                    "child object id overridden by container"
                );
            }
            for (index, row) in child.rows.into_iter().enumerate() {
                match rows.get_mut(index) {
                    Some(existing) => merge_row(existing, row),
                    None => rows.push(row),
                }
            }
            filters.extend(child.filters);
            merged += 1;
        }

        let filters = match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(ConditionGroupSpec {
                operator: "AND".to_string(),
                conditions: Vec::new(),
                condition_groups: filters,
            }),
        };

        tracing::debug!(
            target: targets::COMPOSER,
            container = container_id,
            children = merged,
            rows = rows.len(),
            "composed record set"
        );
        RecordSet {
            object_id: container_id.to_string(),
            rows,
            filters,
        }
    }

    /// Like [`compose`](Self::compose), taking raw extractions.
    ///
    /// Widgets that cannot extract synchronously are skipped; widgets with
    /// nothing to contribute add no rows.
    pub fn compose_extracted(
        container_id: &str,
        extractions: impl IntoIterator<Item = DataExtraction>,
    ) -> RecordSet {
        let children = extractions.into_iter().filter_map(|extraction| match extraction {
            DataExtraction::Rows(record_set) => Some(record_set),
            DataExtraction::Empty => None,
            DataExtraction::Unsupported => {
                tracing::trace!(
                    target: targets::COMPOSER,
                    container = container_id,
                    "skipping widget without synchronous extraction"
                );
                None
            }
        });
        Self::compose(container_id, children)
    }
}

fn merge_row(into: &mut Row, from: Row) {
    for (column, value) in from {
        match into.get_mut(&column) {
            Some(existing) => merge_value(existing, value),
            None => {
                into.insert(column, value);
            }
        }
    }
}

fn merge_value(into: &mut Value, from: Value) {
    match (into, from) {
        (Value::Map(existing), Value::Map(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
