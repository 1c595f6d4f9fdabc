//! Value providers.
//!
//! A [`ValueProvider`] is the engine's only view of a concrete widget: it
//! exposes the widget's current value, a value setter, and two signals:
//!
//! - `value_changed`: the value was mutated by the user or by a program.
//! - `data_refreshed`: the underlying data set was reloaded, whether or not
//!   the scalar value changed. Row-scoped references listen to this.
//!
//! Composite widgets (a search box wrapping an inner input, a combo with an
//! embedded table) implement the trait by delegating to a named inner
//! provider, see [`CompositeValue`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use horizon_weave_core::{Property, Signal};
use parking_lot::RwLock;

use crate::record_set::{RecordSet, Row};
use crate::value::Value;

/// What a widget contributes when its container collects data.
#[derive(Debug, Clone, PartialEq)]
pub enum DataExtraction {
    /// The widget's rows.
    Rows(RecordSet),
    /// The widget supports extraction but has nothing to contribute.
    Empty,
    /// The widget cannot produce data synchronously (e.g. it writes through
    /// an external staging mechanism). Composers skip it.
    Unsupported,
}

/// One widget's current value and its change notifications.
pub trait ValueProvider: Send + Sync {
    /// The widget id this provider belongs to.
    fn provider_id(&self) -> &str;

    /// The data column this widget represents, if any.
    fn column_key(&self) -> Option<&str> {
        None
    }

    /// The current value.
    fn value(&self) -> Value;

    /// Set the value programmatically. Returns `true` if it changed.
    ///
    /// Emits `value_changed` on change.
    fn set_value(&self, value: Value) -> bool;

    /// Value of `column` in `row`.
    ///
    /// Single-valued widgets have exactly one row and ignore `column`.
    /// `None` means the row does not exist.
    fn lookup(&self, _column: Option<&str>, row: Option<usize>) -> Option<Value> {
        match row {
            None | Some(0) => Some(self.value()),
            Some(_) => None,
        }
    }

    /// Delimiter this widget uses when its value is a list, if it declares one.
    fn list_delimiter(&self) -> Option<&str> {
        None
    }

    /// Emitted with the new value after every effective change.
    fn value_changed(&self) -> &Signal<Value>;

    /// Emitted after the underlying data set was reloaded.
    fn data_refreshed(&self) -> &Signal<()>;

    /// Counter bumped once per mutation, before its notifications go out.
    ///
    /// Providers that emit both `data_refreshed` and `value_changed` for a
    /// single mutation report a revision so listeners of both signals can
    /// react once. `None` means every notification is a separate mutation.
    fn revision(&self) -> Option<u64> {
        None
    }

    /// The data this widget reports to its container.
    fn extract_data(&self) -> DataExtraction;
}

/// Collapses the notifications one provider mutation emits into a single
/// trigger for a listener subscribed to both of its signals.
#[derive(Debug)]
pub(crate) struct RevisionGate {
    seen: AtomicU64,
}

impl RevisionGate {
    pub(crate) fn new() -> Self {
        Self {
            seen: AtomicU64::new(u64::MAX),
        }
    }

    /// `false` if this gate already admitted `provider`'s current revision.
    pub(crate) fn admit(&self, provider: &dyn ValueProvider) -> bool {
        match provider.revision() {
            Some(revision) => self.seen.swap(revision, Ordering::AcqRel) != revision,
            None => true,
        }
    }
}

/// A single-valued input widget.
pub struct InputValue {
    id: String,
    column: Option<String>,
    object_id: Option<String>,
    delimiter: Option<String>,
    staged: bool,
    value: Property<Value>,
    refreshed: Signal<()>,
}

impl InputValue {
    /// Create an input with a null value.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            column: None,
            object_id: None,
            delimiter: None,
            staged: false,
            value: Property::new(Value::Null),
            refreshed: Signal::new(),
        }
    }

    /// Bind the input to a data column.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Set the initial value (no notification).
    pub fn with_value(self, value: impl Into<Value>) -> Self {
        self.value.set_silent(value.into());
        self
    }

    /// Set the object id reported in extracted data (defaults to the widget id).
    pub fn with_object(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }

    /// Declare the delimiter used for list values.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    /// Mark the input as writing through an external staging mechanism.
    pub fn staged(mut self) -> Self {
        self.staged = true;
        self
    }

    /// Announce a data reload without changing the value.
    pub fn refresh(&self) {
        self.refreshed.emit(());
    }

    /// Wrap in an `Arc` for registration in a tree.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl ValueProvider for InputValue {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn column_key(&self) -> Option<&str> {
        self.column.as_deref()
    }

    fn value(&self) -> Value {
        self.value.get()
    }

    fn set_value(&self, value: Value) -> bool {
        self.value.set(value)
    }

    fn list_delimiter(&self) -> Option<&str> {
        self.delimiter.as_deref()
    }

    fn value_changed(&self) -> &Signal<Value> {
        self.value.changed()
    }

    fn data_refreshed(&self) -> &Signal<()> {
        &self.refreshed
    }

    fn extract_data(&self) -> DataExtraction {
        if self.staged {
            return DataExtraction::Unsupported;
        }
        let Some(column) = &self.column else {
            return DataExtraction::Empty;
        };
        let mut row = Row::new();
        row.insert(column.clone(), self.value.get());
        let object_id = self.object_id.clone().unwrap_or_else(|| self.id.clone());
        DataExtraction::Rows(RecordSet::new(object_id).with_rows(vec![row]))
    }
}

/// A multi-row data widget (table, grid, list) with single selection.
///
/// Its value is the key column of the selected row.
pub struct TableValue {
    id: String,
    key_column: String,
    object_id: Option<String>,
    delimiter: Option<String>,
    rows: RwLock<Vec<Row>>,
    selected: RwLock<Option<usize>>,
    revision: AtomicU64,
    changed: Signal<Value>,
    refreshed: Signal<()>,
}

impl TableValue {
    /// Create an empty table whose value comes from `key_column`.
    pub fn new(id: impl Into<String>, key_column: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key_column: key_column.into(),
            object_id: None,
            delimiter: None,
            rows: RwLock::new(Vec::new()),
            selected: RwLock::new(None),
            revision: AtomicU64::new(0),
            changed: Signal::new(),
            refreshed: Signal::new(),
        }
    }

    /// Set the object id reported in extracted data (defaults to the widget id).
    pub fn with_object(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }

    /// Declare the delimiter used for list values.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    /// Set the initial rows (no notification).
    pub fn with_rows(self, rows: Vec<Row>) -> Self {
        *self.rows.write() = rows;
        self
    }

    /// Wrap in an `Arc` for registration in a tree.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of rows currently loaded.
    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    /// Index of the selected row.
    pub fn selected(&self) -> Option<usize> {
        *self.selected.read()
    }

    /// Replace the data set.
    ///
    /// Always emits `data_refreshed`; also emits `value_changed` when the
    /// selected key changes. A selection that falls outside the new data is
    /// cleared.
    pub fn set_rows(&self, rows: Vec<Row>) {
        let before = self.value();
        let count = rows.len();
        *self.rows.write() = rows;
        self.revision.fetch_add(1, Ordering::AcqRel);
        {
            let mut selected = self.selected.write();
            if selected.is_some_and(|i| i >= count) {
                *selected = None;
            }
        }
        self.refreshed.emit(());
        let after = self.value();
        if after != before {
            self.changed.emit(after);
        }
    }

    /// Select a row (or clear the selection). Returns `true` if the value changed.
    pub fn select(&self, row: Option<usize>) -> bool {
        let before = self.value();
        let row = row.filter(|&i| i < self.row_count());
        *self.selected.write() = row;
        let after = self.value();
        if after != before {
            self.revision.fetch_add(1, Ordering::AcqRel);
            self.changed.emit(after);
            true
        } else {
            false
        }
    }

    fn cell(&self, row: usize, column: &str) -> Option<Value> {
        self.rows
            .read()
            .get(row)
            .map(|r| r.get(column).cloned().unwrap_or(Value::Null))
    }
}

impl ValueProvider for TableValue {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn column_key(&self) -> Option<&str> {
        Some(&self.key_column)
    }

    fn value(&self) -> Value {
        self.selected()
            .and_then(|i| self.cell(i, &self.key_column))
            .unwrap_or(Value::Null)
    }

    /// Select the first row whose key column equals `value`; clear the
    /// selection if there is none.
    ///
    /// Keys compare in canonical scalar form, so the text `"2"` selects the
    /// row keyed by the number `2`.
    fn set_value(&self, value: Value) -> bool {
        let delimiter = self.delimiter.as_deref().unwrap_or(",");
        let wanted = value.to_scalar(delimiter);
        let index = self.rows.read().iter().position(|r| {
            r.get(&self.key_column)
                .is_some_and(|key| key.to_scalar(delimiter).matches(&wanted, false))
        });
        self.select(index)
    }

    fn lookup(&self, column: Option<&str>, row: Option<usize>) -> Option<Value> {
        let column = column.unwrap_or(&self.key_column);
        match row {
            Some(i) => self.cell(i, column),
            None => Some(
                self.selected()
                    .and_then(|i| self.cell(i, column))
                    .unwrap_or(Value::Null),
            ),
        }
    }

    fn list_delimiter(&self) -> Option<&str> {
        self.delimiter.as_deref()
    }

    fn value_changed(&self) -> &Signal<Value> {
        &self.changed
    }

    fn data_refreshed(&self) -> &Signal<()> {
        &self.refreshed
    }

    fn revision(&self) -> Option<u64> {
        Some(self.revision.load(Ordering::Acquire))
    }

    fn extract_data(&self) -> DataExtraction {
        let rows = self.rows.read().clone();
        let object_id = self.object_id.clone().unwrap_or_else(|| self.id.clone());
        DataExtraction::Rows(RecordSet::new(object_id).with_rows(rows))
    }
}

/// A composite widget that exposes the value of a named inner widget.
pub struct CompositeValue {
    id: String,
    inner_name: String,
    inner: Arc<dyn ValueProvider>,
}

impl CompositeValue {
    /// Wrap `inner` under the composite's own id.
    pub fn new(id: impl Into<String>, inner: Arc<dyn ValueProvider>) -> Self {
        let inner_name = inner.provider_id().to_string();
        Self {
            id: id.into(),
            inner_name,
            inner,
        }
    }

    /// The id of the widget this composite delegates to.
    pub fn inner_name(&self) -> &str {
        &self.inner_name
    }
}

impl ValueProvider for CompositeValue {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn column_key(&self) -> Option<&str> {
        self.inner.column_key()
    }

    fn value(&self) -> Value {
        self.inner.value()
    }

    fn set_value(&self, value: Value) -> bool {
        self.inner.set_value(value)
    }

    fn lookup(&self, column: Option<&str>, row: Option<usize>) -> Option<Value> {
        self.inner.lookup(column, row)
    }

    fn list_delimiter(&self) -> Option<&str> {
        self.inner.list_delimiter()
    }

    fn value_changed(&self) -> &Signal<Value> {
        self.inner.value_changed()
    }

    fn data_refreshed(&self) -> &Signal<()> {
        self.inner.data_refreshed()
    }

    fn revision(&self) -> Option<u64> {
        self.inner.revision()
    }

    fn extract_data(&self) -> DataExtraction {
        self.inner.extract_data()
    }
}
