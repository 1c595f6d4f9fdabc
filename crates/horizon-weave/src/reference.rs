//! References between widgets and their resolution.
//!
//! A reference expression points at another widget's value, optionally
//! scoped to a column and a row:
//!
//! | Expression           | Meaning                                   |
//! |----------------------|-------------------------------------------|
//! | `=status`            | value of widget `status`                  |
//! | `=orders!total`      | column `total` of the selected row        |
//! | `=orders!total[2]`   | column `total` of row 2                   |
//! | `=orders[0]`         | key column of row 0                       |
//! | `=~parent!name`      | relative to the owning widget             |
//!
//! Resolution is a pure lookup in the widget tree. It never subscribes to
//! anything; that is the registrar's job.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use horizon_weave_core::ObjectId;
use horizon_weave_core::logging::targets;
use regex::Regex;

use crate::condition::ConditionGroup;
use crate::error::{Error, Result};
use crate::provider::ValueProvider;
use crate::value::Value;
use crate::widget::WidgetTree;

/// The widget a reference points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// A widget by name.
    Widget(String),
    /// The widget that owns the declaration.
    SelfWidget,
    /// The owning widget's parent.
    Parent,
}

/// A pointer from one widget's property to another widget's value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// The referenced widget.
    pub target: Target,
    /// Column of the referenced data, if scoped.
    pub column: Option<String>,
    /// Row of the referenced data, if scoped.
    pub row: Option<usize>,
    /// Skip propagation of empty values (live references only).
    pub only_if_not_empty: bool,
}

fn reference_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^(~self|~parent|[A-Za-z_][\w.\-]*)(?:!([A-Za-z_][\w.\-]*))?(?:\[(\d+)\])?$")
                .ok()
        })
        .as_ref()
}

impl Reference {
    /// A reference to a whole widget.
    pub fn widget(name: impl Into<String>) -> Self {
        Self {
            target: Target::Widget(name.into()),
            column: None,
            row: None,
            only_if_not_empty: false,
        }
    }

    /// Scope to a column.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Scope to a row.
    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    /// Set the `onlyIfNotEmpty` flag.
    pub fn only_if_not_empty(mut self, only_if_not_empty: bool) -> Self {
        self.only_if_not_empty = only_if_not_empty;
        self
    }

    /// Parse a reference expression, or `None` if `expr` is not one.
    pub fn try_parse(expr: &str) -> Option<Self> {
        let body = expr.trim().strip_prefix('=')?.trim();
        let caps = reference_pattern()?.captures(body)?;

        let target = match &caps[1] {
            "~self" => Target::SelfWidget,
            "~parent" => Target::Parent,
            name => Target::Widget(name.to_string()),
        };
        let row = match caps.get(3) {
            Some(m) => Some(m.as_str().parse().ok()?),
            None => None,
        };
        Some(Self {
            target,
            column: caps.get(2).map(|m| m.as_str().to_string()),
            row,
            only_if_not_empty: false,
        })
    }

    /// Parse a reference expression.
    pub fn parse(expr: &str) -> Result<Self> {
        Self::try_parse(expr)
            .ok_or_else(|| Error::broken_reference(expr, "not a reference expression"))
    }

    /// Whether the reference picks a specific row.
    ///
    /// Row-scoped references depend on the whole data set, so they react to
    /// refreshes as well as value changes.
    pub fn is_row_scoped(&self) -> bool {
        self.row.is_some()
    }

    /// Read the referenced value from a resolved provider.
    ///
    /// A row that does not exist reads as null.
    pub fn read(&self, provider: &dyn ValueProvider) -> Value {
        provider
            .lookup(self.column.as_deref(), self.row)
            .unwrap_or(Value::Null)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("=")?;
        match &self.target {
            Target::Widget(name) => f.write_str(name)?,
            Target::SelfWidget => f.write_str("~self")?,
            Target::Parent => f.write_str("~parent")?,
        }
        if let Some(column) = &self.column {
            write!(f, "!{column}")?;
        }
        if let Some(row) = self.row {
            write!(f, "[{row}]")?;
        }
        Ok(())
    }
}

/// A reference resolved to a live widget.
#[derive(Clone)]
pub struct BoundReference {
    /// The referenced widget.
    pub widget: ObjectId,
    /// Its name in the tree.
    pub name: String,
    /// Its value provider.
    pub provider: Arc<dyn ValueProvider>,
}

impl fmt::Debug for BoundReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundReference")
            .field("widget", &self.widget)
            .field("name", &self.name)
            .finish()
    }
}

/// Access to the current values of references during evaluation.
pub trait ReferenceValues {
    /// The current value behind `reference`.
    fn value_of(&self, reference: &Reference) -> Result<Value>;

    /// The list delimiter the referenced widget declares, if any.
    fn delimiter_of(&self, _reference: &Reference) -> Option<String> {
        None
    }
}

/// Every reference of one condition tree, bound to its provider.
#[derive(Debug, Clone, Default)]
pub struct BoundReferences {
    bindings: HashMap<Reference, BoundReference>,
}

impl BoundReferences {
    /// An empty binding set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding.
    pub fn insert(&mut self, reference: Reference, bound: BoundReference) {
        self.bindings.insert(reference, bound);
    }

    /// Number of distinct references.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no reference is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Whether any binding points at `widget`.
    pub fn involves(&self, widget: ObjectId) -> bool {
        self.bindings.values().any(|b| b.widget == widget)
    }

    /// Each distinct provider once, with whether any reference to it is
    /// row-scoped.
    pub fn providers(&self) -> Vec<(BoundReference, bool)> {
        let mut result: Vec<(BoundReference, bool)> = Vec::new();
        for (reference, bound) in &self.bindings {
            match result.iter_mut().find(|(b, _)| b.widget == bound.widget) {
                Some((_, row_scoped)) => *row_scoped |= reference.is_row_scoped(),
                None => result.push((bound.clone(), reference.is_row_scoped())),
            }
        }
        result
    }
}

impl ReferenceValues for BoundReferences {
    fn value_of(&self, reference: &Reference) -> Result<Value> {
        let bound = self
            .bindings
            .get(reference)
            .ok_or_else(|| Error::broken_reference(reference.to_string(), "reference is not bound"))?;
        Ok(reference.read(bound.provider.as_ref()))
    }

    fn delimiter_of(&self, reference: &Reference) -> Option<String> {
        self.bindings
            .get(reference)
            .and_then(|b| b.provider.list_delimiter().map(str::to_string))
    }
}

/// Resolves references against a widget tree.
pub struct ReferenceResolver<'a> {
    tree: &'a WidgetTree,
}

impl<'a> ReferenceResolver<'a> {
    /// Create a resolver over `tree`.
    pub fn new(tree: &'a WidgetTree) -> Self {
        Self { tree }
    }

    /// Find the widget `reference` points at, relative to `owner`.
    pub fn resolve_widget(&self, reference: &Reference, owner: Option<ObjectId>) -> Result<ObjectId> {
        let broken = |message: String| Error::broken_reference(reference.to_string(), message);
        match &reference.target {
            Target::Widget(name) => self
                .tree
                .find(name)
                .ok_or_else(|| broken(format!("no widget named '{name}'"))),
            Target::SelfWidget => owner
                .filter(|&id| self.tree.contains(id))
                .ok_or_else(|| broken("no owning widget".into())),
            Target::Parent => {
                let owner = owner.ok_or_else(|| broken("no owning widget".into()))?;
                self.tree
                    .parent(owner)?
                    .ok_or_else(|| broken("owning widget has no parent".into()))
            }
        }
    }

    /// Resolve `reference` to a live value provider.
    pub fn resolve(&self, reference: &Reference, owner: Option<ObjectId>) -> Result<BoundReference> {
        let widget = self.resolve_widget(reference, owner)?;
        let name = self.tree.name(widget)?.to_string();
        let provider = self
            .tree
            .payload(widget)?
            .provider()
            .cloned()
            .ok_or_else(|| {
                Error::broken_reference(reference.to_string(), format!("widget '{name}' exposes no value"))
            })?;
        tracing::trace!(target: targets::RESOLVER, %reference, widget = %name, "resolved reference");
        Ok(BoundReference {
            widget,
            name,
            provider,
        })
    }

    /// Resolve every reference in a condition tree.
    ///
    /// Fails on the first reference that does not resolve.
    pub fn bind_all(&self, group: &ConditionGroup, owner: Option<ObjectId>) -> Result<BoundReferences> {
        let mut bound = BoundReferences::new();
        for reference in group.references() {
            let binding = self.resolve(reference, owner)?;
            bound.insert(reference.clone(), binding);
        }
        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{InputValue, TableValue};
    use crate::record_set::Row;
    use crate::widget::WidgetEntry;

    #[test]
    fn test_parse_forms() {
        assert_eq!(Reference::try_parse("=status"), Some(Reference::widget("status")));
        assert_eq!(
            Reference::try_parse(" =orders!total[2] "),
            Some(Reference::widget("orders").with_column("total").with_row(2))
        );
        assert_eq!(
            Reference::try_parse("=orders[0]"),
            Some(Reference::widget("orders").with_row(0))
        );
        let parent = Reference::try_parse("=~parent!name").unwrap();
        assert_eq!(parent.target, Target::Parent);

        assert_eq!(Reference::try_parse("status"), None);
        assert_eq!(Reference::try_parse("=Upper(\"x\")"), None);
        assert_eq!(Reference::try_parse("=[#user#]"), None);
        assert!(matches!(
            Reference::parse("plain"),
            Err(Error::BrokenReference { .. })
        ));
    }

    #[test]
    fn test_display_round_trips() {
        for expr in ["=a", "=a!b", "=a!b[3]", "=~self[1]", "=~parent!x"] {
            assert_eq!(Reference::parse(expr).unwrap().to_string(), expr);
        }
    }

    fn tree() -> (WidgetTree, ObjectId, ObjectId) {
        let mut tree = WidgetTree::new();
        let form = tree.insert("form", None, WidgetEntry::container()).unwrap();
        let table = TableValue::new("orders", "id").with_rows(vec![{
            let mut r = Row::new();
            r.insert("id".into(), Value::Number(7.0));
            r
        }]);
        let orders = tree
            .insert("orders", Some(form), WidgetEntry::input(table.shared()))
            .unwrap();
        tree.insert(
            "status",
            Some(form),
            WidgetEntry::input(InputValue::new("status").with_value("open").shared()),
        )
        .unwrap();
        (tree, form, orders)
    }

    #[test]
    fn test_resolve() {
        let (tree, form, orders) = tree();
        let resolver = ReferenceResolver::new(&tree);

        let status = resolver.resolve(&Reference::widget("status"), None).unwrap();
        assert_eq!(status.name, "status");
        assert_eq!(Reference::widget("status").read(status.provider.as_ref()), Value::text("open"));

        let row = Reference::try_parse("=~self[0]").unwrap();
        let bound = resolver.resolve(&row, Some(orders)).unwrap();
        assert_eq!(row.read(bound.provider.as_ref()), Value::Number(7.0));
        assert_eq!(resolver.resolve_widget(&Reference::try_parse("=~parent").unwrap(), Some(orders)).unwrap(), form);
    }

    #[test]
    fn test_broken_references() {
        let (tree, form, _) = tree();
        let resolver = ReferenceResolver::new(&tree);

        let err = resolver.resolve(&Reference::widget("missing"), None).unwrap_err();
        assert!(err.to_string().contains("no widget named 'missing'"));

        // Containers expose no value.
        let err = resolver.resolve(&Reference::widget("form"), None).unwrap_err();
        assert!(matches!(err, Error::BrokenReference { .. }));

        let parent = Reference::try_parse("=~parent").unwrap();
        assert!(resolver.resolve(&parent, Some(form)).is_err());
        assert!(resolver.resolve(&parent, None).is_err());
    }
}
