//! The engine facade.
//!
//! A [`Weave`] owns a widget tree and everything attached to it: conditional
//! properties, live references, and the event loop that runs coalesced
//! recomputes. Declarations can be attached immediately or queued and bound
//! together once the tree is complete:
//!
//! ```
//! use horizon_weave::{InputValue, Weave, WeaveConfig, WidgetEntry};
//!
//! let weave = Weave::new(WeaveConfig::immediate());
//! weave.add_widget("form", None, WidgetEntry::container()).unwrap();
//! weave.add_widget("status", Some("form"), WidgetEntry::input(InputValue::new("status").shared())).unwrap();
//! weave.add_widget("submit", Some("form"), WidgetEntry::layout()).unwrap();
//!
//! weave.declare_conditional_property_json(r#"{
//!     "widget": "submit",
//!     "property": "disabled",
//!     "conditionGroup": {
//!         "operator": "AND",
//!         "conditions": [{ "left": "=status", "comparator": "!==", "right": "open" }]
//!     }
//! }"#).unwrap();
//! assert!(weave.bind_pending().is_empty());
//! assert!(!weave.widget_state("submit").unwrap().enabled);
//!
//! weave.set_value("status", "open".into()).unwrap();
//! assert!(weave.widget_state("submit").unwrap().enabled);
//! ```

use std::fmt;
use std::sync::Arc;

use horizon_weave_core::logging::targets;
use horizon_weave_core::{EventLoop, ObjectId, WidgetState, WidgetTreeDebug};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::composer::HierarchicalDataComposer;
use crate::condition::{ConditionGroup, ConditionGroupSpec};
use crate::config::WeaveConfig;
use crate::error::{Error, Result};
use crate::propagator::LiveReferencePropagator;
use crate::provider::{DataExtraction, ValueProvider};
use crate::record_set::RecordSet;
use crate::reference::{Reference, ReferenceResolver};
use crate::registrar::{Action, ConditionalProperty, DependencyRegistrar};
use crate::value::Value;
use crate::widget::{WidgetEntry, WidgetTree};

/// Declared conditional property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalPropertySpec {
    /// Owning widget.
    pub widget: String,
    /// Property name: `disabled`, `hidden` or `readonly`.
    pub property: String,
    /// The condition tree.
    pub condition_group: ConditionGroupSpec,
}

/// Declared live reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveReferenceSpec {
    /// Widget that receives the value.
    pub widget: String,
    /// Reference expression of the source.
    pub source: String,
    /// Skip empty source values.
    #[serde(default)]
    pub only_if_not_empty: bool,
}

/// A declaration that failed to bind. The rest of the tree is unaffected.
#[derive(Debug)]
pub struct BindFailure {
    /// Widget the declaration belongs to.
    pub widget: String,
    /// Why it failed.
    pub error: Error,
}

impl fmt::Display for BindFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.widget, self.error)
    }
}

#[derive(Debug, Clone)]
enum Declaration {
    Conditional(ConditionalPropertySpec),
    Live(LiveReferenceSpec),
}

impl Declaration {
    fn widget(&self) -> &str {
        match self {
            Self::Conditional(spec) => &spec.widget,
            Self::Live(spec) => &spec.widget,
        }
    }
}

/// A widget tree with its dependency engine.
pub struct Weave {
    config: WeaveConfig,
    event_loop: EventLoop,
    tree: Arc<RwLock<WidgetTree>>,
    registrar: DependencyRegistrar,
    propagator: LiveReferencePropagator,
    pending: Mutex<Vec<Declaration>>,
}

impl Weave {
    /// Create an engine with its own event loop.
    pub fn new(config: WeaveConfig) -> Self {
        Self::with_event_loop(config, EventLoop::new())
    }

    /// Create an engine that defers work through `event_loop`.
    pub fn with_event_loop(config: WeaveConfig, event_loop: EventLoop) -> Self {
        Self {
            registrar: DependencyRegistrar::new(config.clone(), event_loop.clone()),
            propagator: LiveReferencePropagator::new(config.clone(), event_loop.clone()),
            config,
            event_loop,
            tree: Arc::new(RwLock::new(WidgetTree::new())),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &WeaveConfig {
        &self.config
    }

    /// The event loop coalesced work runs on.
    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// The conditional property registrar.
    pub fn registrar(&self) -> &DependencyRegistrar {
        &self.registrar
    }

    /// The live reference propagator.
    pub fn propagator(&self) -> &LiveReferencePropagator {
        &self.propagator
    }

    /// Run queued work until the event loop is idle.
    pub fn run_until_idle(&self) -> usize {
        self.event_loop.run_until_idle()
    }

    // -------------------------------------------------------------------------
    // Widgets
    // -------------------------------------------------------------------------

    /// Add a widget under `parent` (or as a root).
    pub fn add_widget(&self, name: &str, parent: Option<&str>, entry: WidgetEntry) -> Result<ObjectId> {
        let mut tree = self.tree.write();
        let parent = parent.map(|p| tree.require(p)).transpose()?;
        Ok(tree.insert(name, parent, entry)?)
    }

    /// Remove a widget and its descendants, tearing down every conditional
    /// property and live reference that belongs to or reads from them.
    ///
    /// Returns the number of widgets removed.
    pub fn remove_widget(&self, name: &str) -> Result<usize> {
        let destroyed = {
            let mut tree = self.tree.write();
            let id = tree.require(name)?;
            tree.destroy(id)?
        };
        for object in &destroyed {
            let owned = self.registrar.unregister_owner(&object.name);
            let readers = self.registrar.unregister_involving(object.id);
            let links = self.propagator.unregister_involving(object.id);
            if owned + readers + links > 0 {
                tracing::debug!(
                    target: targets::OBJECT,
                    widget = %object.name,
                    owned,
                    readers,
                    links,
                    "tore down dependencies of removed widget"
                );
            }
        }
        self.pending
            .lock()
            .retain(|d| destroyed.iter().all(|o| o.name != d.widget()));
        Ok(destroyed.len())
    }

    /// The value provider of a widget.
    pub fn provider(&self, name: &str) -> Option<Arc<dyn ValueProvider>> {
        let tree = self.tree.read();
        let id = tree.find(name)?;
        tree.payload(id).ok()?.provider().cloned()
    }

    /// Set a widget's value. Returns `true` if it changed.
    pub fn set_value(&self, name: &str, value: Value) -> Result<bool> {
        let provider = self
            .provider(name)
            .ok_or_else(|| Error::broken_reference(format!("={name}"), "widget exposes no value"))?;
        Ok(provider.set_value(value))
    }

    /// A widget's current value.
    pub fn value(&self, name: &str) -> Option<Value> {
        self.provider(name).map(|p| p.value())
    }

    /// A widget's own visible/enabled flags.
    pub fn widget_state(&self, name: &str) -> Result<WidgetState> {
        let tree = self.tree.read();
        let id = tree.require(name)?;
        Ok(tree.widget_state(id)?)
    }

    /// Whether the widget and all its ancestors are enabled.
    pub fn is_effectively_enabled(&self, name: &str) -> Result<bool> {
        let tree = self.tree.read();
        let id = tree.require(name)?;
        Ok(tree.is_effectively_enabled(id)?)
    }

    /// Whether the widget and all its ancestors are visible.
    pub fn is_effectively_visible(&self, name: &str) -> Result<bool> {
        let tree = self.tree.read();
        let id = tree.require(name)?;
        Ok(tree.is_effectively_visible(id)?)
    }

    /// Render the tree with current values, for diagnostics.
    pub fn dump_tree(&self) -> String {
        let tree = self.tree.read();
        WidgetTreeDebug::new(&*tree)
            .with_state(true)
            .with_annotation(|entry: &WidgetEntry| match entry.provider() {
                Some(provider) => Some(provider.value().to_string()),
                None if entry.is_container() => Some("container".to_string()),
                None => None,
            })
            .format_all()
    }

    // -------------------------------------------------------------------------
    // Declarations
    // -------------------------------------------------------------------------

    /// Queue a conditional property for [`bind_pending`](Self::bind_pending).
    pub fn declare_conditional_property(&self, spec: ConditionalPropertySpec) {
        self.pending.lock().push(Declaration::Conditional(spec));
    }

    /// Queue a conditional property from its JSON declaration.
    pub fn declare_conditional_property_json(&self, json: &str) -> Result<()> {
        let spec: ConditionalPropertySpec = serde_json::from_str(json)?;
        self.declare_conditional_property(spec);
        Ok(())
    }

    /// Queue a live reference for [`bind_pending`](Self::bind_pending).
    pub fn declare_live_reference(&self, spec: LiveReferenceSpec) {
        self.pending.lock().push(Declaration::Live(spec));
    }

    /// Queue a live reference from its JSON declaration.
    pub fn declare_live_reference_json(&self, json: &str) -> Result<()> {
        let spec: LiveReferenceSpec = serde_json::from_str(json)?;
        self.declare_live_reference(spec);
        Ok(())
    }

    /// Number of queued declarations.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Bind every queued declaration, children before parents.
    ///
    /// Each declaration is bound and initially evaluated on its own; a
    /// failure is reported and the rest carry on.
    pub fn bind_pending(&self) -> Vec<BindFailure> {
        let mut declarations = std::mem::take(&mut *self.pending.lock());
        {
            let tree = self.tree.read();
            let order = tree.postorder_all();
            declarations.sort_by_key(|d| {
                tree.find(d.widget())
                    .and_then(|id| order.iter().position(|&o| o == id))
                    .unwrap_or(usize::MAX)
            });
        }

        let mut failures = Vec::new();
        for declaration in declarations {
            let widget = declaration.widget().to_string();
            let result = match declaration {
                Declaration::Conditional(spec) => self.attach_conditional_property(spec),
                Declaration::Live(spec) => self.attach_live_reference(spec),
            };
            if let Err(error) = result {
                tracing::warn!(target: targets::REGISTRAR, widget = %widget, %error, "declaration not bound");
                failures.push(BindFailure { widget, error });
            }
        }
        failures
    }

    /// Bind a conditional property with the built-in action for its
    /// property name, and run its initial evaluation.
    pub fn attach_conditional_property(&self, spec: ConditionalPropertySpec) -> Result<()> {
        let owner = self.tree.read().require(&spec.widget)?;
        let (on_true, on_false) = self.builtin_actions(owner, &spec.widget, &spec.property)?;
        self.attach_conditional_property_with(spec, on_true, on_false)
    }

    /// Bind a conditional property with custom actions.
    pub fn attach_conditional_property_with(
        &self,
        spec: ConditionalPropertySpec,
        on_true: Action,
        on_false: Action,
    ) -> Result<()> {
        let group = ConditionGroup::from_spec(&spec.condition_group)?;
        let bound = {
            let tree = self.tree.read();
            let owner = tree.require(&spec.widget)?;
            ReferenceResolver::new(&tree).bind_all(&group, Some(owner))?
        };
        // No tree lock is held here: the initial evaluation runs the actions.
        self.registrar.register(
            ConditionalProperty::new(spec.widget, spec.property, group),
            bound,
            on_true,
            on_false,
        );
        Ok(())
    }

    /// Bind a live reference and run its initial propagation.
    pub fn attach_live_reference(&self, spec: LiveReferenceSpec) -> Result<()> {
        let reference = Reference::parse(&spec.source)?.only_if_not_empty(spec.only_if_not_empty);
        let (source, target) = {
            let tree = self.tree.read();
            let resolver = ReferenceResolver::new(&tree);
            let target = resolver.resolve(&Reference::widget(&spec.widget), None)?;
            let source = resolver.resolve(&reference, Some(target.widget))?;
            (source, target)
        };
        self.propagator.register(source, target, reference)
    }

    fn builtin_actions(&self, owner: ObjectId, widget: &str, property: &str) -> Result<(Action, Action)> {
        type Apply = fn(&mut WidgetTree, ObjectId, bool) -> horizon_weave_core::ObjectResult<()>;
        let (apply, when_true): (Apply, bool) = match property.to_ascii_lowercase().as_str() {
            "disabled" | "readonly" => (WidgetTree::set_widget_enabled as Apply, false),
            "hidden" => (WidgetTree::set_widget_visible as Apply, false),
            _ => {
                return Err(Error::UnknownProperty {
                    widget: widget.to_string(),
                    property: property.to_string(),
                });
            }
        };
        let make = |flag: bool| -> Action {
            let tree = Arc::clone(&self.tree);
            Arc::new(move || {
                if let Err(error) = apply(&mut tree.write(), owner, flag) {
                    tracing::warn!(target: targets::REGISTRAR, %error, "conditional property target is gone");
                }
            })
        };
        Ok((make(when_true), make(!when_true)))
    }

    // -------------------------------------------------------------------------
    // Data
    // -------------------------------------------------------------------------

    /// Compose the data of a container's descendants.
    ///
    /// Nested containers compose first and are merged as one child; layout
    /// widgets are transparent.
    pub fn collect_data(&self, container: &str) -> Result<RecordSet> {
        let tree = self.tree.read();
        let id = tree.require(container)?;
        collect(&tree, id)
    }
}

fn collect(tree: &WidgetTree, id: ObjectId) -> Result<RecordSet> {
    let mut parts = Vec::new();
    for &child in tree.children(id)? {
        gather(tree, child, &mut parts)?;
    }
    Ok(HierarchicalDataComposer::compose_extracted(tree.name(id)?, parts))
}

fn gather(tree: &WidgetTree, id: ObjectId, parts: &mut Vec<DataExtraction>) -> Result<()> {
    let entry = tree.payload(id)?;
    if entry.is_container() {
        parts.push(DataExtraction::Rows(collect(tree, id)?));
    } else if let Some(provider) = entry.provider() {
        parts.push(provider.extract_data());
    } else {
        for &child in tree.children(id)? {
            gather(tree, child, parts)?;
        }
    }
    Ok(())
}

impl Default for Weave {
    fn default() -> Self {
        Self::new(WeaveConfig::default())
    }
}

impl fmt::Debug for Weave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Weave")
            .field("widgets", &self.tree.read().object_count())
            .field("registrar", &self.registrar)
            .field("propagator", &self.propagator)
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InputValue;
    use serde_json::json;

    fn conditional(widget: &str, property: &str, group: serde_json::Value) -> ConditionalPropertySpec {
        serde_json::from_value(json!({
            "widget": widget,
            "property": property,
            "conditionGroup": group,
        }))
        .unwrap()
    }

    fn form() -> Weave {
        let weave = Weave::new(WeaveConfig::immediate());
        weave.add_widget("form", None, WidgetEntry::container()).unwrap();
        for (name, column, value) in [("a", "alpha", "5"), ("b", "beta", "")] {
            let input = InputValue::new(name).with_column(column).with_value(value);
            weave.add_widget(name, Some("form"), WidgetEntry::input(input.shared())).unwrap();
        }
        weave.add_widget("save", Some("form"), WidgetEntry::layout()).unwrap();
        weave
    }

    #[test]
    fn test_builtin_actions() {
        let weave = form();
        weave
            .attach_conditional_property(conditional(
                "save",
                "hidden",
                json!({ "conditions": [{ "left": "=a", "comparator": "==", "right": "5" }] }),
            ))
            .unwrap();
        assert!(!weave.widget_state("save").unwrap().visible);

        weave.set_value("a", "6".into()).unwrap();
        assert!(weave.widget_state("save").unwrap().visible);

        let err = weave
            .attach_conditional_property(conditional("save", "bold", json!({})))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownProperty { .. }));
    }

    #[test]
    fn test_bind_pending_isolates_failures() {
        let weave = form();
        weave.declare_conditional_property(conditional(
            "save",
            "disabled",
            json!({ "conditions": [{ "left": "=missing", "comparator": "==", "right": "1" }] }),
        ));
        weave.declare_conditional_property(conditional(
            "save",
            "hidden",
            json!({ "conditions": [{ "left": "=a", "comparator": "==", "right": "5" }] }),
        ));
        weave
            .declare_live_reference_json(r#"{ "widget": "b", "source": "=a" }"#)
            .unwrap();
        assert_eq!(weave.pending_count(), 3);

        let failures = weave.bind_pending();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].widget, "save");
        assert!(matches!(failures[0].error, Error::BrokenReference { .. }));
        assert_eq!(weave.pending_count(), 0);

        assert!(!weave.widget_state("save").unwrap().visible);
        assert_eq!(weave.value("b"), Some(Value::text("5")));
    }

    #[test]
    fn test_remove_widget_tears_down_dependencies() {
        let weave = form();
        weave
            .attach_conditional_property(conditional(
                "save",
                "disabled",
                json!({ "conditions": [{ "left": "=a", "comparator": "==", "right": "5" }] }),
            ))
            .unwrap();
        weave
            .attach_live_reference(LiveReferenceSpec {
                widget: "b".into(),
                source: "=a".into(),
                only_if_not_empty: false,
            })
            .unwrap();
        assert_eq!(weave.registrar().registration_count(), 1);
        assert_eq!(weave.propagator().link_count(), 1);

        assert_eq!(weave.remove_widget("a").unwrap(), 1);
        assert_eq!(weave.registrar().registration_count(), 0);
        assert_eq!(weave.propagator().link_count(), 0);
        assert!(weave.provider("a").is_none());
    }

    #[test]
    fn test_collect_data_uses_container_id() {
        let weave = form();
        weave
            .add_widget("address", Some("form"), WidgetEntry::container())
            .unwrap();
        let city = InputValue::new("city").with_column("city").with_value("Oslo");
        weave
            .add_widget("city", Some("address"), WidgetEntry::input(city.shared()))
            .unwrap();
        let upload = InputValue::new("upload").with_column("file").staged();
        weave
            .add_widget("upload", Some("form"), WidgetEntry::input(upload.shared()))
            .unwrap();

        let rs = weave.collect_data("form").unwrap();
        assert_eq!(rs.object_id, "form");
        assert_eq!(rs.rows.len(), 1);
        assert_eq!(rs.rows[0]["alpha"], Value::text("5"));
        assert_eq!(rs.rows[0]["city"], Value::text("Oslo"));
        assert!(!rs.rows[0].contains_key("file"));

        let nested = weave.collect_data("address").unwrap();
        assert_eq!(nested.object_id, "address");
    }

    #[test]
    fn test_live_reference_cycle_is_reported() {
        let weave = form();
        weave
            .attach_live_reference(LiveReferenceSpec {
                widget: "b".into(),
                source: "=a".into(),
                only_if_not_empty: false,
            })
            .unwrap();
        let err = weave
            .attach_live_reference(LiveReferenceSpec {
                widget: "a".into(),
                source: "=b".into(),
                only_if_not_empty: false,
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "Cyclic reference: b -> a -> b");
    }

    #[test]
    fn test_dump_tree_shows_values() {
        let weave = form();
        let dump = weave.dump_tree();
        assert!(dump.contains("form"));
        assert!(dump.contains("a = 5"));
        assert!(dump.contains("form = container"));
    }
}
