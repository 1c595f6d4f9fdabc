//! Cross-widget dependency and conditional-evaluation engine for Horizon Weave.
//!
//! This crate derives one widget's state from the values of others:
//!
//! - **Value Providers**: the engine's view of a widget's current value and
//!   its `change`/`refresh` notifications
//! - **References**: `=widget!column[row]` pointers resolved against the tree
//! - **Condition Trees**: nested AND/OR groups of comparisons, evaluated to a
//!   boolean
//! - **Registration**: recompute a conditional property whenever anything it
//!   reads changes, with an initial pass and optional coalescing
//! - **Live References**: copy a value from one widget into another
//! - **Data Composition**: merge a container's descendant data into one
//!   record set stamped with the container's id
//!
//! # Example
//!
//! ```
//! use horizon_weave::prelude::*;
//!
//! let weave = Weave::new(WeaveConfig::default());
//! let qty = InputValue::new("qty").with_value("0").shared();
//! weave.add_widget("qty", None, WidgetEntry::input(qty.clone())).unwrap();
//! weave.add_widget("order", None, WidgetEntry::layout()).unwrap();
//!
//! weave.attach_conditional_property(ConditionalPropertySpec {
//!     widget: "order".into(),
//!     property: "hidden".into(),
//!     condition_group: serde_json::from_str(
//!         r#"{ "conditions": [{ "left": "=qty", "comparator": "<=", "right": 0 }] }"#,
//!     ).unwrap(),
//! }).unwrap();
//! assert!(!weave.widget_state("order").unwrap().visible);
//!
//! // Recomputes are coalesced onto the next event loop tick.
//! qty.set_value("2".into());
//! qty.set_value("3".into());
//! weave.run_until_idle();
//! assert!(weave.widget_state("order").unwrap().visible);
//! ```

pub mod composer;
pub mod condition;
pub mod config;
pub mod evaluator;
pub mod formula;
pub mod propagator;
pub mod provider;
pub mod record_set;
pub mod reference;
pub mod registrar;
pub mod value;
pub mod weave;
pub mod widget;

mod error;

pub use error::{Error, Result};

pub use composer::HierarchicalDataComposer;
pub use condition::{
    Comparator, Condition, ConditionGroup, ConditionGroupSpec, ConditionSpec, LogicalOperator, Operand,
};
pub use config::WeaveConfig;
pub use evaluator::ConditionEvaluator;
pub use formula::Formula;
pub use propagator::LiveReferencePropagator;
pub use provider::{CompositeValue, DataExtraction, InputValue, TableValue, ValueProvider};
pub use record_set::{RecordSet, Row};
pub use reference::{BoundReference, BoundReferences, Reference, ReferenceResolver, ReferenceValues, Target};
pub use registrar::{Action, ConditionalProperty, DependencyRegistrar};
pub use value::{Scalar, Value};
pub use weave::{BindFailure, ConditionalPropertySpec, LiveReferenceSpec, Weave};
pub use widget::{WidgetEntry, WidgetTree};

/// Prelude module with commonly used types.
pub mod prelude {
    pub use crate::condition::{ConditionGroup, ConditionGroupSpec};
    pub use crate::config::WeaveConfig;
    pub use crate::provider::{CompositeValue, DataExtraction, InputValue, TableValue, ValueProvider};
    pub use crate::record_set::RecordSet;
    pub use crate::value::Value;
    pub use crate::weave::{ConditionalPropertySpec, LiveReferenceSpec, Weave};
    pub use crate::widget::WidgetEntry;
    pub use crate::{Error, Result};
}
