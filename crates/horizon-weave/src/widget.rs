//! Widget tree payloads.

use std::fmt;
use std::sync::Arc;

use horizon_weave_core::ObjectTree;

use crate::provider::ValueProvider;

/// The widget tree the engine resolves references against.
pub type WidgetTree = ObjectTree<WidgetEntry>;

/// What the engine knows about one widget in the tree.
///
/// A widget either exposes a value, groups other widgets as a data
/// container, or is a plain layout node that is transparent to data
/// collection.
#[derive(Clone, Default)]
pub struct WidgetEntry {
    provider: Option<Arc<dyn ValueProvider>>,
    container: bool,
}

impl WidgetEntry {
    /// A widget that exposes a value.
    pub fn input(provider: Arc<dyn ValueProvider>) -> Self {
        Self {
            provider: Some(provider),
            container: false,
        }
    }

    /// A data container (form, panel) whose descendants' data is composed
    /// into one record set under the container's id.
    pub fn container() -> Self {
        Self {
            provider: None,
            container: true,
        }
    }

    /// A layout-only widget.
    pub fn layout() -> Self {
        Self::default()
    }

    /// The widget's value provider, if it has one.
    pub fn provider(&self) -> Option<&Arc<dyn ValueProvider>> {
        self.provider.as_ref()
    }

    /// Whether this widget composes its descendants' data.
    pub fn is_container(&self) -> bool {
        self.container
    }
}

impl fmt::Debug for WidgetEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetEntry")
            .field("provider", &self.provider.as_ref().map(|p| p.provider_id()))
            .field("container", &self.container)
            .finish()
    }
}
