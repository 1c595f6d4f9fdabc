//! Object tree for Horizon Weave.
//!
//! Provides the arena that mirrors the host widget tree:
//! - Stable object identifiers via slotmap storage
//! - Unique, human-readable widget names used by reference expressions
//! - Parent-child ownership with cascading destroy
//! - Per-widget visible/enabled state with ancestor propagation
//!
//! The tree is generic over its payload so the engine crate can attach its
//! own per-widget data (value providers, container markers) without this
//! crate knowing about them.
//!
//! # Key Types
//!
//! - [`ObjectTree`] - The arena
//! - [`ObjectId`] - Stable handle into the arena
//! - [`WidgetState`] - Own (non-inherited) visibility and enabled state

use std::collections::HashMap;
use std::fmt;

use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;

new_key_type! {
    /// A unique identifier for an object in the tree.
    ///
    /// An `ObjectId` stays valid until its object is destroyed.
    pub struct ObjectId;
}

/// Errors that can occur during object tree operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    /// The object ID is invalid or has been destroyed.
    InvalidObjectId,
    /// No object is registered under the given name.
    UnknownName(String),
    /// Another live object already uses this name.
    DuplicateName(String),
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidObjectId => write!(f, "Invalid or destroyed object ID"),
            Self::UnknownName(name) => write!(f, "No object named '{name}'"),
            Self::DuplicateName(name) => write!(f, "An object named '{name}' already exists"),
        }
    }
}

impl std::error::Error for ObjectError {}

/// Result type for object operations.
pub type ObjectResult<T> = std::result::Result<T, ObjectError>;

/// Widget state stored alongside each node.
///
/// This is the widget's own state; use
/// [`ObjectTree::is_effectively_visible`] to take ancestors into account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WidgetState {
    /// Whether the widget is visible.
    pub visible: bool,
    /// Whether the widget is enabled.
    pub enabled: bool,
}

impl Default for WidgetState {
    fn default() -> Self {
        Self {
            visible: true,
            enabled: true,
        }
    }
}

struct ObjectData<T> {
    name: String,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    state: WidgetState,
    payload: T,
}

/// A node removed by [`ObjectTree::destroy`].
#[derive(Debug)]
pub struct DestroyedObject<T> {
    /// The ID the node had.
    pub id: ObjectId,
    /// The node's name.
    pub name: String,
    /// The node's payload.
    pub payload: T,
}

/// Arena-backed tree of named objects.
pub struct ObjectTree<T> {
    objects: SlotMap<ObjectId, ObjectData<T>>,
    names: HashMap<String, ObjectId>,
}

impl<T> ObjectTree<T> {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            objects: SlotMap::with_key(),
            names: HashMap::new(),
        }
    }

    /// Insert a new object under `parent` (or as a root).
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        parent: Option<ObjectId>,
        payload: T,
    ) -> ObjectResult<ObjectId> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(ObjectError::DuplicateName(name));
        }
        if let Some(parent_id) = parent {
            if !self.objects.contains_key(parent_id) {
                return Err(ObjectError::InvalidObjectId);
            }
        }

        let id = self.objects.insert(ObjectData {
            name: name.clone(),
            parent,
            children: Vec::new(),
            state: WidgetState::default(),
            payload,
        });
        if let Some(parent_data) = parent.and_then(|p| self.objects.get_mut(p)) {
            parent_data.children.push(id);
        }
        tracing::trace!(target: targets::OBJECT, ?id, name = %name, "registered object");
        self.names.insert(name, id);
        Ok(id)
    }

    /// Remove an object and all its descendants.
    ///
    /// Returns the removed nodes children-first, so callers can tear down
    /// anything they attached to them in dependency order.
    #[tracing::instrument(skip(self), target = "horizon_weave_core::object", level = "trace")]
    pub fn destroy(&mut self, id: ObjectId) -> ObjectResult<Vec<DestroyedObject<T>>> {
        let order = self.depth_first_postorder(id)?;
        tracing::trace!(target: targets::OBJECT, ?id, count = order.len(), "destroying object tree");

        if let Some(parent_id) = self.objects.get(id).and_then(|d| d.parent) {
            if let Some(parent_data) = self.objects.get_mut(parent_id) {
                parent_data.children.retain(|&child| child != id);
            }
        }

        let mut removed = Vec::with_capacity(order.len());
        for object_id in order {
            if let Some(data) = self.objects.remove(object_id) {
                self.names.remove(&data.name);
                removed.push(DestroyedObject {
                    id: object_id,
                    name: data.name,
                    payload: data.payload,
                });
            }
        }
        Ok(removed)
    }

    /// Check if an object exists in the tree.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// Look up an object by name.
    pub fn find(&self, name: &str) -> Option<ObjectId> {
        self.names.get(name).copied()
    }

    /// Look up an object by name, failing if it does not exist.
    pub fn require(&self, name: &str) -> ObjectResult<ObjectId> {
        self.find(name)
            .ok_or_else(|| ObjectError::UnknownName(name.to_string()))
    }

    /// Get the object's name.
    pub fn name(&self, id: ObjectId) -> ObjectResult<&str> {
        self.objects
            .get(id)
            .map(|d| d.name.as_str())
            .ok_or(ObjectError::InvalidObjectId)
    }

    /// Get the object's payload.
    pub fn payload(&self, id: ObjectId) -> ObjectResult<&T> {
        self.objects
            .get(id)
            .map(|d| &d.payload)
            .ok_or(ObjectError::InvalidObjectId)
    }

    /// Get the parent of an object.
    pub fn parent(&self, id: ObjectId) -> ObjectResult<Option<ObjectId>> {
        self.objects
            .get(id)
            .map(|d| d.parent)
            .ok_or(ObjectError::InvalidObjectId)
    }

    /// Get the children of an object.
    pub fn children(&self, id: ObjectId) -> ObjectResult<&[ObjectId]> {
        self.objects
            .get(id)
            .map(|d| d.children.as_slice())
            .ok_or(ObjectError::InvalidObjectId)
    }

    /// Iterate over all root objects (objects with no parent).
    pub fn root_objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects
            .iter()
            .filter(|(_, data)| data.parent.is_none())
            .map(|(id, _)| id)
    }

    /// Get the number of objects in the tree.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    // =========================================================================
    // Widget state
    // =========================================================================

    /// Get the widget's own state.
    pub fn widget_state(&self, id: ObjectId) -> ObjectResult<WidgetState> {
        self.objects
            .get(id)
            .map(|d| d.state)
            .ok_or(ObjectError::InvalidObjectId)
    }

    /// Set the visible state for a widget.
    pub fn set_widget_visible(&mut self, id: ObjectId, visible: bool) -> ObjectResult<()> {
        let data = self.objects.get_mut(id).ok_or(ObjectError::InvalidObjectId)?;
        data.state.visible = visible;
        Ok(())
    }

    /// Set the enabled state for a widget.
    pub fn set_widget_enabled(&mut self, id: ObjectId, enabled: bool) -> ObjectResult<()> {
        let data = self.objects.get_mut(id).ok_or(ObjectError::InvalidObjectId)?;
        data.state.enabled = enabled;
        Ok(())
    }

    /// Check if a widget and all of its ancestors are visible.
    pub fn is_effectively_visible(&self, id: ObjectId) -> ObjectResult<bool> {
        self.all_on_path(id, |state| state.visible)
    }

    /// Check if a widget and all of its ancestors are enabled.
    pub fn is_effectively_enabled(&self, id: ObjectId) -> ObjectResult<bool> {
        self.all_on_path(id, |state| state.enabled)
    }

    fn all_on_path(&self, id: ObjectId, pred: impl Fn(&WidgetState) -> bool) -> ObjectResult<bool> {
        let mut current = Some(id);
        let mut first = true;
        while let Some(current_id) = current {
            let data = match self.objects.get(current_id) {
                Some(data) => data,
                None if first => return Err(ObjectError::InvalidObjectId),
                None => break,
            };
            if !pred(&data.state) {
                return Ok(false);
            }
            first = false;
            current = data.parent;
        }
        Ok(true)
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Depth-first post-order traversal: children recursively, then the node.
    pub fn depth_first_postorder(&self, id: ObjectId) -> ObjectResult<Vec<ObjectId>> {
        let mut result = Vec::new();
        self.postorder_into(id, &mut result)?;
        Ok(result)
    }

    fn postorder_into(&self, id: ObjectId, result: &mut Vec<ObjectId>) -> ObjectResult<()> {
        let data = self.objects.get(id).ok_or(ObjectError::InvalidObjectId)?;
        for &child_id in &data.children {
            self.postorder_into(child_id, result)?;
        }
        result.push(id);
        Ok(())
    }

    /// Post-order traversal of every root, roots in arena order.
    pub fn postorder_all(&self) -> Vec<ObjectId> {
        let mut roots: Vec<ObjectId> = self.root_objects().collect();
        roots.sort();
        let mut result = Vec::with_capacity(self.objects.len());
        for root in roots {
            // Roots come straight from the arena, so they are valid.
            let _ = self.postorder_into(root, &mut result);
        }
        result
    }
}

impl<T> Default for ObjectTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (ObjectTree<u32>, ObjectId, ObjectId, ObjectId, ObjectId) {
        let mut tree = ObjectTree::new();
        let root = tree.insert("form", None, 0).unwrap();
        let a = tree.insert("a", Some(root), 1).unwrap();
        let panel = tree.insert("panel", Some(root), 2).unwrap();
        let b = tree.insert("b", Some(panel), 3).unwrap();
        (tree, root, a, panel, b)
    }

    #[test]
    fn test_insert_and_find() {
        let (tree, root, a, _, _) = sample();
        assert_eq!(tree.find("a"), Some(a));
        assert_eq!(tree.name(root).unwrap(), "form");
        assert_eq!(*tree.payload(a).unwrap(), 1);
        assert_eq!(tree.parent(a).unwrap(), Some(root));
        assert!(tree.find("missing").is_none());
        assert_eq!(
            tree.require("missing"),
            Err(ObjectError::UnknownName("missing".into()))
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (mut tree, root, _, _, _) = sample();
        assert_eq!(
            tree.insert("a", Some(root), 9),
            Err(ObjectError::DuplicateName("a".into()))
        );
    }

    #[test]
    fn test_destroy_cascades_children_first() {
        let (mut tree, _, a, panel, b) = sample();
        let removed = tree.destroy(panel).unwrap();
        let names: Vec<_> = removed.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "panel"]);
        assert!(!tree.contains(b));
        assert!(tree.find("b").is_none());
        assert!(tree.contains(a));
        assert_eq!(tree.object_count(), 2);
    }

    #[test]
    fn test_traversal_orders() {
        let (tree, root, a, panel, b) = sample();
        assert_eq!(tree.depth_first_postorder(root).unwrap(), vec![a, b, panel, root]);
        assert_eq!(tree.depth_first_postorder(panel).unwrap(), vec![b, panel]);
        assert_eq!(tree.postorder_all(), vec![a, b, panel, root]);
    }

    #[test]
    fn test_effective_state() {
        let (mut tree, _, _, panel, b) = sample();
        assert!(tree.is_effectively_enabled(b).unwrap());

        tree.set_widget_enabled(panel, false).unwrap();
        assert!(!tree.is_effectively_enabled(b).unwrap());
        assert!(tree.widget_state(b).unwrap().enabled);

        tree.set_widget_visible(b, false).unwrap();
        assert!(!tree.is_effectively_visible(b).unwrap());
    }
}
