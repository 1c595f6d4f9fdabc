//! Reactive properties for Horizon Weave.
//!
//! A [`Property<T>`] owns a value together with the [`Signal`] that announces
//! changes to it. Widgets keep their current value in a property so that
//! every mutation path (user input, programmatic setters, propagated live
//! references) produces exactly one change notification.
//!
//! # Example
//!
//! ```
//! use horizon_weave_core::Property;
//!
//! let text = Property::new(String::from("a"));
//! text.changed().connect(|value| println!("now {value}"));
//!
//! assert!(text.set("b".to_string()));
//! assert!(!text.set("b".to_string()));
//! ```

use std::fmt;

use parking_lot::RwLock;

use crate::logging::targets;
use crate::signal::Signal;

/// A value cell with change detection and change notification.
///
/// The write lock is released before the change signal is emitted, so slots
/// may read the property (or set it again) while handling the notification.
pub struct Property<T> {
    value: RwLock<T>,
    changed: Signal<T>,
}

impl<T: Clone + Send + Sync + 'static> Property<T> {
    /// Create a new property with an initial value.
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
            changed: Signal::new(),
        }
    }

    /// Get the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// The signal emitted with the new value after every effective change.
    pub fn changed(&self) -> &Signal<T> {
        &self.changed
    }

    /// Set the value without change notification.
    pub fn set_silent(&self, value: T) {
        *self.value.write() = value;
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Property<T> {
    /// Set the value, returning `true` if the value changed.
    ///
    /// [`changed`](Self::changed) is emitted only when this returns `true`.
    pub fn set(&self, value: T) -> bool {
        self.replace(value).is_some()
    }

    /// Set the value, returning the old value if it changed.
    pub fn replace(&self, value: T) -> Option<T> {
        let old = {
            let mut current = self.value.write();
            if *current == value {
                return None;
            }
            std::mem::replace(&mut *current, value.clone())
        };
        tracing::trace!(target: targets::PROPERTY, "property changed");
        self.changed.emit(value);
        Some(old)
    }
}

impl<T: Clone + Default + Send + Sync + 'static> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("value", &self.get())
            .field("connections", &self.changed.connection_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_property_set_detects_change() {
        let prop = Property::new(10);

        assert!(!prop.set(10));
        assert_eq!(prop.get(), 10);

        assert!(prop.set(20));
        assert_eq!(prop.get(), 20);
    }

    #[test]
    fn test_property_emits_only_on_change() {
        let prop = Property::new(String::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        prop.changed().connect(move |v: &String| seen_clone.lock().push(v.clone()));

        prop.set("a".into());
        prop.set("a".into());
        prop.set("b".into());
        prop.set_silent("c".into());

        assert_eq!(*seen.lock(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(prop.get(), "c");
    }

    #[test]
    fn test_property_replace() {
        let prop = Property::new("hello".to_string());

        assert!(prop.replace("hello".to_string()).is_none());
        assert_eq!(prop.replace("world".to_string()), Some("hello".to_string()));
        assert_eq!(prop.get(), "world");
    }

    #[test]
    fn test_slot_can_read_property_during_notification() {
        let prop = Arc::new(Property::new(1));
        let observed = Arc::new(Mutex::new(None));

        let prop_clone = prop.clone();
        let observed_clone = observed.clone();
        prop.changed().connect(move |_| {
            *observed_clone.lock() = Some(prop_clone.get());
        });

        prop.set(7);
        assert_eq!(*observed.lock(), Some(7));
    }
}
