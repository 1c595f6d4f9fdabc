//! Conditional property registration.
//!
//! The [`DependencyRegistrar`] subscribes a recompute routine to the change
//! signal of every provider a conditional property's condition tree
//! references, and runs one initial evaluation as soon as registration
//! completes. The initial pass is what makes first-render state correct
//! when no referenced value ever changes.
//!
//! With `coalesce_recompute` enabled, change-triggered recomputes go through
//! a per-registration [`DeferredCall`], so a burst of synchronous changes
//! produces one recompute on the next event loop tick.
//!
//! Slots hold only weak handles to registration state. Dropping a
//! registration disconnects its slots and cancels pending recomputes.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use horizon_weave_core::logging::targets;
use horizon_weave_core::{ConnectionId, DeferredCall, EventLoop, ObjectId};
use parking_lot::Mutex;

use crate::condition::ConditionGroup;
use crate::config::WeaveConfig;
use crate::evaluator::ConditionEvaluator;
use crate::provider::{RevisionGate, ValueProvider};
use crate::reference::BoundReferences;

/// Callback invoked with the outcome of a recompute.
pub type Action = Arc<dyn Fn() + Send + Sync>;

/// A widget property derived from a condition tree.
#[derive(Debug, Clone)]
pub struct ConditionalProperty {
    /// Widget that owns the property.
    pub owner: String,
    /// Property name, e.g. `disabled`.
    pub property: String,
    /// The condition tree. Never mutated once built.
    pub root: Arc<ConditionGroup>,
}

impl ConditionalProperty {
    /// Create a conditional property.
    pub fn new(owner: impl Into<String>, property: impl Into<String>, root: ConditionGroup) -> Self {
        Self {
            owner: owner.into(),
            property: property.into(),
            root: Arc::new(root),
        }
    }
}

type Key = (String, String);

struct Subscription {
    provider: Arc<dyn ValueProvider>,
    changed: ConnectionId,
    refreshed: Option<ConnectionId>,
}

struct RegistrationState {
    property: ConditionalProperty,
    bound: BoundReferences,
    evaluator: ConditionEvaluator,
    on_true: Action,
    on_false: Action,
    outcome: Mutex<Option<bool>>,
    recomputes: Mutex<usize>,
    deferred: Option<DeferredCall>,
}

impl RegistrationState {
    fn trigger(self: &Arc<Self>) {
        match &self.deferred {
            Some(deferred) => {
                let weak = Arc::downgrade(self);
                deferred.schedule(move || {
                    if let Some(state) = weak.upgrade() {
                        state.recompute();
                    }
                });
            }
            None => self.recompute(),
        }
    }

    /// Evaluate and apply. On error the last outcome is kept.
    fn recompute(&self) {
        *self.recomputes.lock() += 1;
        let result = self.evaluator.evaluate(&self.property.root, &self.bound);
        match result {
            Ok(outcome) => {
                *self.outcome.lock() = Some(outcome);
                tracing::debug!(
                    target: targets::REGISTRAR,
                    owner = %self.property.owner,
                    property = %self.property.property,
                    outcome,
                    "conditional property recomputed"
                );
                if outcome {
                    (self.on_true)();
                } else {
                    (self.on_false)();
                }
            }
            Err(error) => {
                tracing::warn!(
                    target: targets::REGISTRAR,
                    owner = %self.property.owner,
                    property = %self.property.property,
                    condition = %self.property.root,
                    %error,
                    "conditional property recompute skipped"
                );
            }
        }
    }
}

struct Registration {
    state: Arc<RegistrationState>,
    subscriptions: Vec<Subscription>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        for sub in self.subscriptions.drain(..) {
            sub.provider.value_changed().disconnect(sub.changed);
            if let Some(id) = sub.refreshed {
                sub.provider.data_refreshed().disconnect(id);
            }
        }
        if let Some(deferred) = &self.state.deferred {
            deferred.cancel();
        }
    }
}

/// Wires conditional properties to the change events of the widgets they
/// reference.
pub struct DependencyRegistrar {
    config: WeaveConfig,
    event_loop: EventLoop,
    registrations: Mutex<HashMap<Key, Registration>>,
}

impl DependencyRegistrar {
    /// Create a registrar that defers through `event_loop`.
    pub fn new(config: WeaveConfig, event_loop: EventLoop) -> Self {
        Self {
            config,
            event_loop,
            registrations: Mutex::new(HashMap::new()),
        }
    }

    /// Register `property` and run its initial evaluation.
    ///
    /// Registering a property that is already registered for the same owner
    /// replaces the earlier registration, so a second call never doubles
    /// the subscriptions.
    pub fn register(
        &self,
        property: ConditionalProperty,
        bound: BoundReferences,
        on_true: Action,
        on_false: Action,
    ) {
        let key = (property.owner.clone(), property.property.clone());
        if self.unregister(&key.0, &key.1) {
            tracing::debug!(
                target: targets::REGISTRAR,
                owner = %key.0,
                property = %key.1,
                "replacing existing registration"
            );
        }

        let deferred = self
            .config
            .coalesce_recompute
            .then(|| DeferredCall::new(self.event_loop.clone(), self.config.defer_delay()));
        let state = Arc::new(RegistrationState {
            property,
            bound,
            evaluator: ConditionEvaluator::new(self.config.clone()),
            on_true,
            on_false,
            outcome: Mutex::new(None),
            recomputes: Mutex::new(0),
            deferred,
        });

        let mut subscriptions = Vec::new();
        for (bound, row_scoped) in state.bound.providers() {
            if !row_scoped {
                let weak: Weak<RegistrationState> = Arc::downgrade(&state);
                let changed = bound.provider.value_changed().connect(move |_| {
                    if let Some(state) = weak.upgrade() {
                        state.trigger();
                    }
                });
                subscriptions.push(Subscription {
                    provider: bound.provider,
                    changed,
                    refreshed: None,
                });
                continue;
            }

            // Row-scoped: one trigger per provider mutation, whichever
            // signal arrives first.
            let gate = Arc::new(RevisionGate::new());
            let slot = {
                let weak: Weak<RegistrationState> = Arc::downgrade(&state);
                let provider: Weak<dyn ValueProvider> = Arc::downgrade(&bound.provider);
                move || {
                    let (Some(state), Some(provider)) = (weak.upgrade(), provider.upgrade()) else {
                        return;
                    };
                    if gate.admit(provider.as_ref()) {
                        state.trigger();
                    }
                }
            };
            let on_change = slot.clone();
            let changed = bound.provider.value_changed().connect(move |_| on_change());
            let refreshed = Some(bound.provider.data_refreshed().connect(move |_| slot()));
            subscriptions.push(Subscription {
                provider: bound.provider,
                changed,
                refreshed,
            });
        }

        tracing::debug!(
            target: targets::REGISTRAR,
            owner = %key.0,
            property = %key.1,
            subscriptions = subscriptions.len(),
            "registered conditional property"
        );
        self.registrations.lock().insert(
            key,
            Registration {
                state: state.clone(),
                subscriptions,
            },
        );

        // Initial pass, synchronous and independent of any change event.
        state.recompute();
    }

    /// Remove one registration. Returns `true` if it existed.
    pub fn unregister(&self, owner: &str, property: &str) -> bool {
        let removed = self
            .registrations
            .lock()
            .remove(&(owner.to_string(), property.to_string()));
        removed.is_some()
    }

    /// Remove every registration owned by `owner`.
    pub fn unregister_owner(&self, owner: &str) -> usize {
        self.remove_where(|key, _| key.0 == owner)
    }

    /// Remove every registration that references `widget`.
    pub fn unregister_involving(&self, widget: ObjectId) -> usize {
        self.remove_where(|_, registration| registration.state.bound.involves(widget))
    }

    fn remove_where(&self, mut predicate: impl FnMut(&Key, &Registration) -> bool) -> usize {
        let removed: Vec<Registration> = {
            let mut registrations = self.registrations.lock();
            let keys: Vec<Key> = registrations
                .iter()
                .filter(|(key, registration)| predicate(key, registration))
                .map(|(key, _)| key.clone())
                .collect();
            keys.iter()
                .filter_map(|key| registrations.remove(key))
                .collect()
        };
        // Dropped outside the lock.
        removed.len()
    }

    /// The outcome of the most recent successful evaluation.
    pub fn last_outcome(&self, owner: &str, property: &str) -> Option<bool> {
        let registrations = self.registrations.lock();
        let registration = registrations.get(&(owner.to_string(), property.to_string()))?;
        *registration.state.outcome.lock()
    }

    /// How many times a registration has been recomputed, the initial pass
    /// included.
    pub fn recompute_count(&self, owner: &str, property: &str) -> Option<usize> {
        let registrations = self.registrations.lock();
        let registration = registrations.get(&(owner.to_string(), property.to_string()))?;
        Some(*registration.state.recomputes.lock())
    }

    /// Whether a property is registered.
    pub fn is_registered(&self, owner: &str, property: &str) -> bool {
        self.registrations
            .lock()
            .contains_key(&(owner.to_string(), property.to_string()))
    }

    /// Number of registrations.
    pub fn registration_count(&self) -> usize {
        self.registrations.lock().len()
    }
}

impl fmt::Debug for DependencyRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyRegistrar")
            .field("registrations", &self.registration_count())
            .field("coalesce", &self.config.coalesce_recompute)
            .finish()
    }
}
