//! Live reference propagation.
//!
//! A live reference copies the value of a source widget into a target
//! widget whenever the source changes. Row-scoped sources also propagate on
//! every data refresh. Links form a directed graph that must stay acyclic;
//! a link that would close a cycle is rejected when it is bound.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use horizon_weave_core::logging::targets;
use horizon_weave_core::{ConnectionId, DeferredCall, EventLoop, ObjectId};
use parking_lot::Mutex;

use crate::config::WeaveConfig;
use crate::error::{Error, Result};
use crate::provider::{RevisionGate, ValueProvider};
use crate::reference::{BoundReference, Reference};

struct LinkState {
    source: BoundReference,
    target: BoundReference,
    reference: Reference,
    busy: AtomicBool,
    deferred: Option<DeferredCall>,
}

impl LinkState {
    fn trigger(self: &Arc<Self>) {
        match &self.deferred {
            Some(deferred) => {
                let weak = Arc::downgrade(self);
                deferred.schedule(move || {
                    if let Some(state) = weak.upgrade() {
                        state.propagate();
                    }
                });
            }
            None => self.propagate(),
        }
    }

    fn propagate(&self) {
        if self.busy.swap(true, Ordering::SeqCst) {
            tracing::trace!(
                target: targets::PROPAGATOR,
                source = %self.source.name,
                target_widget = %self.target.name,
                "re-entrant propagation skipped"
            );
            return;
        }

        let value = self.reference.read(self.source.provider.as_ref());
        if self.reference.only_if_not_empty && value.is_empty() {
            tracing::trace!(
                target: targets::PROPAGATOR,
                source = %self.source.name,
                target_widget = %self.target.name,
                "empty value not propagated"
            );
        } else {
            let changed = self.target.provider.set_value(value);
            tracing::debug!(
                target: targets::PROPAGATOR,
                source = %self.source.name,
                target_widget = %self.target.name,
                changed,
                "propagated live reference"
            );
        }
        self.busy.store(false, Ordering::SeqCst);
    }
}

struct Link {
    state: Arc<LinkState>,
    changed: ConnectionId,
    refreshed: Option<ConnectionId>,
}

impl Drop for Link {
    fn drop(&mut self) {
        let source = &self.state.source.provider;
        source.value_changed().disconnect(self.changed);
        if let Some(id) = self.refreshed {
            source.data_refreshed().disconnect(id);
        }
        if let Some(deferred) = &self.state.deferred {
            deferred.cancel();
        }
    }
}

/// Copies values along live references.
pub struct LiveReferencePropagator {
    config: WeaveConfig,
    event_loop: EventLoop,
    links: Mutex<HashMap<(ObjectId, ObjectId), Link>>,
}

impl LiveReferencePropagator {
    /// Create a propagator that defers through `event_loop`.
    pub fn new(config: WeaveConfig, event_loop: EventLoop) -> Self {
        Self {
            config,
            event_loop,
            links: Mutex::new(HashMap::new()),
        }
    }

    /// Link `source` to `target` and run one initial propagation.
    ///
    /// `reference` is the expression `source` was resolved from; its column,
    /// row and `only_if_not_empty` flag apply. Re-linking the same pair
    /// replaces the earlier link.
    ///
    /// # Errors
    ///
    /// [`Error::CyclicReference`] if the target already feeds the source,
    /// directly or transitively, or if source and target are the same widget.
    pub fn register(&self, source: BoundReference, target: BoundReference, reference: Reference) -> Result<()> {
        let key = (source.widget, target.widget);
        let state = {
            let mut links = self.links.lock();
            if let Some(path) = cycle_path(&links, &source, &target) {
                return Err(Error::CyclicReference { path });
            }
            // Replace without holding on to the old link inside the lock.
            let previous = links.remove(&key);
            drop(links);
            drop(previous);

            let deferred = self
                .config
                .coalesce_propagation
                .then(|| DeferredCall::new(self.event_loop.clone(), self.config.defer_delay()));
            Arc::new(LinkState {
                source,
                target,
                reference,
                busy: AtomicBool::new(false),
                deferred,
            })
        };

        let provider = &state.source.provider;
        let (changed, refreshed) = if state.reference.is_row_scoped() {
            // A reload that also moves the value triggers once.
            let gate = Arc::new(RevisionGate::new());
            let weak: Weak<LinkState> = Arc::downgrade(&state);
            let source: Weak<dyn ValueProvider> = Arc::downgrade(provider);
            let slot = move || {
                let (Some(state), Some(source)) = (weak.upgrade(), source.upgrade()) else {
                    return;
                };
                if gate.admit(source.as_ref()) {
                    state.trigger();
                }
            };
            let on_change = slot.clone();
            (
                provider.value_changed().connect(move |_| on_change()),
                Some(provider.data_refreshed().connect(move |_| slot())),
            )
        } else {
            let weak: Weak<LinkState> = Arc::downgrade(&state);
            let changed = provider.value_changed().connect(move |_| {
                if let Some(state) = weak.upgrade() {
                    state.trigger();
                }
            });
            (changed, None)
        };

        tracing::debug!(
            target: targets::PROPAGATOR,
            source = %state.source.name,
            target_widget = %state.target.name,
            reference = %state.reference,
            "registered live reference"
        );
        self.links.lock().insert(
            key,
            Link {
                state: state.clone(),
                changed,
                refreshed,
            },
        );

        state.propagate();
        Ok(())
    }

    /// Remove the link from `source` to `target`.
    pub fn unregister(&self, source: ObjectId, target: ObjectId) -> bool {
        let removed = self.links.lock().remove(&(source, target));
        removed.is_some()
    }

    /// Remove every link whose source or target is `widget`.
    pub fn unregister_involving(&self, widget: ObjectId) -> usize {
        let removed: Vec<Link> = {
            let mut links = self.links.lock();
            let keys: Vec<_> = links
                .keys()
                .filter(|(s, t)| *s == widget || *t == widget)
                .copied()
                .collect();
            keys.iter().filter_map(|k| links.remove(k)).collect()
        };
        removed.len()
    }

    /// Whether `source` is linked to `target`.
    pub fn has_link(&self, source: ObjectId, target: ObjectId) -> bool {
        self.links.lock().contains_key(&(source, target))
    }

    /// Number of links.
    pub fn link_count(&self) -> usize {
        self.links.lock().len()
    }
}

impl fmt::Debug for LiveReferencePropagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveReferencePropagator")
            .field("links", &self.link_count())
            .field("coalesce", &self.config.coalesce_propagation)
            .finish()
    }
}

/// The widget names along the cycle that linking `source -> target` would
/// close, starting and ending at `source`.
fn cycle_path(
    links: &HashMap<(ObjectId, ObjectId), Link>,
    source: &BoundReference,
    target: &BoundReference,
) -> Option<Vec<String>> {
    if source.widget == target.widget {
        return Some(vec![source.name.clone(), target.name.clone()]);
    }

    let mut edges: HashMap<ObjectId, Vec<(ObjectId, &str)>> = HashMap::new();
    for ((from, to), link) in links {
        edges
            .entry(*from)
            .or_default()
            .push((*to, link.state.target.name.as_str()));
    }

    // Depth-first search from the new target back to the new source.
    let mut stack: Vec<(ObjectId, Vec<String>)> = vec![(target.widget, vec![target.name.clone()])];
    let mut visited = vec![target.widget];
    while let Some((node, path)) = stack.pop() {
        if node == source.widget {
            let mut cycle = vec![source.name.clone()];
            cycle.extend(path);
            return Some(cycle);
        }
        for &(next, name) in edges.get(&node).map(Vec::as_slice).unwrap_or_default() {
            if !visited.contains(&next) {
                visited.push(next);
                let mut next_path = path.clone();
                next_path.push(name.to_string());
                stack.push((next, next_path));
            }
        }
    }
    None
}
