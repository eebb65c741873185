//! Listener registry with revocable subscriptions
//!
//! Listeners live in an arena of `Arc` records keyed by a stable id.
//! Dispatch iterates a snapshot taken under a short read lock, so listeners
//! may subscribe or unsubscribe from inside a callback. An unsubscribe takes
//! effect for the next dispatch, never for the one already in progress.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::error;

use crate::callbacks::run_guarded;

/// Events carry a routing key used by type-filtered listeners
pub trait RoutedEvent: Send + Sync + 'static {
    fn route_key(&self) -> &str;
}

/// Listener callback. Returning an error (or panicking) counts as a failure.
pub type Listener<E> = dyn Fn(&E) -> anyhow::Result<()> + Send + Sync;

/// Observer told about listener failures. If it fails itself, dispatch of
/// the current event stops.
pub type ErrorObserver<E> = dyn Fn(&E, &anyhow::Error) -> anyhow::Result<()> + Send + Sync;

/// What happens after a listener fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventErrorPolicy {
    /// Stop delivering the event to the remaining listeners
    #[default]
    PropagateAndLog,
    /// Keep delivering the event to every listener
    SuppressAndLog,
}

struct ListenerEntry<E> {
    id: u64,
    filter: Option<String>,
    callback: Arc<Listener<E>>,
}

impl<E: RoutedEvent> ListenerEntry<E> {
    fn accepts(&self, key: &str) -> bool {
        self.filter.as_deref().is_none_or(|filter| filter == key)
    }
}

trait RevokeListener: Send + Sync {
    fn revoke(&self, id: u64) -> bool;
    fn contains(&self, id: u64) -> bool;
}

/// Handle returned by every subscribe call.
///
/// Dropping it leaves the listener registered; call [`unsubscribe`](Self::unsubscribe).
pub struct Subscription {
    id: u64,
    set: Weak<dyn RevokeListener>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the listener. Returns false if it was already removed.
    pub fn unsubscribe(&self) -> bool {
        self.set.upgrade().is_some_and(|set| set.revoke(self.id))
    }

    pub fn is_active(&self) -> bool {
        self.set.upgrade().is_some_and(|set| set.contains(self.id))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Counters describing one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners that were called
    pub invoked: usize,
    /// Listeners that failed
    pub failed: usize,
    /// Whether delivery stopped before every listener ran
    pub halted: bool,
}

/// Concurrent set of listeners for one event type family
pub struct ListenerSet<E> {
    next_id: AtomicU64,
    entries: RwLock<Vec<Arc<ListenerEntry<E>>>>,
}

impl<E: RoutedEvent> ListenerSet<E> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        })
    }

    /// Register a listener for every event, or for one event type.
    pub fn subscribe(self: &Arc<Self>, filter: Option<String>, callback: Arc<Listener<E>>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().push(Arc::new(ListenerEntry {
            id,
            filter,
            callback,
        }));
        let set: Weak<dyn RevokeListener> = Arc::downgrade(self) as Weak<dyn RevokeListener>;
        Subscription { id, set }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every listener
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn snapshot(&self, key: &str) -> Vec<Arc<ListenerEntry<E>>> {
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.accepts(key))
            .cloned()
            .collect()
    }

    /// Deliver `event` to the listeners registered right now.
    pub fn dispatch(
        &self,
        event: &E,
        policy: EventErrorPolicy,
        observer: Option<&ErrorObserver<E>>,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        for entry in self.snapshot(event.route_key()) {
            report.invoked += 1;
            let Err(err) = run_guarded(|| (entry.callback)(event)) else {
                continue;
            };
            report.failed += 1;
            error!(
                "event listener {} failed on '{}': {:#}",
                entry.id,
                event.route_key(),
                err
            );

            if let Some(observer) = observer {
                if let Err(observer_err) = run_guarded(|| observer(event, &err)) {
                    error!(
                        "event error handler failed on '{}', stopping dispatch: {:#}",
                        event.route_key(),
                        observer_err
                    );
                    report.halted = true;
                    break;
                }
            }

            if policy == EventErrorPolicy::PropagateAndLog {
                report.halted = true;
                break;
            }
        }

        report
    }
}

impl<E: RoutedEvent> RevokeListener for ListenerSet<E> {
    fn revoke(&self, id: u64) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    fn contains(&self, id: u64) -> bool {
        self.entries.read().iter().any(|entry| entry.id == id)
    }
}
