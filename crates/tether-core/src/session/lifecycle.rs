//! Client-wide session lifecycle notifications

use std::sync::Arc;

use super::events::LifecycleEvent;
use super::listeners::{DispatchReport, EventErrorPolicy, ListenerSet, Subscription};

/// Fan-out for `session.lifecycle` notifications.
///
/// A failing listener is logged and the remaining listeners still run.
pub struct LifecycleEvents {
    listeners: Arc<ListenerSet<LifecycleEvent>>,
}

impl LifecycleEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: ListenerSet::new(),
        })
    }

    /// Receive every lifecycle event.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&LifecycleEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listeners.subscribe(None, Arc::new(listener))
    }

    /// Receive lifecycle events of one type, e.g. `session.created`.
    pub fn subscribe_type<F>(&self, event_type: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&LifecycleEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listeners
            .subscribe(Some(event_type.into()), Arc::new(listener))
    }

    pub fn dispatch(&self, event: &LifecycleEvent) -> DispatchReport {
        self.listeners
            .dispatch(event, EventErrorPolicy::SuppressAndLog, None)
    }

    pub fn clear(&self) {
        self.listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::events::lifecycle_types;
    use parking_lot::Mutex;

    fn event(event_type: &str, session_id: &str) -> LifecycleEvent {
        LifecycleEvent {
            event_type: event_type.to_string(),
            session_id: session_id.to_string(),
            metadata: None,
        }
    }

    #[test]
    fn test_wildcard_and_typed_listeners() {
        let lifecycle = LifecycleEvents::new();
        let all = Arc::new(Mutex::new(Vec::new()));
        let created = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&all);
        lifecycle.subscribe(move |e| {
            sink.lock().push(e.event_type.clone());
            Ok(())
        });
        let sink = Arc::clone(&created);
        lifecycle.subscribe_type(lifecycle_types::CREATED, move |e| {
            sink.lock().push(e.session_id.clone());
            Ok(())
        });

        lifecycle.dispatch(&event(lifecycle_types::CREATED, "s1"));
        lifecycle.dispatch(&event(lifecycle_types::DELETED, "s1"));

        assert_eq!(
            *all.lock(),
            vec!["session.created".to_string(), "session.deleted".to_string()]
        );
        assert_eq!(*created.lock(), vec!["s1".to_string()]);
    }

    #[test]
    fn test_failing_listener_does_not_stop_others() {
        let lifecycle = LifecycleEvents::new();
        let reached = Arc::new(Mutex::new(false));

        lifecycle.subscribe(|_| Err(anyhow::anyhow!("broken listener")));
        let flag = Arc::clone(&reached);
        lifecycle.subscribe(move |_| {
            *flag.lock() = true;
            Ok(())
        });

        let report = lifecycle.dispatch(&event(lifecycle_types::UPDATED, "s2"));
        assert_eq!(report.failed, 1);
        assert!(*reached.lock());
    }
}
