use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use serde::Serialize;
use tracing::{debug, error, warn};

use super::event::SyncEvent;

/// Handle returned by [`NotificationBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Failure reported by a listener. Logged by the bus, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("listener rejected event: {0}")]
    Rejected(String),
    #[error("listener unavailable: {0}")]
    Unavailable(String),
}

/// Observer of job milestones.
pub trait SyncListener: Send + Sync {
    fn on_event(&self, event: &SyncEvent) -> Result<(), ListenerError>;
}

impl<F> SyncListener for F
where
    F: Fn(&SyncEvent) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_event(&self, event: &SyncEvent) -> Result<(), ListenerError> {
        self(event)
    }
}

/// Per-publish delivery tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// Synchronous, best-effort, in-process event bus.
///
/// The bus only keeps weak references: a listener lives exactly as long as the caller keeps its
/// `Arc` alive, and dropped listeners are pruned on the next publish. Construct one per process
/// and share it by `Arc`.
#[derive(Default)]
pub struct NotificationBus {
    listeners: RwLock<BTreeMap<SubscriptionId, Weak<dyn SyncListener>>>,
    next_id: AtomicU64,
}

impl fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscriptions", &self.read_listeners().len())
            .finish()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<L>(&self, listener: &Arc<L>) -> SubscriptionId
    where
        L: SyncListener + 'static,
    {
        let erased: Arc<dyn SyncListener> = listener.clone();
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.write_listeners().insert(id, Arc::downgrade(&erased));
        debug!(subscription_id = %id, "listener subscribed");
        id
    }

    /// Returns `false` when the handle was unknown or already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.write_listeners().remove(&id).is_some();
        if removed {
            debug!(subscription_id = %id, "listener unsubscribed");
        }
        removed
    }

    /// Number of subscriptions whose listener is still alive.
    pub fn subscriber_count(&self) -> usize {
        self.read_listeners()
            .values()
            .filter(|listener| listener.strong_count() > 0)
            .count()
    }

    /// Deliver `event` to every live listener registered at the time of the call.
    ///
    /// Listeners run on the caller's thread, outside the registry lock, so they may subscribe or
    /// unsubscribe while handling an event. An error or panic in one listener is logged and does
    /// not stop delivery to the rest.
    pub fn publish(&self, event: SyncEvent) -> Delivery {
        let targets: Vec<(SubscriptionId, Weak<dyn SyncListener>)> = self
            .read_listeners()
            .iter()
            .map(|(id, listener)| (*id, listener.clone()))
            .collect();

        let mut delivery = Delivery::default();
        let mut dropped = Vec::new();

        for (id, listener) in targets {
            let Some(listener) = listener.upgrade() else {
                dropped.push(id);
                continue;
            };

            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))) {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(err)) => {
                    delivery.failed += 1;
                    warn!(
                        subscription_id = %id,
                        job_id = %event.job_id,
                        kind = ?event.kind,
                        error = %err,
                        "listener failed to handle event"
                    );
                }
                Err(_) => {
                    delivery.failed += 1;
                    error!(
                        subscription_id = %id,
                        job_id = %event.job_id,
                        kind = ?event.kind,
                        "listener panicked while handling event"
                    );
                }
            }
        }

        if !dropped.is_empty() {
            let mut listeners = self.write_listeners();
            for id in dropped {
                if listeners
                    .get(&id)
                    .is_some_and(|listener| listener.strong_count() == 0)
                {
                    listeners.remove(&id);
                }
            }
        }

        delivery
    }

    fn read_listeners(
        &self,
    ) -> RwLockReadGuard<'_, BTreeMap<SubscriptionId, Weak<dyn SyncListener>>> {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_listeners(
        &self,
    ) -> RwLockWriteGuard<'_, BTreeMap<SubscriptionId, Weak<dyn SyncListener>>> {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::{JobId, JobKind, JobStatus};
    use crate::notifications::SyncEventKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<SyncEvent>>,
    }

    impl SyncListener for Recorder {
        fn on_event(&self, event: &SyncEvent) -> Result<(), ListenerError> {
            self.events.lock().expect("recorder poisoned").push(event.clone());
            Ok(())
        }
    }

    impl Recorder {
        fn kinds(&self) -> Vec<SyncEventKind> {
            self.events
                .lock()
                .expect("recorder poisoned")
                .iter()
                .map(|event| event.kind)
                .collect()
        }
    }

    fn started(id: &str) -> SyncEvent {
        SyncEvent::started(JobId(id.to_string()), JobKind::Upload)
    }

    #[test]
    fn delivers_to_every_subscriber() {
        let bus = NotificationBus::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        bus.subscribe(&first);
        bus.subscribe(&second);

        let delivery = bus.publish(started("job-000001"));

        assert_eq!(delivery, Delivery { delivered: 2, failed: 0 });
        assert_eq!(first.kinds(), vec![SyncEventKind::SyncStarted]);
        assert_eq!(second.kinds(), vec![SyncEventKind::SyncStarted]);
    }

    #[test]
    fn failing_and_panicking_listeners_do_not_block_others() {
        let bus = NotificationBus::new();
        let rejecting = Arc::new(|_: &SyncEvent| -> Result<(), ListenerError> {
            Err(ListenerError::Rejected("view closed".to_string()))
        });
        let panicking = Arc::new(|_: &SyncEvent| -> Result<(), ListenerError> {
            panic!("listener bug");
        });
        let healthy = Arc::new(Recorder::default());
        bus.subscribe(&rejecting);
        bus.subscribe(&panicking);
        bus.subscribe(&healthy);

        let delivery = bus.publish(started("job-000002"));

        assert_eq!(delivery, Delivery { delivered: 1, failed: 2 });
        assert_eq!(healthy.kinds(), vec![SyncEventKind::SyncStarted]);
    }

    #[test]
    fn unsubscribed_listener_stops_receiving() {
        let bus = NotificationBus::new();
        let recorder = Arc::new(Recorder::default());
        let id = bus.subscribe(&recorder);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(started("job-000003"));

        assert!(recorder.kinds().is_empty());
    }

    #[test]
    fn bus_does_not_keep_listeners_alive() {
        let bus = NotificationBus::new();
        let recorder = Arc::new(Recorder::default());
        bus.subscribe(&recorder);
        assert_eq!(bus.subscriber_count(), 1);

        drop(recorder);

        assert_eq!(bus.subscriber_count(), 0);
        let delivery = bus.publish(SyncEvent::completed(
            JobId("job-000004".to_string()),
            JobKind::Sync,
            JobStatus::Succeeded,
        ));
        assert_eq!(delivery, Delivery::default());
        assert!(bus.read_listeners().is_empty());
    }

    #[test]
    fn listeners_may_unsubscribe_while_handling() {
        let bus = Arc::new(NotificationBus::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let listener = {
            let bus = Arc::clone(&bus);
            let slot = Arc::clone(&slot);
            Arc::new(move |_: &SyncEvent| -> Result<(), ListenerError> {
                if let Some(id) = slot.lock().expect("slot poisoned").take() {
                    bus.unsubscribe(id);
                }
                Ok(())
            })
        };
        let id = bus.subscribe(&listener);
        *slot.lock().expect("slot poisoned") = Some(id);

        assert_eq!(bus.publish(started("job-000005")).delivered, 1);
        assert_eq!(bus.publish(started("job-000006")).delivered, 0);
    }
}
