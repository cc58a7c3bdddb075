//! In-process publish/subscribe for ingestion job milestones.

mod bus;
mod event;

pub use bus::{Delivery, ListenerError, NotificationBus, SubscriptionId, SyncListener};
pub use event::{SyncEvent, SyncEventKind};
