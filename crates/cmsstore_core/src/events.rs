//! In-process notifications raised by repositories and services.
//!
//! # Invariants
//! - Handlers run in subscription order.
//! - Only cancelable notifications honour [`EventOutcome::Cancel`]; the
//!   first cancel stops dispatch.
//! - Post-write notifications are raised after the transaction committed.

use crate::model::content::Content;
use crate::model::node::ObjectType;
use crate::model::permission::EntityPermission;
use log::{debug, info};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub enum Notification<'a> {
    /// Raised before a save; handlers may cancel it.
    ContentSaving { content: &'a Content },
    ContentSaved { content: &'a Content },
    PermissionsAssigned { permissions: &'a [EntityPermission] },
    RecycleBinEmptied { object_type: ObjectType, deleted: usize },
}

impl Notification<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ContentSaving { .. } => "content_saving",
            Self::ContentSaved { .. } => "content_saved",
            Self::PermissionsAssigned { .. } => "permissions_assigned",
            Self::RecycleBinEmptied { .. } => "recycle_bin_emptied",
        }
    }

    pub fn is_cancelable(&self) -> bool {
        matches!(self, Self::ContentSaving { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventOutcome {
    #[default]
    Continue,
    Cancel,
}

pub type EventHandler = Arc<dyn Fn(&Notification<'_>) -> EventOutcome + Send + Sync>;

/// Fan-out of notifications to subscribed handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<Vec<EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        handler: impl Fn(&Notification<'_>) -> EventOutcome + Send + Sync + 'static,
    ) {
        self.handlers.write().push(Arc::new(handler));
    }

    /// Returns `Cancel` only for a cancelable notification a handler vetoed.
    pub fn dispatch(&self, notification: &Notification<'_>) -> EventOutcome {
        let handlers: Vec<EventHandler> = self.handlers.read().clone();
        debug!(
            "event=notification_dispatch module=events status=start name={} handlers={}",
            notification.name(),
            handlers.len()
        );
        for handler in handlers {
            if handler(notification) == EventOutcome::Cancel && notification.is_cancelable() {
                info!(
                    "event=notification_dispatch module=events status=cancelled name={}",
                    notification.name()
                );
                return EventOutcome::Cancel;
            }
        }
        EventOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::{EventDispatcher, EventOutcome, Notification};
    use crate::model::node::ObjectType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn cancel_is_ignored_for_non_cancelable_notifications() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(AtomicUsize::new(0));
        dispatcher.subscribe(|_| EventOutcome::Cancel);
        let counter = Arc::clone(&seen);
        dispatcher.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            EventOutcome::Continue
        });

        let outcome = dispatcher.dispatch(&Notification::RecycleBinEmptied {
            object_type: ObjectType::Document,
            deleted: 0,
        });
        assert_eq!(outcome, EventOutcome::Continue);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
