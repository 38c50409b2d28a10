//! Real-time push to connected clients.

use std::sync::{Arc, Mutex, PoisonError};

use common::UserId;
use domain::NotificationEvent;

/// Delivers notification events to live connections.
pub trait PushChannel: Send + Sync {
    /// Pushes to the user's private channel, or to every connection when
    /// `user_id` is `None`. Delivery is best effort.
    fn push(&self, user_id: Option<UserId>, event: &NotificationEvent);
}

/// In-memory push channel for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPushChannel {
    pushed: Arc<Mutex<Vec<(Option<UserId>, NotificationEvent)>>>,
}

impl InMemoryPushChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events pushed so far with their target.
    pub fn pushed(&self) -> Vec<(Option<UserId>, NotificationEvent)> {
        self.pushed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events pushed to `user_id`'s private channel.
    pub fn pushed_to(&self, user_id: UserId) -> Vec<NotificationEvent> {
        self.pushed()
            .into_iter()
            .filter(|(target, _)| *target == Some(user_id))
            .map(|(_, event)| event)
            .collect()
    }
}

impl PushChannel for InMemoryPushChannel {
    fn push(&self, user_id: Option<UserId>, event: &NotificationEvent) {
        self.pushed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((user_id, event.clone()));
    }
}
