//! Live notification fan-out to WebSocket connections.
//!
//! Each user with an open connection has a private broadcast room; system
//! notifications go to a global channel every connection listens on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use common::UserId;
use domain::NotificationEvent;
use tokio::sync::broadcast;
use workflow::PushChannel;

/// Buffered events per room before slow receivers start lagging.
const ROOM_CAPACITY: usize = 64;

/// Receivers for one connection.
pub struct Subscription {
    pub user: broadcast::Receiver<NotificationEvent>,
    pub global: broadcast::Receiver<NotificationEvent>,
}

/// In-process registry of per-user rooms.
#[derive(Clone)]
pub struct NotificationHub {
    rooms: Arc<Mutex<HashMap<UserId, broadcast::Sender<NotificationEvent>>>>,
    global: broadcast::Sender<NotificationEvent>,
}

impl NotificationHub {
    pub fn new() -> Self {
        let (global, _) = broadcast::channel(ROOM_CAPACITY);
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            global,
        }
    }

    /// Joins `user_id`'s room and the global channel.
    pub fn subscribe(&self, user_id: UserId) -> Subscription {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        rooms.retain(|_, sender| sender.receiver_count() > 0);
        let user = rooms
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe();
        Subscription {
            user,
            global: self.global.subscribe(),
        }
    }

    /// Number of live connections for `user_id`.
    pub fn connections(&self, user_id: UserId) -> usize {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PushChannel for NotificationHub {
    fn push(&self, user_id: Option<UserId>, event: &NotificationEvent) {
        let delivered = match user_id {
            Some(user_id) => {
                let rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
                rooms
                    .get(&user_id)
                    .is_some_and(|room| room.send(event.clone()).is_ok())
            }
            None => self.global.send(event.clone()).is_ok(),
        };

        if !delivered {
            tracing::debug!(user_id = ?user_id, notification_id = %event.id, "no live connection for push");
        }
    }
}
