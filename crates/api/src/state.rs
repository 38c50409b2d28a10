//! Shared application state.

use std::sync::Arc;

use store::CommerceStore;
use workflow::{Collaborators, Commerce, Mailer, StoreDirectory};

use crate::auth::{HasAuth, JwtAuth};
use crate::hub::NotificationHub;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub commerce: Commerce<S>,
    pub auth: JwtAuth,
    pub hub: NotificationHub,
}

impl<S> AppState<S>
where
    S: CommerceStore + Clone + 'static,
{
    /// Wires the workflows to `store`, pushing through a fresh hub.
    pub fn new(store: S, auth: JwtAuth, mailer: Arc<dyn Mailer>, admin_email: String) -> Self {
        let hub = NotificationHub::new();
        let collaborators = Collaborators {
            directory: Arc::new(StoreDirectory::new(store.clone())),
            mailer,
            push: Arc::new(hub.clone()),
            admin_email,
        };
        Self {
            commerce: Commerce::new(store, collaborators),
            auth,
            hub,
        }
    }
}

impl<S> HasAuth for Arc<AppState<S>> {
    fn auth(&self) -> &JwtAuth {
        &self.auth
    }
}
