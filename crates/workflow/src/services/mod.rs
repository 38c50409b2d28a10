//! Collaborators injected into the workflows and their in-memory implementations.

pub mod directory;
pub mod mailer;
pub mod push;

use std::sync::Arc;

pub use directory::{StoreDirectory, UserDirectory};
pub use mailer::{Email, InMemoryMailer, LogMailer, Mailer};
pub use push::{InMemoryPushChannel, PushChannel};

/// External services the workflows depend on.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn UserDirectory>,
    pub mailer: Arc<dyn Mailer>,
    pub push: Arc<dyn PushChannel>,
    /// Recipient of low-stock alerts.
    pub admin_email: String,
}
