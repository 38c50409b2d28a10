//! User email lookup.

use async_trait::async_trait;
use common::UserId;
use store::CommerceStore;

/// Read-only lookup of a user's contact address.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// The user's email, or `None` when unknown or unset.
    async fn email_for(&self, user_id: UserId) -> Option<String>;
}

/// Directory backed by the store's user records.
#[derive(Clone)]
pub struct StoreDirectory<S> {
    store: S,
}

impl<S> StoreDirectory<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: CommerceStore> UserDirectory for StoreDirectory<S> {
    async fn email_for(&self, user_id: UserId) -> Option<String> {
        match self.store.get_user(user_id).await {
            Ok(user) => user.and_then(|u| u.email),
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "user lookup failed");
                None
            }
        }
    }
}
