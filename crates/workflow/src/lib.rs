//! Workflows of the order lifecycle.
//!
//! This crate coordinates the store and the external collaborators:
//! 1. Cart management and checkout
//! 2. Admin status updates and owner cancellation
//! 3. Returns and replacement orders
//! 4. Stock mutation with low-stock alerts
//! 5. Notification fan-out over storage, push and email
//!
//! Each workflow commits through a single atomic store unit; notifications
//! and alerts run after the commit and never fail it.

pub mod checkout;
pub mod coupons;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod returns;
pub mod services;

use std::sync::Arc;

pub use checkout::{CheckoutRequest, CheckoutService};
pub use coupons::{CouponEvaluator, CouponValidation};
pub use dispatcher::{DEFAULT_LIST_LIMIT, Dispatch, EMAIL_SUBJECT, NotificationDispatcher};
pub use error::{Result, WorkflowError};
pub use ledger::{InventoryLedger, NewProduct};
pub use lifecycle::OrderLifecycle;
pub use returns::ReturnWorkflow;
pub use services::{
    Collaborators, Email, InMemoryMailer, InMemoryPushChannel, LogMailer, Mailer, PushChannel,
    StoreDirectory, UserDirectory,
};

use store::CommerceStore;

/// Every workflow wired to one store and one set of collaborators.
pub struct Commerce<S> {
    pub store: S,
    pub inventory: Arc<InventoryLedger<S>>,
    pub notifications: Arc<NotificationDispatcher<S>>,
    pub coupons: CouponEvaluator<S>,
    pub checkout: CheckoutService<S>,
    pub orders: OrderLifecycle<S>,
    pub returns: ReturnWorkflow<S>,
}

impl<S> Commerce<S>
where
    S: CommerceStore + Clone + 'static,
{
    pub fn new(store: S, collaborators: Collaborators) -> Self {
        let inventory = Arc::new(InventoryLedger::new(store.clone(), &collaborators));
        let notifications = Arc::new(NotificationDispatcher::new(store.clone(), &collaborators));
        Self {
            coupons: CouponEvaluator::new(store.clone()),
            checkout: CheckoutService::new(
                store.clone(),
                inventory.clone(),
                notifications.clone(),
            ),
            orders: OrderLifecycle::new(store.clone(), notifications.clone()),
            returns: ReturnWorkflow::new(store.clone(), notifications.clone()),
            inventory,
            notifications,
            store,
        }
    }
}
