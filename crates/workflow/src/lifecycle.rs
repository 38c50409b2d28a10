//! Order status updates, cancellation and tracking.

use std::sync::Arc;

use common::{OrderId, UserId};
use domain::{Order, OrderStatus, PaymentStatus, Role, TrackingEntry};
use store::{CommerceStore, OrderTransition};

use crate::dispatcher::{Dispatch, NotificationDispatcher};
use crate::error::{Result, WorkflowError};

/// Drives orders through their status machine after placement.
pub struct OrderLifecycle<S> {
    store: S,
    dispatcher: Arc<NotificationDispatcher<S>>,
}

impl<S> OrderLifecycle<S>
where
    S: CommerceStore + Clone + 'static,
{
    pub fn new(store: S, dispatcher: Arc<NotificationDispatcher<S>>) -> Self {
        Self { store, dispatcher }
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("order", order_id))
    }

    pub async fn get(&self, order_id: OrderId) -> Result<Order> {
        self.load(order_id).await
    }

    /// Admin status update along `pending → confirmed → shipped → delivered`.
    ///
    /// `payment_status` may mark the order paid; refunds only happen through
    /// cancellation. The owner is notified when the order ships or arrives.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Order> {
        if payment_status == Some(PaymentStatus::Refunded) {
            return Err(WorkflowError::Validation(
                "Refunds are issued by cancelling the order".to_string(),
            ));
        }

        let order = self.load(order_id).await?;
        let next = order.status.advance_to(status)?;

        let commit = self
            .store
            .transition_order(OrderTransition {
                order_id,
                expected_status: order.status,
                status: next,
                payment_status: payment_status.unwrap_or(order.payment_status),
                restock: Vec::new(),
                tracking: TrackingEntry::new(order_id, next, format!("Order {next}")),
            })
            .await?;
        let order = commit.order;

        metrics::counter!("order_status_updates_total", "status" => next.as_str()).increment(1);
        tracing::info!(%order_id, status = %next, "order status updated");

        if next.notifies_owner() {
            let message = format!("Your order {order_id} has been {next}");
            let body = order.summary(&message);
            self.dispatcher
                .dispatch(
                    Dispatch::to_user(order.user_id, message)
                        .reference(order_id)
                        .with_email_body(body),
                )
                .await;
        }

        Ok(order)
    }

    /// Owner cancellation. Restocks every line and refunds a paid order.
    ///
    /// The commit is conditional on the status read here, so concurrent
    /// cancels restock once and the loser gets a conflict.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        let order = self.load(order_id).await?;
        if !order.is_owned_by(user_id) {
            return Err(WorkflowError::Forbidden(
                "Not authorized to cancel this order".to_string(),
            ));
        }
        let (status, payment_status) = order.cancellation()?;

        let commit = self
            .store
            .transition_order(OrderTransition {
                order_id,
                expected_status: order.status,
                status,
                payment_status,
                restock: order.stock_lines(),
                tracking: TrackingEntry::new(order_id, status, "Order cancelled by user"),
            })
            .await?;
        let order = commit.order;

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(%order_id, restocked = commit.inventories.len(), "order cancelled");

        let message = format!("Your order {order_id} has been cancelled");
        let body = order.summary(&message);
        self.dispatcher
            .dispatch(
                Dispatch::to_user(user_id, message)
                    .reference(order_id)
                    .with_email_body(body),
            )
            .await;

        Ok(order)
    }

    /// Orders of a user, newest first.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.store.list_orders_for_user(user_id).await?)
    }

    /// All orders, newest first.
    pub async fn list_all(&self) -> Result<Vec<Order>> {
        Ok(self.store.list_all_orders().await?)
    }

    /// Tracking timeline, oldest first. Visible to the owner and admins.
    pub async fn tracking(
        &self,
        order_id: OrderId,
        requester: UserId,
        role: Role,
    ) -> Result<Vec<TrackingEntry>> {
        let order = self.load(order_id).await?;
        if role != Role::Admin && !order.is_owned_by(requester) {
            return Err(WorkflowError::Forbidden(
                "Not authorized to view this order".to_string(),
            ));
        }
        Ok(self.store.list_tracking(order_id).await?)
    }
}
