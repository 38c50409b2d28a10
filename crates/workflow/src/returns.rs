//! Post-delivery returns and replacement orders.

use std::sync::Arc;

use common::{OrderId, ReturnId, UserId};
use domain::{Order, OrderReturn, OrderStatus, ReturnError, ReturnStatus, TrackingEntry};
use store::{CommerceStore, CreateReplacement, ReturnTransition, StoreError};

use crate::dispatcher::{Dispatch, NotificationDispatcher};
use crate::error::{Result, WorkflowError};

/// Return requests, their admin review, and replacement orders.
pub struct ReturnWorkflow<S> {
    store: S,
    dispatcher: Arc<NotificationDispatcher<S>>,
}

impl<S> ReturnWorkflow<S>
where
    S: CommerceStore + Clone + 'static,
{
    pub fn new(store: S, dispatcher: Arc<NotificationDispatcher<S>>) -> Self {
        Self { store, dispatcher }
    }

    async fn load_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("order", order_id))
    }

    async fn load_return(&self, return_id: ReturnId) -> Result<OrderReturn> {
        self.store
            .get_return(return_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("return", return_id))
    }

    /// Requests a return for a delivered order owned by `user_id`.
    #[tracing::instrument(skip(self, reason))]
    pub async fn request_return(
        &self,
        user_id: UserId,
        order_id: OrderId,
        reason: &str,
    ) -> Result<OrderReturn> {
        let order_return = OrderReturn::request(order_id, user_id, reason)?;

        let order = self.load_order(order_id).await?;
        if !order.is_owned_by(user_id) {
            return Err(WorkflowError::Forbidden(
                "Not authorized to return this order".to_string(),
            ));
        }
        if !order.status.can_request_return() {
            return Err(WorkflowError::OrderNotDelivered);
        }

        self.store.insert_return(&order_return).await?;
        metrics::counter!("returns_requested_total").increment(1);
        tracing::info!(return_id = %order_return.id, "return requested");

        self.dispatcher
            .dispatch(
                Dispatch::to_user(
                    user_id,
                    format!("Return request submitted for order {order_id}"),
                )
                .reference(order_return.id)
                .with_email(),
            )
            .await;

        Ok(order_return)
    }

    /// Admin review of a return.
    ///
    /// Setting the current status again is a no-op. Approval restocks the
    /// parent order's lines in the same commit as the status change.
    #[tracing::instrument(skip(self))]
    pub async fn update_return_status(
        &self,
        return_id: ReturnId,
        status: ReturnStatus,
    ) -> Result<OrderReturn> {
        if !status.is_admin_settable() {
            return Err(WorkflowError::Validation(format!(
                "Invalid return status: {status}"
            )));
        }

        let current = self.load_return(return_id).await?;
        if current.status == status {
            return Ok(current);
        }
        if !current.status.can_transition_to(status) {
            return Err(ReturnError::InvalidTransition {
                current: current.status,
                requested: status,
            }
            .into());
        }

        let (restock, tracking) = if status == ReturnStatus::Approved {
            let order = self.load_order(current.order_id).await?;
            let entry = TrackingEntry::new(
                order.id,
                order.status,
                "Return approved, items restocked",
            );
            (order.stock_lines(), Some(entry))
        } else {
            (Vec::new(), None)
        };

        let result = self
            .store
            .transition_return(ReturnTransition {
                return_id,
                expected_status: current.status,
                status,
                restock,
                tracking,
            })
            .await;

        let commit = match result {
            Ok(commit) => commit,
            // A concurrent reviewer already applied the same status.
            Err(StoreError::StaleState { .. }) => {
                let latest = self.load_return(return_id).await?;
                if latest.status == status {
                    return Ok(latest);
                }
                return Err(WorkflowError::Conflict(format!(
                    "Return {return_id} changed to {} concurrently",
                    latest.status
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let order_return = commit.order_return;

        metrics::counter!("returns_status_updates_total", "status" => status.as_str())
            .increment(1);
        tracing::info!(%return_id, %status, restocked = commit.inventories.len(), "return status updated");

        self.dispatcher
            .dispatch(
                Dispatch::to_user(
                    order_return.user_id,
                    format!(
                        "Your return request for order {} has been {status}",
                        order_return.order_id
                    ),
                )
                .reference(return_id)
                .with_email(),
            )
            .await;

        Ok(order_return)
    }

    /// Issues a confirmed replacement order for an approved return.
    ///
    /// No stock is deducted for the replacement.
    #[tracing::instrument(skip(self))]
    pub async fn create_replacement(&self, return_id: ReturnId) -> Result<Order> {
        let order_return = self.load_return(return_id).await?;
        if order_return.status != ReturnStatus::Approved {
            return Err(WorkflowError::NotApproved);
        }
        let original = self.load_order(order_return.order_id).await?;
        if !original.status.can_replace() {
            return Err(WorkflowError::OrderNotDelivered);
        }

        let replacement = original.replacement();
        let created = self
            .store
            .create_replacement(CreateReplacement {
                return_id,
                original_tracking: TrackingEntry::new(
                    original.id,
                    OrderStatus::Replaced,
                    format!("Order replaced by {}", replacement.id),
                ),
                replacement_tracking: TrackingEntry::new(
                    replacement.id,
                    replacement.status,
                    format!("Replacement order created for {}", original.id),
                ),
                replacement,
            })
            .await?;

        metrics::counter!("replacements_created_total").increment(1);
        tracing::info!(
            %return_id,
            original_order_id = %original.id,
            replacement_order_id = %created.id,
            "replacement created"
        );

        let message = format!(
            "Replacement order {} created for order {}",
            created.id, original.id
        );
        let body = created.summary(&message);
        self.dispatcher
            .dispatch(
                Dispatch::to_user(created.user_id, message)
                    .reference(created.id)
                    .with_email_body(body),
            )
            .await;

        Ok(created)
    }

    /// Returns of a user, newest first.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<OrderReturn>> {
        Ok(self.store.list_returns_for_user(user_id).await?)
    }

    /// All returns, newest first.
    pub async fn list_all(&self) -> Result<Vec<OrderReturn>> {
        Ok(self.store.list_all_returns().await?)
    }
}
