//! Cart management and cart-to-order conversion.

use std::sync::Arc;
use std::time::Instant;

use common::{CouponId, ProductId, UserId};
use domain::{Cart, CartItem, Money, Order, OrderStatus, TrackingEntry};
use serde::Deserialize;
use store::{CommerceStore, PlaceOrder};
use uuid::Uuid;

use crate::coupons::CouponEvaluator;
use crate::dispatcher::{Dispatch, NotificationDispatcher};
use crate::error::{Result, WorkflowError};
use crate::ledger::InventoryLedger;

/// Optional checkout inputs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub coupon_id: Option<CouponId>,
    pub coupon_code: Option<String>,
    pub shipping_address_id: Option<Uuid>,
}

/// Converts a user's cart into an order in one atomic commit.
pub struct CheckoutService<S> {
    store: S,
    coupons: CouponEvaluator<S>,
    ledger: Arc<InventoryLedger<S>>,
    dispatcher: Arc<NotificationDispatcher<S>>,
}

impl<S> CheckoutService<S>
where
    S: CommerceStore + Clone + 'static,
{
    pub fn new(
        store: S,
        ledger: Arc<InventoryLedger<S>>,
        dispatcher: Arc<NotificationDispatcher<S>>,
    ) -> Self {
        Self {
            coupons: CouponEvaluator::new(store.clone()),
            store,
            ledger,
            dispatcher,
        }
    }

    /// The user's cart, or an empty one if none exists yet.
    pub async fn get_cart(&self, user_id: UserId) -> Result<Cart> {
        Ok(self
            .store
            .get_cart(user_id)
            .await?
            .unwrap_or_else(|| Cart::new(user_id)))
    }

    /// Adds a product to the cart, snapshotting its current price.
    ///
    /// The combined quantity may not exceed the stock on hand.
    #[tracing::instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Cart> {
        if quantity == 0 {
            return Err(WorkflowError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("product", product_id))?;
        let inventory = self.ledger.get(product_id).await?;

        let mut cart = self.get_cart(user_id).await?;
        let requested = cart.quantity_of(product_id).saturating_add(quantity);
        if requested > inventory.stock {
            return Err(WorkflowError::InsufficientStock {
                product_id,
                requested,
                available: inventory.stock,
            });
        }

        let price = product.current_price();
        cart.add(CartItem::new(product_id, product.name, quantity, price));
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    pub async fn remove_from_cart(&self, user_id: UserId, product_id: ProductId) -> Result<Cart> {
        let mut cart = self
            .store
            .get_cart(user_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("cart", user_id))?;
        if !cart.remove(product_id) {
            return Err(WorkflowError::not_found("cart item", product_id));
        }
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Places an order from the user's cart.
    ///
    /// Stock deduction, coupon usage, the order with its first tracking entry
    /// and clearing the cart commit together; on any failure nothing changes.
    /// Notifications and low-stock alerts follow the commit and never fail it.
    #[tracing::instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn create_order(&self, user_id: UserId, request: CheckoutRequest) -> Result<Order> {
        let started = Instant::now();
        let result = self.place(user_id, request).await;
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_placed_total").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    final_amount = order.final_amount.cents(),
                    "order placed"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_failures_total").increment(1);
                tracing::warn!(error = %e, "checkout failed");
            }
        }
        result
    }

    async fn place(&self, user_id: UserId, request: CheckoutRequest) -> Result<Order> {
        let cart = self
            .store
            .get_cart(user_id)
            .await?
            .filter(|c| !c.is_empty())
            .ok_or(WorkflowError::EmptyCart)?;

        let items = Order::items_from_cart(&cart);
        let total = cart.total();

        let applied = self
            .coupons
            .resolve(request.coupon_id, request.coupon_code.as_deref(), total)
            .await?;
        let (coupon_id, discount) = match &applied {
            Some((coupon, discount)) => (Some(coupon.id), *discount),
            None => (None, Money::zero()),
        };

        let order = Order::place(
            user_id,
            items,
            discount,
            coupon_id,
            request.shipping_address_id,
        )?;

        let inventories = self
            .store
            .place_order(PlaceOrder {
                tracking: TrackingEntry::new(order.id, OrderStatus::Pending, "Order placed"),
                order: order.clone(),
                cart_id: cart.id,
                cart_items: cart.items.clone(),
                coupon_id,
            })
            .await?;

        self.ledger.alert_low_stock(&inventories);
        self.dispatcher
            .dispatch(
                Dispatch::to_user(
                    user_id,
                    format!("Your order {} has been placed successfully", order.id),
                )
                .reference(order.id)
                .with_email_body(order.summary("Your order has been placed successfully")),
            )
            .await;

        Ok(order)
    }
}
