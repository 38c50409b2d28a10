//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{CouponId, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cart::Cart;
use crate::inventory::StockLine;
use crate::money::Money;

use super::{OrderError, OrderStatus, PaymentStatus};

/// A line of a placed order. Prices are a snapshot and never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl OrderItem {
    /// Creates an order line, computing `subtotal = unit_price * quantity`.
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id,
            product_name: product_name.into(),
            quantity,
            unit_price,
            subtotal: unit_price.multiply(quantity),
        }
    }
}

/// Amounts of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pricing {
    /// Sum of line subtotals.
    pub total: Money,
    /// Discount actually granted.
    pub discount: Money,
    /// `total - discount`, never negative.
    pub final_amount: Money,
}

impl Pricing {
    pub fn new(total: Money, discount: Money) -> Self {
        let discount = discount.min(total).max(Money::zero());
        Self {
            total,
            discount,
            final_amount: total.saturating_sub(discount),
        }
    }
}

/// An entry in an order's append-only tracking timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEntry {
    pub id: Uuid,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl TrackingEntry {
    pub fn new(order_id: OrderId, status: OrderStatus, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            status,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// Order aggregate root.
///
/// Line items and amounts are fixed at creation; only `status`,
/// `payment_status` and `updated_at` change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub coupon_id: Option<CouponId>,
    pub shipping_address_id: Option<Uuid>,
    pub is_replacement: bool,
    pub replaces_order_id: Option<OrderId>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a pending order from line items.
    ///
    /// `discount` is clamped so the final amount is never negative.
    pub fn place(
        user_id: UserId,
        items: Vec<OrderItem>,
        discount: Money,
        coupon_id: Option<CouponId>,
        shipping_address_id: Option<Uuid>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if let Some(item) = items.iter().find(|i| i.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id,
                quantity: item.quantity,
            });
        }

        let total = Self::checked_total(&items)?;
        let pricing = Pricing::new(total, discount);
        let now = Utc::now();

        Ok(Self {
            id: OrderId::new(),
            user_id,
            items,
            total_amount: pricing.total,
            discount_amount: pricing.discount,
            final_amount: pricing.final_amount,
            coupon_id,
            shipping_address_id,
            is_replacement: false,
            replaces_order_id: None,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// Sum of line subtotals, recomputed from unit prices with overflow checks.
    fn checked_total(items: &[OrderItem]) -> Result<Money, OrderError> {
        items.iter().try_fold(Money::zero(), |total, item| {
            item.unit_price
                .checked_mul(item.quantity)
                .and_then(|subtotal| total.checked_add(subtotal))
                .ok_or(OrderError::AmountOverflow)
        })
    }

    /// Converts a cart's lines into order lines, copying the price snapshots.
    pub fn items_from_cart(cart: &Cart) -> Vec<OrderItem> {
        cart.items
            .iter()
            .map(|i| OrderItem::new(i.product_id, i.product_name.clone(), i.quantity, i.price))
            .collect()
    }

    /// Builds the confirmed replacement for this order with identical lines
    /// and amounts.
    pub fn replacement(&self) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            user_id: self.user_id,
            items: self.items.clone(),
            total_amount: self.total_amount,
            discount_amount: self.discount_amount,
            final_amount: self.final_amount,
            coupon_id: None,
            shipping_address_id: self.shipping_address_id,
            is_replacement: true,
            replaces_order_id: Some(self.id),
            status: OrderStatus::Confirmed,
            payment_status: self.payment_status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Status and payment status after an owner cancellation.
    pub fn cancellation(&self) -> Result<(OrderStatus, PaymentStatus), OrderError> {
        if !self.status.can_cancel() {
            return Err(OrderError::NotCancellable {
                current: self.status,
            });
        }
        Ok((OrderStatus::Cancelled, self.payment_status.on_cancel()))
    }

    /// Quantities to deduct at creation or restore on cancel/return.
    pub fn stock_lines(&self) -> Vec<StockLine> {
        self.items
            .iter()
            .map(|i| StockLine::new(i.product_id, i.quantity))
            .collect()
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Human readable summary used in notification emails.
    pub fn summary(&self, title: &str) -> String {
        let lines: Vec<String> = self
            .items
            .iter()
            .map(|i| format!("- {} x {}", i.product_name, i.quantity))
            .collect();
        format!(
            "{title}\n\nOrder summary:\n{}\n\nTotal amount: {}\nCurrent status: {}\n",
            lines.join("\n"),
            self.final_amount,
            self.status.as_str().to_uppercase()
        )
    }
}
