//! Order status machine.

use serde::{Deserialize, Serialize};

use super::OrderError;

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// Pending ──► Confirmed ──► Shipped ──► Delivered ──► Replaced
///    │            │            │
///    └────────────┴────────────┴──► Cancelled
/// ```
///
/// Forward moves may skip intermediate statuses. `Cancelled` is reached only
/// through the owner's cancel flow and `Replaced` only through the
/// replacement flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order has been placed and stock deducted.
    #[default]
    Pending,

    /// Order accepted for fulfilment.
    Confirmed,

    /// Order handed to the carrier.
    Shipped,

    /// Order received by the customer. Returns may be requested from here.
    Delivered,

    /// Order was cancelled by its owner (terminal state).
    Cancelled,

    /// Order was superseded by a replacement order (terminal state).
    Replaced,
}

impl OrderStatus {
    /// Position along the fulfilment chain, if the status is on it.
    fn rank(&self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Confirmed => Some(1),
            OrderStatus::Shipped => Some(2),
            OrderStatus::Delivered => Some(3),
            OrderStatus::Cancelled | OrderStatus::Replaced => None,
        }
    }

    /// Returns true if an admin may move the order from `self` to `next`.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        match (self.rank(), next.rank()) {
            (Some(current), Some(target)) => target > current,
            _ => false,
        }
    }

    /// Validates an admin status update.
    pub fn advance_to(&self, next: OrderStatus) -> Result<OrderStatus, OrderError> {
        if matches!(next, OrderStatus::Cancelled | OrderStatus::Replaced) {
            return Err(OrderError::ReservedStatus { requested: next });
        }
        if !self.can_advance_to(next) {
            return Err(OrderError::InvalidStatusTransition {
                current: *self,
                requested: next,
            });
        }
        Ok(next)
    }

    /// Returns true if the owner may still cancel.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Shipped
        )
    }

    /// Returns true if a return may be requested.
    pub fn can_request_return(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }

    /// Returns true if the order can be replaced.
    pub fn can_replace(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }

    /// Returns true if moving into this status notifies the owner.
    pub fn notifies_owner(&self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Delivered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Replaced => "replaced",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "replaced" => Ok(OrderStatus::Replaced),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

/// Payment sub-state. `Refunded` is reached by cancelling a paid order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    /// Payment status after the order is cancelled.
    pub fn on_cancel(&self) -> PaymentStatus {
        match self {
            PaymentStatus::Paid => PaymentStatus::Refunded,
            other => *other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}
