//! Order aggregate and related types.

mod aggregate;
mod status;

pub use aggregate::{Order, OrderItem, Pricing, TrackingEntry};
pub use status::{OrderStatus, PaymentStatus};

use common::ProductId;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Invalid quantity.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// Status does not allow the requested move.
    #[error("Invalid status transition: cannot move order from {current} to {requested}")]
    InvalidStatusTransition {
        current: OrderStatus,
        requested: OrderStatus,
    },

    /// Status is only reachable through a dedicated workflow.
    #[error("Status {requested} cannot be set directly")]
    ReservedStatus { requested: OrderStatus },

    /// Order can no longer be cancelled.
    #[error("Order cannot be cancelled in {current} status")]
    NotCancellable { current: OrderStatus },

    /// Line subtotals or their sum do not fit the amount type.
    #[error("Order amount is too large")]
    AmountOverflow,

    /// Unrecognised status string.
    #[error("Unknown status: {0}")]
    UnknownStatus(String),
}
