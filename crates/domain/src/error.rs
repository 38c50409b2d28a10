//! Domain error types.

use thiserror::Error;

use crate::coupon::CouponError;
use crate::inventory::InventoryError;
use crate::order::OrderError;
use crate::returns::ReturnError;

/// Errors raised by domain rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// An order rule was violated.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// A return rule was violated.
    #[error("Return error: {0}")]
    Return(#[from] ReturnError),

    /// A coupon definition is invalid.
    #[error("Coupon error: {0}")]
    Coupon(#[from] CouponError),

    /// A stock rule was violated.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),
}
