use common::{CartId, CouponId, OrderId, ProductId, UserId};
use domain::InventoryError;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A conditional stock decrement found too few units.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// A stock line carried a zero quantity.
    #[error("Quantity for product {product_id} must be greater than 0")]
    InvalidQuantity { product_id: ProductId },

    /// The coupon's usage limit was reached before the increment.
    #[error("Coupon {coupon_id} has reached its usage limit")]
    CouponExhausted { coupon_id: CouponId },

    /// A return already exists for the order.
    #[error("Return already requested for order {order_id}")]
    DuplicateReturn { order_id: OrderId },

    /// The user already holds an active replacement order.
    #[error("Replacement already created for user {user_id}")]
    DuplicateReplacement { user_id: UserId },

    /// The cart no longer holds the lines an order was built from.
    #[error("Cart {cart_id} changed during checkout")]
    CartChanged { cart_id: CartId },

    /// A coupon with the same code exists.
    #[error("Coupon code already exists: {code}")]
    DuplicateCouponCode { code: String },

    /// The record changed between read and write.
    ///
    /// The expected-state analogue of an optimistic concurrency conflict.
    #[error("{entity} {id} is {actual}, expected {expected}")]
    StaleState {
        entity: &'static str,
        id: String,
        expected: String,
        actual: String,
    },

    /// A stored value could not be decoded.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<InventoryError> for StoreError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InsufficientStock {
                product_id,
                requested,
                available,
            } => StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            InventoryError::InvalidQuantity { product_id } => {
                StoreError::InvalidQuantity { product_id }
            }
        }
    }
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn stale(
        entity: &'static str,
        id: impl ToString,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        StoreError::StaleState {
            entity,
            id: id.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
