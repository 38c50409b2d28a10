//! Workflow error types.

use common::ProductId;
use domain::{CouponError, DomainError, OrderError, ReturnError};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while running a workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// The referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The caller does not own the record.
    #[error("{0}")]
    Forbidden(String),

    /// Checkout with no cart or no cart items.
    #[error("Cart is empty")]
    EmptyCart,

    /// The supplied coupon does not apply.
    #[error("{0}")]
    InvalidCoupon(String),

    /// The coupon reached its usage limit before it could be applied.
    #[error("Coupon limit reached")]
    CouponExhausted,

    /// Not enough stock to satisfy a line.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Returns are only accepted for delivered orders.
    #[error("Only delivered orders can be returned or replaced")]
    OrderNotDelivered,

    /// A return already exists for the order.
    #[error("Return already requested for this order")]
    DuplicateReturn,

    /// The return must be approved first.
    #[error("Return is not approved")]
    NotApproved,

    /// The user already has an active replacement order.
    #[error("Replacement already created")]
    DuplicateReplacement,

    /// The record changed concurrently or the operation collides with existing data.
    #[error("{0}")]
    Conflict(String),

    /// Domain rule violation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Unexpected store failure.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl WorkflowError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        WorkflowError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => WorkflowError::NotFound { entity, id },
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => WorkflowError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            StoreError::InvalidQuantity { .. } => WorkflowError::Validation(err.to_string()),
            StoreError::CouponExhausted { .. } => WorkflowError::CouponExhausted,
            StoreError::DuplicateReturn { .. } => WorkflowError::DuplicateReturn,
            StoreError::DuplicateReplacement { .. } => WorkflowError::DuplicateReplacement,
            StoreError::DuplicateCouponCode { .. }
            | StoreError::StaleState { .. }
            | StoreError::CartChanged { .. } => {
                WorkflowError::Conflict(err.to_string())
            }
            other => WorkflowError::Store(other),
        }
    }
}

macro_rules! domain_error_from {
    ($($err:ty),*) => {
        $(
            impl From<$err> for WorkflowError {
                fn from(err: $err) -> Self {
                    WorkflowError::Domain(DomainError::from(err))
                }
            }
        )*
    };
}

domain_error_from!(OrderError, ReturnError, CouponError);

/// Convenience type alias for workflow results.
pub type Result<T> = std::result::Result<T, WorkflowError>;
