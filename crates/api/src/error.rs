//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, OrderError, ReturnError};
use workflow::WorkflowError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing, malformed or expired credentials.
    Unauthorized(String),
    /// Authenticated but not allowed.
    Forbidden(String),
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Workflow failure.
    Workflow(WorkflowError),
    /// Internal server error.
    Internal(String),
}

const INTERNAL_MESSAGE: &str = "internal server error";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Workflow(err) => workflow_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn workflow_error_to_response(err: WorkflowError) -> (StatusCode, String) {
    let status = match &err {
        WorkflowError::Validation(_)
        | WorkflowError::EmptyCart
        | WorkflowError::InvalidCoupon(_)
        | WorkflowError::CouponExhausted
        | WorkflowError::InsufficientStock { .. }
        | WorkflowError::OrderNotDelivered
        | WorkflowError::NotApproved => StatusCode::BAD_REQUEST,
        WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
        WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
        WorkflowError::DuplicateReturn
        | WorkflowError::DuplicateReplacement
        | WorkflowError::Conflict(_) => StatusCode::CONFLICT,
        WorkflowError::Domain(domain_err) => domain_status(domain_err),
        WorkflowError::Store(store_err) => {
            tracing::error!(error = %store_err, "store failure");
            return (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string());
        }
    };
    (status, err.to_string())
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Order(
            OrderError::InvalidStatusTransition { .. } | OrderError::NotCancellable { .. },
        ) => StatusCode::CONFLICT,
        DomainError::Return(ReturnError::InvalidTransition { .. }) => StatusCode::CONFLICT,
        DomainError::Order(_)
        | DomainError::Return(_)
        | DomainError::Coupon(_)
        | DomainError::Inventory(_) => StatusCode::BAD_REQUEST,
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        ApiError::Workflow(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Workflow(WorkflowError::Domain(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;
    use domain::{OrderStatus, ReturnStatus};

    fn status_of(err: WorkflowError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_business_errors_are_client_errors() {
        assert_eq!(status_of(WorkflowError::EmptyCart), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(WorkflowError::CouponExhausted),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(WorkflowError::InsufficientStock {
                product_id: ProductId::new(),
                requested: 2,
                available: 1,
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(WorkflowError::Forbidden("no".to_string())),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_conflicts() {
        assert_eq!(
            status_of(WorkflowError::DuplicateReturn),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(WorkflowError::DuplicateReplacement),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                OrderError::NotCancellable {
                    current: OrderStatus::Delivered
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                ReturnError::InvalidTransition {
                    current: ReturnStatus::Rejected,
                    requested: ReturnStatus::Approved,
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                OrderError::ReservedStatus {
                    requested: OrderStatus::Cancelled
                }
                .into()
            ),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let response = ApiError::Internal("db exploded".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
