//! Checkout, order status and tracking endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::{DomainError, Order, OrderStatus, PaymentStatus, TrackingEntry};
use serde::{Deserialize, Serialize};
use store::CommerceStore;
use workflow::CheckoutRequest;

use super::parse_id;
use crate::auth::{AdminUser, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: String,
    pub payment_status: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: OrderId,
    pub message: &'static str,
}

/// POST /orders — check out the caller's cart. The body is optional.
#[tracing::instrument(skip(state, body), fields(user_id = %user.user_id))]
pub async fn create<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    body: Bytes,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let request: CheckoutRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CheckoutRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid checkout request: {e}")))?
    };

    let order = state
        .commerce
        .checkout
        .create_order(user.user_id, request)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order_id: order.id,
            message: "Order placed successfully",
        }),
    ))
}

/// GET /orders — the caller's orders, newest first.
pub async fn list_mine<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(
        state.commerce.orders.list_for_user(user.user_id).await?,
    ))
}

/// GET /orders/all
pub async fn list_all<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.commerce.orders.list_all().await?))
}

/// GET /orders/{id} — visible to the owner and admins.
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = state.commerce.orders.get(order_id).await?;
    if !user.is_admin() && !order.is_owned_by(user.user_id) {
        return Err(ApiError::Forbidden(
            "Not authorized to view this order".to_string(),
        ));
    }
    Ok(Json(order))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state), fields(user_id = %user.user_id))]
pub async fn cancel<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = state
        .commerce
        .orders
        .cancel_order(user.user_id, order_id)
        .await?;
    Ok(Json(order))
}

/// PUT /orders/{id}/status
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let status: OrderStatus = req.status.parse().map_err(DomainError::from)?;
    let payment_status: Option<PaymentStatus> = req
        .payment_status
        .as_deref()
        .map(str::parse::<PaymentStatus>)
        .transpose()
        .map_err(DomainError::from)?;

    let order = state
        .commerce
        .orders
        .update_status(order_id, status, payment_status)
        .await?;
    Ok(Json(order))
}

/// GET /order-tracking/{orderId} — timeline, oldest first.
pub async fn tracking<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<TrackingEntry>>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let entries = state
        .commerce
        .orders
        .tracking(order_id, user.user_id, user.role)
        .await?;
    Ok(Json(entries))
}
