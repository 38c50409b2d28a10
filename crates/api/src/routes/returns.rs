//! Return requests and replacements.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{OrderId, ReturnId};
use domain::{DomainError, Order, OrderReturn, ReturnStatus};
use serde::Deserialize;
use store::CommerceStore;

use super::parse_id;
use crate::auth::{AdminUser, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestReturnRequest {
    pub order_id: OrderId,
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize)]
pub struct UpdateReturnStatusRequest {
    pub status: String,
}

/// POST /returns
#[tracing::instrument(skip(state, req), fields(user_id = %user.user_id))]
pub async fn request<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    Json(req): Json<RequestReturnRequest>,
) -> Result<(StatusCode, Json<OrderReturn>), ApiError> {
    let order_return = state
        .commerce
        .returns
        .request_return(user.user_id, req.order_id, &req.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(order_return)))
}

/// GET /returns/my
pub async fn list_mine<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<Json<Vec<OrderReturn>>, ApiError> {
    Ok(Json(
        state.commerce.returns.list_for_user(user.user_id).await?,
    ))
}

/// GET /returns/all
pub async fn list_all<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> Result<Json<Vec<OrderReturn>>, ApiError> {
    Ok(Json(state.commerce.returns.list_all().await?))
}

/// PUT /returns/{id}/status
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateReturnStatusRequest>,
) -> Result<Json<OrderReturn>, ApiError> {
    let return_id: ReturnId = parse_id(&id, "return")?;
    let status: ReturnStatus = req.status.parse().map_err(DomainError::from)?;
    let order_return = state
        .commerce
        .returns
        .update_return_status(return_id, status)
        .await?;
    Ok(Json(order_return))
}

/// POST /returns/{returnId}/replacement
#[tracing::instrument(skip(state))]
pub async fn create_replacement<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let return_id: ReturnId = parse_id(&id, "return")?;
    let order = state
        .commerce
        .returns
        .create_replacement(return_id)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}
