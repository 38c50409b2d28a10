//! Admin inventory endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ProductId;
use domain::{Inventory, StockAdjustment};
use serde::Deserialize;
use store::CommerceStore;

use super::parse_id;
use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ThresholdRequest {
    pub threshold: u32,
}

/// GET /inventory/low-stock
pub async fn low_stock<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> Result<Json<Vec<Inventory>>, ApiError> {
    Ok(Json(state.commerce.inventory.list_low_stock().await?))
}

/// GET /inventory/{productId}
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Inventory>, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    Ok(Json(state.commerce.inventory.get(product_id).await?))
}

/// PUT /inventory/{productId}/adjust — `{op, value}`; decrements clamp at zero.
#[tracing::instrument(skip(state))]
pub async fn adjust<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(adjustment): Json<StockAdjustment>,
) -> Result<Json<Inventory>, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    let inventory = state
        .commerce
        .inventory
        .adjust(product_id, adjustment)
        .await?;
    Ok(Json(inventory))
}

/// PUT /inventory/{productId}/threshold
#[tracing::instrument(skip(state, req))]
pub async fn set_threshold<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(req): Json<ThresholdRequest>,
) -> Result<Json<Inventory>, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    let inventory = state
        .commerce
        .inventory
        .set_threshold(product_id, req.threshold)
        .await?;
    Ok(Json(inventory))
}
