//! The caller's cart.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ProductId;
use domain::{Cart, Money};
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use super::parse_id;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct CartResponse {
    #[serde(flatten)]
    pub cart: Cart,
    pub total: Money,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        let total = cart.total();
        Self { cart, total }
    }
}

/// GET /cart
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.commerce.checkout.get_cart(user.user_id).await?;
    Ok(Json(cart.into()))
}

/// POST /cart/items — add a line at the product's current price.
#[tracing::instrument(skip(state, req), fields(user_id = %user.user_id))]
pub async fn add_item<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .commerce
        .checkout
        .add_to_cart(user.user_id, req.product_id, req.quantity)
        .await?;
    Ok(Json(cart.into()))
}

/// DELETE /cart/items/{productId}
pub async fn remove_item<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    Path(product_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let product_id: ProductId = parse_id(&product_id, "product")?;
    let cart = state
        .commerce
        .checkout
        .remove_from_cart(user.user_id, product_id)
        .await?;
    Ok(Json(cart.into()))
}
