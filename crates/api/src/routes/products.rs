//! Product seeding.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::{Inventory, Money, Product};
use serde::{Deserialize, Serialize};
use store::CommerceStore;
use workflow::NewProduct;

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub price: Money,
    pub sale_price: Option<Money>,
    #[serde(default)]
    pub stock: u32,
    pub low_stock: Option<u32>,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub product: Product,
    pub inventory: Inventory,
}

/// POST /products — create a product with its inventory record.
#[tracing::instrument(skip(state, req), fields(admin_id = %admin.0.user_id))]
pub async fn create<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    admin: AdminUser,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let (product, inventory) = state
        .commerce
        .inventory
        .register_product(NewProduct {
            name: req.name,
            price: req.price,
            sale_price: req.sale_price,
            stock: req.stock,
            low_stock: req.low_stock,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ProductResponse { product, inventory }),
    ))
}
