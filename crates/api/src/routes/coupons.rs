//! Coupon creation and validation.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::{Coupon, Money, NewCoupon};
use serde::Deserialize;
use store::CommerceStore;
use workflow::CouponValidation;

use crate::auth::{AdminUser, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCouponRequest {
    pub code: String,
    pub cart_total: Money,
}

/// POST /coupons
#[tracing::instrument(skip(state, new))]
pub async fn create<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    Json(new): Json<NewCoupon>,
) -> Result<(StatusCode, Json<Coupon>), ApiError> {
    let coupon = state.commerce.coupons.create(new).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// POST /coupons/validate — never consumes a use.
pub async fn validate<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _user: AuthUser,
    Json(req): Json<ValidateCouponRequest>,
) -> Result<Json<CouponValidation>, ApiError> {
    let validation = state
        .commerce
        .coupons
        .validate(&req.code, req.cart_total)
        .await?;
    Ok(Json(validation))
}
