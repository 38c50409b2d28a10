//! Coupon validation, application and creation.

use chrono::Utc;
use common::CouponId;
use domain::{Coupon, CouponRejection, Money, NewCoupon};
use serde::Serialize;
use store::CommerceStore;

use crate::error::{Result, WorkflowError};

/// Outcome of validating a coupon against a cart total.
///
/// An inapplicable coupon is reported here, not as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponValidation {
    pub valid: bool,
    pub discount: Money,
    pub coupon_id: Option<CouponId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CouponValidation {
    fn accepted(coupon_id: CouponId, discount: Money) -> Self {
        Self {
            valid: true,
            discount,
            coupon_id: Some(coupon_id),
            reason: None,
        }
    }

    fn rejected(coupon_id: Option<CouponId>, rejection: CouponRejection) -> Self {
        Self {
            valid: false,
            discount: Money::zero(),
            coupon_id,
            reason: Some(rejection.to_string()),
        }
    }
}

/// Applies the coupon rules against stored coupons.
#[derive(Clone)]
pub struct CouponEvaluator<S> {
    store: S,
}

impl<S> CouponEvaluator<S>
where
    S: CommerceStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Validates `code` against `cart_total` without consuming a use.
    pub async fn validate(&self, code: &str, cart_total: Money) -> Result<CouponValidation> {
        let Some(coupon) = self.store.get_coupon_by_code(code.trim()).await? else {
            return Ok(CouponValidation::rejected(None, CouponRejection::NotFound));
        };
        Ok(match coupon.evaluate(cart_total, Utc::now()) {
            Ok(discount) => CouponValidation::accepted(coupon.id, discount),
            Err(rejection) => CouponValidation::rejected(Some(coupon.id), rejection),
        })
    }

    /// Resolves a coupon by id or code and computes its discount for checkout.
    ///
    /// Fails with `InvalidCoupon` when the coupon is unknown or inapplicable.
    pub async fn resolve(
        &self,
        coupon_id: Option<CouponId>,
        code: Option<&str>,
        cart_total: Money,
    ) -> Result<Option<(Coupon, Money)>> {
        let coupon = match (coupon_id, code) {
            (Some(id), _) => self.store.get_coupon(id).await?,
            (None, Some(code)) if !code.trim().is_empty() => {
                self.store.get_coupon_by_code(code.trim()).await?
            }
            _ => return Ok(None),
        };
        let coupon = coupon
            .ok_or_else(|| WorkflowError::InvalidCoupon(CouponRejection::NotFound.to_string()))?;
        let discount = coupon
            .evaluate(cart_total, Utc::now())
            .map_err(|rejection| WorkflowError::InvalidCoupon(rejection.to_string()))?;
        Ok(Some((coupon, discount)))
    }

    /// Consumes one use of the coupon, failing once the limit is reached.
    #[tracing::instrument(skip(self))]
    pub async fn apply(&self, coupon_id: CouponId) -> Result<Coupon> {
        Ok(self.store.increment_coupon_usage(coupon_id).await?)
    }

    /// Creates a coupon from an admin definition. Codes are unique.
    #[tracing::instrument(skip(self, new), fields(code = %new.code))]
    pub async fn create(&self, new: NewCoupon) -> Result<Coupon> {
        let coupon = new.into_coupon()?;
        self.store.insert_coupon(&coupon).await?;
        tracing::info!(coupon_id = %coupon.id, "coupon created");
        Ok(coupon)
    }
}
