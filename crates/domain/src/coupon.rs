//! Coupon definitions and discount rules.

use chrono::{DateTime, Utc};
use common::CouponId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

/// How a coupon's `discount_value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// `discount_value` is a whole percent of the order total (1..=100).
    Percentage,
    /// `discount_value` is an amount in minor units.
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }
}

impl std::str::FromStr for DiscountType {
    type Err = CouponError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountType::Percentage),
            "fixed" => Ok(DiscountType::Fixed),
            other => Err(CouponError::UnknownDiscountType(other.to_string())),
        }
    }
}

/// Why a coupon cannot be applied to a given total.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("Invalid coupon")]
    NotFound,

    #[error("Invalid coupon")]
    Inactive,

    #[error("Coupon expired")]
    Expired,

    #[error("Coupon limit reached")]
    UsageLimitReached,

    #[error("Order too small for coupon (minimum {minimum})")]
    BelowMinimum { minimum: Money },
}

/// Errors in a coupon definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("Coupon code is required")]
    CodeRequired,

    #[error("Unknown discount type: {0}")]
    UnknownDiscountType(String),

    #[error("Percentage discount must be between 1 and 100, got {0}")]
    InvalidPercentage(i64),

    #[error("Fixed discount must be greater than 0, got {0}")]
    InvalidFixedAmount(i64),

    #[error("{field} must not be negative")]
    NegativeAmount { field: &'static str },

    #[error("Usage limit must be greater than 0")]
    InvalidUsageLimit,
}

/// A stored coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: CouponId,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub min_order_value: Option<Money>,
    pub max_discount: Option<Money>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    pub used_count: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Checks every applicability rule and returns the discount for `cart_total`.
    ///
    /// The discount never exceeds `max_discount` (when set) nor the total itself.
    pub fn evaluate(&self, cart_total: Money, now: DateTime<Utc>) -> Result<Money, CouponRejection> {
        if !self.is_active {
            return Err(CouponRejection::Inactive);
        }
        if let Some(expires_at) = self.expires_at
            && now > expires_at
        {
            return Err(CouponRejection::Expired);
        }
        if self.is_exhausted() {
            return Err(CouponRejection::UsageLimitReached);
        }
        if let Some(minimum) = self.min_order_value
            && cart_total < minimum
        {
            return Err(CouponRejection::BelowMinimum { minimum });
        }
        Ok(self.discount_for(cart_total))
    }

    /// Discount amount for `cart_total` ignoring applicability rules.
    pub fn discount_for(&self, cart_total: Money) -> Money {
        let raw = match self.discount_type {
            DiscountType::Percentage => cart_total.percent(self.discount_value),
            DiscountType::Fixed => Money::from_cents(self.discount_value),
        };
        let capped = match self.max_discount {
            Some(cap) => raw.min(cap),
            None => raw,
        };
        capped.min(cart_total).max(Money::zero())
    }

    /// True once `used_count` has reached `usage_limit`.
    pub fn is_exhausted(&self) -> bool {
        self.usage_limit
            .is_some_and(|limit| self.used_count >= limit)
    }
}

/// Admin input for creating a coupon.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCoupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub min_order_value: Option<Money>,
    pub max_discount: Option<Money>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
}

impl NewCoupon {
    /// Validates the definition and produces an active coupon with zero usage.
    pub fn into_coupon(self) -> Result<Coupon, CouponError> {
        let code = self.code.trim().to_string();
        if code.is_empty() {
            return Err(CouponError::CodeRequired);
        }
        match self.discount_type {
            DiscountType::Percentage if !(1..=100).contains(&self.discount_value) => {
                return Err(CouponError::InvalidPercentage(self.discount_value));
            }
            DiscountType::Fixed if self.discount_value <= 0 => {
                return Err(CouponError::InvalidFixedAmount(self.discount_value));
            }
            _ => {}
        }
        if self.min_order_value.is_some_and(|m| m.is_negative()) {
            return Err(CouponError::NegativeAmount {
                field: "minOrderValue",
            });
        }
        if self.max_discount.is_some_and(|m| m.is_negative()) {
            return Err(CouponError::NegativeAmount {
                field: "maxDiscount",
            });
        }
        if self.usage_limit == Some(0) {
            return Err(CouponError::InvalidUsageLimit);
        }

        Ok(Coupon {
            id: CouponId::new(),
            code,
            discount_type: self.discount_type,
            discount_value: self.discount_value,
            min_order_value: self.min_order_value,
            max_discount: self.max_discount,
            expires_at: self.expires_at,
            usage_limit: self.usage_limit,
            used_count: 0,
            is_active: true,
            created_at: Utc::now(),
        })
    }
}
