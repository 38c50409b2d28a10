//! Shared identifier types used across the commerce crates.

pub mod types;

pub use types::{CartId, CouponId, NotificationId, OrderId, ProductId, ReturnId, UserId};
