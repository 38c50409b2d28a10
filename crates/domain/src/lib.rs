//! Domain layer for the commerce backend.
//!
//! This crate holds the records and rules of the order lifecycle:
//! - Money and catalog records
//! - Carts with price snapshots
//! - Coupon applicability and discount computation
//! - Inventory records and stock adjustment rules
//! - Order aggregate with its status machine
//! - Return requests with their status machine
//! - Notification records
//!
//! Nothing here performs I/O; persistence lives in the `store` crate and
//! coordination in the `workflow` crate.

pub mod cart;
pub mod catalog;
pub mod coupon;
pub mod error;
pub mod inventory;
pub mod money;
pub mod notification;
pub mod order;
pub mod returns;

pub use cart::{Cart, CartItem};
pub use catalog::{Product, Role, User};
pub use coupon::{Coupon, CouponError, CouponRejection, DiscountType, NewCoupon};
pub use error::DomainError;
pub use inventory::{
    AdjustOp, DEFAULT_LOW_STOCK, Inventory, InventoryError, StockAdjustment, StockLine,
    normalize_lines,
};
pub use money::Money;
pub use notification::{DeliveryStatus, Notification, NotificationEvent, NotificationKind};
pub use order::{Order, OrderError, OrderItem, OrderStatus, PaymentStatus, Pricing, TrackingEntry};
pub use returns::{OrderReturn, ReturnError, ReturnStatus};
