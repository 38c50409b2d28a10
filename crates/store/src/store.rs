use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, CouponId, NotificationId, OrderId, ProductId, ReturnId, UserId};
use domain::{
    Cart, CartItem, Coupon, Inventory, Notification, Order, OrderReturn, OrderStatus, PaymentStatus,
    Product, ReturnStatus, StockAdjustment, StockLine, TrackingEntry, User,
};

use crate::Result;

/// Everything written when an order is placed.
///
/// Committed as one unit: stock deductions, the coupon usage increment, the
/// order with its lines, the first tracking entry and clearing the cart.
/// The cart must still hold exactly `cart_items` when the unit runs.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub order: Order,
    pub tracking: TrackingEntry,
    pub cart_id: CartId,
    /// The cart lines the order was built from.
    pub cart_items: Vec<CartItem>,
    pub coupon_id: Option<CouponId>,
}

/// A status change of an existing order.
#[derive(Debug, Clone)]
pub struct OrderTransition {
    pub order_id: OrderId,
    /// The status the order must still be in when the write lands.
    pub expected_status: OrderStatus,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Stock restored in the same unit (cancellation).
    pub restock: Vec<StockLine>,
    pub tracking: TrackingEntry,
}

/// Result of a committed [`OrderTransition`].
#[derive(Debug, Clone)]
pub struct OrderCommit {
    pub order: Order,
    pub inventories: Vec<Inventory>,
}

/// A status change of an existing return.
#[derive(Debug, Clone)]
pub struct ReturnTransition {
    pub return_id: ReturnId,
    pub expected_status: ReturnStatus,
    pub status: ReturnStatus,
    /// Stock restored in the same unit (approval).
    pub restock: Vec<StockLine>,
    /// Tracking entry appended to the returned order.
    pub tracking: Option<TrackingEntry>,
}

/// Result of a committed [`ReturnTransition`].
#[derive(Debug, Clone)]
pub struct ReturnCommit {
    pub order_return: OrderReturn,
    pub inventories: Vec<Inventory>,
}

/// Replacement issued for an approved return.
///
/// Committed as one unit: the new order is inserted, the original order is
/// marked replaced and the return is completed.
#[derive(Debug, Clone)]
pub struct CreateReplacement {
    pub return_id: ReturnId,
    pub replacement: Order,
    pub original_tracking: TrackingEntry,
    pub replacement_tracking: TrackingEntry,
}

/// Core trait for commerce store implementations.
///
/// All implementations must be thread-safe (Send + Sync). Operations that
/// touch more than one record are atomic; conditional writes re-check their
/// precondition at write time and fail without side effects when it no
/// longer holds.
#[async_trait]
pub trait CommerceStore: Send + Sync {
    // Catalog

    /// Stores a product together with its inventory record.
    async fn insert_product(
        &self,
        product: Product,
        stock: u32,
        low_stock: u32,
    ) -> Result<Inventory>;

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    async fn insert_user(&self, user: User) -> Result<()>;

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>>;

    // Inventory

    async fn get_inventory(&self, product_id: ProductId) -> Result<Option<Inventory>>;

    /// Deducts every line or none.
    ///
    /// Fails with `InsufficientStock` when any product has fewer units than
    /// requested at write time. Lines are normalized first so duplicate
    /// product entries are summed.
    async fn deduct_stock(&self, lines: &[StockLine]) -> Result<Vec<Inventory>>;

    /// Adds the lines back to stock, all or nothing.
    async fn restock(&self, lines: &[StockLine]) -> Result<Vec<Inventory>>;

    /// Applies an administrative adjustment. Stock never goes below zero.
    async fn adjust_stock(
        &self,
        product_id: ProductId,
        adjustment: StockAdjustment,
    ) -> Result<Inventory>;

    async fn set_low_stock_threshold(
        &self,
        product_id: ProductId,
        threshold: u32,
    ) -> Result<Inventory>;

    /// Inventories with `stock <= low_stock`, lowest stock first.
    async fn list_low_stock(&self) -> Result<Vec<Inventory>>;

    // Cart

    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>>;

    /// Inserts or replaces the user's cart and its lines.
    async fn save_cart(&self, cart: &Cart) -> Result<()>;

    // Coupons

    /// Stores a coupon. Codes are unique.
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()>;

    async fn get_coupon(&self, coupon_id: CouponId) -> Result<Option<Coupon>>;

    async fn get_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>>;

    /// Increments `used_count` only while it is below `usage_limit`.
    async fn increment_coupon_usage(&self, coupon_id: CouponId) -> Result<Coupon>;

    // Orders

    /// Commits a new order. Returns the inventories after deduction.
    ///
    /// Fails with `CartChanged` when the cart was checked out or edited
    /// after `cart_items` was read.
    async fn place_order(&self, place: PlaceOrder) -> Result<Vec<Inventory>>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Orders of a user, newest first.
    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// All orders, newest first.
    async fn list_all_orders(&self) -> Result<Vec<Order>>;

    /// Applies a status change if the order is still in `expected_status`.
    async fn transition_order(&self, transition: OrderTransition) -> Result<OrderCommit>;

    /// Tracking timeline of an order, oldest first.
    async fn list_tracking(&self, order_id: OrderId) -> Result<Vec<TrackingEntry>>;

    // Returns

    /// Stores a return. At most one return exists per order.
    async fn insert_return(&self, order_return: &OrderReturn) -> Result<()>;

    async fn get_return(&self, return_id: ReturnId) -> Result<Option<OrderReturn>>;

    async fn list_returns_for_user(&self, user_id: UserId) -> Result<Vec<OrderReturn>>;

    async fn list_all_returns(&self) -> Result<Vec<OrderReturn>>;

    /// Applies a status change if the return is still in `expected_status`.
    async fn transition_return(&self, transition: ReturnTransition) -> Result<ReturnCommit>;

    /// Issues a replacement for an approved return of a delivered order.
    ///
    /// Fails with `DuplicateReplacement` when the user already has a
    /// replacement order that is not cancelled.
    async fn create_replacement(&self, replacement: CreateReplacement) -> Result<Order>;

    // Notifications

    async fn insert_notification(&self, notification: &Notification) -> Result<()>;

    /// Records a successful email delivery.
    async fn mark_notification_delivered(
        &self,
        notification_id: NotificationId,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn get_notification(
        &self,
        notification_id: NotificationId,
    ) -> Result<Option<Notification>>;

    /// Notifications of a user, newest first.
    async fn list_notifications(
        &self,
        user_id: UserId,
        only_unread: bool,
        limit: usize,
    ) -> Result<Vec<Notification>>;

    async fn count_unread(&self, user_id: UserId) -> Result<u64>;

    async fn mark_notification_read(
        &self,
        notification_id: NotificationId,
        at: DateTime<Utc>,
    ) -> Result<Notification>;

    /// Marks every unread notification of the user read. Returns how many changed.
    async fn mark_all_read(&self, user_id: UserId, at: DateTime<Utc>) -> Result<u64>;
}
