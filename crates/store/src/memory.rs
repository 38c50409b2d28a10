use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CouponId, NotificationId, OrderId, ProductId, ReturnId, UserId};
use domain::{
    Cart, Coupon, Inventory, Notification, Order, OrderReturn, OrderStatus, Product,
    ReturnStatus, StockAdjustment, StockLine, TrackingEntry, User, normalize_lines,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{
        CommerceStore, CreateReplacement, OrderCommit, OrderTransition, PlaceOrder, ReturnCommit,
        ReturnTransition,
    },
};

#[derive(Default)]
struct State {
    products: HashMap<ProductId, Product>,
    users: HashMap<UserId, User>,
    inventory: HashMap<ProductId, Inventory>,
    carts: HashMap<UserId, Cart>,
    coupons: HashMap<CouponId, Coupon>,
    orders: HashMap<OrderId, Order>,
    tracking: HashMap<OrderId, Vec<TrackingEntry>>,
    returns: HashMap<ReturnId, OrderReturn>,
    notifications: Vec<Notification>,
}

impl State {
    /// Validates every line before touching any record.
    fn deduct(&mut self, lines: &[StockLine]) -> Result<Vec<Inventory>> {
        let lines = normalize_lines(lines)?;
        for line in &lines {
            let inventory = self
                .inventory
                .get(&line.product_id)
                .ok_or_else(|| StoreError::not_found("inventory", line.product_id))?;
            if inventory.stock < line.quantity {
                return Err(StoreError::InsufficientStock {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available: inventory.stock,
                });
            }
        }

        let mut updated = Vec::with_capacity(lines.len());
        for line in &lines {
            if let Some(inventory) = self.inventory.get_mut(&line.product_id) {
                inventory.deduct(line.quantity)?;
                updated.push(inventory.clone());
            }
        }
        Ok(updated)
    }

    fn restock(&mut self, lines: &[StockLine]) -> Result<Vec<Inventory>> {
        let lines = normalize_lines(lines)?;
        if let Some(missing) = lines
            .iter()
            .find(|l| !self.inventory.contains_key(&l.product_id))
        {
            return Err(StoreError::not_found("inventory", missing.product_id));
        }

        let mut updated = Vec::with_capacity(lines.len());
        for line in &lines {
            if let Some(inventory) = self.inventory.get_mut(&line.product_id) {
                inventory.restock(line.quantity);
                updated.push(inventory.clone());
            }
        }
        Ok(updated)
    }

    fn check_coupon(&self, coupon_id: CouponId) -> Result<()> {
        let coupon = self
            .coupons
            .get(&coupon_id)
            .ok_or_else(|| StoreError::not_found("coupon", coupon_id))?;
        if coupon.is_exhausted() {
            return Err(StoreError::CouponExhausted { coupon_id });
        }
        Ok(())
    }

    fn increment_coupon(&mut self, coupon_id: CouponId) -> Result<Coupon> {
        self.check_coupon(coupon_id)?;
        let coupon = self
            .coupons
            .get_mut(&coupon_id)
            .ok_or_else(|| StoreError::not_found("coupon", coupon_id))?;
        coupon.used_count += 1;
        Ok(coupon.clone())
    }

    fn append_tracking(&mut self, entry: TrackingEntry) {
        self.tracking.entry(entry.order_id).or_default().push(entry);
    }

    fn has_active_replacement(&self, user_id: UserId) -> bool {
        self.orders.values().any(|o| {
            o.user_id == user_id && o.is_replacement && o.status != OrderStatus::Cancelled
        })
    }
}

fn newest_first<T, F>(mut items: Vec<T>, created_at: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    items
}

/// In-memory store implementation for testing and local runs.
///
/// All state lives behind a single lock, so every multi-record operation is
/// atomic and conditional checks cannot interleave with other writers.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

}

#[async_trait]
impl CommerceStore for InMemoryStore {
    async fn insert_product(
        &self,
        product: Product,
        stock: u32,
        low_stock: u32,
    ) -> Result<Inventory> {
        let mut state = self.state.write().await;
        let mut inventory = Inventory::new(product.id, product.name.clone(), stock);
        inventory.low_stock = low_stock;
        state.inventory.insert(product.id, inventory.clone());
        state.products.insert(product.id, product);
        Ok(inventory)
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&product_id).cloned())
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        self.state.write().await.users.insert(user.id, user);
        Ok(())
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn get_inventory(&self, product_id: ProductId) -> Result<Option<Inventory>> {
        Ok(self.state.read().await.inventory.get(&product_id).cloned())
    }

    async fn deduct_stock(&self, lines: &[StockLine]) -> Result<Vec<Inventory>> {
        self.state.write().await.deduct(lines)
    }

    async fn restock(&self, lines: &[StockLine]) -> Result<Vec<Inventory>> {
        self.state.write().await.restock(lines)
    }

    async fn adjust_stock(
        &self,
        product_id: ProductId,
        adjustment: StockAdjustment,
    ) -> Result<Inventory> {
        let mut state = self.state.write().await;
        let inventory = state
            .inventory
            .get_mut(&product_id)
            .ok_or_else(|| StoreError::not_found("inventory", product_id))?;
        inventory.adjust(adjustment);
        Ok(inventory.clone())
    }

    async fn set_low_stock_threshold(
        &self,
        product_id: ProductId,
        threshold: u32,
    ) -> Result<Inventory> {
        let mut state = self.state.write().await;
        let inventory = state
            .inventory
            .get_mut(&product_id)
            .ok_or_else(|| StoreError::not_found("inventory", product_id))?;
        inventory.low_stock = threshold;
        inventory.updated_at = Utc::now();
        Ok(inventory.clone())
    }

    async fn list_low_stock(&self) -> Result<Vec<Inventory>> {
        let state = self.state.read().await;
        let mut low: Vec<Inventory> = state
            .inventory
            .values()
            .filter(|i| i.is_low())
            .cloned()
            .collect();
        low.sort_by_key(|i| i.stock);
        Ok(low)
    }

    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&user_id).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        self.state
            .write()
            .await
            .carts
            .insert(cart.user_id, cart.clone());
        Ok(())
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        let mut state = self.state.write().await;
        if state.coupons.values().any(|c| c.code == coupon.code) {
            return Err(StoreError::DuplicateCouponCode {
                code: coupon.code.clone(),
            });
        }
        state.coupons.insert(coupon.id, coupon.clone());
        Ok(())
    }

    async fn get_coupon(&self, coupon_id: CouponId) -> Result<Option<Coupon>> {
        Ok(self.state.read().await.coupons.get(&coupon_id).cloned())
    }

    async fn get_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(self
            .state
            .read()
            .await
            .coupons
            .values()
            .find(|c| c.code == code)
            .cloned())
    }

    async fn increment_coupon_usage(&self, coupon_id: CouponId) -> Result<Coupon> {
        self.state.write().await.increment_coupon(coupon_id)
    }

    async fn place_order(&self, place: PlaceOrder) -> Result<Vec<Inventory>> {
        let mut state = self.state.write().await;

        // Every check runs before the first mutation.
        let cart_unchanged = state
            .carts
            .values()
            .find(|c| c.id == place.cart_id)
            .is_some_and(|c| !c.is_empty() && c.has_lines(&place.cart_items));
        if !cart_unchanged {
            return Err(StoreError::CartChanged {
                cart_id: place.cart_id,
            });
        }
        if let Some(coupon_id) = place.coupon_id {
            state.check_coupon(coupon_id)?;
        }
        let inventories = state.deduct(&place.order.stock_lines())?;
        if let Some(coupon_id) = place.coupon_id {
            state.increment_coupon(coupon_id)?;
        }

        let order_id = place.order.id;
        state.orders.insert(order_id, place.order);
        state.append_tracking(place.tracking);
        if let Some(cart) = state.carts.values_mut().find(|c| c.id == place.cart_id) {
            cart.clear();
        }

        Ok(inventories)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let orders = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(orders, |o: &Order| o.created_at))
    }

    async fn list_all_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let orders = state.orders.values().cloned().collect();
        Ok(newest_first(orders, |o: &Order| o.created_at))
    }

    async fn transition_order(&self, transition: OrderTransition) -> Result<OrderCommit> {
        let mut state = self.state.write().await;

        let current = state
            .orders
            .get(&transition.order_id)
            .map(|o| o.status)
            .ok_or_else(|| StoreError::not_found("order", transition.order_id))?;
        if current != transition.expected_status {
            return Err(StoreError::stale(
                "order",
                transition.order_id,
                transition.expected_status,
                current,
            ));
        }

        let inventories = if transition.restock.is_empty() {
            Vec::new()
        } else {
            state.restock(&transition.restock)?
        };

        let order = state
            .orders
            .get_mut(&transition.order_id)
            .ok_or_else(|| StoreError::not_found("order", transition.order_id))?;
        order.status = transition.status;
        order.payment_status = transition.payment_status;
        order.updated_at = Utc::now();
        let order = order.clone();
        state.append_tracking(transition.tracking);

        Ok(OrderCommit { order, inventories })
    }

    async fn list_tracking(&self, order_id: OrderId) -> Result<Vec<TrackingEntry>> {
        Ok(self
            .state
            .read()
            .await
            .tracking
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_return(&self, order_return: &OrderReturn) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .returns
            .values()
            .any(|r| r.order_id == order_return.order_id)
        {
            return Err(StoreError::DuplicateReturn {
                order_id: order_return.order_id,
            });
        }
        state.returns.insert(order_return.id, order_return.clone());
        Ok(())
    }

    async fn get_return(&self, return_id: ReturnId) -> Result<Option<OrderReturn>> {
        Ok(self.state.read().await.returns.get(&return_id).cloned())
    }

    async fn list_returns_for_user(&self, user_id: UserId) -> Result<Vec<OrderReturn>> {
        let state = self.state.read().await;
        let returns = state
            .returns
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(returns, |r: &OrderReturn| r.created_at))
    }

    async fn list_all_returns(&self) -> Result<Vec<OrderReturn>> {
        let state = self.state.read().await;
        let returns = state.returns.values().cloned().collect();
        Ok(newest_first(returns, |r: &OrderReturn| r.created_at))
    }

    async fn transition_return(&self, transition: ReturnTransition) -> Result<ReturnCommit> {
        let mut state = self.state.write().await;

        let current = state
            .returns
            .get(&transition.return_id)
            .map(|r| r.status)
            .ok_or_else(|| StoreError::not_found("return", transition.return_id))?;
        if current != transition.expected_status {
            return Err(StoreError::stale(
                "return",
                transition.return_id,
                transition.expected_status,
                current,
            ));
        }

        let inventories = if transition.restock.is_empty() {
            Vec::new()
        } else {
            state.restock(&transition.restock)?
        };

        let order_return = state
            .returns
            .get_mut(&transition.return_id)
            .ok_or_else(|| StoreError::not_found("return", transition.return_id))?;
        order_return.status = transition.status;
        order_return.updated_at = Utc::now();
        let order_return = order_return.clone();
        if let Some(entry) = transition.tracking {
            state.append_tracking(entry);
        }

        Ok(ReturnCommit {
            order_return,
            inventories,
        })
    }

    async fn create_replacement(&self, replacement: CreateReplacement) -> Result<Order> {
        let mut state = self.state.write().await;

        let order_return = state
            .returns
            .get(&replacement.return_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("return", replacement.return_id))?;
        if order_return.status != ReturnStatus::Approved {
            return Err(StoreError::stale(
                "return",
                order_return.id,
                ReturnStatus::Approved,
                order_return.status,
            ));
        }

        let original_status = state
            .orders
            .get(&order_return.order_id)
            .map(|o| o.status)
            .ok_or_else(|| StoreError::not_found("order", order_return.order_id))?;
        if !original_status.can_replace() {
            return Err(StoreError::stale(
                "order",
                order_return.order_id,
                OrderStatus::Delivered,
                original_status,
            ));
        }

        if state.has_active_replacement(order_return.user_id) {
            return Err(StoreError::DuplicateReplacement {
                user_id: order_return.user_id,
            });
        }

        let now = Utc::now();
        if let Some(original) = state.orders.get_mut(&order_return.order_id) {
            original.status = OrderStatus::Replaced;
            original.updated_at = now;
        }
        if let Some(ret) = state.returns.get_mut(&order_return.id) {
            ret.status = ReturnStatus::Refunded;
            ret.updated_at = now;
        }

        let order = replacement.replacement;
        state.orders.insert(order.id, order.clone());
        state.append_tracking(replacement.original_tracking);
        state.append_tracking(replacement.replacement_tracking);

        Ok(order)
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.state
            .write()
            .await
            .notifications
            .push(notification.clone());
        Ok(())
    }

    async fn mark_notification_delivered(
        &self,
        notification_id: NotificationId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let notification = state
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id)
            .ok_or_else(|| StoreError::not_found("notification", notification_id))?;
        notification.status = domain::DeliveryStatus::Delivered;
        notification.delivered_at = Some(at);
        Ok(())
    }

    async fn get_notification(
        &self,
        notification_id: NotificationId,
    ) -> Result<Option<Notification>> {
        Ok(self
            .state
            .read()
            .await
            .notifications
            .iter()
            .find(|n| n.id == notification_id)
            .cloned())
    }

    async fn list_notifications(
        &self,
        user_id: UserId,
        only_unread: bool,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        let state = self.state.read().await;
        let matching = state
            .notifications
            .iter()
            .filter(|n| n.user_id == Some(user_id) && (!only_unread || !n.is_read))
            .cloned()
            .collect();
        let mut sorted = newest_first(matching, |n: &Notification| n.created_at);
        sorted.truncate(limit);
        Ok(sorted)
    }

    async fn count_unread(&self, user_id: UserId) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .notifications
            .iter()
            .filter(|n| n.user_id == Some(user_id) && !n.is_read)
            .count() as u64)
    }

    async fn mark_notification_read(
        &self,
        notification_id: NotificationId,
        at: DateTime<Utc>,
    ) -> Result<Notification> {
        let mut state = self.state.write().await;
        let notification = state
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id)
            .ok_or_else(|| StoreError::not_found("notification", notification_id))?;
        notification.is_read = true;
        notification.delivered_at.get_or_insert(at);
        Ok(notification.clone())
    }

    async fn mark_all_read(&self, user_id: UserId, at: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for notification in state
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == Some(user_id) && !n.is_read)
        {
            notification.is_read = true;
            notification.delivered_at.get_or_insert(at);
            changed += 1;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{
        AdjustOp, CartItem, DiscountType, Money, NewCoupon, NotificationKind, OrderItem,
        PaymentStatus,
    };

    async fn seeded_product(store: &InMemoryStore, stock: u32) -> Product {
        let product = Product::new("Widget", Money::from_cents(1000));
        store
            .insert_product(product.clone(), stock, 5)
            .await
            .unwrap();
        product
    }

    fn order_for(product: &Product, quantity: u32) -> Order {
        let items = vec![OrderItem::new(
            product.id,
            product.name.clone(),
            quantity,
            product.price,
        )];
        Order::place(UserId::new(), items, Money::zero(), None, None).unwrap()
    }

    /// Saves a cart holding the order's lines and builds its commit.
    async fn place(store: &InMemoryStore, order: Order, coupon_id: Option<CouponId>) -> PlaceOrder {
        let mut cart = store
            .get_cart(order.user_id)
            .await
            .unwrap()
            .unwrap_or_else(|| Cart::new(order.user_id));
        cart.clear();
        for item in &order.items {
            cart.add(CartItem::new(
                item.product_id,
                item.product_name.clone(),
                item.quantity,
                item.unit_price,
            ));
        }
        store.save_cart(&cart).await.unwrap();
        PlaceOrder {
            tracking: TrackingEntry::new(order.id, OrderStatus::Pending, "Order placed"),
            order,
            cart_id: cart.id,
            cart_items: cart.items,
            coupon_id,
        }
    }

    #[tokio::test]
    async fn deduct_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let a = seeded_product(&store, 5).await;
        let b = seeded_product(&store, 1).await;

        let err = store
            .deduct_stock(&[StockLine::new(a.id, 2), StockLine::new(b.id, 2)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { available: 1, .. }));

        assert_eq!(store.get_inventory(a.id).await.unwrap().unwrap().stock, 5);
        assert_eq!(store.get_inventory(b.id).await.unwrap().unwrap().stock, 1);
    }

    #[tokio::test]
    async fn deduct_merges_duplicate_lines() {
        let store = InMemoryStore::new();
        let a = seeded_product(&store, 3).await;

        let err = store
            .deduct_stock(&[StockLine::new(a.id, 2), StockLine::new(a.id, 2)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { requested: 4, .. }));

        let updated = store
            .deduct_stock(&[StockLine::new(a.id, 1), StockLine::new(a.id, 2)])
            .await
            .unwrap();
        assert_eq!(updated[0].stock, 0);
    }

    #[tokio::test]
    async fn adjust_decrement_clamps_at_zero() {
        let store = InMemoryStore::new();
        let a = seeded_product(&store, 3).await;

        let inv = store
            .adjust_stock(a.id, StockAdjustment::new(AdjustOp::Decrement, 10))
            .await
            .unwrap();
        assert_eq!(inv.stock, 0);

        let low = store.list_low_stock().await.unwrap();
        assert_eq!(low.len(), 1);
    }

    #[tokio::test]
    async fn place_order_rolls_back_when_coupon_exhausted() {
        let store = InMemoryStore::new();
        let a = seeded_product(&store, 5).await;
        let mut coupon = NewCoupon {
            code: "ONCE".to_string(),
            discount_type: DiscountType::Fixed,
            discount_value: 100,
            min_order_value: None,
            max_discount: None,
            expires_at: None,
            usage_limit: Some(1),
        }
        .into_coupon()
        .unwrap();
        coupon.used_count = 1;
        store.insert_coupon(&coupon).await.unwrap();

        let err = store
            .place_order(place(&store, order_for(&a, 2), Some(coupon.id)).await)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CouponExhausted { .. }));
        assert_eq!(store.get_inventory(a.id).await.unwrap().unwrap().stock, 5);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn place_order_clears_cart_and_records_tracking() {
        let store = InMemoryStore::new();
        let a = seeded_product(&store, 5).await;
        let order = order_for(&a, 2);

        let commit = place(&store, order.clone(), None).await;
        let inventories = store.place_order(commit).await.unwrap();
        assert_eq!(inventories[0].stock, 3);

        assert!(store.get_cart(order.user_id).await.unwrap().unwrap().is_empty());
        let tracking = store.list_tracking(order.id).await.unwrap();
        assert_eq!(tracking.len(), 1);
        assert_eq!(tracking[0].status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn one_cart_snapshot_places_one_order() {
        let store = InMemoryStore::new();
        let a = seeded_product(&store, 10).await;
        let order = order_for(&a, 1);
        let commit = place(&store, order.clone(), None).await;

        let mut again = commit.clone();
        again.order = Order::place(order.user_id, order.items.clone(), Money::zero(), None, None)
            .unwrap();
        again.tracking = TrackingEntry::new(again.order.id, OrderStatus::Pending, "Order placed");

        store.place_order(commit).await.unwrap();
        let err = store.place_order(again).await.unwrap_err();
        assert!(matches!(err, StoreError::CartChanged { .. }));
        assert_eq!(store.order_count().await, 1);
        assert_eq!(store.get_inventory(a.id).await.unwrap().unwrap().stock, 9);
    }

    #[tokio::test]
    async fn line_added_after_snapshot_aborts_checkout() {
        let store = InMemoryStore::new();
        let a = seeded_product(&store, 10).await;
        let b = seeded_product(&store, 10).await;
        let order = order_for(&a, 2);
        let commit = place(&store, order.clone(), None).await;

        let mut cart = store.get_cart(order.user_id).await.unwrap().unwrap();
        cart.add(CartItem::new(b.id, "Widget", 1, b.price));
        store.save_cart(&cart).await.unwrap();

        let err = store.place_order(commit).await.unwrap_err();
        assert!(matches!(err, StoreError::CartChanged { .. }));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.get_inventory(a.id).await.unwrap().unwrap().stock, 10);
        assert_eq!(store.get_cart(order.user_id).await.unwrap().unwrap().items.len(), 2);
    }

    #[tokio::test]
    async fn transition_rejects_stale_expected_status() {
        let store = InMemoryStore::new();
        let a = seeded_product(&store, 5).await;
        let order = order_for(&a, 2);
        store
            .place_order(place(&store, order.clone(), None).await)
            .await
            .unwrap();

        let cancel = OrderTransition {
            order_id: order.id,
            expected_status: OrderStatus::Pending,
            status: OrderStatus::Cancelled,
            payment_status: PaymentStatus::Pending,
            restock: order.stock_lines(),
            tracking: TrackingEntry::new(order.id, OrderStatus::Cancelled, "Order cancelled"),
        };
        let commit = store.transition_order(cancel.clone()).await.unwrap();
        assert_eq!(commit.order.status, OrderStatus::Cancelled);
        assert_eq!(commit.inventories[0].stock, 5);

        let err = store.transition_order(cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::StaleState { .. }));
        assert_eq!(store.get_inventory(a.id).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    async fn one_return_per_order() {
        let store = InMemoryStore::new();
        let order_id = OrderId::new();
        let user_id = UserId::new();

        let first = OrderReturn::request(order_id, user_id, "damaged").unwrap();
        store.insert_return(&first).await.unwrap();

        let second = OrderReturn::request(order_id, user_id, "again").unwrap();
        let err = store.insert_return(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateReturn { .. }));
    }

    #[tokio::test]
    async fn duplicate_coupon_code_rejected() {
        let store = InMemoryStore::new();
        let new = NewCoupon {
            code: "SAVE".to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: 10,
            min_order_value: None,
            max_discount: None,
            expires_at: None,
            usage_limit: None,
        };
        store
            .insert_coupon(&new.clone().into_coupon().unwrap())
            .await
            .unwrap();
        let err = store
            .insert_coupon(&new.into_coupon().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCouponCode { .. }));
    }

    #[tokio::test]
    async fn unread_notifications_are_counted_and_marked() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        for i in 0..3 {
            let n = Notification::new(
                Some(user),
                None,
                NotificationKind::Portal,
                format!("message {i}"),
                false,
            );
            store.insert_notification(&n).await.unwrap();
        }
        let other = Notification::new(
            Some(UserId::new()),
            None,
            NotificationKind::Portal,
            "other",
            false,
        );
        store.insert_notification(&other).await.unwrap();

        assert_eq!(store.count_unread(user).await.unwrap(), 3);
        assert_eq!(store.list_notifications(user, false, 2).await.unwrap().len(), 2);

        assert_eq!(store.mark_all_read(user, Utc::now()).await.unwrap(), 3);
        assert_eq!(store.count_unread(user).await.unwrap(), 0);
        assert!(store.list_notifications(user, true, 50).await.unwrap().is_empty());
    }
}
