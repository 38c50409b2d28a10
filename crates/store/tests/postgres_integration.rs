//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::UserId;
use domain::{
    AdjustOp, Cart, CartItem, DiscountType, Money, NewCoupon, Notification, NotificationKind,
    Order, OrderItem, OrderReturn, OrderStatus, PaymentStatus, Product, ReturnStatus,
    StockAdjustment, StockLine, TrackingEntry,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    CommerceStore, CreateReplacement, OrderTransition, PlaceOrder, PostgresStore,
    ReturnTransition, StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_commerce_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE notifications, order_returns, order_tracking, order_items, orders, \
         coupons, cart_items, carts, inventory, products, users CASCADE",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

async fn seeded_product(store: &PostgresStore, stock: u32) -> Product {
    let product = Product::new("Widget", Money::from_cents(1500));
    store.insert_product(product.clone(), stock, 5).await.unwrap();
    product
}

/// Saves a cart holding the order's lines and builds its commit.
async fn place(store: &PostgresStore, order: &Order) -> PlaceOrder {
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
        order: order.clone(),
        tracking: TrackingEntry::new(order.id, OrderStatus::Pending, "Order placed"),
        cart_id: cart.id,
        cart_items: cart.items,
        coupon_id: order.coupon_id,
    }
}

fn single_line_order(user: UserId, product: &Product, quantity: u32) -> Order {
    let items = vec![OrderItem::new(product.id, product.name.clone(), quantity, product.price)];
    Order::place(user, items, Money::zero(), None, None).unwrap()
}

async fn advance(store: &PostgresStore, order: &Order, from: OrderStatus, to: OrderStatus) {
    store
        .transition_order(OrderTransition {
            order_id: order.id,
            expected_status: from,
            status: to,
            payment_status: PaymentStatus::Paid,
            restock: Vec::new(),
            tracking: TrackingEntry::new(order.id, to, format!("Order {to}")),
        })
        .await
        .unwrap();
}

#[tokio::test]
#[serial]
async fn place_order_round_trips_with_items_and_tracking() {
    let store = get_test_store().await;
    let product = seeded_product(&store, 10).await;
    let user = UserId::new();

    let order = single_line_order(user, &product, 3);
    let commit = place(&store, &order).await;
    let inventories = store.place_order(commit).await.unwrap();
    assert_eq!(inventories[0].stock, 7);

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.items, order.items);
    assert_eq!(loaded.final_amount, order.final_amount);
    assert_eq!(store.list_tracking(order.id).await.unwrap().len(), 1);
    assert!(store.get_cart(user).await.unwrap().unwrap().is_empty());
    assert_eq!(store.list_orders_for_user(user).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn concurrent_checkouts_of_one_cart_place_one_order() {
    let store = get_test_store().await;
    let product = seeded_product(&store, 10).await;
    let user = UserId::new();
    let commit = place(&store, &single_line_order(user, &product, 2)).await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        let mut commit = commit.clone();
        commit.order = single_line_order(user, &product, 2);
        commit.tracking = TrackingEntry::new(commit.order.id, OrderStatus::Pending, "Order placed");
        handles.push(tokio::spawn(async move { store.place_order(commit).await }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(StoreError::CartChanged { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(store.get_inventory(product.id).await.unwrap().unwrap().stock, 8);
    assert_eq!(store.list_orders_for_user(user).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn cart_edited_after_snapshot_aborts_checkout() {
    let store = get_test_store().await;
    let a = seeded_product(&store, 10).await;
    let b = seeded_product(&store, 10).await;
    let user = UserId::new();
    let commit = place(&store, &single_line_order(user, &a, 1)).await;

    let mut cart = store.get_cart(user).await.unwrap().unwrap();
    cart.add(CartItem::new(b.id, "Widget", 1, b.price));
    store.save_cart(&cart).await.unwrap();

    let err = store.place_order(commit).await.unwrap_err();
    assert!(matches!(err, StoreError::CartChanged { .. }));
    assert_eq!(store.get_inventory(a.id).await.unwrap().unwrap().stock, 10);
    assert_eq!(store.get_cart(user).await.unwrap().unwrap().items.len(), 2);
    assert!(store.list_orders_for_user(user).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn insufficient_stock_rolls_back_every_line() {
    let store = get_test_store().await;
    let a = seeded_product(&store, 5).await;
    let b = seeded_product(&store, 1).await;

    let err = store
        .deduct_stock(&[StockLine::new(a.id, 3), StockLine::new(b.id, 2)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::InsufficientStock {
            requested: 2,
            available: 1,
            ..
        }
    ));
    assert_eq!(store.get_inventory(a.id).await.unwrap().unwrap().stock, 5);
    assert_eq!(store.get_inventory(b.id).await.unwrap().unwrap().stock, 1);
}

#[tokio::test]
#[serial]
async fn concurrent_orders_never_oversell() {
    let store = get_test_store().await;
    let product = seeded_product(&store, 1).await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let store = store.clone();
        let order = single_line_order(UserId::new(), &product, 1);
        let commit = place(&store, &order).await;
        handles.push(tokio::spawn(async move { store.place_order(commit).await }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(StoreError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(store.get_inventory(product.id).await.unwrap().unwrap().stock, 0);
    assert_eq!(store.list_all_orders().await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn coupon_usage_limit_is_enforced_at_commit() {
    let store = get_test_store().await;
    let product = seeded_product(&store, 10).await;
    let coupon = NewCoupon {
        code: "ONCE".to_string(),
        discount_type: DiscountType::Fixed,
        discount_value: 500,
        min_order_value: None,
        max_discount: None,
        expires_at: None,
        usage_limit: Some(1),
    }
    .into_coupon()
    .unwrap();
    store.insert_coupon(&coupon).await.unwrap();

    let items = vec![OrderItem::new(product.id, "Widget", 1, product.price)];
    let first =
        Order::place(UserId::new(), items.clone(), Money::from_cents(500), Some(coupon.id), None)
            .unwrap();
    store.place_order(place(&store, &first).await).await.unwrap();

    let second =
        Order::place(UserId::new(), items, Money::from_cents(500), Some(coupon.id), None).unwrap();
    let err = store.place_order(place(&store, &second).await).await.unwrap_err();
    assert!(matches!(err, StoreError::CouponExhausted { .. }));

    assert_eq!(store.get_inventory(product.id).await.unwrap().unwrap().stock, 9);
    assert_eq!(store.get_coupon(coupon.id).await.unwrap().unwrap().used_count, 1);
    assert!(store.get_order(second.id).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn duplicate_coupon_code_maps_to_conflict() {
    let store = get_test_store().await;
    let new = NewCoupon {
        code: "SAVE10".to_string(),
        discount_type: DiscountType::Percentage,
        discount_value: 10,
        min_order_value: None,
        max_discount: None,
        expires_at: None,
        usage_limit: None,
    };
    store.insert_coupon(&new.clone().into_coupon().unwrap()).await.unwrap();

    let err = store.insert_coupon(&new.into_coupon().unwrap()).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateCouponCode { .. }));
    assert!(store.get_coupon_by_code("SAVE10").await.unwrap().is_some());
}

#[tokio::test]
#[serial]
async fn cancel_restocks_and_stale_cancel_is_rejected() {
    let store = get_test_store().await;
    let product = seeded_product(&store, 4).await;
    let order = single_line_order(UserId::new(), &product, 2);
    store.place_order(place(&store, &order).await).await.unwrap();

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
    assert_eq!(commit.inventories[0].stock, 4);

    let err = store.transition_order(cancel).await.unwrap_err();
    assert!(matches!(err, StoreError::StaleState { .. }));
    assert_eq!(store.get_inventory(product.id).await.unwrap().unwrap().stock, 4);
}

#[tokio::test]
#[serial]
async fn return_approval_and_replacement_commit_together() {
    let store = get_test_store().await;
    let product = seeded_product(&store, 10).await;
    let user = UserId::new();
    let order = single_line_order(user, &product, 2);
    store.place_order(place(&store, &order).await).await.unwrap();
    advance(&store, &order, OrderStatus::Pending, OrderStatus::Delivered).await;

    let order_return = OrderReturn::request(order.id, user, "damaged").unwrap();
    store.insert_return(&order_return).await.unwrap();
    let duplicate = OrderReturn::request(order.id, user, "again").unwrap();
    assert!(matches!(
        store.insert_return(&duplicate).await.unwrap_err(),
        StoreError::DuplicateReturn { .. }
    ));

    let approved = store
        .transition_return(ReturnTransition {
            return_id: order_return.id,
            expected_status: ReturnStatus::Requested,
            status: ReturnStatus::Approved,
            restock: order.stock_lines(),
            tracking: Some(TrackingEntry::new(
                order.id,
                OrderStatus::Delivered,
                "Return approved",
            )),
        })
        .await
        .unwrap();
    assert_eq!(approved.order_return.status, ReturnStatus::Approved);
    assert_eq!(approved.inventories[0].stock, 10);

    let original = store.get_order(order.id).await.unwrap().unwrap();
    let replacement = original.replacement();
    let created = store
        .create_replacement(CreateReplacement {
            return_id: order_return.id,
            replacement: replacement.clone(),
            original_tracking: TrackingEntry::new(order.id, OrderStatus::Replaced, "Replaced"),
            replacement_tracking: TrackingEntry::new(
                replacement.id,
                OrderStatus::Confirmed,
                "Replacement order created",
            ),
        })
        .await
        .unwrap();
    assert!(created.is_replacement);

    let original = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(original.status, OrderStatus::Replaced);
    let ret = store.get_return(order_return.id).await.unwrap().unwrap();
    assert_eq!(ret.status, ReturnStatus::Refunded);
    let stored = store.get_order(replacement.id).await.unwrap().unwrap();
    assert_eq!(stored.items, order.items);
}

#[tokio::test]
#[serial]
async fn second_active_replacement_for_user_is_rejected() {
    let store = get_test_store().await;
    let product = seeded_product(&store, 10).await;
    let user = UserId::new();

    let mut returns = Vec::new();
    for _ in 0..2 {
        let order = single_line_order(user, &product, 1);
        store.place_order(place(&store, &order).await).await.unwrap();
        advance(&store, &order, OrderStatus::Pending, OrderStatus::Delivered).await;
        let ret = OrderReturn::request(order.id, user, "broken").unwrap();
        store.insert_return(&ret).await.unwrap();
        store
            .transition_return(ReturnTransition {
                return_id: ret.id,
                expected_status: ReturnStatus::Requested,
                status: ReturnStatus::Approved,
                restock: Vec::new(),
                tracking: None,
            })
            .await
            .unwrap();
        returns.push((order, ret));
    }

    for (i, (order, ret)) in returns.iter().enumerate() {
        let replacement = order.replacement();
        let result = store
            .create_replacement(CreateReplacement {
                return_id: ret.id,
                replacement: replacement.clone(),
                original_tracking: TrackingEntry::new(order.id, OrderStatus::Replaced, "Replaced"),
                replacement_tracking: TrackingEntry::new(
                    replacement.id,
                    OrderStatus::Confirmed,
                    "Replacement",
                ),
            })
            .await;
        if i == 0 {
            assert!(result.is_ok());
        } else {
            assert!(matches!(result, Err(StoreError::DuplicateReplacement { .. })));
        }
    }
}

#[tokio::test]
#[serial]
async fn adjustments_and_low_stock_listing() {
    let store = get_test_store().await;
    let product = seeded_product(&store, 20).await;

    let inv = store
        .adjust_stock(product.id, StockAdjustment::new(AdjustOp::Decrement, 50))
        .await
        .unwrap();
    assert_eq!(inv.stock, 0);
    assert_eq!(inv.product_name, "Widget");

    let inv = store
        .adjust_stock(product.id, StockAdjustment::new(AdjustOp::Set, 12))
        .await
        .unwrap();
    assert_eq!(inv.stock, 12);
    assert!(store.list_low_stock().await.unwrap().is_empty());

    store.set_low_stock_threshold(product.id, 12).await.unwrap();
    assert_eq!(store.list_low_stock().await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn notifications_read_state() {
    let store = get_test_store().await;
    let user = UserId::new();

    let pending = Notification::new(Some(user), None, NotificationKind::Portal, "first", true);
    store.insert_notification(&pending).await.unwrap();
    let plain = Notification::new(Some(user), None, NotificationKind::Portal, "second", false);
    store.insert_notification(&plain).await.unwrap();

    store
        .mark_notification_delivered(pending.id, chrono::Utc::now())
        .await
        .unwrap();
    let loaded = store.get_notification(pending.id).await.unwrap().unwrap();
    assert!(loaded.delivered_at.is_some());

    assert_eq!(store.count_unread(user).await.unwrap(), 2);
    let read = store
        .mark_notification_read(plain.id, chrono::Utc::now())
        .await
        .unwrap();
    assert!(read.is_read);
    assert_eq!(store.list_notifications(user, true, 50).await.unwrap().len(), 1);
    assert_eq!(store.mark_all_read(user, chrono::Utc::now()).await.unwrap(), 1);
    assert_eq!(store.count_unread(user).await.unwrap(), 0);
}
