use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    CartId, CouponId, NotificationId, OrderId, ProductId, ReturnId, UserId,
};
use domain::{
    Cart, CartItem, Coupon, Inventory, Money, Notification, Order, OrderItem, OrderReturn,
    OrderStatus, Product, ReturnStatus, StockAdjustment, StockLine, TrackingEntry, User,
    normalize_lines,
};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{
        CommerceStore, CreateReplacement, OrderCommit, OrderTransition, PlaceOrder, ReturnCommit,
        ReturnTransition,
    },
};

const INVENTORY_SELECT: &str = r#"
    SELECT i.product_id, p.name AS product_name, i.stock, i.low_stock, i.updated_at
    FROM inventory i
    JOIN products p ON p.id = i.product_id
"#;

const ORDER_COLUMNS: &str = "id, user_id, total_amount_cents, discount_amount_cents, \
     final_amount_cents, coupon_id, shipping_address_id, is_replacement, replaces_order_id, \
     status, payment_status, created_at, updated_at";

const COUPON_COLUMNS: &str = "id, code, discount_type, discount_value, min_order_value_cents, \
     max_discount_cents, expires_at, usage_limit, used_count, is_active, created_at";

const RETURN_COLUMNS: &str = "id, order_id, user_id, reason, status, created_at, updated_at";

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, reference_id, kind, message, is_read, status, delivered_at, created_at";

fn parse<T>(value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e: T::Err| StoreError::InvalidData(e.to_string()))
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{column} out of range: {value}")))
}

fn constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}

fn row_to_inventory(row: &PgRow) -> Result<Inventory> {
    Ok(Inventory {
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        product_name: row.try_get("product_name")?,
        stock: to_u32(row.try_get("stock")?, "stock")?,
        low_stock: to_u32(row.try_get("low_stock")?, "low_stock")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        sale_price: row
            .try_get::<Option<i64>, _>("sale_price_cents")?
            .map(Money::from_cents),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_user(row: &PgRow) -> Result<User> {
    Ok(User {
        id: UserId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role: parse(row.try_get::<&str, _>("role")?)?,
    })
}

fn row_to_coupon(row: &PgRow) -> Result<Coupon> {
    Ok(Coupon {
        id: CouponId::from_uuid(row.try_get("id")?),
        code: row.try_get("code")?,
        discount_type: parse(row.try_get::<&str, _>("discount_type")?)?,
        discount_value: row.try_get("discount_value")?,
        min_order_value: row
            .try_get::<Option<i64>, _>("min_order_value_cents")?
            .map(Money::from_cents),
        max_discount: row
            .try_get::<Option<i64>, _>("max_discount_cents")?
            .map(Money::from_cents),
        expires_at: row.try_get("expires_at")?,
        usage_limit: row
            .try_get::<Option<i64>, _>("usage_limit")?
            .map(|v| to_u32(v, "usage_limit"))
            .transpose()?,
        used_count: to_u32(row.try_get("used_count")?, "used_count")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Order header; items are attached by the caller.
fn row_to_order(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        items: Vec::new(),
        total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
        discount_amount: Money::from_cents(row.try_get("discount_amount_cents")?),
        final_amount: Money::from_cents(row.try_get("final_amount_cents")?),
        coupon_id: row
            .try_get::<Option<Uuid>, _>("coupon_id")?
            .map(CouponId::from_uuid),
        shipping_address_id: row.try_get("shipping_address_id")?,
        is_replacement: row.try_get("is_replacement")?,
        replaces_order_id: row
            .try_get::<Option<Uuid>, _>("replaces_order_id")?
            .map(OrderId::from_uuid),
        status: parse(row.try_get::<&str, _>("status")?)?,
        payment_status: parse(row.try_get::<&str, _>("payment_status")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        product_name: row.try_get("product_name")?,
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
    })
}

fn row_to_tracking(row: &PgRow) -> Result<TrackingEntry> {
    Ok(TrackingEntry {
        id: row.try_get("id")?,
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        status: parse(row.try_get::<&str, _>("status")?)?,
        message: row.try_get("message")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_return(row: &PgRow) -> Result<OrderReturn> {
    Ok(OrderReturn {
        id: ReturnId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        reason: row.try_get("reason")?,
        status: parse(row.try_get::<&str, _>("status")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_notification(row: &PgRow) -> Result<Notification> {
    Ok(Notification {
        id: NotificationId::from_uuid(row.try_get("id")?),
        user_id: row
            .try_get::<Option<Uuid>, _>("user_id")?
            .map(UserId::from_uuid),
        reference_id: row.try_get("reference_id")?,
        kind: parse(row.try_get::<&str, _>("kind")?)?,
        message: row.try_get("message")?,
        is_read: row.try_get("is_read")?,
        status: parse(row.try_get::<&str, _>("status")?)?,
        delivered_at: row.try_get("delivered_at")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn fetch_inventories(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<Inventory>> {
    let sql = format!("{INVENTORY_SELECT} WHERE i.product_id = ANY($1) ORDER BY i.product_id");
    let rows = sqlx::query(&sql).bind(ids).fetch_all(conn).await?;
    rows.iter().map(row_to_inventory).collect()
}

/// Conditional decrement per line in product id order. The first short line
/// aborts the caller's transaction.
async fn deduct_lines(conn: &mut PgConnection, lines: &[StockLine]) -> Result<Vec<Inventory>> {
    let lines = normalize_lines(lines)?;
    for line in &lines {
        let result = sqlx::query(
            r#"
            UPDATE inventory
            SET stock = stock - $1, updated_at = NOW()
            WHERE product_id = $2 AND stock >= $1
            "#,
        )
        .bind(i64::from(line.quantity))
        .bind(line.product_id.as_uuid())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            let available: Option<i64> =
                sqlx::query_scalar("SELECT stock FROM inventory WHERE product_id = $1")
                    .bind(line.product_id.as_uuid())
                    .fetch_optional(&mut *conn)
                    .await?;
            return Err(match available {
                None => StoreError::not_found("inventory", line.product_id),
                Some(available) => StoreError::InsufficientStock {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available: to_u32(available, "stock")?,
                },
            });
        }
    }

    let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id.as_uuid()).collect();
    fetch_inventories(conn, &ids).await
}

async fn restock_lines(conn: &mut PgConnection, lines: &[StockLine]) -> Result<Vec<Inventory>> {
    let lines = normalize_lines(lines)?;
    for line in &lines {
        let result = sqlx::query(
            "UPDATE inventory SET stock = stock + $1, updated_at = NOW() WHERE product_id = $2",
        )
        .bind(i64::from(line.quantity))
        .bind(line.product_id.as_uuid())
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("inventory", line.product_id));
        }
    }

    let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id.as_uuid()).collect();
    fetch_inventories(conn, &ids).await
}

async fn increment_coupon(conn: &mut PgConnection, coupon_id: CouponId) -> Result<Coupon> {
    let sql = format!(
        "UPDATE coupons SET used_count = used_count + 1 \
         WHERE id = $1 AND (usage_limit IS NULL OR used_count < usage_limit) \
         RETURNING {COUPON_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(coupon_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => row_to_coupon(&row),
        None => {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM coupons WHERE id = $1)")
                    .bind(coupon_id.as_uuid())
                    .fetch_one(&mut *conn)
                    .await?;
            if exists {
                Err(StoreError::CouponExhausted { coupon_id })
            } else {
                Err(StoreError::not_found("coupon", coupon_id))
            }
        }
    }
}

async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (id, user_id, total_amount_cents, discount_amount_cents,
            final_amount_cents, coupon_id, shipping_address_id, is_replacement,
            replaces_order_id, status, payment_status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(order.id.as_uuid())
    .bind(order.user_id.as_uuid())
    .bind(order.total_amount.cents())
    .bind(order.discount_amount.cents())
    .bind(order.final_amount.cents())
    .bind(order.coupon_id.map(|c| c.as_uuid()))
    .bind(order.shipping_address_id)
    .bind(order.is_replacement)
    .bind(order.replaces_order_id.map(|o| o.as_uuid()))
    .bind(order.status.as_str())
    .bind(order.payment_status.as_str())
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    for (position, item) in order.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, position, product_id, product_name,
                quantity, unit_price_cents, subtotal_cents)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(position as i32)
        .bind(item.product_id.as_uuid())
        .bind(&item.product_name)
        .bind(i64::from(item.quantity))
        .bind(item.unit_price.cents())
        .bind(item.subtotal.cents())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_tracking(conn: &mut PgConnection, entry: &TrackingEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO order_tracking (id, order_id, status, message, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(entry.id)
    .bind(entry.order_id.as_uuid())
    .bind(entry.status.as_str())
    .bind(&entry.message)
    .bind(entry.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Attaches line items to order headers, preserving header order.
async fn load_orders(conn: &mut PgConnection, rows: Vec<PgRow>) -> Result<Vec<Order>> {
    let mut orders: Vec<Order> = rows.iter().map(row_to_order).collect::<Result<_>>()?;
    if orders.is_empty() {
        return Ok(orders);
    }

    let ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
    let item_rows = sqlx::query(
        r#"
        SELECT order_id, product_id, product_name, quantity, unit_price_cents, subtotal_cents
        FROM order_items
        WHERE order_id = ANY($1)
        ORDER BY order_id, position
        "#,
    )
    .bind(&ids)
    .fetch_all(conn)
    .await?;

    let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in &item_rows {
        let order_id: Uuid = row.try_get("order_id")?;
        items
            .entry(order_id)
            .or_default()
            .push(row_to_order_item(row)?);
    }
    for order in &mut orders {
        order.items = items.remove(&order.id.as_uuid()).unwrap_or_default();
    }
    Ok(orders)
}

async fn fetch_order(conn: &mut PgConnection, order_id: OrderId) -> Result<Option<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
    let rows = sqlx::query(&sql)
        .bind(order_id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;
    Ok(load_orders(conn, rows).await?.into_iter().next())
}

async fn lock_order_status(conn: &mut PgConnection, order_id: OrderId) -> Result<OrderStatus> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id.as_uuid())
            .fetch_optional(conn)
            .await?;
    match status {
        Some(status) => parse(&status),
        None => Err(StoreError::not_found("order", order_id)),
    }
}

async fn fetch_return(conn: &mut PgConnection, return_id: ReturnId) -> Result<Option<OrderReturn>> {
    let sql = format!("SELECT {RETURN_COLUMNS} FROM order_returns WHERE id = $1");
    let row = sqlx::query(&sql)
        .bind(return_id.as_uuid())
        .fetch_optional(conn)
        .await?;
    row.as_ref().map(row_to_return).transpose()
}

/// PostgreSQL-backed commerce store.
///
/// Every multi-row operation runs in one transaction. Stock decrements and
/// coupon increments are conditional updates, and status changes lock the
/// row with `SELECT ... FOR UPDATE` before checking the expected status.
async fn fetch_cart_items(conn: &mut PgConnection, cart_id: Uuid) -> Result<Vec<CartItem>> {
    let rows = sqlx::query(
        r#"
        SELECT product_id, product_name, quantity, price_cents
        FROM cart_items
        WHERE cart_id = $1
        ORDER BY position
        "#,
    )
    .bind(cart_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|r| {
            Ok(CartItem {
                product_id: ProductId::from_uuid(r.try_get("product_id")?),
                product_name: r.try_get("product_name")?,
                quantity: to_u32(r.try_get("quantity")?, "quantity")?,
                price: Money::from_cents(r.try_get("price_cents")?),
            })
        })
        .collect()
}

/// Locks the cart row and loads its lines. `save_cart` upserts the same row,
/// so edits wait until the lock is released.
async fn lock_cart(conn: &mut PgConnection, cart_id: CartId) -> Result<Option<Cart>> {
    let row = sqlx::query("SELECT id, user_id, updated_at FROM carts WHERE id = $1 FOR UPDATE")
        .bind(cart_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let items = fetch_cart_items(conn, cart_id.as_uuid()).await?;
    Ok(Some(Cart {
        id: cart_id,
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        items,
        updated_at: row.try_get("updated_at")?,
    }))
}

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn fetch_orders(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        load_orders(&mut conn, rows).await
    }
}

#[async_trait]
impl CommerceStore for PostgresStore {
    async fn insert_product(
        &self,
        product: Product,
        stock: u32,
        low_stock: u32,
    ) -> Result<Inventory> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, sale_price_cents, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.sale_price.map(|p| p.cents()))
        .bind(product.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO inventory (product_id, stock, low_stock) VALUES ($1, $2, $3)")
            .bind(product.id.as_uuid())
            .bind(i64::from(stock))
            .bind(i64::from(low_stock))
            .execute(&mut *tx)
            .await?;

        let inventory = fetch_inventories(&mut tx, &[product.id.as_uuid()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found("inventory", product.id))?;

        tx.commit().await?;
        Ok(inventory)
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, price_cents, sale_price_cents, created_at FROM products WHERE id = $1",
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, role) VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, email = EXCLUDED.email,
                role = EXCLUDED.role
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, email, role FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn get_inventory(&self, product_id: ProductId) -> Result<Option<Inventory>> {
        let mut conn = self.pool.acquire().await?;
        Ok(fetch_inventories(&mut conn, &[product_id.as_uuid()])
            .await?
            .into_iter()
            .next())
    }

    async fn deduct_stock(&self, lines: &[StockLine]) -> Result<Vec<Inventory>> {
        let mut tx = self.pool.begin().await?;
        let inventories = deduct_lines(&mut tx, lines).await?;
        tx.commit().await?;
        Ok(inventories)
    }

    async fn restock(&self, lines: &[StockLine]) -> Result<Vec<Inventory>> {
        let mut tx = self.pool.begin().await?;
        let inventories = restock_lines(&mut tx, lines).await?;
        tx.commit().await?;
        Ok(inventories)
    }

    async fn adjust_stock(
        &self,
        product_id: ProductId,
        adjustment: StockAdjustment,
    ) -> Result<Inventory> {
        let mut tx = self.pool.begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT stock FROM inventory WHERE product_id = $1 FOR UPDATE")
                .bind(product_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.ok_or_else(|| StoreError::not_found("inventory", product_id))?;
        let next = adjustment.apply_to(to_u32(current, "stock")?);

        sqlx::query("UPDATE inventory SET stock = $1, updated_at = NOW() WHERE product_id = $2")
            .bind(i64::from(next))
            .bind(product_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        let inventory = fetch_inventories(&mut tx, &[product_id.as_uuid()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found("inventory", product_id))?;
        tx.commit().await?;
        Ok(inventory)
    }

    async fn set_low_stock_threshold(
        &self,
        product_id: ProductId,
        threshold: u32,
    ) -> Result<Inventory> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE inventory SET low_stock = $1, updated_at = NOW() WHERE product_id = $2",
        )
        .bind(i64::from(threshold))
        .bind(product_id.as_uuid())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("inventory", product_id));
        }

        let inventory = fetch_inventories(&mut tx, &[product_id.as_uuid()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found("inventory", product_id))?;
        tx.commit().await?;
        Ok(inventory)
    }

    async fn list_low_stock(&self) -> Result<Vec<Inventory>> {
        let sql = format!("{INVENTORY_SELECT} WHERE i.stock <= i.low_stock ORDER BY i.stock ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_inventory).collect()
    }

    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        let row = sqlx::query("SELECT id, user_id, updated_at FROM carts WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let cart_id: Uuid = row.try_get("id")?;

        let mut conn = self.pool.acquire().await?;
        let items = fetch_cart_items(&mut conn, cart_id).await?;

        Ok(Some(Cart {
            id: CartId::from_uuid(cart_id),
            user_id,
            items,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let cart_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO carts (id, user_id, updated_at) VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET updated_at = EXCLUDED.updated_at
            RETURNING id
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(cart.user_id.as_uuid())
        .bind(cart.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;

        for (position, item) in cart.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO cart_items (cart_id, position, product_id, product_name, quantity, price_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(cart_id)
            .bind(position as i32)
            .bind(item.product_id.as_uuid())
            .bind(&item.product_name)
            .bind(i64::from(item.quantity))
            .bind(item.price.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO coupons (id, code, discount_type, discount_value, min_order_value_cents,
                max_discount_cents, expires_at, usage_limit, used_count, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(coupon.id.as_uuid())
        .bind(&coupon.code)
        .bind(coupon.discount_type.as_str())
        .bind(coupon.discount_value)
        .bind(coupon.min_order_value.map(|m| m.cents()))
        .bind(coupon.max_discount.map(|m| m.cents()))
        .bind(coupon.expires_at)
        .bind(coupon.usage_limit.map(i64::from))
        .bind(i64::from(coupon.used_count))
        .bind(coupon.is_active)
        .bind(coupon.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if constraint(&e) == Some("unique_coupon_code") {
                return StoreError::DuplicateCouponCode {
                    code: coupon.code.clone(),
                };
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }

    async fn get_coupon(&self, coupon_id: CouponId) -> Result<Option<Coupon>> {
        let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(coupon_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_coupon).transpose()
    }

    async fn get_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1");
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_coupon).transpose()
    }

    async fn increment_coupon_usage(&self, coupon_id: CouponId) -> Result<Coupon> {
        let mut conn = self.pool.acquire().await?;
        increment_coupon(&mut conn, coupon_id).await
    }

    async fn place_order(&self, place: PlaceOrder) -> Result<Vec<Inventory>> {
        let mut tx = self.pool.begin().await?;

        let cart = lock_cart(&mut tx, place.cart_id).await?;
        if !cart.is_some_and(|c| !c.is_empty() && c.has_lines(&place.cart_items)) {
            return Err(StoreError::CartChanged {
                cart_id: place.cart_id,
            });
        }

        let inventories = deduct_lines(&mut tx, &place.order.stock_lines()).await?;
        if let Some(coupon_id) = place.coupon_id {
            increment_coupon(&mut tx, coupon_id).await?;
        }
        insert_order(&mut tx, &place.order).await?;
        insert_tracking(&mut tx, &place.tracking).await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(place.cart_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(place.cart_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(order_id = %place.order.id, lines = inventories.len(), "Order committed");
        Ok(inventories)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, order_id).await
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let sql =
            format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC");
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        self.fetch_orders(rows).await
    }

    async fn list_all_orders(&self) -> Result<Vec<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        self.fetch_orders(rows).await
    }

    async fn transition_order(&self, transition: OrderTransition) -> Result<OrderCommit> {
        let mut tx = self.pool.begin().await?;

        let current = lock_order_status(&mut tx, transition.order_id).await?;
        if current != transition.expected_status {
            return Err(StoreError::stale(
                "order",
                transition.order_id,
                transition.expected_status,
                current,
            ));
        }

        sqlx::query(
            "UPDATE orders SET status = $1, payment_status = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(transition.status.as_str())
        .bind(transition.payment_status.as_str())
        .bind(Utc::now())
        .bind(transition.order_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        let inventories = if transition.restock.is_empty() {
            Vec::new()
        } else {
            restock_lines(&mut tx, &transition.restock).await?
        };
        insert_tracking(&mut tx, &transition.tracking).await?;

        let order = fetch_order(&mut tx, transition.order_id)
            .await?
            .ok_or_else(|| StoreError::not_found("order", transition.order_id))?;

        tx.commit().await?;
        Ok(OrderCommit { order, inventories })
    }

    async fn list_tracking(&self, order_id: OrderId) -> Result<Vec<TrackingEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, status, message, created_at
            FROM order_tracking
            WHERE order_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_tracking).collect()
    }

    async fn insert_return(&self, order_return: &OrderReturn) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_returns (id, order_id, user_id, reason, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order_return.id.as_uuid())
        .bind(order_return.order_id.as_uuid())
        .bind(order_return.user_id.as_uuid())
        .bind(&order_return.reason)
        .bind(order_return.status.as_str())
        .bind(order_return.created_at)
        .bind(order_return.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if constraint(&e) == Some("unique_return_per_order") {
                return StoreError::DuplicateReturn {
                    order_id: order_return.order_id,
                };
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }

    async fn get_return(&self, return_id: ReturnId) -> Result<Option<OrderReturn>> {
        let mut conn = self.pool.acquire().await?;
        fetch_return(&mut conn, return_id).await
    }

    async fn list_returns_for_user(&self, user_id: UserId) -> Result<Vec<OrderReturn>> {
        let sql = format!(
            "SELECT {RETURN_COLUMNS} FROM order_returns WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_return).collect()
    }

    async fn list_all_returns(&self) -> Result<Vec<OrderReturn>> {
        let sql = format!("SELECT {RETURN_COLUMNS} FROM order_returns ORDER BY created_at DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_return).collect()
    }

    async fn transition_return(&self, transition: ReturnTransition) -> Result<ReturnCommit> {
        let mut tx = self.pool.begin().await?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM order_returns WHERE id = $1 FOR UPDATE")
                .bind(transition.return_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let current: ReturnStatus = match status {
            Some(status) => parse(&status)?,
            None => return Err(StoreError::not_found("return", transition.return_id)),
        };
        if current != transition.expected_status {
            return Err(StoreError::stale(
                "return",
                transition.return_id,
                transition.expected_status,
                current,
            ));
        }

        sqlx::query("UPDATE order_returns SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(transition.status.as_str())
            .bind(Utc::now())
            .bind(transition.return_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        let inventories = if transition.restock.is_empty() {
            Vec::new()
        } else {
            restock_lines(&mut tx, &transition.restock).await?
        };
        if let Some(entry) = &transition.tracking {
            insert_tracking(&mut tx, entry).await?;
        }

        let order_return = fetch_return(&mut tx, transition.return_id)
            .await?
            .ok_or_else(|| StoreError::not_found("return", transition.return_id))?;

        tx.commit().await?;
        Ok(ReturnCommit {
            order_return,
            inventories,
        })
    }

    async fn create_replacement(&self, replacement: CreateReplacement) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {RETURN_COLUMNS} FROM order_returns WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(replacement.return_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        let order_return = match row {
            Some(row) => row_to_return(&row)?,
            None => return Err(StoreError::not_found("return", replacement.return_id)),
        };
        if order_return.status != ReturnStatus::Approved {
            return Err(StoreError::stale(
                "return",
                order_return.id,
                ReturnStatus::Approved,
                order_return.status,
            ));
        }

        // Serializes replacement creation per user so the duplicate check holds.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(order_return.user_id.to_string())
            .execute(&mut *tx)
            .await?;

        let original_status = lock_order_status(&mut tx, order_return.order_id).await?;
        if !original_status.can_replace() {
            return Err(StoreError::stale(
                "order",
                order_return.order_id,
                OrderStatus::Delivered,
                original_status,
            ));
        }

        let duplicate: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM orders
                WHERE user_id = $1 AND is_replacement AND status <> 'cancelled'
            )
            "#,
        )
        .bind(order_return.user_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        if duplicate {
            return Err(StoreError::DuplicateReplacement {
                user_id: order_return.user_id,
            });
        }

        let now = Utc::now();
        insert_order(&mut tx, &replacement.replacement).await?;

        sqlx::query("UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(OrderStatus::Replaced.as_str())
            .bind(now)
            .bind(order_return.order_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE order_returns SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(ReturnStatus::Refunded.as_str())
            .bind(now)
            .bind(order_return.id.as_uuid())
            .execute(&mut *tx)
            .await?;

        insert_tracking(&mut tx, &replacement.original_tracking).await?;
        insert_tracking(&mut tx, &replacement.replacement_tracking).await?;

        tx.commit().await?;
        Ok(replacement.replacement)
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, reference_id, kind, message, is_read,
                status, delivered_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(notification.id.as_uuid())
        .bind(notification.user_id.map(|u| u.as_uuid()))
        .bind(&notification.reference_id)
        .bind(notification.kind.as_str())
        .bind(&notification.message)
        .bind(notification.is_read)
        .bind(notification.status.as_str())
        .bind(notification.delivered_at)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_notification_delivered(
        &self,
        notification_id: NotificationId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE notifications SET status = 'DELIVERED', delivered_at = $1 WHERE id = $2",
        )
        .bind(at)
        .bind(notification_id.as_uuid())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("notification", notification_id));
        }
        Ok(())
    }

    async fn get_notification(
        &self,
        notification_id: NotificationId,
    ) -> Result<Option<Notification>> {
        let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(notification_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_notification).transpose()
    }

    async fn list_notifications(
        &self,
        user_id: UserId,
        only_unread: bool,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE) \
             ORDER BY created_at DESC LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(only_unread)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_notification).collect()
    }

    async fn count_unread(&self, user_id: UserId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn mark_notification_read(
        &self,
        notification_id: NotificationId,
        at: DateTime<Utc>,
    ) -> Result<Notification> {
        let sql = format!(
            "UPDATE notifications SET is_read = TRUE, delivered_at = COALESCE(delivered_at, $1) \
             WHERE id = $2 RETURNING {NOTIFICATION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(at)
            .bind(notification_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row_to_notification(&row),
            None => Err(StoreError::not_found("notification", notification_id)),
        }
    }

    async fn mark_all_read(&self, user_id: UserId, at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, delivered_at = COALESCE(delivered_at, $1)
            WHERE user_id = $2 AND is_read = FALSE
            "#,
        )
        .bind(at)
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
