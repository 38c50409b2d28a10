//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::{AppState, JwtAuth};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Duration;
use common::UserId;
use domain::{Role, User};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{CommerceStore, InMemoryStore};
use tower::ServiceExt;
use workflow::InMemoryMailer;

const SECRET: &[u8] = b"api-test-secret";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    router: axum::Router,
    state: Arc<AppState<InMemoryStore>>,
    mailer: InMemoryMailer,
    auth: JwtAuth,
}

impl TestApp {
    fn new() -> Self {
        let mailer = InMemoryMailer::new();
        let state = Arc::new(AppState::new(
            InMemoryStore::new(),
            JwtAuth::new(SECRET),
            Arc::new(mailer.clone()),
            "admin@example.com".to_string(),
        ));
        let router = api::create_app(state.clone(), get_metrics_handle());
        Self {
            router,
            state,
            mailer,
            auth: JwtAuth::new(SECRET),
        }
    }

    async fn user(&self, name: &str, role: Role) -> (UserId, String) {
        let user = User::new(
            name,
            Some(format!("{}@example.com", name.to_lowercase())),
            role,
        );
        self.state
            .commerce
            .store
            .insert_user(user.clone())
            .await
            .unwrap();
        let token = self.auth.issue(user.id, role, Duration::hours(1)).unwrap();
        (user.id, token)
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn create_product(&self, admin: &str, price: i64, stock: u32) -> String {
        let (status, json) = self
            .send(
                "POST",
                "/products",
                Some(admin),
                Some(json!({ "name": "Widget", "price": price, "stock": stock })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        json["product"]["id"].as_str().unwrap().to_string()
    }

    /// Adds `quantity` units to the cart and checks out. Returns the order id.
    async fn checkout(&self, token: &str, product_id: &str, quantity: u32) -> String {
        let (status, _) = self
            .send(
                "POST",
                "/cart/items",
                Some(token),
                Some(json!({ "productId": product_id, "quantity": quantity })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, placed) = self.send("POST", "/orders", Some(token), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(placed["message"], "Order placed successfully");
        placed["orderId"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_health_and_metrics_are_public() {
    let app = TestApp::new();

    let (status, json) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_authentication_and_roles() {
    let app = TestApp::new();
    let (_, user) = app.user("Ada", Role::User).await;

    let (status, json) = app.send("GET", "/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].is_string());

    let (status, _) = app.send("GET", "/orders", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = app.send("GET", "/orders", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));

    let (status, _) = app.send("GET", "/orders/all", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            "POST",
            "/products",
            Some(&user),
            Some(json!({ "name": "Widget", "price": 100, "stock": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_checkout_with_coupon() {
    let app = TestApp::new();
    let (_, admin) = app.user("Root", Role::Admin).await;
    let (_, user) = app.user("Ada", Role::User).await;
    let product_id = app.create_product(&admin, 10_000, 10).await;

    let (status, _) = app
        .send(
            "POST",
            "/coupons",
            Some(&admin),
            Some(json!({
                "code": "SAVE10",
                "discountType": "percentage",
                "discountValue": 10
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, validation) = app
        .send(
            "POST",
            "/coupons/validate",
            Some(&user),
            Some(json!({ "code": "SAVE10", "cartTotal": 20_000 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(validation["valid"], true);
    assert_eq!(validation["discount"], 2_000);

    app.send(
        "POST",
        "/cart/items",
        Some(&user),
        Some(json!({ "productId": product_id, "quantity": 2 })),
    )
    .await;
    let (status, cart) = app.send("GET", "/cart", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["total"], 20_000);

    let (status, placed) = app
        .send(
            "POST",
            "/orders",
            Some(&user),
            Some(json!({ "couponCode": "SAVE10" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(placed["message"], "Order placed successfully");
    let order_id = placed["orderId"].as_str().unwrap();
    assert_eq!(placed.as_object().unwrap().len(), 2);

    let (status, order) = app
        .send("GET", &format!("/orders/{order_id}"), Some(&user), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["totalAmount"], 20_000);
    assert_eq!(order["discountAmount"], 2_000);
    assert_eq!(order["finalAmount"], 18_000);
    assert_eq!(order["status"], "pending");

    let (_, inventory) = app
        .send("GET", &format!("/inventory/{product_id}"), Some(&admin), None)
        .await;
    assert_eq!(inventory["stock"], 8);

    let (status, json) = app.send("POST", "/orders", Some(&user), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Cart is empty");
}

#[tokio::test]
async fn test_insufficient_stock_is_bad_request() {
    let app = TestApp::new();
    let (_, admin) = app.user("Root", Role::Admin).await;
    let (_, user) = app.user("Ada", Role::User).await;
    let product_id = app.create_product(&admin, 500, 1).await;

    let (status, json) = app
        .send(
            "POST",
            "/cart/items",
            Some(&user),
            Some(json!({ "productId": product_id, "quantity": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Insufficient stock"));
}

#[tokio::test]
async fn test_status_updates_and_cancel() {
    let app = TestApp::new();
    let (_, admin) = app.user("Root", Role::Admin).await;
    let (_, user) = app.user("Ada", Role::User).await;
    let (_, other) = app.user("Mallory", Role::User).await;
    let product_id = app.create_product(&admin, 1_000, 5).await;
    let placed = app.checkout(&user, &product_id, 2).await;
    let order_id = placed.as_str();
    let status_uri = format!("/orders/{order_id}/status");

    let (status, _) = app
        .send("PUT", &status_uri, Some(&admin), Some(json!({ "status": "teleported" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send("PUT", &status_uri, Some(&admin), Some(json!({ "status": "cancelled" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, shipped) = app
        .send(
            "PUT",
            &status_uri,
            Some(&admin),
            Some(json!({ "status": "shipped", "paymentStatus": "paid" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shipped["status"], "shipped");
    assert_eq!(shipped["paymentStatus"], "paid");

    let (status, _) = app
        .send("PUT", &status_uri, Some(&admin), Some(json!({ "status": "confirmed" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let cancel_uri = format!("/orders/{order_id}/cancel");
    let (status, _) = app.send("POST", &cancel_uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, cancelled) = app.send("POST", &cancel_uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["paymentStatus"], "refunded");

    let (status, _) = app.send("POST", &cancel_uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, inventory) = app
        .send("GET", &format!("/inventory/{product_id}"), Some(&admin), None)
        .await;
    assert_eq!(inventory["stock"], 5);

    let (status, tracking) = app
        .send("GET", &format!("/order-tracking/{order_id}"), Some(&user), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let statuses: Vec<&str> = tracking
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["pending", "shipped", "cancelled"]);

    let (status, _) = app
        .send("GET", &format!("/order-tracking/{order_id}"), Some(&other), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_return_and_replacement_flow() {
    let app = TestApp::new();
    let (_, admin) = app.user("Root", Role::Admin).await;
    let (_, user) = app.user("Ada", Role::User).await;
    let product_id = app.create_product(&admin, 2_500, 10).await;
    let placed = app.checkout(&user, &product_id, 3).await;
    let order_id = placed.as_str();

    let return_body = json!({ "orderId": order_id, "reason": "Arrived broken" });
    let (status, _) = app
        .send("POST", "/returns", Some(&user), Some(return_body.clone()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.send(
        "PUT",
        &format!("/orders/{order_id}/status"),
        Some(&admin),
        Some(json!({ "status": "delivered" })),
    )
    .await;

    let (status, order_return) = app
        .send("POST", "/returns", Some(&user), Some(return_body.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order_return["status"], "requested");
    let return_id = order_return["id"].as_str().unwrap();

    let (status, _) = app
        .send("POST", "/returns", Some(&user), Some(return_body))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(
            "POST",
            &format!("/returns/{return_id}/replacement"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let status_uri = format!("/returns/{return_id}/status");
    for _ in 0..2 {
        let (status, approved) = app
            .send("PUT", &status_uri, Some(&admin), Some(json!({ "status": "approved" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["status"], "approved");
    }
    let (_, inventory) = app
        .send("GET", &format!("/inventory/{product_id}"), Some(&admin), None)
        .await;
    assert_eq!(inventory["stock"], 10);

    let (status, replacement) = app
        .send(
            "POST",
            &format!("/returns/{return_id}/replacement"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(replacement["isReplacement"], true);
    assert_eq!(replacement["replacesOrderId"], order_id);
    assert_eq!(replacement["status"], "confirmed");

    let (_, original) = app
        .send("GET", &format!("/orders/{order_id}"), Some(&user), None)
        .await;
    assert_eq!(original["status"], "replaced");

    let (_, mine) = app.send("GET", "/returns/my", Some(&user), None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let (status, all) = app.send("GET", "/returns/all", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_inventory_admin_endpoints() {
    let app = TestApp::new();
    let (_, admin) = app.user("Root", Role::Admin).await;
    let product_id = app.create_product(&admin, 1_000, 10).await;

    let (status, inventory) = app
        .send(
            "PUT",
            &format!("/inventory/{product_id}/adjust"),
            Some(&admin),
            Some(json!({ "op": "decrement", "value": 50 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inventory["stock"], 0);

    let (_, low) = app
        .send("GET", "/inventory/low-stock", Some(&admin), None)
        .await;
    assert_eq!(low.as_array().unwrap().len(), 1);
    app.state.commerce.inventory.flush().await;
    assert_eq!(app.mailer.sent_to("admin@example.com").len(), 1);

    let (status, inventory) = app
        .send(
            "PUT",
            &format!("/inventory/{product_id}/threshold"),
            Some(&admin),
            Some(json!({ "threshold": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inventory["lowStock"], 0);

    let (status, _) = app
        .send("GET", "/inventory/not-a-uuid", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "GET",
            &format!("/inventory/{}", UserId::new()),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_notifications_endpoints() {
    let app = TestApp::new();
    let (_, admin) = app.user("Root", Role::Admin).await;
    let (_, user) = app.user("Ada", Role::User).await;
    let (_, other) = app.user("Mallory", Role::User).await;
    let product_id = app.create_product(&admin, 1_000, 10).await;
    app.checkout(&user, &product_id, 1).await;
    app.state.commerce.notifications.flush().await;

    let (status, list) = app.send("GET", "/notifications", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap().clone();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["status"], "delivered");
    assert_eq!(app.mailer.sent_to("ada@example.com").len(), 1);

    let (_, count) = app
        .send("GET", "/notifications/unread-count", Some(&user), None)
        .await;
    assert_eq!(count["unreadCount"], 1);

    let id = list[0]["id"].as_str().unwrap();
    let (status, _) = app
        .send("PATCH", &format!("/notifications/{id}/read"), Some(&other), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = app
        .send("PATCH", "/notifications/read-all", Some(&user), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["updated"], 1);

    let (_, unread) = app
        .send("GET", "/notifications?onlyUnread=true", Some(&user), None)
        .await;
    assert_eq!(unread, json!([]));
}

#[tokio::test]
async fn test_websocket_requires_token() {
    let app = TestApp::new();
    let (status, _) = app.send("GET", "/ws", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send("GET", "/ws?token=garbage", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
