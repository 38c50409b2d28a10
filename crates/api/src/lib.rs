//! HTTP and WebSocket API for the commerce backend.
//!
//! Provides REST endpoints for carts, checkout, order status, returns,
//! inventory, coupons and notifications, plus a WebSocket stream of live
//! notifications. Requests are authenticated with bearer JWTs; structured
//! logging goes through tracing and counters are exported to Prometheus.

pub mod auth;
pub mod config;
pub mod error;
pub mod hub;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use store::CommerceStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use workflow::LogMailer;

pub use auth::{AdminUser, AuthUser, JwtAuth};
pub use config::Config;
pub use error::ApiError;
pub use hub::NotificationHub;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CommerceStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/products", post(routes::products::create::<S>))
        .route("/cart", get(routes::cart::get::<S>))
        .route("/cart/items", post(routes::cart::add_item::<S>))
        .route(
            "/cart/items/{product_id}",
            axum::routing::delete(routes::cart::remove_item::<S>),
        )
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list_mine::<S>),
        )
        .route("/orders/all", get(routes::orders::list_all::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/orders/{id}/status", put(routes::orders::update_status::<S>))
        .route(
            "/order-tracking/{order_id}",
            get(routes::orders::tracking::<S>),
        )
        .route("/returns", post(routes::returns::request::<S>))
        .route("/returns/my", get(routes::returns::list_mine::<S>))
        .route("/returns/all", get(routes::returns::list_all::<S>))
        .route(
            "/returns/{id}/status",
            put(routes::returns::update_status::<S>),
        )
        .route(
            "/returns/{id}/replacement",
            post(routes::returns::create_replacement::<S>),
        )
        .route(
            "/inventory/low-stock",
            get(routes::inventory::low_stock::<S>),
        )
        .route("/inventory/{product_id}", get(routes::inventory::get::<S>))
        .route(
            "/inventory/{product_id}/adjust",
            put(routes::inventory::adjust::<S>),
        )
        .route(
            "/inventory/{product_id}/threshold",
            put(routes::inventory::set_threshold::<S>),
        )
        .route("/coupons", post(routes::coupons::create::<S>))
        .route("/coupons/validate", post(routes::coupons::validate::<S>))
        .route("/notifications", get(routes::notifications::list::<S>))
        .route(
            "/notifications/unread-count",
            get(routes::notifications::unread_count::<S>),
        )
        .route(
            "/notifications/read-all",
            patch(routes::notifications::mark_all_read::<S>),
        )
        .route(
            "/notifications/{id}/read",
            patch(routes::notifications::mark_read::<S>),
        )
        .route("/ws", get(routes::ws::connect::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over `store` with a logging mailer.
pub fn create_default_state<S: CommerceStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> Arc<AppState<S>> {
    Arc::new(AppState::new(
        store,
        JwtAuth::new(config.jwt_secret.as_bytes()),
        Arc::new(LogMailer),
        config.admin_email.clone(),
    ))
}
