//! Sales Order API Library
//!
//! Customers, product catalog, the order approval workflow and warehouse
//! fulfillment behind a session-authenticated, role-gated HTTP API.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod openapi;
pub mod pricing;
pub mod services;
pub mod tracing;
pub mod workflow;

use axum::{
    middleware,
    response::Json,
    routing::{delete, get, post, put},
    Extension, Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use utoipa::{IntoParams, ToSchema};

use crate::auth::perm;
use crate::auth::{AuthConfig, AuthRouterExt, AuthService};
use crate::events::{EventSender, NotificationFeed};
use crate::services::{orders::OrderSettings, AppServices};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: AppServices,
    pub auth: Arc<AuthService>,
    pub event_sender: Option<Arc<EventSender>>,
    pub notifications: NotificationFeed,
}

impl AppState {
    /// Wires services, the session verifier and the event pipeline on top of
    /// an open connection. Spawns the event consumer, so it must be called
    /// inside a Tokio runtime.
    pub fn build(config: config::AppConfig, db: Arc<DatabaseConnection>) -> Self {
        let (tx, rx) = mpsc::channel(config.event_channel_capacity);
        let event_sender = Some(Arc::new(EventSender::new(tx)));
        let notifications = NotificationFeed::new(config.notification_feed_capacity);
        tokio::spawn(events::process_events(rx, notifications.clone()));

        let services = AppServices::new(
            db.clone(),
            event_sender.clone(),
            OrderSettings {
                default_tax_rate: config.default_tax_rate(),
            },
        );
        let auth = Arc::new(AuthService::new(
            AuthConfig::from(&config),
            services.users.clone(),
        ));

        Self {
            db,
            config,
            services,
            auth,
            event_sender,
            notifications,
        }
    }
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// 1-based page number
    #[serde(default = "default_page")]
    pub page: u64,
    /// Page size; falls back to the configured default
    pub limit: Option<u64>,
    /// Case-insensitive substring filter
    pub search: Option<String>,
}

fn default_page() -> u64 {
    1
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn response_outside_a_request_has_no_request_id() {
        let response = ApiResponse::success(vec!["a", "b"]);
        let meta = response.meta.expect("metadata expected");
        assert!(meta.request_id.is_none());
        assert!(response.success);
        assert!(response.message.is_none() && response.errors.is_none());
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = PaginatedResponse::new(vec![1, 2, 3], 41, 1, 20);
        assert_eq!(page.total_pages, 3);

        let empty = PaginatedResponse::<u8>::new(Vec::new(), 0, 1, 20);
        assert_eq!(empty.total_pages, 0);

        let exact = PaginatedResponse::<u8>::new(Vec::new(), 40, 2, 20);
        assert_eq!(exact.total_pages, 2);
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes mounted under `/api/v1`. Each group carries the permission its
/// handlers need; row-level rules are enforced again in the services.
pub fn api_v1_routes() -> Router<AppState> {
    // Orders
    let orders_read = Router::new()
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/history", get(handlers::orders::order_history))
        .with_permission(perm::ORDERS_READ);

    let orders_create = Router::new()
        .route("/orders", post(handlers::orders::create_order))
        .with_permission(perm::ORDERS_CREATE);

    let orders_update = Router::new()
        .route(
            "/orders/:id",
            put(handlers::orders::update_order).delete(handlers::orders::delete_order),
        )
        .route("/orders/:id/submit", post(handlers::orders::submit_order))
        .with_permission(perm::ORDERS_UPDATE);

    let orders_approve = Router::new()
        .route("/orders/:id/approve", post(handlers::orders::approve_order))
        .route("/orders/:id/reject", post(handlers::orders::reject_order))
        .with_permission(perm::ORDERS_APPROVE);

    let orders_fulfill = Router::new()
        .route("/orders/:id/fulfill", post(handlers::orders::fulfill_order))
        .with_permission(perm::ORDERS_FULFILL);

    // Customers
    let customers_read = Router::new()
        .route("/customers", get(handlers::customers::list_customers))
        .route("/customers/:id", get(handlers::customers::get_customer))
        .with_permission(perm::CUSTOMERS_READ);

    let customers_write = Router::new()
        .route("/customers", post(handlers::customers::create_customer))
        .route("/customers/:id", put(handlers::customers::update_customer))
        .with_permission(perm::CUSTOMERS_WRITE);

    let customers_delete = Router::new()
        .route("/customers/:id", delete(handlers::customers::delete_customer))
        .with_permission(perm::CUSTOMERS_DELETE);

    // Products
    let products_read = Router::new()
        .route("/products", get(handlers::products::list_products))
        .route("/products/:id", get(handlers::products::get_product))
        .with_permission(perm::PRODUCTS_READ);

    let products_manage = Router::new()
        .route("/products", post(handlers::products::create_product))
        .route(
            "/products/:id",
            put(handlers::products::update_product).delete(handlers::products::delete_product),
        )
        .with_permission(perm::PRODUCTS_MANAGE);

    let products_stock = Router::new()
        .route("/products/:id/stock", post(handlers::products::adjust_stock))
        .with_permission(perm::PRODUCTS_STOCK);

    // Users
    let users = Router::new()
        .route(
            "/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route("/users/:id", get(handlers::users::get_user))
        .route("/users/:id/role", put(handlers::users::update_user_role))
        .route("/users/:id/active", put(handlers::users::set_user_active))
        .with_permission(perm::USERS_MANAGE);

    let notifications = Router::new()
        .route(
            "/notifications",
            get(handlers::notifications::list_notifications),
        )
        .with_permission(perm::NOTIFICATIONS_READ);

    let me = Router::new()
        .route("/me", get(handlers::auth::me))
        .with_auth();

    Router::new()
        // Status and health endpoints
        .route("/health", get(handlers::health::health))
        .route("/status", get(handlers::health::status))
        .merge(me)
        .merge(orders_read)
        .merge(orders_create)
        .merge(orders_update)
        .merge(orders_approve)
        .merge(orders_fulfill)
        .merge(customers_read)
        .merge(customers_write)
        .merge(customers_delete)
        .merge(products_read)
        .merge(products_manage)
        .merge(products_stock)
        .merge(users)
        .merge(notifications)
}

/// The full application: versioned API, logout, Swagger UI and the
/// request-id and HTTP tracing layers. Transport concerns such as CORS and
/// timeouts are added by the binary.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .route("/auth/logout", post(handlers::auth::logout))
        .merge(openapi::swagger_ui())
        .layer(Extension(state.auth.clone()))
        .layer(crate::tracing::configure_http_tracing())
        .layer(middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}
