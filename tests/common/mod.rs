#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use sales_order_api::{
    app_router,
    auth::Role,
    config::AppConfig,
    db,
    entities::user,
    AppState,
};

pub const TEST_SESSION_SECRET: &str = "integration-test-session-secret-0123456789abcdef";

/// A seeded principal and the session token that authenticates it.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub token: String,
}

/// Helper harness for spinning up the full router backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub manager: TestUser,
    pub salesperson: TestUser,
    pub warehouse: TestUser,
}

impl TestApp {
    /// Construct a new test application with fresh database state and one
    /// active user per role.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_SESSION_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection keeps the in-memory database alive for the whole test.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::build(cfg, Arc::new(pool));
        let router = app_router(state.clone());

        let mut app = Self {
            router,
            state,
            manager: placeholder_user(Role::Manager),
            salesperson: placeholder_user(Role::Salesperson),
            warehouse: placeholder_user(Role::Warehouse),
        };
        app.manager = app.create_user("manager@example.com", Role::Manager).await;
        app.salesperson = app
            .create_user("sales@example.com", Role::Salesperson)
            .await;
        app.warehouse = app
            .create_user("warehouse@example.com", Role::Warehouse)
            .await;
        app
    }

    /// Inserts an active profile directly and issues a session for it.
    pub async fn create_user(&self, email: &str, role: Role) -> TestUser {
        let id = Uuid::new_v4();
        user::ActiveModel {
            id: Set(id),
            email: Set(email.to_string()),
            full_name: Set(format!("Test {}", role)),
            role: Set(role),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("insert test user");

        TestUser {
            id,
            email: email.to_string(),
            role,
            token: self.issue_token(id, email),
        }
    }

    /// A session token for an arbitrary subject, profile or not.
    pub fn issue_token(&self, user_id: Uuid, email: &str) -> String {
        self.state
            .auth
            .issue_session(user_id, email)
            .expect("issue test session")
    }

    /// Send a request through the full router. The token travels as a bearer header.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", tok));
        }
        self.send(builder, body).await
    }

    /// Same as [`TestApp::request`] with extra headers, e.g. a session cookie.
    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder, body).await
    }

    async fn send(&self, mut builder: axum::http::request::Builder, body: Option<Value>) -> Response {
        let body = if let Some(json) = body {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn get(&self, uri: &str, user: &TestUser) -> Response {
        self.request(Method::GET, uri, None, Some(&user.token)).await
    }

    pub async fn post(&self, uri: &str, body: Option<Value>, user: &TestUser) -> Response {
        self.request(Method::POST, uri, body, Some(&user.token)).await
    }

    pub async fn put(&self, uri: &str, body: Value, user: &TestUser) -> Response {
        self.request(Method::PUT, uri, Some(body), Some(&user.token))
            .await
    }

    pub async fn delete(&self, uri: &str, user: &TestUser) -> Response {
        self.request(Method::DELETE, uri, None, Some(&user.token))
            .await
    }

    /// Creates a customer as the salesperson and returns its id.
    pub async fn seed_customer(&self, name: &str) -> Uuid {
        let response = self
            .post(
                "/api/v1/customers",
                Some(json!({ "name": name, "email": "buyer@example.com" })),
                &self.salesperson,
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED, "seed customer");
        let body = response_json(response).await;
        data_id(&body)
    }

    /// Creates a product as the manager and returns its id.
    pub async fn seed_product(&self, sku: &str, unit_price: Decimal, stock: i32) -> Uuid {
        let response = self
            .post(
                "/api/v1/products",
                Some(json!({
                    "sku": sku,
                    "name": format!("Product {}", sku),
                    "unit_price": unit_price.to_string(),
                    "cost_price": "1.00",
                    "stock_quantity": stock,
                })),
                &self.manager,
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED, "seed product");
        let body = response_json(response).await;
        data_id(&body)
    }

    /// Creates a draft order as the salesperson and returns the response body.
    pub async fn seed_order(&self, customer_id: Uuid, items: &[(Uuid, i32)]) -> Value {
        let items: Vec<Value> = items
            .iter()
            .map(|(product_id, quantity)| json!({ "product_id": product_id, "quantity": quantity }))
            .collect();
        let response = self
            .post(
                "/api/v1/orders",
                Some(json!({
                    "customer_id": customer_id,
                    "items": items,
                    "tax_rate": "0.10",
                })),
                &self.salesperson,
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED, "seed order");
        response_json(response).await
    }

    pub async fn product_stock(&self, product_id: Uuid) -> i64 {
        let response = self
            .get(&format!("/api/v1/products/{}", product_id), &self.warehouse)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        body["data"]["stock_quantity"]
            .as_i64()
            .expect("stock_quantity is a number")
    }
}

fn placeholder_user(role: Role) -> TestUser {
    TestUser {
        id: Uuid::nil(),
        email: String::new(),
        role,
        token: String::new(),
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn data_id(body: &Value) -> Uuid {
    body["data"]["id"]
        .as_str()
        .and_then(|id| Uuid::parse_str(id).ok())
        .expect("response carries data.id")
}
