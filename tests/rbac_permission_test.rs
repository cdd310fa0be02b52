//! Role-based access control over HTTP.
//!
//! Tests cover:
//! - route-level permission gating per role
//! - row-level order visibility
//! - identity headers supplied by the client are ignored

mod common;

use axum::http::{Method, StatusCode};
use common::{data_id, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn spoofed_identity_headers_are_ignored() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Spoof Ltd").await;
    let product = app.seed_product("SPF-1", dec!(1.00), 5).await;
    let order_id = data_id(&app.seed_order(customer, &[(product, 1)]).await);
    app.post(&format!("/api/v1/orders/{order_id}/submit"), None, &app.salesperson)
        .await;

    let bearer = format!("Bearer {}", app.salesperson.token);
    let manager_id = app.manager.id.to_string();
    let response = app
        .request_with_headers(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/approve"),
            None,
            &[
                ("authorization", bearer.as_str()),
                ("x-user-role", "manager"),
                ("x-user-id", manager_id.as_str()),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let me = app
        .request_with_headers(
            Method::GET,
            "/api/v1/me",
            None,
            &[("authorization", bearer.as_str()), ("x-user-role", "manager")],
        )
        .await;
    assert_eq!(me.status(), StatusCode::OK);
    let body = response_json(me).await;
    assert_eq!(body["data"]["role"], "salesperson");
    assert_eq!(
        body["data"]["user_id"].as_str(),
        Some(app.salesperson.id.to_string().as_str())
    );
}

#[tokio::test]
async fn salesperson_cannot_approve_or_fulfill() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Gate Co").await;
    let product = app.seed_product("GTE-1", dec!(2.00), 5).await;
    let order_id = data_id(&app.seed_order(customer, &[(product, 1)]).await);
    app.post(&format!("/api/v1/orders/{order_id}/submit"), None, &app.salesperson)
        .await;

    for action in ["approve", "reject", "fulfill"] {
        let response = app
            .post(
                &format!("/api/v1/orders/{order_id}/{action}"),
                Some(json!({ "reason": "nope" })),
                &app.salesperson,
            )
            .await;
        assert_eq!(
            response.status(),
            StatusCode::FORBIDDEN,
            "salesperson must not {action}"
        );
    }
}

#[tokio::test]
async fn warehouse_cannot_create_orders_or_see_drafts() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Depot Ltd").await;
    let product = app.seed_product("DEP-1", dec!(2.00), 5).await;
    let order_id = data_id(&app.seed_order(customer, &[(product, 1)]).await);

    let create = app
        .post(
            "/api/v1/orders",
            Some(json!({
                "customer_id": customer,
                "items": [{ "product_id": product, "quantity": 1 }],
            })),
            &app.warehouse,
        )
        .await;
    assert_eq!(create.status(), StatusCode::FORBIDDEN);

    let draft = app
        .get(&format!("/api/v1/orders/{order_id}"), &app.warehouse)
        .await;
    assert_eq!(draft.status(), StatusCode::FORBIDDEN);

    let list = response_json(app.get("/api/v1/orders", &app.warehouse).await).await;
    assert_eq!(list["data"]["total"], 0);

    app.post(&format!("/api/v1/orders/{order_id}/submit"), None, &app.salesperson)
        .await;
    app.post(&format!("/api/v1/orders/{order_id}/approve"), None, &app.manager)
        .await;

    let approved = app
        .get(&format!("/api/v1/orders/{order_id}"), &app.warehouse)
        .await;
    assert_eq!(approved.status(), StatusCode::OK);
    let body = response_json(approved).await;
    assert_eq!(body["data"]["allowed_actions"], json!(["fulfill"]));

    let list = response_json(app.get("/api/v1/orders", &app.warehouse).await).await;
    assert_eq!(list["data"]["total"], 1);
}

#[tokio::test]
async fn salespeople_only_see_their_own_orders() {
    let app = TestApp::new().await;
    let other = app
        .create_user("other.sales@example.com", sales_order_api::auth::Role::Salesperson)
        .await;
    let customer = app.seed_customer("Mine Ltd").await;
    let product = app.seed_product("MIN-1", dec!(2.00), 5).await;
    let order_id = data_id(&app.seed_order(customer, &[(product, 1)]).await);

    let foreign = app.get(&format!("/api/v1/orders/{order_id}"), &other).await;
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

    let edit = app
        .put(
            &format!("/api/v1/orders/{order_id}"),
            json!({ "notes": "hijacked" }),
            &other,
        )
        .await;
    assert_eq!(edit.status(), StatusCode::FORBIDDEN);

    let list = response_json(app.get("/api/v1/orders", &other).await).await;
    assert_eq!(list["data"]["total"], 0);

    let managers_view = response_json(app.get("/api/v1/orders", &app.manager).await).await;
    assert_eq!(managers_view["data"]["total"], 1);
}

#[tokio::test]
async fn managers_may_edit_submitted_orders() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Late Change Ltd").await;
    let product = app.seed_product("LCH-1", dec!(2.00), 5).await;
    let order_id = data_id(&app.seed_order(customer, &[(product, 1)]).await);
    app.post(&format!("/api/v1/orders/{order_id}/submit"), None, &app.salesperson)
        .await;

    let by_salesperson = app
        .put(
            &format!("/api/v1/orders/{order_id}"),
            json!({ "notes": "too late" }),
            &app.salesperson,
        )
        .await;
    assert_eq!(by_salesperson.status(), StatusCode::FORBIDDEN);

    let by_manager = app
        .put(
            &format!("/api/v1/orders/{order_id}"),
            json!({ "notes": "price agreed by phone" }),
            &app.manager,
        )
        .await;
    assert_eq!(by_manager.status(), StatusCode::OK);
    let body = response_json(by_manager).await;
    assert_eq!(body["data"]["notes"], "price agreed by phone");
    assert_eq!(body["data"]["status"], "submitted");
}

#[tokio::test]
async fn catalog_and_user_management_are_permission_gated() {
    let app = TestApp::new().await;
    let product = app.seed_product("GAT-1", dec!(2.00), 5).await;

    let sales_create = app
        .post(
            "/api/v1/products",
            Some(json!({ "sku": "X-1", "name": "X", "unit_price": "1", "cost_price": "1" })),
            &app.salesperson,
        )
        .await;
    assert_eq!(sales_create.status(), StatusCode::FORBIDDEN);

    let sales_stock = app
        .post(
            &format!("/api/v1/products/{product}/stock"),
            Some(json!({ "delta": 5 })),
            &app.salesperson,
        )
        .await;
    assert_eq!(sales_stock.status(), StatusCode::FORBIDDEN);

    let warehouse_users = app.get("/api/v1/users", &app.warehouse).await;
    assert_eq!(warehouse_users.status(), StatusCode::FORBIDDEN);

    let manager_users = response_json(app.get("/api/v1/users", &app.manager).await).await;
    assert_eq!(manager_users["data"]["total"], 3);

    let customer = app.seed_customer("Keep Me Ltd").await;
    let sales_delete = app
        .delete(&format!("/api/v1/customers/{customer}"), &app.salesperson)
        .await;
    assert_eq!(sales_delete.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn notifications_reach_the_right_roles() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Notify Ltd").await;
    let product = app.seed_product("NTF-1", dec!(2.00), 5).await;
    let order_id = data_id(&app.seed_order(customer, &[(product, 1)]).await);
    app.post(&format!("/api/v1/orders/{order_id}/submit"), None, &app.salesperson)
        .await;
    app.post(&format!("/api/v1/orders/{order_id}/approve"), None, &app.manager)
        .await;

    // The event consumer runs on its own task
    let mut warehouse_feed = serde_json::Value::Null;
    for _ in 0..50 {
        warehouse_feed = response_json(app.get("/api/v1/notifications", &app.warehouse).await).await;
        if warehouse_feed["data"]
            .as_array()
            .is_some_and(|items| !items.is_empty())
        {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    let items = warehouse_feed["data"].as_array().expect("notification list");
    assert!(items
        .iter()
        .any(|n| n["order_id"].as_str() == Some(order_id.to_string().as_str())));
}
