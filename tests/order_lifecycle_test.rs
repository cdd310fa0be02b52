//! End-to-end tests for the sale order workflow.
//!
//! Tests cover:
//! - draft -> submitted -> approved -> fulfilled with stock decrements
//! - rejection with a reason and resubmission
//! - all-or-nothing fulfillment when stock is short
//! - illegal transitions and status history

mod common;

use std::str::FromStr;

use axum::http::StatusCode;
use common::{data_id, response_json, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}

fn status_of(body: &Value) -> &str {
    body["data"]["status"].as_str().expect("status string")
}

#[tokio::test]
async fn order_moves_through_full_lifecycle() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Lifecycle Ltd").await;
    let widget = app.seed_product("WID-1", dec!(10.00), 10).await;
    let gadget = app.seed_product("GAD-1", dec!(5.50), 4).await;

    let created = app.seed_order(customer, &[(widget, 2), (gadget, 1)]).await;
    let order_id = data_id(&created);
    assert_eq!(status_of(&created), "draft");
    assert_eq!(decimal(&created["data"]["subtotal"]), dec!(25.50));
    assert_eq!(decimal(&created["data"]["tax_amount"]), dec!(2.55));
    assert_eq!(decimal(&created["data"]["total"]), dec!(28.05));
    assert!(created["data"]["order_number"]
        .as_str()
        .is_some_and(|n| !n.is_empty()));

    let submitted = app
        .post(&format!("/api/v1/orders/{order_id}/submit"), None, &app.salesperson)
        .await;
    assert_eq!(submitted.status(), StatusCode::OK);
    let body = response_json(submitted).await;
    assert_eq!(status_of(&body), "submitted");
    assert!(body["data"]["submitted_at"].is_string());

    let approved = app
        .post(&format!("/api/v1/orders/{order_id}/approve"), None, &app.manager)
        .await;
    assert_eq!(approved.status(), StatusCode::OK);
    let body = response_json(approved).await;
    assert_eq!(status_of(&body), "approved");
    assert_eq!(
        body["data"]["manager_id"].as_str(),
        Some(app.manager.id.to_string().as_str())
    );

    let fulfilled = app
        .post(&format!("/api/v1/orders/{order_id}/fulfill"), None, &app.warehouse)
        .await;
    assert_eq!(fulfilled.status(), StatusCode::OK);
    let body = response_json(fulfilled).await;
    assert_eq!(status_of(&body), "fulfilled");
    assert_eq!(
        body["data"]["warehouse_id"].as_str(),
        Some(app.warehouse.id.to_string().as_str())
    );
    for item in body["data"]["items"].as_array().expect("items") {
        assert_eq!(item["line_status"], "fulfilled");
    }
    assert_eq!(body["data"]["allowed_actions"], json!([]));

    assert_eq!(app.product_stock(widget).await, 8);
    assert_eq!(app.product_stock(gadget).await, 3);

    let history = app
        .get(&format!("/api/v1/orders/{order_id}/history"), &app.manager)
        .await;
    assert_eq!(history.status(), StatusCode::OK);
    let body = response_json(history).await;
    let entries = body["data"].as_array().expect("history entries");
    let transitions: Vec<(Value, Value)> = entries
        .iter()
        .map(|e| (e["from_status"].clone(), e["to_status"].clone()))
        .collect();
    assert_eq!(
        transitions,
        vec![
            (Value::Null, json!("draft")),
            (json!("draft"), json!("submitted")),
            (json!("submitted"), json!("approved")),
            (json!("approved"), json!("fulfilled")),
        ]
    );
}

#[tokio::test]
async fn rejected_order_keeps_reason_and_can_be_resubmitted() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Reject Co").await;
    let product = app.seed_product("REJ-1", dec!(3.00), 5).await;
    let order_id = data_id(&app.seed_order(customer, &[(product, 1)]).await);

    app.post(&format!("/api/v1/orders/{order_id}/submit"), None, &app.salesperson)
        .await;

    let missing_reason = app
        .post(
            &format!("/api/v1/orders/{order_id}/reject"),
            Some(json!({ "reason": "   " })),
            &app.manager,
        )
        .await;
    assert_eq!(missing_reason.status(), StatusCode::BAD_REQUEST);

    let rejected = app
        .post(
            &format!("/api/v1/orders/{order_id}/reject"),
            Some(json!({ "reason": "Customer credit on hold" })),
            &app.manager,
        )
        .await;
    assert_eq!(rejected.status(), StatusCode::OK);
    let body = response_json(rejected).await;
    assert_eq!(status_of(&body), "rejected");
    assert_eq!(body["data"]["rejection_reason"], "Customer credit on hold");

    let resubmitted = app
        .post(&format!("/api/v1/orders/{order_id}/submit"), None, &app.salesperson)
        .await;
    assert_eq!(resubmitted.status(), StatusCode::OK);
    let body = response_json(resubmitted).await;
    assert_eq!(status_of(&body), "submitted");
    assert!(body["data"]["rejection_reason"].is_null());

    let history = response_json(
        app.get(&format!("/api/v1/orders/{order_id}/history"), &app.salesperson)
            .await,
    )
    .await;
    let reject_entry = history["data"]
        .as_array()
        .expect("history")
        .iter()
        .find(|e| e["to_status"] == "rejected")
        .cloned()
        .expect("rejection recorded");
    assert_eq!(reject_entry["note"], "Customer credit on hold");
}

#[tokio::test]
async fn fulfillment_with_short_stock_changes_nothing() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Short Stock Inc").await;
    let plenty = app.seed_product("PLN-1", dec!(1.00), 100).await;
    let scarce = app.seed_product("SCR-1", dec!(2.00), 1).await;
    let order_id = data_id(&app.seed_order(customer, &[(plenty, 5), (scarce, 3)]).await);

    app.post(&format!("/api/v1/orders/{order_id}/submit"), None, &app.salesperson)
        .await;
    app.post(&format!("/api/v1/orders/{order_id}/approve"), None, &app.manager)
        .await;

    let response = app
        .post(&format!("/api/v1/orders/{order_id}/fulfill"), None, &app.warehouse)
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .is_some_and(|m| m.contains("SCR-1")));

    assert_eq!(app.product_stock(plenty).await, 100);
    assert_eq!(app.product_stock(scarce).await, 1);

    let order = response_json(
        app.get(&format!("/api/v1/orders/{order_id}"), &app.warehouse)
            .await,
    )
    .await;
    assert_eq!(status_of(&order), "approved");
    for item in order["data"]["items"].as_array().expect("items") {
        assert_eq!(item["line_status"], "pending");
    }

    // Restock and retry
    let restock = app
        .post(
            &format!("/api/v1/products/{scarce}/stock"),
            Some(json!({ "delta": 2, "reason": "cycle count" })),
            &app.warehouse,
        )
        .await;
    assert_eq!(restock.status(), StatusCode::OK);

    let retry = app
        .post(&format!("/api/v1/orders/{order_id}/fulfill"), None, &app.warehouse)
        .await;
    assert_eq!(retry.status(), StatusCode::OK);
    assert_eq!(app.product_stock(scarce).await, 0);
    assert_eq!(app.product_stock(plenty).await, 95);
}

#[tokio::test]
async fn illegal_transitions_are_rejected() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Rules Ltd").await;
    let product = app.seed_product("RUL-1", dec!(4.00), 10).await;
    let order_id = data_id(&app.seed_order(customer, &[(product, 1)]).await);

    // Draft cannot be approved or fulfilled
    let approve = app
        .post(&format!("/api/v1/orders/{order_id}/approve"), None, &app.manager)
        .await;
    assert_eq!(approve.status(), StatusCode::BAD_REQUEST);

    let fulfill = app
        .post(&format!("/api/v1/orders/{order_id}/fulfill"), None, &app.warehouse)
        .await;
    assert_ne!(fulfill.status(), StatusCode::OK);

    app.post(&format!("/api/v1/orders/{order_id}/submit"), None, &app.salesperson)
        .await;
    let resubmit = app
        .post(&format!("/api/v1/orders/{order_id}/submit"), None, &app.salesperson)
        .await;
    assert_eq!(resubmit.status(), StatusCode::BAD_REQUEST);

    // History only holds the successful changes
    let history = response_json(
        app.get(&format!("/api/v1/orders/{order_id}/history"), &app.manager)
            .await,
    )
    .await;
    assert_eq!(history["data"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn draft_edits_reprice_and_only_drafts_can_be_deleted() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Edit Co").await;
    let cheap = app.seed_product("CHP-1", dec!(2.00), 10).await;
    let dear = app.seed_product("DER-1", dec!(20.00), 10).await;
    let order_id = data_id(&app.seed_order(customer, &[(cheap, 1)]).await);

    let updated = app
        .put(
            &format!("/api/v1/orders/{order_id}"),
            json!({ "items": [{ "product_id": dear, "quantity": 2 }], "tax_rate": "0" }),
            &app.salesperson,
        )
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    let body = response_json(updated).await;
    assert_eq!(decimal(&body["data"]["subtotal"]), dec!(40.00));
    assert_eq!(decimal(&body["data"]["total"]), dec!(40.00));
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(1));

    let empty_items = app
        .put(
            &format!("/api/v1/orders/{order_id}"),
            json!({ "items": [] }),
            &app.salesperson,
        )
        .await;
    assert_eq!(empty_items.status(), StatusCode::BAD_REQUEST);

    app.post(&format!("/api/v1/orders/{order_id}/submit"), None, &app.salesperson)
        .await;
    let delete_submitted = app
        .delete(&format!("/api/v1/orders/{order_id}"), &app.salesperson)
        .await;
    assert_eq!(delete_submitted.status(), StatusCode::BAD_REQUEST);

    let draft_id = data_id(&app.seed_order(customer, &[(cheap, 1)]).await);
    let delete_draft = app
        .delete(&format!("/api/v1/orders/{draft_id}"), &app.salesperson)
        .await;
    assert_eq!(delete_draft.status(), StatusCode::NO_CONTENT);
    let gone = app
        .get(&format!("/api/v1/orders/{draft_id}"), &app.salesperson)
        .await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn order_creation_validates_references() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Validation Ltd").await;
    let product = app.seed_product("VAL-1", dec!(1.00), 1).await;

    let no_items = app
        .post(
            "/api/v1/orders",
            Some(json!({ "customer_id": customer, "items": [] })),
            &app.salesperson,
        )
        .await;
    assert_eq!(no_items.status(), StatusCode::BAD_REQUEST);

    let unknown_customer = app
        .post(
            "/api/v1/orders",
            Some(json!({
                "customer_id": uuid::Uuid::new_v4(),
                "items": [{ "product_id": product, "quantity": 1 }],
            })),
            &app.salesperson,
        )
        .await;
    assert_eq!(unknown_customer.status(), StatusCode::BAD_REQUEST);

    let zero_quantity = app
        .post(
            "/api/v1/orders",
            Some(json!({
                "customer_id": customer,
                "items": [{ "product_id": product, "quantity": 0 }],
            })),
            &app.salesperson,
        )
        .await;
    assert_eq!(zero_quantity.status(), StatusCode::BAD_REQUEST);

    let tax_too_high = app
        .post(
            "/api/v1/orders",
            Some(json!({
                "customer_id": customer,
                "items": [{ "product_id": product, "quantity": 1 }],
                "tax_rate": "1.5",
            })),
            &app.salesperson,
        )
        .await;
    assert_eq!(tax_too_high.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_orders_and_precise_tax_rates_are_rejected() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Bulk Buyer").await;
    let priciest = app.seed_product("MAX-1", dec!(9999999999.99), 1).await;

    let overflow = app
        .post(
            "/api/v1/orders",
            Some(json!({
                "customer_id": customer,
                "items": [{ "product_id": priciest, "quantity": 100000 }],
            })),
            &app.salesperson,
        )
        .await;
    assert_eq!(overflow.status(), StatusCode::BAD_REQUEST);
    let body = response_json(overflow).await;
    assert!(body["message"]
        .as_str()
        .is_some_and(|m| m.contains("999999999999.99")));

    let one = app.seed_order(customer, &[(priciest, 1)]).await;
    let order_id = data_id(&one);
    let grown = app
        .put(
            &format!("/api/v1/orders/{order_id}"),
            json!({ "items": [{ "product_id": priciest, "quantity": 100000 }] }),
            &app.salesperson,
        )
        .await;
    assert_eq!(grown.status(), StatusCode::BAD_REQUEST);

    let product = app.seed_product("TAX-1", dec!(1.00), 1).await;
    let fifth_decimal = app
        .post(
            "/api/v1/orders",
            Some(json!({
                "customer_id": customer,
                "items": [{ "product_id": product, "quantity": 1 }],
                "tax_rate": "0.08255",
            })),
            &app.salesperson,
        )
        .await;
    assert_eq!(fifth_decimal.status(), StatusCode::BAD_REQUEST);

    let trailing_zeros = app
        .post(
            "/api/v1/orders",
            Some(json!({
                "customer_id": customer,
                "items": [{ "product_id": product, "quantity": 1 }],
                "tax_rate": "0.082500",
            })),
            &app.salesperson,
        )
        .await;
    assert_eq!(trailing_zeros.status(), StatusCode::CREATED);
}
