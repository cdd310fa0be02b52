//! Customer and product catalog endpoints.

mod common;

use axum::http::StatusCode;
use common::{data_id, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn product_validation_and_duplicate_sku() {
    let app = TestApp::new().await;

    let negative_stock = app
        .post(
            "/api/v1/products",
            Some(json!({
                "sku": "NEG-1",
                "name": "Negative",
                "unit_price": "1.00",
                "cost_price": "0.50",
                "stock_quantity": -1,
            })),
            &app.manager,
        )
        .await;
    assert_eq!(negative_stock.status(), StatusCode::BAD_REQUEST);

    let negative_price = app
        .post(
            "/api/v1/products",
            Some(json!({
                "sku": "NEG-2",
                "name": "Negative price",
                "unit_price": "-1.00",
                "cost_price": "0.50",
            })),
            &app.manager,
        )
        .await;
    assert_eq!(negative_price.status(), StatusCode::BAD_REQUEST);

    let unknown_field = app
        .post(
            "/api/v1/products",
            Some(json!({
                "sku": "UNK-1",
                "name": "Unknown",
                "unit_price": "1.00",
                "cost_price": "0.50",
                "colour": "red",
            })),
            &app.manager,
        )
        .await;
    assert_eq!(unknown_field.status(), StatusCode::BAD_REQUEST);

    app.seed_product("dup-1", dec!(1.00), 0).await;
    let duplicate = app
        .post(
            "/api/v1/products",
            Some(json!({
                "sku": "DUP-1",
                "name": "Duplicate",
                "unit_price": "1.00",
                "cost_price": "0.50",
            })),
            &app.manager,
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn stock_adjustments_cannot_go_negative() {
    let app = TestApp::new().await;
    let product = app.seed_product("STK-1", dec!(1.00), 3).await;

    let too_much = app
        .post(
            &format!("/api/v1/products/{product}/stock"),
            Some(json!({ "delta": -4, "reason": "damaged" })),
            &app.warehouse,
        )
        .await;
    assert_eq!(too_much.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.product_stock(product).await, 3);

    let zero = app
        .post(
            &format!("/api/v1/products/{product}/stock"),
            Some(json!({ "delta": 0 })),
            &app.warehouse,
        )
        .await;
    assert_eq!(zero.status(), StatusCode::BAD_REQUEST);

    let write_off = app
        .post(
            &format!("/api/v1/products/{product}/stock"),
            Some(json!({ "delta": -3, "reason": "damaged" })),
            &app.warehouse,
        )
        .await;
    assert_eq!(write_off.status(), StatusCode::OK);
    let body = response_json(write_off).await;
    assert_eq!(body["data"]["stock_quantity"], 0);
}

#[tokio::test]
async fn referenced_rows_cannot_be_deleted() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Referenced Ltd").await;
    let product = app.seed_product("REF-1", dec!(1.00), 3).await;
    app.seed_order(customer, &[(product, 1)]).await;

    let delete_product = app
        .delete(&format!("/api/v1/products/{product}"), &app.manager)
        .await;
    assert_eq!(delete_product.status(), StatusCode::CONFLICT);

    let delete_customer = app
        .delete(&format!("/api/v1/customers/{customer}"), &app.manager)
        .await;
    assert_eq!(delete_customer.status(), StatusCode::CONFLICT);

    let unused = app.seed_product("FREE-1", dec!(1.00), 0).await;
    let delete_unused = app
        .delete(&format!("/api/v1/products/{unused}"), &app.manager)
        .await;
    assert_eq!(delete_unused.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn inactive_products_cannot_be_ordered() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Inactive Ltd").await;
    let product = app.seed_product("OLD-1", dec!(1.00), 3).await;

    let deactivate = app
        .put(
            &format!("/api/v1/products/{product}"),
            json!({ "is_active": false }),
            &app.manager,
        )
        .await;
    assert_eq!(deactivate.status(), StatusCode::OK);

    let order = app
        .post(
            "/api/v1/orders",
            Some(json!({
                "customer_id": customer,
                "items": [{ "product_id": product, "quantity": 1 }],
            })),
            &app.salesperson,
        )
        .await;
    assert_eq!(order.status(), StatusCode::BAD_REQUEST);

    let active_only =
        response_json(app.get("/api/v1/products?active_only=true", &app.salesperson).await).await;
    assert_eq!(active_only["data"]["total"], 0);
}

#[tokio::test]
async fn customer_search_and_pagination() {
    let app = TestApp::new().await;
    for name in ["Alpha Foods", "Beta Tools", "Alpine Gear"] {
        app.seed_customer(name).await;
    }

    let page = response_json(
        app.get("/api/v1/customers?search=alp&limit=1&page=2", &app.salesperson)
            .await,
    )
    .await;
    assert_eq!(page["data"]["total"], 2);
    assert_eq!(page["data"]["page"], 2);
    assert_eq!(page["data"]["limit"], 1);
    assert_eq!(page["data"]["total_pages"], 2);
    assert_eq!(page["data"]["items"].as_array().map(Vec::len), Some(1));

    let created = app.seed_customer("Gamma Ltd").await;
    let updated = app
        .put(
            &format!("/api/v1/customers/{created}"),
            json!({ "phone": "+1 555 0100" }),
            &app.salesperson,
        )
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    let body = response_json(updated).await;
    assert_eq!(data_id(&body), created);
    assert_eq!(body["data"]["phone"], "+1 555 0100");
    assert_eq!(body["data"]["name"], "Gamma Ltd");

    let bad_email = app
        .post(
            "/api/v1/customers",
            Some(json!({ "name": "Bad Mail", "email": "not-an-email" })),
            &app.salesperson,
        )
        .await;
    assert_eq!(bad_email.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn prices_beyond_the_column_range_are_rejected() {
    let app = TestApp::new().await;

    let huge = app
        .post(
            "/api/v1/products",
            Some(json!({
                "sku": "HUGE-1",
                "name": "Huge",
                "unit_price": "1000000000000000000000000",
                "cost_price": "0.50",
            })),
            &app.manager,
        )
        .await;
    assert_eq!(huge.status(), StatusCode::BAD_REQUEST);

    let at_limit = app.seed_product("MAX-1", dec!(9999999999.99), 0).await;
    let over_limit = app
        .put(
            &format!("/api/v1/products/{at_limit}"),
            json!({ "unit_price": "10000000000.00" }),
            &app.manager,
        )
        .await;
    assert_eq!(over_limit.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_is_case_insensitive_and_treats_wildcards_literally() {
    let app = TestApp::new().await;
    for name in ["100% Cotton Co", "Plain Ltd"] {
        app.seed_customer(name).await;
    }

    let percent =
        response_json(app.get("/api/v1/customers?search=%25", &app.salesperson).await).await;
    assert_eq!(percent["data"]["total"], 1);
    assert_eq!(percent["data"]["items"][0]["name"], "100% Cotton Co");

    let underscore =
        response_json(app.get("/api/v1/customers?search=_", &app.salesperson).await).await;
    assert_eq!(underscore["data"]["total"], 0);

    let upper =
        response_json(app.get("/api/v1/customers?search=PLAIN", &app.salesperson).await).await;
    assert_eq!(upper["data"]["total"], 1);

    app.seed_product("ab_c-1", dec!(1.00), 0).await;
    app.seed_product("abxc-2", dec!(1.00), 0).await;
    let products =
        response_json(app.get("/api/v1/products?search=B_C", &app.salesperson).await).await;
    assert_eq!(products["data"]["total"], 1);
    assert_eq!(products["data"]["items"][0]["sku"], "AB_C-1");
}
