//! Seed data script - populates the database with demo data
//!
//! Run with: cargo run --bin seed-data
//!
//! This creates:
//! - one user per role
//! - 4 customers
//! - 8 products with opening stock
//! - orders in draft, submitted, approved and fulfilled states
//!
//! and prints a session token for each user so the API can be explored
//! without the hosted auth provider.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use sales_order_api::{
    auth::{AuthUser, Role},
    config,
    db,
    entities::user,
    services::{
        customers::{CreateCustomerRequest, CustomerResponse},
        orders::{CreateOrderRequest, OrderItemInput},
        products::{CreateProductRequest, ProductResponse},
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("=== Sales Order API Seed Data ===");

    let cfg = config::load_config()?;
    info!("Connecting to database: {}", cfg.database_url);
    let pool = db::establish_connection_from_app_config(&cfg).await?;
    db::run_migrations(&pool).await?;
    let state = AppState::build(cfg, Arc::new(pool));

    info!("Creating users...");
    let manager = create_user(&state, "maria.manager@example.com", "Maria Manager", Role::Manager).await?;
    let sales = create_user(&state, "sam.sales@example.com", "Sam Sales", Role::Salesperson).await?;
    let warehouse =
        create_user(&state, "wes.warehouse@example.com", "Wes Warehouse", Role::Warehouse).await?;

    info!("Creating customers...");
    let customers = create_customers(&state, &sales).await?;
    info!("  Created {} customers", customers.len());

    info!("Creating products...");
    let products = create_products(&state, &manager).await?;
    info!("  Created {} products", products.len());

    info!("Creating orders...");
    let orders = &state.services.orders;
    let line = |idx: usize, quantity: i32| OrderItemInput {
        product_id: products[idx % products.len()].id,
        quantity,
    };
    let new_order = |customer: &CustomerResponse, items: Vec<OrderItemInput>| CreateOrderRequest {
        customer_id: customer.id,
        items,
        tax_rate: Some(dec!(0.08)),
        notes: None,
    };

    // Stays a draft
    orders
        .create_order(&sales, new_order(&customers[0], vec![line(0, 2), line(3, 1)]))
        .await?;

    let submitted = orders
        .create_order(&sales, new_order(&customers[1], vec![line(1, 5)]))
        .await?;
    orders.submit_order(&sales, submitted.id).await?;

    let approved = orders
        .create_order(&sales, new_order(&customers[2], vec![line(2, 3), line(4, 10)]))
        .await?;
    orders.submit_order(&sales, approved.id).await?;
    orders.approve_order(&manager, approved.id).await?;

    let fulfilled = orders
        .create_order(&sales, new_order(&customers[3], vec![line(5, 1), line(6, 4)]))
        .await?;
    orders.submit_order(&sales, fulfilled.id).await?;
    orders.approve_order(&manager, fulfilled.id).await?;
    orders.fulfill_order(&warehouse, fulfilled.id).await?;
    info!("  Created 4 orders");

    info!("\n=== Seed Data Complete ===");
    info!("Session tokens (send as the sb-access-token cookie or a bearer token):");
    for user in [&manager, &sales, &warehouse] {
        let token = state.auth.issue_session(user.user_id, &user.email)?;
        info!("  {:<12} {}", user.role.to_string(), token);
    }
    info!("");
    info!("Try these API calls:");
    info!("  curl -H 'Authorization: Bearer <token>' http://localhost:8080/api/v1/orders");
    info!("  curl -H 'Authorization: Bearer <token>' http://localhost:8080/api/v1/products");
    info!("");
    info!("Or explore interactively at: http://localhost:8080/swagger-ui");

    Ok(())
}

/// Profiles are inserted directly; the first manager cannot be created
/// through the API.
async fn create_user(
    state: &AppState,
    email: &str,
    full_name: &str,
    role: Role,
) -> anyhow::Result<AuthUser> {
    let profile = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        full_name: Set(full_name.to_string()),
        role: Set(role),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(state.db.as_ref())
    .await?;
    Ok(AuthUser::from_profile(profile, None))
}

async fn create_customers(
    state: &AppState,
    actor: &AuthUser,
) -> anyhow::Result<Vec<CustomerResponse>> {
    let seeds = [
        ("Acme Hardware", "orders@acme.example", "12 Market St, Springfield"),
        ("Bluebird Cafe", "owner@bluebird.example", "4 Harbor Rd, Portsmouth"),
        ("Northwind Traders", "buying@northwind.example", "900 Commerce Ave, Seattle"),
        ("Quillfeather Books", "hello@quillfeather.example", "77 Elm Row, Cambridge"),
    ];

    let mut created = Vec::with_capacity(seeds.len());
    for (name, email, address) in seeds {
        let customer = state
            .services
            .customers
            .create_customer(
                actor,
                CreateCustomerRequest {
                    name: name.to_string(),
                    email: Some(email.to_string()),
                    phone: None,
                    address: Some(address.to_string()),
                    tax_id: None,
                },
            )
            .await?;
        created.push(customer);
    }
    Ok(created)
}

async fn create_products(
    state: &AppState,
    actor: &AuthUser,
) -> anyhow::Result<Vec<ProductResponse>> {
    let seeds: [(&str, &str, Decimal, Decimal, i32); 8] = [
        ("WID-001", "Steel Widget", dec!(4.99), dec!(2.10), 500),
        ("WID-002", "Brass Widget", dec!(7.49), dec!(3.80), 250),
        ("GAD-100", "Desk Gadget", dec!(24.00), dec!(11.25), 80),
        ("GAD-200", "Pocket Gadget", dec!(12.50), dec!(5.00), 120),
        ("CAB-010", "USB-C Cable 1m", dec!(9.99), dec!(1.90), 1000),
        ("LMP-050", "LED Desk Lamp", dec!(39.95), dec!(17.40), 40),
        ("NTB-A5", "A5 Notebook", dec!(3.25), dec!(0.95), 750),
        ("PEN-BLK", "Gel Pen Black", dec!(1.20), dec!(0.30), 2000),
    ];

    let mut created = Vec::with_capacity(seeds.len());
    for (sku, name, unit_price, cost_price, stock_quantity) in seeds {
        let product = state
            .services
            .products
            .create_product(
                actor,
                CreateProductRequest {
                    sku: sku.to_string(),
                    name: name.to_string(),
                    description: None,
                    unit_price,
                    cost_price,
                    stock_quantity,
                    is_active: true,
                },
            )
            .await?;
        created.push(product);
    }
    Ok(created)
}
