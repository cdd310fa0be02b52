use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::DEFAULT_SESSION_COOKIE;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sales Order API",
        version = "1.0.0",
        description = r#"
# Sales Order API

Customers, a product catalog and a sales-order workflow with manager
approval and warehouse fulfillment.

## Roles

- **salesperson**: creates and edits own draft orders, submits them
- **manager**: sees every order, approves or rejects submitted orders, manages users
- **warehouse**: sees approved orders and fulfills them, adjusts stock

## Order lifecycle

`draft -> submitted -> approved -> fulfilled`, with `submitted -> rejected`
and `rejected -> submitted` for resubmission. Rejection needs a reason.
Fulfillment decrements stock for all lines or none.

## Authentication

Send the session token issued by the auth provider either as the
`sb-access-token` cookie or as a bearer token:

```
Authorization: Bearer <token>
```

## Pagination

List endpoints accept `page` (default 1), `limit` and `search`, and answer
with `{ items, total, page, limit, total_pages }`.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "orders", description = "Sales orders and their workflow"),
        (name = "customers", description = "Customer records"),
        (name = "products", description = "Product catalog and stock"),
        (name = "users", description = "User profiles and roles"),
        (name = "notifications", description = "Workflow notifications"),
        (name = "auth", description = "Session endpoints"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::status,
        crate::handlers::auth::me,
        crate::handlers::auth::logout,

        // Orders
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::create_order,
        crate::handlers::orders::update_order,
        crate::handlers::orders::delete_order,
        crate::handlers::orders::submit_order,
        crate::handlers::orders::approve_order,
        crate::handlers::orders::reject_order,
        crate::handlers::orders::fulfill_order,
        crate::handlers::orders::order_history,

        // Customers
        crate::handlers::customers::list_customers,
        crate::handlers::customers::get_customer,
        crate::handlers::customers::create_customer,
        crate::handlers::customers::update_customer,
        crate::handlers::customers::delete_customer,

        // Products
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::adjust_stock,
        crate::handlers::products::delete_product,

        // Users
        crate::handlers::users::list_users,
        crate::handlers::users::get_user,
        crate::handlers::users::create_user,
        crate::handlers::users::update_user_role,
        crate::handlers::users::set_user_active,

        crate::handlers::notifications::list_notifications,
    ),
    components(
        schemas(
            crate::workflow::OrderStatus,
            crate::workflow::LineStatus,
            crate::workflow::OrderAction,
            crate::auth::Role,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "SessionCookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(DEFAULT_SESSION_COOKIE))),
            );
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
