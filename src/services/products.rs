use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    auth::{rbac, AuthUser},
    db::DbPool,
    entities::{
        order_item::{self, Entity as OrderItemEntity},
        product::{self, Entity as ProductEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    pricing::validate_amount,
    PaginatedResponse,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 100, message = "SKU is required"))]
    pub sku: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom = "validate_amount")]
    #[schema(value_type = String, example = "19.99")]
    pub unit_price: Decimal,
    #[validate(custom = "validate_amount")]
    #[schema(value_type = String, example = "12.50")]
    pub cost_price: Decimal,
    #[validate(range(min = 0, message = "stock cannot be negative"))]
    #[serde(default)]
    pub stock_quantity: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Partial update. Stock is changed through [`ProductService::adjust_stock`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_amount")]
    #[schema(value_type = Option<String>)]
    pub unit_price: Option<Decimal>,
    #[validate(custom = "validate_amount")]
    #[schema(value_type = Option<String>)]
    pub cost_price: Option<Decimal>,
    pub is_active: Option<bool>,
}

/// Signed stock change, e.g. `+40` for a receipt or `-2` for a write-off.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct AdjustStockRequest {
    #[validate(custom = "validate_delta")]
    pub delta: i32,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

fn validate_delta(delta: i32) -> Result<(), ValidationError> {
    if delta == 0 {
        return Err(ValidationError::new("non_zero"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    #[schema(value_type = String)]
    pub cost_price: Decimal,
    pub stock_quantity: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<product::Model> for ProductResponse {
    fn from(model: product::Model) -> Self {
        Self {
            id: model.id,
            sku: model.sku,
            name: model.name,
            description: model.description,
            unit_price: model.unit_price,
            cost_price: model.cost_price,
            stock_quantity: model.stock_quantity,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct ProductService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl ProductService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    async fn find(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        ProductEntity::find_by_id(product_id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, %product_id, "Failed to fetch product");
                ServiceError::from(e)
            })?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))
    }

    /// Lists the catalog. `search` matches SKU or name.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        search: Option<&str>,
        active_only: bool,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<ProductResponse>, ServiceError> {
        let (page, limit) = super::normalize_page(page, limit);

        let mut query = ProductEntity::find().order_by_asc(product::Column::Name);
        if active_only {
            query = query.filter(product::Column::IsActive.eq(true));
        }
        if let Some(condition) =
            super::search_condition(search, &[product::Column::Sku, product::Column::Name])
        {
            query = query.filter(condition);
        }

        let paginator = query.paginate(&*self.db_pool, limit);
        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count products");
            ServiceError::from(e)
        })?;
        let products = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page, limit, "Failed to fetch products page");
            ServiceError::from(e)
        })?;

        Ok(PaginatedResponse::new(
            products.into_iter().map(ProductResponse::from).collect(),
            total,
            page,
            limit,
        ))
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductResponse, ServiceError> {
        self.find(product_id).await.map(ProductResponse::from)
    }

    #[instrument(skip(self, actor, request), fields(sku = %request.sku))]
    pub async fn create_product(
        &self,
        actor: &AuthUser,
        request: CreateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        ensure_can_manage(actor)?;
        request.validate()?;

        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(request.sku.trim().to_uppercase()),
            name: Set(request.name.trim().to_string()),
            description: Set(request.description),
            unit_price: Set(request.unit_price),
            cost_price: Set(request.cost_price),
            stock_quantity: Set(request.stock_quantity),
            is_active: Set(request.is_active),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create product");
            ServiceError::from(e)
        })?;

        info!(product_id = %model.id, sku = %model.sku, "Product created");
        Ok(model.into())
    }

    #[instrument(skip(self, actor, request), fields(product_id = %product_id))]
    pub async fn update_product(
        &self,
        actor: &AuthUser,
        product_id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        ensure_can_manage(actor)?;
        request.validate()?;

        let mut active: product::ActiveModel = self.find(product_id).await?.into();
        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = request.description {
            active.description = Set(Some(description));
        }
        if let Some(unit_price) = request.unit_price {
            active.unit_price = Set(unit_price);
        }
        if let Some(cost_price) = request.cost_price {
            active.cost_price = Set(cost_price);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }

        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, %product_id, "Failed to update product");
            ServiceError::from(e)
        })?;

        info!(%product_id, "Product updated");
        Ok(updated.into())
    }

    /// Applies a signed stock delta. The resulting quantity may not drop below zero.
    #[instrument(skip(self, actor, request), fields(product_id = %product_id, delta = request.delta))]
    pub async fn adjust_stock(
        &self,
        actor: &AuthUser,
        product_id: Uuid,
        request: AdjustStockRequest,
    ) -> Result<ProductResponse, ServiceError> {
        if !rbac::can_adjust_stock(actor.role) {
            return Err(ServiceError::Forbidden(
                "you cannot adjust stock".to_string(),
            ));
        }
        request.validate()?;

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for stock adjustment");
            ServiceError::from(e)
        })?;

        let product = ProductEntity::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;

        if !apply_stock_delta(&txn, product_id, request.delta).await? {
            let outcome = if request.delta < 0 {
                "negative stock"
            } else {
                "more stock than can be counted"
            };
            return Err(ServiceError::InvalidInput(format!(
                "adjustment of {} would leave {} with {} ({} on hand)",
                request.delta, product.sku, outcome, product.stock_quantity
            )));
        }

        let updated = ProductEntity::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;
        let sku = updated.sku.clone();
        let new_quantity = updated.stock_quantity;
        let old_quantity = new_quantity - request.delta;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %product_id, "Failed to commit stock adjustment");
            ServiceError::from(e)
        })?;

        let direction = if request.delta < 0 { "down" } else { "up" };
        metrics::counter!("sales_stock_adjustments_total", 1, "direction" => direction);
        info!(
            %product_id,
            old_quantity,
            new_quantity,
            reason = request.reason.as_deref().unwrap_or(""),
            actor_id = %actor.user_id,
            "Stock adjusted"
        );
        super::publish(
            &self.event_sender,
            Event::StockAdjusted {
                product_id,
                sku,
                old_quantity,
                new_quantity,
                actor_id: actor.user_id,
            },
        )
        .await;

        Ok(updated.into())
    }

    /// Deletes a product no order line references. Referenced products can
    /// only be deactivated.
    #[instrument(skip(self, actor), fields(product_id = %product_id))]
    pub async fn delete_product(&self, actor: &AuthUser, product_id: Uuid) -> Result<(), ServiceError> {
        ensure_can_manage(actor)?;

        let existing = self.find(product_id).await?;
        let referencing = OrderItemEntity::find()
            .filter(order_item::Column::ProductId.eq(product_id))
            .count(&*self.db_pool)
            .await?;
        if referencing > 0 {
            warn!(%product_id, referencing, "Refusing to delete product on order lines");
            return Err(ServiceError::Conflict(format!(
                "product {} is used by {} order line(s); deactivate it instead",
                existing.sku, referencing
            )));
        }

        existing.delete(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, %product_id, "Failed to delete product");
            ServiceError::from(e)
        })?;

        info!(%product_id, "Product deleted");
        Ok(())
    }
}

fn ensure_can_manage(actor: &AuthUser) -> Result<(), ServiceError> {
    if rbac::can_manage_products(actor.role) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "only managers can change the catalog".to_string(),
        ))
    }
}

/// Adds `delta` to a product's stock in a single statement, so concurrent
/// adjustments cannot overwrite each other. Returns `false`, writing nothing,
/// when the result would fall outside `0..=i32::MAX`.
pub(crate) async fn apply_stock_delta<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    delta: i32,
) -> Result<bool, ServiceError> {
    let in_range = if delta < 0 {
        product::Column::StockQuantity.gte(-i64::from(delta))
    } else {
        product::Column::StockQuantity.lte(i64::from(i32::MAX) - i64::from(delta))
    };

    let result = ProductEntity::update_many()
        .col_expr(
            product::Column::StockQuantity,
            Expr::col(product::Column::StockQuantity).add(delta),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .filter(in_range)
        .exec(conn)
        .await
        .map_err(|e| {
            error!(error = %e, %product_id, delta, "Failed to apply stock delta");
            ServiceError::from(e)
        })?;

    Ok(result.rows_affected == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> CreateProductRequest {
        CreateProductRequest {
            sku: "WID-001".into(),
            name: "Widget".into(),
            description: None,
            unit_price: dec!(19.99),
            cost_price: dec!(12.50),
            stock_quantity: 10,
            is_active: true,
        }
    }

    #[test]
    fn valid_product_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn negative_stock_and_price_are_rejected() {
        let bad = CreateProductRequest {
            stock_quantity: -1,
            unit_price: dec!(-5),
            ..request()
        };
        let err: ServiceError = bad.validate().unwrap_err().into();
        let ServiceError::ValidationError(message) = err else {
            panic!("expected validation error");
        };
        assert!(message.contains("stock_quantity"));
        assert!(message.contains("unit_price"));
    }

    #[test]
    fn zero_stock_delta_is_rejected() {
        let request = AdjustStockRequest {
            delta: 0,
            reason: None,
        };
        assert!(request.validate().is_err());
    }

    async fn stocked_product(pool: &DbPool, stock: i32) -> Uuid {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set("WID-001".into()),
            name: Set("Widget".into()),
            unit_price: Set(dec!(19.99)),
            cost_price: Set(dec!(12.50)),
            stock_quantity: Set(stock),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(pool)
        .await
        .unwrap()
        .id
    }

    async fn stock_of(pool: &DbPool, product_id: Uuid) -> i32 {
        ProductEntity::find_by_id(product_id)
            .one(pool)
            .await
            .unwrap()
            .unwrap()
            .stock_quantity
    }

    #[tokio::test]
    async fn stock_delta_applies_against_the_current_row() {
        let pool = crate::db::test_pool().await;
        let id = stocked_product(&pool, 10).await;

        // A caller that read 10 units loses the race to another decrement.
        let stale = stock_of(&pool, id).await;
        assert!(apply_stock_delta(&pool, id, -8).await.unwrap());
        assert!(!apply_stock_delta(&pool, id, -stale).await.unwrap());
        assert_eq!(stock_of(&pool, id).await, 2);

        assert!(apply_stock_delta(&pool, id, -2).await.unwrap());
        assert_eq!(stock_of(&pool, id).await, 0);
        assert!(!apply_stock_delta(&pool, id, -1).await.unwrap());
    }

    #[tokio::test]
    async fn stock_delta_refuses_overflow_and_unknown_products() {
        let pool = crate::db::test_pool().await;
        let id = stocked_product(&pool, 5).await;

        assert!(!apply_stock_delta(&pool, id, i32::MAX).await.unwrap());
        assert_eq!(stock_of(&pool, id).await, 5);
        assert!(apply_stock_delta(&pool, id, i32::MAX - 5).await.unwrap());
        assert_eq!(stock_of(&pool, id).await, i32::MAX);

        assert!(!apply_stock_delta(&pool, Uuid::new_v4(), 1).await.unwrap());
    }

    #[test]
    fn create_defaults_apply() {
        let parsed: CreateProductRequest = serde_json::from_value(serde_json::json!({
            "sku": "X-1",
            "name": "X",
            "unit_price": "1.00",
            "cost_price": "0.50"
        }))
        .unwrap();
        assert_eq!(parsed.stock_quantity, 0);
        assert!(parsed.is_active);
    }
}
