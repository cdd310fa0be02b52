use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{rbac, AuthUser, Role},
    db::DbPool,
    entities::{
        customer::Entity as CustomerEntity,
        order_item::{self, Entity as OrderItemEntity},
        order_status_history::{self, Entity as HistoryEntity},
        product::{self, Entity as ProductEntity},
        sale_order::{self, Entity as SaleOrderEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    pricing::{compute_totals, generate_order_number, line_total, round_money, validate_tax_rate},
    services::products::apply_stock_delta,
    workflow::{LineStatus, OrderAction, OrderStatus},
    PaginatedResponse,
};

/// Order settings taken from configuration
#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub default_tax_rate: Decimal,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            default_tax_rate: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct OrderItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 100000, message = "quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    #[validate(length(min = 1, message = "an order needs at least one item"))]
    pub items: Vec<OrderItemInput>,
    /// Fraction in `0..=1`; the configured default applies when omitted
    #[validate(custom = "validate_tax_rate")]
    #[schema(value_type = Option<String>, example = "0.0825")]
    pub tax_rate: Option<Decimal>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Partial update. When `items` is present it replaces every line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateOrderRequest {
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1, message = "an order needs at least one item"))]
    pub items: Option<Vec<OrderItemInput>>,
    #[validate(custom = "validate_tax_rate")]
    #[schema(value_type = Option<String>)]
    pub tax_rate: Option<Decimal>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RejectOrderRequest {
    #[validate(length(min = 1, max = 1000, message = "a rejection reason is required"))]
    pub reason: String,
}

/// Query filters for the order list
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListFilter {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    #[schema(value_type = String)]
    pub line_total: Decimal,
    pub line_status: LineStatus,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(model: order_item::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            quantity: model.quantity,
            unit_price: model.unit_price,
            line_total: model.line_total,
            line_status: model.line_status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub salesperson_id: Uuid,
    pub manager_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub status: OrderStatus,
    #[schema(value_type = String)]
    pub subtotal: Decimal,
    #[schema(value_type = String)]
    pub tax_rate: Decimal,
    #[schema(value_type = String)]
    pub tax_amount: Decimal,
    #[schema(value_type = String)]
    pub total: Decimal,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Lines; empty in list views
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<OrderItemResponse>,
    /// Transitions the caller may attempt right now
    pub allowed_actions: Vec<OrderAction>,
}

impl OrderResponse {
    fn build(model: sale_order::Model, items: Vec<order_item::Model>, actor: &AuthUser) -> Self {
        let order_ref = model.order_ref();
        let allowed_actions = model
            .status
            .allowed_actions()
            .into_iter()
            .filter(|action| rbac::can_perform(actor.role, actor.user_id, &order_ref, *action))
            .collect();

        Self {
            id: model.id,
            order_number: model.order_number,
            customer_id: model.customer_id,
            salesperson_id: model.salesperson_id,
            manager_id: model.manager_id,
            warehouse_id: model.warehouse_id,
            status: model.status,
            subtotal: model.subtotal,
            tax_rate: model.tax_rate,
            tax_amount: model.tax_amount,
            total: model.total,
            notes: model.notes,
            rejection_reason: model.rejection_reason,
            submitted_at: model.submitted_at,
            approved_at: model.approved_at,
            rejected_at: model.rejected_at,
            fulfilled_at: model.fulfilled_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
            items: items.into_iter().map(OrderItemResponse::from).collect(),
            allowed_actions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntryResponse {
    pub id: Uuid,
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub changed_by: Uuid,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<order_status_history::Model> for HistoryEntryResponse {
    fn from(model: order_status_history::Model) -> Self {
        Self {
            id: model.id,
            from_status: model.from_status,
            to_status: model.to_status,
            changed_by: model.changed_by,
            note: model.note,
            created_at: model.created_at,
        }
    }
}

/// A requested line with its catalog price captured.
#[derive(Debug, Clone)]
struct PricedLine {
    product_id: Uuid,
    quantity: i32,
    unit_price: Decimal,
}

/// Service for sale orders and their workflow
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    settings: OrderSettings,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        settings: OrderSettings,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            settings,
        }
    }

    /// Lists the orders visible to `actor`, newest first.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, role = %actor.role))]
    pub async fn list_orders(
        &self,
        actor: &AuthUser,
        filter: OrderListFilter,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<OrderResponse>, ServiceError> {
        let (page, limit) = super::normalize_page(page, limit);

        let mut query = SaleOrderEntity::find().order_by_desc(sale_order::Column::CreatedAt);
        query = match actor.role {
            Role::Manager => query,
            Role::Salesperson => query.filter(sale_order::Column::SalespersonId.eq(actor.user_id)),
            Role::Warehouse => query.filter(
                sale_order::Column::Status.is_in([OrderStatus::Approved, OrderStatus::Fulfilled]),
            ),
        };
        if let Some(status) = filter.status {
            query = query.filter(sale_order::Column::Status.eq(status));
        }
        if let Some(customer_id) = filter.customer_id {
            query = query.filter(sale_order::Column::CustomerId.eq(customer_id));
        }

        let paginator = query.paginate(&*self.db_pool, limit);
        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count orders");
            ServiceError::from(e)
        })?;
        let orders = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page, limit, "Failed to fetch orders page");
            ServiceError::from(e)
        })?;

        let items = orders
            .into_iter()
            .map(|order| OrderResponse::build(order, Vec::new(), actor))
            .collect();
        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    /// Retrieves an order with its lines
    #[instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn get_order(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let order = load_order(db, order_id).await?;
        ensure_access(actor, &order)?;
        let items = load_items(db, order_id).await?;
        Ok(OrderResponse::build(order, items, actor))
    }

    /// Creates a draft order. Items, totals and the opening history row are
    /// written in one transaction.
    #[instrument(skip(self, actor, request), fields(actor_id = %actor.user_id, customer_id = %request.customer_id))]
    pub async fn create_order(
        &self,
        actor: &AuthUser,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        if !rbac::can_create_order(actor.role) {
            return Err(ServiceError::Forbidden(
                "you cannot create orders".to_string(),
            ));
        }
        validate_order_items(&request)?;

        let tax_rate = request.tax_rate.unwrap_or(self.settings.default_tax_rate);
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::from(e)
        })?;

        ensure_customer_exists(&txn, request.customer_id).await?;
        let lines = price_lines(&txn, &request.items).await?;
        let totals = compute_totals(lines.iter().map(|l| (l.quantity, l.unit_price)), tax_rate)?;

        let order = sale_order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number(now)),
            customer_id: Set(request.customer_id),
            salesperson_id: Set(actor.user_id),
            manager_id: Set(None),
            warehouse_id: Set(None),
            status: Set(OrderStatus::Draft),
            subtotal: Set(totals.subtotal),
            tax_rate: Set(tax_rate),
            tax_amount: Set(totals.tax_amount),
            total: Set(totals.total),
            notes: Set(request.notes),
            rejection_reason: Set(None),
            submitted_at: Set(None),
            approved_at: Set(None),
            rejected_at: Set(None),
            fulfilled_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, %order_id, "Failed to insert order");
            ServiceError::from(e)
        })?;

        let items = insert_lines(&txn, order_id, &lines).await?;
        append_history(&txn, order_id, None, OrderStatus::Draft, actor.user_id, None).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %order_id, "Failed to commit order creation");
            ServiceError::from(e)
        })?;

        metrics::counter!("sales_orders_created_total", 1);
        info!(%order_id, order_number = %order.order_number, total = %order.total, "Order created");
        super::publish(
            &self.event_sender,
            Event::OrderCreated {
                order_id,
                order_number: order.order_number.clone(),
                salesperson_id: actor.user_id,
            },
        )
        .await;

        Ok(OrderResponse::build(order, items, actor))
    }

    /// Updates the header and, when given, replaces the lines.
    #[instrument(skip(self, actor, request), fields(order_id = %order_id))]
    pub async fn update_order(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
        request: UpdateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;
        if let Some(items) = &request.items {
            for item in items {
                item.validate()?;
            }
        }

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order update");
            ServiceError::from(e)
        })?;

        let order = load_order(&txn, order_id).await?;
        ensure_access(actor, &order)?;
        if !order.status.is_mutable() {
            return Err(ServiceError::InvalidStatus(format!(
                "an order in status '{}' can no longer be edited",
                order.status
            )));
        }
        if !rbac::can_edit_order(actor.role, actor.user_id, &order.order_ref()) {
            return Err(ServiceError::Forbidden(
                "you cannot edit this order".to_string(),
            ));
        }
        claim_order(&txn, &order).await?;

        if let Some(customer_id) = request.customer_id {
            ensure_customer_exists(&txn, customer_id).await?;
        }

        let items = match &request.items {
            Some(requested) => {
                let lines = price_lines(&txn, requested).await?;
                OrderItemEntity::delete_many()
                    .filter(order_item::Column::OrderId.eq(order_id))
                    .exec(&txn)
                    .await?;
                insert_lines(&txn, order_id, &lines).await?
            }
            None => load_items(&txn, order_id).await?,
        };

        let tax_rate = request.tax_rate.unwrap_or(order.tax_rate);
        let totals = compute_totals(items.iter().map(|i| (i.quantity, i.unit_price)), tax_rate)?;

        let mut active: sale_order::ActiveModel = order.into();
        if let Some(customer_id) = request.customer_id {
            active.customer_id = Set(customer_id);
        }
        if let Some(notes) = request.notes {
            active.notes = Set(Some(notes));
        }
        active.tax_rate = Set(tax_rate);
        active.subtotal = Set(totals.subtotal);
        active.tax_amount = Set(totals.tax_amount);
        active.total = Set(totals.total);

        let updated = active.update(&txn).await.map_err(|e| {
            error!(error = %e, %order_id, "Failed to update order");
            ServiceError::from(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %order_id, "Failed to commit order update");
            ServiceError::from(e)
        })?;

        info!(%order_id, total = %updated.total, "Order updated");
        super::publish(
            &self.event_sender,
            Event::OrderUpdated {
                order_id,
                order_number: updated.order_number.clone(),
                actor_id: actor.user_id,
            },
        )
        .await;

        Ok(OrderResponse::build(updated, items, actor))
    }

    /// Deletes a draft order with its lines and history.
    #[instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn delete_order(&self, actor: &AuthUser, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db_pool.begin().await?;

        let order = load_order(&txn, order_id).await?;
        ensure_access(actor, &order)?;
        if order.status != OrderStatus::Draft {
            return Err(ServiceError::InvalidStatus(format!(
                "only draft orders can be deleted; this one is '{}'",
                order.status
            )));
        }
        if !rbac::can_delete_order(actor.role, actor.user_id, &order.order_ref()) {
            return Err(ServiceError::Forbidden(
                "you cannot delete this order".to_string(),
            ));
        }
        claim_order(&txn, &order).await?;

        OrderItemEntity::delete_many()
            .filter(order_item::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
        HistoryEntity::delete_many()
            .filter(order_status_history::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
        SaleOrderEntity::delete_by_id(order_id).exec(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %order_id, "Failed to commit order deletion");
            ServiceError::from(e)
        })?;

        info!(%order_id, order_number = %order.order_number, "Draft order deleted");
        super::publish(
            &self.event_sender,
            Event::OrderDeleted {
                order_id,
                order_number: order.order_number,
                actor_id: actor.user_id,
            },
        )
        .await;

        Ok(())
    }

    pub async fn submit_order(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        self.transition(actor, order_id, OrderAction::Submit, None)
            .await
    }

    pub async fn approve_order(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        self.transition(actor, order_id, OrderAction::Approve, None)
            .await
    }

    pub async fn reject_order(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
        request: RejectOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;
        let reason = request.reason.trim().to_string();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "reason: a rejection reason is required".to_string(),
            ));
        }
        self.transition(actor, order_id, OrderAction::Reject, Some(reason))
            .await
    }

    /// Fulfills the whole order or nothing.
    pub async fn fulfill_order(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        self.transition(actor, order_id, OrderAction::Fulfill, None)
            .await
    }

    /// Audit trail, oldest first
    #[instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn order_history(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
    ) -> Result<Vec<HistoryEntryResponse>, ServiceError> {
        let db = &*self.db_pool;
        let order = load_order(db, order_id).await?;
        ensure_access(actor, &order)?;

        let entries = HistoryEntity::find()
            .filter(order_status_history::Column::OrderId.eq(order_id))
            .order_by_asc(order_status_history::Column::CreatedAt)
            .all(db)
            .await?;
        Ok(entries.into_iter().map(HistoryEntryResponse::from).collect())
    }

    /// Applies `action` inside one transaction: re-read the order, check the
    /// caller, step the status machine, write the side effects, append history.
    #[instrument(skip(self, actor, note), fields(order_id = %order_id, action = %action, actor_id = %actor.user_id))]
    async fn transition(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
        action: OrderAction,
        note: Option<String>,
    ) -> Result<OrderResponse, ServiceError> {
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order transition");
            ServiceError::from(e)
        })?;

        let order = load_order(&txn, order_id).await?;
        ensure_access(actor, &order)?;
        if !rbac::can_perform(actor.role, actor.user_id, &order.order_ref(), action) {
            return Err(ServiceError::Forbidden(format!(
                "you cannot {} this order",
                action
            )));
        }

        let from = order.status;
        let to = from.next(action)?;
        let now = Utc::now();

        let mut changes = sale_order::ActiveModel {
            status: Set(to),
            updated_at: Set(now),
            ..Default::default()
        };
        let mut stock_changes = Vec::new();

        match action {
            OrderAction::Submit => {
                let line_count = OrderItemEntity::find()
                    .filter(order_item::Column::OrderId.eq(order_id))
                    .count(&txn)
                    .await?;
                if line_count == 0 {
                    return Err(ServiceError::InvalidInput(
                        "an order needs at least one item before it can be submitted".to_string(),
                    ));
                }
                changes.submitted_at = Set(Some(now));
                changes.rejection_reason = Set(None);
            }
            OrderAction::Approve => {
                changes.manager_id = Set(Some(actor.user_id));
                changes.approved_at = Set(Some(now));
            }
            OrderAction::Reject => {
                changes.manager_id = Set(Some(actor.user_id));
                changes.rejected_at = Set(Some(now));
                changes.rejection_reason = Set(note.clone());
            }
            OrderAction::Fulfill => {
                stock_changes = reserve_stock(&txn, order_id).await?;
                OrderItemEntity::update_many()
                    .col_expr(order_item::Column::LineStatus, Expr::value(LineStatus::Fulfilled))
                    .filter(order_item::Column::OrderId.eq(order_id))
                    .exec(&txn)
                    .await?;
                changes.warehouse_id = Set(Some(actor.user_id));
                changes.fulfilled_at = Set(Some(now));
            }
        }

        // Guarded on the status we read so a concurrent transition cannot
        // also succeed.
        let result = SaleOrderEntity::update_many()
            .set(changes)
            .filter(sale_order::Column::Id.eq(order_id))
            .filter(sale_order::Column::Status.eq(from))
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, %order_id, "Failed to update order status");
                ServiceError::from(e)
            })?;
        if result.rows_affected != 1 {
            warn!(%order_id, %from, "Order changed status concurrently");
            return Err(ServiceError::InvalidStatus(format!(
                "order {} changed status while it was being updated",
                order.order_number
            )));
        }

        append_history(&txn, order_id, Some(from), to, actor.user_id, note.clone()).await?;

        let updated = load_order(&txn, order_id).await?;
        let items = load_items(&txn, order_id).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %order_id, "Failed to commit order transition");
            ServiceError::from(e)
        })?;

        let action_label = action.to_string();
        metrics::counter!("sales_order_transitions_total", 1, "action" => action_label);
        info!(%order_id, %from, %to, "Order status changed");

        super::publish(
            &self.event_sender,
            Event::OrderStatusChanged {
                order_id,
                order_number: updated.order_number.clone(),
                salesperson_id: updated.salesperson_id,
                from,
                to,
                actor_id: actor.user_id,
                note,
            },
        )
        .await;
        for change in stock_changes {
            super::publish(
                &self.event_sender,
                Event::StockAdjusted {
                    product_id: change.product_id,
                    sku: change.sku,
                    old_quantity: change.old_quantity,
                    new_quantity: change.new_quantity,
                    actor_id: actor.user_id,
                },
            )
            .await;
        }

        Ok(OrderResponse::build(updated, items, actor))
    }
}

struct StockChange {
    product_id: Uuid,
    sku: String,
    old_quantity: i32,
    new_quantity: i32,
}

/// Checks every product covers the order's demand, then decrements stock.
/// Nothing is written when any product falls short.
async fn reserve_stock(
    txn: &DatabaseTransaction,
    order_id: Uuid,
) -> Result<Vec<StockChange>, ServiceError> {
    let items = load_items(txn, order_id).await?;

    let mut demand: BTreeMap<Uuid, i32> = BTreeMap::new();
    for item in &items {
        let required = demand.entry(item.product_id).or_insert(0);
        *required = required.saturating_add(item.quantity);
    }

    let products: HashMap<Uuid, product::Model> = ProductEntity::find()
        .filter(product::Column::Id.is_in(demand.keys().copied()))
        .all(txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut shortages = Vec::new();
    for (product_id, required) in &demand {
        match products.get(product_id) {
            Some(p) if p.stock_quantity >= *required => {}
            Some(p) => shortages.push(format!(
                "{} (requested {}, available {})",
                p.sku, required, p.stock_quantity
            )),
            None => shortages.push(format!("{} (product no longer exists)", product_id)),
        }
    }
    if !shortages.is_empty() {
        warn!(%order_id, shortages = ?shortages, "Fulfillment blocked by insufficient stock");
        return Err(ServiceError::InsufficientStock(shortages.join(", ")));
    }

    // The checks above read a snapshot; each decrement re-checks in the
    // database so a concurrent fulfillment cannot oversell.
    for (product_id, required) in &demand {
        if !apply_stock_delta(txn, *product_id, -required).await? {
            let sku = products
                .get(product_id)
                .map(|p| p.sku.as_str())
                .unwrap_or_default();
            warn!(%order_id, %product_id, "Stock changed during fulfillment");
            return Err(ServiceError::InsufficientStock(format!(
                "{} (requested {}, stock changed during fulfillment)",
                sku, required
            )));
        }
    }

    let changes = ProductEntity::find()
        .filter(product::Column::Id.is_in(demand.keys().copied()))
        .all(txn)
        .await?
        .into_iter()
        .map(|updated| {
            let required = demand.get(&updated.id).copied().unwrap_or_default();
            StockChange {
                product_id: updated.id,
                sku: updated.sku,
                old_quantity: updated.stock_quantity + required,
                new_quantity: updated.stock_quantity,
            }
        })
        .collect();
    Ok(changes)
}

/// Pins the status read at the start of an edit or delete. The guarded
/// update locks the row, and a transition committed since the read leaves
/// nothing to match.
async fn claim_order(
    txn: &DatabaseTransaction,
    order: &sale_order::Model,
) -> Result<(), ServiceError> {
    let result = SaleOrderEntity::update_many()
        .col_expr(sale_order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(sale_order::Column::Id.eq(order.id))
        .filter(sale_order::Column::Status.eq(order.status))
        .exec(txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order.id, "Failed to lock order for update");
            ServiceError::from(e)
        })?;
    if result.rows_affected != 1 {
        warn!(order_id = %order.id, status = %order.status, "Order changed status concurrently");
        return Err(ServiceError::InvalidStatus(format!(
            "order {} changed status while it was being updated",
            order.order_number
        )));
    }
    Ok(())
}

fn ensure_access(actor: &AuthUser, order: &sale_order::Model) -> Result<(), ServiceError> {
    if rbac::can_access_order(actor.role, actor.user_id, &order.order_ref()) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "you do not have access to this order".to_string(),
        ))
    }
}

fn validate_order_items(request: &CreateOrderRequest) -> Result<(), ServiceError> {
    request.validate()?;
    for item in &request.items {
        item.validate()?;
    }
    Ok(())
}

async fn load_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<sale_order::Model, ServiceError> {
    SaleOrderEntity::find_by_id(order_id)
        .one(conn)
        .await
        .map_err(|e| {
            error!(error = %e, %order_id, "Failed to fetch order");
            ServiceError::from(e)
        })?
        .ok_or_else(|| ServiceError::not_found("Order", order_id))
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<order_item::Model>, ServiceError> {
    Ok(OrderItemEntity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::CreatedAt)
        .all(conn)
        .await?)
}

async fn ensure_customer_exists<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
) -> Result<(), ServiceError> {
    match CustomerEntity::find_by_id(customer_id).one(conn).await? {
        Some(_) => Ok(()),
        None => Err(ServiceError::InvalidInput(format!(
            "customer {} does not exist",
            customer_id
        ))),
    }
}

/// Resolves requested lines against the catalog, capturing current prices.
async fn price_lines<C: ConnectionTrait>(
    conn: &C,
    requested: &[OrderItemInput],
) -> Result<Vec<PricedLine>, ServiceError> {
    let ids: Vec<Uuid> = requested.iter().map(|item| item.product_id).collect();
    let catalog: HashMap<Uuid, product::Model> = ProductEntity::find()
        .filter(product::Column::Id.is_in(ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    requested
        .iter()
        .map(|item| {
            let product = catalog.get(&item.product_id).ok_or_else(|| {
                ServiceError::InvalidInput(format!("product {} does not exist", item.product_id))
            })?;
            if !product.is_active {
                return Err(ServiceError::InvalidInput(format!(
                    "product {} is inactive and cannot be ordered",
                    product.sku
                )));
            }
            Ok(PricedLine {
                product_id: product.id,
                quantity: item.quantity,
                unit_price: round_money(product.unit_price),
            })
        })
        .collect()
}

async fn insert_lines(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    lines: &[PricedLine],
) -> Result<Vec<order_item::Model>, ServiceError> {
    let mut inserted = Vec::with_capacity(lines.len());
    for line in lines {
        let model = order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(line.product_id),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            line_total: Set(line_total(line.quantity, line.unit_price)?),
            line_status: Set(LineStatus::Pending),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(|e| {
            error!(error = %e, %order_id, "Failed to insert order line");
            ServiceError::from(e)
        })?;
        inserted.push(model);
    }
    Ok(inserted)
}

async fn append_history(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    from: Option<OrderStatus>,
    to: OrderStatus,
    changed_by: Uuid,
    note: Option<String>,
) -> Result<(), ServiceError> {
    order_status_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        from_status: Set(from),
        to_status: Set(to),
        changed_by: Set(changed_by),
        note: Set(note),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await
    .map_err(|e| {
        error!(error = %e, %order_id, "Failed to append order history");
        ServiceError::from(e)
    })?;
    Ok(())
}
