use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{rbac, AuthUser},
    db::DbPool,
    entities::{
        customer::{self, Entity as CustomerEntity},
        sale_order::{self, Entity as SaleOrderEntity},
    },
    errors::ServiceError,
    PaginatedResponse,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(max = 1000))]
    pub address: Option<String>,
    #[validate(length(max = 50))]
    pub tax_id: Option<String>,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateCustomerRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(max = 1000))]
    pub address: Option<String>,
    #[validate(length(max = 50))]
    pub tax_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerResponse {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub tax_id: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<customer::Model> for CustomerResponse {
    fn from(model: customer::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            phone: model.phone,
            address: model.address,
            tax_id: model.tax_id,
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Service for managing customers
#[derive(Clone)]
pub struct CustomerService {
    db_pool: Arc<DbPool>,
}

impl CustomerService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    async fn find(&self, customer_id: Uuid) -> Result<customer::Model, ServiceError> {
        CustomerEntity::find_by_id(customer_id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, %customer_id, "Failed to fetch customer");
                ServiceError::from(e)
            })?
            .ok_or_else(|| ServiceError::not_found("Customer", customer_id))
    }

    /// Lists customers, optionally matching `search` against name or email
    #[instrument(skip(self))]
    pub async fn list_customers(
        &self,
        search: Option<&str>,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<CustomerResponse>, ServiceError> {
        let (page, limit) = super::normalize_page(page, limit);

        let mut query = CustomerEntity::find().order_by_asc(customer::Column::Name);
        if let Some(condition) =
            super::search_condition(search, &[customer::Column::Name, customer::Column::Email])
        {
            query = query.filter(condition);
        }

        let paginator = query.paginate(&*self.db_pool, limit);
        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count customers");
            ServiceError::from(e)
        })?;
        let customers = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page, limit, "Failed to fetch customers page");
            ServiceError::from(e)
        })?;

        Ok(PaginatedResponse::new(
            customers.into_iter().map(CustomerResponse::from).collect(),
            total,
            page,
            limit,
        ))
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn get_customer(&self, customer_id: Uuid) -> Result<CustomerResponse, ServiceError> {
        self.find(customer_id).await.map(CustomerResponse::from)
    }

    #[instrument(skip(self, actor, request), fields(actor_id = %actor.user_id))]
    pub async fn create_customer(
        &self,
        actor: &AuthUser,
        request: CreateCustomerRequest,
    ) -> Result<CustomerResponse, ServiceError> {
        if !rbac::can_manage_customers(actor.role) {
            return Err(ServiceError::Forbidden(
                "you cannot create customers".to_string(),
            ));
        }
        request.validate()?;

        let model = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            email: Set(request.email.map(|e| e.trim().to_lowercase())),
            phone: Set(request.phone),
            address: Set(request.address),
            tax_id: Set(request.tax_id),
            created_by: Set(actor.user_id),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create customer");
            ServiceError::from(e)
        })?;

        info!(customer_id = %model.id, "Customer created");
        Ok(model.into())
    }

    #[instrument(skip(self, actor, request), fields(customer_id = %customer_id))]
    pub async fn update_customer(
        &self,
        actor: &AuthUser,
        customer_id: Uuid,
        request: UpdateCustomerRequest,
    ) -> Result<CustomerResponse, ServiceError> {
        if !rbac::can_manage_customers(actor.role) {
            return Err(ServiceError::Forbidden(
                "you cannot edit customers".to_string(),
            ));
        }
        request.validate()?;

        let mut active: customer::ActiveModel = self.find(customer_id).await?.into();
        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(email) = request.email {
            active.email = Set(Some(email.trim().to_lowercase()));
        }
        if let Some(phone) = request.phone {
            active.phone = Set(Some(phone));
        }
        if let Some(address) = request.address {
            active.address = Set(Some(address));
        }
        if let Some(tax_id) = request.tax_id {
            active.tax_id = Set(Some(tax_id));
        }

        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, %customer_id, "Failed to update customer");
            ServiceError::from(e)
        })?;

        info!(%customer_id, "Customer updated");
        Ok(updated.into())
    }

    /// Deletes a customer that no order references.
    #[instrument(skip(self, actor), fields(customer_id = %customer_id))]
    pub async fn delete_customer(
        &self,
        actor: &AuthUser,
        customer_id: Uuid,
    ) -> Result<(), ServiceError> {
        if !rbac::can_delete_customers(actor.role) {
            return Err(ServiceError::Forbidden(
                "only managers can delete customers".to_string(),
            ));
        }

        let existing = self.find(customer_id).await?;
        let referencing = SaleOrderEntity::find()
            .filter(sale_order::Column::CustomerId.eq(customer_id))
            .count(&*self.db_pool)
            .await?;
        if referencing > 0 {
            warn!(%customer_id, referencing, "Refusing to delete customer with orders");
            return Err(ServiceError::Conflict(format!(
                "customer {} is referenced by {} order(s)",
                customer_id, referencing
            )));
        }

        existing.delete(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, %customer_id, "Failed to delete customer");
            ServiceError::from(e)
        })?;

        info!(%customer_id, "Customer deleted");
        Ok(())
    }
}
