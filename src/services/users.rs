use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{rbac, AuthUser, Role},
    db::DbPool,
    entities::user::{self, Entity as UserEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    PaginatedResponse,
};

/// Registers the profile row for an auth-provider account.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    /// Provider subject; generated when omitted
    pub id: Option<Uuid>,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRoleRequest {
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SetUserActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            full_name: model.full_name,
            role: model.role,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct UserService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl UserService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Profile lookup used by the session middleware.
    pub async fn find(&self, user_id: Uuid) -> Result<Option<user::Model>, ServiceError> {
        UserEntity::find_by_id(user_id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, %user_id, "Failed to load user profile");
                ServiceError::from(e)
            })
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_user(&self, user_id: Uuid) -> Result<UserResponse, ServiceError> {
        self.find(user_id)
            .await?
            .map(UserResponse::from)
            .ok_or_else(|| ServiceError::not_found("User", user_id))
    }

    #[instrument(skip(self))]
    pub async fn list_users(
        &self,
        role: Option<Role>,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<UserResponse>, ServiceError> {
        let (page, limit) = super::normalize_page(page, limit);

        let mut query = UserEntity::find().order_by_asc(user::Column::FullName);
        if let Some(role) = role {
            query = query.filter(user::Column::Role.eq(role));
        }

        let paginator = query.paginate(&*self.db_pool, limit);
        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count users");
            ServiceError::from(e)
        })?;
        let users = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page, limit, "Failed to fetch users page");
            ServiceError::from(e)
        })?;

        Ok(PaginatedResponse::new(
            users.into_iter().map(UserResponse::from).collect(),
            total,
            page,
            limit,
        ))
    }

    #[instrument(skip(self, actor, request), fields(email = %request.email))]
    pub async fn create_user(
        &self,
        actor: &AuthUser,
        request: CreateUserRequest,
    ) -> Result<UserResponse, ServiceError> {
        ensure_can_manage_users(actor)?;
        request.validate()?;

        let model = user::ActiveModel {
            id: Set(request.id.unwrap_or_else(Uuid::new_v4)),
            email: Set(request.email.trim().to_lowercase()),
            full_name: Set(request.full_name.trim().to_string()),
            role: Set(request.role),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create user profile");
            ServiceError::from(e)
        })?;

        info!(user_id = %model.id, role = %model.role, "User profile created");
        Ok(model.into())
    }

    #[instrument(skip(self, actor), fields(user_id = %user_id, role = %role))]
    pub async fn update_role(
        &self,
        actor: &AuthUser,
        user_id: Uuid,
        role: Role,
    ) -> Result<UserResponse, ServiceError> {
        ensure_can_manage_users(actor)?;
        if actor.user_id == user_id && role != actor.role {
            return Err(ServiceError::BadRequest(
                "managers cannot change their own role".to_string(),
            ));
        }

        let existing = self
            .find(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", user_id))?;
        if existing.role == role {
            return Ok(existing.into());
        }

        let mut active: user::ActiveModel = existing.into();
        active.role = Set(role);
        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, %user_id, "Failed to update user role");
            ServiceError::from(e)
        })?;

        info!(%user_id, %role, actor_id = %actor.user_id, "User role changed");
        super::publish(&self.event_sender, Event::UserRoleChanged { user_id, role }).await;

        Ok(updated.into())
    }

    #[instrument(skip(self, actor), fields(user_id = %user_id))]
    pub async fn set_active(
        &self,
        actor: &AuthUser,
        user_id: Uuid,
        is_active: bool,
    ) -> Result<UserResponse, ServiceError> {
        ensure_can_manage_users(actor)?;
        if actor.user_id == user_id && !is_active {
            return Err(ServiceError::BadRequest(
                "managers cannot deactivate themselves".to_string(),
            ));
        }

        let existing = self
            .find(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", user_id))?;

        let mut active: user::ActiveModel = existing.into();
        active.is_active = Set(is_active);
        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, %user_id, "Failed to update user active flag");
            ServiceError::from(e)
        })?;

        if !is_active {
            warn!(%user_id, actor_id = %actor.user_id, "User deactivated");
        }
        Ok(updated.into())
    }
}

fn ensure_can_manage_users(actor: &AuthUser) -> Result<(), ServiceError> {
    if rbac::can_manage_users(actor.role) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "only managers can manage users".to_string(),
        ))
    }
}
