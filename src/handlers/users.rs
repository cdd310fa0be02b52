use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    auth::{AuthUser, Role},
    errors::ServiceError,
    handlers::{ApiJson, AppState},
    services::users::{
        CreateUserRequest, SetUserActiveRequest, UpdateUserRoleRequest, UserResponse,
    },
    ApiResponse, ListQuery, PaginatedResponse,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserListFilter {
    /// Only users holding this role
    pub role: Option<Role>,
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    params(ListQuery, UserListFilter),
    responses(
        (status = 200, description = "Users", body = ApiResponse<PaginatedResponse<UserResponse>>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("SessionCookie" = []), ("Bearer" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<UserListFilter>,
) -> Result<Json<ApiResponse<PaginatedResponse<UserResponse>>>, ServiceError> {
    let limit = state.config.page_size(query.limit);
    let users = state
        .services
        .users
        .list_users(filter.role, query.page, limit)
        .await?;
    Ok(Json(ApiResponse::success(users)))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = ApiResponse<UserResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("SessionCookie" = []), ("Bearer" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<UserResponse>>, ServiceError> {
    let user = state.services.users.get_user(id).await?;
    Ok(Json(ApiResponse::success(user)))
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Profile created", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse),
    ),
    security(("SessionCookie" = []), ("Bearer" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>), ServiceError> {
    let created = state.services.users.create_user(&user, payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/{id}/role",
    tag = "users",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("SessionCookie" = []), ("Bearer" = []))
)]
pub async fn update_user_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateUserRoleRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ServiceError> {
    let updated = state
        .services
        .users
        .update_role(&user, id, payload.role)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/{id}/active",
    tag = "users",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = SetUserActiveRequest,
    responses(
        (status = 200, description = "Active flag updated", body = ApiResponse<UserResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("SessionCookie" = []), ("Bearer" = []))
)]
pub async fn set_user_active(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<SetUserActiveRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ServiceError> {
    let updated = state
        .services
        .users
        .set_active(&user, id, payload.is_active)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}
