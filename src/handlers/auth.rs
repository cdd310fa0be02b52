use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    auth::{session::clear_cookie, AuthUser},
    errors::ServiceError,
    handlers::AppState,
    ApiResponse,
};

/// Current user profile and effective permissions
#[utoipa::path(
    get,
    path = "/api/v1/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<AuthUser>),
        (status = 401, description = "No valid session", body = crate::errors::ErrorResponse),
        (status = 403, description = "Account deactivated", body = crate::errors::ErrorResponse),
    ),
    security(("SessionCookie" = []), ("Bearer" = []))
)]
pub async fn me(user: AuthUser) -> Json<ApiResponse<AuthUser>> {
    Json(ApiResponse::success(user))
}

/// Revokes the presented session and clears the session cookie.
///
/// Always succeeds; an absent or expired session has nothing to revoke.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses((status = 204, description = "Session cleared"))
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ServiceError> {
    state.auth.logout(&headers).await;

    let cookie = HeaderValue::from_str(&clear_cookie(state.auth.cookie_name()))
        .map_err(|e| ServiceError::InternalError(format!("invalid cookie header: {}", e)))?;

    let mut response = StatusCode::NO_CONTENT.into_response();
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}
