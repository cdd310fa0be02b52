/*!
 * # Authentication Module
 *
 * Session handling for requests coming from the sales UI:
 *
 * - session token from the provider cookie or a bearer header
 * - verification through [`SessionVerifier`]
 * - profile lookup, producing the [`AuthUser`] request extension
 * - route-level permission gating via [`AuthRouterExt`]
 */

pub mod permissions;
pub mod rbac;
pub mod session;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::user;
use crate::errors::ServiceError;
use crate::services::users::UserService;

pub use permissions::{consts as perm, permission_matches, permissions_for_role};
pub use rbac::Role;
pub use session::{
    extract_session_token, JwtSessionVerifier, SessionClaims, SessionError, SessionSettings,
    SessionVerifier,
};

/// Identity headers forwarded to handlers. Inbound values are always discarded.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Authenticated principal attached to every request that passed the session check
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AuthUser {
    /// Principal for a stored profile, with the role's permission set.
    pub fn from_profile(profile: user::Model, session_id: Option<String>) -> Self {
        Self {
            user_id: profile.id,
            email: profile.email,
            full_name: profile.full_name,
            role: profile.role,
            permissions: permissions_for_role(profile.role),
            session_id,
        }
    }

    /// Check if the user has a specific permission, honouring `resource:*` grants
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|granted| permission_matches(granted, permission))
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ServiceError::Unauthorized("Authentication required".to_string()))
    }
}

impl From<SessionError> for ServiceError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Signing => ServiceError::InternalError(err.to_string()),
            _ => ServiceError::Unauthorized(err.to_string()),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub session: SessionSettings,
    pub cookie_name: String,
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            session: SessionSettings {
                secret: cfg.session_secret.clone(),
                issuer: cfg.session_issuer.clone(),
                audience: cfg.session_audience.clone(),
                ttl_secs: cfg.session_ttl_secs,
            },
            cookie_name: cfg.session_cookie_name.clone(),
        }
    }
}

pub struct AuthService {
    config: AuthConfig,
    signer: JwtSessionVerifier,
    verifier: Arc<dyn SessionVerifier>,
    users: Arc<UserService>,
}

impl AuthService {
    /// Verifies tokens with the provider's shared HS256 secret.
    pub fn new(config: AuthConfig, users: Arc<UserService>) -> Self {
        let verifier = Arc::new(JwtSessionVerifier::new(config.session.clone()));
        Self::with_verifier(config, verifier, users)
    }

    pub fn with_verifier(
        config: AuthConfig,
        verifier: Arc<dyn SessionVerifier>,
        users: Arc<UserService>,
    ) -> Self {
        Self {
            signer: JwtSessionVerifier::new(config.session.clone()),
            config,
            verifier,
            users,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.config.cookie_name
    }

    /// Mints a session token for `user_id`, standing in for the provider in
    /// local setups and tests.
    pub fn issue_session(&self, user_id: Uuid, email: &str) -> Result<String, ServiceError> {
        Ok(self.signer.sign(user_id, Some(email.to_string()))?)
    }

    /// Resolves the request's session into an [`AuthUser`].
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthUser, ServiceError> {
        let token =
            extract_session_token(headers, &self.config.cookie_name).ok_or(SessionError::Missing)?;
        let claims = self.verifier.verify(&token).await?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::Unauthorized("Invalid session subject".to_string()))?;

        let profile = self.users.find(user_id).await?.ok_or_else(|| {
            warn!(%user_id, "session subject has no profile");
            ServiceError::Unauthorized("No user profile for this session".to_string())
        })?;

        if !profile.is_active {
            return Err(ServiceError::Forbidden("Account is deactivated".to_string()));
        }

        Ok(AuthUser::from_profile(profile, claims.session_id))
    }

    /// Revokes the presented session, if it is still valid.
    pub async fn logout(&self, headers: &HeaderMap) {
        let Some(token) = extract_session_token(headers, &self.config.cookie_name) else {
            return;
        };
        match self.verifier.verify(&token).await {
            Ok(claims) => {
                self.verifier.revoke(&claims).await;
                debug!(sub = %claims.sub, "session revoked");
            }
            Err(e) => debug!(error = %e, "logout with unusable session"),
        }
    }
}

/// Session middleware: authenticates the request and forwards the identity.
///
/// Expects `Arc<AuthService>` in the request extensions.
pub async fn session_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return ServiceError::InternalError("Authentication service not available".into())
                .into_response();
        }
    };

    let headers = request.headers_mut();
    headers.remove(USER_ID_HEADER);
    headers.remove(USER_ROLE_HEADER);

    match auth_service.authenticate(request.headers()).await {
        Ok(user) => {
            let headers = request.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&user.user_id.to_string()) {
                headers.insert(USER_ID_HEADER, value);
            }
            if let Ok(value) = HeaderValue::from_str(&user.role.to_string()) {
                headers.insert(USER_ROLE_HEADER, value);
            }
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Permission middleware to check if the authenticated user holds `required_permission`
pub async fn permission_middleware(
    State(required_permission): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ServiceError::Unauthorized("Authentication required".to_string()))?;

    if !user.has_permission(&required_permission) {
        return Err(ServiceError::Forbidden(format!(
            "missing permission {}",
            required_permission
        )));
    }

    Ok(next.run(request).await)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_permission(self, permission: &str) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.route_layer(axum::middleware::from_fn(session_middleware))
    }

    fn with_permission(self, permission: &str) -> Self {
        self.route_layer(axum::middleware::from_fn_with_state(
            permission.to_string(),
            permission_middleware,
        ))
        .with_auth()
    }
}
