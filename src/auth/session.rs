//! Session tokens issued by the hosted auth provider.
//!
//! The provider signs an HS256 JWT and hands it to the browser in a cookie.
//! This module reads that cookie (or a bearer header), verifies it and keeps
//! a short-lived revocation list for tokens presented at logout.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Claims carried by a session token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no session token presented")]
    Missing,
    #[error("session token has expired")]
    Expired,
    #[error("session token has been revoked")]
    Revoked,
    #[error("session token is invalid")]
    Invalid,
    #[error("failed to sign session token")]
    Signing,
}

/// Verification seam to the auth provider.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<SessionClaims, SessionError>;

    /// Rejects `claims` for the rest of their lifetime.
    async fn revoke(&self, claims: &SessionClaims);
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_secs: u64,
}

pub struct JwtSessionVerifier {
    settings: SessionSettings,
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
    revoked: RwLock<HashMap<String, i64>>,
}

impl JwtSessionVerifier {
    pub fn new(settings: SessionSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[settings.audience.as_str()]);
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.leeway = 30;

        Self {
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            settings,
            revoked: RwLock::new(HashMap::new()),
        }
    }

    /// Mints a token the same way the provider does.
    pub fn sign(&self, subject: Uuid, email: Option<String>) -> Result<String, SessionError> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: subject.to_string(),
            email,
            session_id: Some(Uuid::new_v4().to_string()),
            jti: Some(Uuid::new_v4().to_string()),
            iat: now,
            exp: now + self.settings.ttl_secs as i64,
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| SessionError::Signing)
    }
}

#[async_trait]
impl SessionVerifier for JwtSessionVerifier {
    async fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let claims = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
                other => {
                    debug!(error = ?other, "session token rejected");
                    SessionError::Invalid
                }
            })?
            .claims;

        if let Some(jti) = &claims.jti {
            if self.revoked.read().await.contains_key(jti) {
                return Err(SessionError::Revoked);
            }
        }

        Ok(claims)
    }

    async fn revoke(&self, claims: &SessionClaims) {
        let Some(jti) = claims.jti.clone() else {
            return;
        };
        let now = Utc::now().timestamp();
        let mut revoked = self.revoked.write().await;
        revoked.retain(|_, exp| *exp > now);
        revoked.insert(jti, claims.exp);
    }
}

/// Session token from the named cookie, falling back to `Authorization: Bearer`.
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    cookie_value(headers, cookie_name).or_else(|| bearer_token(headers))
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.trim_matches('"').to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_cookie(cookie_name: &str) -> String {
    format!(
        "{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax",
        cookie_name
    )
}
