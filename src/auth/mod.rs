pub mod gate;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::{Identity, Role, UserProfile};
use crate::models::GeoPoint;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid or expired token")]
    InvalidCredential,

    #[error("user profile not found")]
    UnknownUser,

    #[error("email already registered: {0}")]
    DuplicateEmail(String),

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredential => AppError::Authentication(err.to_string()),
            AuthError::UnknownUser => AppError::Authentication(err.to_string()),
            AuthError::DuplicateEmail(_) => AppError::Conflict(err.to_string()),
            AuthError::Unavailable(detail) => AppError::Dependency(detail),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub organization_name: Option<String>,
    #[serde(default)]
    pub location_address: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

/// Verifies bearer credentials. Never issued or checked by this crate itself.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn register(&self, user: NewUser) -> Result<(UserProfile, String), AuthError>;

    async fn get(&self, id: Uuid) -> Result<Option<UserProfile>, AuthError>;

    async fn set_location(
        &self,
        id: Uuid,
        location: GeoPoint,
        address: Option<String>,
    ) -> Result<Option<UserProfile>, AuthError>;
}

#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| {
            AppError::Authentication("missing or invalid authorization header".to_string())
        })?;

        let identity = state.auth(state.identity.verify(token)).await?;
        Ok(AuthUser(identity))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}
