use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::gate::{self, Operation};
use crate::auth::{AuthUser, NewUser};
use crate::error::AppError;
use crate::models::user::UserProfile;
use crate::models::GeoPoint;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/users/me", get(me))
        .route("/api/users/me/location", patch(update_location))
}

#[derive(Serialize)]
pub struct SignupResponse {
    pub profile: UserProfile,
    pub token: String,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
    #[serde(default)]
    pub location_address: Option<String>,
}

async fn signup(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, Json<SignupResponse>), AppError> {
    let Json(user) = payload?;

    if user.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    if !user.email.contains('@') {
        return Err(AppError::Validation("email is not valid".to_string()));
    }
    if user.location.is_some_and(|location| !location.is_valid()) {
        return Err(AppError::Validation("location is out of range".to_string()));
    }

    let (profile, token) = state.auth(state.users.register(user)).await?;
    info!(user_id = %profile.id, role = %profile.role, "user registered");

    Ok((StatusCode::CREATED, Json(SignupResponse { profile, token })))
}

async fn me(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<UserProfile>, AppError> {
    gate::authorize(&identity, Operation::ViewProfile)?;

    let profile = state
        .auth(state.users.get(identity.id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", identity.id)))?;

    Ok(Json(profile))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<UpdateLocationRequest>, JsonRejection>,
) -> Result<Json<UserProfile>, AppError> {
    gate::authorize(&identity, Operation::UpdateLocation)?;
    let Json(payload) = payload?;

    if !payload.location.is_valid() {
        return Err(AppError::Validation("location is out of range".to_string()));
    }

    let profile = state
        .auth(
            state
                .users
                .set_location(identity.id, payload.location, payload.location_address),
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", identity.id)))?;

    info!(user_id = %identity.id, "location updated");
    Ok(Json(profile))
}
