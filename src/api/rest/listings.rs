use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::engine::listings;
use crate::error::AppError;
use crate::models::listing::{Listing, ListingDetails, ListingStatus, ListingView};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/listings", post(create_listing))
        .route("/api/listings/mine", get(my_listings))
        .route("/api/listings/available", get(available_listings))
        .route(
            "/api/listings/:id",
            get(get_listing).put(edit_listing).delete(delete_listing),
        )
        .route("/api/listings/:id/status", patch(update_listing_status))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ListingStatus,
}

async fn create_listing(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<ListingDetails>, JsonRejection>,
) -> Result<(StatusCode, Json<Listing>), AppError> {
    let Json(details) = payload?;
    let listing = listings::create_listing(&state, &identity, details).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

async fn my_listings(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Vec<Listing>>, AppError> {
    Ok(Json(listings::list_own_listings(&state, &identity).await?))
}

async fn available_listings(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Vec<ListingView>>, AppError> {
    Ok(Json(
        listings::list_available_listings(&state, &identity).await?,
    ))
}

async fn get_listing(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Listing>, AppError> {
    Ok(Json(listings::get_listing(&state, &identity, id).await?))
}

async fn edit_listing(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<ListingDetails>, JsonRejection>,
) -> Result<Json<Listing>, AppError> {
    let Json(details) = payload?;
    Ok(Json(
        listings::edit_listing(&state, &identity, id, details).await?,
    ))
}

async fn update_listing_status(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<Listing>, AppError> {
    let Json(payload) = payload?;
    Ok(Json(
        listings::change_listing_status(&state, &identity, id, payload.status).await?,
    ))
}

async fn delete_listing(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    listings::delete_listing(&state, &identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
