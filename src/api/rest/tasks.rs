use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::engine::matcher::{self, NearbyResult};
use crate::engine::tasks;
use crate::error::AppError;
use crate::models::task::{Task, TaskDetails, TaskStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tasks/nearby", get(nearby))
        .route("/api/tasks/accept", post(accept))
        .route("/api/tasks/mine", get(my_tasks))
        .route("/api/tasks/:id/status", patch(update_task_status))
        .route("/api/tasks/:id/recipient", patch(assign_recipient))
}

#[derive(Deserialize)]
pub struct NearbyQuery {
    pub radius: Option<f64>,
}

#[derive(Deserialize)]
pub struct AcceptRequest {
    pub listing_id: Uuid,
    #[serde(default)]
    pub recipient_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub status: TaskStatus,
}

#[derive(Deserialize)]
pub struct AssignRecipientRequest {
    pub recipient_id: Uuid,
}

async fn nearby(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    query: Result<Query<NearbyQuery>, QueryRejection>,
) -> Result<Json<NearbyResult>, AppError> {
    let Query(query) = query?;
    Ok(Json(
        matcher::find_nearby(&state, &identity, query.radius).await?,
    ))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<AcceptRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    let Json(payload) = payload?;
    let task =
        tasks::accept_listing(&state, &identity, payload.listing_id, payload.recipient_id).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn my_tasks(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Vec<TaskDetails>>, AppError> {
    Ok(Json(tasks::list_own_tasks(&state, &identity).await?))
}

async fn update_task_status(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateTaskStatusRequest>, JsonRejection>,
) -> Result<Json<Task>, AppError> {
    let Json(payload) = payload?;
    Ok(Json(
        tasks::advance_task(&state, &identity, id, payload.status).await?,
    ))
}

async fn assign_recipient(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<AssignRecipientRequest>, JsonRejection>,
) -> Result<Json<Task>, AppError> {
    let Json(payload) = payload?;
    Ok(Json(
        tasks::assign_recipient(&state, &identity, id, payload.recipient_id).await?,
    ))
}
