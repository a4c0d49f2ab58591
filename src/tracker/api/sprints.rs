use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};
use serde::Deserialize;
use trofos_common::models::{Action, NewSprint, SprintStatus, SprintUpdate};

use super::{ApiError, ApiJson, SharedState};
use crate::errors::TrackerError;
use crate::tracker::auth::CurrentUser;
use crate::tracker::policy::{Policy, authorize};

#[derive(Deserialize)]
pub struct SprintStatusRequest {
    pub status: SprintStatus,
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/projects/{id}/sprints",
            get(list_sprints).post(create_sprint),
        )
        .route(
            "/api/projects/{id}/sprints/{sprint_id}",
            get(get_sprint).put(update_sprint).delete(delete_sprint),
        )
        .route(
            "/api/projects/{id}/sprints/{sprint_id}/status",
            put(set_status),
        )
        .route(
            "/api/projects/{id}/sprints/{sprint_id}/burndown",
            get(burndown),
        )
}

async fn list_sprints(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::ReadProject, Some(Policy::Project(id))).await?;
    let listing = state
        .db
        .call(move |db| {
            db.require_project(id)?;
            db.list_sprints_with_backlogs(id)
        })
        .await?;
    Ok(Json(listing))
}

async fn create_sprint(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<NewSprint>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::UpdateProject, Some(Policy::Project(id))).await?;
    let sprint = state.db.call(move |db| db.create_sprint(id, req)).await?;
    Ok((StatusCode::CREATED, Json(sprint)))
}

async fn get_sprint(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path((id, sprint_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::ReadProject, Some(Policy::Project(id))).await?;
    let sprint = state
        .db
        .call(move |db| {
            db.get_sprint(id, sprint_id)?
                .ok_or_else(|| TrackerError::SprintNotFound { id: sprint_id }.into())
        })
        .await?;
    Ok(Json(sprint))
}

async fn update_sprint(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path((id, sprint_id)): Path<(i64, i64)>,
    ApiJson(req): ApiJson<SprintUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::UpdateProject, Some(Policy::Project(id))).await?;
    let sprint = state
        .db
        .call(move |db| db.update_sprint(id, sprint_id, req))
        .await?;
    Ok(Json(sprint))
}

async fn delete_sprint(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path((id, sprint_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::UpdateProject, Some(Policy::Project(id))).await?;
    let deleted = state
        .db
        .call(move |db| db.delete_sprint(id, sprint_id))
        .await?;
    match deleted {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(ApiError::NotFound(format!("Sprint {} not found", sprint_id))),
    }
}

async fn set_status(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path((id, sprint_id)): Path<(i64, i64)>,
    ApiJson(req): ApiJson<SprintStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::UpdateProject, Some(Policy::Project(id))).await?;
    let status = req.status;
    let sprint = state
        .db
        .call(move |db| db.set_sprint_status(id, sprint_id, status))
        .await?;
    tracing::info!(
        project_id = id,
        sprint_id,
        status = %status,
        "sprint status changed"
    );
    Ok(Json(sprint))
}

async fn burndown(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path((id, sprint_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::ReadProject, Some(Policy::Project(id))).await?;
    let chart = state
        .db
        .call(move |db| db.sprint_burndown(id, sprint_id))
        .await?;
    Ok(Json(chart))
}
