use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use trofos_common::models::{Action, BacklogUpdate, NewBacklog};

use super::{ApiError, ApiJson, SharedState};
use crate::errors::TrackerError;
use crate::tracker::auth::CurrentUser;
use crate::tracker::policy::{Policy, authorize};

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub sprint_id: Option<i64>,
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/projects/{id}/backlogs",
            get(list_backlogs).post(create_backlog),
        )
        .route(
            "/api/projects/{id}/backlogs/unassigned",
            get(list_unassigned),
        )
        .route(
            "/api/projects/{id}/backlogs/{backlog_id}",
            get(get_backlog).put(update_backlog).delete(delete_backlog),
        )
        .route("/api/projects/{id}/history", get(list_history))
}

async fn list_backlogs(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::ReadProject, Some(Policy::Project(id))).await?;
    let backlogs = state
        .db
        .call(move |db| {
            db.require_project(id)?;
            db.list_backlogs(id)
        })
        .await?;
    Ok(Json(backlogs))
}

async fn list_unassigned(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::ReadProject, Some(Policy::Project(id))).await?;
    let backlogs = state
        .db
        .call(move |db| {
            db.require_project(id)?;
            db.list_unassigned_backlogs(id)
        })
        .await?;
    Ok(Json(backlogs))
}

async fn create_backlog(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<NewBacklog>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::UpdateProject, Some(Policy::Project(id))).await?;
    let backlog = state.db.call(move |db| db.create_backlog(id, req)).await?;
    tracing::debug!(
        project_id = id,
        backlog_id = backlog.backlog_id,
        "backlog created"
    );
    Ok((StatusCode::CREATED, Json(backlog)))
}

async fn get_backlog(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path((id, backlog_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::ReadProject, Some(Policy::Project(id))).await?;
    let backlog = state
        .db
        .call(move |db| {
            db.get_backlog(id, backlog_id)?.ok_or_else(|| {
                TrackerError::BacklogNotFound {
                    project_id: id,
                    backlog_id,
                }
                .into()
            })
        })
        .await?;
    Ok(Json(backlog))
}

async fn update_backlog(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path((id, backlog_id)): Path<(i64, i64)>,
    ApiJson(req): ApiJson<BacklogUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::UpdateProject, Some(Policy::Project(id))).await?;
    let backlog = state
        .db
        .call(move |db| db.update_backlog(id, backlog_id, req))
        .await?;
    Ok(Json(backlog))
}

async fn delete_backlog(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path((id, backlog_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::UpdateProject, Some(Policy::Project(id))).await?;
    let backlog = state
        .db
        .call(move |db| db.delete_backlog(id, backlog_id))
        .await?;
    Ok(Json(backlog))
}

async fn list_history(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::ReadProject, Some(Policy::Project(id))).await?;
    let history = state
        .db
        .call(move |db| {
            db.require_project(id)?;
            db.list_history(id, query.sprint_id)
        })
        .await?;
    Ok(Json(history))
}
