use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
};
use serde::Deserialize;
use trofos_common::models::{Action, NewProject, ProjectUpdate, StatusType};

use super::courses::MemberRequest;
use super::{ApiError, ApiJson, SharedState};
use crate::tracker::auth::CurrentUser;
use crate::tracker::policy::{Policy, authorize};

#[derive(Deserialize)]
pub struct CreateStatusRequest {
    pub name: String,
    #[serde(rename = "type", default = "default_status_type")]
    pub status_type: StatusType,
}

fn default_status_type() -> StatusType {
    StatusType::InProgress
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route(
            "/api/projects/{id}/users",
            get(list_members).post(add_member),
        )
        .route("/api/projects/{id}/users/{user_id}", delete(remove_member))
        .route(
            "/api/projects/{id}/statuses",
            get(list_statuses).post(create_status),
        )
        .route("/api/projects/{id}/statuses/{name}", delete(delete_status))
}

async fn list_projects(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::ReadProject, None).await?;
    let (admin, user_id) = (user.is_admin(), user.user_id());
    let projects = state
        .db
        .call(move |db| {
            if admin {
                db.list_projects()
            } else {
                db.list_projects_for_user(user_id)
            }
        })
        .await?;
    Ok(Json(projects))
}

async fn create_project(
    State(state): State<SharedState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<NewProject>,
) -> Result<impl IntoResponse, ApiError> {
    let policy = req.course_id.map(Policy::Course);
    authorize(&state, &user, Action::CreateProject, policy).await?;
    let creator_id = user.user_id();
    let project = state
        .db
        .call(move |db| db.create_project(req, creator_id))
        .await?;
    tracing::info!(project_id = project.id, creator_id, "project created");
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::ReadProject, Some(Policy::Project(id))).await?;
    let project = state.db.call(move |db| db.require_project(id)).await?;
    Ok(Json(project))
}

async fn update_project(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<ProjectUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::UpdateProject, Some(Policy::Project(id))).await?;
    let project = state.db.call(move |db| db.update_project(id, req)).await?;
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::DeleteProject, Some(Policy::Project(id))).await?;
    let deleted = state.db.call(move |db| db.delete_project(id)).await?;
    match deleted {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(ApiError::NotFound(format!("Project {} not found", id))),
    }
}

// ── Membership ────────────────────────────────────────────────────────

async fn list_members(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::ReadProject, Some(Policy::Project(id))).await?;
    let members = state
        .db
        .call(move |db| {
            db.require_project(id)?;
            db.list_project_members(id)
        })
        .await?;
    Ok(Json(members))
}

async fn add_member(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<MemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::UpdateProject, Some(Policy::Project(id))).await?;
    let members = state
        .db
        .call(move |db| {
            db.add_project_member(id, req.user_id)?;
            db.list_project_members(id)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(members)))
}

async fn remove_member(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path((id, user_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::UpdateProject, Some(Policy::Project(id))).await?;
    let removed = state
        .db
        .call(move |db| db.remove_project_member(id, user_id))
        .await?;
    match removed {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(ApiError::NotFound(format!(
            "User {} is not a member of project {}",
            user_id, id
        ))),
    }
}

// ── Statuses ──────────────────────────────────────────────────────────

async fn list_statuses(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::ReadProject, Some(Policy::Project(id))).await?;
    let statuses = state
        .db
        .call(move |db| {
            db.require_project(id)?;
            db.list_statuses(id)
        })
        .await?;
    Ok(Json(statuses))
}

async fn create_status(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<CreateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::UpdateProject, Some(Policy::Project(id))).await?;
    let status = state
        .db
        .call(move |db| db.create_status(id, &req.name, req.status_type))
        .await?;
    Ok((StatusCode::CREATED, Json(status)))
}

async fn delete_status(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path((id, name)): Path<(i64, String)>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::UpdateProject, Some(Policy::Project(id))).await?;
    state
        .db
        .call(move |db| db.delete_status(id, &name))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
