use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
};
use serde::Deserialize;
use trofos_common::models::{Action, CourseUpdate, NewCourse};

use super::{ApiError, ApiJson, SharedState};
use crate::tracker::auth::CurrentUser;
use crate::tracker::policy::{Policy, authorize};

#[derive(Deserialize)]
pub struct MemberRequest {
    pub user_id: i64,
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/courses", get(list_courses).post(create_course))
        .route(
            "/api/courses/{id}",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route(
            "/api/courses/{id}/users",
            get(list_members).post(add_member),
        )
        .route("/api/courses/{id}/users/{user_id}", delete(remove_member))
}

async fn list_courses(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::ReadCourse, None).await?;
    let (admin, user_id) = (user.is_admin(), user.user_id());
    let courses = state
        .db
        .call(move |db| {
            if admin {
                db.list_courses()
            } else {
                db.list_courses_for_user(user_id)
            }
        })
        .await?;
    Ok(Json(courses))
}

async fn create_course(
    State(state): State<SharedState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<NewCourse>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::CreateCourse, None).await?;
    let creator_id = user.user_id();
    let course = state
        .db
        .call(move |db| db.create_course(req, creator_id))
        .await?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn get_course(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::ReadCourse, Some(Policy::Course(id))).await?;
    let course = state.db.call(move |db| db.get_course(id)).await?;
    match course {
        Some(course) => Ok(Json(course)),
        None => Err(ApiError::NotFound(format!("Course {} not found", id))),
    }
}

async fn update_course(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<CourseUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::UpdateCourse, Some(Policy::Course(id))).await?;
    let course = state.db.call(move |db| db.update_course(id, req)).await?;
    Ok(Json(course))
}

async fn delete_course(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::DeleteCourse, Some(Policy::Course(id))).await?;
    let deleted = state.db.call(move |db| db.delete_course(id)).await?;
    match deleted {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(ApiError::NotFound(format!("Course {} not found", id))),
    }
}

async fn list_members(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::ReadCourse, Some(Policy::Course(id))).await?;
    let members = state.db.call(move |db| db.list_course_members(id)).await?;
    Ok(Json(members))
}

async fn add_member(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<MemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::UpdateCourse, Some(Policy::Course(id))).await?;
    let members = state
        .db
        .call(move |db| {
            db.add_course_member(id, req.user_id)?;
            db.list_course_members(id)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(members)))
}

async fn remove_member(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path((id, user_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::UpdateCourse, Some(Policy::Course(id))).await?;
    let removed = state
        .db
        .call(move |db| db.remove_course_member(id, user_id))
        .await?;
    match removed {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(ApiError::NotFound(format!(
            "User {} is not enrolled in course {}",
            user_id, id
        ))),
    }
}
