//! JSON API: shared state, the error type, and the router.

mod account;
mod backlogs;
mod courses;
mod projects;
mod sprints;
mod users;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use super::db::DbHandle;
use crate::errors::TrackerError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    /// Lifetime of a session created at login.
    pub session_ttl: chrono::Duration,
}

impl AppState {
    pub fn new(db: DbHandle, session_ttl: chrono::Duration) -> Self {
        Self { db, session_ttl }
    }
}

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let Some(tracker_err) = err.downcast_ref::<TrackerError>() else {
            tracing::error!(error = ?err, "request failed");
            return ApiError::Internal("Internal server error".into());
        };
        let message = tracker_err.to_string();
        match tracker_err {
            TrackerError::UserNotFound { .. }
            | TrackerError::CourseNotFound { .. }
            | TrackerError::ProjectNotFound { .. }
            | TrackerError::SprintNotFound { .. }
            | TrackerError::BacklogNotFound { .. } => ApiError::NotFound(message),
            TrackerError::BadRequest(msg) => ApiError::BadRequest(msg.clone()),
            TrackerError::InvalidCredentials => ApiError::Unauthorized(message),
            TrackerError::ActiveSprintExists => ApiError::Conflict(message),
            TrackerError::LockPoisoned => {
                tracing::error!(error = ?err, "request failed");
                ApiError::Internal("Internal server error".into())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// `Json` extractor whose rejections come back as `{"error": msg}` with 400.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .merge(account::routes())
        .merge(users::routes())
        .merge(courses::routes())
        .merge(projects::routes())
        .merge(backlogs::routes())
        .merge(sprints::routes())
}

async fn health_check() -> &'static str {
    "ok"
}

// ── Tests ─────────────────────────────────────────────────────────────
