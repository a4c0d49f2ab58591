//! Typed errors for the tracker.
//!
//! Database code returns `anyhow::Result` and raises a `TrackerError` where the
//! caller must be able to tell the failure apart; the API layer downcasts to
//! pick an HTTP status.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("User {id} not found")]
    UserNotFound { id: i64 },

    #[error("Course {id} not found")]
    CourseNotFound { id: i64 },

    #[error("Project {id} not found")]
    ProjectNotFound { id: i64 },

    #[error("Sprint {id} not found")]
    SprintNotFound { id: i64 },

    #[error("Backlog {backlog_id} not found in project {project_id}")]
    BacklogNotFound { project_id: i64, backlog_id: i64 },

    #[error("An active sprint already exists")]
    ActiveSprintExists,

    #[error("Incorrect user credentials. Please double-check your credentials.")]
    InvalidCredentials,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database lock poisoned")]
    LockPoisoned,
}
