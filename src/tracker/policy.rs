//! Authorization: a role/action check followed by an optional ownership
//! policy.

use anyhow::Result;
use trofos_common::models::Action;

use super::api::{ApiError, SharedState};
use super::auth::CurrentUser;
use super::db::TrackerDb;

/// Ownership check applied after the action check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// The caller must be a member of the project.
    Project(i64),
    /// The caller must be enrolled in the course.
    Course(i64),
    /// The caller must be this user.
    User(i64),
}

impl Policy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Project(_) => "project",
            Self::Course(_) => "course",
            Self::User(_) => "user",
        }
    }

    /// Whether `user` satisfies the policy. Admins satisfy every policy.
    pub fn check(&self, db: &TrackerDb, user: &CurrentUser) -> Result<bool> {
        if user.is_admin() {
            return Ok(true);
        }
        match *self {
            Self::Project(project_id) => db.is_project_member(project_id, user.user_id()),
            Self::Course(course_id) => db.is_course_member(course_id, user.user_id()),
            Self::User(user_id) => Ok(user.user_id() == user_id),
        }
    }
}

/// Reject with 403 unless the caller's role carries `action` and the policy,
/// when given, holds.
pub async fn authorize(
    state: &SharedState,
    user: &CurrentUser,
    action: Action,
    policy: Option<Policy>,
) -> Result<(), ApiError> {
    if !user.can(action) {
        tracing::debug!(user_id = user.user_id(), %action, "action not permitted for role");
        return Err(ApiError::Forbidden(format!(
            "Your role does not permit {}",
            action
        )));
    }

    match policy {
        Some(policy) => check_policy(state, user, policy).await,
        None => Ok(()),
    }
}

/// Reject with 403 unless `policy` holds for the caller.
pub async fn check_policy(
    state: &SharedState,
    user: &CurrentUser,
    policy: Policy,
) -> Result<(), ApiError> {
    let caller = user.clone();
    let allowed = state.db.call(move |db| policy.check(db, &caller)).await?;
    if !allowed {
        tracing::debug!(user_id = user.user_id(), policy = policy.name(), "policy rejected");
        return Err(ApiError::Forbidden(format!(
            "Access denied by {} policy",
            policy.name()
        )));
    }
    Ok(())
}
