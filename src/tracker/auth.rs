//! Password hashing, the session cookie, and the `CurrentUser` extractor.

use anyhow::{Context, Result};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use chrono::Utc;
use trofos_common::models::{Action, Role, UserSession};

use super::api::{ApiError, SharedState};

pub const SESSION_COOKIE: &str = "trofos_sessioncookie";

/// bcrypt work factor. Unit tests use the minimum.
const HASH_COST: u32 = if cfg!(test) { 4 } else { 10 };

/// Hash a password into a salted bcrypt string (`$2b$<cost>$...`).
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, HASH_COST).context("Failed to hash password")
}

/// Check `password` against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}

pub fn session_cookie(session_id: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, session_id
    )
}

pub fn clear_session_cookie() -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        SESSION_COOKIE
    )
}

/// Session id carried by the request's `Cookie` headers, if any.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub session: UserSession,
    pub role: Role,
    pub actions: Vec<Action>,
}

impl CurrentUser {
    pub fn user_id(&self) -> i64 {
        self.session.user_id
    }

    pub fn is_admin(&self) -> bool {
        self.actions.contains(&Action::Admin)
    }

    /// Whether the role carries `action`. Admins carry every action.
    pub fn can(&self, action: Action) -> bool {
        self.is_admin() || self.actions.contains(&action)
    }
}

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let session_id = session_id_from_headers(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Not logged in".into()))?;

        let loaded = state
            .db
            .call(move |db| {
                let Some(session) = db.get_session(&session_id)? else {
                    return Ok(None);
                };
                if session.session_expiry <= Utc::now() {
                    db.delete_session(&session.session_id)?;
                    return Ok(None);
                }
                let actions = db.role_actions(session.user_role_id)?;
                Ok(Some((session, actions)))
            })
            .await?;

        let Some((session, actions)) = loaded else {
            tracing::debug!("rejected missing or expired session");
            return Err(ApiError::Unauthorized("Session expired or invalid".into()));
        };
        let role = Role::from_id(session.user_role_id).ok_or_else(|| {
            ApiError::Internal(format!("Unknown role id {}", session.user_role_id))
        })?;

        Ok(CurrentUser {
            session,
            role,
            actions,
        })
    }
}
