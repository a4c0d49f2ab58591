use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, header},
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;
use serde::Deserialize;
use trofos_common::models::UserInfo;

use super::{ApiError, ApiJson, SharedState};
use crate::errors::TrackerError;
use crate::tracker::auth::{
    CurrentUser, clear_session_cookie, hash_password, session_cookie, session_id_from_headers,
    verify_password,
};
use crate::tracker::policy::{Policy, check_policy};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub user_email: String,
    pub user_password: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: String,
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/account/login", post(login))
        .route("/api/account/logout", post(logout))
        .route("/api/account/me", get(me))
        .route("/api/account/password", put(change_password))
        .route("/api/account/profile", put(update_profile))
}

async fn login(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ttl = state.session_ttl;
    let email = req.user_email.clone();
    let result = state
        .db
        .call(move |db| {
            let Some((user, hash)) = db.get_credentials(&req.user_email)? else {
                return Err(TrackerError::InvalidCredentials.into());
            };
            if !verify_password(&req.user_password, &hash) {
                return Err(TrackerError::InvalidCredentials.into());
            }
            let role = db.get_user_role(&user.user_email)?;
            let session = db.create_session(&user, role, Utc::now() + ttl)?;
            let actions = db.role_actions(role.id())?;
            Ok((
                session.session_id,
                UserInfo {
                    user_id: user.user_id,
                    user_email: user.user_email,
                    user_display_name: user.user_display_name,
                    user_role_id: role.id(),
                    user_role_actions: actions,
                },
            ))
        })
        .await;

    let (session_id, info) = match result {
        Ok(ok) => ok,
        Err(err) => {
            if matches!(
                err.downcast_ref::<TrackerError>(),
                Some(TrackerError::InvalidCredentials)
            ) {
                tracing::warn!(user_email = %email, "rejected login");
            }
            return Err(err.into());
        }
    };
    tracing::info!(user_id = info.user_id, "user logged in");
    Ok(([(header::SET_COOKIE, session_cookie(&session_id))], Json(info)))
}

async fn logout(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(session_id) = session_id_from_headers(&headers) {
        state
            .db
            .call(move |db| db.delete_session(&session_id))
            .await?;
    }
    Ok((
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(serde_json::json!({"message": "Logged out"})),
    ))
}

async fn me(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.user_id();
    let account = state
        .db
        .call(move |db| {
            db.get_user(user_id)?
                .ok_or_else(|| TrackerError::UserNotFound { id: user_id }.into())
        })
        .await?;
    Ok(Json(UserInfo {
        user_id: account.user_id,
        user_email: account.user_email,
        user_display_name: account.user_display_name,
        user_role_id: user.role.id(),
        user_role_actions: user.actions,
    }))
}

async fn change_password(
    State(state): State<SharedState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.user_id();
    check_policy(&state, &user, Policy::User(user_id)).await?;
    if req.new_password.is_empty() {
        return Err(ApiError::BadRequest("New password is required".into()));
    }
    state
        .db
        .call(move |db| {
            let stored = db.get_password_hash(user_id)?;
            if !verify_password(&req.old_password, &stored) {
                return Err(
                    TrackerError::BadRequest("Old password is incorrect".into()).into(),
                );
            }
            db.update_password_hash(user_id, &hash_password(&req.new_password)?)
        })
        .await?;
    Ok(Json(
        serde_json::json!({"message": "Password successfully changed"}),
    ))
}

async fn update_profile(
    State(state): State<SharedState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.user_id();
    check_policy(&state, &user, Policy::User(user_id)).await?;
    let display_name = req.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(ApiError::BadRequest("Display name is required".into()));
    }
    let updated = state
        .db
        .call(move |db| db.update_display_name(user_id, &display_name))
        .await?;
    Ok(Json(updated))
}
