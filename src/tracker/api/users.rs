use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use trofos_common::models::{Action, Role};

use super::{ApiError, ApiJson, SharedState};
use crate::tracker::auth::{CurrentUser, hash_password};
use crate::tracker::policy::authorize;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub user_email: String,
    pub user_password: String,
    pub user_display_name: Option<String>,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Student
}

pub fn routes() -> Router<SharedState> {
    Router::new().route("/api/users", get(list_users).post(create_user))
}

async fn list_users(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::Admin, None).await?;
    let users = state.db.call(|db| db.list_users()).await?;
    Ok(Json(users))
}

async fn create_user(
    State(state): State<SharedState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &user, Action::Admin, None).await?;
    let email = req.user_email.trim().to_string();
    if email.is_empty() || req.user_password.is_empty() {
        return Err(ApiError::BadRequest(
            "Email and password are required".into(),
        ));
    }
    let display_name = req.user_display_name.unwrap_or_else(|| email.clone());
    let password = req.user_password;
    let role = req.role;
    let created = state
        .db
        .call(move |db| {
            let hash = hash_password(&password)?;
            db.create_user(&email, &display_name, &hash, role)
        })
        .await?;
    tracing::info!(user_id = created.user_id, role = role.name(), "user created");
    Ok((StatusCode::CREATED, Json(created)))
}
