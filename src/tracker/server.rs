use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;
use trofos_common::models::Role;

use super::api::{self, ApiError, AppState};
use super::auth::hash_password;
use super::db::{DbHandle, TrackerDb};
use crate::config::TrofosConfig;

/// Configuration for the tracker server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
    pub static_dir: Option<PathBuf>,
    pub session_ttl: chrono::Duration,
    /// Admin account ensured at startup, as `(email, password)`.
    pub admin: Option<(String, String)>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            db_path: PathBuf::from(".trofos/trofos.db"),
            dev_mode: false,
            static_dir: None,
            session_ttl: chrono::Duration::hours(24),
            admin: None,
        }
    }
}

impl From<&TrofosConfig> for ServerConfig {
    fn from(config: &TrofosConfig) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            db_path: config.database.path.clone(),
            dev_mode: config.server.dev_mode,
            static_dir: config.server.static_dir.clone(),
            session_ttl: chrono::Duration::hours(config.session.expiry_hours),
            admin: config
                .admin_credentials()
                .map(|(email, password)| (email.to_string(), password.to_string())),
        }
    }
}

/// Build the full application router: the JSON API, the SPA (when a
/// `static_dir` is given) and request tracing.
pub fn build_router(state: Arc<AppState>, static_dir: Option<&Path>, dev_mode: bool) -> Router {
    let app = match static_dir {
        // Unknown paths get index.html so client-side routes survive a reload.
        Some(dir) => api::api_router().fallback_service(
            ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))),
        ),
        None => api::api_router().fallback(not_found),
    };

    let mut app = app.with_state(state).layer(TraceLayer::new_for_http());
    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".into())
}

/// Create the admin account unless a user with that email already exists.
/// Returns whether an account was created.
pub fn bootstrap_admin(db: &TrackerDb, email: &str, password: &str) -> Result<bool> {
    if db.get_user_by_email(email)?.is_some() {
        return Ok(false);
    }
    let user = db
        .create_user(email, email, &hash_password(password)?, Role::Admin)
        .context("Failed to create admin account")?;
    info!(user_id = user.user_id, "admin account created");
    Ok(true)
}

/// Open the database, ensure the parent directory exists and run migrations.
pub fn open_database(path: &Path) -> Result<TrackerDb> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    TrackerDb::new(path)
        .with_context(|| format!("Failed to initialize database at {}", path.display()))
}

/// Start the tracker server and run until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let db = open_database(&config.db_path)?;
    if let Some((email, password)) = &config.admin {
        bootstrap_admin(&db, email, password)?;
    }
    let purged = db.delete_expired_sessions(Utc::now())?;
    if purged > 0 {
        info!(purged, "removed expired sessions");
    }

    let state = Arc::new(AppState::new(DbHandle::new(db), config.session_ttl));
    let app = build_router(state, config.static_dir.as_deref(), config.dev_mode);

    let host = if config.dev_mode {
        "0.0.0.0"
    } else {
        config.host.as_str()
    };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(
        address = %local_addr,
        db = %config.db_path.display(),
        dev_mode = config.dev_mode,
        "trofos listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
