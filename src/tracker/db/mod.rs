//! SQLite store for the tracker.
//!
//! `TrackerDb` owns a single connection; the `impl` blocks are split by
//! domain across the submodules. `DbHandle` is what the HTTP layer holds.

mod backlogs;
mod courses;
mod projects;
mod sprints;
mod users;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use trofos_common::models::Role;

use crate::errors::TrackerError;

/// Async-safe handle to the tracker database.
///
/// Wraps `TrackerDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<TrackerDb>>,
}

impl DbHandle {
    pub fn new(db: TrackerDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&TrackerDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| TrackerError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. For startup and tests only.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, TrackerDb>> {
        self.inner
            .lock()
            .map_err(|_| TrackerError::LockPoisoned.into())
    }
}

pub struct TrackerDb {
    conn: Connection,
}

impl TrackerDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        self.seed_roles().context("Failed to seed roles")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_email TEXT NOT NULL UNIQUE,
                    user_display_name TEXT NOT NULL,
                    user_password_hash TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS roles (
                    id INTEGER PRIMARY KEY,
                    role_name TEXT NOT NULL UNIQUE
                );

                CREATE TABLE IF NOT EXISTS actions_on_roles (
                    role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
                    action TEXT NOT NULL,
                    PRIMARY KEY (role_id, action)
                );

                CREATE TABLE IF NOT EXISTS users_on_roles (
                    user_email TEXT PRIMARY KEY
                        REFERENCES users(user_email) ON DELETE CASCADE ON UPDATE CASCADE,
                    role_id INTEGER NOT NULL REFERENCES roles(id)
                );

                CREATE TABLE IF NOT EXISTS user_sessions (
                    session_id TEXT PRIMARY KEY,
                    user_email TEXT NOT NULL,
                    user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                    user_role_id INTEGER NOT NULL REFERENCES roles(id),
                    session_expiry TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS courses (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    cname TEXT NOT NULL,
                    ccode TEXT,
                    year INTEGER NOT NULL,
                    sem INTEGER NOT NULL,
                    description TEXT,
                    public INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS users_on_courses (
                    course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                    PRIMARY KEY (course_id, user_id)
                );

                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    pname TEXT NOT NULL,
                    pkey TEXT,
                    description TEXT,
                    course_id INTEGER REFERENCES courses(id) ON DELETE SET NULL,
                    public INTEGER NOT NULL DEFAULT 0,
                    backlog_counter INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS users_on_projects (
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (project_id, user_id)
                );

                CREATE TABLE IF NOT EXISTS backlog_statuses (
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    type TEXT NOT NULL DEFAULT 'in_progress',
                    \"order\" INTEGER NOT NULL,
                    PRIMARY KEY (project_id, name)
                );

                CREATE TABLE IF NOT EXISTS sprints (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    duration INTEGER NOT NULL,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    start_date TEXT,
                    end_date TEXT,
                    goals TEXT,
                    status TEXT NOT NULL DEFAULT 'upcoming'
                );

                CREATE TABLE IF NOT EXISTS backlogs (
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    backlog_id INTEGER NOT NULL,
                    summary TEXT NOT NULL,
                    type TEXT NOT NULL,
                    sprint_id INTEGER REFERENCES sprints(id) ON DELETE SET NULL,
                    priority TEXT,
                    reporter_id INTEGER NOT NULL REFERENCES users(user_id),
                    assignee_id INTEGER REFERENCES users(user_id) ON DELETE SET NULL,
                    points INTEGER,
                    description TEXT,
                    status TEXT NOT NULL,
                    PRIMARY KEY (project_id, backlog_id)
                );

                CREATE TABLE IF NOT EXISTS backlog_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    backlog_id INTEGER NOT NULL,
                    sprint_id INTEGER,
                    history_type TEXT NOT NULL,
                    type TEXT NOT NULL,
                    priority TEXT,
                    reporter_id INTEGER NOT NULL,
                    assignee_id INTEGER,
                    points INTEGER,
                    status TEXT NOT NULL,
                    date TEXT NOT NULL
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_sprints_one_current
                    ON sprints(project_id) WHERE status = 'current';
                CREATE INDEX IF NOT EXISTS idx_sprints_project ON sprints(project_id);
                CREATE INDEX IF NOT EXISTS idx_backlogs_sprint ON backlogs(sprint_id);
                CREATE INDEX IF NOT EXISTS idx_history_backlog
                    ON backlog_history(project_id, backlog_id);
                CREATE INDEX IF NOT EXISTS idx_history_sprint ON backlog_history(sprint_id);
                CREATE INDEX IF NOT EXISTS idx_sessions_user ON user_sessions(user_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    /// Insert the built-in roles and their default actions. Existing rows
    /// are left alone so edited permissions survive a restart.
    fn seed_roles(&self) -> Result<()> {
        for role in [Role::Faculty, Role::Student, Role::Admin] {
            let inserted = self
                .conn
                .execute(
                    "INSERT OR IGNORE INTO roles (id, role_name) VALUES (?1, ?2)",
                    params![role.id(), role.name()],
                )
                .with_context(|| format!("Failed to seed role {}", role.name()))?;
            if inserted == 0 {
                continue;
            }
            for action in role.default_actions() {
                self.conn
                    .execute(
                        "INSERT OR IGNORE INTO actions_on_roles (role_id, action) VALUES (?1, ?2)",
                        params![role.id(), action.as_str()],
                    )
                    .context("Failed to seed role action")?;
            }
        }
        Ok(())
    }
}

// ── Column helpers ────────────────────────────────────────────────────

/// Parse a stored enum column, naming the column on failure.
pub(crate) fn parse_column<T>(value: &str, column: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    T::from_str(value)
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Invalid {} in database", column))
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in database: {}", value))
}

/// Stored form of timestamps: RFC 3339, millisecond precision, `Z` suffix.
/// Fixed width, so lexical order equals time order.
pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
pub(crate) mod test_support {
    use anyhow::Result;
    use trofos_common::models::{NewProject, Project, Role, User};

    use super::TrackerDb;

    pub fn user(db: &TrackerDb, email: &str) -> Result<User> {
        db.create_user(email, email, "not-a-real-hash", Role::Student)
    }

    pub fn project(db: &TrackerDb, owner: &User) -> Result<Project> {
        db.create_project(
            NewProject {
                pname: "Tracker".to_string(),
                pkey: Some("TRK".to_string()),
                description: None,
                course_id: None,
                public: false,
            },
            owner.user_id,
        )
    }
}
