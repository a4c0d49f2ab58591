use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use trofos_common::models::{Action, Role, User, UserSession};

use super::{TrackerDb, format_timestamp, parse_column, parse_timestamp};
use crate::errors::TrackerError;

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get(0)?,
        user_email: row.get(1)?,
        user_display_name: row.get(2)?,
    })
}

struct SessionRow {
    session_id: String,
    user_email: String,
    user_id: i64,
    user_role_id: i64,
    session_expiry: String,
}

impl SessionRow {
    fn into_session(self) -> Result<UserSession> {
        Ok(UserSession {
            session_id: self.session_id,
            user_email: self.user_email,
            user_id: self.user_id,
            user_role_id: self.user_role_id,
            session_expiry: parse_timestamp(&self.session_expiry)?,
        })
    }
}

impl TrackerDb {
    // ── Users ─────────────────────────────────────────────────────────

    /// Insert a user together with their role assignment.
    pub fn create_user(
        &self,
        email: &str,
        display_name: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User> {
        if self.get_user_by_email(email)?.is_some() {
            return Err(
                TrackerError::BadRequest(format!("User {} already exists", email)).into(),
            );
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO users (user_email, user_display_name, user_password_hash) VALUES (?1, ?2, ?3)",
            params![email, display_name, password_hash],
        )
        .context("Failed to insert user")?;
        let user_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO users_on_roles (user_email, role_id) VALUES (?1, ?2)",
            params![email, role.id()],
        )
        .context("Failed to assign user role")?;
        tx.commit().context("Failed to commit user")?;

        Ok(User {
            user_id,
            user_email: email.to_string(),
            user_display_name: display_name.to_string(),
        })
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id, user_email, user_display_name FROM users ORDER BY user_id")
            .context("Failed to prepare list_users")?;
        let rows = stmt
            .query_map([], user_from_row)
            .context("Failed to query users")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read user row")
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT user_id, user_email, user_display_name FROM users WHERE user_id = ?1",
                params![user_id],
                user_from_row,
            )
            .optional()
            .context("Failed to query user")
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT user_id, user_email, user_display_name FROM users WHERE user_email = ?1",
                params![email],
                user_from_row,
            )
            .optional()
            .context("Failed to query user by email")
    }

    /// The user and their stored password hash, for login.
    pub fn get_credentials(&self, email: &str) -> Result<Option<(User, String)>> {
        self.conn
            .query_row(
                "SELECT user_id, user_email, user_display_name, user_password_hash
                 FROM users WHERE user_email = ?1",
                params![email],
                |row| Ok((user_from_row(row)?, row.get(3)?)),
            )
            .optional()
            .context("Failed to query user credentials")
    }

    pub fn get_password_hash(&self, user_id: i64) -> Result<String> {
        self.conn
            .query_row(
                "SELECT user_password_hash FROM users WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query password hash")?
            .ok_or_else(|| TrackerError::UserNotFound { id: user_id }.into())
    }

    pub fn update_password_hash(&self, user_id: i64, password_hash: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE users SET user_password_hash = ?1 WHERE user_id = ?2",
                params![password_hash, user_id],
            )
            .context("Failed to update password")?;
        if changed == 0 {
            return Err(TrackerError::UserNotFound { id: user_id }.into());
        }
        Ok(())
    }

    pub fn update_display_name(&self, user_id: i64, display_name: &str) -> Result<User> {
        let changed = self
            .conn
            .execute(
                "UPDATE users SET user_display_name = ?1 WHERE user_id = ?2",
                params![display_name, user_id],
            )
            .context("Failed to update display name")?;
        if changed == 0 {
            return Err(TrackerError::UserNotFound { id: user_id }.into());
        }
        self.get_user(user_id)?
            .ok_or_else(|| TrackerError::UserNotFound { id: user_id }.into())
    }

    // ── Roles ─────────────────────────────────────────────────────────

    pub fn get_user_role(&self, email: &str) -> Result<Role> {
        let role_id: i64 = self
            .conn
            .query_row(
                "SELECT role_id FROM users_on_roles WHERE user_email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query user role")?
            .with_context(|| format!("No role assigned to {}", email))?;
        Role::from_id(role_id).with_context(|| format!("Unknown role id {}", role_id))
    }

    pub fn set_user_role(&self, email: &str, role: Role) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO users_on_roles (user_email, role_id) VALUES (?1, ?2)
                 ON CONFLICT(user_email) DO UPDATE SET role_id = excluded.role_id",
                params![email, role.id()],
            )
            .context("Failed to set user role")?;
        Ok(())
    }

    /// Actions currently granted to a role.
    pub fn role_actions(&self, role_id: i64) -> Result<Vec<Action>> {
        let mut stmt = self
            .conn
            .prepare("SELECT action FROM actions_on_roles WHERE role_id = ?1 ORDER BY action")
            .context("Failed to prepare role_actions")?;
        let rows = stmt
            .query_map(params![role_id], |row| row.get::<_, String>(0))
            .context("Failed to query role actions")?;
        let mut actions = Vec::new();
        for row in rows {
            let action = row.context("Failed to read role action")?;
            actions.push(parse_column(&action, "action")?);
        }
        Ok(actions)
    }

    // ── Sessions ──────────────────────────────────────────────────────

    pub fn create_session(
        &self,
        user: &User,
        role: Role,
        expiry: DateTime<Utc>,
    ) -> Result<UserSession> {
        let session = UserSession {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_email: user.user_email.clone(),
            user_id: user.user_id,
            user_role_id: role.id(),
            session_expiry: expiry,
        };
        self.conn
            .execute(
                "INSERT INTO user_sessions (session_id, user_email, user_id, user_role_id, session_expiry)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    session.session_id,
                    session.user_email,
                    session.user_id,
                    session.user_role_id,
                    format_timestamp(&session.session_expiry),
                ],
            )
            .context("Failed to insert session")?;
        Ok(session)
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<UserSession>> {
        let row = self
            .conn
            .query_row(
                "SELECT session_id, user_email, user_id, user_role_id, session_expiry
                 FROM user_sessions WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok(SessionRow {
                        session_id: row.get(0)?,
                        user_email: row.get(1)?,
                        user_id: row.get(2)?,
                        user_role_id: row.get(3)?,
                        session_expiry: row.get(4)?,
                    })
                },
            )
            .optional()
            .context("Failed to query session")?;
        row.map(SessionRow::into_session).transpose()
    }

    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM user_sessions WHERE session_id = ?1",
                params![session_id],
            )
            .context("Failed to delete session")?;
        Ok(deleted > 0)
    }

    /// Drop every session that expired before `now`. Returns how many.
    pub fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM user_sessions WHERE session_expiry < ?1",
                params![format_timestamp(&now)],
            )
            .context("Failed to purge expired sessions")
    }
}
