use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};
use trofos_common::models::{
    BacklogStatus, NewProject, Project, ProjectMember, ProjectUpdate, StatusType, User,
};

use super::{TrackerDb, parse_column};
use crate::errors::TrackerError;

const PROJECT_COLUMNS: &str =
    "id, pname, pkey, description, course_id, public, backlog_counter, created_at";

/// Statuses every new project starts with.
pub const DEFAULT_STATUSES: [(&str, StatusType); 3] = [
    ("To do", StatusType::Todo),
    ("In progress", StatusType::InProgress),
    ("Done", StatusType::Done),
];

fn project_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        pname: row.get(1)?,
        pkey: row.get(2)?,
        description: row.get(3)?,
        course_id: row.get(4)?,
        public: row.get(5)?,
        backlog_counter: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl TrackerDb {
    /// Create a project with the default statuses; the creator becomes its
    /// first member.
    pub fn create_project(&self, project: NewProject, creator_id: i64) -> Result<Project> {
        if project.pname.trim().is_empty() {
            return Err(TrackerError::BadRequest("Project name is required".into()).into());
        }
        if let Some(course_id) = project.course_id
            && self.get_course(course_id)?.is_none()
        {
            return Err(TrackerError::CourseNotFound { id: course_id }.into());
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO projects (pname, pkey, description, course_id, public) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project.pname,
                project.pkey,
                project.description,
                project.course_id,
                project.public
            ],
        )
        .context("Failed to insert project")?;
        let id = tx.last_insert_rowid();

        for (order, (name, status_type)) in DEFAULT_STATUSES.iter().enumerate() {
            tx.execute(
                "INSERT INTO backlog_statuses (project_id, name, type, \"order\") VALUES (?1, ?2, ?3, ?4)",
                params![id, name, status_type.as_str(), order as i32 + 1],
            )
            .context("Failed to insert default status")?;
        }
        tx.execute(
            "INSERT INTO users_on_projects (project_id, user_id) VALUES (?1, ?2)",
            params![id, creator_id],
        )
        .context("Failed to add project creator")?;
        tx.commit().context("Failed to commit project")?;

        self.get_project(id)?.context("Project not found after insert")
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let sql = format!("SELECT {} FROM projects ORDER BY id", PROJECT_COLUMNS);
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_projects")?;
        let rows = stmt
            .query_map([], project_from_row)
            .context("Failed to query projects")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read project row")
    }

    /// Projects `user_id` is a member of.
    pub fn list_projects_for_user(&self, user_id: i64) -> Result<Vec<Project>> {
        let sql = format!(
            "SELECT {} FROM projects
             WHERE id IN (SELECT project_id FROM users_on_projects WHERE user_id = ?1)
             ORDER BY id",
            PROJECT_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_projects_for_user")?;
        let rows = stmt
            .query_map(params![user_id], project_from_row)
            .context("Failed to query projects")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read project row")
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let sql = format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS);
        self.conn
            .query_row(&sql, params![id], project_from_row)
            .optional()
            .context("Failed to query project")
    }

    /// Like `get_project`, but a missing project is a `ProjectNotFound` error.
    pub fn require_project(&self, id: i64) -> Result<Project> {
        self.get_project(id)?
            .ok_or_else(|| TrackerError::ProjectNotFound { id }.into())
    }

    pub fn update_project(&self, id: i64, update: ProjectUpdate) -> Result<Project> {
        let mut project = self.require_project(id)?;

        if let Some(pname) = update.pname {
            if pname.trim().is_empty() {
                return Err(TrackerError::BadRequest("Project name is required".into()).into());
            }
            project.pname = pname;
        }
        if let Some(pkey) = update.pkey {
            project.pkey = pkey;
        }
        if let Some(description) = update.description {
            project.description = description;
        }
        if let Some(public) = update.public {
            project.public = public;
        }

        self.conn
            .execute(
                "UPDATE projects SET pname = ?1, pkey = ?2, description = ?3, public = ?4 WHERE id = ?5",
                params![
                    project.pname,
                    project.pkey,
                    project.description,
                    project.public,
                    id
                ],
            )
            .context("Failed to update project")?;
        Ok(project)
    }

    /// Delete a project with its sprints, items, statuses and history.
    pub fn delete_project(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1", params![id])
            .context("Failed to delete project")?;
        Ok(deleted > 0)
    }

    // ── Membership ────────────────────────────────────────────────────

    pub fn add_project_member(&self, project_id: i64, user_id: i64) -> Result<()> {
        self.require_project(project_id)?;
        if self.get_user(user_id)?.is_none() {
            return Err(TrackerError::UserNotFound { id: user_id }.into());
        }
        self.conn
            .execute(
                "INSERT OR IGNORE INTO users_on_projects (project_id, user_id) VALUES (?1, ?2)",
                params![project_id, user_id],
            )
            .context("Failed to add project member")?;
        Ok(())
    }

    pub fn remove_project_member(&self, project_id: i64, user_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM users_on_projects WHERE project_id = ?1 AND user_id = ?2",
                params![project_id, user_id],
            )
            .context("Failed to remove project member")?;
        Ok(deleted > 0)
    }

    pub fn list_project_members(&self, project_id: i64) -> Result<Vec<ProjectMember>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT u.user_id, u.user_email, u.user_display_name
                 FROM users u JOIN users_on_projects p ON p.user_id = u.user_id
                 WHERE p.project_id = ?1 ORDER BY p.created_at, u.user_id",
            )
            .context("Failed to prepare list_project_members")?;
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok(ProjectMember {
                    project_id,
                    user: User {
                        user_id: row.get(0)?,
                        user_email: row.get(1)?,
                        user_display_name: row.get(2)?,
                    },
                })
            })
            .context("Failed to query project members")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read project member row")
    }

    pub fn is_project_member(&self, project_id: i64, user_id: i64) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users_on_projects WHERE project_id = ?1 AND user_id = ?2)",
                params![project_id, user_id],
                |row| row.get(0),
            )
            .context("Failed to check project membership")
    }

    // ── Backlog statuses ──────────────────────────────────────────────

    pub fn list_statuses(&self, project_id: i64) -> Result<Vec<BacklogStatus>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT project_id, name, type, \"order\" FROM backlog_statuses
                 WHERE project_id = ?1 ORDER BY \"order\", name",
            )
            .context("Failed to prepare list_statuses")?;
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i32>(3)?,
                ))
            })
            .context("Failed to query statuses")?;
        let mut statuses = Vec::new();
        for row in rows {
            let (project_id, name, status_type, order) =
                row.context("Failed to read status row")?;
            statuses.push(BacklogStatus {
                project_id,
                name,
                status_type: parse_column(&status_type, "status type")?,
                order,
            });
        }
        Ok(statuses)
    }

    /// Names of the project's statuses in the done category.
    pub fn done_statuses(&self, project_id: i64) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM backlog_statuses WHERE project_id = ?1 AND type = ?2")
            .context("Failed to prepare done_statuses")?;
        let rows = stmt
            .query_map(params![project_id, StatusType::Done.as_str()], |row| {
                row.get(0)
            })
            .context("Failed to query done statuses")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read status row")
    }

    pub fn status_exists(&self, project_id: i64, name: &str) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM backlog_statuses WHERE project_id = ?1 AND name = ?2)",
                params![project_id, name],
                |row| row.get(0),
            )
            .context("Failed to check status")
    }

    /// Append a status after the existing ones.
    pub fn create_status(
        &self,
        project_id: i64,
        name: &str,
        status_type: StatusType,
    ) -> Result<BacklogStatus> {
        self.require_project(project_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(TrackerError::BadRequest("Status name is required".into()).into());
        }
        if self.status_exists(project_id, name)? {
            return Err(
                TrackerError::BadRequest(format!("Status {} already exists", name)).into(),
            );
        }

        let order: i32 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(\"order\"), 0) + 1 FROM backlog_statuses WHERE project_id = ?1",
                params![project_id],
                |row| row.get(0),
            )
            .context("Failed to get next status order")?;
        self.conn
            .execute(
                "INSERT INTO backlog_statuses (project_id, name, type, \"order\") VALUES (?1, ?2, ?3, ?4)",
                params![project_id, name, status_type.as_str(), order],
            )
            .context("Failed to insert status")?;

        Ok(BacklogStatus {
            project_id,
            name: name.to_string(),
            status_type,
            order,
        })
    }

    /// Delete a status no item uses any more.
    pub fn delete_status(&self, project_id: i64, name: &str) -> Result<()> {
        if !self.status_exists(project_id, name)? {
            return Err(
                TrackerError::BadRequest(format!("Status {} does not exist", name)).into(),
            );
        }
        let in_use: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM backlogs WHERE project_id = ?1 AND status = ?2)",
                params![project_id, name],
                |row| row.get(0),
            )
            .context("Failed to check status usage")?;
        if in_use {
            return Err(TrackerError::BadRequest(format!(
                "Status {} is still used by backlog items",
                name
            ))
            .into());
        }
        self.conn
            .execute(
                "DELETE FROM backlog_statuses WHERE project_id = ?1 AND name = ?2",
                params![project_id, name],
            )
            .context("Failed to delete status")?;
        Ok(())
    }
}
