use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use trofos_common::models::{Backlog, BacklogHistory, BacklogUpdate, HistoryType, NewBacklog};

use super::{TrackerDb, format_timestamp, parse_column, parse_timestamp};
use crate::errors::TrackerError;

const BACKLOG_COLUMNS: &str = "project_id, backlog_id, summary, type, sprint_id, priority, \
     reporter_id, assignee_id, points, description, status";

const HISTORY_COLUMNS: &str = "project_id, backlog_id, sprint_id, history_type, type, priority, \
     reporter_id, assignee_id, points, status, date";

struct BacklogRow {
    project_id: i64,
    backlog_id: i64,
    summary: String,
    backlog_type: String,
    sprint_id: Option<i64>,
    priority: Option<String>,
    reporter_id: i64,
    assignee_id: Option<i64>,
    points: Option<i64>,
    description: Option<String>,
    status: String,
}

impl BacklogRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            project_id: row.get(0)?,
            backlog_id: row.get(1)?,
            summary: row.get(2)?,
            backlog_type: row.get(3)?,
            sprint_id: row.get(4)?,
            priority: row.get(5)?,
            reporter_id: row.get(6)?,
            assignee_id: row.get(7)?,
            points: row.get(8)?,
            description: row.get(9)?,
            status: row.get(10)?,
        })
    }

    fn into_backlog(self) -> Result<Backlog> {
        Ok(Backlog {
            project_id: self.project_id,
            backlog_id: self.backlog_id,
            summary: self.summary,
            backlog_type: parse_column(&self.backlog_type, "backlog type")?,
            sprint_id: self.sprint_id,
            priority: self
                .priority
                .as_deref()
                .map(|p| parse_column(p, "backlog priority"))
                .transpose()?,
            reporter_id: self.reporter_id,
            assignee_id: self.assignee_id,
            points: self.points,
            description: self.description,
            status: self.status,
        })
    }
}

struct HistoryRow {
    project_id: i64,
    backlog_id: i64,
    sprint_id: Option<i64>,
    history_type: String,
    backlog_type: String,
    priority: Option<String>,
    reporter_id: i64,
    assignee_id: Option<i64>,
    points: Option<i64>,
    status: String,
    date: String,
}

impl HistoryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            project_id: row.get(0)?,
            backlog_id: row.get(1)?,
            sprint_id: row.get(2)?,
            history_type: row.get(3)?,
            backlog_type: row.get(4)?,
            priority: row.get(5)?,
            reporter_id: row.get(6)?,
            assignee_id: row.get(7)?,
            points: row.get(8)?,
            status: row.get(9)?,
            date: row.get(10)?,
        })
    }

    fn into_history(self) -> Result<BacklogHistory> {
        Ok(BacklogHistory {
            project_id: self.project_id,
            backlog_id: self.backlog_id,
            sprint_id: self.sprint_id,
            history_type: parse_column(&self.history_type, "history type")?,
            backlog_type: parse_column(&self.backlog_type, "backlog type")?,
            priority: self
                .priority
                .as_deref()
                .map(|p| parse_column(p, "backlog priority"))
                .transpose()?,
            reporter_id: self.reporter_id,
            assignee_id: self.assignee_id,
            points: self.points,
            status: self.status,
            date: parse_timestamp(&self.date)?,
        })
    }
}

/// Append one event to the history log.
fn insert_history(conn: &Connection, history: &BacklogHistory) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO backlog_history ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            HISTORY_COLUMNS
        ),
        params![
            history.project_id,
            history.backlog_id,
            history.sprint_id,
            history.history_type.as_str(),
            history.backlog_type.as_str(),
            history.priority.map(|p| p.as_str()),
            history.reporter_id,
            history.assignee_id,
            history.points,
            history.status,
            format_timestamp(&history.date),
        ],
    )
    .context("Failed to insert backlog history")?;
    Ok(())
}

fn record(conn: &Connection, backlog: &Backlog, history_type: HistoryType) -> Result<()> {
    insert_history(
        conn,
        &BacklogHistory::from_backlog(backlog, history_type, Utc::now()),
    )
}

impl TrackerDb {
    /// Check the references an item makes into its project. Reporter and
    /// assignee membership is only checked when they differ from `previous`,
    /// so items outlive the people who left the project.
    fn validate_backlog(&self, backlog: &Backlog, previous: Option<&Backlog>) -> Result<()> {
        let project_id = backlog.project_id;
        if backlog.summary.trim().is_empty() {
            return Err(TrackerError::BadRequest("Backlog summary is required".into()).into());
        }
        if backlog.points.is_some_and(|p| p < 0) {
            return Err(TrackerError::BadRequest("Points cannot be negative".into()).into());
        }
        if !self.status_exists(project_id, &backlog.status)? {
            return Err(TrackerError::BadRequest(format!(
                "Status {} does not exist in project {}",
                backlog.status, project_id
            ))
            .into());
        }
        let reporter_changed = previous.is_none_or(|p| p.reporter_id != backlog.reporter_id);
        if reporter_changed && !self.is_project_member(project_id, backlog.reporter_id)? {
            return Err(TrackerError::BadRequest(format!(
                "Reporter {} is not a member of project {}",
                backlog.reporter_id, project_id
            ))
            .into());
        }
        if let Some(assignee_id) = backlog.assignee_id
            && previous.is_none_or(|p| p.assignee_id != backlog.assignee_id)
            && !self.is_project_member(project_id, assignee_id)?
        {
            return Err(TrackerError::BadRequest(format!(
                "Assignee {} is not a member of project {}",
                assignee_id, project_id
            ))
            .into());
        }
        if let Some(sprint_id) = backlog.sprint_id
            && self.get_sprint(project_id, sprint_id)?.is_none()
        {
            return Err(TrackerError::BadRequest(format!(
                "Sprint {} does not belong to project {}",
                sprint_id, project_id
            ))
            .into());
        }
        Ok(())
    }

    /// Create an item under the project's next backlog id and log its
    /// CREATE event.
    pub fn create_backlog(&self, project_id: i64, new: NewBacklog) -> Result<Backlog> {
        self.require_project(project_id)?;

        let status = match new.status {
            Some(status) => status,
            None => self
                .list_statuses(project_id)?
                .into_iter()
                .next()
                .map(|s| s.name)
                .context("Project has no backlog statuses")?,
        };
        let mut backlog = Backlog {
            project_id,
            backlog_id: 0,
            summary: new.summary,
            backlog_type: new.backlog_type,
            sprint_id: new.sprint_id,
            priority: new.priority,
            reporter_id: new.reporter_id,
            assignee_id: new.assignee_id,
            points: new.points,
            description: new.description,
            status,
        };
        self.validate_backlog(&backlog, None)?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "UPDATE projects SET backlog_counter = backlog_counter + 1 WHERE id = ?1",
            params![project_id],
        )
        .context("Failed to allocate backlog id")?;
        backlog.backlog_id = tx
            .query_row(
                "SELECT backlog_counter FROM projects WHERE id = ?1",
                params![project_id],
                |row| row.get(0),
            )
            .context("Failed to read backlog counter")?;
        tx.execute(
            &format!(
                "INSERT INTO backlogs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                BACKLOG_COLUMNS
            ),
            params![
                backlog.project_id,
                backlog.backlog_id,
                backlog.summary,
                backlog.backlog_type.as_str(),
                backlog.sprint_id,
                backlog.priority.map(|p| p.as_str()),
                backlog.reporter_id,
                backlog.assignee_id,
                backlog.points,
                backlog.description,
                backlog.status,
            ],
        )
        .context("Failed to insert backlog")?;
        record(&tx, &backlog, HistoryType::Create)?;
        tx.commit().context("Failed to commit backlog")?;

        Ok(backlog)
    }

    pub fn get_backlog(&self, project_id: i64, backlog_id: i64) -> Result<Option<Backlog>> {
        let sql = format!(
            "SELECT {} FROM backlogs WHERE project_id = ?1 AND backlog_id = ?2",
            BACKLOG_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![project_id, backlog_id], BacklogRow::from_row)
            .optional()
            .context("Failed to query backlog")?;
        row.map(BacklogRow::into_backlog).transpose()
    }

    fn query_backlogs(&self, filter: &str, args: impl rusqlite::Params) -> Result<Vec<Backlog>> {
        let sql = format!(
            "SELECT {} FROM backlogs WHERE {} ORDER BY backlog_id",
            BACKLOG_COLUMNS, filter
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare backlog query")?;
        let rows = stmt
            .query_map(args, BacklogRow::from_row)
            .context("Failed to query backlogs")?;
        let mut backlogs = Vec::new();
        for row in rows {
            let r = row.context("Failed to read backlog row")?;
            backlogs.push(r.into_backlog()?);
        }
        Ok(backlogs)
    }

    pub fn list_backlogs(&self, project_id: i64) -> Result<Vec<Backlog>> {
        self.query_backlogs("project_id = ?1", params![project_id])
    }

    /// Items of the project that sit in no sprint.
    pub fn list_unassigned_backlogs(&self, project_id: i64) -> Result<Vec<Backlog>> {
        self.query_backlogs("project_id = ?1 AND sprint_id IS NULL", params![project_id])
    }

    pub fn list_sprint_backlogs(&self, sprint_id: i64) -> Result<Vec<Backlog>> {
        self.query_backlogs("sprint_id = ?1", params![sprint_id])
    }

    /// Apply a partial update and log the resulting snapshot as an UPDATE
    /// event.
    pub fn update_backlog(
        &self,
        project_id: i64,
        backlog_id: i64,
        update: BacklogUpdate,
    ) -> Result<Backlog> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let mut backlog = self
            .get_backlog(project_id, backlog_id)?
            .ok_or(TrackerError::BacklogNotFound {
                project_id,
                backlog_id,
            })?;
        let before = backlog.clone();
        update.apply(&mut backlog);
        self.validate_backlog(&backlog, Some(&before))?;

        tx.execute(
            "UPDATE backlogs SET summary = ?1, type = ?2, sprint_id = ?3, priority = ?4,
                 reporter_id = ?5, assignee_id = ?6, points = ?7, description = ?8, status = ?9
             WHERE project_id = ?10 AND backlog_id = ?11",
            params![
                backlog.summary,
                backlog.backlog_type.as_str(),
                backlog.sprint_id,
                backlog.priority.map(|p| p.as_str()),
                backlog.reporter_id,
                backlog.assignee_id,
                backlog.points,
                backlog.description,
                backlog.status,
                project_id,
                backlog_id,
            ],
        )
        .context("Failed to update backlog")?;
        record(&tx, &backlog, HistoryType::Update)?;
        tx.commit().context("Failed to commit backlog update")?;

        Ok(backlog)
    }

    /// Delete an item and log a DELETE event. Its earlier history stays.
    pub fn delete_backlog(&self, project_id: i64, backlog_id: i64) -> Result<Backlog> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let backlog = self
            .get_backlog(project_id, backlog_id)?
            .ok_or(TrackerError::BacklogNotFound {
                project_id,
                backlog_id,
            })?;
        tx.execute(
            "DELETE FROM backlogs WHERE project_id = ?1 AND backlog_id = ?2",
            params![project_id, backlog_id],
        )
        .context("Failed to delete backlog")?;
        record(&tx, &backlog, HistoryType::Delete)?;
        tx.commit().context("Failed to commit backlog delete")?;

        Ok(backlog)
    }

    // ── History ───────────────────────────────────────────────────────

    fn query_history(
        &self,
        filter: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<BacklogHistory>> {
        let sql = format!(
            "SELECT {} FROM backlog_history WHERE {} ORDER BY date, id",
            HISTORY_COLUMNS, filter
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare history query")?;
        let rows = stmt
            .query_map(args, HistoryRow::from_row)
            .context("Failed to query backlog history")?;
        let mut history = Vec::new();
        for row in rows {
            let r = row.context("Failed to read history row")?;
            history.push(r.into_history()?);
        }
        Ok(history)
    }

    /// The project's history, optionally only the events recorded while an
    /// item was in `sprint_id`.
    pub fn list_history(
        &self,
        project_id: i64,
        sprint_id: Option<i64>,
    ) -> Result<Vec<BacklogHistory>> {
        match sprint_id {
            Some(sprint_id) => self.query_history(
                "project_id = ?1 AND sprint_id = ?2",
                params![project_id, sprint_id],
            ),
            None => self.query_history("project_id = ?1", params![project_id]),
        }
    }

    /// Full history of every item that was ever part of `sprint_id`,
    /// including the events from before it joined and after it left.
    pub fn sprint_history(&self, project_id: i64, sprint_id: i64) -> Result<Vec<BacklogHistory>> {
        self.query_history(
            "project_id = ?1 AND backlog_id IN
                 (SELECT backlog_id FROM backlog_history WHERE project_id = ?1 AND sprint_id = ?2)",
            params![project_id, sprint_id],
        )
    }
}

#[cfg(test)]
mod tests {
    use trofos_common::models::{BacklogPriority, BacklogType, Project, User};

    use super::*;
    use crate::tracker::db::test_support;

    fn setup() -> Result<(TrackerDb, User, Project)> {
        let db = TrackerDb::new_in_memory()?;
        let owner = test_support::user(&db, "owner@example.com")?;
        let project = test_support::project(&db, &owner)?;
        Ok((db, owner, project))
    }

    fn new_backlog(reporter_id: i64, summary: &str) -> NewBacklog {
        NewBacklog {
            summary: summary.to_string(),
            backlog_type: BacklogType::Story,
            sprint_id: None,
            priority: Some(BacklogPriority::High),
            reporter_id,
            assignee_id: None,
            points: Some(3),
            description: None,
            status: None,
        }
    }

    #[test]
    fn test_backlog_ids_are_sequential_per_project() -> Result<()> {
        let (db, owner, project) = setup()?;
        let other = test_support::project(&db, &owner)?;

        let first = db.create_backlog(project.id, new_backlog(owner.user_id, "One"))?;
        let second = db.create_backlog(project.id, new_backlog(owner.user_id, "Two"))?;
        let elsewhere = db.create_backlog(other.id, new_backlog(owner.user_id, "Other"))?;

        assert_eq!(first.backlog_id, 1);
        assert_eq!(second.backlog_id, 2);
        assert_eq!(elsewhere.backlog_id, 1);
        assert_eq!(db.require_project(project.id)?.backlog_counter, 2);
        Ok(())
    }

    #[test]
    fn test_create_defaults_status_and_logs_create() -> Result<()> {
        let (db, owner, project) = setup()?;
        let backlog = db.create_backlog(project.id, new_backlog(owner.user_id, "Login"))?;
        assert_eq!(backlog.status, "To do");

        let history = db.list_history(project.id, None)?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].history_type, HistoryType::Create);
        assert_eq!(history[0].backlog_id, backlog.backlog_id);
        assert_eq!(history[0].points, Some(3));
        Ok(())
    }

    #[test]
    fn test_create_rejects_bad_references() -> Result<()> {
        let (db, owner, project) = setup()?;
        let outsider = test_support::user(&db, "outsider@example.com")?;

        let mut bad_status = new_backlog(owner.user_id, "X");
        bad_status.status = Some("Blocked".to_string());
        let bad_reporter = new_backlog(outsider.user_id, "X");
        let mut bad_assignee = new_backlog(owner.user_id, "X");
        bad_assignee.assignee_id = Some(outsider.user_id);
        let mut bad_sprint = new_backlog(owner.user_id, "X");
        bad_sprint.sprint_id = Some(12345);

        for new in [bad_status, bad_reporter, bad_assignee, bad_sprint] {
            let err = db.create_backlog(project.id, new).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<TrackerError>(),
                Some(TrackerError::BadRequest(_))
            ));
        }
        assert!(db.list_backlogs(project.id)?.is_empty());
        assert_eq!(db.require_project(project.id)?.backlog_counter, 0);
        Ok(())
    }

    #[test]
    fn test_update_logs_snapshot() -> Result<()> {
        let (db, owner, project) = setup()?;
        let backlog = db.create_backlog(project.id, new_backlog(owner.user_id, "Login"))?;

        let updated = db.update_backlog(
            project.id,
            backlog.backlog_id,
            BacklogUpdate {
                status: Some("Done".to_string()),
                points: Some(Some(5)),
                ..Default::default()
            },
        )?;
        assert_eq!(updated.status, "Done");
        assert_eq!(updated.points, Some(5));
        assert_eq!(updated.summary, "Login");

        let history = db.list_history(project.id, None)?;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].history_type, HistoryType::Update);
        assert_eq!(history[1].status, "Done");
        assert_eq!(history[1].points, Some(5));
        Ok(())
    }

    #[test]
    fn test_invalid_update_leaves_item_and_history_untouched() -> Result<()> {
        let (db, owner, project) = setup()?;
        let backlog = db.create_backlog(project.id, new_backlog(owner.user_id, "Login"))?;

        let result = db.update_backlog(
            project.id,
            backlog.backlog_id,
            BacklogUpdate {
                status: Some("Nope".to_string()),
                ..Default::default()
            },
        );
        assert!(result.is_err());
        assert_eq!(
            db.get_backlog(project.id, backlog.backlog_id)?.unwrap().status,
            "To do"
        );
        assert_eq!(db.list_history(project.id, None)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_items_stay_editable_after_reporter_leaves() -> Result<()> {
        let (db, owner, project) = setup()?;
        let member = test_support::user(&db, "member@example.com")?;
        db.add_project_member(project.id, member.user_id)?;
        let mut new = new_backlog(member.user_id, "Login");
        new.assignee_id = Some(member.user_id);
        let backlog = db.create_backlog(project.id, new)?;
        assert!(db.remove_project_member(project.id, member.user_id)?);

        let done = db.update_backlog(
            project.id,
            backlog.backlog_id,
            BacklogUpdate {
                status: Some("Done".to_string()),
                ..Default::default()
            },
        )?;
        assert_eq!(done.status, "Done");
        assert_eq!(done.reporter_id, member.user_id);

        // Pointing an item at a non-member is still refused.
        let outsider = test_support::user(&db, "outsider@example.com")?;
        let err = db
            .update_backlog(
                project.id,
                backlog.backlog_id,
                BacklogUpdate {
                    reporter_id: Some(outsider.user_id),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::BadRequest(_))
        ));

        let reassigned = db.update_backlog(
            project.id,
            backlog.backlog_id,
            BacklogUpdate {
                reporter_id: Some(owner.user_id),
                assignee_id: Some(Some(owner.user_id)),
                ..Default::default()
            },
        )?;
        assert_eq!(reassigned.assignee_id, Some(owner.user_id));
        Ok(())
    }

    #[test]
    fn test_delete_keeps_history() -> Result<()> {
        let (db, owner, project) = setup()?;
        let backlog = db.create_backlog(project.id, new_backlog(owner.user_id, "Login"))?;

        let deleted = db.delete_backlog(project.id, backlog.backlog_id)?;
        assert_eq!(deleted, backlog);
        assert!(db.get_backlog(project.id, backlog.backlog_id)?.is_none());

        let history = db.list_history(project.id, None)?;
        let kinds: Vec<HistoryType> = history.iter().map(|h| h.history_type).collect();
        assert_eq!(kinds, vec![HistoryType::Create, HistoryType::Delete]);

        let err = db.delete_backlog(project.id, backlog.backlog_id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::BacklogNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_unassigned_and_status_in_use() -> Result<()> {
        let (db, owner, project) = setup()?;
        db.create_backlog(project.id, new_backlog(owner.user_id, "Login"))?;

        assert_eq!(db.list_unassigned_backlogs(project.id)?.len(), 1);
        let err = db.delete_status(project.id, "To do").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::BadRequest(_))
        ));
        Ok(())
    }

    #[test]
    fn test_sprint_history_includes_events_outside_the_sprint() -> Result<()> {
        let (db, owner, project) = setup()?;
        let sprint = db.create_sprint(
            project.id,
            trofos_common::models::NewSprint {
                name: "Sprint 1".to_string(),
                duration: 1,
                start_date: None,
                end_date: None,
                goals: None,
            },
        )?;
        let moved = db.create_backlog(project.id, new_backlog(owner.user_id, "Moved in"))?;
        db.create_backlog(project.id, new_backlog(owner.user_id, "Never in sprint"))?;
        db.update_backlog(
            project.id,
            moved.backlog_id,
            BacklogUpdate {
                sprint_id: Some(Some(sprint.id)),
                ..Default::default()
            },
        )?;

        let history = db.sprint_history(project.id, sprint.id)?;
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|h| h.backlog_id == moved.backlog_id));
        assert_eq!(history[0].sprint_id, None);
        assert_eq!(history[1].sprint_id, Some(sprint.id));

        assert_eq!(db.list_history(project.id, Some(sprint.id))?.len(), 1);
        Ok(())
    }
}
