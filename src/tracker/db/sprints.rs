use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, params};
use trofos_common::burndown::{self, Burndown};
use trofos_common::models::{
    NewSprint, Sprint, SprintListing, SprintStatus, SprintUpdate, SprintWithBacklogs,
};

use super::{TrackerDb, format_timestamp, parse_column, parse_timestamp};
use crate::errors::TrackerError;

const SPRINT_COLUMNS: &str = "id, name, duration, project_id, start_date, end_date, goals, status";

struct SprintRow {
    id: i64,
    name: String,
    duration: i32,
    project_id: i64,
    start_date: Option<String>,
    end_date: Option<String>,
    goals: Option<String>,
    status: String,
}

impl SprintRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            duration: row.get(2)?,
            project_id: row.get(3)?,
            start_date: row.get(4)?,
            end_date: row.get(5)?,
            goals: row.get(6)?,
            status: row.get(7)?,
        })
    }

    fn into_sprint(self) -> Result<Sprint> {
        Ok(Sprint {
            id: self.id,
            name: self.name,
            duration: self.duration,
            project_id: self.project_id,
            start_date: self.start_date.as_deref().map(parse_timestamp).transpose()?,
            end_date: self.end_date.as_deref().map(parse_timestamp).transpose()?,
            goals: self.goals,
            status: parse_column(&self.status, "sprint status")?,
        })
    }
}

fn validate_sprint(sprint: &Sprint) -> Result<()> {
    if sprint.name.trim().is_empty() {
        return Err(TrackerError::BadRequest("Sprint name is required".into()).into());
    }
    if sprint.duration < 0 {
        return Err(TrackerError::BadRequest("Sprint duration cannot be negative".into()).into());
    }
    if let (Some(start), Some(end)) = (sprint.start_date, sprint.end_date)
        && end < start
    {
        return Err(
            TrackerError::BadRequest("Sprint cannot end before it starts".into()).into(),
        );
    }
    Ok(())
}

/// End date implied by a start date and a length in weeks.
fn default_end(start: Option<DateTime<Utc>>, duration: i32) -> Option<DateTime<Utc>> {
    start.map(|s| s + Duration::weeks(i64::from(duration)))
}

impl TrackerDb {
    /// Create an `upcoming` sprint. A missing end date is derived from the
    /// start date and duration.
    pub fn create_sprint(&self, project_id: i64, new: NewSprint) -> Result<Sprint> {
        self.require_project(project_id)?;
        let sprint = Sprint {
            id: 0,
            name: new.name,
            duration: new.duration,
            project_id,
            start_date: new.start_date,
            end_date: new.end_date.or_else(|| default_end(new.start_date, new.duration)),
            goals: new.goals,
            status: SprintStatus::Upcoming,
        };
        validate_sprint(&sprint)?;

        self.conn
            .execute(
                "INSERT INTO sprints (name, duration, project_id, start_date, end_date, goals, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    sprint.name,
                    sprint.duration,
                    project_id,
                    sprint.start_date.as_ref().map(format_timestamp),
                    sprint.end_date.as_ref().map(format_timestamp),
                    sprint.goals,
                    sprint.status.as_str(),
                ],
            )
            .context("Failed to insert sprint")?;
        let id = self.conn.last_insert_rowid();
        Ok(Sprint { id, ..sprint })
    }

    /// A sprint of the project; sprints of other projects are invisible.
    pub fn get_sprint(&self, project_id: i64, sprint_id: i64) -> Result<Option<Sprint>> {
        let sql = format!(
            "SELECT {} FROM sprints WHERE id = ?1 AND project_id = ?2",
            SPRINT_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![sprint_id, project_id], SprintRow::from_row)
            .optional()
            .context("Failed to query sprint")?;
        row.map(SprintRow::into_sprint).transpose()
    }

    fn require_sprint(&self, project_id: i64, sprint_id: i64) -> Result<Sprint> {
        self.get_sprint(project_id, sprint_id)?
            .ok_or_else(|| TrackerError::SprintNotFound { id: sprint_id }.into())
    }

    pub fn list_sprints(&self, project_id: i64) -> Result<Vec<Sprint>> {
        let sql = format!(
            "SELECT {} FROM sprints WHERE project_id = ?1 ORDER BY id",
            SPRINT_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_sprints")?;
        let rows = stmt
            .query_map(params![project_id], SprintRow::from_row)
            .context("Failed to query sprints")?;
        let mut sprints = Vec::new();
        for row in rows {
            let r = row.context("Failed to read sprint row")?;
            sprints.push(r.into_sprint()?);
        }
        Ok(sprints)
    }

    /// Every sprint with its items, plus the items in no sprint.
    pub fn list_sprints_with_backlogs(&self, project_id: i64) -> Result<SprintListing> {
        self.require_project(project_id)?;
        let mut sprints = Vec::new();
        for sprint in self.list_sprints(project_id)? {
            let backlogs = self.list_sprint_backlogs(sprint.id)?;
            sprints.push(SprintWithBacklogs { sprint, backlogs });
        }
        Ok(SprintListing {
            sprints,
            unassigned_backlogs: self.list_unassigned_backlogs(project_id)?,
        })
    }

    /// Edit the descriptive fields of a sprint. Status changes go through
    /// [`TrackerDb::set_sprint_status`].
    pub fn update_sprint(
        &self,
        project_id: i64,
        sprint_id: i64,
        update: SprintUpdate,
    ) -> Result<Sprint> {
        let mut sprint = self.require_sprint(project_id, sprint_id)?;
        if let Some(name) = update.name {
            sprint.name = name;
        }
        if let Some(duration) = update.duration {
            sprint.duration = duration;
        }
        if let Some(start_date) = update.start_date {
            sprint.start_date = start_date;
        }
        if let Some(end_date) = update.end_date {
            sprint.end_date = end_date;
        }
        if let Some(goals) = update.goals {
            sprint.goals = goals;
        }
        validate_sprint(&sprint)?;

        self.conn
            .execute(
                "UPDATE sprints SET name = ?1, duration = ?2, start_date = ?3, end_date = ?4, goals = ?5
                 WHERE id = ?6 AND project_id = ?7",
                params![
                    sprint.name,
                    sprint.duration,
                    sprint.start_date.as_ref().map(format_timestamp),
                    sprint.end_date.as_ref().map(format_timestamp),
                    sprint.goals,
                    sprint_id,
                    project_id,
                ],
            )
            .context("Failed to update sprint")?;
        Ok(sprint)
    }

    /// Delete a sprint. Its items return to the backlog.
    pub fn delete_sprint(&self, project_id: i64, sprint_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM sprints WHERE id = ?1 AND project_id = ?2",
                params![sprint_id, project_id],
            )
            .context("Failed to delete sprint")?;
        Ok(deleted > 0)
    }

    /// Move a sprint to `status`.
    ///
    /// Making a sprint `current` is all-or-nothing: if the project already
    /// has a current sprint (the target included) the call fails with
    /// [`TrackerError::ActiveSprintExists`] and nothing changes. Every other
    /// status is written unconditionally.
    pub fn set_sprint_status(
        &self,
        project_id: i64,
        sprint_id: i64,
        status: SprintStatus,
    ) -> Result<Sprint> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        self.require_sprint(project_id, sprint_id)?;

        if status == SprintStatus::Current {
            let active: Option<i64> = tx
                .query_row(
                    "SELECT id FROM sprints WHERE project_id = ?1 AND status = ?2 LIMIT 1",
                    params![project_id, SprintStatus::Current.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .context("Failed to look up current sprint")?;
            if active.is_some() {
                return Err(TrackerError::ActiveSprintExists.into());
            }
            tx.execute(
                "UPDATE sprints SET status = ?1 WHERE project_id = ?2 AND status = ?3 AND id != ?4",
                params![
                    SprintStatus::Completed.as_str(),
                    project_id,
                    SprintStatus::Current.as_str(),
                    sprint_id
                ],
            )
            .context("Failed to complete previous sprint")?;
        }

        tx.execute(
            "UPDATE sprints SET status = ?1 WHERE id = ?2 AND project_id = ?3",
            params![status.as_str(), sprint_id, project_id],
        )
        .context("Failed to update sprint status")?;
        tx.commit().context("Failed to commit sprint status")?;

        self.require_sprint(project_id, sprint_id)
    }

    /// Burndown of a sprint, counting statuses of the `done` type as done.
    pub fn sprint_burndown(&self, project_id: i64, sprint_id: i64) -> Result<Burndown> {
        self.require_sprint(project_id, sprint_id)?;
        let history = self.sprint_history(project_id, sprint_id)?;
        let done = self.done_statuses(project_id)?;
        Ok(burndown::compute(&history, sprint_id, |status| {
            done.iter().any(|d| d == status)
        }))
    }
}

#[cfg(test)]
mod tests {
    use trofos_common::models::{BacklogType, BacklogUpdate, NewBacklog, Project, User};

    use super::*;
    use crate::tracker::db::test_support;

    fn setup() -> Result<(TrackerDb, User, Project)> {
        let db = TrackerDb::new_in_memory()?;
        let owner = test_support::user(&db, "owner@example.com")?;
        let project = test_support::project(&db, &owner)?;
        Ok((db, owner, project))
    }

    fn new_sprint(name: &str) -> NewSprint {
        NewSprint {
            name: name.to_string(),
            duration: 2,
            start_date: None,
            end_date: None,
            goals: None,
        }
    }

    fn status_of(db: &TrackerDb, project_id: i64, sprint_id: i64) -> SprintStatus {
        db.get_sprint(project_id, sprint_id).unwrap().unwrap().status
    }

    #[test]
    fn test_create_sprint_derives_end_date() -> Result<()> {
        let (db, _, project) = setup()?;
        let start = parse_timestamp("2023-01-02T00:00:00.000Z")?;
        let sprint = db.create_sprint(
            project.id,
            NewSprint {
                start_date: Some(start),
                ..new_sprint("Sprint 1")
            },
        )?;

        assert_eq!(sprint.status, SprintStatus::Upcoming);
        assert_eq!(
            sprint.end_date,
            Some(parse_timestamp("2023-01-16T00:00:00.000Z")?)
        );
        assert_eq!(db.get_sprint(project.id, sprint.id)?, Some(sprint));
        Ok(())
    }

    #[test]
    fn test_create_sprint_rejects_inverted_dates() -> Result<()> {
        let (db, _, project) = setup()?;
        let err = db
            .create_sprint(
                project.id,
                NewSprint {
                    start_date: Some(parse_timestamp("2023-02-01T00:00:00.000Z")?),
                    end_date: Some(parse_timestamp("2023-01-01T00:00:00.000Z")?),
                    ..new_sprint("Backwards")
                },
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::BadRequest(_))
        ));
        Ok(())
    }

    #[test]
    fn test_sprint_scoped_to_project() -> Result<()> {
        let (db, owner, project) = setup()?;
        let other = test_support::project(&db, &owner)?;
        let sprint = db.create_sprint(project.id, new_sprint("S"))?;

        assert!(db.get_sprint(other.id, sprint.id)?.is_none());
        assert!(!db.delete_sprint(other.id, sprint.id)?);
        let err = db
            .set_sprint_status(other.id, sprint.id, SprintStatus::Current)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::SprintNotFound { .. })
        ));
        assert_eq!(status_of(&db, project.id, sprint.id), SprintStatus::Upcoming);
        Ok(())
    }

    #[test]
    fn test_start_sprint_when_none_active() -> Result<()> {
        let (db, _, project) = setup()?;
        let sprint = db.create_sprint(project.id, new_sprint("S1"))?;

        let started = db.set_sprint_status(project.id, sprint.id, SprintStatus::Current)?;
        assert_eq!(started.status, SprintStatus::Current);
        Ok(())
    }

    #[test]
    fn test_start_sprint_conflicts_with_active_one() -> Result<()> {
        let (db, _, project) = setup()?;
        let first = db.create_sprint(project.id, new_sprint("S1"))?;
        let second = db.create_sprint(project.id, new_sprint("S2"))?;
        db.set_sprint_status(project.id, first.id, SprintStatus::Current)?;

        let err = db
            .set_sprint_status(project.id, second.id, SprintStatus::Current)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::ActiveSprintExists)
        ));
        assert_eq!(err.to_string(), "An active sprint already exists");
        assert_eq!(status_of(&db, project.id, first.id), SprintStatus::Current);
        assert_eq!(status_of(&db, project.id, second.id), SprintStatus::Upcoming);
        Ok(())
    }

    #[test]
    fn test_restarting_current_sprint_conflicts() -> Result<()> {
        let (db, _, project) = setup()?;
        let sprint = db.create_sprint(project.id, new_sprint("S1"))?;
        db.set_sprint_status(project.id, sprint.id, SprintStatus::Current)?;

        assert!(
            db.set_sprint_status(project.id, sprint.id, SprintStatus::Current)
                .is_err()
        );
        assert_eq!(status_of(&db, project.id, sprint.id), SprintStatus::Current);
        Ok(())
    }

    #[test]
    fn test_complete_then_start_next() -> Result<()> {
        let (db, _, project) = setup()?;
        let first = db.create_sprint(project.id, new_sprint("S1"))?;
        let second = db.create_sprint(project.id, new_sprint("S2"))?;
        db.set_sprint_status(project.id, first.id, SprintStatus::Current)?;

        db.set_sprint_status(project.id, first.id, SprintStatus::Completed)?;
        db.set_sprint_status(project.id, second.id, SprintStatus::Current)?;
        assert_eq!(status_of(&db, project.id, first.id), SprintStatus::Completed);
        assert_eq!(status_of(&db, project.id, second.id), SprintStatus::Current);
        Ok(())
    }

    #[test]
    fn test_non_current_statuses_are_unconditional() -> Result<()> {
        let (db, _, project) = setup()?;
        let sprint = db.create_sprint(project.id, new_sprint("S1"))?;

        for status in [
            SprintStatus::Closed,
            SprintStatus::Upcoming,
            SprintStatus::Completed,
        ] {
            let updated = db.set_sprint_status(project.id, sprint.id, status)?;
            assert_eq!(updated.status, status);
        }
        Ok(())
    }

    #[test]
    fn test_one_current_sprint_per_project_only() -> Result<()> {
        let (db, owner, project) = setup()?;
        let other = test_support::project(&db, &owner)?;
        let a = db.create_sprint(project.id, new_sprint("A"))?;
        let b = db.create_sprint(other.id, new_sprint("B"))?;

        db.set_sprint_status(project.id, a.id, SprintStatus::Current)?;
        db.set_sprint_status(other.id, b.id, SprintStatus::Current)?;
        assert_eq!(status_of(&db, other.id, b.id), SprintStatus::Current);
        Ok(())
    }

    #[test]
    fn test_update_sprint_fields() -> Result<()> {
        let (db, _, project) = setup()?;
        let sprint = db.create_sprint(project.id, new_sprint("S1"))?;

        let updated = db.update_sprint(
            project.id,
            sprint.id,
            SprintUpdate {
                name: Some("Renamed".to_string()),
                goals: Some(Some("Ship login".to_string())),
                ..Default::default()
            },
        )?;
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.goals.as_deref(), Some("Ship login"));
        assert_eq!(updated.duration, 2);
        Ok(())
    }

    #[test]
    fn test_delete_sprint_detaches_backlogs() -> Result<()> {
        let (db, owner, project) = setup()?;
        let sprint = db.create_sprint(project.id, new_sprint("S1"))?;
        let backlog = db.create_backlog(
            project.id,
            NewBacklog {
                summary: "Item".to_string(),
                backlog_type: BacklogType::Task,
                sprint_id: Some(sprint.id),
                priority: None,
                reporter_id: owner.user_id,
                assignee_id: None,
                points: Some(2),
                description: None,
                status: None,
            },
        )?;

        let listing = db.list_sprints_with_backlogs(project.id)?;
        assert_eq!(listing.sprints.len(), 1);
        assert_eq!(listing.sprints[0].backlogs.len(), 1);
        assert!(listing.unassigned_backlogs.is_empty());

        assert!(db.delete_sprint(project.id, sprint.id)?);
        let detached = db.get_backlog(project.id, backlog.backlog_id)?.unwrap();
        assert_eq!(detached.sprint_id, None);
        let listing = db.list_sprints_with_backlogs(project.id)?;
        assert!(listing.sprints.is_empty());
        assert_eq!(listing.unassigned_backlogs.len(), 1);
        Ok(())
    }

    #[test]
    fn test_sprint_burndown_from_stored_history() -> Result<()> {
        let (db, owner, project) = setup()?;
        let sprint = db.create_sprint(project.id, new_sprint("S1"))?;
        let new_item = |points: i64| NewBacklog {
            summary: "Item".to_string(),
            backlog_type: BacklogType::Story,
            sprint_id: Some(sprint.id),
            priority: None,
            reporter_id: owner.user_id,
            assignee_id: None,
            points: Some(points),
            description: None,
            status: None,
        };
        let a = db.create_backlog(project.id, new_item(3))?;
        db.create_backlog(project.id, new_item(5))?;
        db.update_backlog(
            project.id,
            a.backlog_id,
            BacklogUpdate {
                status: Some("Done".to_string()),
                ..Default::default()
            },
        )?;

        let burndown = db.sprint_burndown(project.id, sprint.id)?;
        let points: Vec<i64> = burndown.samples.iter().map(|s| s.point).collect();
        assert_eq!(points, vec![3, 8, 5]);
        assert_eq!(burndown.grouped.len(), 2);

        let err = db.sprint_burndown(project.id, 999).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::SprintNotFound { id: 999 })
        ));
        Ok(())
    }
}
