use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};
use trofos_common::models::{Course, CourseUpdate, NewCourse, User};

use super::TrackerDb;
use crate::errors::TrackerError;

const COURSE_COLUMNS: &str = "id, cname, ccode, year, sem, description, public, created_at";

fn course_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get(0)?,
        cname: row.get(1)?,
        ccode: row.get(2)?,
        year: row.get(3)?,
        sem: row.get(4)?,
        description: row.get(5)?,
        public: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl TrackerDb {
    /// Create a course; the creator becomes its first member.
    pub fn create_course(&self, course: NewCourse, creator_id: i64) -> Result<Course> {
        if course.cname.trim().is_empty() {
            return Err(TrackerError::BadRequest("Course name is required".into()).into());
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO courses (cname, ccode, year, sem, description, public)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                course.cname,
                course.ccode,
                course.year,
                course.sem,
                course.description,
                course.public
            ],
        )
        .context("Failed to insert course")?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO users_on_courses (course_id, user_id) VALUES (?1, ?2)",
            params![id, creator_id],
        )
        .context("Failed to add course creator")?;
        tx.commit().context("Failed to commit course")?;

        self.get_course(id)?.context("Course not found after insert")
    }

    pub fn list_courses(&self) -> Result<Vec<Course>> {
        let sql = format!("SELECT {} FROM courses ORDER BY id", COURSE_COLUMNS);
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_courses")?;
        let rows = stmt
            .query_map([], course_from_row)
            .context("Failed to query courses")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read course row")
    }

    /// Courses `user_id` is enrolled in.
    pub fn list_courses_for_user(&self, user_id: i64) -> Result<Vec<Course>> {
        let sql = format!(
            "SELECT {} FROM courses
             WHERE id IN (SELECT course_id FROM users_on_courses WHERE user_id = ?1)
             ORDER BY id",
            COURSE_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_courses_for_user")?;
        let rows = stmt
            .query_map(params![user_id], course_from_row)
            .context("Failed to query courses")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read course row")
    }

    pub fn get_course(&self, id: i64) -> Result<Option<Course>> {
        let sql = format!("SELECT {} FROM courses WHERE id = ?1", COURSE_COLUMNS);
        self.conn
            .query_row(&sql, params![id], course_from_row)
            .optional()
            .context("Failed to query course")
    }

    pub fn update_course(&self, id: i64, update: CourseUpdate) -> Result<Course> {
        let mut course = self
            .get_course(id)?
            .ok_or(TrackerError::CourseNotFound { id })?;

        if let Some(cname) = update.cname {
            if cname.trim().is_empty() {
                return Err(TrackerError::BadRequest("Course name is required".into()).into());
            }
            course.cname = cname;
        }
        if let Some(ccode) = update.ccode {
            course.ccode = ccode;
        }
        if let Some(year) = update.year {
            course.year = year;
        }
        if let Some(sem) = update.sem {
            course.sem = sem;
        }
        if let Some(description) = update.description {
            course.description = description;
        }
        if let Some(public) = update.public {
            course.public = public;
        }

        self.conn
            .execute(
                "UPDATE courses SET cname = ?1, ccode = ?2, year = ?3, sem = ?4, description = ?5, public = ?6
                 WHERE id = ?7",
                params![
                    course.cname,
                    course.ccode,
                    course.year,
                    course.sem,
                    course.description,
                    course.public,
                    id
                ],
            )
            .context("Failed to update course")?;
        Ok(course)
    }

    /// Delete a course. Its projects survive, detached from it.
    pub fn delete_course(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM courses WHERE id = ?1", params![id])
            .context("Failed to delete course")?;
        Ok(deleted > 0)
    }

    // ── Membership ────────────────────────────────────────────────────

    pub fn add_course_member(&self, course_id: i64, user_id: i64) -> Result<()> {
        if self.get_course(course_id)?.is_none() {
            return Err(TrackerError::CourseNotFound { id: course_id }.into());
        }
        if self.get_user(user_id)?.is_none() {
            return Err(TrackerError::UserNotFound { id: user_id }.into());
        }
        self.conn
            .execute(
                "INSERT OR IGNORE INTO users_on_courses (course_id, user_id) VALUES (?1, ?2)",
                params![course_id, user_id],
            )
            .context("Failed to add course member")?;
        Ok(())
    }

    pub fn remove_course_member(&self, course_id: i64, user_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM users_on_courses WHERE course_id = ?1 AND user_id = ?2",
                params![course_id, user_id],
            )
            .context("Failed to remove course member")?;
        Ok(deleted > 0)
    }

    pub fn list_course_members(&self, course_id: i64) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT u.user_id, u.user_email, u.user_display_name
                 FROM users u JOIN users_on_courses c ON c.user_id = u.user_id
                 WHERE c.course_id = ?1 ORDER BY u.user_id",
            )
            .context("Failed to prepare list_course_members")?;
        let rows = stmt
            .query_map(params![course_id], |row| {
                Ok(User {
                    user_id: row.get(0)?,
                    user_email: row.get(1)?,
                    user_display_name: row.get(2)?,
                })
            })
            .context("Failed to query course members")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read course member row")
    }

    pub fn is_course_member(&self, course_id: i64, user_id: i64) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users_on_courses WHERE course_id = ?1 AND user_id = ?2)",
                params![course_id, user_id],
                |row| row.get(0),
            )
            .context("Failed to check course membership")
    }
}
