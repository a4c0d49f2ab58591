use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ── Enumerations ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SprintStatus {
    Upcoming,
    Current,
    Completed,
    Closed,
}

impl SprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Current => "current",
            Self::Completed => "completed",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SprintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SprintStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(Self::Upcoming),
            "current" => Ok(Self::Current),
            "completed" => Ok(Self::Completed),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Invalid sprint status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BacklogType {
    Story,
    Task,
    Bug,
}

impl BacklogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Story => "story",
            Self::Task => "task",
            Self::Bug => "bug",
        }
    }
}

impl FromStr for BacklogType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "story" => Ok(Self::Story),
            "task" => Ok(Self::Task),
            "bug" => Ok(Self::Bug),
            _ => Err(format!("Invalid backlog type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BacklogPriority {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
}

impl BacklogPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryHigh => "very_high",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::VeryLow => "very_low",
        }
    }
}

impl FromStr for BacklogPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "very_high" => Ok(Self::VeryHigh),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "very_low" => Ok(Self::VeryLow),
            _ => Err(format!("Invalid backlog priority: {}", s)),
        }
    }
}

/// Kind of change recorded in the backlog history log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryType {
    Create,
    Update,
    Delete,
}

impl HistoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for HistoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(format!("Invalid history type: {}", s)),
        }
    }
}

/// Category of a project-defined backlog status. Only `Done` matters to the
/// burndown chart.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusType {
    Todo,
    InProgress,
    Done,
}

impl StatusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

impl FromStr for StatusType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            _ => Err(format!("Invalid status type: {}", s)),
        }
    }
}

/// Permission carried by a role. `Admin` implies every other action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ReadCourse,
    CreateCourse,
    UpdateCourse,
    DeleteCourse,
    ReadProject,
    CreateProject,
    UpdateProject,
    DeleteProject,
    ReadUsers,
    Admin,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Self::ReadCourse,
        Self::CreateCourse,
        Self::UpdateCourse,
        Self::DeleteCourse,
        Self::ReadProject,
        Self::CreateProject,
        Self::UpdateProject,
        Self::DeleteProject,
        Self::ReadUsers,
        Self::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadCourse => "read_course",
            Self::CreateCourse => "create_course",
            Self::UpdateCourse => "update_course",
            Self::DeleteCourse => "delete_course",
            Self::ReadProject => "read_project",
            Self::CreateProject => "create_project",
            Self::UpdateProject => "update_project",
            Self::DeleteProject => "delete_project",
            Self::ReadUsers => "read_users",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|a| a.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Invalid action: {}", s))
    }
}

/// Built-in roles. The numeric ids are stable and stored in `users_on_roles`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Faculty,
    Student,
    Admin,
}

impl Role {
    pub fn id(&self) -> i64 {
        match self {
            Self::Faculty => 1,
            Self::Student => 2,
            Self::Admin => 3,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::Faculty),
            2 => Some(Self::Student),
            3 => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Faculty => "FACULTY",
            Self::Student => "STUDENT",
            Self::Admin => "ADMIN",
        }
    }

    /// Actions seeded for the role on a fresh database.
    pub fn default_actions(&self) -> &'static [Action] {
        match self {
            Self::Faculty => &[
                Action::ReadCourse,
                Action::CreateCourse,
                Action::UpdateCourse,
                Action::DeleteCourse,
                Action::ReadProject,
                Action::CreateProject,
                Action::UpdateProject,
                Action::DeleteProject,
                Action::ReadUsers,
            ],
            Self::Student => &[
                Action::ReadCourse,
                Action::ReadProject,
                Action::CreateProject,
                Action::UpdateProject,
                Action::DeleteProject,
            ],
            Self::Admin => &[Action::Admin],
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "faculty" => Ok(Self::Faculty),
            "student" => Ok(Self::Student),
            "admin" => Ok(Self::Admin),
            _ => Err(format!(
                "Invalid role '{}'. Valid values: faculty, student, admin",
                s
            )),
        }
    }
}

// ── Entities ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub user_id: i64,
    pub user_email: String,
    pub user_display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    pub session_id: String,
    pub user_email: String,
    pub user_id: i64,
    pub user_role_id: i64,
    pub session_expiry: DateTime<Utc>,
}

/// What `GET /api/account/me` returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: i64,
    pub user_email: String,
    pub user_display_name: String,
    pub user_role_id: i64,
    pub user_role_actions: Vec<Action>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub cname: String,
    pub ccode: Option<String>,
    pub year: i32,
    pub sem: i32,
    pub description: Option<String>,
    pub public: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub pname: String,
    pub pkey: Option<String>,
    pub description: Option<String>,
    pub course_id: Option<i64>,
    pub public: bool,
    pub backlog_counter: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectMember {
    pub project_id: i64,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacklogStatus {
    pub project_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub status_type: StatusType,
    pub order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sprint {
    pub id: i64,
    pub name: String,
    /// Length in weeks.
    pub duration: i32,
    pub project_id: i64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub goals: Option<String>,
    pub status: SprintStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Backlog {
    pub project_id: i64,
    pub backlog_id: i64,
    pub summary: String,
    #[serde(rename = "type")]
    pub backlog_type: BacklogType,
    pub sprint_id: Option<i64>,
    pub priority: Option<BacklogPriority>,
    pub reporter_id: i64,
    pub assignee_id: Option<i64>,
    pub points: Option<i64>,
    pub description: Option<String>,
    pub status: String,
}

/// One immutable entry of the backlog history log: a snapshot of the item
/// right after the change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacklogHistory {
    pub project_id: i64,
    pub backlog_id: i64,
    pub sprint_id: Option<i64>,
    pub history_type: HistoryType,
    #[serde(rename = "type")]
    pub backlog_type: BacklogType,
    pub priority: Option<BacklogPriority>,
    pub reporter_id: i64,
    pub assignee_id: Option<i64>,
    pub points: Option<i64>,
    pub status: String,
    pub date: DateTime<Utc>,
}

impl BacklogHistory {
    /// Snapshot `backlog` as a history event.
    pub fn from_backlog(backlog: &Backlog, history_type: HistoryType, date: DateTime<Utc>) -> Self {
        Self {
            project_id: backlog.project_id,
            backlog_id: backlog.backlog_id,
            sprint_id: backlog.sprint_id,
            history_type,
            backlog_type: backlog.backlog_type,
            priority: backlog.priority,
            reporter_id: backlog.reporter_id,
            assignee_id: backlog.assignee_id,
            points: backlog.points,
            status: backlog.status.clone(),
            date,
        }
    }
}

// API view types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintWithBacklogs {
    #[serde(flatten)]
    pub sprint: Sprint,
    pub backlogs: Vec<Backlog>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintListing {
    pub sprints: Vec<SprintWithBacklogs>,
    pub unassigned_backlogs: Vec<Backlog>,
}

// ── Input payloads ────────────────────────────────────────────────────

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in partial updates.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCourse {
    pub cname: String,
    pub ccode: Option<String>,
    pub year: i32,
    pub sem: i32,
    pub description: Option<String>,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseUpdate {
    pub cname: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub ccode: Option<Option<String>>,
    pub year: Option<i32>,
    pub sem: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub public: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub pname: String,
    pub pkey: Option<String>,
    pub description: Option<String>,
    pub course_id: Option<i64>,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectUpdate {
    pub pname: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub pkey: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub public: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBacklog {
    pub summary: String,
    #[serde(rename = "type")]
    pub backlog_type: BacklogType,
    pub sprint_id: Option<i64>,
    pub priority: Option<BacklogPriority>,
    pub reporter_id: i64,
    pub assignee_id: Option<i64>,
    pub points: Option<i64>,
    pub description: Option<String>,
    /// Defaults to the project's first status.
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BacklogUpdate {
    pub summary: Option<String>,
    #[serde(rename = "type")]
    pub backlog_type: Option<BacklogType>,
    #[serde(default, deserialize_with = "double_option")]
    pub sprint_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub priority: Option<Option<BacklogPriority>>,
    pub reporter_id: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub points: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub status: Option<String>,
}

impl BacklogUpdate {
    /// Apply the present fields onto `backlog`.
    pub fn apply(self, backlog: &mut Backlog) {
        if let Some(summary) = self.summary {
            backlog.summary = summary;
        }
        if let Some(backlog_type) = self.backlog_type {
            backlog.backlog_type = backlog_type;
        }
        if let Some(sprint_id) = self.sprint_id {
            backlog.sprint_id = sprint_id;
        }
        if let Some(priority) = self.priority {
            backlog.priority = priority;
        }
        if let Some(reporter_id) = self.reporter_id {
            backlog.reporter_id = reporter_id;
        }
        if let Some(assignee_id) = self.assignee_id {
            backlog.assignee_id = assignee_id;
        }
        if let Some(points) = self.points {
            backlog.points = points;
        }
        if let Some(description) = self.description {
            backlog.description = description;
        }
        if let Some(status) = self.status {
            backlog.status = status;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSprint {
    pub name: String,
    /// Weeks.
    pub duration: i32,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub goals: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SprintUpdate {
    pub name: Option<String>,
    pub duration: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub end_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub goals: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sprint_status_roundtrip() {
        for s in &["upcoming", "current", "completed", "closed"] {
            let parsed: SprintStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("active".parse::<SprintStatus>().is_err());
    }

    #[test]
    fn test_action_parse_rejects_unknown() {
        assert_eq!("update_project".parse::<Action>().unwrap(), Action::UpdateProject);
        assert!("fly".parse::<Action>().is_err());
    }

    #[test]
    fn test_role_ids_are_stable() {
        for role in [Role::Faculty, Role::Student, Role::Admin] {
            assert_eq!(Role::from_id(role.id()), Some(role));
        }
        assert_eq!(Role::from_id(99), None);
        assert_eq!("Faculty".parse::<Role>().unwrap(), Role::Faculty);
    }

    #[test]
    fn test_backlog_serializes_type_field() {
        let backlog = Backlog {
            project_id: 1,
            backlog_id: 2,
            summary: "Login page".to_string(),
            backlog_type: BacklogType::Story,
            sprint_id: None,
            priority: Some(BacklogPriority::VeryHigh),
            reporter_id: 1,
            assignee_id: None,
            points: Some(3),
            description: None,
            status: "To do".to_string(),
        };
        let json = serde_json::to_value(&backlog).unwrap();
        assert_eq!(json["type"], "story");
        assert_eq!(json["priority"], "very_high");
    }

    #[test]
    fn test_history_snapshot_copies_item_fields() {
        let backlog = Backlog {
            project_id: 7,
            backlog_id: 3,
            summary: "Fix crash".to_string(),
            backlog_type: BacklogType::Bug,
            sprint_id: Some(4),
            priority: None,
            reporter_id: 1,
            assignee_id: Some(2),
            points: Some(5),
            description: None,
            status: "In progress".to_string(),
        };
        let date = Utc::now();
        let history = BacklogHistory::from_backlog(&backlog, HistoryType::Update, date);
        assert_eq!(history.backlog_id, 3);
        assert_eq!(history.sprint_id, Some(4));
        assert_eq!(history.points, Some(5));
        assert_eq!(history.status, "In progress");
        assert_eq!(history.history_type, HistoryType::Update);
        assert_eq!(history.date, date);
    }

    #[test]
    fn test_backlog_update_distinguishes_null_from_absent() {
        let mut backlog = Backlog {
            project_id: 1,
            backlog_id: 1,
            summary: "Old".to_string(),
            backlog_type: BacklogType::Task,
            sprint_id: Some(9),
            priority: None,
            reporter_id: 1,
            assignee_id: Some(2),
            points: Some(3),
            description: None,
            status: "To do".to_string(),
        };
        let update: BacklogUpdate =
            serde_json::from_str(r#"{"summary": "New", "sprint_id": null}"#).unwrap();
        assert_eq!(update.sprint_id, Some(None));
        assert_eq!(update.assignee_id, None);
        update.apply(&mut backlog);

        assert_eq!(backlog.summary, "New");
        assert_eq!(backlog.sprint_id, None);
        assert_eq!(backlog.assignee_id, Some(2));
        assert_eq!(backlog.points, Some(3));
    }
}
