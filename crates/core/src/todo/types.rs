use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A named todo list that owns tasks.
///
/// `task_count` and `completed_tasks` are server-computed aggregates;
/// the cache layer treats them as opaque values and resyncs them by
/// invalidation rather than recomputing them locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoList {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Accent color for the list (CSS color value).
    pub color: String,
    #[serde(default)]
    pub task_count: u64,
    #[serde(default)]
    pub completed_tasks: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TodoList {
    /// Creates a new list with the given id, name and color.
    pub fn new(id: impl Into<String>, name: impl Into<String>, color: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            color: color.into(),
            task_count: 0,
            completed_tasks: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description for this list.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Task priority, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Returns the wire name for this priority.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

/// Task workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Todo,
    Ongoing,
    Done,
}

impl TaskStatus {
    /// Returns the wire name for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::Ongoing => "ongoing",
            TaskStatus::Done => "done",
        }
    }

    /// Returns true for completed tasks.
    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Done)
    }
}

/// A task belonging to a todo list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Id of the owning todo list.
    pub todo_list: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_overdue: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a new task with default priority and status.
    pub fn new(
        id: impl Into<String>,
        todo_list: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            todo_list: todo_list.into(),
            title: title.into(),
            description: None,
            priority: Priority::Medium,
            status: TaskStatus::Todo,
            start_date: None,
            end_date: None,
            is_overdue: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the status for this task.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the priority for this task.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the start date for this task.
    pub fn with_start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    /// Sets the due date for this task.
    pub fn with_end_date(mut self, date: NaiveDate) -> Self {
        self.end_date = Some(date);
        self
    }

    /// The calendar date this task is displayed on: the due date when
    /// present, otherwise the start date. Undated tasks return `None`.
    pub fn display_date(&self) -> Option<NaiveDate> {
        self.end_date.or(self.start_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_task_defaults() {
        let task = Task::new("t-1", "l-1", "Write report");
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.status, TaskStatus::Todo);
        assert!(!task.is_overdue);
        assert!(task.display_date().is_none());
    }

    #[test]
    fn test_display_date_prefers_end_date() {
        let task = Task::new("t-1", "l-1", "Write report")
            .with_start_date(date(2024, 1, 10))
            .with_end_date(date(2024, 1, 15));
        assert_eq!(task.display_date(), Some(date(2024, 1, 15)));

        let task = Task::new("t-2", "l-1", "Draft outline").with_start_date(date(2024, 1, 10));
        assert_eq!(task.display_date(), Some(date(2024, 1, 10)));
    }

    #[test]
    fn test_status_serde_wire_names() {
        let json = serde_json::to_string(&TaskStatus::Ongoing).unwrap();
        assert_eq!(json, "\"ongoing\"");
        let parsed: Priority = serde_json::from_str("\"urgent\"").unwrap();
        assert_eq!(parsed, Priority::Urgent);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::High < Priority::Urgent);
    }

    #[test]
    fn test_list_builder() {
        let list = TodoList::new("l-1", "Work", "#3B82F6").with_description("Day job");
        assert_eq!(list.name, "Work");
        assert_eq!(list.description, Some("Day job".to_string()));
        assert_eq!(list.task_count, 0);
    }
}
