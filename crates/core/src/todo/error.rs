use thiserror::Error;

/// Validation errors for todo lists.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListError {
    #[error("List name cannot be empty")]
    EmptyName,
    #[error("List name cannot exceed 100 characters")]
    NameTooLong,
    #[error("Invalid color value: {0}")]
    InvalidColor(String),
}

/// Validation errors for tasks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task title cannot be empty")]
    EmptyTitle,
    #[error("Task title cannot exceed 200 characters")]
    TitleTooLong,
    #[error("Task must belong to a todo list")]
    MissingList,
    #[error("Start date must be on or before the due date")]
    InvalidDateRange,
}
