use chrono::NaiveDate;

use super::error::{ListError, TaskError};
use super::requests::{CreateListRequest, CreateTaskRequest, UpdateListRequest, UpdateTaskRequest};

/// Validates a list creation request before it is sent.
pub fn validate_new_list(req: &CreateListRequest) -> Result<(), ListError> {
    validate_list_fields(Some(&req.name), req.color.as_deref())
}

/// Validates a list patch before it is applied and sent.
pub fn validate_list_patch(req: &UpdateListRequest) -> Result<(), ListError> {
    validate_list_fields(req.name.as_deref(), req.color.as_deref())
}

/// Validates a task creation request before it is sent.
pub fn validate_new_task(req: &CreateTaskRequest) -> Result<(), TaskError> {
    if req.todo_list.trim().is_empty() {
        return Err(TaskError::MissingList);
    }
    validate_task_fields(Some(&req.title), req.start_date, req.end_date)
}

/// Validates a task patch before it is applied and sent.
///
/// A patch carrying only one of the two dates cannot be checked for
/// range inversion here; the server remains the authority for that
/// case.
pub fn validate_task_patch(req: &UpdateTaskRequest) -> Result<(), TaskError> {
    validate_task_fields(req.title.as_deref(), req.start_date, req.end_date)
}

fn validate_list_fields(name: Option<&str>, color: Option<&str>) -> Result<(), ListError> {
    if let Some(name) = name {
        if name.trim().is_empty() {
            return Err(ListError::EmptyName);
        }
        if name.len() > 100 {
            return Err(ListError::NameTooLong);
        }
    }
    if let Some(color) = color {
        if !is_valid_color(color) {
            return Err(ListError::InvalidColor(color.to_string()));
        }
    }
    Ok(())
}

fn validate_task_fields(
    title: Option<&str>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Result<(), TaskError> {
    if let Some(title) = title {
        if title.trim().is_empty() {
            return Err(TaskError::EmptyTitle);
        }
        if title.len() > 200 {
            return Err(TaskError::TitleTooLong);
        }
    }
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if end < start {
            return Err(TaskError::InvalidDateRange);
        }
    }
    Ok(())
}

/// Checks if a color string is valid (hex color or CSS named color).
fn is_valid_color(color: &str) -> bool {
    if color.is_empty() {
        return false;
    }

    // Check hex color format (#RGB, #RRGGBB, #RRGGBBAA)
    if let Some(hex) = color.strip_prefix('#') {
        let valid_lengths = [3, 6, 8];
        return valid_lengths.contains(&hex.len()) && hex.chars().all(|c| c.is_ascii_hexdigit());
    }

    let css_colors = [
        "red", "green", "blue", "yellow", "orange", "purple", "pink", "cyan", "magenta", "white",
        "black", "gray", "grey", "brown", "navy", "teal", "olive", "maroon", "lime", "aqua",
        "fuchsia", "silver",
    ];
    css_colors.contains(&color.to_lowercase().as_str())
}
