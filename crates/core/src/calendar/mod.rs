//! Month-grid calendar views over cached tasks.
//!
//! The grid is Sunday-first and always made of whole weeks: leading
//! and trailing padding days complete the first and last rows. Tasks
//! bucket on their due date, falling back to their start date.

mod grid;
mod types;

pub use grid::{group_tasks_by_date, month_grid, month_grid_on, sort_day_tasks};
pub use types::{
    month_name, next_month, previous_month, CalendarDay, CalendarMonth, CalendarWeek,
};
