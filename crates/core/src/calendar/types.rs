use chrono::NaiveDate;
use serde::Serialize;

use crate::todo::Task;

/// One cell of the month grid: a date with the tasks displayed on it.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    /// False for the leading and trailing padding days that complete
    /// the first and last week.
    pub in_month: bool,
    pub is_today: bool,
    pub tasks: Vec<Task>,
}

impl CalendarDay {
    /// Creates an empty day cell.
    pub fn empty(date: NaiveDate, in_month: bool, is_today: bool) -> Self {
        Self {
            date,
            in_month,
            is_today,
            tasks: Vec::new(),
        }
    }

    /// Returns true if no tasks are displayed on this day.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// One Sunday-through-Saturday row of the month grid.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarWeek {
    pub days: Vec<CalendarDay>,
}

/// A whole-week month grid: every week is complete, so the first row
/// may start in the previous month and the last may end in the next.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarMonth {
    pub year: i32,
    /// 1-based month number.
    pub month: u32,
    pub weeks: Vec<CalendarWeek>,
}

impl CalendarMonth {
    /// Heading label, e.g. "March 2024".
    pub fn label(&self) -> String {
        format!("{} {}", month_name(self.month), self.year)
    }
}

/// English month name for a 1-based month number.
pub fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        12 => "December",
        _ => "",
    }
}

/// The month before `(year, month)`, wrapping across January.
pub fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

/// The month after `(year, month)`, wrapping across December.
pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}
