use std::collections::HashMap;

use chrono::{Datelike, Duration, Local, NaiveDate};

use super::types::{next_month, CalendarDay, CalendarMonth, CalendarWeek};
use crate::todo::Task;

/// Groups tasks by their display date (due date, falling back to the
/// start date). Tasks without either date carry no calendar position
/// and are skipped.
pub fn group_tasks_by_date(tasks: &[Task]) -> HashMap<NaiveDate, Vec<Task>> {
    let mut grouped: HashMap<NaiveDate, Vec<Task>> = HashMap::new();

    for task in tasks {
        if let Some(date) = task.display_date() {
            grouped.entry(date).or_default().push(task.clone());
        }
    }

    grouped
}

/// Sorts one day's tasks for display: highest priority first, then by
/// title for a stable order.
pub fn sort_day_tasks(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.title.cmp(&b.title)));
}

/// Builds the month grid for the current date.
pub fn month_grid(year: i32, month: u32, tasks: &[Task]) -> Option<CalendarMonth> {
    month_grid_on(year, month, tasks, Local::now().date_naive())
}

/// Builds a Sunday-first month grid of whole weeks. The first week is
/// padded backwards to Sunday and the last forwards to Saturday, so a
/// month that spans exactly full weeks produces no padding at all.
/// Tasks landing on padding days are still displayed there.
///
/// Returns `None` when `month` is not 1 through 12 or `year` is
/// outside the supported date range.
pub fn month_grid_on(
    year: i32,
    month: u32,
    tasks: &[Task],
    today: NaiveDate,
) -> Option<CalendarMonth> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let (next_year, next_month) = next_month(year, month);
    let last = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;

    let start = first - Duration::days(i64::from(first.weekday().num_days_from_sunday()));
    let end = last + Duration::days(i64::from(6 - last.weekday().num_days_from_sunday()));

    let mut grouped = group_tasks_by_date(tasks);
    let mut weeks = Vec::new();
    let mut days = Vec::with_capacity(7);
    let mut current = start;
    while current <= end {
        let mut day_tasks = grouped.remove(&current).unwrap_or_default();
        sort_day_tasks(&mut day_tasks);
        days.push(CalendarDay {
            date: current,
            in_month: current.month() == month && current.year() == year,
            is_today: current == today,
            tasks: day_tasks,
        });
        if days.len() == 7 {
            weeks.push(CalendarWeek {
                days: std::mem::take(&mut days),
            });
        }
        current += Duration::days(1);
    }

    Some(CalendarMonth { year, month, weeks })
}
