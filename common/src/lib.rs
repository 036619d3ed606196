// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
pub mod actions;
pub mod recurrence;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

pub use actions::{FailedAction, PendingAction, SyncReport, TaskAction};
pub use recurrence::{
    EventInstance, PatternError, RecurrenceType, RecurringEvent, RecurringPattern,
    ValidationResult,
};

/// Priority of a task. Stored as lowercase text.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("Unknown priority '{other}' (expected low, medium or high).")),
        }
    }
}

/// Represents a task within the system.
///
/// Tags travel as an array on the API. The storage layer keeps them as a
/// single comma-joined string, see [`split_tags`] and [`join_tags`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub favorite: bool,
    pub category: Option<String>,
    pub tags: Vec<String>,
    // We use NaiveDate because we are only interested in the day,
    // without a timezone.
    pub due_date: Option<NaiveDate>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A task is overdue once its due date is in the past and it is still open.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < today)
    }
}

/// Structure used to receive task creation data from the API.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CreateTaskPayload {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// Partial update of a task. Absent fields are left untouched; an explicit
/// `null` clears `description`, `category` or `due_date`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct UpdateTaskPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub category: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

/// Keeps a present `null` apart from a missing field: `Some(None)` vs `None`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Splits a comma-joined tag string into trimmed, non-empty tags.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Joins tags into the comma-separated storage form.
pub fn join_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// A named group of tasks with a display color.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CreateCategoryPayload {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// Colors handed out to categories created without one, in order.
pub const CATEGORY_PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Picks the palette color for the `existing`-th category, wrapping around.
pub fn palette_color(existing: usize) -> &'static str {
    CATEGORY_PALETTE[existing % CATEGORY_PALETTE.len()]
}

/// Column of the kanban board a task is shown in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KanbanColumn {
    Todo,
    InProgress,
    Done,
}

impl KanbanColumn {
    /// Tasks carry no explicit status: completed tasks are done, high
    /// priority open tasks are in progress, everything else is to do.
    pub fn for_task(task: &Task) -> Self {
        if task.completed {
            KanbanColumn::Done
        } else if task.priority == Priority::High {
            KanbanColumn::InProgress
        } else {
            KanbanColumn::Todo
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct KanbanBoard {
    pub todo: Vec<Task>,
    pub in_progress: Vec<Task>,
    pub done: Vec<Task>,
}

impl KanbanBoard {
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut board = KanbanBoard::default();
        for task in tasks {
            match KanbanColumn::for_task(&task) {
                KanbanColumn::Todo => board.todo.push(task),
                KanbanColumn::InProgress => board.in_progress.push(task),
                KanbanColumn::Done => board.done.push(task),
            }
        }
        board
    }
}

/// Aggregated counters over a task list.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub overdue: usize,
    pub favorites: usize,
    pub by_category: BTreeMap<String, usize>,
    pub completion_rate: f64,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task], today: NaiveDate) -> Self {
        let mut stats = TaskStats {
            total: tasks.len(),
            ..Default::default()
        };
        for task in tasks {
            if task.completed {
                stats.completed += 1;
            } else {
                stats.pending += 1;
            }
            if task.is_overdue(today) {
                stats.overdue += 1;
            }
            if task.favorite {
                stats.favorites += 1;
            }
            let category = task.category.as_deref().unwrap_or("uncategorized");
            *stats.by_category.entry(category.to_string()).or_default() += 1;
        }
        if stats.total > 0 {
            stats.completion_rate = stats.completed as f64 / stats.total as f64;
        }
        stats
    }
}

/// Period a goal is measured over when it has no explicit end date.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GoalPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl GoalPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalPeriod::Daily => "daily",
            GoalPeriod::Weekly => "weekly",
            GoalPeriod::Monthly => "monthly",
        }
    }

    /// First and last day of the period containing `day`.
    pub fn window(&self, day: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            GoalPeriod::Daily => (day, day),
            GoalPeriod::Weekly => {
                let week = day.week(Weekday::Mon);
                (week.first_day(), week.last_day())
            }
            GoalPeriod::Monthly => {
                let first = day.with_day(1).unwrap_or(day);
                let last = first
                    .checked_add_months(Months::new(1))
                    .and_then(|next| next.pred_opt())
                    .unwrap_or(day);
                (first, last)
            }
        }
    }
}

impl FromStr for GoalPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(GoalPeriod::Daily),
            "weekly" => Ok(GoalPeriod::Weekly),
            "monthly" => Ok(GoalPeriod::Monthly),
            other => Err(format!("Unknown goal type '{other}'.")),
        }
    }
}

/// A target number of completed tasks over a period.
///
/// `current` and `completed` are never stored: [`Goal::with_progress`]
/// recomputes them from the task list each time goals are read.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Goal {
    pub id: i64,
    pub title: String,
    pub target: i64,
    #[serde(default)]
    pub current: i64,
    #[serde(rename = "type")]
    pub period: GoalPeriod,
    pub category: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl Goal {
    /// Days counted toward the goal as of `today`.
    pub fn progress_window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self.end_date {
            Some(end) => (self.start_date, end),
            None => {
                let (first, last) = self.period.window(today);
                (first.max(self.start_date), last)
            }
        }
    }

    pub fn with_progress(mut self, tasks: &[Task], today: NaiveDate) -> Self {
        let (from, to) = self.progress_window(today);
        let current = tasks
            .iter()
            .filter(|task| task.completed)
            .filter(|task| match &self.category {
                Some(category) => task.category.as_ref() == Some(category),
                None => true,
            })
            .filter_map(|task| task.completed_at)
            .map(|at| at.date_naive())
            .filter(|day| *day >= from && *day <= to)
            .count();
        self.current = current as i64;
        self.completed = self.current >= self.target;
        self
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CreateGoalPayload {
    pub title: String,
    pub target: i64,
    #[serde(rename = "type")]
    pub period: GoalPeriod,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// Everything scheduled in a date range: due tasks and recurring instances.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CalendarView {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub tasks: Vec<Task>,
    pub instances: Vec<EventInstance>,
}
