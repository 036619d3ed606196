// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use common::recurrence::{CreateRecurringEventPayload, RecurringEvent, RecurringPattern};
use common::{
    Category, CreateCategoryPayload, CreateGoalPayload, CreateTaskPayload, Goal, GoalPeriod,
    Priority, Task, TaskAction, UpdateTaskPayload, join_tags, palette_color, split_tags,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, migrate::MigrateDatabase};
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT NULL,
    completed BOOLEAN NOT NULL DEFAULT 0,
    favorite BOOLEAN NOT NULL DEFAULT 0,
    category TEXT NULL,
    tags TEXT NOT NULL DEFAULT '',
    due_date DATE NULL,
    priority TEXT NOT NULL DEFAULT 'medium',
    created_at TIMESTAMP NOT NULL,
    completed_at TIMESTAMP WITH TIME ZONE NULL,
    deleted_at TIMESTAMP WITH TIME ZONE NULL
);
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    color TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL
);
CREATE TABLE IF NOT EXISTS goals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    target INTEGER NOT NULL,
    period TEXT NOT NULL,
    category TEXT NULL,
    start_date DATE NOT NULL,
    end_date DATE NULL,
    created_at TIMESTAMP NOT NULL
);
CREATE TABLE IF NOT EXISTS recurring_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT NULL,
    category TEXT NULL,
    start_date DATE NOT NULL,
    pattern TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL
);
"#;

const TASK_COLUMNS: &str = "id, title, description, completed, favorite, category, tags, \
                            due_date, priority, created_at, completed_at";

/// Establishes the database connection pool.
/// If the database does not exist, it creates it, then makes sure
/// every table exists.
pub async fn establish_connection_pool(database_url: &str) -> Result<SqlitePool> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        info!("Creating database {}", database_url);
        if let Some(parent) = sqlite_file_path(database_url).and_then(Path::parent) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        Sqlite::create_database(database_url)
            .await
            .context("Failed to create database")?;
    } else {
        info!("Database already exists.");
    }

    let pool = SqlitePool::connect(database_url)
        .await
        .context("Failed to connect to database")?;

    init_schema(&pool).await?;

    Ok(pool)
}

fn sqlite_file_path(database_url: &str) -> Option<&Path> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next()?;
    (!path.is_empty() && path != ":memory:").then(|| Path::new(path))
}

/// Creates the tables if they are missing.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .context("Failed to create tables")?;
    info!("Tables are ready.");
    Ok(())
}

// --- Tasks ---

/// Row as stored: tags are comma-joined and priority is plain text.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    title: String,
    description: Option<String>,
    completed: bool,
    favorite: bool,
    category: Option<String>,
    tags: String,
    due_date: Option<NaiveDate>,
    priority: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRow> for Task {
    type Error = anyhow::Error;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Task {
            id: row.id,
            title: row.title,
            description: row.description,
            completed: row.completed,
            favorite: row.favorite,
            category: row.category,
            tags: split_tags(&row.tags),
            due_date: row.due_date,
            priority: row.priority.parse::<Priority>().map_err(|e| anyhow!(e))?,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

fn into_tasks(rows: Vec<TaskRow>) -> Result<Vec<Task>> {
    rows.into_iter().map(Task::try_from).collect()
}

/// Optional filters for [`list_tasks_from_db`].
#[derive(Debug, Default, Clone, serde::Deserialize)]
pub struct TaskFilter {
    pub category: Option<String>,
    pub completed: Option<bool>,
    pub favorite: Option<bool>,
}

/// Retrieves tasks, excluding soft-deleted ones. Open tasks come first,
/// then by due date (undated last), then newest first.
pub async fn list_tasks_from_db(pool: &SqlitePool, filter: &TaskFilter) -> Result<Vec<Task>> {
    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE deleted_at IS NULL"
    ));
    if let Some(category) = &filter.category {
        query.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(completed) = filter.completed {
        query.push(" AND completed = ").push_bind(completed);
    }
    if let Some(favorite) = filter.favorite {
        query.push(" AND favorite = ").push_bind(favorite);
    }
    query.push(" ORDER BY completed ASC, due_date IS NULL, due_date ASC, created_at DESC, id DESC");

    let rows = query
        .build_query_as::<TaskRow>()
        .fetch_all(pool)
        .await
        .context("Failed to retrieve tasks from DB")?;

    into_tasks(rows)
}

pub async fn get_task_from_db(pool: &SqlitePool, task_id: i64) -> Result<Option<Task>> {
    let row = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND deleted_at IS NULL"
    ))
    .bind(task_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("Failed to retrieve task with ID: {task_id}"))?;

    row.map(Task::try_from).transpose()
}

/// Tasks matching `needle` in their title, description or tags.
pub async fn search_tasks_in_db(pool: &SqlitePool, needle: &str) -> Result<Vec<Task>> {
    let pattern = format!("%{}%", needle.trim());
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE deleted_at IS NULL \
         AND (title LIKE ?1 OR description LIKE ?1 OR tags LIKE ?1) \
         ORDER BY completed ASC, created_at DESC, id DESC"
    ))
    .bind(pattern)
    .fetch_all(pool)
    .await
    .context("Failed to search tasks in DB")?;

    into_tasks(rows)
}

/// Tasks due within `[start, end]`, by due date.
pub async fn tasks_due_between(
    pool: &SqlitePool,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Task>> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE deleted_at IS NULL \
         AND due_date BETWEEN ? AND ? ORDER BY due_date ASC, id ASC"
    ))
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
    .context("Failed to retrieve tasks due in range from DB")?;

    into_tasks(rows)
}

/// Inserts a new task into the database.
pub async fn create_task_in_db(pool: &SqlitePool, payload: CreateTaskPayload) -> Result<Task> {
    let created_at = Utc::now();
    let priority = payload.priority.unwrap_or_default();
    let tags = join_tags(&payload.tags);

    debug!(
        "Insert values: title={}, category={:?}, tags={}, due_date={:?}, priority={}",
        payload.title, payload.category, tags, payload.due_date, priority
    );

    let id = sqlx::query(
        "INSERT INTO tasks (title, description, completed, favorite, category, tags, due_date, priority, created_at, completed_at, deleted_at) \
         VALUES (?, ?, 0, 0, ?, ?, ?, ?, ?, NULL, NULL)",
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.category)
    .bind(&tags)
    .bind(payload.due_date)
    .bind(priority.as_str())
    .bind(created_at)
    .execute(pool)
    .await
    .context("Failed to insert task into DB")?
    .last_insert_rowid();

    Ok(Task {
        id,
        title: payload.title,
        description: payload.description,
        completed: false,
        favorite: false,
        category: payload.category,
        tags: split_tags(&tags),
        due_date: payload.due_date,
        priority,
        created_at,
        completed_at: None,
    })
}

/// Applies a partial update. Returns `None` when the task does not exist.
pub async fn update_task_in_db(
    pool: &SqlitePool,
    task_id: i64,
    payload: UpdateTaskPayload,
) -> Result<Option<Task>> {
    let Some(mut task) = get_task_from_db(pool, task_id).await? else {
        return Ok(None);
    };

    if let Some(title) = payload.title {
        task.title = title;
    }
    if let Some(description) = payload.description {
        task.description = description;
    }
    if let Some(category) = payload.category {
        task.category = category;
    }
    if let Some(tags) = payload.tags {
        task.tags = split_tags(&join_tags(&tags));
    }
    if let Some(due_date) = payload.due_date {
        task.due_date = due_date;
    }
    if let Some(priority) = payload.priority {
        task.priority = priority;
    }
    if let Some(completed) = payload.completed {
        set_completion(&mut task, completed);
    }

    sqlx::query(
        "UPDATE tasks SET title = ?, description = ?, category = ?, tags = ?, due_date = ?, \
         priority = ?, completed = ?, completed_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(&task.title)
    .bind(&task.description)
    .bind(&task.category)
    .bind(join_tags(&task.tags))
    .bind(task.due_date)
    .bind(task.priority.as_str())
    .bind(task.completed)
    .bind(task.completed_at)
    .bind(task_id)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to update task with ID: {task_id}"))?;

    info!("Updated task with ID: {}", task_id);
    Ok(Some(task))
}

fn set_completion(task: &mut Task, completed: bool) {
    if completed && !task.completed {
        task.completed_at = Some(Utc::now());
    } else if !completed {
        task.completed_at = None;
    }
    task.completed = completed;
}

/// Flips the completion flag, stamping or clearing `completed_at`.
pub async fn toggle_task_in_db(pool: &SqlitePool, task_id: i64) -> Result<Option<Task>> {
    let Some(mut task) = get_task_from_db(pool, task_id).await? else {
        return Ok(None);
    };
    let completed = !task.completed;
    set_completion(&mut task, completed);

    sqlx::query("UPDATE tasks SET completed = ?, completed_at = ? WHERE id = ?")
        .bind(task.completed)
        .bind(task.completed_at)
        .bind(task_id)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to toggle task with ID: {task_id}"))?;

    debug!("Task {} is now completed={}", task_id, task.completed);
    Ok(Some(task))
}

pub async fn toggle_favorite_in_db(pool: &SqlitePool, task_id: i64) -> Result<Option<Task>> {
    let Some(mut task) = get_task_from_db(pool, task_id).await? else {
        return Ok(None);
    };
    task.favorite = !task.favorite;

    sqlx::query("UPDATE tasks SET favorite = ? WHERE id = ?")
        .bind(task.favorite)
        .bind(task_id)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to toggle favorite on task with ID: {task_id}"))?;

    Ok(Some(task))
}

/// Soft deletes a task from the database by setting its `deleted_at` timestamp.
/// Returns true if a task was updated, false if no task with the given ID was found.
pub async fn soft_delete_task_in_db(pool: &SqlitePool, task_id: i64) -> Result<bool> {
    debug!("Attempting to soft delete task with ID: {}", task_id);
    let result = sqlx::query(
        "UPDATE tasks SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL", // Only update if not already deleted
    )
    .bind(Utc::now())
    .bind(task_id)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to soft delete task with ID: {task_id}"))?;

    let rows_affected = result.rows_affected();
    info!("Soft deleted {} rows for task ID: {}", rows_affected, task_id);

    Ok(rows_affected > 0)
}

/// Executes one replayed offline action. A missing task is an error so
/// that the caller can report it.
pub async fn apply_action_in_db(pool: &SqlitePool, action: TaskAction) -> Result<()> {
    match action {
        TaskAction::Create { payload } => {
            if payload.title.trim().is_empty() {
                return Err(anyhow!("Task title cannot be empty."));
            }
            create_task_in_db(pool, payload).await?;
        }
        TaskAction::Update { id, payload } => {
            update_task_in_db(pool, id, payload)
                .await?
                .ok_or_else(|| anyhow!("Task with ID {id} not found."))?;
        }
        TaskAction::Delete { id } => {
            if !soft_delete_task_in_db(pool, id).await? {
                return Err(anyhow!("Task with ID {id} not found."));
            }
        }
        TaskAction::Toggle { id } => {
            toggle_task_in_db(pool, id)
                .await?
                .ok_or_else(|| anyhow!("Task with ID {id} not found."))?;
        }
    }
    Ok(())
}

// --- Categories ---

pub async fn list_categories_from_db(pool: &SqlitePool) -> Result<Vec<Category>> {
    sqlx::query_as::<_, Category>(
        "SELECT id, name, color, created_at FROM categories ORDER BY name ASC",
    )
    .fetch_all(pool)
    .await
    .context("Failed to retrieve categories from DB")
}

/// Inserts a category. Returns `None` when the name is already taken.
pub async fn create_category_in_db(
    pool: &SqlitePool,
    payload: CreateCategoryPayload,
) -> Result<Option<Category>> {
    let name = payload.name.trim().to_string();
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
        .fetch_one(pool)
        .await
        .context("Failed to count categories")?;
    let color = payload
        .color
        .unwrap_or_else(|| palette_color(existing as usize).to_string());
    let created_at = Utc::now();

    // A taken name leaves the row count at zero.
    let result = sqlx::query(
        "INSERT INTO categories (name, color, created_at) VALUES (?, ?, ?) \
         ON CONFLICT(name) DO NOTHING",
    )
    .bind(&name)
    .bind(&color)
    .bind(created_at)
    .execute(pool)
    .await
    .context("Failed to insert category into DB")?;
    if result.rows_affected() == 0 {
        debug!("Category '{}' already exists.", name);
        return Ok(None);
    }

    Ok(Some(Category {
        id: result.last_insert_rowid(),
        name,
        color,
        created_at,
    }))
}

pub async fn delete_category_from_db(pool: &SqlitePool, category_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(category_id)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to delete category with ID: {category_id}"))?;
    Ok(result.rows_affected() > 0)
}

// --- Goals ---

#[derive(sqlx::FromRow)]
struct GoalRow {
    id: i64,
    title: String,
    target: i64,
    period: String,
    category: Option<String>,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

impl TryFrom<GoalRow> for Goal {
    type Error = anyhow::Error;

    fn try_from(row: GoalRow) -> Result<Self> {
        Ok(Goal {
            id: row.id,
            title: row.title,
            target: row.target,
            current: 0,
            period: row.period.parse::<GoalPeriod>().map_err(|e| anyhow!(e))?,
            category: row.category,
            start_date: row.start_date,
            end_date: row.end_date,
            completed: false,
            created_at: row.created_at,
        })
    }
}

/// Goals as stored; progress is filled in by the caller.
pub async fn list_goals_from_db(pool: &SqlitePool) -> Result<Vec<Goal>> {
    let rows = sqlx::query_as::<_, GoalRow>(
        "SELECT id, title, target, period, category, start_date, end_date, created_at \
         FROM goals ORDER BY start_date ASC, id ASC",
    )
    .fetch_all(pool)
    .await
    .context("Failed to retrieve goals from DB")?;

    rows.into_iter().map(Goal::try_from).collect()
}

pub async fn create_goal_in_db(pool: &SqlitePool, payload: CreateGoalPayload) -> Result<Goal> {
    let created_at = Utc::now();
    let start_date = payload.start_date.unwrap_or_else(|| created_at.date_naive());

    let id = sqlx::query(
        "INSERT INTO goals (title, target, period, category, start_date, end_date, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&payload.title)
    .bind(payload.target)
    .bind(payload.period.as_str())
    .bind(&payload.category)
    .bind(start_date)
    .bind(payload.end_date)
    .bind(created_at)
    .execute(pool)
    .await
    .context("Failed to insert goal into DB")?
    .last_insert_rowid();

    Ok(Goal {
        id,
        title: payload.title,
        target: payload.target,
        current: 0,
        period: payload.period,
        category: payload.category,
        start_date,
        end_date: payload.end_date,
        completed: false,
        created_at,
    })
}

pub async fn delete_goal_from_db(pool: &SqlitePool, goal_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM goals WHERE id = ?")
        .bind(goal_id)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to delete goal with ID: {goal_id}"))?;
    Ok(result.rows_affected() > 0)
}

// --- Recurring events ---

/// The pattern is kept as its JSON text.
#[derive(sqlx::FromRow)]
struct RecurringEventRow {
    id: i64,
    title: String,
    description: Option<String>,
    category: Option<String>,
    start_date: NaiveDate,
    pattern: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<RecurringEventRow> for RecurringEvent {
    type Error = anyhow::Error;

    fn try_from(row: RecurringEventRow) -> Result<Self> {
        let pattern: RecurringPattern = serde_json::from_str(&row.pattern)
            .with_context(|| format!("Corrupt pattern for recurring event {}", row.id))?;
        Ok(RecurringEvent {
            id: row.id,
            title: row.title,
            description: row.description,
            category: row.category,
            start_date: row.start_date,
            pattern,
            created_at: row.created_at,
        })
    }
}

const EVENT_COLUMNS: &str = "id, title, description, category, start_date, pattern, created_at";

pub async fn list_recurring_events_from_db(pool: &SqlitePool) -> Result<Vec<RecurringEvent>> {
    let rows = sqlx::query_as::<_, RecurringEventRow>(&format!(
        "SELECT {EVENT_COLUMNS} FROM recurring_events ORDER BY start_date ASC, id ASC"
    ))
    .fetch_all(pool)
    .await
    .context("Failed to retrieve recurring events from DB")?;

    rows.into_iter().map(RecurringEvent::try_from).collect()
}

pub async fn get_recurring_event_from_db(
    pool: &SqlitePool,
    event_id: i64,
) -> Result<Option<RecurringEvent>> {
    let row = sqlx::query_as::<_, RecurringEventRow>(&format!(
        "SELECT {EVENT_COLUMNS} FROM recurring_events WHERE id = ?"
    ))
    .bind(event_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("Failed to retrieve recurring event with ID: {event_id}"))?;

    row.map(RecurringEvent::try_from).transpose()
}

/// Stores an event. The pattern must already be validated.
pub async fn create_recurring_event_in_db(
    pool: &SqlitePool,
    payload: CreateRecurringEventPayload,
) -> Result<RecurringEvent> {
    let created_at = Utc::now();
    let pattern_json =
        serde_json::to_string(&payload.pattern).context("Failed to serialize pattern")?;

    let id = sqlx::query(
        "INSERT INTO recurring_events (title, description, category, start_date, pattern, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.category)
    .bind(payload.start_date)
    .bind(&pattern_json)
    .bind(created_at)
    .execute(pool)
    .await
    .context("Failed to insert recurring event into DB")?
    .last_insert_rowid();

    Ok(RecurringEvent {
        id,
        title: payload.title,
        description: payload.description,
        category: payload.category,
        start_date: payload.start_date,
        pattern: payload.pattern,
        created_at,
    })
}

pub async fn delete_recurring_event_from_db(pool: &SqlitePool, event_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM recurring_events WHERE id = ?")
        .bind(event_id)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to delete recurring event with ID: {event_id}"))?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use common::recurrence::RecurrenceType;
    use sqlx::sqlite::SqlitePoolOptions;

    /// Fresh in-memory database with the application schema. A single
    /// connection keeps every query on the same in-memory database.
    pub(crate) async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    pub(crate) fn payload(title: &str) -> CreateTaskPayload {
        CreateTaskPayload {
            title: title.to_string(),
            description: None,
            category: None,
            tags: vec![],
            due_date: None,
            priority: None,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_sqlite_file_path() {
        assert_eq!(
            sqlite_file_path("sqlite://database/sqlite.db"),
            Some(Path::new("database/sqlite.db"))
        );
        assert_eq!(
            sqlite_file_path("sqlite:tasks.db?mode=rwc"),
            Some(Path::new("tasks.db"))
        );
        assert_eq!(sqlite_file_path("sqlite::memory:"), None);
    }

    #[tokio::test]
    async fn test_create_and_get_task() {
        let pool = setup_test_db().await;
        let created = create_task_in_db(
            &pool,
            CreateTaskPayload {
                description: Some("Quarterly numbers".into()),
                category: Some("work".into()),
                tags: vec!["finance".into(), " urgent ".into()],
                due_date: Some(day(2024, 4, 1)),
                priority: Some(Priority::High),
                ..payload("Write report")
            },
        )
        .await
        .unwrap();

        assert!(created.id > 0);
        assert_eq!(created.tags, vec!["finance", "urgent"]);

        let fetched = get_task_from_db(&pool, created.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Write report");
        assert_eq!(fetched.tags, vec!["finance", "urgent"]);
        assert_eq!(fetched.due_date, Some(day(2024, 4, 1)));
        assert_eq!(fetched.priority, Priority::High);
        assert!(!fetched.completed);
    }

    #[tokio::test]
    async fn test_list_filters_and_ordering() {
        let pool = setup_test_db().await;
        let late = create_task_in_db(
            &pool,
            CreateTaskPayload {
                due_date: Some(day(2024, 5, 1)),
                category: Some("home".into()),
                ..payload("late")
            },
        )
        .await
        .unwrap();
        let soon = create_task_in_db(
            &pool,
            CreateTaskPayload {
                due_date: Some(day(2024, 4, 1)),
                ..payload("soon")
            },
        )
        .await
        .unwrap();
        let undated = create_task_in_db(&pool, payload("undated")).await.unwrap();
        toggle_task_in_db(&pool, soon.id).await.unwrap();

        let all = list_tasks_from_db(&pool, &TaskFilter::default()).await.unwrap();
        let ids: Vec<i64> = all.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![late.id, undated.id, soon.id]);

        let home = list_tasks_from_db(
            &pool,
            &TaskFilter {
                category: Some("home".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(home.len(), 1);
        assert_eq!(home[0].id, late.id);

        let done = list_tasks_from_db(
            &pool,
            &TaskFilter {
                completed: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, soon.id);
    }

    #[tokio::test]
    async fn test_toggle_sets_and_clears_completed_at() {
        let pool = setup_test_db().await;
        let task = create_task_in_db(&pool, payload("toggle me")).await.unwrap();

        let done = toggle_task_in_db(&pool, task.id).await.unwrap().unwrap();
        assert!(done.completed);
        assert!(done.completed_at.is_some());

        let reopened = toggle_task_in_db(&pool, task.id).await.unwrap().unwrap();
        assert!(!reopened.completed);
        assert_eq!(reopened.completed_at, None);

        assert!(toggle_task_in_db(&pool, 9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_is_partial() {
        let pool = setup_test_db().await;
        let task = create_task_in_db(
            &pool,
            CreateTaskPayload {
                category: Some("work".into()),
                ..payload("original")
            },
        )
        .await
        .unwrap();

        let updated = update_task_in_db(
            &pool,
            task.id,
            UpdateTaskPayload {
                title: Some("renamed".into()),
                tags: Some(vec!["a".into(), "b".into()]),
                completed: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(updated.title, "renamed");
        assert_eq!(updated.category.as_deref(), Some("work"));
        assert!(updated.completed_at.is_some());

        let fetched = get_task_from_db(&pool, task.id).await.unwrap().unwrap();
        assert_eq!(fetched.tags, vec!["a", "b"]);
        assert!(fetched.completed);

        let cleared = update_task_in_db(
            &pool,
            task.id,
            UpdateTaskPayload {
                category: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(cleared.category, None);
        assert_eq!(cleared.title, "renamed");
        let fetched = get_task_from_db(&pool, task.id).await.unwrap().unwrap();
        assert_eq!(fetched.category, None);

        let missing = update_task_in_db(&pool, 9999, UpdateTaskPayload::default())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_soft_delete_task() {
        let pool = setup_test_db().await;
        let task = create_task_in_db(&pool, payload("This task will be deleted"))
            .await
            .unwrap();

        assert!(soft_delete_task_in_db(&pool, task.id).await.unwrap());
        assert!(!soft_delete_task_in_db(&pool, task.id).await.unwrap());
        assert!(get_task_from_db(&pool, task.id).await.unwrap().is_none());
        let tasks = list_tasks_from_db(&pool, &TaskFilter::default()).await.unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_search_matches_title_description_and_tags() {
        let pool = setup_test_db().await;
        create_task_in_db(&pool, payload("Buy groceries")).await.unwrap();
        create_task_in_db(
            &pool,
            CreateTaskPayload {
                description: Some("remember the groceries list".into()),
                ..payload("Errands")
            },
        )
        .await
        .unwrap();
        create_task_in_db(
            &pool,
            CreateTaskPayload {
                tags: vec!["groceries".into()],
                ..payload("Market")
            },
        )
        .await
        .unwrap();
        create_task_in_db(&pool, payload("Unrelated")).await.unwrap();

        let found = search_tasks_in_db(&pool, "grocer").await.unwrap();
        assert_eq!(found.len(), 3);
    }

    #[tokio::test]
    async fn test_apply_action_reports_missing_task() {
        let pool = setup_test_db().await;
        apply_action_in_db(
            &pool,
            TaskAction::Create {
                payload: payload("from the queue"),
            },
        )
        .await
        .unwrap();
        let err = apply_action_in_db(&pool, TaskAction::Toggle { id: 42 })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Task with ID 42 not found.");
    }

    #[tokio::test]
    async fn test_categories_get_palette_colors_and_unique_names() {
        let pool = setup_test_db().await;
        let first = create_category_in_db(
            &pool,
            CreateCategoryPayload {
                name: "Work".into(),
                color: None,
            },
        )
        .await
        .unwrap()
        .unwrap();
        let second = create_category_in_db(
            &pool,
            CreateCategoryPayload {
                name: "Home".into(),
                color: Some("#000000".into()),
            },
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(first.color, palette_color(0));
        assert_eq!(second.color, "#000000");

        let duplicate = create_category_in_db(
            &pool,
            CreateCategoryPayload {
                name: "Work".into(),
                color: None,
            },
        )
        .await
        .unwrap();
        assert!(duplicate.is_none());

        let names: Vec<String> = list_categories_from_db(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Home", "Work"]);
        assert!(delete_category_from_db(&pool, first.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_category_creates_yield_one_conflict() {
        let pool = setup_test_db().await;
        let create = |color: &str| {
            create_category_in_db(
                &pool,
                CreateCategoryPayload {
                    name: " Errands ".into(),
                    color: Some(color.into()),
                },
            )
        };
        let (a, b) = tokio::join!(create("#111111"), create("#222222"));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1);

        let stored = list_categories_from_db(&pool).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "Errands");
        let winner = a.or(b).unwrap();
        assert_eq!(stored[0].id, winner.id);
        assert_eq!(stored[0].color, winner.color);
    }

    #[tokio::test]
    async fn test_goals_round_trip_through_storage() {
        let pool = setup_test_db().await;
        let goal = create_goal_in_db(
            &pool,
            CreateGoalPayload {
                title: "Ship features".into(),
                target: 3,
                period: GoalPeriod::Monthly,
                category: Some("work".into()),
                start_date: Some(day(2024, 1, 1)),
                end_date: None,
            },
        )
        .await
        .unwrap();

        let goals = list_goals_from_db(&pool).await.unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].id, goal.id);
        assert_eq!(goals[0].period, GoalPeriod::Monthly);
        assert_eq!(goals[0].start_date, day(2024, 1, 1));

        assert!(delete_goal_from_db(&pool, goal.id).await.unwrap());
        assert!(!delete_goal_from_db(&pool, goal.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_recurring_event_pattern_is_persisted() {
        let pool = setup_test_db().await;
        let pattern = RecurringPattern {
            days_of_week: Some(vec![1, 3]),
            ..RecurringPattern::new(RecurrenceType::Weekly, 1)
        };
        let event = create_recurring_event_in_db(
            &pool,
            CreateRecurringEventPayload {
                title: "Gym".into(),
                description: None,
                category: Some("sport".into()),
                start_date: day(2024, 1, 1),
                pattern: pattern.clone(),
            },
        )
        .await
        .unwrap();

        let fetched = get_recurring_event_from_db(&pool, event.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.pattern, pattern);
        assert_eq!(list_recurring_events_from_db(&pool).await.unwrap().len(), 1);
        assert!(delete_recurring_event_from_db(&pool, event.id).await.unwrap());
        assert!(get_recurring_event_from_db(&pool, event.id)
            .await
            .unwrap()
            .is_none());
    }
}
