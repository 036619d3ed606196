// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::database::{self, TaskFilter};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{NaiveDate, Utc};
use common::recurrence::{
    CreateRecurringEventPayload, PatternError, RecurringEvent, RecurringPattern,
    ValidationResult, validate_pattern,
};
use common::{
    CalendarView, Category, CreateCategoryPayload, CreateGoalPayload, CreateTaskPayload,
    EventInstance, Goal, KanbanBoard, PendingAction, SyncReport, Task, TaskStats,
    UpdateTaskPayload, actions,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

// --- Tasks ---

/// Handler for listing tasks, optionally filtered.
pub async fn list_tasks(
    State(pool): State<SqlitePool>, // State injection (DB pool)
    Query(filter): Query<TaskFilter>,
) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = database::list_tasks_from_db(&pool, &filter).await?;
    info!("Successfully retrieved {} tasks.", tasks.len());
    Ok(Json(tasks))
}

pub async fn get_task(
    State(pool): State<SqlitePool>,
    Path(task_id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    database::get_task_from_db(&pool, task_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::task_not_found(task_id))
}

/// Handler for creating a new task.
pub async fn create_task(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateTaskPayload>, // Extracting the request body as JSON
) -> Result<(StatusCode, Json<Task>), AppError> {
    debug!("Received request to create task: {}", payload.title);
    if payload.title.trim().is_empty() {
        error!("Validation failed: Task title is empty.");
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "Task title cannot be empty.",
        ));
    }

    let new_task = database::create_task_in_db(&pool, payload).await?;
    info!("Task created successfully with ID: {}", new_task.id);

    // Return a 201 Created status with the new task as JSON.
    Ok((StatusCode::CREATED, Json(new_task)))
}

pub async fn update_task(
    State(pool): State<SqlitePool>,
    Path(task_id): Path<i64>,
    Json(payload): Json<UpdateTaskPayload>,
) -> Result<Json<Task>, AppError> {
    if payload.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "Task title cannot be empty.",
        ));
    }
    database::update_task_in_db(&pool, task_id, payload)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::task_not_found(task_id))
}

/// Handler for deleting a task by ID.
pub async fn delete_task(
    State(pool): State<SqlitePool>,
    Path(task_id): Path<i64>, // Extract task ID from the URL path
) -> Result<StatusCode, AppError> {
    debug!("Attempting to delete task with ID: {}", task_id);

    if database::soft_delete_task_in_db(&pool, task_id).await? {
        info!("Task with ID {} deleted successfully.", task_id);
        Ok(StatusCode::NO_CONTENT) // 204 No Content for successful deletion
    } else {
        Err(AppError::task_not_found(task_id))
    }
}

pub async fn toggle_task(
    State(pool): State<SqlitePool>,
    Path(task_id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    database::toggle_task_in_db(&pool, task_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::task_not_found(task_id))
}

pub async fn toggle_favorite(
    State(pool): State<SqlitePool>,
    Path(task_id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    database::toggle_favorite_in_db(&pool, task_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::task_not_found(task_id))
}

pub async fn task_stats(State(pool): State<SqlitePool>) -> Result<Json<TaskStats>, AppError> {
    let tasks = database::list_tasks_from_db(&pool, &TaskFilter::default()).await?;
    Ok(Json(TaskStats::from_tasks(&tasks, Utc::now().date_naive())))
}

#[derive(Deserialize, Debug)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

pub async fn search_tasks(
    State(pool): State<SqlitePool>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Task>>, AppError> {
    if params.q.trim().is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "Search query cannot be empty.",
        ));
    }
    let tasks = database::search_tasks_in_db(&pool, &params.q).await?;
    debug!("Search '{}' matched {} tasks.", params.q, tasks.len());
    Ok(Json(tasks))
}

pub async fn kanban_board(State(pool): State<SqlitePool>) -> Result<Json<KanbanBoard>, AppError> {
    let tasks = database::list_tasks_from_db(&pool, &TaskFilter::default()).await?;
    Ok(Json(KanbanBoard::from_tasks(tasks)))
}

// --- Categories ---

pub async fn list_categories(
    State(pool): State<SqlitePool>,
) -> Result<Json<Vec<Category>>, AppError> {
    Ok(Json(database::list_categories_from_db(&pool).await?))
}

pub async fn create_category(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateCategoryPayload>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "Category name cannot be empty.",
        ));
    }
    let name = payload.name.trim().to_string();
    match database::create_category_in_db(&pool, payload).await? {
        Some(category) => {
            info!("Category '{}' created with ID: {}", category.name, category.id);
            Ok((StatusCode::CREATED, Json(category)))
        }
        None => Err(AppError::new(
            StatusCode::CONFLICT,
            &format!("Category '{name}' already exists."),
        )),
    }
}

pub async fn delete_category(
    State(pool): State<SqlitePool>,
    Path(category_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if database::delete_category_from_db(&pool, category_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::new(
            StatusCode::NOT_FOUND,
            &format!("Category with ID {category_id} not found."),
        ))
    }
}

// --- Goals ---

/// Goals with their progress recomputed from the current task list.
pub async fn list_goals(State(pool): State<SqlitePool>) -> Result<Json<Vec<Goal>>, AppError> {
    let goals = database::list_goals_from_db(&pool).await?;
    let tasks = database::list_tasks_from_db(&pool, &TaskFilter::default()).await?;
    let today = Utc::now().date_naive();
    Ok(Json(
        goals
            .into_iter()
            .map(|goal| goal.with_progress(&tasks, today))
            .collect(),
    ))
}

pub async fn create_goal(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateGoalPayload>,
) -> Result<(StatusCode, Json<Goal>), AppError> {
    if payload.title.trim().is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "Goal title cannot be empty.",
        ));
    }
    if payload.target < 1 {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "Goal target must be at least 1.",
        ));
    }
    if let (Some(start), Some(end)) = (payload.start_date, payload.end_date) {
        if end < start {
            return Err(AppError::new(
                StatusCode::BAD_REQUEST,
                "Goal end date cannot be before its start date.",
            ));
        }
    }

    let goal = database::create_goal_in_db(&pool, payload).await?;
    let tasks = database::list_tasks_from_db(&pool, &TaskFilter::default()).await?;
    info!("Goal created successfully with ID: {}", goal.id);
    Ok((
        StatusCode::CREATED,
        Json(goal.with_progress(&tasks, Utc::now().date_naive())),
    ))
}

pub async fn delete_goal(
    State(pool): State<SqlitePool>,
    Path(goal_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if database::delete_goal_from_db(&pool, goal_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::new(
            StatusCode::NOT_FOUND,
            &format!("Goal with ID {goal_id} not found."),
        ))
    }
}

// --- Recurring events & calendar ---

/// `[start, end]` query range. `start` defaults to today.
#[derive(Deserialize, Debug)]
pub struct RangeParams {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl RangeParams {
    fn resolve(&self) -> Result<(NaiveDate, Option<NaiveDate>), AppError> {
        let start = self.start.unwrap_or_else(|| Utc::now().date_naive());
        if self.end.is_some_and(|end| end < start) {
            return Err(AppError::new(
                StatusCode::BAD_REQUEST,
                "Range end cannot be before its start.",
            ));
        }
        Ok((start, self.end))
    }
}

pub async fn list_recurring_events(
    State(pool): State<SqlitePool>,
) -> Result<Json<Vec<RecurringEvent>>, AppError> {
    Ok(Json(database::list_recurring_events_from_db(&pool).await?))
}

pub async fn create_recurring_event(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateRecurringEventPayload>,
) -> Result<(StatusCode, Json<RecurringEvent>), AppError> {
    if payload.title.trim().is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "Event title cannot be empty.",
        ));
    }
    let report = validate_pattern(&payload.pattern);
    if !report.valid {
        return Err(PatternError::Invalid(report.errors).into());
    }

    let event = database::create_recurring_event_in_db(&pool, payload).await?;
    info!(
        "Recurring event {} created: {} from {}",
        event.id, event.pattern, event.start_date
    );
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn delete_recurring_event(
    State(pool): State<SqlitePool>,
    Path(event_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if database::delete_recurring_event_from_db(&pool, event_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::event_not_found(event_id))
    }
}

pub async fn recurring_event_instances(
    State(pool): State<SqlitePool>,
    Path(event_id): Path<i64>,
    Query(range): Query<RangeParams>,
) -> Result<Json<Vec<EventInstance>>, AppError> {
    let (start, end) = range.resolve()?;
    let event = database::get_recurring_event_from_db(&pool, event_id)
        .await?
        .ok_or_else(|| AppError::event_not_found(event_id))?;
    let instances = event.instances(start, end)?;
    debug!(
        "Event {} has {} instances from {}",
        event_id,
        instances.len(),
        start
    );
    Ok(Json(instances))
}

#[derive(Serialize, Debug)]
pub struct PatternCheck {
    #[serde(flatten)]
    pub result: ValidationResult,
    pub description: Option<String>,
}

pub async fn validate_recurring_pattern(
    Json(pattern): Json<RecurringPattern>,
) -> Json<PatternCheck> {
    let result = validate_pattern(&pattern);
    let description = result.valid.then(|| pattern.to_string());
    Json(PatternCheck {
        result,
        description,
    })
}

/// Tasks due in the range and every recurring instance within it.
pub async fn calendar(
    State(pool): State<SqlitePool>,
    Query(range): Query<RangeParams>,
) -> Result<Json<CalendarView>, AppError> {
    let (start, end) = range.resolve()?;
    let Some(end) = end else {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "Calendar queries need an end date.",
        ));
    };

    let tasks = database::tasks_due_between(&pool, start, end).await?;
    let mut instances = Vec::new();
    for event in database::list_recurring_events_from_db(&pool).await? {
        match event.instances(start, Some(end)) {
            Ok(found) => instances.extend(found),
            Err(e) => warn!("Skipping recurring event {}: {}", event.id, e),
        }
    }
    instances.sort_by(|a, b| {
        a.instance_date
            .cmp(&b.instance_date)
            .then(a.event.id.cmp(&b.event.id))
    });

    Ok(Json(CalendarView {
        start: Some(start),
        end: Some(end),
        tasks,
        instances,
    }))
}

// --- Offline sync ---

/// Replays actions queued by an offline client, in the order received.
pub async fn sync_actions(
    State(pool): State<SqlitePool>,
    Json(mut pending): Json<Vec<PendingAction>>,
) -> Json<SyncReport> {
    pending.sort_by_key(|action| action.seq);
    debug!("Replaying {} queued actions.", pending.len());

    let (report, _) = actions::replay(pending, |action| {
        let pool = pool.clone();
        async move { database::apply_action_in_db(&pool, action).await.map_err(|e| format!("{e:#}")) }
    })
    .await;

    info!(
        "Sync finished: {} applied, {} failed.",
        report.synced,
        report.failed.len()
    );
    Json(report)
}

// --- Custom Error Handling ---

/// Our custom error type for the application.
#[derive(Debug)]
pub struct AppError {
    code: StatusCode,
    message: String,
}

impl AppError {
    fn new(code: StatusCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }

    fn task_not_found(task_id: i64) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            &format!("Task with ID {task_id} not found."),
        )
    }

    fn event_not_found(event_id: i64) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            &format!("Recurring event with ID {event_id} not found."),
        )
    }
}

/// Allows converting an `anyhow::Error` (coming from `database.rs`)
/// into our `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Log the internal error for debugging.
        error!("Internal server error: {:?}", err);
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            message: "An internal error occurred.".to_string(),
        }
    }
}

impl From<PatternError> for AppError {
    fn from(err: PatternError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, &err.to_string())
    }
}

/// Allows Axum to convert our `AppError` into an HTTP `Response`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(
            "Responding with error: status_code={}, message={}",
            self.code.as_u16(),
            self.message
        );
        (
            self.code,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::{payload, setup_test_db};
    use common::TaskAction;
    use common::recurrence::RecurrenceType;

    #[tokio::test]
    async fn test_create_task_validation_empty_title() {
        // Validation fails before any DB access.
        let pool = setup_test_db().await;

        let result = create_task(State(pool), Json(payload("   "))).await;

        let err = result.unwrap_err();
        assert_eq!(err.code, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Task title cannot be empty.");
    }

    #[tokio::test]
    async fn test_missing_task_is_not_found() {
        let pool = setup_test_db().await;
        let err = toggle_task(State(pool), Path(77)).await.unwrap_err();
        assert_eq!(err.code, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "Task with ID 77 not found.");
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_rejected() {
        let pool = setup_test_db().await;
        let pattern = RecurringPattern {
            days_of_week: Some(vec![]),
            ..RecurringPattern::new(RecurrenceType::Weekly, 1)
        };
        let result = create_recurring_event(
            State(pool),
            Json(CreateRecurringEventPayload {
                title: "Never".into(),
                description: None,
                category: None,
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                pattern,
            }),
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.code, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("at least one day of the week"));
    }

    #[test]
    fn test_range_end_before_start_is_rejected() {
        let range = RangeParams {
            start: NaiveDate::from_ymd_opt(2024, 2, 1),
            end: NaiveDate::from_ymd_opt(2024, 1, 1),
        };
        assert_eq!(range.resolve().unwrap_err().code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sync_replays_in_sequence_order() {
        let pool = setup_test_db().await;
        let queued = |seq: u64, action: TaskAction| PendingAction {
            seq,
            queued_at: Utc::now(),
            action,
        };
        // Delivered out of order: the toggle must run after the create.
        let batch = vec![
            queued(2, TaskAction::Toggle { id: 1 }),
            queued(1, TaskAction::Create {
                payload: payload("offline task"),
            }),
            queued(3, TaskAction::Delete { id: 99 }),
        ];

        let Json(report) = sync_actions(State(pool.clone()), Json(batch)).await;

        assert_eq!(report.synced, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].seq, 3);
        let task = database::get_task_from_db(&pool, 1).await.unwrap().unwrap();
        assert!(task.completed);
    }
}
