// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::handlers;
use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

/// Creates and configures the application router.
pub fn create_router(pool: SqlitePool) -> Router {
    Router::new()
        .route(
            "/api/tasks",
            get(handlers::list_tasks).post(handlers::create_task),
        )
        // Static segments take precedence over `{id}`.
        .route("/api/tasks/stats", get(handlers::task_stats))
        .route("/api/tasks/search", get(handlers::search_tasks))
        .route("/api/tasks/kanban", get(handlers::kanban_board))
        .route(
            "/api/tasks/{id}",
            get(handlers::get_task)
                .put(handlers::update_task)
                .delete(handlers::delete_task),
        )
        .route("/api/tasks/{id}/toggle", patch(handlers::toggle_task))
        .route("/api/tasks/{id}/favorite", patch(handlers::toggle_favorite))
        .route(
            "/api/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .route("/api/categories/{id}", delete(handlers::delete_category))
        .route(
            "/api/goals",
            get(handlers::list_goals).post(handlers::create_goal),
        )
        .route("/api/goals/{id}", delete(handlers::delete_goal))
        .route(
            "/api/recurring-events",
            get(handlers::list_recurring_events).post(handlers::create_recurring_event),
        )
        .route(
            "/api/recurring-events/validate",
            post(handlers::validate_recurring_pattern),
        )
        .route(
            "/api/recurring-events/{id}",
            delete(handlers::delete_recurring_event),
        )
        .route(
            "/api/recurring-events/{id}/instances",
            get(handlers::recurring_event_instances),
        )
        .route("/api/calendar", get(handlers::calendar))
        .route("/api/sync", post(handlers::sync_actions))
        .layer(TraceLayer::new_for_http())
        // Adds the database pool to the application state
        .with_state(pool)
}
