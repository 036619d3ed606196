// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.

//! HTTP client for the task server's `/api` endpoints.
//!
//! Every method maps to one endpoint. Server-side failures come back as
//! [`ApiError::Api`] carrying the server's message verbatim.

use chrono::NaiveDate;
use common::{
    CalendarView, CreateTaskPayload, PendingAction, SyncReport, Task, TaskAction, TaskStats,
    UpdateTaskPayload,
};
use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("{message} (status {status})")]
    Api { status: u16, message: String },
}

impl ApiError {
    /// True when the server could not be reached at all, as opposed to
    /// the server rejecting the request.
    pub fn is_offline(&self) -> bool {
        match self {
            ApiError::Request(err) => err.is_connect() || err.is_timeout(),
            ApiError::Api { .. } => false,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub struct TaskApi {
    client: reqwest::Client,
    base_url: String,
}

impl TaskApi {
    /// * `base_url` - server root, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    pub async fn list_tasks(&self, category: Option<&str>) -> ApiResult<Vec<Task>> {
        let mut request = self.client.get(self.url("/tasks"));
        if let Some(category) = category {
            request = request.query(&[("category", category)]);
        }
        Self::parse_response(request.send().await?).await
    }

    pub async fn create_task(&self, payload: &CreateTaskPayload) -> ApiResult<Task> {
        let response = self
            .client
            .post(self.url("/tasks"))
            .json(payload)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    pub async fn update_task(&self, id: i64, payload: &UpdateTaskPayload) -> ApiResult<Task> {
        let response = self
            .client
            .put(self.url(&format!("/tasks/{id}")))
            .json(payload)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    pub async fn delete_task(&self, id: i64) -> ApiResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("/tasks/{id}")))
            .send()
            .await?;
        Self::check_status(response).await
    }

    pub async fn toggle_task(&self, id: i64) -> ApiResult<Task> {
        let response = self
            .client
            .patch(self.url(&format!("/tasks/{id}/toggle")))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    pub async fn stats(&self) -> ApiResult<TaskStats> {
        Self::parse_response(self.client.get(self.url("/tasks/stats")).send().await?).await
    }

    pub async fn calendar(&self, start: NaiveDate, end: NaiveDate) -> ApiResult<CalendarView> {
        let response = self
            .client
            .get(self.url("/calendar"))
            .query(&[("start", start.to_string()), ("end", end.to_string())])
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Sends a whole batch to the server's replay endpoint.
    pub async fn sync_batch(&self, actions: &[PendingAction]) -> ApiResult<SyncReport> {
        let response = self
            .client
            .post(self.url("/sync"))
            .json(actions)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Performs a queued mutation through the matching endpoint.
    pub async fn apply(&self, action: TaskAction) -> ApiResult<()> {
        match action {
            TaskAction::Create { payload } => self.create_task(&payload).await.map(drop),
            TaskAction::Update { id, payload } => self.update_task(id, &payload).await.map(drop),
            TaskAction::Delete { id } => self.delete_task(id).await,
            TaskAction::Toggle { id } => self.toggle_task(id).await.map(drop),
        }
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::api_error(status, response).await);
        }
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> ApiResult<()> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::api_error(status, response).await);
        }
        Ok(())
    }

    /// Extracts the `{"error": ...}` message, falling back to the raw body.
    async fn api_error(status: reqwest::StatusCode, response: reqwest::Response) -> ApiError {
        let body = response.text().await.unwrap_or_default();
        ApiError::Api {
            status: status.as_u16(),
            message: error_message(&body),
        }
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("error")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_error_field() {
        assert_eq!(
            error_message(r#"{"error":"Task title cannot be empty."}"#),
            "Task title cannot be empty."
        );
        assert_eq!(error_message("Bad Gateway\n"), "Bad Gateway");
    }

    #[test]
    fn test_url_building() {
        let api = TaskApi::new("http://localhost:3000/");
        assert_eq!(api.url("/tasks/3/toggle"), "http://localhost:3000/api/tasks/3/toggle");
    }

    #[test]
    fn test_server_rejections_are_not_offline() {
        let err = ApiError::Api {
            status: 404,
            message: "Task with ID 1 not found.".into(),
        };
        assert!(!err.is_offline());
        assert_eq!(err.to_string(), "Task with ID 1 not found. (status 404)");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_offline() {
        // Port 9 (discard) is not expected to accept connections locally.
        let api = TaskApi::new("http://127.0.0.1:9");
        let err = api.list_tasks(None).await.unwrap_err();
        assert!(err.is_offline());
    }
}
