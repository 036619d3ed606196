// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.

//! Task mutations recorded while offline and replayed later.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CreateTaskPayload, UpdateTaskPayload};

/// A task mutation, as it would have been sent to the API.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskAction {
    Create { payload: CreateTaskPayload },
    Update { id: i64, payload: UpdateTaskPayload },
    Delete { id: i64 },
    Toggle { id: i64 },
}

impl TaskAction {
    pub fn name(&self) -> &'static str {
        match self {
            TaskAction::Create { .. } => "create",
            TaskAction::Update { .. } => "update",
            TaskAction::Delete { .. } => "delete",
            TaskAction::Toggle { .. } => "toggle",
        }
    }
}

/// A queued mutation. `seq` follows insertion order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub seq: u64,
    pub queued_at: DateTime<Utc>,
    pub action: TaskAction,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FailedAction {
    pub seq: u64,
    pub action: String,
    pub error: String,
}

/// Result of replaying a batch of pending actions.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: Vec<FailedAction>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Replays `actions` one after the other in the order given, awaiting each
/// before starting the next.
///
/// A failing action is recorded and replay moves on. Returns the report and
/// the actions that failed, still in order, so they can be queued again.
pub async fn replay<F, Fut, E>(
    actions: Vec<PendingAction>,
    mut execute: F,
) -> (SyncReport, Vec<PendingAction>)
where
    F: FnMut(TaskAction) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let mut report = SyncReport::default();
    let mut remaining = Vec::new();

    for pending in actions {
        match execute(pending.action.clone()).await {
            Ok(()) => report.synced += 1,
            Err(err) => {
                report.failed.push(FailedAction {
                    seq: pending.seq,
                    action: pending.action.name().to_string(),
                    error: err.to_string(),
                });
                remaining.push(pending);
            }
        }
    }

    (report, remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(seq: u64, action: TaskAction) -> PendingAction {
        PendingAction {
            seq,
            queued_at: Utc::now(),
            action,
        }
    }

    #[tokio::test]
    async fn test_replay_continues_after_failure() {
        let actions = vec![
            pending(1, TaskAction::Toggle { id: 1 }),
            pending(2, TaskAction::Delete { id: 404 }),
            pending(3, TaskAction::Toggle { id: 3 }),
        ];
        let mut seen = Vec::new();

        let (report, remaining) = replay(actions, |action| {
            seen.push(action.clone());
            async move {
                match action {
                    TaskAction::Delete { id } => Err(format!("Task with ID {id} not found.")),
                    _ => Ok(()),
                }
            }
        })
        .await;

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2], TaskAction::Toggle { id: 3 });
        assert_eq!(report.synced, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].seq, 2);
        assert_eq!(report.failed[0].action, "delete");
        assert_eq!(report.failed[0].error, "Task with ID 404 not found.");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].seq, 2);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_action_wire_format() {
        let json = serde_json::to_value(TaskAction::Update {
            id: 4,
            payload: UpdateTaskPayload {
                completed: Some(true),
                ..Default::default()
            },
        })
        .unwrap();
        assert_eq!(json["type"], "update");
        assert_eq!(json["id"], 4);
        assert_eq!(json["payload"]["completed"], true);
        assert!(json["payload"].get("title").is_none());
    }
}
