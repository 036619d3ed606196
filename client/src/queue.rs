// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::fmt::Display;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use common::{PendingAction, SyncReport, TaskAction, actions};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::TaskApi;

/// On-disk form of the queue.
#[derive(Serialize, Deserialize)]
struct QueueFile {
    next_seq: u64,
    actions: Vec<PendingAction>,
}

/// Mutations made while the server was unreachable, kept in a JSON file
/// until the next sync.
pub struct OfflineQueue {
    path: PathBuf,
    state: QueueFile,
}

impl OfflineQueue {
    /// Loads the queue stored at `path`. A missing file is an empty queue.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let data = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read offline queue {}", path.display()))?;
            serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse offline queue {}", path.display()))?
        } else {
            debug!("No offline queue at {}, starting empty.", path.display());
            QueueFile {
                next_seq: 1,
                actions: Vec::new(),
            }
        };
        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory {}", parent.display())
                })?;
            }
        }
        let json = serde_json::to_string_pretty(&self.state)
            .context("Failed to serialize offline queue")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write offline queue {}", self.path.display()))
    }

    /// Appends an action at the back of the queue and returns its sequence number.
    pub fn enqueue(&mut self, action: TaskAction) -> u64 {
        let seq = self.state.next_seq.max(1);
        self.state.next_seq = seq + 1;
        info!("Queued offline {} action #{}", action.name(), seq);
        self.state.actions.push(PendingAction {
            seq,
            queued_at: Utc::now(),
            action,
        });
        seq
    }

    pub fn pending(&self) -> &[PendingAction] {
        &self.state.actions
    }

    pub fn len(&self) -> usize {
        self.state.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.actions.is_empty()
    }

    /// Replays every queued action through `execute`, in insertion order.
    /// Failed actions stay queued for the next sync; the queue is saved
    /// afterwards.
    pub async fn replay_with<F, Fut, E>(&mut self, execute: F) -> Result<SyncReport>
    where
        F: FnMut(TaskAction) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let queued = std::mem::take(&mut self.state.actions);
        let (report, remaining) = actions::replay(queued, execute).await;
        for failed in &report.failed {
            warn!("Action #{} ({}) failed: {}", failed.seq, failed.action, failed.error);
        }
        self.state.actions = remaining;
        self.save()?;
        Ok(report)
    }

    /// Replays the queue against the server, one request per action.
    pub async fn sync(&mut self, api: &TaskApi) -> Result<SyncReport> {
        self.replay_with(move |action| async move { api.apply(action).await })
            .await
    }

    /// Sends the whole queue to the server's replay endpoint in one request.
    /// Actions the server reports as failed stay queued; an unreachable
    /// server leaves the queue as it was.
    pub async fn sync_batch(&mut self, api: &TaskApi) -> Result<SyncReport> {
        let report = api.sync_batch(&self.state.actions).await?;
        self.settle(&report);
        self.save()?;
        Ok(report)
    }

    /// Keeps only the actions `report` lists as failed.
    fn settle(&mut self, report: &SyncReport) {
        self.state
            .actions
            .retain(|pending| report.failed.iter().any(|failed| failed.seq == pending.seq));
    }
}
