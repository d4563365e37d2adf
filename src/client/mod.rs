//! Remote task client - typed mapping onto the store's request/response
//! protocol.
//!
//! This layer carries no business logic. Its only value-add over the raw
//! transport is failure classification: every operation resolves to success
//! or exactly one of the [`ClientError`] variants. No retries, no batching,
//! no caching - create in particular must not be retried here because the
//! remote store does not guarantee idempotency.

mod http;

pub use http::HttpTaskClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{derive_status, Task, TaskId, TaskStatus};

/// Classified failure raised by every client operation.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Network unreachable, request timed out, or the server answered 5xx.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The response arrived but did not have the expected shape or status.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// The referenced id is unknown to the remote store.
    #[error("task {0} not found remotely")]
    NotFound(i64),
}

/// Full wire representation of a task accepted by `POST /new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFields {
    pub description: String,
    pub status: TaskStatus,
    pub progress: f64,
}

/// Partial update body for `POST /update`. Absent fields are left untouched
/// remotely.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

impl TaskPatch {
    /// Patch carrying only a new description.
    pub fn description(text: impl Into<String>) -> Self {
        Self {
            description: Some(text.into()),
            ..Self::default()
        }
    }

    /// Patch carrying a new progress fraction together with the status
    /// derived from it. The two always travel as a pair.
    pub fn progress(fraction: f64) -> Self {
        Self {
            status: Some(derive_status(fraction)),
            progress: Some(fraction),
            ..Self::default()
        }
    }
}

/// A task row as the remote store returns it from `GET /all`.
///
/// Unknown fields (the server attaches planning metadata this layer does
/// not model) are ignored on decode.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTask {
    pub id: i64,
    pub description: String,
    pub status: TaskStatus,
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RemoteTask> for Task {
    fn from(remote: RemoteTask) -> Self {
        // Progress is authoritative; a row whose stored status disagrees
        // with its progress is a remote defect, corrected on decode.
        Task {
            id: TaskId::Remote(remote.id),
            description: remote.description,
            status: derive_status(remote.progress),
            progress: remote.progress,
            created_at: remote.created_at,
            updated_at: remote.updated_at,
        }
    }
}

/// The `{status_code, content}` wrapper every endpoint responds with.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub status_code: u16,
    pub content: T,
}

/// Async contract with the remote task store.
#[async_trait]
pub trait TaskClient: Send + Sync {
    /// Fetch the full current remote state.
    async fn list_all(&self) -> Result<Vec<RemoteTask>, ClientError>;

    /// Create a task remotely and return its canonical id.
    async fn create(&self, fields: &TaskFields) -> Result<i64, ClientError>;

    /// Partially update a task by canonical id.
    async fn update(&self, id: i64, patch: &TaskPatch) -> Result<(), ClientError>;

    /// Delete a task by canonical id.
    async fn delete(&self, id: i64) -> Result<(), ClientError>;

    /// Transition a task out of `NEW`. Convenience over a plain status
    /// patch; implementations with a dedicated endpoint may override.
    async fn start(&self, id: i64) -> Result<(), ClientError> {
        let patch = TaskPatch {
            status: Some(TaskStatus::Started),
            ..TaskPatch::default()
        };
        self.update(id, &patch).await
    }
}
