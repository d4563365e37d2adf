//! HTTP implementation of the remote task protocol.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::{ApiEnvelope, ClientError, RemoteTask, TaskClient, TaskFields, TaskPatch};
use crate::config::Config;

/// Reqwest-backed client for the task store's HTTP API.
pub struct HttpTaskClient {
    client: Client,
    base_url: String,
}

impl HttpTaskClient {
    /// Create a client against the given base URL.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a client from crate configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.base_url)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check a response status, classifying failures per the error
    /// taxonomy. `id` is the task id for id-keyed operations, so a 404 can
    /// classify as `NotFound`.
    fn check_status(status: StatusCode, id: Option<i64>) -> Result<(), ClientError> {
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(ClientError::NotFound(id));
            }
        }
        if status.is_server_error() {
            return Err(ClientError::Transport(format!("server answered {}", status)));
        }
        Err(ClientError::Protocol(format!(
            "unexpected status {}",
            status
        )))
    }
}

/// Map a reqwest failure: decode problems are protocol violations,
/// everything else (connect, timeout, body read) is transport.
fn request_error(err: reqwest::Error) -> ClientError {
    if err.is_decode() {
        ClientError::Protocol(err.to_string())
    } else {
        ClientError::Transport(err.to_string())
    }
}

#[async_trait]
impl TaskClient for HttpTaskClient {
    async fn list_all(&self) -> Result<Vec<RemoteTask>, ClientError> {
        let resp = self
            .client
            .get(self.endpoint("/all"))
            .send()
            .await
            .map_err(request_error)?;

        Self::check_status(resp.status(), None)?;

        let envelope: ApiEnvelope<Vec<RemoteTask>> =
            resp.json().await.map_err(request_error)?;
        Ok(envelope.content)
    }

    async fn create(&self, fields: &TaskFields) -> Result<i64, ClientError> {
        let resp = self
            .client
            .post(self.endpoint("/new"))
            .json(fields)
            .send()
            .await
            .map_err(request_error)?;

        Self::check_status(resp.status(), None)?;

        let envelope: ApiEnvelope<i64> = resp.json().await.map_err(request_error)?;
        tracing::debug!(id = envelope.content, "remote create acknowledged");
        Ok(envelope.content)
    }

    async fn update(&self, id: i64, patch: &TaskPatch) -> Result<(), ClientError> {
        let resp = self
            .client
            .post(format!("{}?task_id={}", self.endpoint("/update"), id))
            .json(patch)
            .send()
            .await
            .map_err(request_error)?;

        Self::check_status(resp.status(), Some(id))
    }

    async fn delete(&self, id: i64) -> Result<(), ClientError> {
        let resp = self
            .client
            .delete(format!("{}?task_id={}", self.endpoint("/delete"), id))
            .send()
            .await
            .map_err(request_error)?;

        Self::check_status(resp.status(), Some(id))
    }

    async fn start(&self, id: i64) -> Result<(), ClientError> {
        let resp = self
            .client
            .post(format!("{}?task_id={}", self.endpoint("/start"), id))
            .send()
            .await
            .map_err(request_error)?;

        Self::check_status(resp.status(), Some(id))
    }
}
