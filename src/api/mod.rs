//! Binding to the remote transcription service.
//!
//! The workflow only depends on the [`JobService`] trait; [`ApiClient`] is the
//! HTTP implementation used by the binary.

use async_trait::async_trait;

pub mod auth;
pub mod client;
pub mod models;

pub use auth::AuthContext;
pub use client::ApiClient;
pub use models::{
    Artifact, Download, ExportFormat, GenerationRequest, JobHandle, PollResult, PollUpdate,
    ScriptPage, ScriptQuery, ScriptStatus,
};

/// Errors raised by calls to the remote service
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// HTTP 401; `detail` is the service's explanation, if any
    #[error("{}", unauthorized_message(.detail))]
    Unauthorized { detail: Option<String> },

    #[error("Service returned HTTP {status}{}", detail_suffix(.detail))]
    Status { status: u16, detail: Option<String> },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Protocol(String),
}

fn unauthorized_message(detail: &Option<String>) -> String {
    detail
        .clone()
        .unwrap_or_else(|| "Not authenticated; please log in again".to_string())
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

impl ApiError {
    /// Message meant for the end user, when the service supplied one
    pub fn user_message(&self) -> Option<String> {
        match self {
            ApiError::Status { detail, .. } => detail.clone(),
            ApiError::Unauthorized { .. } => Some(self.to_string()),
            _ => None,
        }
    }
}

/// Operations the generation workflow needs from the service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobService: Send + Sync {
    /// Start a transcription job for a video
    async fn submit(&self, request: &GenerationRequest) -> Result<JobHandle, ApiError>;

    /// Check the progress of a running job
    async fn poll_status(&self, task_id: &str) -> Result<PollResult, ApiError>;

    /// Fetch the finished script record
    async fn fetch_artifact(&self, script_id: &str) -> Result<Artifact, ApiError>;
}
