//! ScriptGen - a command-line client for a hosted video transcription service
//!
//! This library validates video links, drives a remote transcription job from
//! submission to completion by polling its status, and retrieves or exports the
//! finished transcript ("script").

pub mod api;
pub mod cli;
pub mod config;
pub mod output;
pub mod utils;
pub mod validator;
pub mod workflow;

pub use api::{ApiClient, ApiError, Artifact, AuthContext, ExportFormat, JobHandle, JobService, PollResult};
pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use workflow::{GenerationController, Notice, PollPolicy, Snapshot, WorkflowState};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Ways a generation attempt can go wrong
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Please enter a valid YouTube URL: {0:?}")]
    InvalidUrl(String),

    #[error("A generation is already {0}; reset before starting another")]
    Busy(WorkflowState),

    #[error("{0}")]
    Submission(String),

    #[error("Status check failed: {0}")]
    Transport(String),

    #[error("Failed to fetch script: {0}")]
    Fetch(String),

    #[error("Script generation completed but ID is missing")]
    MissingScriptId,

    #[error("{0}")]
    JobFailed(String),

    #[error("Gave up waiting for the transcription after {polls} status checks")]
    TimedOut { polls: u32 },

    #[error("Session expired. Please log in again")]
    SessionExpired,

    #[error("The generation was reset before the job started")]
    Cancelled,
}
