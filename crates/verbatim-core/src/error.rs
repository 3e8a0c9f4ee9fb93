//! Error types for the classification pipeline.
//!
//! Input errors are reported synchronously when a job is submitted. Gateway
//! errors never escape a batch: the repair layer turns them into fallback
//! classifications. Store errors are the only thing that can fail a job
//! once it is running.

use thiserror::Error;

/// Structurally invalid job input. The job never starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("verbatim column '{0}' not found in table")]
    MissingColumn(String),

    #[error("category set is empty")]
    NoCategories,

    #[error("duplicate category title: {0}")]
    DuplicateCategory(String),

    #[error("row index {0} appears more than once")]
    DuplicateRowIndex(usize),

    #[error("classification already in progress for job {0}")]
    AlreadyRunning(String),
}

/// Failure of a single external classifier or embedding call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited by classifier service")]
    RateLimited,

    #[error("classifier service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed classifier response: {0}")]
    Malformed(String),

    #[error("classifier returned {got} labels for {expected} comments")]
    LengthMismatch { expected: usize, got: usize },

    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Whether retrying the same call might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Transport(_) | GatewayError::RateLimited => true,
            GatewayError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Malformed(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Key-value store failure.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the job coordinator.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("job {job} has no result yet (status: {status})")]
    NotCompleted { job: String, status: String },

    #[error("result for job {0} not found")]
    ResultNotFound(String),
}
