//! Error types for leafdoc-core

use thiserror::Error;

/// Message shown to users when a scan fails, whatever the cause.
pub const SCAN_FAILED_MESSAGE: &str =
    "We couldn't analyze that photo. Please try again with a clearer, well-lit picture of the leaf.";

/// Main error type for the leafdoc-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Network failure or non-2xx status from the inference endpoint
    #[error("transport error{}: {message}", status_suffix(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// The envelope carried no candidate text
    #[error("inference response contained no text")]
    EmptyResponse,

    /// The candidate text did not match the expected structure
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// Input could not be encoded into a request
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The conversation store rejected a write
    #[error("store write failed: {0}")]
    StoreWrite(String),

    /// Terminal scan failure; the boxed error is the internal cause
    #[error("analysis failed: {0}")]
    AnalysisFailed(#[source] Box<Error>),

    /// Caller input rejected before any work was done
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A chat send is already in flight on this orchestrator
    #[error("a message is already being sent")]
    Busy,

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl Error {
    /// Whether the error is worth retrying.
    ///
    /// Only transport failures are transient; everything else is a
    /// structural problem that a retry would reproduce.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    /// Text safe to show to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Error::AnalysisFailed(_) => SCAN_FAILED_MESSAGE.to_string(),
            Error::Busy => "Please wait for the current reply.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for leafdoc-core
pub type Result<T> = std::result::Result<T, Error>;
