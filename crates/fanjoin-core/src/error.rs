//! Error types for fanjoin-core.
//!
//! Visitor failures and join failures are kept apart: a failed section
//! surfaces as [`Error::TasksFailed`], a broken join wait as
//! [`Error::CombineFailed`].

use thiserror::Error;

use crate::section::Section;

/// Boxed error as recorded from a worker thread.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for fanjoin-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fanjoin-core
#[derive(Debug, Error)]
pub enum Error {
    /// At least one worker task failed; carries the first recorded failure.
    #[error("One or more parallel tasks failed")]
    TasksFailed {
        /// Section whose visitor failed first
        section: Section,
        /// The error raised while visiting that section
        #[source]
        source: BoxError,
    },

    /// The orchestrating thread could not finish waiting for the workers.
    #[error("Combine failed: {reason}")]
    CombineFailed {
        /// What broke the wait
        reason: String,
    },

    /// A runner needs at least one task
    #[error("task count must be at least 1, got {0}")]
    InvalidTaskCount(usize),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description
        message: String,
        /// The offending key (e.g. "taskCount")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a [`Error::Config`] tied to one key.
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// A visitor panicked while processing its section.
#[derive(Debug, Error)]
#[error("visitor panicked: {message}")]
pub struct TaskPanicked {
    pub message: String,
}

impl TaskPanicked {
    /// Extract a readable message from a `catch_unwind` payload.
    pub fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

/// The execution service dropped a task without running it.
#[derive(Debug, Error)]
#[error("task was dropped before it ran")]
pub struct TaskAbandoned;
