//! Error types for the headless runner.

use thiserror::Error;

use director_core::error::DirectorError;

/// Result type alias using [`HeadlessError`].
pub type Result<T> = std::result::Result<T, HeadlessError>;

/// Errors surfaced by the runner and its CLI.
#[derive(Debug, Error)]
pub enum HeadlessError {
    /// Director construction or configuration failed.
    #[error(transparent)]
    Director(#[from] DirectorError),

    /// Reading or writing results failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Result (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The run description makes no sense.
    #[error("Invalid run config: {0}")]
    InvalidRun(String),
}
