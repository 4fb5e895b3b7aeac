//! Error types for the encounter director.
//!
//! Runtime faults inside a tick (stale unit handles, empty spawn pools, a
//! missing objective) are recovered where they happen and only logged. The
//! variants here cover the few paths that genuinely fail: loading and
//! validating configuration, encoding snapshots, and the invariant check that
//! forces a stage-session reset.

use thiserror::Error;

/// Result type alias using [`DirectorError`].
pub type Result<T> = std::result::Result<T, DirectorError>;

/// Top-level error type for the director.
#[derive(Debug, Error)]
pub enum DirectorError {
    /// Failed to read a configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        /// Path to the file that failed to read.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a RON configuration document.
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    /// Configuration parsed but failed validation.
    #[error("Invalid config ({} issue(s)): {}", .0.len(), .0.join("; "))]
    InvalidConfig(Vec<String>),

    /// Snapshot could not be encoded or decoded.
    #[error("Snapshot codec error: {0}")]
    SnapshotCodec(String),

    /// Stage session state broke one of its structural invariants.
    #[error("Stage session invariant violated: {0}")]
    InvariantViolation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_lists_issues() {
        let err = DirectorError::InvalidConfig(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Invalid config (2 issue(s)): a; b");
    }
}
