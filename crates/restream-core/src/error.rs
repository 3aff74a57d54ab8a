//! Error types for restream-core.

use thiserror::Error;

/// Result type for restream-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while supervising relay jobs.
#[derive(Debug, Error)]
pub enum Error {
    /// Start request failed validation. Nothing was spawned.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A job is already registered under this key.
    #[error("job already running: {0}")]
    AlreadyExists(String),

    /// No job is registered under this key.
    #[error("job not found: {0}")]
    NotFound(String),

    /// The pipeline could not be launched.
    #[error("failed to spawn pipeline: {message}")]
    Spawn { message: String },

    /// A signal could not be delivered to a process group.
    #[error("failed to signal process group {pgid} with {signal}: {source}")]
    Signal {
        pgid: i32,
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_error_keeps_source() {
        use std::error::Error as _;

        let err = Error::Signal {
            pgid: 42,
            signal: "SIGTERM",
            source: std::io::Error::from_raw_os_error(libc::ESRCH),
        };
        assert!(err.to_string().starts_with("failed to signal process group 42 with SIGTERM"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_display() {
        let err = Error::AlreadyExists("srcA".into());
        assert_eq!(err.to_string(), "job already running: srcA");
    }
}
