//! Error types for the zcnotify system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for zcnotify operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the zcnotify system
#[derive(Error, Debug)]
pub enum Error {
    /// Discovery (browse) errors
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Notification sink errors
    #[error("Notification error ({notifier}): {message}")]
    Notify {
        /// Notifier name
        notifier: String,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Event handoff between scheduler and dispatcher failed
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// I/O errors (config files, sockets)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a discovery error
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create a notifier-specific error
    pub fn notify(notifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Notify {
            notifier: notifier.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a dispatch error
    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }

    /// Whether this error should stop the daemon with a configuration exit code
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_error_display() {
        let err = Error::notify("email", "connection refused");
        assert_eq!(
            err.to_string(),
            "Notification error (email): connection refused"
        );
    }

    #[test]
    fn test_config_classification() {
        assert!(Error::config("bad").is_config());
        assert!(!Error::discovery("timeout").is_config());
    }
}
