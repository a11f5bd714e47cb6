use std::time::Duration;

use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error types for the tree mirror and its remote collaborators.
#[derive(Debug, Error)]
pub enum AppError {
    /// A navigation, move or delete target does not exist in the local tree.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend refused a call.
    #[error("Remote rejected: {0}")]
    RemoteRejected(String),

    /// A gesture that has no meaning (drop onto a file, paste with nothing cut).
    #[error("Invalid gesture: {0}")]
    InvalidGesture(String),

    /// The destination folder already holds a child with the same name.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A remote call did not settle in time.
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid key or path provided by the user.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A shell line that does not parse.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Configuration could not be resolved.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O errors from the directory-backed remote.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed listing payloads.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Errors the session swallows instead of notifying the user.
    pub fn is_silent(&self) -> bool {
        matches!(self, AppError::InvalidGesture(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
        assert!(app_err.to_string().contains("file not found"));
    }

    #[test]
    fn not_found_display() {
        let err = AppError::NotFound("reports/q1.pdf".into());
        assert_eq!(err.to_string(), "Not found: reports/q1.pdf");
    }

    #[test]
    fn timeout_display() {
        let err = AppError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Remote call timed out after 1.5s");
    }

    #[test]
    fn only_invalid_gesture_is_silent() {
        assert!(AppError::InvalidGesture("drop on file".into()).is_silent());
        assert!(!AppError::NotFound("x".into()).is_silent());
        assert!(!AppError::RemoteRejected("500".into()).is_silent());
        assert!(!AppError::Conflict("a.txt".into()).is_silent());
    }
}
