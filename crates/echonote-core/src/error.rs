//! Error types for echonote.

use thiserror::Error;

/// Result type alias using echonote's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for echonote operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Note not found
    #[error("Note not found: {0}")]
    NoteNotFound(uuid::Uuid),

    /// Transcription service failed
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Analysis service failed
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Audio storage access failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Media payload could not be handled
    #[error("Media error: {0}")]
    Media(String),

    /// Circuit breaker is open; no call was attempted
    #[error("Service unavailable: circuit open, retry after {retry_after_secs}s")]
    CircuitOpen {
        /// Seconds remaining until the breaker allows a trial call.
        retry_after_secs: u64,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Operation exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_note_not_found() {
        let id = Uuid::nil();
        let err = Error::NoteNotFound(id);
        assert_eq!(err.to_string(), format!("Note not found: {}", id));
    }

    #[test]
    fn test_error_display_transcription() {
        let err = Error::Transcription("whisper returned 500".to_string());
        assert_eq!(err.to_string(), "Transcription error: whisper returned 500");
    }

    #[test]
    fn test_error_display_analysis() {
        let err = Error::Analysis("model refused".to_string());
        assert_eq!(err.to_string(), "Analysis error: model refused");
    }

    #[test]
    fn test_error_display_circuit_open() {
        let err = Error::CircuitOpen {
            retry_after_secs: 17,
        };
        assert_eq!(
            err.to_string(),
            "Service unavailable: circuit open, retry after 17s"
        );
    }

    #[test]
    fn test_error_display_timeout() {
        let err = Error::Timeout("deadline elapsed".to_string());
        assert_eq!(err.to_string(), "Timeout: deadline elapsed");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_result_type_ok() {
        fn get_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(get_result().unwrap(), 42);
    }
}
