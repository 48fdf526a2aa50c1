use thiserror::Error;

use crate::trip::TripState;

/// Driving monitor error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error("Cannot {operation} trip from state {from:?}")]
    InvalidTransition {
        operation: &'static str,
        from: TripState,
    },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Decode error for key {key}: {reason}")]
    DecodeError { key: &'static str, reason: String },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Monitor shut down")]
    ShutDown,
}

impl MonitorError {
    /// True for errors that leave the monitor untouched (rejected API calls).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            MonitorError::InvalidTransition { .. } | MonitorError::InvalidParameters(_)
        )
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        MonitorError::StorageError(err.to_string())
    }
}

/// Result type for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;
