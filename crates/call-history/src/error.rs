//! Error types for call history storage

use thiserror::Error;

/// Result type for call history operations
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Errors from the history repository and its stores
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Records could not be encoded or a store file could not be decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store could not be read or written
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored blob was not valid base64
    #[error("corrupt stored value for key '{key}'")]
    CorruptValue {
        /// Key whose value failed to decode
        key: String,
    },

    /// A call id was rejected before storing
    #[error("invalid call id: {reason}")]
    InvalidCallId {
        /// Why the id was rejected
        reason: String,
    },
}

impl HistoryError {
    /// Create an invalid call id error
    pub fn invalid_call_id(reason: impl Into<String>) -> Self {
        Self::InvalidCallId {
            reason: reason.into(),
        }
    }
}
