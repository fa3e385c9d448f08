//! Error types for the calling session layer
//!
//! Two error families live here:
//!
//! - [`EngineError`] is what the calling engine reports back across the
//!   boundary. It is opaque to this crate and never reinterpreted.
//! - [`SessionError`] is what the session manager surfaces to callers. The
//!   engine-facing variants wrap the engine error unchanged so callers can
//!   still inspect the original code and message.
//!
//! Agent creation is single-flight: every caller waiting on one creation
//! attempt receives the same outcome, so the wrapped engine error is held in
//! an [`Arc`] and `SessionError` stays `Clone`.

use std::sync::Arc;
use thiserror::Error;

/// Result type for session manager operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type for calls across the engine boundary
pub type EngineResult<T> = Result<T, EngineError>;

/// Failure reported by the calling engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("engine error {code}: {message}")]
pub struct EngineError {
    /// Engine-specific error code
    pub code: i32,
    /// Human-readable description from the engine
    pub message: String,
}

impl EngineError {
    /// Create a new engine error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Credential was rejected by the service
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, message)
    }

    /// Network was unavailable for the operation
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(503, message)
    }
}

/// Errors surfaced by the session manager
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The engine rejected agent creation (invalid credential, no network)
    #[error("failed to create call agent: {source}")]
    SessionCreationFailed {
        /// Underlying engine failure
        #[source]
        source: Arc<EngineError>,
    },

    /// Registering or unregistering the push token failed
    #[error("push registration failed: {source}")]
    PushRegistrationFailed {
        /// Underlying failure, usually agent creation or engine rejection
        #[source]
        source: Arc<SessionError>,
    },

    /// Handing a push payload to the agent failed
    #[error("push handling failed: {source}")]
    PushHandlingFailed {
        /// Underlying failure, usually agent creation or engine rejection
        #[source]
        source: Arc<SessionError>,
    },

    /// Reporting an incoming call to the OS call UI failed
    #[error("incoming call report failed: {source}")]
    IncomingCallReportFailed {
        /// Underlying engine failure
        #[source]
        source: Arc<EngineError>,
    },

    /// A push payload could not be parsed into an incoming-call descriptor
    #[error("invalid push payload: {reason}")]
    InvalidPushPayload {
        /// What was wrong with the payload
        reason: String,
    },

    /// The credential provider failed to supply a token
    #[error("credential error: {message}")]
    Credential {
        /// Provider-supplied description
        message: String,
    },

    /// The manager has been disposed and must be rebuilt
    #[error("session manager has been disposed")]
    Disposed,

    /// Direct engine failure outside agent creation
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Internal error
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure
        message: String,
    },
}

impl SessionError {
    /// Wrap an engine failure from agent creation
    pub fn creation_failed(source: EngineError) -> Self {
        Self::SessionCreationFailed {
            source: Arc::new(source),
        }
    }

    /// Wrap a failure from push registration
    pub fn registration_failed(source: SessionError) -> Self {
        Self::PushRegistrationFailed {
            source: Arc::new(source),
        }
    }

    /// Wrap a failure from push hand-off
    pub fn handling_failed(source: SessionError) -> Self {
        Self::PushHandlingFailed {
            source: Arc::new(source),
        }
    }

    /// Wrap a failure from an incoming call report
    pub fn report_failed(source: EngineError) -> Self {
        Self::IncomingCallReportFailed {
            source: Arc::new(source),
        }
    }

    /// Create an invalid push payload error
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPushPayload {
            reason: reason.into(),
        }
    }

    /// Create a credential error
    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The engine error at the root of this failure, if any
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Self::SessionCreationFailed { source } | Self::IncomingCallReportFailed { source } => {
                Some(source.as_ref())
            }
            Self::PushRegistrationFailed { source } | Self::PushHandlingFailed { source } => {
                source.engine_error()
            }
            Self::Engine(e) => Some(e),
            _ => None,
        }
    }

    /// Whether retrying the same operation later could succeed
    ///
    /// The manager never retries on its own; this is a hint for callers.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Disposed | Self::InvalidPushPayload { .. } => false,
            Self::PushRegistrationFailed { source } | Self::PushHandlingFailed { source } => {
                source.is_recoverable()
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_is_preserved_through_wrapping() {
        let engine = EngineError::unauthorized("token expired");
        let err = SessionError::registration_failed(SessionError::creation_failed(engine.clone()));

        assert_eq!(err.engine_error(), Some(&engine));
        assert!(err.to_string().contains("push registration failed"));
        assert!(err.to_string().contains("token expired"));
    }

    #[test]
    fn test_recoverability() {
        assert!(!SessionError::Disposed.is_recoverable());
        assert!(!SessionError::invalid_payload("no callId").is_recoverable());
        assert!(SessionError::creation_failed(EngineError::network("offline")).is_recoverable());
        assert!(!SessionError::handling_failed(SessionError::Disposed).is_recoverable());
    }
}
