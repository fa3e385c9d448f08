//! Credential provider seam
//!
//! The engine authenticates the call agent with a token credential. Token
//! acquisition and refresh belong to the host application, so the session
//! manager only holds an `Arc<dyn CredentialProvider>` and hands it to the
//! engine at agent creation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::error::{SessionError, SessionResult};

/// Access token with optional expiry
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Opaque token value
    pub token: String,
    /// When the token stops being valid, if known
    pub expires_on: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Whether the token is expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on.is_some_and(|expiry| expiry <= now)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Supplies (and refreshes) the token the engine authenticates with
#[async_trait]
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    /// Current valid token
    async fn token(&self) -> SessionResult<AccessToken>;
}

/// Credential that always returns the same token
#[derive(Debug, Clone)]
pub struct StaticTokenCredential {
    token: AccessToken,
}

impl StaticTokenCredential {
    /// Wrap a token that never expires
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken {
                token: token.into(),
                expires_on: None,
            },
        }
    }

    /// Wrap a token with a known expiry
    pub fn with_expiry(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: AccessToken {
                token: token.into(),
                expires_on: Some(expires_on),
            },
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenCredential {
    async fn token(&self) -> SessionResult<AccessToken> {
        if self.token.is_expired_at(Utc::now()) {
            return Err(SessionError::credential("static token has expired"));
        }
        Ok(self.token.clone())
    }
}
