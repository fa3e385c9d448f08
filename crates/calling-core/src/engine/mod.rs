//! Calling engine boundary
//!
//! The native calling engine is an opaque dependency. This module describes
//! the slice of it the session manager relies on as a set of traits, so any
//! binding (or the in-process [`LoopbackEngine`]) can be plugged in.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  create_client   ┌────────────┐  create_agent   ┌───────────┐
//! │  CallingEngine   │ ───────────────> │ CallClient │ ──────────────> │ CallAgent │
//! └──────────────────┘                  └────────────┘                 └───────────┘
//!          │ report_incoming_call                                          │ delegate
//!          v                                                               v
//!     OS call UI                                                  CallAgentDelegate
//! ```
//!
//! Only the calls that cross into the engine are `async`; constructing a
//! client is pure and cannot fail.

pub mod loopback;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::callkit::EngineCallKitOptions;
use crate::credential::CredentialProvider;
use crate::error::EngineResult;
use crate::push::PushNotificationInfo;

pub use loopback::{EngineCallCounts, LoopbackEngine};

/// Diagnostic options attached to the client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticsOptions {
    /// Tags appended to engine telemetry
    pub tags: Vec<String>,
}

/// Options for constructing a [`CallClient`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallClientOptions {
    /// Diagnostic options
    pub diagnostics: DiagnosticsOptions,
}

/// Options for creating a [`CallAgent`]
#[derive(Debug, Clone, Default)]
pub struct CallAgentOptions {
    /// Name other participants see
    pub display_name: Option<String>,
    /// Stop the engine from listening for incoming calls on its own channel
    pub disable_internal_push_for_incoming_call: bool,
    /// OS call UI integration
    pub call_kit: Option<EngineCallKitOptions>,
}

/// Call the engine announces through the agent delegate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCallInfo {
    /// Engine call identifier
    pub call_id: String,
    /// Caller identifier
    pub caller_id: String,
    /// Caller display name
    pub caller_display_name: Option<String>,
    /// Whether the caller offers video
    pub is_video: bool,
}

/// Engine-to-application notifications for one agent
#[async_trait]
pub trait CallAgentDelegate: Send + Sync {
    /// A call is ringing
    async fn on_incoming_call(&self, call: IncomingCallInfo);

    /// The set of active calls changed
    async fn on_calls_updated(&self, added: Vec<String>, removed: Vec<String>);
}

/// Authenticated calling identity
#[async_trait]
pub trait CallAgent: Send + Sync + fmt::Debug {
    /// Register the device push token
    async fn register_push_notifications(&self, device_token: &[u8]) -> EngineResult<()>;

    /// Remove the push registration
    async fn unregister_push_notifications(&self) -> EngineResult<()>;

    /// Hand an incoming push to the agent
    async fn handle_push(&self, notification: &PushNotificationInfo) -> EngineResult<()>;

    /// Install or detach the delegate
    fn set_delegate(&self, delegate: Option<Arc<dyn CallAgentDelegate>>);

    /// Release engine resources; further calls are undefined
    fn dispose(&self);
}

/// Top-level factory object of the engine
#[async_trait]
pub trait CallClient: Send + Sync + fmt::Debug {
    /// Create an authenticated agent
    async fn create_agent(
        &self,
        credential: Arc<dyn CredentialProvider>,
        options: CallAgentOptions,
    ) -> EngineResult<Arc<dyn CallAgent>>;
}

/// Entry point into the calling engine
#[async_trait]
pub trait CallingEngine: Send + Sync {
    /// Construct a client; pure, no I/O
    fn create_client(&self, options: CallClientOptions) -> Arc<dyn CallClient>;

    /// Ask the OS call UI to show an incoming call
    async fn report_incoming_call(
        &self,
        notification: &PushNotificationInfo,
        options: &EngineCallKitOptions,
    ) -> EngineResult<()>;
}
