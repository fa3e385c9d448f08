//! # callcomposite-core
//!
//! Session lifecycle layer of the calling composite. It sits between the
//! application (push delivery, user intents) and an opaque native calling
//! engine, and is the single owner of the engine's two expensive handles.
//!
//! ## Architecture
//!
//! ```text
//! OS push ──┐                         ┌──> CallingEngine::create_client
//!           ├──> SessionManager ──────┼──> CallClient::create_agent   (single-flight)
//! App  ─────┘        │                └──> CallAgent: push register / handle
//!                    │
//!                    └──> EventRegistry ──> SessionEventHandler (weak)
//!                                      └──> broadcast stream
//! ```
//!
//! ## Modules
//!
//! - [`session`] - the session manager and its lifecycle state machine
//! - [`engine`] - calling engine boundary traits and the loopback engine
//! - [`push`] - push payload parsing and the OS completion signal
//! - [`callkit`] - OS call UI options and their engine translation
//! - [`events`] - session events and the registration table
//! - [`credential`] - token credential seam
//! - [`platform`] - injected application state accessor
//! - [`config`] - serializable settings and runtime configuration
//! - [`error`] - error types

pub mod callkit;
pub mod config;
pub mod credential;
pub mod engine;
pub mod error;
pub mod events;
pub mod platform;
pub mod push;
pub mod session;

pub use callkit::{CallKitOptions, CallKitRemoteInfo, Caller, IncomingCallReport, ProviderConfig};
pub use config::{SessionConfig, SessionSettings, load_settings};
pub use credential::{AccessToken, CredentialProvider, StaticTokenCredential};
pub use engine::{CallAgent, CallClient, CallingEngine, LoopbackEngine};
pub use error::{EngineError, EngineResult, SessionError, SessionResult};
pub use events::{EventRegistry, SessionEvent, SessionEventHandler, SessionEventType};
pub use platform::{ApplicationState, FixedPlatformState, PlatformState};
pub use push::{PushCompletion, PushNotification, PushNotificationInfo, PushPayload};
pub use session::{SessionManager, SessionManagerBuilder, SessionState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
