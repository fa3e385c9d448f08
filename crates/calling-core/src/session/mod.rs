//! Call session manager
//!
//! [`SessionManager`] is the single authority over the two expensive engine
//! handles: the [`CallClient`] and the [`CallAgent`]. It creates them lazily,
//! reuses them, and releases them on [`SessionManager::dispose`]. Push token
//! registration and incoming push handling go through it so they always act
//! on the one live agent.
//!
//! # Single-flight agent creation
//!
//! The agent slot is either empty, creating, or ready. The first caller to
//! find it empty starts one creation task and parks a shared handle to its
//! outcome in the slot; every caller arriving while it runs awaits that same
//! handle. All of them see the same agent or the same error. A failure
//! empties the slot again, so the next call makes a fresh attempt.
//!
//! The creation runs on its own task: a caller that stops waiting does not
//! stop the engine call, and its result is still stored (or, if the manager
//! was disposed meanwhile, released).
//!
//! # Examples
//!
//! ```rust
//! use callcomposite_core::{LoopbackEngine, SessionConfig, SessionManager, StaticTokenCredential};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = LoopbackEngine::new();
//! let manager = SessionManager::builder(
//!     Arc::new(engine.clone()),
//!     Arc::new(StaticTokenCredential::new("token")),
//! )
//! .config(SessionConfig::new().with_display_name("Alice"))
//! .build();
//!
//! manager.register_push(b"device-token").await?;
//! assert_eq!(engine.counts().create_agent, 1);
//!
//! manager.dispose();
//! # Ok(())
//! # }
//! ```

mod delegate;
mod state;

pub use state::SessionState;

use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::callkit::{CallKitOptions, EngineCallKitOptions};
use crate::config::SessionConfig;
use crate::credential::CredentialProvider;
use crate::engine::{
    CallAgent, CallAgentOptions, CallClient, CallClientOptions, CallingEngine, DiagnosticsOptions,
};
use crate::error::{EngineResult, SessionError, SessionResult};
use crate::events::{EventRegistry, SessionEvent};
use crate::platform::{FixedPlatformState, PlatformState};
use crate::push::{PushNotification, PushNotificationInfo, PushPayload};
use delegate::SessionAgentDelegate;

type AgentCreation = Shared<BoxFuture<'static, SessionResult<Arc<dyn CallAgent>>>>;

enum AgentSlot {
    Empty,
    Creating { attempt: u64, outcome: AgentCreation },
    Ready(Arc<dyn CallAgent>),
}

struct Slots {
    client: Option<Arc<dyn CallClient>>,
    agent: AgentSlot,
    attempts: u64,
    last_attempt_failed: bool,
    disposed: bool,
}

pub(crate) struct SessionInner {
    engine: Arc<dyn CallingEngine>,
    credential: Arc<dyn CredentialProvider>,
    config: SessionConfig,
    pub(crate) platform: Arc<dyn PlatformState>,
    pub(crate) events: EventRegistry,
    slots: Mutex<Slots>,
}

impl SessionInner {
    pub(crate) fn is_disposed(&self) -> bool {
        self.slots.lock().disposed
    }

    fn make_client(&self) -> Arc<dyn CallClient> {
        debug!("Creating call client with {} diagnostic tag(s)", self.config.tags.len());
        self.engine.create_client(CallClientOptions {
            diagnostics: DiagnosticsOptions {
                tags: self.config.tags.clone(),
            },
        })
    }

    fn agent_options(&self) -> CallAgentOptions {
        CallAgentOptions {
            display_name: self.config.display_name.clone(),
            disable_internal_push_for_incoming_call: self.config.disable_internal_push_for_incoming_call,
            call_kit: self.config.call_kit.as_ref().map(EngineCallKitOptions::from),
        }
    }

    /// Spawn the one creation task for `attempt` and return its shared outcome
    fn start_creation(self: &Arc<Self>, client: Arc<dyn CallClient>, attempt: u64) -> AgentCreation {
        let owner = Arc::downgrade(self);
        let inner = self.clone();
        let credential = self.credential.clone();
        let options = self.agent_options();

        let task = tokio::spawn(async move {
            let result = client.create_agent(credential, options).await;
            inner.finish_creation(attempt, result).await
        });

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    if let Some(inner) = owner.upgrade() {
                        inner.abandon_creation(attempt);
                    }
                    Err(SessionError::internal(format!(
                        "agent creation task failed: {}",
                        join_error
                    )))
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn finish_creation(
        self: &Arc<Self>,
        attempt: u64,
        result: EngineResult<Arc<dyn CallAgent>>,
    ) -> SessionResult<Arc<dyn CallAgent>> {
        match result {
            Ok(agent) => {
                agent.set_delegate(Some(Arc::new(SessionAgentDelegate::new(Arc::downgrade(self)))));

                let stored = {
                    let mut slots = self.slots.lock();
                    let current = matches!(
                        &slots.agent,
                        AgentSlot::Creating { attempt: a, .. } if *a == attempt
                    );
                    if current && !slots.disposed {
                        slots.agent = AgentSlot::Ready(agent.clone());
                        slots.last_attempt_failed = false;
                        true
                    } else {
                        false
                    }
                };

                if !stored {
                    warn!("Call agent finished creating after dispose; releasing it");
                    agent.set_delegate(None);
                    agent.dispose();
                    return Err(SessionError::Disposed);
                }

                info!("Call agent created (attempt {})", attempt);
                self.events
                    .dispatch(SessionEvent::AgentCreated { timestamp: Utc::now() })
                    .await;
                Ok(agent)
            }
            Err(engine_error) => {
                {
                    let mut slots = self.slots.lock();
                    if matches!(&slots.agent, AgentSlot::Creating { attempt: a, .. } if *a == attempt) {
                        slots.agent = AgentSlot::Empty;
                        slots.last_attempt_failed = !slots.disposed;
                    }
                }

                error!("It was not possible to create a call agent: {}", engine_error);
                self.events
                    .dispatch(SessionEvent::AgentCreationFailed {
                        reason: engine_error.to_string(),
                    })
                    .await;
                Err(SessionError::creation_failed(engine_error))
            }
        }
    }

    fn abandon_creation(&self, attempt: u64) {
        let mut slots = self.slots.lock();
        if matches!(&slots.agent, AgentSlot::Creating { attempt: a, .. } if *a == attempt) {
            slots.agent = AgentSlot::Empty;
            slots.last_attempt_failed = !slots.disposed;
        }
    }
}

/// Builder for [`SessionManager`]
pub struct SessionManagerBuilder {
    engine: Arc<dyn CallingEngine>,
    credential: Arc<dyn CredentialProvider>,
    config: SessionConfig,
    platform: Option<Arc<dyn PlatformState>>,
    event_capacity: usize,
}

impl SessionManagerBuilder {
    /// Set the session configuration
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Inject the platform state accessor
    pub fn platform_state(mut self, platform: Arc<dyn PlatformState>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Size of the broadcast event buffer
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Build the manager; no engine call is made yet
    pub fn build(self) -> SessionManager {
        let platform = self
            .platform
            .unwrap_or_else(|| Arc::new(FixedPlatformState::default()));

        SessionManager {
            inner: Arc::new(SessionInner {
                engine: self.engine,
                credential: self.credential,
                config: self.config,
                platform,
                events: EventRegistry::with_capacity(self.event_capacity),
                slots: Mutex::new(Slots {
                    client: None,
                    agent: AgentSlot::Empty,
                    attempts: 0,
                    last_attempt_failed: false,
                    disposed: false,
                }),
            }),
        }
    }
}

/// Owner of the engine client and agent for one credential
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    /// Start building a manager over `engine` authenticating with `credential`
    pub fn builder(
        engine: Arc<dyn CallingEngine>,
        credential: Arc<dyn CredentialProvider>,
    ) -> SessionManagerBuilder {
        SessionManagerBuilder {
            engine,
            credential,
            config: SessionConfig::default(),
            platform: None,
            event_capacity: 256,
        }
    }

    /// Manager with the given configuration and default platform state
    pub fn new(
        engine: Arc<dyn CallingEngine>,
        credential: Arc<dyn CredentialProvider>,
        config: SessionConfig,
    ) -> Self {
        Self::builder(engine, credential).config(config).build()
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Event registration table
    pub fn events(&self) -> &EventRegistry {
        &self.inner.events
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        let slots = self.inner.slots.lock();
        if slots.disposed {
            return SessionState::Disposed;
        }
        match &slots.agent {
            AgentSlot::Ready(_) => SessionState::AgentReady,
            AgentSlot::Creating { .. } => SessionState::AgentCreating,
            AgentSlot::Empty if slots.last_attempt_failed => SessionState::AgentCreateFailed,
            AgentSlot::Empty if slots.client.is_some() => SessionState::ClientReady,
            AgentSlot::Empty => SessionState::Uninitialized,
        }
    }

    /// Number of agent creation attempts started so far
    pub fn creation_attempts(&self) -> u64 {
        self.inner.slots.lock().attempts
    }

    /// Return the client handle, constructing it on first use
    ///
    /// Construction is pure and cannot fail; the only error is
    /// [`SessionError::Disposed`].
    pub fn ensure_client(&self) -> SessionResult<Arc<dyn CallClient>> {
        let mut slots = self.inner.slots.lock();
        if slots.disposed {
            return Err(SessionError::Disposed);
        }
        if slots.client.is_none() {
            slots.client = Some(self.inner.make_client());
        }
        slots
            .client
            .clone()
            .ok_or_else(|| SessionError::internal("client slot empty after construction"))
    }

    /// Return the agent handle, creating it on first use
    ///
    /// A stored agent is returned without touching the engine. Otherwise
    /// exactly one creation runs no matter how many callers arrive while it
    /// is in flight, and they all receive its outcome. Failures are not
    /// cached.
    pub async fn ensure_agent(&self) -> SessionResult<Arc<dyn CallAgent>> {
        let creation = {
            let mut guard = self.inner.slots.lock();
            let slots = &mut *guard;
            if slots.disposed {
                return Err(SessionError::Disposed);
            }

            match &slots.agent {
                AgentSlot::Ready(agent) => {
                    debug!("Reusing call agent");
                    return Ok(agent.clone());
                }
                AgentSlot::Creating { attempt, outcome } => {
                    debug!("Joining in-flight call agent creation (attempt {})", attempt);
                    outcome.clone()
                }
                AgentSlot::Empty => {
                    if slots.client.is_none() {
                        slots.client = Some(self.inner.make_client());
                    }
                    let client = match &slots.client {
                        Some(client) => client.clone(),
                        None => return Err(SessionError::internal("client slot empty after construction")),
                    };

                    slots.attempts += 1;
                    let attempt = slots.attempts;
                    debug!("Creating call agent (attempt {})", attempt);
                    let outcome = self.inner.start_creation(client, attempt);
                    slots.agent = AgentSlot::Creating {
                        attempt,
                        outcome: outcome.clone(),
                    };
                    outcome
                }
            }
        };

        creation.await
    }

    /// Register the device push token with the agent
    ///
    /// The token is not kept after the call. No retry on failure.
    pub async fn register_push(&self, device_token: &[u8]) -> SessionResult<()> {
        let agent = self.ensure_agent().await.map_err(wrap_registration)?;

        if let Err(e) = agent.register_push_notifications(device_token).await {
            error!("Failed to register push notification: {}", e);
            return Err(SessionError::registration_failed(SessionError::Engine(e)));
        }

        info!("Registered for push notifications");
        self.inner.events.dispatch(SessionEvent::PushRegistered).await;
        Ok(())
    }

    /// Remove the push registration from the agent
    pub async fn unregister_push(&self) -> SessionResult<()> {
        let agent = self.ensure_agent().await.map_err(wrap_registration)?;

        if let Err(e) = agent.unregister_push_notifications().await {
            error!("Failed to unregister push notification: {}", e);
            return Err(SessionError::registration_failed(SessionError::Engine(e)));
        }

        info!("Unregistered from push notifications");
        self.inner.events.dispatch(SessionEvent::PushUnregistered).await;
        Ok(())
    }

    /// Handle a push delivered by the OS
    ///
    /// The completion signal, if any, is invoked once handling finishes,
    /// whatever the outcome.
    pub async fn handle_incoming_push(&self, notification: PushNotification) -> SessionResult<()> {
        let PushNotification { payload, completion } = notification;
        let result = self.handle_push_payload(&payload).await;
        if let Some(completion) = completion {
            completion.complete();
        }
        result
    }

    /// Handle a raw push payload
    ///
    /// With CallKit configured the call is first reported to the OS call UI.
    /// That report is best effort: a failure is logged and published as
    /// [`SessionEvent::CallKitReportFailed`], and the push still goes to the
    /// agent.
    pub async fn handle_push_payload(&self, payload: &PushPayload) -> SessionResult<()> {
        if self.inner.is_disposed() {
            return Err(SessionError::Disposed);
        }

        let info = PushNotificationInfo::from_payload(payload)?;
        debug!(
            "Handling push for call {} ({:?}, app {:?})",
            info.call_id,
            info.event_type,
            self.inner.platform.application_state()
        );

        if let Some(call_kit) = &self.inner.config.call_kit {
            if let Err(e) = Self::report_incoming_call(self.inner.engine.as_ref(), &info, call_kit).await {
                warn!("Failed to report incoming call {} to CallKit: {}", info.call_id, e);
                self.inner
                    .events
                    .dispatch(SessionEvent::CallKitReportFailed {
                        call_id: info.call_id.clone(),
                        reason: e.to_string(),
                    })
                    .await;
            }
        }

        let agent = self.ensure_agent().await.map_err(|e| {
            error!("Failed to handle push: {}", e);
            wrap_handling(e)
        })?;

        agent.handle_push(&info).await.map_err(|e| {
            error!("Failed to handle push: {}", e);
            SessionError::handling_failed(SessionError::Engine(e))
        })
    }

    /// Ask the OS call UI to show an incoming call
    ///
    /// Independent of any session: no handle is created or used.
    pub async fn report_incoming_call(
        engine: &dyn CallingEngine,
        info: &PushNotificationInfo,
        options: &CallKitOptions,
    ) -> SessionResult<()> {
        let engine_options = EngineCallKitOptions::from(options);
        engine
            .report_incoming_call(info, &engine_options)
            .await
            .map_err(SessionError::report_failed)
    }

    /// Release the agent and the client
    ///
    /// Detaches the agent delegate before disposing the agent. Safe to call
    /// any number of times, including on a manager that never created
    /// anything. A creation still in flight is released when it completes.
    pub fn dispose(&self) {
        let (agent, client) = {
            let mut slots = self.inner.slots.lock();
            if slots.disposed {
                return;
            }
            slots.disposed = true;
            slots.last_attempt_failed = false;
            let agent = match std::mem::replace(&mut slots.agent, AgentSlot::Empty) {
                AgentSlot::Ready(agent) => Some(agent),
                AgentSlot::Creating { attempt, .. } => {
                    debug!("Disposing with agent creation {} in flight", attempt);
                    None
                }
                AgentSlot::Empty => None,
            };
            (agent, slots.client.take())
        };

        if let Some(agent) = agent {
            agent.set_delegate(None);
            agent.dispose();
        }
        drop(client);
        info!("Session manager disposed");

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let inner = self.inner.clone();
            handle.spawn(async move {
                inner.events.dispatch(SessionEvent::Disposed).await;
            });
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("config", &self.inner.config)
            .finish()
    }
}

fn wrap_registration(error: SessionError) -> SessionError {
    match error {
        SessionError::Disposed => SessionError::Disposed,
        other => SessionError::registration_failed(other),
    }
}

fn wrap_handling(error: SessionError) -> SessionError {
    match error {
        SessionError::Disposed => SessionError::Disposed,
        other => SessionError::handling_failed(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callkit::ProviderConfig;
    use crate::credential::StaticTokenCredential;
    use crate::engine::LoopbackEngine;
    use crate::error::EngineError;
    use serde_json::json;
    use tracing_test::traced_test;

    fn manager(engine: &LoopbackEngine, config: SessionConfig) -> SessionManager {
        SessionManager::new(
            Arc::new(engine.clone()),
            Arc::new(StaticTokenCredential::new("token")),
            config,
        )
    }

    fn payload() -> PushPayload {
        serde_json::from_value(json!({"callId": "abc123", "from": "Alice"})).unwrap()
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let engine = LoopbackEngine::new();
        let manager = manager(&engine, SessionConfig::new());
        assert_eq!(manager.state(), SessionState::Uninitialized);

        manager.ensure_client().unwrap();
        assert_eq!(manager.state(), SessionState::ClientReady);

        engine.fail_create_agent(1, EngineError::network("offline"));
        assert!(manager.ensure_agent().await.is_err());
        assert_eq!(manager.state(), SessionState::AgentCreateFailed);

        manager.ensure_agent().await.unwrap();
        assert_eq!(manager.state(), SessionState::AgentReady);

        manager.dispose();
        assert_eq!(manager.state(), SessionState::Disposed);
        assert!(manager.state().is_terminal());
    }

    #[tokio::test]
    async fn test_agent_options_follow_config() {
        let engine = LoopbackEngine::new();
        let manager = manager(
            &engine,
            SessionConfig::new().with_display_name("Alice").with_tag("unit").with_tag("test"),
        );

        manager.ensure_agent().await.unwrap();

        assert_eq!(engine.agent_display_names(), vec![Some("Alice".to_string())]);
        assert_eq!(engine.client_options()[0].diagnostics.tags, vec!["unit", "test"]);
        assert!(engine.agent_has_delegate());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_callkit_failure_is_logged_not_propagated() {
        let engine = LoopbackEngine::new();
        engine.fail_report_incoming_call(EngineError::new(-1, "call UI unavailable"));
        let manager = manager(
            &engine,
            SessionConfig::new().with_call_kit(CallKitOptions::new(ProviderConfig::default())),
        );

        manager.handle_push_payload(&payload()).await.unwrap();

        assert!(logs_contain("Failed to report incoming call abc123 to CallKit"));
        assert_eq!(engine.counts().handle_push, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_agent_reuse_is_logged() {
        let engine = LoopbackEngine::new();
        let manager = manager(&engine, SessionConfig::new());

        manager.ensure_agent().await.unwrap();
        manager.ensure_agent().await.unwrap();

        assert!(logs_contain("Reusing call agent"));
    }

    #[tokio::test]
    async fn test_dispose_detaches_delegate_and_releases_agent() {
        let engine = LoopbackEngine::new();
        let manager = manager(&engine, SessionConfig::new());
        manager.ensure_agent().await.unwrap();
        assert!(engine.agent_has_delegate());

        manager.dispose();

        assert!(!engine.agent_has_delegate());
        assert_eq!(engine.counts().dispose_agent, 1);
        assert!(matches!(manager.ensure_client(), Err(SessionError::Disposed)));
        assert!(matches!(manager.ensure_agent().await, Err(SessionError::Disposed)));
    }

    #[tokio::test]
    async fn test_invalid_payload_skips_engine() {
        let engine = LoopbackEngine::new();
        let manager = manager(&engine, SessionConfig::new());
        let bad: PushPayload = serde_json::from_value(json!({"from": "Alice"})).unwrap();

        let err = manager.handle_push_payload(&bad).await.unwrap_err();

        assert!(matches!(err, SessionError::InvalidPushPayload { .. }));
        assert_eq!(engine.counts().create_agent, 0);
    }
}
