//! In-process calling engine
//!
//! `LoopbackEngine` accepts every request, records what it was asked to do
//! and can be told to fail specific operations. The CLI drives the session
//! manager with it, and the tests use it to observe engine traffic.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::{
    CallAgent, CallAgentDelegate, CallAgentOptions, CallClient, CallClientOptions, CallingEngine,
    IncomingCallInfo,
};
use crate::callkit::{EngineCallKitOptions, IncomingCallReport};
use crate::credential::CredentialProvider;
use crate::error::{EngineError, EngineResult};
use crate::push::{PushEventType, PushNotificationInfo};

/// Number of calls each engine operation received
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCallCounts {
    /// `create_client` calls
    pub create_client: usize,
    /// `create_agent` calls
    pub create_agent: usize,
    /// `register_push_notifications` calls
    pub register_push: usize,
    /// `unregister_push_notifications` calls
    pub unregister_push: usize,
    /// `handle_push` calls
    pub handle_push: usize,
    /// `report_incoming_call` calls
    pub report_incoming_call: usize,
    /// `dispose` calls on agents
    pub dispose_agent: usize,
}

#[derive(Default)]
struct Counters {
    create_client: AtomicUsize,
    create_agent: AtomicUsize,
    register_push: AtomicUsize,
    unregister_push: AtomicUsize,
    handle_push: AtomicUsize,
    report_incoming_call: AtomicUsize,
    dispose_agent: AtomicUsize,
}

#[derive(Default)]
struct Faults {
    create_agent: VecDeque<EngineError>,
    register_push: Option<EngineError>,
    handle_push: Option<EngineError>,
    report_incoming_call: Option<EngineError>,
}

#[derive(Default)]
struct Recorded {
    client_options: Vec<CallClientOptions>,
    agent_display_names: Vec<Option<String>>,
    registered_token: Option<Vec<u8>>,
    handled_pushes: Vec<PushNotificationInfo>,
    reports: Vec<IncomingCallReport>,
}

#[derive(Default)]
struct Shared {
    counters: Counters,
    faults: Mutex<Faults>,
    recorded: Mutex<Recorded>,
    create_delay: RwLock<Option<Duration>>,
    current_agent: RwLock<Option<Arc<LoopbackAgent>>>,
}

/// In-process engine that records every request
#[derive(Clone, Default)]
pub struct LoopbackEngine {
    shared: Arc<Shared>,
}

impl LoopbackEngine {
    /// Create an engine that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every agent creation by `delay`
    pub fn with_create_delay(self, delay: Duration) -> Self {
        *self.shared.create_delay.write() = Some(delay);
        self
    }

    /// Fail the next `times` agent creations with `error`
    pub fn fail_create_agent(&self, times: usize, error: EngineError) {
        let mut faults = self.shared.faults.lock();
        for _ in 0..times {
            faults.create_agent.push_back(error.clone());
        }
    }

    /// Fail push registration and unregistration until cleared
    pub fn fail_register_push(&self, error: EngineError) {
        self.shared.faults.lock().register_push = Some(error);
    }

    /// Fail push hand-off until cleared
    pub fn fail_handle_push(&self, error: EngineError) {
        self.shared.faults.lock().handle_push = Some(error);
    }

    /// Fail incoming call reports until cleared
    pub fn fail_report_incoming_call(&self, error: EngineError) {
        self.shared.faults.lock().report_incoming_call = Some(error);
    }

    /// Remove every injected failure
    pub fn clear_faults(&self) {
        *self.shared.faults.lock() = Faults::default();
    }

    /// Snapshot of the call counters
    pub fn counts(&self) -> EngineCallCounts {
        let c = &self.shared.counters;
        EngineCallCounts {
            create_client: c.create_client.load(Ordering::SeqCst),
            create_agent: c.create_agent.load(Ordering::SeqCst),
            register_push: c.register_push.load(Ordering::SeqCst),
            unregister_push: c.unregister_push.load(Ordering::SeqCst),
            handle_push: c.handle_push.load(Ordering::SeqCst),
            report_incoming_call: c.report_incoming_call.load(Ordering::SeqCst),
            dispose_agent: c.dispose_agent.load(Ordering::SeqCst),
        }
    }

    /// Options every client was constructed with
    pub fn client_options(&self) -> Vec<CallClientOptions> {
        self.shared.recorded.lock().client_options.clone()
    }

    /// Display names every agent was created with
    pub fn agent_display_names(&self) -> Vec<Option<String>> {
        self.shared.recorded.lock().agent_display_names.clone()
    }

    /// Token of the live push registration, if any
    pub fn registered_token(&self) -> Option<Vec<u8>> {
        self.shared.recorded.lock().registered_token.clone()
    }

    /// Pushes handed to agents, in order
    pub fn handled_pushes(&self) -> Vec<PushNotificationInfo> {
        self.shared.recorded.lock().handled_pushes.clone()
    }

    /// Incoming call reports shown in the OS call UI, in order
    pub fn reports(&self) -> Vec<IncomingCallReport> {
        self.shared.recorded.lock().reports.clone()
    }

    /// Whether the most recently created agent has a delegate installed
    pub fn agent_has_delegate(&self) -> bool {
        self.shared
            .current_agent
            .read()
            .as_ref()
            .is_some_and(|agent| agent.delegate.read().is_some())
    }

    /// Ring the most recently created agent as if a call arrived
    pub async fn ring(&self, call: IncomingCallInfo) -> bool {
        let agent = self.shared.current_agent.read().clone();
        match agent {
            Some(agent) => agent.notify_incoming(call).await,
            None => false,
        }
    }
}

#[async_trait]
impl CallingEngine for LoopbackEngine {
    fn create_client(&self, options: CallClientOptions) -> Arc<dyn CallClient> {
        self.shared.counters.create_client.fetch_add(1, Ordering::SeqCst);
        self.shared.recorded.lock().client_options.push(options.clone());
        debug!("Loopback client created with tags {:?}", options.diagnostics.tags);
        Arc::new(LoopbackClient {
            shared: self.shared.clone(),
        })
    }

    async fn report_incoming_call(
        &self,
        notification: &PushNotificationInfo,
        options: &EngineCallKitOptions,
    ) -> EngineResult<()> {
        self.shared.counters.report_incoming_call.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.shared.faults.lock().report_incoming_call.clone() {
            return Err(err);
        }
        options
            .configure_audio_session()
            .map_err(|reason| EngineError::new(500, format!("audio session configuration failed: {}", reason)))?;
        let report = options.incoming_call_report(notification);
        info!("Loopback call UI showing '{}' ({})", report.display_name, report.call_uuid);
        self.shared.recorded.lock().reports.push(report);
        Ok(())
    }
}

struct LoopbackClient {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for LoopbackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackClient").finish_non_exhaustive()
    }
}

#[async_trait]
impl CallClient for LoopbackClient {
    async fn create_agent(
        &self,
        credential: Arc<dyn CredentialProvider>,
        options: CallAgentOptions,
    ) -> EngineResult<Arc<dyn CallAgent>> {
        self.shared.counters.create_agent.fetch_add(1, Ordering::SeqCst);

        let delay = *self.shared.create_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let injected = self.shared.faults.lock().create_agent.pop_front();
        if let Some(err) = injected {
            return Err(err);
        }

        credential
            .token()
            .await
            .map_err(|e| EngineError::unauthorized(e.to_string()))?;

        self.shared
            .recorded
            .lock()
            .agent_display_names
            .push(options.display_name.clone());

        let agent = Arc::new(LoopbackAgent {
            shared: self.shared.clone(),
            delegate: RwLock::new(None),
            disposed: AtomicBool::new(false),
        });
        *self.shared.current_agent.write() = Some(agent.clone());
        Ok(agent)
    }
}

struct LoopbackAgent {
    shared: Arc<Shared>,
    delegate: RwLock<Option<Arc<dyn CallAgentDelegate>>>,
    disposed: AtomicBool,
}

impl LoopbackAgent {
    async fn notify_incoming(&self, call: IncomingCallInfo) -> bool {
        if self.disposed.load(Ordering::SeqCst) {
            return false;
        }
        let delegate = self.delegate.read().clone();
        match delegate {
            Some(delegate) => {
                let call_id = call.call_id.clone();
                delegate.on_incoming_call(call).await;
                delegate.on_calls_updated(vec![call_id], Vec::new()).await;
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for LoopbackAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackAgent")
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CallAgent for LoopbackAgent {
    async fn register_push_notifications(&self, device_token: &[u8]) -> EngineResult<()> {
        self.shared.counters.register_push.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.shared.faults.lock().register_push.clone() {
            return Err(err);
        }
        self.shared.recorded.lock().registered_token = Some(device_token.to_vec());
        Ok(())
    }

    async fn unregister_push_notifications(&self) -> EngineResult<()> {
        self.shared.counters.unregister_push.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.shared.faults.lock().register_push.clone() {
            return Err(err);
        }
        self.shared.recorded.lock().registered_token = None;
        Ok(())
    }

    async fn handle_push(&self, notification: &PushNotificationInfo) -> EngineResult<()> {
        self.shared.counters.handle_push.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.shared.faults.lock().handle_push.clone() {
            return Err(err);
        }
        self.shared.recorded.lock().handled_pushes.push(notification.clone());

        if notification.event_type == PushEventType::IncomingCall {
            self.notify_incoming(IncomingCallInfo {
                call_id: notification.call_id.clone(),
                caller_id: notification.from.clone(),
                caller_display_name: Some(notification.from_display_name.clone()),
                is_video: notification.incoming_with_video,
            })
            .await;
        }
        Ok(())
    }

    fn set_delegate(&self, delegate: Option<Arc<dyn CallAgentDelegate>>) {
        *self.delegate.write() = delegate;
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.shared.counters.dispose_agent.fetch_add(1, Ordering::SeqCst);
        }
    }
}
