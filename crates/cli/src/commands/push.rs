//! `push` subcommands
//!
//! Every invocation builds a fresh session manager over the loopback engine,
//! runs one operation, prints the events it produced and disposes the
//! manager. Incoming calls announced by the engine are written to call
//! history.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use callcomposite_core::{
    CallKitOptions, EngineError, LoopbackEngine, ProviderConfig, PushCompletion, PushNotification,
    PushPayload, SessionConfig, SessionEvent, SessionEventHandler, SessionEventType, SessionManager,
    StaticTokenCredential,
};
use callcomposite_history::CallHistoryRepository;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cli::{PushArgs, PushCommand};
use crate::settings::AppSettings;

const DISPOSED_WAIT: Duration = Duration::from_secs(1);

/// Writes incoming calls to call history
pub struct HistoryRecorder {
    repository: Arc<CallHistoryRepository>,
}

impl HistoryRecorder {
    pub fn new(repository: Arc<CallHistoryRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl SessionEventHandler for HistoryRecorder {
    async fn on_event(&self, event: SessionEvent) {
        if let SessionEvent::IncomingCall { call, app_state } = event {
            match self.repository.insert(Utc::now(), call.call_id.as_str()) {
                Ok(()) => info!("Recorded incoming call {} (app {:?})", call.call_id, app_state),
                Err(e) => warn!("Could not record incoming call {}: {}", call.call_id, e),
            }
        }
    }
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl From<&SessionEvent> for EventRow {
    fn from(event: &SessionEvent) -> Self {
        let detail = match event {
            SessionEvent::AgentCreated { timestamp } => timestamp.to_rfc3339(),
            SessionEvent::AgentCreationFailed { reason } => reason.clone(),
            SessionEvent::IncomingCall { call, app_state } => {
                format!("{} from {} ({:?})", call.call_id, call.caller_id, app_state)
            }
            SessionEvent::CallKitReportFailed { call_id, reason } => format!("{}: {}", call_id, reason),
            SessionEvent::CallsUpdated { added, removed } => {
                format!("+[{}] -[{}]", added.join(", "), removed.join(", "))
            }
            SessionEvent::PushRegistered | SessionEvent::PushUnregistered | SessionEvent::Disposed => {
                String::new()
            }
        };
        Self {
            event: format!("{:?}", event.event_type()),
            detail,
        }
    }
}

/// Session configuration for one invocation
fn session_config(settings: &AppSettings, callkit: bool) -> SessionConfig {
    let config = SessionConfig::from(settings.session.clone());
    if callkit && config.call_kit.is_none() {
        config.with_call_kit(CallKitOptions::new(ProviderConfig::default()))
    } else {
        config
    }
}

/// Parse a push payload given on the command line
pub fn parse_payload(raw: &str) -> Result<PushPayload> {
    serde_json::from_str(raw).context("push payload must be a JSON object")
}

/// Run one push operation and return the events it produced
pub async fn execute(
    engine: &LoopbackEngine,
    command: PushCommand,
    access_token: &str,
    settings: &AppSettings,
    history: Arc<CallHistoryRepository>,
) -> Result<Vec<SessionEvent>> {
    let callkit = matches!(command, PushCommand::Handle { callkit: true, .. });
    let manager = SessionManager::new(
        Arc::new(engine.clone()),
        Arc::new(StaticTokenCredential::new(access_token)),
        session_config(settings, callkit),
    );

    let recorder = Arc::new(HistoryRecorder::new(history));
    manager.events().register(SessionEventType::IncomingCall, &recorder);
    let mut events = manager.events().subscribe();

    let result = match command {
        PushCommand::Register { token } => {
            let token = STANDARD
                .decode(token.trim())
                .context("device token must be base64")?;
            manager.register_push(&token).await
        }
        PushCommand::Unregister => manager.unregister_push().await,
        PushCommand::Handle {
            payload,
            simulate_callkit_failure,
            ..
        } => {
            let payload = parse_payload(&payload)?;
            if simulate_callkit_failure {
                engine.fail_report_incoming_call(EngineError::new(500, "simulated CallKit failure"));
            }
            let notification = PushNotification::new(payload)
                .with_completion(PushCompletion::new(|| debug!("Push handling completed")));
            manager.handle_incoming_push(notification).await
        }
    };
    manager.dispose();

    let produced = collect_until_disposed(&mut events).await;
    result?;
    Ok(produced)
}

/// Read events until the manager's `Disposed` notice arrives
///
/// `dispose` publishes that notice from a background task, so it is awaited
/// rather than polled.
async fn collect_until_disposed(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut produced = Vec::new();
    loop {
        match tokio::time::timeout(DISPOSED_WAIT, events.recv()).await {
            Ok(Ok(event)) => {
                let disposed = matches!(event, SessionEvent::Disposed);
                produced.push(event);
                if disposed {
                    break;
                }
            }
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                warn!("Skipped {} session event(s)", skipped);
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => break,
            Err(_) => {
                warn!("No dispose notice within {:?}", DISPOSED_WAIT);
                break;
            }
        }
    }
    produced
}

pub async fn run(args: PushArgs, settings: &AppSettings, history: Arc<CallHistoryRepository>) -> Result<()> {
    let engine = LoopbackEngine::new();
    let events = execute(&engine, args.command, &args.access_token, settings, history).await?;

    let counts = engine.counts();
    debug!("Engine calls: {:?}", counts);

    if events.is_empty() {
        println!("No session events");
    } else {
        let rows = events.iter().map(EventRow::from);
        println!("{}", Table::new(rows).with(Style::rounded()));
    }
    Ok(())
}
