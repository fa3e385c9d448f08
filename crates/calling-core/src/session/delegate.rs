//! Agent delegate installed by the session manager
//!
//! The engine holds the delegate for as long as the agent lives, so the
//! delegate must not keep the manager alive. It holds a weak back-reference
//! and drops notifications once the manager is gone or disposed.

use async_trait::async_trait;
use std::sync::Weak;
use tracing::{debug, trace};

use super::SessionInner;
use crate::engine::{CallAgentDelegate, IncomingCallInfo};
use crate::events::SessionEvent;

pub(crate) struct SessionAgentDelegate {
    owner: Weak<SessionInner>,
}

impl SessionAgentDelegate {
    pub(crate) fn new(owner: Weak<SessionInner>) -> Self {
        Self { owner }
    }
}

#[async_trait]
impl CallAgentDelegate for SessionAgentDelegate {
    async fn on_incoming_call(&self, call: IncomingCallInfo) {
        let Some(owner) = self.owner.upgrade() else {
            trace!("Dropping incoming call {}: session manager is gone", call.call_id);
            return;
        };
        if owner.is_disposed() {
            trace!("Dropping incoming call {}: session manager is disposed", call.call_id);
            return;
        }

        let app_state = owner.platform.application_state();
        debug!("Incoming call {} from {} ({:?})", call.call_id, call.caller_id, app_state);
        owner
            .events
            .dispatch(SessionEvent::IncomingCall { call, app_state })
            .await;
    }

    async fn on_calls_updated(&self, added: Vec<String>, removed: Vec<String>) {
        let Some(owner) = self.owner.upgrade() else {
            return;
        };
        if owner.is_disposed() {
            return;
        }
        owner
            .events
            .dispatch(SessionEvent::CallsUpdated { added, removed })
            .await;
    }
}
