//! Session events and the callback registration table
//!
//! Observers register per [`SessionEventType`]. The registry only keeps weak
//! references: it never extends an observer's lifetime, and it checks the
//! observer is still alive before every invocation. Dead entries are pruned
//! as they are found.
//!
//! Every event is also published on a `tokio::sync::broadcast` channel for
//! consumers that prefer a stream.
//!
//! # Examples
//!
//! ```rust
//! use async_trait::async_trait;
//! use callcomposite_core::events::{EventRegistry, SessionEvent, SessionEventHandler, SessionEventType};
//! use std::sync::Arc;
//!
//! struct Logger;
//!
//! #[async_trait]
//! impl SessionEventHandler for Logger {
//!     async fn on_event(&self, event: SessionEvent) {
//!         println!("{:?}", event.event_type());
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let registry = EventRegistry::new();
//! let logger = Arc::new(Logger);
//! registry.register(SessionEventType::Disposed, &logger);
//!
//! assert_eq!(registry.dispatch(SessionEvent::Disposed).await, 1);
//! drop(logger);
//! assert_eq!(registry.dispatch(SessionEvent::Disposed).await, 0);
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::trace;

use crate::engine::IncomingCallInfo;
use crate::platform::ApplicationState;

/// Events emitted by the session manager
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A call agent was created and stored
    AgentCreated {
        /// When the agent became ready
        timestamp: DateTime<Utc>,
    },
    /// Agent creation failed; nothing was stored
    AgentCreationFailed {
        /// Engine failure description
        reason: String,
    },
    /// The device token was registered for push
    PushRegistered,
    /// The push registration was removed
    PushUnregistered,
    /// An incoming call was announced
    IncomingCall {
        /// Call details from the engine
        call: IncomingCallInfo,
        /// Application state when the call arrived
        app_state: ApplicationState,
    },
    /// The OS call UI could not be told about an incoming call
    CallKitReportFailed {
        /// Engine call identifier
        call_id: String,
        /// Engine failure description
        reason: String,
    },
    /// The set of active calls changed
    CallsUpdated {
        /// Call ids that appeared
        added: Vec<String>,
        /// Call ids that went away
        removed: Vec<String>,
    },
    /// The manager released its handles
    Disposed,
}

/// Registration key for [`SessionEvent`]s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventType {
    /// [`SessionEvent::AgentCreated`]
    AgentCreated,
    /// [`SessionEvent::AgentCreationFailed`]
    AgentCreationFailed,
    /// [`SessionEvent::PushRegistered`]
    PushRegistered,
    /// [`SessionEvent::PushUnregistered`]
    PushUnregistered,
    /// [`SessionEvent::IncomingCall`]
    IncomingCall,
    /// [`SessionEvent::CallKitReportFailed`]
    CallKitReportFailed,
    /// [`SessionEvent::CallsUpdated`]
    CallsUpdated,
    /// [`SessionEvent::Disposed`]
    Disposed,
}

impl SessionEventType {
    /// Every event type
    pub const ALL: [SessionEventType; 8] = [
        Self::AgentCreated,
        Self::AgentCreationFailed,
        Self::PushRegistered,
        Self::PushUnregistered,
        Self::IncomingCall,
        Self::CallKitReportFailed,
        Self::CallsUpdated,
        Self::Disposed,
    ];
}

impl SessionEvent {
    /// Registration key of this event
    pub fn event_type(&self) -> SessionEventType {
        match self {
            Self::AgentCreated { .. } => SessionEventType::AgentCreated,
            Self::AgentCreationFailed { .. } => SessionEventType::AgentCreationFailed,
            Self::PushRegistered => SessionEventType::PushRegistered,
            Self::PushUnregistered => SessionEventType::PushUnregistered,
            Self::IncomingCall { .. } => SessionEventType::IncomingCall,
            Self::CallKitReportFailed { .. } => SessionEventType::CallKitReportFailed,
            Self::CallsUpdated { .. } => SessionEventType::CallsUpdated,
            Self::Disposed => SessionEventType::Disposed,
        }
    }
}

/// Observer of session events
#[async_trait]
pub trait SessionEventHandler: Send + Sync {
    /// Called for every event type the handler registered for
    async fn on_event(&self, event: SessionEvent);
}

/// Identifier returned by [`EventRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    handler: Weak<dyn SessionEventHandler>,
}

/// Callback registration table keyed by event type
pub struct EventRegistry {
    handlers: DashMap<SessionEventType, Vec<Registration>>,
    next_id: AtomicU64,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl EventRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create an empty registry with a broadcast buffer of `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity);
        Self {
            handlers: DashMap::new(),
            next_id: AtomicU64::new(1),
            event_tx,
        }
    }

    /// Register `handler` for one event type
    ///
    /// Only a weak reference is kept; the registration lapses when the last
    /// strong reference to the handler is dropped.
    pub fn register<H>(&self, event_type: SessionEventType, handler: &Arc<H>) -> SubscriptionId
    where
        H: SessionEventHandler + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let strong: Arc<dyn SessionEventHandler> = handler.clone();
        let weak = Arc::downgrade(&strong);
        self.handlers
            .entry(event_type)
            .or_default()
            .push(Registration { id, handler: weak });
        id
    }

    /// Register `handler` for every event type
    pub fn register_all<H>(&self, handler: &Arc<H>) -> Vec<SubscriptionId>
    where
        H: SessionEventHandler + 'static,
    {
        SessionEventType::ALL
            .iter()
            .map(|event_type| self.register(*event_type, handler))
            .collect()
    }

    /// Remove a registration; returns whether it existed
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for mut entry in self.handlers.iter_mut() {
            let before = entry.value().len();
            entry.value_mut().retain(|r| r.id != id);
            removed |= entry.value().len() != before;
        }
        removed
    }

    /// Number of live registrations for an event type
    pub fn handler_count(&self, event_type: SessionEventType) -> usize {
        self.handlers
            .get(&event_type)
            .map(|regs| regs.iter().filter(|r| r.handler.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Deliver an event to live handlers and the broadcast channel
    ///
    /// Returns the number of handlers invoked.
    pub async fn dispatch(&self, event: SessionEvent) -> usize {
        let event_type = event.event_type();

        // Upgrade under the map lock, invoke after releasing it.
        let live: Vec<Arc<dyn SessionEventHandler>> = match self.handlers.get_mut(&event_type) {
            Some(mut regs) => {
                regs.retain(|r| r.handler.strong_count() > 0);
                regs.iter().filter_map(|r| r.handler.upgrade()).collect()
            }
            None => Vec::new(),
        };

        trace!("Dispatching {:?} to {} handler(s)", event_type, live.len());

        let _ = self.event_tx.send(event.clone());
        for handler in &live {
            handler.on_event(event.clone()).await;
        }
        live.len()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("event_types", &self.handlers.len())
            .field("stream_subscribers", &self.event_tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<SessionEventType>>,
    }

    #[async_trait]
    impl SessionEventHandler for Recorder {
        async fn on_event(&self, event: SessionEvent) {
            self.seen.lock().push(event.event_type());
        }
    }

    #[tokio::test]
    async fn test_dispatch_is_keyed_by_event_type() {
        let registry = EventRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.register(SessionEventType::PushRegistered, &recorder);

        assert_eq!(registry.dispatch(SessionEvent::PushRegistered).await, 1);
        assert_eq!(registry.dispatch(SessionEvent::PushUnregistered).await, 0);
        assert_eq!(*recorder.seen.lock(), vec![SessionEventType::PushRegistered]);
    }

    #[tokio::test]
    async fn test_dead_handlers_are_skipped_and_pruned() {
        let registry = EventRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.register_all(&recorder);
        assert_eq!(registry.handler_count(SessionEventType::Disposed), 1);

        drop(recorder);
        assert_eq!(registry.handler_count(SessionEventType::Disposed), 0);
        assert_eq!(registry.dispatch(SessionEvent::Disposed).await, 0);
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = EventRegistry::new();
        let recorder = Arc::new(Recorder::default());
        let id = registry.register(SessionEventType::Disposed, &recorder);

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert_eq!(registry.dispatch(SessionEvent::Disposed).await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_stream_receives_events() {
        let registry = EventRegistry::new();
        let mut rx = registry.subscribe();

        registry.dispatch(SessionEvent::PushUnregistered).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), SessionEventType::PushUnregistered);
    }
}
