//! Push notification model
//!
//! The OS push subsystem delivers an untyped key-value payload for every
//! VoIP push. [`PushNotificationInfo`] is the immutable incoming-call
//! descriptor parsed from that payload, built fresh for each push event.
//!
//! # Payload keys
//!
//! | key | meaning | required |
//! |---|---|---|
//! | `callId` | engine call identifier | yes |
//! | `from` / `fromId` | caller identifier | no |
//! | `displayName` / `fromDisplayName` | caller display name | no, defaults to the caller id |
//! | `videoCall` | whether the caller offers video | no, defaults to `false` |
//! | `eventType` | `incomingCall`, `callEnded`, anything else is `other` | no, defaults to `incomingCall` |
//!
//! # Examples
//!
//! ```rust
//! use callcomposite_core::push::{PushEventType, PushNotificationInfo};
//! use serde_json::json;
//!
//! let payload = json!({"callId": "abc123", "from": "Alice"});
//! let info = PushNotificationInfo::from_value(&payload).unwrap();
//!
//! assert_eq!(info.call_id, "abc123");
//! assert_eq!(info.from_display_name, "Alice");
//! assert_eq!(info.event_type, PushEventType::IncomingCall);
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};

/// Raw push payload as delivered by the OS
pub type PushPayload = HashMap<String, Value>;

/// Kind of call event a push carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PushEventType {
    /// A new call is ringing
    IncomingCall,
    /// A previously announced call ended before it was answered
    CallEnded,
    /// Any other call event
    Other,
}

impl PushEventType {
    fn parse(raw: &str) -> Self {
        match raw {
            "incomingCall" | "IncomingCall" => Self::IncomingCall,
            "callEnded" | "CallEnded" | "stopRinging" => Self::CallEnded,
            _ => Self::Other,
        }
    }
}

/// Incoming-call descriptor parsed from a push payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushNotificationInfo {
    /// Engine call identifier
    pub call_id: String,
    /// Caller identifier (raw MRI, phone number or user id)
    pub from: String,
    /// Name to show for the caller
    pub from_display_name: String,
    /// Whether the caller offers video
    pub incoming_with_video: bool,
    /// Kind of event
    pub event_type: PushEventType,
}

impl PushNotificationInfo {
    /// Parse a descriptor from a push payload map
    pub fn from_payload(payload: &PushPayload) -> SessionResult<Self> {
        let call_id = match payload.get("callId") {
            Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
            Some(Value::String(_)) => return Err(SessionError::invalid_payload("callId is empty")),
            Some(_) => return Err(SessionError::invalid_payload("callId is not a string")),
            None => return Err(SessionError::invalid_payload("missing callId")),
        };

        let from = first_string(payload, &["from", "fromId"]).unwrap_or_default();
        let from_display_name =
            first_string(payload, &["displayName", "fromDisplayName"]).unwrap_or_else(|| from.clone());

        let incoming_with_video = match payload.get("videoCall") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };

        let event_type = payload
            .get("eventType")
            .and_then(Value::as_str)
            .map(PushEventType::parse)
            .unwrap_or(PushEventType::IncomingCall);

        Ok(Self {
            call_id,
            from,
            from_display_name,
            incoming_with_video,
            event_type,
        })
    }

    /// Parse a descriptor from a JSON object
    pub fn from_value(value: &Value) -> SessionResult<Self> {
        match value {
            Value::Object(map) => {
                let payload: PushPayload = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                Self::from_payload(&payload)
            }
            _ => Err(SessionError::invalid_payload("payload is not an object")),
        }
    }

    /// Stable UUID identity for the call
    ///
    /// The OS call UI keys calls by UUID. A UUID-shaped call id is used as-is,
    /// anything else maps to a name-based UUID so the same call id always
    /// yields the same identity.
    pub fn call_uuid(&self) -> Uuid {
        Uuid::parse_str(&self.call_id)
            .unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, self.call_id.as_bytes()))
    }
}

fn first_string(payload: &PushPayload, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| payload.get(*k))
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Completion signal handed over by the OS with a push
///
/// The OS keeps the app awake until this is invoked. It fires at most once:
/// either explicitly through [`PushCompletion::complete`] or when dropped.
pub struct PushCompletion {
    callback: Option<Box<dyn FnOnce() + Send>>,
}

impl PushCompletion {
    /// Wrap a completion callback
    pub fn new(callback: impl FnOnce() + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Invoke the completion now
    pub fn complete(mut self) {
        self.fire();
    }

    fn fire(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback();
        }
    }
}

impl Drop for PushCompletion {
    fn drop(&mut self) {
        self.fire();
    }
}

impl fmt::Debug for PushCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushCompletion")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

/// A push as delivered by the OS: payload plus optional completion
#[derive(Debug)]
pub struct PushNotification {
    /// Raw key-value payload
    pub payload: PushPayload,
    /// Signal to release OS-held resources once handling finishes
    pub completion: Option<PushCompletion>,
}

impl PushNotification {
    /// Create a push without a completion signal
    pub fn new(payload: PushPayload) -> Self {
        Self {
            payload,
            completion: None,
        }
    }

    /// Attach a completion signal
    pub fn with_completion(mut self, completion: PushCompletion) -> Self {
        self.completion = Some(completion);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn payload(value: Value) -> PushPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_display_name_falls_back_to_caller_id() {
        let info = PushNotificationInfo::from_payload(&payload(json!({
            "callId": "abc123",
            "from": "8:acs:alice"
        })))
        .unwrap();

        assert_eq!(info.from, "8:acs:alice");
        assert_eq!(info.from_display_name, "8:acs:alice");
        assert!(!info.incoming_with_video);
    }

    #[test]
    fn test_full_payload() {
        let info = PushNotificationInfo::from_payload(&payload(json!({
            "callId": "abc123",
            "fromId": "8:acs:bob",
            "fromDisplayName": "Bob",
            "videoCall": "true",
            "eventType": "callEnded"
        })))
        .unwrap();

        assert_eq!(info.from, "8:acs:bob");
        assert_eq!(info.from_display_name, "Bob");
        assert!(info.incoming_with_video);
        assert_eq!(info.event_type, PushEventType::CallEnded);
    }

    #[test]
    fn test_missing_call_id_is_rejected() {
        let err = PushNotificationInfo::from_payload(&payload(json!({"from": "Alice"}))).unwrap_err();
        assert!(matches!(err, SessionError::InvalidPushPayload { .. }));

        let err = PushNotificationInfo::from_payload(&payload(json!({"callId": 42}))).unwrap_err();
        assert!(matches!(err, SessionError::InvalidPushPayload { .. }));

        assert!(PushNotificationInfo::from_value(&json!(["callId"])).is_err());
    }

    #[test]
    fn test_call_uuid_is_stable() {
        let info = PushNotificationInfo::from_value(&json!({"callId": "abc123"})).unwrap();
        assert_eq!(info.call_uuid(), info.call_uuid());

        let id = Uuid::new_v4();
        let info = PushNotificationInfo::from_value(&json!({"callId": id.to_string()})).unwrap();
        assert_eq!(info.call_uuid(), id);
    }

    #[test]
    fn test_completion_fires_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let completion = PushCompletion::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        completion.complete();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let c = count.clone();
        drop(PushCompletion::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
