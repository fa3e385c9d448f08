//! OS call-UI integration options
//!
//! [`CallKitOptions`] is what the application configures. The engine takes
//! its own representation, [`EngineCallKitOptions`], which is built from the
//! application options every time it is needed so the caller-supplied
//! remote-info transform is always the current one.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::push::PushNotificationInfo;

/// Hook to configure the audio session before the OS activates it
pub type ConfigureAudioSession = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

/// Transform from caller information to what the OS call UI shows
pub type ProvideRemoteInfo = Arc<dyn Fn(&Caller) -> CallKitRemoteInfo + Send + Sync>;

/// Kind of handle the OS call UI shows for a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleType {
    /// Free-form identifier
    Generic,
    /// Phone number
    PhoneNumber,
    /// Email address
    EmailAddress,
}

/// Handle shown by the OS call UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallHandle {
    /// Kind of handle
    pub kind: HandleType,
    /// Handle value
    pub value: String,
}

impl CallHandle {
    /// Generic handle with the given value
    pub fn generic(value: impl Into<String>) -> Self {
        Self {
            kind: HandleType::Generic,
            value: value.into(),
        }
    }
}

/// Caller details handed to the remote-info transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Caller display name
    pub display_name: String,
    /// Caller identifier
    pub identifier: String,
}

/// What the OS call UI shows for a remote party
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallKitRemoteInfo {
    /// Name shown on the incoming call screen
    pub display_name: String,
    /// Handle shown below the name
    pub handle: CallHandle,
}

/// Static provider configuration for the OS call UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Application name shown in the call UI
    pub localized_name: String,
    /// Whether the provider supports video calls
    pub supports_video: bool,
    /// Maximum calls per call group
    pub maximum_calls_per_group: u32,
    /// Handle kinds the provider accepts
    pub supported_handle_types: Vec<HandleType>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            localized_name: "Calling".to_string(),
            supports_video: true,
            maximum_calls_per_group: 1,
            supported_handle_types: vec![HandleType::Generic],
        }
    }
}

/// Application-level OS call UI integration options
#[derive(Clone, Default)]
pub struct CallKitOptions {
    /// Provider configuration
    pub provider: ProviderConfig,
    /// Whether calls can be put on hold from the OS call UI
    pub is_call_hold_supported: bool,
    /// Optional audio session hook
    pub configure_audio_session: Option<ConfigureAudioSession>,
    /// Optional caller info transform
    pub provide_remote_info: Option<ProvideRemoteInfo>,
}

impl CallKitOptions {
    /// Options with the given provider configuration
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            ..Default::default()
        }
    }

    /// Enable or disable hold support
    pub fn with_call_hold_supported(mut self, supported: bool) -> Self {
        self.is_call_hold_supported = supported;
        self
    }

    /// Set the audio session hook
    pub fn with_configure_audio_session(
        mut self,
        hook: impl Fn() -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.configure_audio_session = Some(Arc::new(hook));
        self
    }

    /// Set the caller info transform
    pub fn with_remote_info(
        mut self,
        transform: impl Fn(&Caller) -> CallKitRemoteInfo + Send + Sync + 'static,
    ) -> Self {
        self.provide_remote_info = Some(Arc::new(transform));
        self
    }
}

impl fmt::Debug for CallKitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallKitOptions")
            .field("provider", &self.provider)
            .field("is_call_hold_supported", &self.is_call_hold_supported)
            .field("configure_audio_session", &self.configure_audio_session.is_some())
            .field("provide_remote_info", &self.provide_remote_info.is_some())
            .finish()
    }
}

/// Request to display an incoming call in the OS call UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCallReport {
    /// Handle shown for the caller
    pub handle: CallHandle,
    /// Name shown for the caller
    pub display_name: String,
    /// Unique call identity
    pub call_uuid: Uuid,
    /// Whether hold is offered
    pub supports_holding: bool,
    /// Whether the call offers video
    pub has_video: bool,
}

/// Engine-side representation of [`CallKitOptions`]
#[derive(Clone)]
pub struct EngineCallKitOptions {
    /// Provider configuration
    pub provider: ProviderConfig,
    /// Whether hold is offered
    pub is_call_hold_supported: bool,
    /// Audio session hook
    pub configure_audio_session: Option<ConfigureAudioSession>,
    /// Application caller info transform
    pub provide_remote_info: Option<ProvideRemoteInfo>,
}

impl From<&CallKitOptions> for EngineCallKitOptions {
    fn from(options: &CallKitOptions) -> Self {
        Self {
            provider: options.provider.clone(),
            is_call_hold_supported: options.is_call_hold_supported,
            configure_audio_session: options.configure_audio_session.clone(),
            provide_remote_info: options.provide_remote_info.clone(),
        }
    }
}

impl EngineCallKitOptions {
    /// Run the audio session hook, if any, before the call UI is shown
    pub fn configure_audio_session(&self) -> Result<(), String> {
        match &self.configure_audio_session {
            Some(hook) => hook(),
            None => Ok(()),
        }
    }

    /// Resolve what the OS call UI should show for a caller
    pub fn remote_info(&self, caller: &Caller) -> CallKitRemoteInfo {
        match &self.provide_remote_info {
            Some(transform) => transform(caller),
            None => CallKitRemoteInfo {
                display_name: caller.display_name.clone(),
                handle: CallHandle::generic(caller.identifier.clone()),
            },
        }
    }

    /// Build the OS call UI report for an incoming push
    pub fn incoming_call_report(&self, info: &PushNotificationInfo) -> IncomingCallReport {
        let remote = self.remote_info(&Caller {
            display_name: info.from_display_name.clone(),
            identifier: info.from.clone(),
        });

        IncomingCallReport {
            handle: remote.handle,
            display_name: remote.display_name,
            call_uuid: info.call_uuid(),
            supports_holding: self.is_call_hold_supported,
            has_video: info.incoming_with_video && self.provider.supports_video,
        }
    }
}

impl fmt::Debug for EngineCallKitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineCallKitOptions")
            .field("provider", &self.provider)
            .field("is_call_hold_supported", &self.is_call_hold_supported)
            .field("configure_audio_session", &self.configure_audio_session.is_some())
            .field("provide_remote_info", &self.provide_remote_info.is_some())
            .finish()
    }
}
