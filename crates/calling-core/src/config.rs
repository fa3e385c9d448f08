//! Session configuration
//!
//! Two layers:
//!
//! - [`SessionSettings`] is the serializable form, loaded from a TOML file
//!   and `CALLCOMPOSITE__*` environment variables through [`load_settings`].
//! - [`SessionConfig`] is what the session manager runs with. It adds the
//!   runtime-only pieces (CallKit callbacks) on top of the settings.
//!
//! ```rust
//! use callcomposite_core::config::SessionConfig;
//! use callcomposite_core::callkit::{CallKitOptions, ProviderConfig};
//!
//! let config = SessionConfig::new()
//!     .with_display_name("Alice")
//!     .with_tag("demo-app")
//!     .with_call_kit(CallKitOptions::new(ProviderConfig::default()));
//!
//! assert_eq!(config.display_name.as_deref(), Some("Alice"));
//! assert!(config.call_kit.is_some());
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::callkit::{CallKitOptions, ProviderConfig};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "CALLCOMPOSITE";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The sources could not be read or merged
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value was present but unusable
    #[error("invalid configuration: {message}")]
    Invalid {
        /// What was wrong
        message: String,
    },
}

/// Serializable CallKit settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallKitSettings {
    /// Provider configuration
    #[serde(flatten)]
    pub provider: ProviderConfig,
    /// Whether calls can be held from the OS call UI
    pub is_call_hold_supported: bool,
}

impl Default for CallKitSettings {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            is_call_hold_supported: true,
        }
    }
}

/// Serializable session settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Name other participants see
    pub display_name: Option<String>,
    /// Diagnostic tags attached to the engine client
    pub tags: Vec<String>,
    /// Stop the engine from listening for incoming calls on its own channel
    pub disable_internal_push_for_incoming_call: bool,
    /// OS call UI integration; absent means no integration
    pub call_kit: Option<CallKitSettings>,
}

impl SessionSettings {
    /// Check values the engine would reject
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.display_name {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    message: "display_name must not be blank".to_string(),
                });
            }
            if name.chars().count() > 256 {
                return Err(ConfigError::Invalid {
                    message: "display_name must be at most 256 characters".to_string(),
                });
            }
        }
        if let Some(call_kit) = &self.call_kit {
            if call_kit.provider.localized_name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    message: "call_kit.localized_name must not be blank".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Load settings of type `T` from an optional TOML file and the environment
///
/// Environment variables use the [`ENV_PREFIX`] prefix and `__` as the
/// nesting separator, e.g. `CALLCOMPOSITE__SESSION__DISPLAY_NAME`. A missing
/// file is not an error; every field falls back to its default.
pub fn load_settings<T>(path: Option<&Path>) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(false));
    }
    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("session.tags")
            .try_parsing(true),
    );

    Ok(builder.build()?.try_deserialize()?)
}

/// Runtime session configuration
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Name other participants see
    pub display_name: Option<String>,
    /// Diagnostic tags attached to the engine client
    pub tags: Vec<String>,
    /// Stop the engine from listening for incoming calls on its own channel
    pub disable_internal_push_for_incoming_call: bool,
    /// OS call UI integration
    pub call_kit: Option<CallKitOptions>,
}

impl SessionConfig {
    /// Empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Append a diagnostic tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set the internal push switch
    pub fn with_internal_push_disabled(mut self, disabled: bool) -> Self {
        self.disable_internal_push_for_incoming_call = disabled;
        self
    }

    /// Enable OS call UI integration
    pub fn with_call_kit(mut self, options: CallKitOptions) -> Self {
        self.call_kit = Some(options);
        self
    }
}

impl From<SessionSettings> for SessionConfig {
    fn from(settings: SessionSettings) -> Self {
        Self {
            display_name: settings.display_name,
            tags: settings.tags,
            disable_internal_push_for_incoming_call: settings.disable_internal_push_for_incoming_call,
            call_kit: settings.call_kit.map(|ck| {
                CallKitOptions::new(ck.provider).with_call_hold_supported(ck.is_call_hold_supported)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Wrapper {
        session: SessionSettings,
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[session]
display_name = "Front Desk"
tags = ["lobby", "kiosk"]
disable_internal_push_for_incoming_call = true

[session.call_kit]
localized_name = "Lobby Phone"
supports_video = false
is_call_hold_supported = false
"#
        )
        .unwrap();

        let wrapper: Wrapper = load_settings(Some(file.path())).unwrap();
        let settings = wrapper.session;
        assert_eq!(settings.display_name.as_deref(), Some("Front Desk"));
        assert_eq!(settings.tags, vec!["lobby", "kiosk"]);
        assert!(settings.disable_internal_push_for_incoming_call);

        let call_kit = settings.call_kit.clone().unwrap();
        assert_eq!(call_kit.provider.localized_name, "Lobby Phone");
        assert!(!call_kit.provider.supports_video);
        assert_eq!(call_kit.provider.maximum_calls_per_group, 1);

        let config = SessionConfig::from(settings);
        assert!(!config.call_kit.unwrap().is_call_hold_supported);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let wrapper: Wrapper = load_settings(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(wrapper.session, SessionSettings::default());
        assert!(wrapper.session.call_kit.is_none());
    }

    #[test]
    fn test_validation() {
        let mut settings = SessionSettings::default();
        assert!(settings.validate().is_ok());

        settings.display_name = Some("   ".to_string());
        assert!(settings.validate().is_err());

        settings.display_name = Some("Alice".to_string());
        settings.call_kit = Some(CallKitSettings {
            provider: ProviderConfig {
                localized_name: String::new(),
                ..Default::default()
            },
            ..Default::default()
        });
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid { .. })));
    }
}
