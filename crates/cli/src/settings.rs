//! Application settings
//!
//! Loaded from an optional TOML file plus `CALLCOMPOSITE__*` environment
//! variables:
//!
//! ```toml
//! [session]
//! display_name = "Front Desk"
//! tags = ["lobby"]
//!
//! [session.call_kit]
//! localized_name = "Lobby Phone"
//!
//! [history]
//! storage_path = "/var/lib/callcomposite/settings.json"
//! retention_days = 31
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{Context, Result};
use callcomposite_core::{SessionSettings, load_settings};
use callcomposite_history::{HistorySettings, MAX_RETENTION_DAYS};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::logging::LoggingConfig;

/// Settings file name inside the data directory
const SETTINGS_FILE: &str = "settings.json";

/// Everything the CLI reads from configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Session manager settings
    pub session: SessionSettings,
    /// Call history settings
    pub history: HistorySettings,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl AppSettings {
    /// Load and validate settings
    ///
    /// When no history storage path is configured, history lives in the
    /// user data directory so it survives between invocations.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings: AppSettings = load_settings(path).context("loading settings")?;
        settings.session.validate()?;
        if !(1..=MAX_RETENTION_DAYS).contains(&settings.history.retention_days) {
            anyhow::bail!(
                "history.retention_days must be between 1 and {}",
                MAX_RETENTION_DAYS
            );
        }
        if settings.history.storage_path.is_none() {
            settings.history.storage_path = default_storage_path();
        }
        Ok(settings)
    }
}

/// `<data dir>/callcomposite/settings.json`, when the platform has a data dir
pub fn default_storage_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("callcomposite").join(SETTINGS_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("history.json");
        let path = dir.path().join("callcomposite.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[session]
display_name = "Front Desk"

[history]
storage_path = "{}"
retention_days = 7

[logging]
level = "debug"
json = true
"#,
            store.display()
        )
        .unwrap();

        let settings = AppSettings::load(Some(&path)).unwrap();
        assert_eq!(settings.session.display_name.as_deref(), Some("Front Desk"));
        assert_eq!(settings.history.storage_path.as_deref(), Some(store.as_path()));
        assert_eq!(settings.history.retention_days, 7);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn test_zero_retention_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("callcomposite.toml");
        std::fs::write(&path, "[history]\nretention_days = 0\n").unwrap();

        assert!(AppSettings::load(Some(&path)).is_err());
    }

    #[test]
    fn test_oversized_retention_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("callcomposite.toml");
        std::fs::write(&path, "[history]\nretention_days = 100000000\n").unwrap();

        let err = AppSettings::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("retention_days"));
    }

    #[test]
    fn test_blank_display_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("callcomposite.toml");
        std::fs::write(&path, "[session]\ndisplay_name = \"  \"\n").unwrap();

        assert!(AppSettings::load(Some(&path)).is_err());
    }
}
