//! # callcomposite-history
//!
//! Call history for the calling composite: which calls started when, kept in
//! key-value settings storage for a bounded retention window.
//!
//! - [`CallHistoryRepository`] - insert and read records, pruning on read
//! - [`KeyValueStore`] - storage seam, with [`MemoryStore`] and [`FileStore`]
//! - [`Clock`] - time source used for retention

pub mod clock;
pub mod error;
pub mod repository;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{HistoryError, HistoryResult};
pub use repository::{
    CALL_HISTORY_STORAGE_KEY, CallHistoryRecord, CallHistoryRepository, DEFAULT_RETENTION_DAYS,
    MAX_RETENTION_DAYS,
};
pub use store::{FileStore, KeyValueStore, MemoryStore};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Serializable history settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Settings file backing the store; `None` keeps history in memory
    pub storage_path: Option<PathBuf>,
    /// Days a record is kept
    pub retention_days: i64,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            storage_path: None,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl HistorySettings {
    /// Retention window, clamped to `1..=MAX_RETENTION_DAYS` days
    pub fn retention(&self) -> chrono::Duration {
        let days = self.retention_days.clamp(1, MAX_RETENTION_DAYS);
        chrono::Duration::try_days(days).unwrap_or_else(|| chrono::Duration::days(DEFAULT_RETENTION_DAYS))
    }

    /// Build a repository from these settings
    pub fn open(&self) -> CallHistoryRepository {
        let store: std::sync::Arc<dyn KeyValueStore> = match &self.storage_path {
            Some(path) => std::sync::Arc::new(FileStore::new(path.clone())),
            None => std::sync::Arc::new(MemoryStore::new()),
        };
        CallHistoryRepository::new(store).with_retention(self.retention())
    }
}
