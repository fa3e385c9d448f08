//! Call history repository
//!
//! History is a mapping from call start time to the call ids that started at
//! that instant. It is stored as one JSON blob under
//! [`CALL_HISTORY_STORAGE_KEY`]. Every read drops records older than the
//! retention window (31 days by default), and every insert writes back the
//! pruned set, so stale records leave storage on the next write.
//!
//! # Examples
//!
//! ```rust
//! use callcomposite_history::{CallHistoryRepository, MemoryStore};
//! use chrono::Utc;
//! use std::sync::Arc;
//!
//! let repository = CallHistoryRepository::new(Arc::new(MemoryStore::new()));
//! let started = Utc::now();
//! repository.insert(started, "call-1").unwrap();
//! repository.insert(started, "call-2").unwrap();
//!
//! let records = repository.get_all();
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].call_ids, vec!["call-1", "call-2"]);
//! ```

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{HistoryError, HistoryResult};
use crate::store::KeyValueStore;

/// Fixed settings key the history blob lives under
pub const CALL_HISTORY_STORAGE_KEY: &str = "callcomposite.calling.call_history";

/// Days a record is kept
pub const DEFAULT_RETENTION_DAYS: i64 = 31;

/// Longest retention settings may ask for
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Calls that started at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallHistoryRecord {
    /// When the calls started
    pub call_started_on: DateTime<Utc>,
    /// Engine call ids, in insertion order
    pub call_ids: Vec<String>,
}

type Records = BTreeMap<DateTime<Utc>, Vec<String>>;

/// Reads and writes call history in key-value storage
pub struct CallHistoryRepository {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    write_lock: Mutex<()>,
}

impl CallHistoryRepository {
    /// Repository over `store` using the wall clock and default retention
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            retention: Duration::days(DEFAULT_RETENTION_DAYS),
            write_lock: Mutex::new(()),
        }
    }

    /// Use a different time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Keep records for `retention` instead of the default
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Current retention window
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Record that `call_id` started at `call_started_on`
    ///
    /// Ids for the same start time accumulate in insertion order.
    pub fn insert(&self, call_started_on: DateTime<Utc>, call_id: impl Into<String>) -> HistoryResult<()> {
        let call_id = call_id.into();
        if call_id.trim().is_empty() {
            return Err(HistoryError::invalid_call_id("call id must not be blank"));
        }

        let _guard = self.write_lock.lock();
        let mut records = self.load();
        records.entry(call_started_on).or_default().push(call_id);

        let result = encode(&records).and_then(|blob| self.store.set(CALL_HISTORY_STORAGE_KEY, blob));
        if let Err(e) = &result {
            error!("Failed to save call history, reason: {}", e);
        }
        result
    }

    /// Every retained record, oldest first
    pub fn get_all(&self) -> Vec<CallHistoryRecord> {
        self.load()
            .into_iter()
            .map(|(call_started_on, call_ids)| CallHistoryRecord {
                call_started_on,
                call_ids,
            })
            .collect()
    }

    /// Delete all history
    pub fn clear(&self) -> HistoryResult<()> {
        let _guard = self.write_lock.lock();
        self.store.remove(CALL_HISTORY_STORAGE_KEY)
    }

    /// Stored records minus the expired ones; unreadable data reads as empty
    fn load(&self) -> Records {
        let blob = match self.store.get(CALL_HISTORY_STORAGE_KEY) {
            Ok(Some(blob)) => blob,
            Ok(None) => return Records::new(),
            Err(e) => {
                warn!("Call history unreadable, treating as empty: {}", e);
                return Records::new();
            }
        };

        let mut records = match decode(&blob) {
            Ok(records) => records,
            Err(e) => {
                warn!("Call history corrupt, treating as empty: {}", e);
                return Records::new();
            }
        };

        let now = self.clock.now();
        let Some(threshold) = now.checked_sub_signed(self.retention) else {
            return records;
        };
        let before = records.len();
        records.retain(|started_on, _| *started_on >= threshold);
        if records.len() != before {
            debug!("Pruned {} call history record(s) older than {}", before - records.len(), threshold);
        }
        records
    }
}

impl std::fmt::Debug for CallHistoryRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHistoryRepository")
            .field("retention_days", &self.retention.num_days())
            .finish()
    }
}

fn encode(records: &Records) -> HistoryResult<Vec<u8>> {
    let wire: BTreeMap<String, &Vec<String>> = records
        .iter()
        .map(|(started_on, ids)| (started_on.to_rfc3339_opts(SecondsFormat::AutoSi, true), ids))
        .collect();
    Ok(serde_json::to_vec(&wire)?)
}

fn decode(blob: &[u8]) -> HistoryResult<Records> {
    let wire: BTreeMap<String, Vec<String>> = serde_json::from_slice(blob)?;
    let mut records = Records::new();
    for (key, ids) in wire {
        match DateTime::parse_from_rfc3339(&key) {
            Ok(started_on) => records
                .entry(started_on.with_timezone(&Utc))
                .or_default()
                .extend(ids),
            Err(_) => warn!("Skipping call history entry with bad timestamp '{}'", key),
        }
    }
    Ok(records)
}
