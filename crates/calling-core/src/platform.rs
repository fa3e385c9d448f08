//! Platform state accessor
//!
//! Application lifecycle state is injected rather than read from a global so
//! the session manager can be driven from tests and headless hosts.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Application lifecycle state as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationState {
    /// In the foreground and receiving events
    Active,
    /// In the foreground but not receiving events
    Inactive,
    /// In the background
    Background,
}

/// Read access to platform state
pub trait PlatformState: Send + Sync {
    /// Current application state
    fn application_state(&self) -> ApplicationState;
}

/// Platform state set explicitly by the host
#[derive(Debug)]
pub struct FixedPlatformState {
    state: RwLock<ApplicationState>,
}

impl FixedPlatformState {
    /// Start in the given state
    pub fn new(state: ApplicationState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Change the reported state
    pub fn set(&self, state: ApplicationState) {
        *self.state.write() = state;
    }
}

impl Default for FixedPlatformState {
    fn default() -> Self {
        Self::new(ApplicationState::Active)
    }
}

impl PlatformState for FixedPlatformState {
    fn application_state(&self) -> ApplicationState {
        *self.state.read()
    }
}
