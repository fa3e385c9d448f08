//! Lifecycle states of a session manager

use std::fmt;

/// Observable lifecycle state of a [`SessionManager`](super::SessionManager)
///
/// ```text
/// Uninitialized -> ClientReady -> AgentCreating -> AgentReady -> Disposed
///                                      |
///                                      v
///                              AgentCreateFailed (next attempt goes back to AgentCreating)
/// ```
///
/// `Disposed` is terminal. Every other state can reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No handle exists yet
    Uninitialized,
    /// The client handle exists, no agent
    ClientReady,
    /// An agent creation attempt is in flight
    AgentCreating,
    /// The agent handle exists and is reused
    AgentReady,
    /// The last creation attempt failed; nothing is stored
    AgentCreateFailed,
    /// Handles released; the manager must be rebuilt
    Disposed,
}

impl SessionState {
    /// Whether the manager has been disposed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disposed)
    }

    /// Whether a client handle is held in this state
    pub fn has_client(&self) -> bool {
        !matches!(self, Self::Uninitialized | Self::Disposed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::ClientReady => "client_ready",
            Self::AgentCreating => "agent_creating",
            Self::AgentReady => "agent_ready",
            Self::AgentCreateFailed => "agent_create_failed",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}
