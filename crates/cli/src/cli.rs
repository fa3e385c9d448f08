//! Command-line arguments

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Drive the call session manager and call history from the command line
#[derive(Parser, Debug)]
#[command(name = "callcomposite", version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "CALLCOMPOSITE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect or edit call history
    #[command(subcommand)]
    History(HistoryCommand),

    /// Exercise push registration and handling against the loopback engine
    Push(PushArgs),
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
    /// Record a call
    Add {
        /// Engine call id
        #[arg(long)]
        call_id: String,

        /// Start time as RFC 3339; defaults to now
        #[arg(long)]
        started_on: Option<DateTime<Utc>>,
    },

    /// Show retained calls, oldest first
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Delete all history
    Clear,
}

#[derive(Args, Debug)]
pub struct PushArgs {
    /// Access token used to create the call agent
    #[arg(long, env = "CALLCOMPOSITE_ACCESS_TOKEN", hide_env_values = true, default_value = "loopback")]
    pub access_token: String,

    #[command(subcommand)]
    pub command: PushCommand,
}

#[derive(Subcommand, Debug)]
pub enum PushCommand {
    /// Register a device token
    Register {
        /// Device token, base64 encoded
        #[arg(long)]
        token: String,
    },

    /// Remove the push registration
    Unregister,

    /// Handle a push payload as if delivered by the OS
    Handle {
        /// Payload as a JSON object, e.g. '{"callId":"abc123"}'
        #[arg(long)]
        payload: String,

        /// Report the call to the OS call UI first
        #[arg(long)]
        callkit: bool,

        /// Make the OS call UI report fail
        #[arg(long, requires = "callkit")]
        simulate_callkit_failure: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_history_add() {
        let cli = Cli::parse_from([
            "callcomposite",
            "history",
            "add",
            "--call-id",
            "xyz",
            "--started-on",
            "2024-01-01T00:00:00Z",
        ]);
        match cli.command {
            Command::History(HistoryCommand::Add { call_id, started_on }) => {
                assert_eq!(call_id, "xyz");
                assert_eq!(started_on.unwrap().to_rfc3339(), "2024-01-01T00:00:00+00:00");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_simulated_failure_requires_callkit() {
        let result = Cli::try_parse_from([
            "callcomposite",
            "push",
            "handle",
            "--payload",
            "{}",
            "--simulate-callkit-failure",
        ]);
        assert!(result.is_err());
    }
}
