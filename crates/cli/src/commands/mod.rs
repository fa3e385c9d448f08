//! Subcommand implementations

pub mod history;
pub mod push;
