//! `history` subcommands

use anyhow::{Context, Result};
use callcomposite_history::{CallHistoryRecord, CallHistoryRepository};
use chrono::{SecondsFormat, Utc};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::cli::HistoryCommand;

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Started")]
    started: String,
    #[tabled(rename = "Call IDs")]
    call_ids: String,
}

pub fn run(command: HistoryCommand, repository: &CallHistoryRepository) -> Result<()> {
    match command {
        HistoryCommand::Add { call_id, started_on } => {
            let started_on = started_on.unwrap_or_else(Utc::now);
            repository
                .insert(started_on, call_id.as_str())
                .with_context(|| format!("recording call {}", call_id))?;
            println!("Recorded {} at {}", call_id, started_on.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        HistoryCommand::List { json } => {
            let records = repository.get_all();
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No calls in the last {} days", repository.retention().num_days());
            } else {
                println!("{}", render_table(&records));
            }
        }
        HistoryCommand::Clear => {
            repository.clear().context("clearing call history")?;
            println!("Call history cleared");
        }
    }
    Ok(())
}

fn render_table(records: &[CallHistoryRecord]) -> String {
    let rows = records.iter().map(|record| HistoryRow {
        started: record.call_started_on.to_rfc3339_opts(SecondsFormat::Secs, true),
        call_ids: record.call_ids.join(", "),
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use callcomposite_history::MemoryStore;
    use chrono::TimeZone;
    use std::sync::Arc;

    #[test]
    fn test_render_table() {
        let records = vec![CallHistoryRecord {
            call_started_on: Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap(),
            call_ids: vec!["a".to_string(), "b".to_string()],
        }];
        let table = render_table(&records);
        assert!(table.contains("Started"));
        assert!(table.contains("2024-01-01T09:30:00Z"));
        assert!(table.contains("a, b"));
    }

    #[test]
    fn test_add_then_clear() {
        let repository = CallHistoryRepository::new(Arc::new(MemoryStore::new()));
        run(
            HistoryCommand::Add {
                call_id: "xyz".to_string(),
                started_on: None,
            },
            &repository,
        )
        .unwrap();
        assert_eq!(repository.get_all()[0].call_ids, vec!["xyz"]);

        run(HistoryCommand::List { json: true }, &repository).unwrap();
        run(HistoryCommand::Clear, &repository).unwrap();
        assert!(repository.get_all().is_empty());
    }

    #[test]
    fn test_add_blank_id_fails() {
        let repository = CallHistoryRepository::new(Arc::new(MemoryStore::new()));
        let result = run(
            HistoryCommand::Add {
                call_id: " ".to_string(),
                started_on: None,
            },
            &repository,
        );
        assert!(result.is_err());
    }
}
