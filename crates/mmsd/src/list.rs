// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mmsd list` command implementation.
//!
//! Opens the message store directly and prints one row per message, or
//! structured JSON with `--json`. The daemon does not need to be running.

use std::io::IsTerminal;
use std::str::FromStr;

use mmsd_config::model::MmsdConfig;
use mmsd_core::{Direction, Message, MessageFilter, MmsdError, StorageAdapter, TransactionState};
use mmsd_storage::SqliteStore;
use serde::Serialize;

/// Flags of the `list` subcommand.
#[derive(Debug, Default)]
pub struct ListOptions {
    pub direction: Option<String>,
    pub unread: bool,
    pub json: bool,
    pub plain: bool,
}

/// One message in `--json` output.
#[derive(Debug, Serialize)]
pub struct MessageRow {
    pub id: String,
    pub direction: String,
    pub state: String,
    pub read: bool,
    pub from: Option<String>,
    pub to: Vec<String>,
    pub subject: Option<String>,
    pub parts: usize,
    pub attempts: u32,
    pub failure: Option<String>,
    pub delivery_status: Option<String>,
    pub updated_at: String,
}

impl From<&Message> for MessageRow {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.to_string(),
            direction: msg.direction.to_string(),
            state: msg.state.to_string(),
            read: msg.read,
            from: msg.headers.from.clone(),
            to: msg.headers.to.clone(),
            subject: msg.headers.subject.clone(),
            parts: msg.parts.len(),
            attempts: msg.retry.attempts,
            failure: msg.failure.clone(),
            delivery_status: msg.delivery_status.clone(),
            updated_at: msg.updated_at.to_rfc3339(),
        }
    }
}

/// Runs the `mmsd list` command.
pub async fn run_list(config: &MmsdConfig, options: &ListOptions) -> Result<(), MmsdError> {
    let path = config.database_path();
    if !path.exists() {
        return Err(MmsdError::Config(format!(
            "no message store at {}",
            path.display()
        )));
    }

    let store = SqliteStore::from_config(config);
    store.initialize().await?;
    let messages = store.list(&filter(options)?).await;
    store.close().await?;
    let rows: Vec<MessageRow> = messages?.iter().map(MessageRow::from).collect();

    if options.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
        );
    } else {
        let use_color = !options.plain && std::io::stdout().is_terminal();
        print_rows(&rows, use_color);
    }
    Ok(())
}

fn filter(options: &ListOptions) -> Result<MessageFilter, MmsdError> {
    let direction = options
        .direction
        .as_deref()
        .map(|d| {
            Direction::from_str(d)
                .map_err(|_| MmsdError::InvalidRequest(format!("unknown direction '{d}'")))
        })
        .transpose()?;
    Ok(MessageFilter {
        direction,
        read: options.unread.then_some(false),
        ..MessageFilter::default()
    })
}

fn print_rows(rows: &[MessageRow], use_color: bool) {
    if rows.is_empty() {
        println!("no messages");
        return;
    }
    for row in rows {
        let peer = match row.direction.as_str() {
            "inbound" => row.from.clone().unwrap_or_default(),
            _ => row.to.join(", "),
        };
        let marker = if row.read { ' ' } else { '*' };
        println!(
            "{marker} {:<16} {:<8} {:<12} {peer}",
            row.id,
            row.direction,
            state_label(&row.state, use_color)
        );
        if let Some(subject) = &row.subject {
            println!("    subject: {subject}");
        }
        if let Some(failure) = &row.failure {
            println!("    failure: {failure}");
        }
        if let Some(status) = &row.delivery_status {
            println!("    delivery: {status}");
        }
    }
}

fn state_label(state: &str, use_color: bool) -> String {
    if !use_color {
        return state.to_string();
    }
    use colored::Colorize;
    match TransactionState::from_str(state) {
        Ok(TransactionState::Completed) => state.green().to_string(),
        Ok(TransactionState::Failed | TransactionState::Expired) => state.red().to_string(),
        _ => state.yellow().to_string(),
    }
}
