//! Colored CLI display utilities for client output.
//!
//! This module provides functions for printing subscriber updates and
//! command results to the terminal.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::protocol::{tag, SubscriberUpdate};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 200;

/// Truncate a string to a maximum number of characters, adding ellipsis if
/// truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{kept}...")
}

/// Format an update's message for display.
///
/// Debugger output arrives in arbitrary chunks, so trailing line breaks are
/// dropped and long chunks are shortened unless `raw_mode` is set.
#[must_use]
pub fn format_message(update: &SubscriberUpdate, raw_mode: bool) -> String {
    let message = if raw_mode {
        update.message.as_str()
    } else {
        update.message.trim_end_matches(['\r', '\n'])
    };
    truncate(message, DEFAULT_MAX_LEN, raw_mode)
}

/// Print a broadcast update with its tag colored by category.
pub fn print_update(update: &SubscriberUpdate, raw_mode: bool) {
    let label = format!("[{}]", update.tag);
    let label = match update.tag.as_str() {
        tag::DEBUGGER_STARTED | tag::FILE_FOUND | tag::FILE_MATCH => {
            label.green().bold().to_string()
        }
        tag::DEBUGGER_STOPPED | tag::FILE_MISSING => label.red().bold().to_string(),
        tag::FILE_MISMATCH => label.yellow().bold().to_string(),
        tag::DEBUGGER_STDOUT => label.cyan().to_string(),
        tag::DEBUGGER_STDERR => label.magenta().to_string(),
        tag::PROJECT_DESCRIPTION => label.blue().bold().to_string(),
        _ => label.bold().to_string(),
    };
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        label,
        format_message(update, raw_mode)
    );
    let _ = io::stdout().flush();
}

/// Print the outcome of a one-shot command.
pub fn print_sent(what: &str, address: &str) {
    println!(
        "{} {} {} -> {}",
        timestamp().dimmed(),
        "[SENT]".green().bold(),
        what,
        address.cyan()
    );
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}
