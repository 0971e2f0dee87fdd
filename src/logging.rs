//! Structured logging for the scheduling pipeline.
//!
//! Writes daily log files with categories:
//! - PARSER: request classification and extraction
//! - RECURRENCE: series expansion and modification
//! - CONFLICT: overlap detection and resolution
//! - CALENDAR: store reads/writes
//! - SESSION: pending-resolution lifecycle
//! - ERROR: errors and failures

use chrono::{Local, Utc};
use once_cell::sync::Lazy;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Log categories for structured logging
#[derive(Debug, Clone, Copy)]
pub enum LogCategory {
    Parser,
    Recurrence,
    Conflict,
    Calendar,
    Session,
    Error,
}

impl LogCategory {
    fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Parser => "PARSER",
            LogCategory::Recurrence => "RECURRENCE",
            LogCategory::Conflict => "CONFLICT",
            LogCategory::Calendar => "CALENDAR",
            LogCategory::Session => "SESSION",
            LogCategory::Error => "ERROR",
        }
    }
}

/// Global log file handle
static LOG_FILE: Lazy<Mutex<Option<PathBuf>>> = Lazy::new(|| Mutex::new(None));

/// Log directory: `$INNERVERSE_LOG_DIR` when set, otherwise `~/.innerverse/logs`
fn get_log_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("INNERVERSE_LOG_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".innerverse/logs")
}

/// Get today's log file path
fn get_log_file_path() -> PathBuf {
    let today = Local::now().format("%Y-%m-%d").to_string();
    get_log_dir().join(format!("innerverse-{}.log", today))
}

/// Initialize the logging system - creates log directory if needed
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = get_log_dir();

    if !log_dir.exists() {
        fs::create_dir_all(&log_dir)?;
    }

    let log_path = get_log_file_path();
    *LOG_FILE.lock().unwrap() = Some(log_path.clone());

    log(LogCategory::Session, None, "Innerverse logging initialized");

    Ok(())
}

/// Abbreviated user tag for log lines. User ids are caller-supplied, so
/// truncation counts characters rather than bytes.
fn user_context(user_id: Option<&str>) -> String {
    user_id
        .map(|id| format!("user={} | ", id.chars().take(8).collect::<String>()))
        .unwrap_or_default()
}

/// Log a message with category and optional user context
pub fn log(category: LogCategory, user_id: Option<&str>, message: &str) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let user_context = user_context(user_id);

    let log_line = format!(
        "[{}] [{}] {}{}\n",
        timestamp,
        category.as_str(),
        user_context,
        message
    );

    // Always print to console (for dev)
    print!("{}", log_line);

    let log_path = get_log_file_path();
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        let _ = file.write_all(log_line.as_bytes());
    }
}

/// Log a parsing event (classification, extraction, dropped input)
pub fn log_parser(user_id: Option<&str>, message: &str) {
    log(LogCategory::Parser, user_id, message);
}

/// Log a series expansion or modification
pub fn log_recurrence(user_id: Option<&str>, message: &str) {
    log(LogCategory::Recurrence, user_id, message);
}

/// Log a conflict detection or resolution decision
pub fn log_conflict(user_id: Option<&str>, message: &str) {
    log(LogCategory::Conflict, user_id, message);
}

/// Log a calendar store read/write
pub fn log_calendar(user_id: Option<&str>, message: &str) {
    log(LogCategory::Calendar, user_id, message);
}

/// Log a session lifecycle event
pub fn log_session(user_id: Option<&str>, message: &str) {
    log(LogCategory::Session, user_id, message);
}

/// Log an error
pub fn log_error(user_id: Option<&str>, message: &str) {
    log(LogCategory::Error, user_id, message);
}

/// Clean up old log files (keep last 7 days)
pub fn cleanup_old_logs() -> Result<usize, Box<dyn std::error::Error>> {
    let log_dir = get_log_dir();
    let mut deleted = 0;

    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(7);

    for entry in fs::read_dir(&log_dir)? {
        let entry = entry?;
        let path = entry.path();

        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                let modified_time: chrono::DateTime<Utc> = modified.into();
                if modified_time < cutoff {
                    if fs::remove_file(&path).is_ok() {
                        deleted += 1;
                    }
                }
            }
        }
    }

    Ok(deleted)
}
