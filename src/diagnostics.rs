use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::warn;

use crate::util::sync::lock_or_recover;

pub const CHANNEL_NAME: &str = "Task Auto Detection";

static SHARED: OnceLock<Arc<OutputChannel>> = OnceLock::new();

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub channel: String,
    pub line: String,
}

/// Append-only diagnostic sink that the user can be pointed at.
///
/// Lines stay in memory for the life of the process. When a file is attached,
/// every line is also mirrored there as JSONL so `task-detect log` can show
/// what earlier runs reported.
pub struct OutputChannel {
    name: String,
    lines: Mutex<Vec<String>>,
    revealed: AtomicBool,
    file: Option<PathBuf>,
}

impl OutputChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Mutex::new(Vec::new()),
            revealed: AtomicBool::new(false),
            file: None,
        }
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file = Some(path);
        self
    }

    /// The process-wide channel. Created on first call; later calls ignore
    /// `file` and hand back the same instance.
    pub fn shared(file: Option<PathBuf>) -> Arc<OutputChannel> {
        SHARED
            .get_or_init(|| {
                let channel = OutputChannel::new(CHANNEL_NAME);
                Arc::new(match file {
                    Some(path) => channel.with_file(path),
                    None => channel,
                })
            })
            .clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn append_line(&self, line: &str) {
        lock_or_recover(&self.lines).push(line.to_string());
        if let Some(path) = &self.file {
            let entry = new_entry(&self.name, line);
            if let Err(e) = append_entry(path, &entry) {
                warn!("failed to persist diagnostic line to {}: {e:#}", path.display());
            }
        }
    }

    /// Ask the host to bring the channel into view without stealing focus.
    pub fn show(&self) {
        self.revealed.store(true, Ordering::SeqCst);
    }

    /// Clears the reveal request, returning whether one was pending.
    pub fn take_revealed(&self) -> bool {
        self.revealed.swap(false, Ordering::SeqCst)
    }

    pub fn lines(&self) -> Vec<String> {
        lock_or_recover(&self.lines).clone()
    }

    /// Lines appended after the first `from`.
    pub fn lines_since(&self, from: usize) -> Vec<String> {
        let lines = lock_or_recover(&self.lines);
        lines.get(from..).map(<[String]>::to_vec).unwrap_or_default()
    }
}

pub fn new_entry(channel: &str, line: &str) -> LogEntry {
    LogEntry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        channel: channel.to_string(),
        line: line.to_string(),
    }
}

pub fn append_entry(path: &Path, entry: &LogEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let line = serde_json::to_string(entry)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Most recent `limit` entries, oldest first. Unreadable lines are skipped.
pub fn read_entries(path: &Path, limit: Option<usize>) -> Vec<LogEntry> {
    if !path.exists() {
        return Vec::new();
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    let mut entries: Vec<LogEntry> = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();

    if let Some(limit) = limit {
        let len = entries.len();
        if len > limit {
            entries = entries.split_off(len - limit);
        }
    }

    entries
}
