// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Irrigo.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Plugin event log.
//!
//! Entries live in a bounded in-memory ring and are appended to the events
//! file. Every append is mirrored to `tracing`.

use anyhow::{Context, Result};
use irrigo_types::{LogEntry, Severity};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Default number of entries kept in memory
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// Upper bound on how much of the events file is read back
pub const MAX_EVENTS_READ: u64 = 256 * 1024;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug)]
pub struct EventLog {
    entries: RwLock<VecDeque<LogEntry>>,
    capacity: usize,
    file: Option<PathBuf>,
    file_lock: Mutex<()>,
}

impl EventLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_CAPACITY))),
            capacity: capacity.max(1),
            file: None,
            file_lock: Mutex::new(()),
        }
    }

    /// Also append every entry to `path`
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    #[must_use]
    pub fn file_path(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn append(&self, plugin: &str, severity: Severity, message: impl Into<String>) {
        let entry = LogEntry::new(plugin, severity, message);
        mirror_to_tracing(&entry);
        self.write_to_file(&entry);

        let mut entries = self.entries.write();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Drop a plugin's in-memory entries. The events file is left alone.
    pub fn clear_plugin(&self, plugin: &str) {
        self.entries.write().retain(|e| e.plugin != plugin);
    }

    /// Entries of one plugin, oldest first
    #[must_use]
    pub fn entries_for(&self, plugin: &str) -> Vec<LogEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.plugin == plugin)
            .cloned()
            .collect()
    }

    /// The newest `limit` entries across all plugins, newest first
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.entries.read().iter().rev().take(limit).cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove the events file. Returns false when there was nothing to delete.
    pub fn delete_file(&self) -> Result<bool> {
        let Some(path) = &self.file else {
            return Ok(false);
        };
        let _guard = self.file_lock.lock();
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)
            .with_context(|| format!("Failed to delete events file {}", path.display()))?;
        Ok(true)
    }

    fn write_to_file(&self, entry: &LogEntry) {
        let Some(path) = &self.file else {
            return;
        };

        let _guard = self.file_lock.lock();
        if let Err(e) = append_line(path, &format_entry(entry)) {
            warn!("Failed to append to events file {}: {e:#}", path.display());
        }
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

fn mirror_to_tracing(entry: &LogEntry) {
    let plugin = entry.plugin.as_str();
    let message = entry.message.as_str();
    match entry.severity {
        Severity::Debug => debug!(plugin = %plugin, "{message}"),
        Severity::Info => info!(plugin = %plugin, "{message}"),
        Severity::Warning => warn!(plugin = %plugin, "{message}"),
        Severity::Error => error!(plugin = %plugin, "{message}"),
    }
}

fn append_line(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Render an entry the way it is stored in the events file.
///
/// The first line carries the header; further message lines are indented.
#[must_use]
pub fn format_entry(entry: &LogEntry) -> String {
    let mut lines = entry.message.lines();
    let first = lines.next().unwrap_or_default();
    let mut out = format!(
        "{} {} [{}] {}\n",
        entry.timestamp.format(TIMESTAMP_FORMAT),
        entry.severity,
        entry.plugin,
        first
    );
    for line in lines {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// One record read back from the events file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub severity: Option<Severity>,
    pub text: String,
}

/// Read the events file, newest record first.
///
/// Returns `Ok(None)` when the file does not exist. Lines that do not start
/// a record are attached to the record above them.
///
/// Only the last [`MAX_EVENTS_READ`] bytes are read, so a large file shows
/// its newest records.
pub fn read_events_file(path: &Path) -> Result<Option<Vec<FileEvent>>> {
    read_events_tail(path, MAX_EVENTS_READ)
}

fn read_events_tail(path: &Path, max_bytes: u64) -> Result<Option<Vec<FileEvent>>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open events file {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat events file {}", path.display()))?
        .len();
    let skip = len.saturating_sub(max_bytes);
    file.seek(SeekFrom::Start(skip))
        .with_context(|| format!("Failed to seek events file {}", path.display()))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .with_context(|| format!("Failed to read events file {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);

    // Drop the partial line the seek landed in
    let contents = if skip > 0 {
        text.split_once('\n').map_or("", |(_, rest)| rest)
    } else {
        text.as_ref()
    };
    Ok(Some(parse_events(contents)))
}

fn parse_events(contents: &str) -> Vec<FileEvent> {
    let mut events: Vec<FileEvent> = Vec::new();
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let continuation = line.starts_with(char::is_whitespace);
        match events.last_mut() {
            Some(last) if continuation => {
                last.text.push('\n');
                last.text.push_str(line.trim_start());
            }
            _ => events.push(FileEvent {
                severity: header_severity(line),
                text: line.to_owned(),
            }),
        }
    }
    events.reverse();
    events
}

/// `YYYY-MM-DD HH:MM:SS LEVEL [plugin] ...` -> LEVEL
fn header_severity(line: &str) -> Option<Severity> {
    line.split_whitespace().nth(2).and_then(Severity::parse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_capacity_drops_oldest() {
        let log = EventLog::new(2);
        log.append("a", Severity::Info, "one");
        log.append("a", Severity::Info, "two");
        log.append("a", Severity::Info, "three");

        let entries = log.entries_for("a");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "two");
        assert_eq!(log.recent(1)[0].message, "three");
    }

    #[test]
    fn test_clear_plugin_keeps_others() {
        let log = EventLog::default();
        log.append("a", Severity::Info, "mine");
        log.append("b", Severity::Error, "theirs");

        log.clear_plugin("a");

        assert!(log.entries_for("a").is_empty());
        assert_eq!(log.entries_for("b").len(), 1);
    }

    #[test]
    fn test_file_roundtrip_newest_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs/events.log");
        let log = EventLog::default().with_file(&path);

        log.append("Email Notifications", Severity::Info, "Email was sent:\nHello");
        log.append("System Update", Severity::Error, "git failed");

        let events = read_events_file(&path).unwrap().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].severity, Some(Severity::Error));
        assert!(events[0].text.ends_with("[System Update] git failed"));
        assert_eq!(events[1].severity, Some(Severity::Info));
        assert!(events[1].text.ends_with("Email was sent:\nHello"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(read_events_file(&dir.path().join("none.log")).unwrap().is_none());

        let log = EventLog::default().with_file(dir.path().join("none.log"));
        assert!(!log.delete_file().unwrap());
    }

    #[test]
    fn test_delete_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        let log = EventLog::default().with_file(&path);
        log.append("x", Severity::Warning, "w");

        assert!(log.delete_file().unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_large_file_reads_newest_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        let log = EventLog::default().with_file(&path);
        for n in 0..50 {
            log.append("Rain", Severity::Info, format!("event {n}"));
        }

        let events = read_events_tail(&path, 200).unwrap().unwrap();

        assert!(!events.is_empty());
        assert!(events.len() < 50);
        assert!(events[0].text.ends_with("event 49"));
        assert!(events.iter().all(|e| e.severity == Some(Severity::Info)));
    }

    #[test]
    fn test_parse_orphan_continuation() {
        let events = parse_events("  stray\n2025-01-01 00:00:00 DEBUG [x] hi\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].severity, Some(Severity::Debug));
        assert_eq!(events[1].severity, None);
    }
}
