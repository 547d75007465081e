// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Move journal for undo support
//!
//! Written by the CLI after a run, never read by the engine. It is an undo
//! aid, not a transaction log: entries are appended only for moves that
//! were applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::fs_ops;
use crate::report::Report;
use crate::Result;

/// A single applied move
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub root: PathBuf,
    pub source: String,
    pub destination: String,
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default)]
    pub undone: bool,
}

/// Outcome of undoing one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    Restored,
    WouldRestore,
    Failed(String),
}

/// History manager for tracking applied moves
pub struct History {
    path: PathBuf,
}

impl History {
    /// Create a new history manager
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append an entry to the history
    pub fn append(&self, entry: &HistoryEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }

    /// Append every applied move of a report, returning how many were written
    pub fn record_report(&self, report: &Report) -> Result<usize> {
        let mut written = 0;
        for record in report.applied() {
            let op = &record.validated.operation;
            self.append(&HistoryEntry {
                id: Uuid::new_v4(),
                run_id: report.run_id,
                timestamp: report.finished_at,
                root: report.root.clone(),
                source: op.source.clone(),
                destination: op.destination.clone(),
                strategy: report.strategy.clone(),
                rationale: op.rationale.clone(),
                undone: false,
            })?;
            written += 1;
        }
        Ok(written)
    }

    /// Read all history entries
    pub fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!("Failed to parse history entry: {}", e);
                }
            }
        }

        Ok(entries)
    }

    /// Get the most recent N entries (newest first)
    pub fn get_recent(&self, count: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.read_all()?;
        entries.reverse();
        entries.truncate(count);
        Ok(entries)
    }

    /// Mark entries as undone
    pub fn mark_undone(&self, ids: &[Uuid]) -> Result<()> {
        let entries = self.read_all()?;

        // Rewrite the entire file with the updated entries
        let file = File::create(&self.path)?;
        let mut writer = std::io::BufWriter::new(file);

        for mut entry in entries {
            if ids.contains(&entry.id) {
                entry.undone = true;
            }
            let json = serde_json::to_string(&entry)?;
            writeln!(writer, "{}", json)?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Get entries that haven't been undone
    pub fn get_undoable(&self) -> Result<Vec<HistoryEntry>> {
        let entries = self.read_all()?;
        Ok(entries.into_iter().filter(|e| !e.undone).collect())
    }

    /// Reverse the `count` most recent moves, newest first.
    ///
    /// Uses the same non-clobbering move as the executor, so an entry whose
    /// original location has been reoccupied fails instead of overwriting.
    pub fn undo(&self, count: usize, dry_run: bool) -> Result<Vec<(HistoryEntry, UndoOutcome)>> {
        let entries = self.get_undoable()?;
        let to_undo: Vec<_> = entries.into_iter().rev().take(count).collect();

        let mut outcomes = Vec::with_capacity(to_undo.len());
        let mut restored = Vec::new();

        for entry in to_undo {
            let outcome = if dry_run {
                UndoOutcome::WouldRestore
            } else {
                match fs_ops::move_no_clobber(&entry.root, &entry.destination, &entry.source) {
                    Ok(()) => {
                        restored.push(entry.id);
                        UndoOutcome::Restored
                    }
                    Err(e) => UndoOutcome::Failed(e.to_string()),
                }
            };
            outcomes.push((entry, outcome));
        }

        if !restored.is_empty() {
            self.mark_undone(&restored)?;
        }

        Ok(outcomes)
    }

    /// Clear all history
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Get history file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(root: &Path, source: &str, destination: &str) -> HistoryEntry {
        HistoryEntry {
            id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            root: root.to_path_buf(),
            source: source.to_string(),
            destination: destination.to_string(),
            strategy: "by_type".to_string(),
            rationale: None,
            undone: false,
        }
    }

    #[test]
    fn test_append_and_recent() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path().join("h.jsonl"));
        history.append(&entry(dir.path(), "a", "x/a")).unwrap();
        history.append(&entry(dir.path(), "b", "x/b")).unwrap();

        let recent = history.get_recent(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].source, "b");
    }

    #[test]
    fn test_undo_restores_and_marks() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("x")).unwrap();
        fs::write(root.join("x/a.txt"), "a").unwrap();

        let history = History::new(dir.path().join("h.jsonl"));
        history.append(&entry(&root, "a.txt", "x/a.txt")).unwrap();

        let dry = history.undo(1, true).unwrap();
        assert_eq!(dry[0].1, UndoOutcome::WouldRestore);
        assert!(root.join("x/a.txt").exists());

        let done = history.undo(1, false).unwrap();
        assert_eq!(done[0].1, UndoOutcome::Restored);
        assert!(root.join("a.txt").exists());
        assert!(history.get_undoable().unwrap().is_empty());
    }

    #[test]
    fn test_undo_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "new occupant").unwrap();
        fs::write(dir.path().join("moved.txt"), "original").unwrap();

        let history = History::new(dir.path().join("h.jsonl"));
        history.append(&entry(dir.path(), "a.txt", "moved.txt")).unwrap();

        let outcomes = history.undo(1, false).unwrap();
        assert!(matches!(outcomes[0].1, UndoOutcome::Failed(_)));
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "new occupant");
        assert_eq!(history.get_undoable().unwrap().len(), 1);
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path().join("h.jsonl"));
        history.append(&entry(dir.path(), "a", "b")).unwrap();
        history.clear().unwrap();
        assert!(history.read_all().unwrap().is_empty());
        assert!(!history.path().exists());
    }
}
