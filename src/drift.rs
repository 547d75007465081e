// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Drift detection between two snapshots of the same root

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::snapshot::Snapshot;
use crate::{Result, TidyError};

/// Paths that changed between an earlier and a later snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Only in the later snapshot
    pub added: BTreeSet<String>,
    /// Only in the earlier snapshot
    pub removed: BTreeSet<String>,
    /// In both, same kind, different size/mtime/hash
    pub modified: BTreeSet<String>,
}

impl DriftReport {
    /// Diff two snapshots.
    ///
    /// A path whose kind changed (file <-> directory) is reported as both
    /// removed and added. Fails if the snapshots were taken of different
    /// roots or with different depth, since the diff would be meaningless.
    pub fn between(earlier: &Snapshot, later: &Snapshot) -> Result<Self> {
        if earlier.root() != later.root() {
            return Err(TidyError::Config(format!(
                "Cannot compare snapshots of different roots ({:?} vs {:?})",
                earlier.root(),
                later.root()
            )));
        }
        if earlier.depth() != later.depth() {
            return Err(TidyError::Config(format!(
                "Cannot compare snapshots taken with different depth ({:?} vs {:?})",
                earlier.depth(),
                later.depth()
            )));
        }

        let mut report = Self::default();

        for entry in earlier.entries() {
            match later.get(&entry.path) {
                None => {
                    report.removed.insert(entry.path.clone());
                }
                Some(now) if now.kind != entry.kind => {
                    report.removed.insert(entry.path.clone());
                    report.added.insert(entry.path.clone());
                }
                Some(now) if now.integrity != entry.integrity => {
                    report.modified.insert(entry.path.clone());
                }
                Some(_) => {}
            }
        }

        for path in later.paths() {
            if !earlier.contains(path) {
                report.added.insert(path.to_string());
            }
        }

        Ok(report)
    }

    /// True when nothing was added or removed. Modifications alone do not
    /// count as structural drift.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// True if anything at or beneath `path` was added, removed or modified
    pub fn touches_subtree(&self, path: &str) -> bool {
        let prefix = format!("{}/", path);
        self.added
            .iter()
            .chain(&self.removed)
            .chain(&self.modified)
            .any(|p| p.starts_with(&prefix))
    }
}
