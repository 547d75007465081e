// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Reconciles a plan against the tree as it is right before execution
//!
//! Validation walks the plan in order over a simulated namespace seeded
//! from the fresh snapshot. Every operation judged applicable updates the
//! simulation (source subtree vacated, destination subtree occupied), so
//! later operations see the effect of earlier ones: a plan may move
//! `b -> c` and then `a -> b`, or `a -> b` and then `b -> c`.
//!
//! When in doubt an operation is skipped. The executor's non-clobbering
//! move is the final guard; this pass exists so that skips are reported
//! with a reason instead of surfacing as failures.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::drift::DriftReport;
use crate::plan::{ancestors, MoveOperation, Plan};
use crate::snapshot::{EntryKind, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Applicable,
    SkippedSourceMissing,
    SkippedDestinationConflict,
    SkippedUnrelatedDrift,
}

impl Disposition {
    pub fn is_applicable(self) -> bool {
        self == Self::Applicable
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Applicable => "applicable",
            Self::SkippedSourceMissing => "source missing",
            Self::SkippedDestinationConflict => "destination conflict",
            Self::SkippedUnrelatedDrift => "drift",
        }
    }
}

/// A plan operation with the validator's verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedOperation {
    /// Position in the plan, starting at 0
    pub index: usize,
    pub operation: MoveOperation,
    pub disposition: Disposition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorOptions {
    /// Skip sources whose content (or, for directories, whose subtree)
    /// changed since the plan was made
    pub skip_drifted_sources: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            skip_drifted_sources: true,
        }
    }
}

/// Output of a validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub operations: Vec<ValidatedOperation>,
    /// Added paths that no applicable operation accounts for
    pub unplanned_arrivals: Vec<String>,
}

impl Validation {
    pub fn applicable(&self) -> impl Iterator<Item = &ValidatedOperation> {
        self.operations.iter().filter(|v| v.disposition.is_applicable())
    }
}

/// Validate `plan` (made from `before`) against the fresh snapshot `after`
pub fn validate(
    plan: &Plan,
    before: &Snapshot,
    after: &Snapshot,
    drift: &DriftReport,
    options: ValidatorOptions,
) -> Validation {
    let mut namespace = Namespace::from_snapshot(after);
    let mut operations = Vec::with_capacity(plan.operations.len());

    for (index, op) in plan.operations.iter().enumerate() {
        let (disposition, detail) = judge(op, before, drift, &namespace, options);

        if disposition.is_applicable() {
            namespace.apply(&op.source, &op.destination);
        } else {
            debug!(
                "Skipping {} -> {}: {}",
                op.source,
                op.destination,
                detail.as_deref().unwrap_or(disposition.label())
            );
        }

        operations.push(ValidatedOperation {
            index,
            operation: op.clone(),
            disposition,
            detail,
        });
    }

    let claimed: HashSet<&str> = operations
        .iter()
        .filter(|v| v.disposition.is_applicable())
        .map(|v| v.operation.destination.as_str())
        .collect();
    let unplanned_arrivals = drift
        .added
        .iter()
        .filter(|p| !claimed.contains(p.as_str()))
        .cloned()
        .collect();

    Validation {
        operations,
        unplanned_arrivals,
    }
}

/// Mark every operation as skipped because of drift
pub fn skip_all(plan: &Plan, drift: &DriftReport, reason: &str) -> Validation {
    let operations = plan
        .operations
        .iter()
        .enumerate()
        .map(|(index, op)| ValidatedOperation {
            index,
            operation: op.clone(),
            disposition: Disposition::SkippedUnrelatedDrift,
            detail: Some(reason.to_string()),
        })
        .collect();

    Validation {
        operations,
        unplanned_arrivals: drift.added.iter().cloned().collect(),
    }
}

fn judge(
    op: &MoveOperation,
    before: &Snapshot,
    drift: &DriftReport,
    namespace: &Namespace,
    options: ValidatorOptions,
) -> (Disposition, Option<String>) {
    if drift.removed.contains(&op.source) {
        let detail = if drift.added.contains(&op.source) {
            "source changed type since planning"
        } else {
            "source removed since planning"
        };
        return (Disposition::SkippedSourceMissing, Some(detail.to_string()));
    }

    if !namespace.contains(&op.source) {
        let detail = if before.contains(&op.source) {
            "source already moved by an earlier operation"
        } else {
            "source was never in the listing"
        };
        return (Disposition::SkippedSourceMissing, Some(detail.to_string()));
    }

    if namespace.contains(&op.destination) {
        return (
            Disposition::SkippedDestinationConflict,
            Some(format!("'{}' already exists", op.destination)),
        );
    }

    if let Some(blocker) = ancestors(&op.destination).find(|a| namespace.is_non_directory(a)) {
        return (
            Disposition::SkippedDestinationConflict,
            Some(format!("'{}' exists and is not a directory", blocker)),
        );
    }

    if options.skip_drifted_sources {
        if drift.modified.contains(&op.source) {
            return (
                Disposition::SkippedUnrelatedDrift,
                Some("source modified since planning".to_string()),
            );
        }
        if drift.touches_subtree(&op.source) {
            return (
                Disposition::SkippedUnrelatedDrift,
                Some("contents of source directory changed since planning".to_string()),
            );
        }
    }

    (Disposition::Applicable, None)
}

/// Path -> kind view of the tree as it will look after the applicable
/// operations seen so far
struct Namespace {
    entries: BTreeMap<String, EntryKind>,
}

impl Namespace {
    fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            entries: snapshot
                .entries()
                .map(|e| (e.path.clone(), e.kind))
                .collect(),
        }
    }

    fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    fn is_non_directory(&self, path: &str) -> bool {
        matches!(self.entries.get(path), Some(kind) if *kind != EntryKind::Directory)
    }

    /// Keys equal to `path` or beneath it. Prefix ranges are contiguous in
    /// a BTreeMap.
    fn subtree(&self, path: &str) -> Vec<(String, EntryKind)> {
        let prefix = format!("{}/", path);
        let mut found: Vec<(String, EntryKind)> = self
            .entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        if let Some(kind) = self.entries.get(path) {
            found.push((path.to_string(), *kind));
        }
        found
    }

    fn apply(&mut self, source: &str, destination: &str) {
        let moved = self.subtree(source);
        for (path, _) in &moved {
            self.entries.remove(path);
        }

        for ancestor in ancestors(destination) {
            self.entries
                .entry(ancestor.to_string())
                .or_insert(EntryKind::Directory);
        }

        for (path, kind) in moved {
            let relocated = format!("{}{}", destination, &path[source.len()..]);
            self.entries.insert(relocated, kind);
        }
    }
}
