// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! The terminal artifact of one run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::drift::DriftReport;
use crate::executor::{Execution, ExecutionOutcome, ExecutionRecord};
use crate::snapshot::Snapshot;
use crate::validator::{Disposition, Validation};

/// Everything one run saw and did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub run_id: Uuid,
    pub root: PathBuf,
    pub strategy: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Snapshot the plan was made from
    pub before: Snapshot,
    /// Snapshot the plan was validated against
    pub after: Snapshot,
    pub drift: DriftReport,
    pub records: Vec<ExecutionRecord>,
    pub unplanned_arrivals: Vec<String>,
    pub pruned_dirs: Vec<String>,
    pub replans: u32,
    pub cancelled: bool,
    pub dry_run: bool,
}

/// Counts derived from a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub applied: usize,
    pub failed: usize,
    pub not_attempted: usize,
    pub skipped_source_missing: usize,
    pub skipped_destination_conflict: usize,
    pub skipped_drift: usize,
}

/// Inputs gathered over a run, consumed by [`Report::assemble`]
pub struct RunParts {
    pub run_id: Uuid,
    pub root: PathBuf,
    pub strategy: String,
    pub started_at: DateTime<Utc>,
    pub before: Snapshot,
    pub after: Snapshot,
    pub drift: DriftReport,
    pub validation: Validation,
    pub execution: Execution,
    pub replans: u32,
    pub dry_run: bool,
}

impl Summary {
    /// Operations the validator refused
    pub fn skipped(&self) -> usize {
        self.skipped_source_missing + self.skipped_destination_conflict + self.skipped_drift
    }
}

impl Report {
    pub fn assemble(parts: RunParts) -> Self {
        Self {
            run_id: parts.run_id,
            root: parts.root,
            strategy: parts.strategy,
            started_at: parts.started_at,
            finished_at: Utc::now(),
            before: parts.before,
            after: parts.after,
            drift: parts.drift,
            records: parts.execution.records,
            unplanned_arrivals: parts.validation.unplanned_arrivals,
            pruned_dirs: parts.execution.pruned_dirs,
            replans: parts.replans,
            cancelled: parts.execution.cancelled,
            dry_run: parts.dry_run,
        }
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            total: self.records.len(),
            ..Default::default()
        };

        for record in &self.records {
            match record.outcome {
                ExecutionOutcome::Applied => summary.applied += 1,
                ExecutionOutcome::Failed { .. } => summary.failed += 1,
                ExecutionOutcome::NotAttempted { .. } => summary.not_attempted += 1,
            }
            match record.validated.disposition {
                Disposition::Applicable => {}
                Disposition::SkippedSourceMissing => summary.skipped_source_missing += 1,
                Disposition::SkippedDestinationConflict => {
                    summary.skipped_destination_conflict += 1
                }
                Disposition::SkippedUnrelatedDrift => summary.skipped_drift += 1,
            }
        }

        summary
    }

    pub fn has_failures(&self) -> bool {
        self.records
            .iter()
            .any(|r| matches!(r.outcome, ExecutionOutcome::Failed { .. }))
    }

    /// Records of moves that actually happened, in order
    pub fn applied(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records
            .iter()
            .filter(|r| r.outcome == ExecutionOutcome::Applied)
    }

    pub fn record_for(&self, source: &str) -> Option<&ExecutionRecord> {
        self.records
            .iter()
            .find(|r| r.validated.operation.source == source)
    }
}
