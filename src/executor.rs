// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Applies validated operations to disk, one at a time

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::fs_ops;
use crate::validator::ValidatedOperation;

/// What happened to one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Applied,
    Failed { reason: String },
    NotAttempted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub validated: ValidatedOperation,
    pub outcome: ExecutionOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutorOptions {
    /// Record what would happen without touching the disk
    pub dry_run: bool,
    /// Remove directories emptied by the moves
    pub prune_empty_dirs: bool,
}

/// Cooperative cancellation, checked before each move
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Result of one execution pass
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub records: Vec<ExecutionRecord>,
    pub pruned_dirs: Vec<String>,
    pub cancelled: bool,
}

/// Sequential executor for a validated plan
pub struct Executor<'a> {
    root: &'a Path,
    options: ExecutorOptions,
    cancel: CancelSignal,
}

impl<'a> Executor<'a> {
    pub fn new(root: &'a Path, options: ExecutorOptions, cancel: CancelSignal) -> Self {
        Self {
            root,
            options,
            cancel,
        }
    }

    /// Attempt every applicable operation in order.
    ///
    /// A failing move is recorded and the batch continues. Nothing is
    /// retried. Once cancellation is observed, the remaining applicable
    /// operations are recorded as not attempted.
    pub fn run(&self, operations: Vec<ValidatedOperation>) -> Execution {
        let mut records = Vec::with_capacity(operations.len());
        let mut vacated = Vec::new();
        let mut cancelled = false;

        for validated in operations {
            if !validated.disposition.is_applicable() {
                records.push(ExecutionRecord {
                    validated,
                    outcome: ExecutionOutcome::NotAttempted { reason: None },
                });
                continue;
            }

            if !cancelled && self.cancel.is_cancelled() {
                warn!("Cancellation requested, stopping before {}", validated.operation.source);
                cancelled = true;
            }

            let outcome = if cancelled {
                ExecutionOutcome::NotAttempted {
                    reason: Some("cancelled".to_string()),
                }
            } else if self.options.dry_run {
                info!(
                    "DRY RUN: Would move {} -> {}",
                    validated.operation.source, validated.operation.destination
                );
                ExecutionOutcome::NotAttempted {
                    reason: Some("dry run".to_string()),
                }
            } else {
                let op = &validated.operation;
                match fs_ops::move_no_clobber(self.root, &op.source, &op.destination) {
                    Ok(()) => {
                        info!("Moved {} -> {}", op.source, op.destination);
                        vacated.push(op.source.clone());
                        ExecutionOutcome::Applied
                    }
                    Err(e) => {
                        warn!("Failed to move {} -> {}: {}", op.source, op.destination, e);
                        ExecutionOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                }
            };

            records.push(ExecutionRecord { validated, outcome });
        }

        let pruned_dirs = if self.options.prune_empty_dirs && !vacated.is_empty() {
            fs_ops::prune_empty_dirs(self.root, vacated.iter().map(String::as_str))
        } else {
            Vec::new()
        };

        Execution {
            records,
            pruned_dirs,
            cancelled,
        }
    }
}
