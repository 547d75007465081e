// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! One run over one root: snapshot, plan, re-snapshot, validate, execute

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::drift::DriftReport;
use crate::executor::{CancelSignal, Executor, ExecutorOptions};
use crate::plan::Plan;
use crate::planner::Planner;
use crate::report::{Report, RunParts};
use crate::snapshot::{ScanOptions, Snapshot};
use crate::validator::{self, ValidatorOptions};
use crate::{Result, TidyError};

/// What to do when the tree changed between planning and execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftPolicy {
    /// Execute what still validates and report the drift
    #[default]
    Report,
    /// Execute nothing if anything was added or removed
    Abort,
    /// Ask the planner again using the fresh snapshot
    Replan,
}

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub scan: ScanOptions,
    pub drift_policy: DriftPolicy,
    pub max_replans: u32,
    /// Drop strategies that would rename files instead of only warning
    pub reject_file_renames: bool,
    pub validator: ValidatorOptions,
    pub executor: ExecutorOptions,
}

/// Which proposed strategy to apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategySelection {
    First,
    /// Zero-based
    Index(usize),
    Name(String),
}

impl StrategySelection {
    /// Parse user input: a 1-based number or a strategy name
    pub fn parse(input: &str) -> Self {
        match input.trim().parse::<usize>() {
            Ok(n) if n > 0 => Self::Index(n - 1),
            _ => Self::Name(input.trim().to_string()),
        }
    }

    fn pick<'a>(&self, strategies: &'a [Plan]) -> Result<&'a Plan> {
        let found = match self {
            Self::First => strategies.first(),
            Self::Index(i) => strategies.get(*i),
            Self::Name(name) => strategies.iter().find(|p| &p.strategy == name),
        };
        found.ok_or_else(|| {
            TidyError::Config(format!(
                "No strategy matches {:?} ({} proposed)",
                self,
                strategies.len()
            ))
        })
    }
}

/// Result of the planning phase
#[derive(Debug, Clone)]
pub struct PlanningRound {
    pub run_id: Uuid,
    pub root: PathBuf,
    pub started_at: chrono::DateTime<Utc>,
    pub snapshot: Snapshot,
    pub strategies: Vec<Plan>,
}

/// Plan evaluation and execution engine
pub struct Engine {
    options: EngineOptions,
    planner: Arc<dyn Planner>,
}

impl Engine {
    pub fn new(options: EngineOptions, planner: Arc<dyn Planner>) -> Self {
        Self { options, planner }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Snapshot the root and ask the planner for strategies.
    ///
    /// The planner's answer is ingested in full before returning; a
    /// malformed answer fails the whole round.
    pub async fn plan(&self, root: &Path) -> Result<PlanningRound> {
        let started_at = Utc::now();
        // Absolute, so the history journal can be replayed from anywhere
        let root = root.canonicalize().map_err(|e| TidyError::access(root, e))?;
        let snapshot = Snapshot::capture(&root, &self.options.scan)?;
        info!("Captured {} entries under {:?}", snapshot.len(), root);

        let strategies = self.propose(&snapshot).await?;

        Ok(PlanningRound {
            run_id: Uuid::new_v4(),
            root,
            started_at,
            snapshot,
            strategies,
        })
    }

    async fn propose(&self, snapshot: &Snapshot) -> Result<Vec<Plan>> {
        info!("Requesting strategies from planner '{}'", self.planner.name());
        let raw = self.planner.propose(snapshot).await?;
        let mut strategies = Plan::ingest(raw)?;

        for plan in &strategies {
            let renamed = plan.renamed_files(snapshot);
            if let Some(first) = renamed.first() {
                warn!(
                    "Strategy '{}' renames {} file(s), first {} -> {}",
                    plan.strategy,
                    renamed.len(),
                    first.source,
                    first.destination
                );
            }
        }

        if self.options.reject_file_renames {
            strategies.retain(|p| p.renamed_files(snapshot).is_empty());
        }
        if strategies.is_empty() {
            return Err(TidyError::MalformedPlan(
                "every proposed strategy renames files".to_string(),
            ));
        }

        info!("Planner proposed {} usable strategies", strategies.len());
        Ok(strategies)
    }

    /// Re-check the tree, reconcile the selected strategy and apply it
    pub async fn apply(
        &self,
        round: PlanningRound,
        selection: &StrategySelection,
        cancel: CancelSignal,
    ) -> Result<Report> {
        let PlanningRound {
            run_id,
            root,
            started_at,
            mut snapshot,
            mut strategies,
        } = round;

        let mut plan = selection.pick(&strategies)?.clone();
        let mut after = Snapshot::capture(&root, &self.options.scan)?;
        let mut drift = DriftReport::between(&snapshot, &after)?;
        let mut replans = 0;

        while !drift.is_empty()
            && self.options.drift_policy == DriftPolicy::Replan
            && replans < self.options.max_replans
        {
            replans += 1;
            warn!(
                "Tree changed since planning ({} added, {} removed), re-planning ({}/{})",
                drift.added.len(),
                drift.removed.len(),
                replans,
                self.options.max_replans
            );

            snapshot = after;
            strategies = self.propose(&snapshot).await?;
            plan = match strategies.iter().find(|p| p.strategy == plan.strategy) {
                Some(same) => same.clone(),
                None => {
                    warn!("Strategy '{}' not proposed again, using the first one", plan.strategy);
                    StrategySelection::First.pick(&strategies)?.clone()
                }
            };

            after = Snapshot::capture(&root, &self.options.scan)?;
            drift = DriftReport::between(&snapshot, &after)?;
        }

        if !drift.is_empty() {
            info!(
                "Drift since planning: {} added, {} removed",
                drift.added.len(),
                drift.removed.len()
            );
        }

        let validation = if !drift.is_empty() && self.options.drift_policy == DriftPolicy::Abort {
            warn!("Tree changed since planning, skipping every operation");
            validator::skip_all(&plan, &drift, "tree changed since planning")
        } else {
            validator::validate(&plan, &snapshot, &after, &drift, self.options.validator)
        };

        let applicable = validation.applicable().count();
        info!(
            "Strategy '{}': {} of {} operations applicable",
            plan.strategy,
            applicable,
            plan.len()
        );

        let executor = Executor::new(&root, self.options.executor, cancel);
        let execution = executor.run(validation.operations.clone());

        Ok(Report::assemble(RunParts {
            run_id,
            root,
            strategy: plan.strategy,
            started_at,
            before: snapshot,
            after,
            drift,
            validation,
            execution,
            replans,
            dry_run: self.options.executor.dry_run,
        }))
    }

    /// Plan and apply without interaction
    pub async fn run(
        &self,
        root: &Path,
        selection: &StrategySelection,
        cancel: CancelSignal,
    ) -> Result<Report> {
        let round = self.plan(root).await?;
        self.apply(round, selection, cancel).await
    }
}
