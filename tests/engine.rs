// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! End-to-end runs against real temporary directories

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tidyfs::engine::{DriftPolicy, Engine, EngineOptions, StrategySelection};
use tidyfs::executor::{CancelSignal, ExecutionOutcome, ExecutorOptions};
use tidyfs::history::{History, UndoOutcome};
use tidyfs::plan::{RawMove, RawPlanResponse, RawStrategy};
use tidyfs::planner::StaticPlanner;
use tidyfs::validator::Disposition;
use tidyfs::TidyError;

fn response(moves: &[(&str, &str)]) -> RawPlanResponse {
    RawPlanResponse {
        strategies: vec![RawStrategy {
            name: Some("test".to_string()),
            description: None,
            moves: moves
                .iter()
                .map(|(s, d)| RawMove {
                    source: Some(s.to_string()),
                    destination: Some(d.to_string()),
                    rationale: None,
                })
                .collect(),
        }],
    }
}

fn engine(moves: &[(&str, &str)], options: EngineOptions) -> Engine {
    Engine::new(options, Arc::new(StaticPlanner::new(response(moves))))
}

fn options() -> EngineOptions {
    EngineOptions {
        executor: ExecutorOptions {
            dry_run: false,
            prune_empty_dirs: true,
        },
        ..Default::default()
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn rejecting_renames() -> EngineOptions {
    EngineOptions {
        reject_file_renames: true,
        ..options()
    }
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

#[tokio::test]
async fn test_move_applied_without_drift() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");

    let engine = engine(&[("a.txt", "docs/a.txt")], options());
    let report = engine
        .run(dir.path(), &StrategySelection::First, CancelSignal::never())
        .await
        .unwrap();

    assert!(report.drift.is_empty());
    assert!(report.drift.modified.is_empty());
    assert_eq!(report.summary().applied, 1);
    assert!(!dir.path().join("a.txt").exists());
    assert_eq!(read(dir.path(), "docs/a.txt"), "alpha");
    assert!(!report.has_failures());
}

#[tokio::test]
async fn test_existing_destination_is_never_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");
    write(dir.path(), "b.txt", "bravo");

    let engine = engine(&[("a.txt", "b.txt")], options());
    let report = engine
        .run(dir.path(), &StrategySelection::First, CancelSignal::never())
        .await
        .unwrap();

    let record = report.record_for("a.txt").unwrap();
    assert_eq!(record.validated.disposition, Disposition::SkippedDestinationConflict);
    assert_eq!(record.outcome, ExecutionOutcome::NotAttempted { reason: None });
    assert_eq!(read(dir.path(), "a.txt"), "alpha");
    assert_eq!(read(dir.path(), "b.txt"), "bravo");
}

#[tokio::test]
async fn test_source_deleted_after_planning() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");
    write(dir.path(), "deleted.txt", "gone soon");

    let engine = engine(
        &[("a.txt", "docs/a.txt"), ("deleted.txt", "docs/deleted.txt")],
        options(),
    );
    let round = engine.plan(dir.path()).await.unwrap();

    fs::remove_file(dir.path().join("deleted.txt")).unwrap();

    let report = engine
        .apply(round, &StrategySelection::First, CancelSignal::never())
        .await
        .unwrap();

    assert!(report.drift.removed.contains("deleted.txt"));
    assert_eq!(
        report.record_for("a.txt").unwrap().outcome,
        ExecutionOutcome::Applied
    );
    let skipped = report.record_for("deleted.txt").unwrap();
    assert_eq!(skipped.validated.disposition, Disposition::SkippedSourceMissing);
    assert!(matches!(skipped.outcome, ExecutionOutcome::NotAttempted { .. }));
    assert!(!dir.path().join("docs/deleted.txt").exists());
    assert_eq!(report.summary().skipped_source_missing, 1);
}

#[tokio::test]
async fn test_unplanned_arrival_is_reported_and_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");

    let engine = engine(&[("a.txt", "docs/a.txt")], options());
    let round = engine.plan(dir.path()).await.unwrap();

    write(dir.path(), "c.txt", "charlie");

    let report = engine
        .apply(round, &StrategySelection::First, CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.unplanned_arrivals, vec!["c.txt".to_string()]);
    assert_eq!(report.summary().applied, 1);
    assert_eq!(read(dir.path(), "c.txt"), "charlie");
    assert_eq!(read(dir.path(), "docs/a.txt"), "alpha");
}

#[tokio::test]
async fn test_destination_created_after_planning() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");

    let engine = engine(&[("a.txt", "b.txt")], options());
    let round = engine.plan(dir.path()).await.unwrap();

    write(dir.path(), "b.txt", "newcomer");

    let report = engine
        .apply(round, &StrategySelection::First, CancelSignal::never())
        .await
        .unwrap();

    let record = report.record_for("a.txt").unwrap();
    assert_eq!(record.validated.disposition, Disposition::SkippedDestinationConflict);
    assert_eq!(read(dir.path(), "a.txt"), "alpha");
    assert_eq!(read(dir.path(), "b.txt"), "newcomer");
    assert_eq!(report.unplanned_arrivals, vec!["b.txt".to_string()]);
}

#[tokio::test]
async fn test_chained_moves() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");

    let engine = engine(&[("a.txt", "b.txt"), ("b.txt", "c.txt")], options());
    let report = engine
        .run(dir.path(), &StrategySelection::First, CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.summary().applied, 2);
    assert!(!dir.path().join("a.txt").exists());
    assert!(!dir.path().join("b.txt").exists());
    assert_eq!(read(dir.path(), "c.txt"), "alpha");
}

#[tokio::test]
async fn test_vacated_destination_is_reusable() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");
    write(dir.path(), "b.txt", "bravo");

    let engine = engine(&[("b.txt", "c.txt"), ("a.txt", "b.txt")], options());
    let report = engine
        .run(dir.path(), &StrategySelection::First, CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.summary().applied, 2);
    assert_eq!(read(dir.path(), "b.txt"), "alpha");
    assert_eq!(read(dir.path(), "c.txt"), "bravo");
}

#[tokio::test]
async fn test_abort_policy_skips_everything_on_drift() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");

    let engine = engine(
        &[("a.txt", "docs/a.txt")],
        EngineOptions {
            drift_policy: DriftPolicy::Abort,
            ..options()
        },
    );
    let round = engine.plan(dir.path()).await.unwrap();
    write(dir.path(), "c.txt", "charlie");

    let report = engine
        .apply(round, &StrategySelection::First, CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.summary().applied, 0);
    assert_eq!(report.summary().skipped_drift, 1);
    assert_eq!(read(dir.path(), "a.txt"), "alpha");
}

#[tokio::test]
async fn test_replan_policy_plans_again() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");

    let engine = engine(
        &[("a.txt", "docs/a.txt")],
        EngineOptions {
            drift_policy: DriftPolicy::Replan,
            max_replans: 1,
            ..options()
        },
    );
    let round = engine.plan(dir.path()).await.unwrap();
    write(dir.path(), "c.txt", "charlie");

    let report = engine
        .apply(round, &StrategySelection::First, CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.replans, 1);
    assert!(report.drift.is_empty());
    assert!(report.before.contains("c.txt"));
    assert_eq!(report.summary().applied, 1);
}

#[tokio::test]
async fn test_malformed_plan_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");

    let engine = engine(&[("a.txt", "docs/a.txt"), ("a.txt", "../escape.txt")], options());
    let err = engine
        .run(dir.path(), &StrategySelection::First, CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, TidyError::MalformedPlan(_)));
    assert!(err.is_preflight());
    assert_eq!(read(dir.path(), "a.txt"), "alpha");
    assert!(!dir.path().join("docs").exists());
}

#[tokio::test]
async fn test_missing_root_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&[("a.txt", "b.txt")], options());

    let err = engine
        .run(&dir.path().join("nope"), &StrategySelection::First, CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, TidyError::Access { .. }));
}

#[tokio::test]
async fn test_dry_run_moves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");

    let mut opts = options();
    opts.executor.dry_run = true;
    let engine = engine(&[("a.txt", "docs/a.txt")], opts);
    let report = engine
        .run(dir.path(), &StrategySelection::First, CancelSignal::never())
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(
        report.record_for("a.txt").unwrap().outcome,
        ExecutionOutcome::NotAttempted {
            reason: Some("dry run".to_string())
        }
    );
    assert!(dir.path().join("a.txt").exists());
}

#[tokio::test]
async fn test_cancelled_run_attempts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");
    write(dir.path(), "b.txt", "bravo");

    let (tx, rx) = tokio::sync::watch::channel(false);
    tx.send(true).unwrap();

    let engine = engine(&[("a.txt", "x/a.txt"), ("b.txt", "x/b.txt")], options());
    let report = engine
        .run(dir.path(), &StrategySelection::First, CancelSignal::new(rx))
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.summary().applied, 0);
    assert_eq!(report.summary().not_attempted, 2);
    assert!(dir.path().join("a.txt").exists());
    assert!(dir.path().join("b.txt").exists());
}

#[tokio::test]
async fn test_emptied_directories_are_pruned() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "old/inner/a.txt", "alpha");
    write(dir.path(), "keep/b.txt", "bravo");

    let engine = engine(&[("old/inner/a.txt", "new/a.txt")], options());
    let report = engine
        .run(dir.path(), &StrategySelection::First, CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.pruned_dirs, vec!["old/inner".to_string(), "old".to_string()]);
    assert!(!dir.path().join("old").exists());
    assert!(dir.path().join("keep/b.txt").exists());
}

#[tokio::test]
async fn test_history_undo_restores_moves() {
    let dir = tempfile::tempdir().unwrap();
    let journal = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");

    let mut opts = options();
    opts.executor.prune_empty_dirs = false;
    let engine = engine(&[("a.txt", "docs/a.txt")], opts);
    let report = engine
        .run(dir.path(), &StrategySelection::First, CancelSignal::never())
        .await
        .unwrap();

    let history = History::new(journal.path().join("history.jsonl"));
    assert_eq!(history.record_report(&report).unwrap(), 1);

    let outcomes = history.undo(1, false).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].1, UndoOutcome::Restored);
    assert_eq!(read(dir.path(), "a.txt"), "alpha");
    assert!(history.get_undoable().unwrap().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_hidden_symlink_cannot_carry_a_move_outside_the_root() {
    let dir = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");
    std::os::unix::fs::symlink(outside.path(), dir.path().join(".link")).unwrap();

    let engine = engine(&[("a.txt", ".link/a.txt")], options());
    let report = engine
        .run(dir.path(), &StrategySelection::First, CancelSignal::never())
        .await
        .unwrap();

    assert!(matches!(
        report.record_for("a.txt").unwrap().outcome,
        ExecutionOutcome::Failed { .. }
    ));
    assert!(report.has_failures());
    assert!(!outside.path().join("a.txt").exists());
    assert_eq!(read(dir.path(), "a.txt"), "alpha");
}

#[tokio::test]
async fn test_strategies_that_rename_files_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");

    let strategy = |name: &str, destination: &str| RawStrategy {
        name: Some(name.to_string()),
        description: None,
        moves: vec![RawMove {
            source: Some("a.txt".to_string()),
            destination: Some(destination.to_string()),
            rationale: None,
        }],
    };
    let raw = RawPlanResponse {
        strategies: vec![strategy("renamer", "docs/b.txt"), strategy("keeper", "docs/a.txt")],
    };
    let engine = Engine::new(rejecting_renames(), Arc::new(StaticPlanner::new(raw)));

    let round = engine.plan(dir.path()).await.unwrap();
    assert_eq!(round.strategies.len(), 1);
    assert_eq!(round.strategies[0].strategy, "keeper");
}

#[tokio::test]
async fn test_renaming_strategy_kept_by_default() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");

    let engine = engine(&[("a.txt", "docs/renamed.txt")], options());
    let round = engine.plan(dir.path()).await.unwrap();

    assert_eq!(round.strategies.len(), 1);
    assert_eq!(round.strategies[0].renamed_files(&round.snapshot).len(), 1);
}

#[tokio::test]
async fn test_only_renaming_strategies_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");

    let engine = engine(&[("a.txt", "docs/renamed.txt")], rejecting_renames());
    let err = engine.plan(dir.path()).await.unwrap_err();

    assert!(matches!(err, TidyError::MalformedPlan(_)));
    assert_eq!(read(dir.path(), "a.txt"), "alpha");
}

#[tokio::test]
async fn test_report_root_is_absolute() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "alpha");

    let engine = engine(&[("a.txt", "docs/a.txt")], options());
    let report = engine
        .run(&dir.path().join("."), &StrategySelection::First, CancelSignal::never())
        .await
        .unwrap();

    assert!(report.root.is_absolute());
    assert_eq!(report.root, dir.path().canonicalize().unwrap());
}
