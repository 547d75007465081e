// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Plain-text rendering of trees, strategies and reports

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::executor::ExecutionOutcome;
use crate::plan::Plan;
use crate::report::Report;
use crate::snapshot::{EntryKind, Snapshot};

#[derive(Default)]
struct Node {
    children: BTreeMap<String, Node>,
    is_dir: bool,
}

impl Node {
    fn insert(&mut self, path: &str, is_dir: bool) {
        let mut node = self;
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        for (i, part) in parts.iter().enumerate() {
            node = node.children.entry(part.to_string()).or_default();
            if i + 1 < parts.len() {
                node.is_dir = true;
            }
        }
        if is_dir {
            node.is_dir = true;
        }
    }

    fn write(&self, out: &mut String, indent: &str) {
        let count = self.children.len();
        for (i, (name, child)) in self.children.iter().enumerate() {
            let last = i + 1 == count;
            let branch = if last { "└── " } else { "├── " };
            let suffix = if child.is_dir { "/" } else { "" };
            let _ = writeln!(out, "{}{}{}{}", indent, branch, name, suffix);
            let next = format!("{}{}", indent, if last { "    " } else { "│   " });
            child.write(out, &next);
        }
    }
}

/// Render `(path, is_dir)` pairs as an indented tree under `label`
pub fn render_tree<'a>(label: &str, paths: impl IntoIterator<Item = (&'a str, bool)>) -> String {
    let mut root = Node::default();
    for (path, is_dir) in paths {
        root.insert(path, is_dir);
    }

    let mut out = format!("{}\n", label);
    root.write(&mut out, "");
    out
}

/// Render the current contents of a snapshot
pub fn render_snapshot(snapshot: &Snapshot) -> String {
    render_tree(
        &format!("{}/", snapshot.root().display()),
        snapshot
            .entries()
            .map(|e| (e.path.as_str(), e.kind == EntryKind::Directory)),
    )
}

/// Render the tree a strategy would produce from `snapshot`
pub fn render_proposed(snapshot: &Snapshot, plan: &Plan) -> String {
    let mut paths: BTreeMap<String, bool> = snapshot
        .entries()
        .map(|e| (e.path.clone(), e.kind == EntryKind::Directory))
        .collect();

    for op in &plan.operations {
        let moved: Vec<(String, bool)> = paths
            .iter()
            .filter(|(p, _)| crate::plan::is_within(p, &op.source))
            .map(|(p, d)| (p.clone(), *d))
            .collect();
        for (path, is_dir) in moved {
            paths.remove(&path);
            let relocated = format!("{}{}", op.destination, &path[op.source.len()..]);
            paths.insert(relocated, is_dir);
        }
    }

    render_tree(
        &format!("{}/", snapshot.root().display()),
        paths.iter().map(|(p, d)| (p.as_str(), *d)),
    )
}

/// Numbered list of strategies with their moves. Moves that would change
/// a file's name are marked.
pub fn render_strategies(snapshot: &Snapshot, strategies: &[Plan]) -> String {
    let mut out = String::new();
    for (i, plan) in strategies.iter().enumerate() {
        let renamed = plan.renamed_files(snapshot);
        let _ = writeln!(out, "{}. {} ({} moves)", i + 1, plan.strategy, plan.len());
        if let Some(ref description) = plan.description {
            let _ = writeln!(out, "   {}", description);
        }
        if !renamed.is_empty() {
            let _ = writeln!(out, "   WARNING: renames {} file(s)", renamed.len());
        }
        for op in &plan.operations {
            let mark = if renamed.contains(&op) { "  [renames file]" } else { "" };
            let _ = writeln!(out, "     {} -> {}{}", op.source, op.destination, mark);
        }
    }
    out
}

/// Human-readable report
pub fn render_report(report: &Report) -> String {
    let mut out = String::new();
    let summary = report.summary();

    let _ = writeln!(out, "Run {} on {:?}", report.run_id, report.root);
    let _ = writeln!(
        out,
        "Strategy: {}{}",
        report.strategy,
        if report.dry_run { " (dry run)" } else { "" }
    );
    if report.replans > 0 {
        let _ = writeln!(out, "Re-planned {} time(s) after drift", report.replans);
    }

    let _ = writeln!(out, "\nOperations:");
    for record in &report.records {
        let op = &record.validated.operation;
        let status = match &record.outcome {
            ExecutionOutcome::Applied => "applied".to_string(),
            ExecutionOutcome::Failed { reason } => format!("FAILED: {}", reason),
            ExecutionOutcome::NotAttempted { reason } => {
                let why = record
                    .validated
                    .detail
                    .clone()
                    .or_else(|| reason.clone())
                    .unwrap_or_default();
                if record.validated.disposition.is_applicable() {
                    format!("not attempted ({})", why)
                } else {
                    format!("skipped, {} ({})", record.validated.disposition.label(), why)
                }
            }
        };
        let _ = writeln!(
            out,
            "  [{}] {} -> {}: {}",
            record.validated.index + 1,
            op.source,
            op.destination,
            status
        );
    }

    if !report.drift.is_empty() || !report.drift.modified.is_empty() {
        let _ = writeln!(out, "\nDrift since planning:");
        for path in &report.drift.added {
            let _ = writeln!(out, "  + {}", path);
        }
        for path in &report.drift.removed {
            let _ = writeln!(out, "  - {}", path);
        }
        for path in &report.drift.modified {
            let _ = writeln!(out, "  ~ {}", path);
        }
    }

    if !report.unplanned_arrivals.is_empty() {
        let _ = writeln!(out, "\nNew entries not covered by the plan:");
        for path in &report.unplanned_arrivals {
            let _ = writeln!(out, "  {}", path);
        }
    }

    if !report.pruned_dirs.is_empty() {
        let _ = writeln!(out, "\nRemoved empty directories:");
        for path in &report.pruned_dirs {
            let _ = writeln!(out, "  {}/", path);
        }
    }

    if report.cancelled {
        let _ = writeln!(out, "\nRun was cancelled before all operations were attempted.");
    }

    let _ = writeln!(
        out,
        "\n{} applied, {} failed, {} skipped, {} not attempted",
        summary.applied,
        summary.failed,
        summary.skipped(),
        summary.not_attempted - summary.skipped(),
    );

    out
}
