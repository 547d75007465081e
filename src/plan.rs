// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Reorganization plans and their structural ingestion
//!
//! The planning service is untrusted. Its response is deserialized into
//! the loose `Raw*` types and then converted field by field into [`Plan`];
//! a single bad operation rejects the whole response.

use serde::{Deserialize, Serialize};

use crate::snapshot::{EntryKind, Snapshot};
use crate::{Result, TidyError};

/// Planning service response as received
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPlanResponse {
    #[serde(default)]
    pub strategies: Vec<RawStrategy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawStrategy {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub moves: Vec<RawMove>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMove {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// A single proposed relocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOperation {
    pub source: String,
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// An ordered list of moves under a strategy name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub operations: Vec<MoveOperation>,
}

impl MoveOperation {
    /// Build a checked operation from two relative paths
    pub fn new(source: &str, destination: &str) -> Result<Self> {
        let source = normalize_relative(source)
            .map_err(|e| TidyError::MalformedPlan(format!("source {}", e)))?;
        let destination = normalize_relative(destination)
            .map_err(|e| TidyError::MalformedPlan(format!("destination {}", e)))?;

        if source == destination {
            return Err(TidyError::MalformedPlan(format!(
                "destination equals source '{}'",
                source
            )));
        }
        if is_within(&destination, &source) {
            return Err(TidyError::MalformedPlan(format!(
                "cannot move '{}' into itself ('{}')",
                source, destination
            )));
        }

        Ok(Self {
            source,
            destination,
            rationale: None,
        })
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

impl Plan {
    /// Structurally validate every strategy in a planning response.
    ///
    /// Either every strategy is well-formed and all are returned, or the
    /// whole response is rejected with `MalformedPlan`.
    pub fn ingest(raw: RawPlanResponse) -> Result<Vec<Plan>> {
        if raw.strategies.is_empty() {
            return Err(TidyError::MalformedPlan(
                "response contains no strategies".to_string(),
            ));
        }

        raw.strategies
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                Self::ingest_strategy(s)
                    .map_err(|e| prefix_error(e, &format!("strategy {}", i + 1)))
            })
            .collect()
    }

    fn ingest_strategy(raw: RawStrategy) -> Result<Plan> {
        let strategy = raw
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| TidyError::MalformedPlan("missing strategy name".to_string()))?;

        let mut operations = Vec::with_capacity(raw.moves.len());
        for (i, mv) in raw.moves.into_iter().enumerate() {
            let op = ingest_move(mv)
                .map_err(|e| prefix_error(e, &format!("'{}' move {}", strategy, i + 1)))?;
            operations.push(op);
        }

        Ok(Plan {
            strategy,
            description: raw.description.filter(|d| !d.trim().is_empty()),
            operations,
        })
    }

    /// Moves of files or links in `snapshot` whose destination carries a
    /// different name. Folders may be renamed, files may not.
    pub fn renamed_files<'a>(&'a self, snapshot: &Snapshot) -> Vec<&'a MoveOperation> {
        self.operations
            .iter()
            .filter(|op| {
                let is_leaf = matches!(
                    snapshot.get(&op.source).map(|e| e.kind),
                    Some(EntryKind::File | EntryKind::Symlink)
                );
                is_leaf && file_name(&op.source) != file_name(&op.destination)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

fn ingest_move(raw: RawMove) -> Result<MoveOperation> {
    let source = raw
        .source
        .ok_or_else(|| TidyError::MalformedPlan("missing source".to_string()))?;
    let destination = raw
        .destination
        .ok_or_else(|| TidyError::MalformedPlan("missing destination".to_string()))?;

    let mut op = MoveOperation::new(&source, &destination)?;
    op.rationale = raw.rationale.filter(|r| !r.trim().is_empty());
    Ok(op)
}

fn prefix_error(err: TidyError, context: &str) -> TidyError {
    match err {
        TidyError::MalformedPlan(msg) => TidyError::MalformedPlan(format!("{}: {}", context, msg)),
        other => other,
    }
}

/// Normalize a root-relative path to `a/b/c` form.
///
/// Rejects empty paths, absolute paths, drive prefixes and any `..`
/// component: a plan may only name paths inside the organized root.
pub fn normalize_relative(path: &str) -> std::result::Result<String, String> {
    let unified = path.trim().replace('\\', "/");
    if unified.is_empty() {
        return Err("is empty".to_string());
    }
    if unified.starts_with('/') {
        return Err(format!("'{}' is absolute", path));
    }
    if unified.len() >= 2 && unified.as_bytes()[1] == b':' {
        return Err(format!("'{}' has a drive prefix", path));
    }

    let mut parts = Vec::new();
    for component in unified.split('/') {
        match component {
            "" | "." => continue,
            ".." => return Err(format!("'{}' escapes the root", path)),
            c => parts.push(c),
        }
    }

    if parts.is_empty() {
        return Err(format!("'{}' names the root itself", path));
    }
    Ok(parts.join("/"))
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// True if `path` is `ancestor` or lies beneath it
pub fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || (path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == b'/')
}

/// Proper ancestors of a relative path, nearest first
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.char_indices()
        .rev()
        .filter(|(_, c)| *c == '/')
        .map(move |(i, _)| &path[..i])
}
