// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for tidyfs

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tidyfs operations
pub type Result<T> = std::result::Result<T, TidyError>;

/// tidyfs error types
///
/// Pre-flight errors (`Access` on the root, `NotADirectory`,
/// `MalformedPlan`) abort a run before anything on disk changes. The
/// per-operation kinds (`SourceMissing`, `DestinationConflict`,
/// `MoveFailed`) are recovered by the executor and end up in the report.
#[derive(Error, Debug)]
pub enum TidyError {
    #[error("Cannot access {path:?}: {source}")]
    Access {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a directory: {0:?}")]
    NotADirectory(PathBuf),

    #[error("Malformed plan: {0}")]
    MalformedPlan(String),

    #[error("Source missing: {0}")]
    SourceMissing(String),

    #[error("Destination already exists: {0}")]
    DestinationConflict(String),

    #[error("Move {source_path} -> {destination} failed: {reason}")]
    MoveFailed {
        source_path: String,
        destination: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Planning service not available: {0}")]
    PlannerUnavailable(String),

    #[error("Planning service rejected credentials: {0}")]
    Unauthenticated(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

impl TidyError {
    pub(crate) fn access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Access {
            path: path.into(),
            source,
        }
    }

    /// True for errors that stop a run before any filesystem mutation
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::Access { .. } | Self::NotADirectory(_) | Self::MalformedPlan(_) | Self::Config(_)
        )
    }
}
