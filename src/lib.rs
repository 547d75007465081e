// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! tidyfs: AI-planned directory reorganization
//!
//! A planning service proposes moves for a directory listing. This crate
//! decides which of those moves are still safe once the tree has had time
//! to change, applies them without ever overwriting anything, and reports
//! exactly what happened to each one.

pub mod config;
pub mod drift;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fs_ops;
pub mod history;
pub mod plan;
pub mod planner;
pub mod render;
pub mod report;
pub mod snapshot;
pub mod validator;

pub use config::AppConfig;
pub use engine::{DriftPolicy, Engine, EngineOptions, StrategySelection};
pub use error::{Result, TidyError};
pub use report::Report;
