// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for tidyfs

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::engine::{DriftPolicy, EngineOptions};
use crate::executor::ExecutorOptions;
use crate::snapshot::{ScanDepth, ScanOptions};
use crate::validator::ValidatorOptions;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Planning service configuration
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Directory scanning
    #[serde(default)]
    pub scan: ScanConfig,

    /// Drift and validation policy
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Execution settings
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Move journal settings
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlannerConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    #[serde(default = "default_planner_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_max_strategies")]
    pub max_strategies: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanConfig {
    #[serde(default)]
    pub depth: ScanDepth,
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub hash_contents: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PolicyConfig {
    #[serde(default)]
    pub on_drift: DriftPolicy,
    #[serde(default = "default_max_replans")]
    pub max_replans: u32,
    #[serde(default = "default_true")]
    pub skip_drifted_sources: bool,
    /// Drop proposed strategies that change a file's name
    #[serde(default)]
    pub reject_file_renames: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExecutionConfig {
    #[serde(default = "default_true")]
    pub prune_empty_dirs: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_history_path")]
    pub path: String,
}

// Default value functions
fn default_planner_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
}
fn default_model() -> String { "gemini-2.5-flash".to_string() }
fn default_api_key_env() -> String { "GEMINI_API_KEY".to_string() }
fn default_timeout() -> u64 { 120 }
fn default_retries() -> u32 { 2 }
fn default_max_strategies() -> usize { 3 }
fn default_max_replans() -> u32 { 1 }
fn default_true() -> bool { true }
fn default_history_path() -> String { "tidyfs_history.jsonl".to_string() }

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            url: default_planner_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout(),
            retries: default_retries(),
            max_strategies: default_max_strategies(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            depth: ScanDepth::default(),
            include_hidden: false,
            ignore: Vec::new(),
            hash_contents: false,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            on_drift: DriftPolicy::default(),
            max_replans: default_max_replans(),
            skip_drifted_sources: true,
            reject_file_renames: false,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { prune_empty_dirs: true }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_history_path(),
        }
    }
}

/// Upper bound for `planner.retries`
pub const MAX_RETRIES: u32 = 10;

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::TidyError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.planner.model.trim().is_empty() {
            return Err(crate::TidyError::Config("planner.model must not be empty".to_string()));
        }
        if self.planner.max_strategies == 0 {
            return Err(crate::TidyError::Config(
                "planner.max_strategies must be at least 1".to_string(),
            ));
        }
        if self.planner.retries > MAX_RETRIES {
            return Err(crate::TidyError::Config(format!(
                "planner.retries must be at most {}",
                MAX_RETRIES
            )));
        }
        for pattern in &self.scan.ignore {
            glob::Pattern::new(pattern).map_err(|e| {
                crate::TidyError::Config(format!("Invalid ignore pattern '{}': {}", pattern, e))
            })?;
        }
        Ok(())
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            depth: self.scan.depth,
            include_hidden: self.scan.include_hidden,
            ignore: self.scan.ignore.clone(),
            hash_contents: self.scan.hash_contents,
        }
    }

    /// Engine options derived from the configuration file
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            scan: self.scan_options(),
            drift_policy: self.policy.on_drift,
            max_replans: self.policy.max_replans,
            reject_file_renames: self.policy.reject_file_renames,
            validator: ValidatorOptions {
                skip_drifted_sources: self.policy.skip_drifted_sources,
            },
            executor: ExecutorOptions {
                dry_run: false,
                prune_empty_dirs: self.execution.prune_empty_dirs,
            },
        }
    }
}
