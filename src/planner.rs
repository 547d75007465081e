// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Planning service clients
//!
//! The planner turns a snapshot listing into proposed strategies. Its
//! answer is untrusted and always goes through [`Plan::ingest`].
//!
//! [`Plan::ingest`]: crate::plan::Plan::ingest

use async_trait::async_trait;
use minijinja::{context, Environment};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PlannerConfig;
use crate::plan::RawPlanResponse;
use crate::snapshot::{EntryKind, Snapshot};
use crate::{Result, TidyError};

/// Source of reorganization proposals
#[async_trait]
pub trait Planner: Send + Sync {
    /// Name shown in logs
    fn name(&self) -> &str;

    /// Propose strategies for the given snapshot
    async fn propose(&self, snapshot: &Snapshot) -> Result<RawPlanResponse>;
}

/// Always answers with the same response
pub struct StaticPlanner {
    response: RawPlanResponse,
}

impl StaticPlanner {
    pub fn new(response: RawPlanResponse) -> Self {
        Self { response }
    }

    /// Load a response from a JSON plan file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TidyError::access(path, e))?;
        let response = serde_json::from_str(&content)
            .map_err(|e| TidyError::MalformedPlan(format!("{:?}: {}", path, e)))?;
        Ok(Self::new(response))
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    fn name(&self) -> &str {
        "static"
    }

    async fn propose(&self, _snapshot: &Snapshot) -> Result<RawPlanResponse> {
        Ok(self.response.clone())
    }
}

/// Everything the HTTP planner needs, resolved up front
#[derive(Debug, Clone)]
pub struct PlannerSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
    pub retries: u32,
    pub max_strategies: usize,
}

impl PlannerSettings {
    /// Resolve settings, reading the API key from the configured
    /// environment variable
    pub fn from_config(config: &PlannerConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                TidyError::Unauthenticated(format!(
                    "environment variable {} is not set",
                    config.api_key_env
                ))
            })?;

        Ok(Self {
            base_url: config.url.clone(),
            model: config.model.clone(),
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
            retries: config.retries,
            max_strategies: config.max_strategies,
        })
    }
}

/// Planner backed by an OpenAI-compatible chat completions API
pub struct LlmPlanner {
    client: Client,
    settings: PlannerSettings,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

const MAX_BACKOFF_SECS: u64 = 30;

const SYSTEM_PROMPT: &str = "\
You are an expert file system organizer. Analyze the provided directory \
listing and propose up to {{ max_strategies }} distinct, logical and practical \
reorganization strategies. Each strategy should improve clarity and \
accessibility and reduce clutter, for example by grouping similar file \
types, consolidating files of the same project or client, or flattening \
needless nesting. You may move files and rename folders, but never rename \
files: a moved file keeps its file name.

Answer with a single JSON object and nothing else:
{\"strategies\": [{\"name\": \"short_snake_case_name\", \
\"description\": \"one sentence\", \
\"moves\": [{\"source\": \"relative/path\", \"destination\": \"new/relative/path\", \
\"rationale\": \"why\"}]}]}

Rules: paths are relative to the listed root and use '/'. Sources must be \
paths from the listing. Do not list entries that stay where they are. \
Never move a folder into itself.";

const LISTING_TEMPLATE: &str = "\
Directory listing ({{ count }} entries, {{ depth }} scan):
{% for e in entries %}{{ e.path }}{% if e.dir %}/{% endif %}\
{% if e.size is not none %} ({{ e.size }} bytes){% endif %}
{% endfor %}";

impl LlmPlanner {
    /// Create a new planner client
    pub fn new(settings: PlannerSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| TidyError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let mut settings = settings;
        settings.base_url = settings
            .base_url
            .trim_end_matches('/')
            .trim_end_matches("/chat/completions")
            .to_string();

        Ok(Self { client, settings })
    }

    /// Check that the service answers and accepts the credential
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/models", self.settings.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.settings.api_key)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                TidyError::PlannerUnavailable(format!(
                    "Cannot connect to {}: {}",
                    self.settings.base_url, e
                ))
            })?;

        check_status(response.status())
    }

    async fn complete(&self, listing: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.settings.base_url);
        let system = render_system_prompt(self.settings.max_strategies)?;

        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: listing.to_string(),
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        debug!("Sending planning request: model={}", self.settings.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                TidyError::PlannerUnavailable(format!(
                    "Cannot connect to {}: {}",
                    self.settings.base_url, e
                ))
            })?;

        check_status(response.status())?;

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TidyError::MalformedPlan("planner returned no content".to_string()))
    }

    /// Request with retry logic. Authentication failures and malformed
    /// answers are not retried.
    async fn complete_with_retry(&self, listing: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..=self.settings.retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                warn!("Retrying planning request in {:?} (attempt {})", delay, attempt + 1);
                tokio::time::sleep(delay).await;
            }

            match self.complete(listing).await {
                Ok(content) => return Ok(content),
                Err(e @ (TidyError::Unauthenticated(_) | TidyError::MalformedPlan(_))) => {
                    return Err(e)
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| TidyError::PlannerUnavailable("Unknown error".to_string())))
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    fn name(&self) -> &str {
        &self.settings.model
    }

    async fn propose(&self, snapshot: &Snapshot) -> Result<RawPlanResponse> {
        let listing = render_listing(snapshot)?;
        let content = self.complete_with_retry(&listing).await?;
        parse_response(&content)
    }
}

/// Delay before retry number `attempt` (1-based): 1s, 2s, 4s, ... capped
fn backoff_delay(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_secs(secs.min(MAX_BACKOFF_SECS))
}

fn check_status(status: StatusCode) -> Result<()> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(TidyError::Unauthenticated(format!(
            "planning service returned status {}",
            status
        )));
    }
    if !status.is_success() {
        return Err(TidyError::PlannerUnavailable(format!(
            "planning service returned status {}",
            status
        )));
    }
    Ok(())
}

fn render_system_prompt(max_strategies: usize) -> Result<String> {
    let env = Environment::new();
    Ok(env.render_str(SYSTEM_PROMPT, context! { max_strategies })?)
}

#[derive(Serialize)]
struct ListingEntry<'a> {
    path: &'a str,
    dir: bool,
    size: Option<u64>,
}

/// Render the snapshot as the plain-text listing sent to the planner
pub fn render_listing(snapshot: &Snapshot) -> Result<String> {
    let entries: Vec<ListingEntry> = snapshot
        .entries()
        .map(|e| ListingEntry {
            path: &e.path,
            dir: e.kind == EntryKind::Directory,
            size: e.integrity.as_ref().map(|i| i.size),
        })
        .collect();

    let depth = match snapshot.depth() {
        crate::snapshot::ScanDepth::Immediate => "top-level",
        crate::snapshot::ScanDepth::Recursive => "recursive",
    };

    let env = Environment::new();
    Ok(env.render_str(
        LISTING_TEMPLATE,
        context! { entries, count => snapshot.len(), depth },
    )?)
}

/// Parse model output, tolerating a surrounding markdown code fence
pub fn parse_response(content: &str) -> Result<RawPlanResponse> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(body.trim())
        .map_err(|e| TidyError::MalformedPlan(format!("planner answer is not valid JSON: {}", e)))
}
