//! Best-effort client for the external text-generation service.
//!
//! The assistant channel is a side effect of message sending: any failure
//! here is logged and swallowed, and must never propagate past the
//! message-creation boundary.

use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::config::AssistantConfig;

/// Instruction prefixed to every question sent to the model
const INSTRUCTION_PREAMBLE: &str = "You are a helpdesk assistant. Answer the user's support \
question concisely. If you cannot resolve the issue remotely, reply with \"I don't know\" so \
a technician can take over.";

/// Substrings in a reply that signal the assistant cannot help and a
/// technician should take over. This is deliberately fragile string matching
/// on model output; treat it as a low-confidence heuristic.
const ESCALATION_MARKERS: &[&str] = &[
    "i don't know",
    "i do not know",
    "i can't",
    "i cannot",
    "needs a technician",
    "need a technician",
];

/// True if the reply signals the assistant could not resolve the query
pub fn needs_technician(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    ESCALATION_MARKERS.iter().any(|m| lower.contains(m))
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("no assistant API key configured")]
    Disabled,
    #[error("assistant request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("assistant returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("assistant returned an empty reply")]
    EmptyReply,
}

pub struct AssistantClient {
    http: reqwest::Client,
    config: AssistantConfig,
}

impl AssistantClient {
    pub fn new(config: AssistantConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    /// Whether a credential is configured for the external service
    pub fn is_enabled(&self) -> bool {
        self.config
            .api_key
            .as_ref()
            .map(|k| !k.is_empty())
            .unwrap_or(false)
    }

    /// Ask the external model a question and return its reply text.
    ///
    /// Callers treat every error here as a soft failure.
    pub async fn ask(&self, question: &str) -> Result<String, AssistantError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(AssistantError::Disabled)?;

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );

        let prompt = format!("{}\n\n{}", INSTRUCTION_PREAMBLE, question);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&json!({
                "contents": [{ "parts": [{ "text": prompt }] }]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AssistantError::Status(response.status()));
        }

        let body: serde_json::Value = response.json().await?;
        let reply = body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or(AssistantError::EmptyReply)?;

        Ok(reply.to_string())
    }
}
