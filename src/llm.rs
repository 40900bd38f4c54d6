//! Text generation port.
//!
//! The pipeline talks to an LM only through [`TextGenerator`]. The concrete
//! [`ChatClient`] speaks the OpenAI-compatible chat-completions protocol and
//! never surfaces transport, auth or quota failures as errors: it answers
//! with [`GENERATION_FAILED`] instead, so one bad call costs one row.
use crate::config::LlmConfig;
use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

/// Sentinel returned in place of a completion when the backend fails.
pub const GENERATION_FAILED: &str = "ERROR";

/// One system + user prompt pair with sampling settings.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub system_prompt: &'a str,
    pub user_prompt: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Sampling settings shared by every call of a run.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationSettings {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    pub fn request<'a>(&'a self, user_prompt: &'a str) -> GenerationRequest<'a> {
        GenerationRequest {
            system_prompt: &self.system_prompt,
            user_prompt,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

pub trait TextGenerator: Send + Sync {
    /// Whether a backend is wired at all. Pipeline steps skip the call when not.
    fn is_available(&self) -> bool;

    /// Return the trimmed completion text.
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String>;
}

/// Chat-completions client over blocking HTTP.
pub struct ChatClient {
    agent: ureq::Agent,
    url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(config: &LlmConfig, api_key: &str) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_millis(config.timeout_ms)))
            .build()
            .into();
        Self {
            agent,
            url: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: config.model.clone(),
        }
    }

    fn complete(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        let mut response = self
            .agent
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send_json(&body)
            .context("send chat completion request")?;
        let value: Value = response
            .body_mut()
            .read_json()
            .context("decode chat completion response")?;
        parse_completion_content(&value)
    }
}

impl TextGenerator for ChatClient {
    fn is_available(&self) -> bool {
        true
    }

    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let start = Instant::now();
        let outcome = self.complete(request);
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(text) => {
                tracing::debug!(
                    elapsed_ms,
                    prompt_bytes = request.user_prompt.len(),
                    response_bytes = text.len(),
                    "lm invoke complete"
                );
                Ok(text.trim().to_string())
            }
            Err(err) => {
                let detail = format!("{err:#}");
                tracing::warn!(elapsed_ms, error = %detail, "lm invoke failed");
                Ok(GENERATION_FAILED.to_string())
            }
        }
    }
}

fn parse_completion_content(value: &Value) -> Result<String> {
    value
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("chat completion response is missing choices[0].message.content"))
}
