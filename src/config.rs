//! Workspace configuration helpers.
//!
//! Settings are layered: built-in defaults, then the optional
//! `relevance.json`, then environment overrides, then CLI flags. Secrets are
//! never read from the config file.
use crate::paths::WorkspacePaths;
use crate::prompts::PromptKind;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const TAVILY_API_KEY_ENV: &str = "TAVILY_API_KEY";
pub const PROMPT_VERSION_ENV: &str = "AGENT_PROMPT_VERSION";
pub const USE_CACHE_ENV: &str = "AGENT_USE_CACHE";

/// Pack-level configuration stored in `relevance.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalConfig {
    pub schema_version: u32,
    /// Dataset path, relative to the workspace root.
    pub data_path: String,
    /// Prompt template directory, relative to the workspace root.
    pub prompt_dir: String,
    /// Output root, relative to the workspace root.
    pub experiments_dir: String,
    /// Dataset column holding the ground-truth relevance.
    pub label_column: String,
    /// Template version resolved from the prompt store (`classify_<version>.txt`).
    pub prompt_version: String,
    /// Whether the search port may read its on-disk cache.
    pub use_cache: bool,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub split: SplitConfig,
}

/// Chat-completion backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    pub api_base: String,
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_ms: u64,
}

/// Web search backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// When false the search port answers with a stub instead of calling out.
    pub enabled: bool,
    pub api_base: String,
    pub max_results: u32,
    pub timeout_ms: u64,
    /// Lines containing this marker are dropped when noise stripping is on.
    pub noise_marker: String,
}

/// Dataset split settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitConfig {
    pub test_size: usize,
    pub val_frac: f64,
    pub drop_uncertain: bool,
    pub seed: u64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            data_path: "data/data_final_for_dls_new.jsonl".to_string(),
            prompt_dir: "prompts".to_string(),
            experiments_dir: "experiments".to_string(),
            label_column: "relevance_new".to_string(),
            prompt_version: "v1".to_string(),
            use_cache: true,
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            split: SplitConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            system_prompt: "You are a relevance classifier.".to_string(),
            max_tokens: 5,
            temperature: 0.0,
            timeout_ms: 30_000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: "https://api.tavily.com".to_string(),
            max_results: 3,
            timeout_ms: 30_000,
            noise_marker: "Missing:".to_string(),
        }
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 570,
            val_frac: 0.01,
            drop_uncertain: true,
            seed: 42,
        }
    }
}

/// API keys resolved from the environment after `.env` is loaded.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub openai_api_key: Option<String>,
    pub tavily_api_key: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: non_empty_env(OPENAI_API_KEY_ENV),
            tavily_api_key: non_empty_env(TAVILY_API_KEY_ENV),
        }
    }

    /// Generation is meaningless without a key, so this is a startup error.
    pub fn require_openai_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| anyhow!("{OPENAI_API_KEY_ENV} is not set (environment or .env)"))
    }
}

/// Render a pretty JSON config stub for new workspaces.
pub fn config_stub() -> Result<String> {
    serde_json::to_string_pretty(&EvalConfig::default()).context("serialize config stub")
}

/// Load `relevance.json` from the workspace root, falling back to defaults.
pub fn load_config(root: &Path) -> Result<EvalConfig> {
    let path = root.join(crate::paths::CONFIG_FILE_NAME);
    if !path.is_file() {
        return Ok(EvalConfig::default());
    }
    let bytes = fs::read(&path).with_context(|| format!("read config {}", path.display()))?;
    let config: EvalConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config {}", path.display()))?;
    Ok(config)
}

/// Load the optional `.env` file so secrets and overrides become visible.
pub fn load_env_file(paths: &WorkspacePaths) {
    let env_path = paths.env_path();
    if !env_path.is_file() {
        return;
    }
    if let Err(err) = dotenv::from_path(&env_path) {
        tracing::warn!(path = %env_path.display(), error = %err, "failed to load .env");
    }
}

/// Apply `AGENT_PROMPT_VERSION` / `AGENT_USE_CACHE` overrides.
pub fn apply_env_overrides(config: &mut EvalConfig) {
    if let Some(version) = non_empty_env(PROMPT_VERSION_ENV) {
        config.prompt_version = version;
    }
    if let Some(raw) = non_empty_env(USE_CACHE_ENV) {
        config.use_cache = parse_bool_flag(&raw);
    }
}

fn parse_bool_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Check config, inputs and credentials; returns human-readable issues.
///
/// An empty list means a run can start. Prompt templates are checked for the
/// configured version only.
pub fn validate_config(
    config: &EvalConfig,
    paths: &WorkspacePaths,
    secrets: &Secrets,
) -> Vec<String> {
    let mut issues = Vec::new();

    if config.schema_version != CONFIG_SCHEMA_VERSION {
        issues.push(format!(
            "unsupported config schema_version {} (expected {CONFIG_SCHEMA_VERSION})",
            config.schema_version
        ));
    }
    if config.prompt_version.trim().is_empty() {
        issues.push("prompt_version must be non-empty".to_string());
    }
    if config.label_column.trim().is_empty() {
        issues.push("label_column must be non-empty".to_string());
    }
    if !(0.0..=1.0).contains(&config.split.val_frac) {
        issues.push(format!(
            "split.val_frac must be within [0, 1] (got {})",
            config.split.val_frac
        ));
    }

    let data_path = paths.data_path();
    if !data_path.is_file() {
        issues.push(format!("dataset not found: {}", data_path.display()));
    }

    if secrets.openai_api_key.is_none() {
        issues.push(format!("environment variable not set: {OPENAI_API_KEY_ENV}"));
    }

    let prompt_dir = paths.prompt_dir();
    for kind in [PromptKind::Classify, PromptKind::NeedSearch] {
        let path = prompt_dir.join(kind.file_name(&config.prompt_version));
        if !path.is_file() {
            issues.push(format!("{kind} prompt not found: {}", path.display()));
        }
    }

    issues
}
