//! Web search port with a content-addressed on-disk cache.
//!
//! Cache entries live at `<cache_dir>/<sha256(query)>.json` as
//! `{"results": "<snippets>"}`. Writes go through a temp file and an atomic
//! rename, so a concurrent reader sees either the old entry, the new one, or
//! nothing; concurrent writers of one key produce identical content and the
//! last rename wins.
//!
//! Backend trouble never raises: an absent backend yields a [`STUB_MARKER`]
//! string and missing credentials or a failed request yield an
//! [`ERROR_MARKER`] string.
use crate::config::SearchConfig;
use crate::util::sha256_hex;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Prefix of results produced when no search backend is wired.
pub const STUB_MARKER: &str = "[STUB]";
/// Prefix of results produced when the backend is misconfigured or failed.
pub const ERROR_MARKER: &str = "[ERROR]";

/// True for strings the port returns in place of real snippets.
pub fn is_failure_marker(text: &str) -> bool {
    let text = text.trim_start();
    text.starts_with(ERROR_MARKER) || text.starts_with(STUB_MARKER)
}

pub trait WebSearch: Send + Sync {
    /// Return concatenated snippet text for `query`.
    fn search(&self, query: &str, use_cache: bool) -> Result<String>;
}

/// A raw search backend returning one text snippet per hit.
pub trait SearchBackend: Send + Sync {
    fn fetch(&self, query: &str) -> Result<Vec<String>>;
}

/// Tavily-compatible search API client.
pub struct TavilyBackend {
    agent: ureq::Agent,
    url: String,
    api_key: String,
    max_results: u32,
}

impl TavilyBackend {
    pub fn new(config: &SearchConfig, api_key: &str) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_millis(config.timeout_ms)))
            .build()
            .into();
        Self {
            agent,
            url: format!("{}/search", config.api_base.trim_end_matches('/')),
            api_key: api_key.to_string(),
            max_results: config.max_results,
        }
    }
}

impl SearchBackend for TavilyBackend {
    fn fetch(&self, query: &str) -> Result<Vec<String>> {
        let body = json!({
            "query": query,
            "max_results": self.max_results,
        });
        let mut response = self
            .agent
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send_json(&body)
            .context("send search request")?;
        let value: Value = response
            .body_mut()
            .read_json()
            .context("decode search response")?;
        parse_search_snippets(&value)
    }
}

fn parse_search_snippets(value: &Value) -> Result<Vec<String>> {
    let results = value
        .get("results")
        .and_then(|results| results.as_array())
        .ok_or_else(|| anyhow!("search response is missing a results array"))?;
    Ok(results
        .iter()
        .map(|hit| {
            hit.get("content")
                .and_then(|content| content.as_str())
                .unwrap_or_default()
                .to_string()
        })
        .collect())
}

/// How the port reaches the network for this run.
pub enum BackendState {
    /// Search is switched off; every miss returns a stub.
    Disabled,
    /// Search is on but no API key was provided.
    MissingCredentials,
    Ready(Box<dyn SearchBackend>),
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    results: String,
}

/// The search port used by pipeline runs.
pub struct CachedSearch {
    cache_dir: PathBuf,
    backend: BackendState,
}

impl CachedSearch {
    pub fn new(cache_dir: PathBuf, backend: BackendState) -> Self {
        if let Err(err) = fs::create_dir_all(&cache_dir) {
            tracing::error!(
                path = %cache_dir.display(),
                error = %err,
                "failed to create search cache dir"
            );
        }
        Self { cache_dir, backend }
    }

    /// Wire the port from config; a missing key is reported per call, not here.
    pub fn from_config(config: &SearchConfig, api_key: Option<&str>, cache_dir: PathBuf) -> Self {
        let backend = match (config.enabled, api_key) {
            (false, _) => BackendState::Disabled,
            (true, None) => BackendState::MissingCredentials,
            (true, Some(key)) => BackendState::Ready(Box::new(TavilyBackend::new(config, key))),
        };
        Self::new(cache_dir, backend)
    }

    pub fn cache_path(&self, query: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.json", sha256_hex(query)))
    }

    fn read_cache(&self, path: &Path) -> Option<String> {
        if !path.is_file() {
            return None;
        }
        let parsed = fs::read(path)
            .context("read cache entry")
            .and_then(|bytes| {
                serde_json::from_slice::<CacheEntry>(&bytes).context("parse cache entry")
            });
        match parsed {
            Ok(entry) => Some(entry.results),
            Err(err) => {
                let detail = format!("{err:#}");
                tracing::warn!(
                    path = %path.display(),
                    error = %detail,
                    "ignoring unreadable cache entry"
                );
                None
            }
        }
    }

    fn write_cache(&self, path: &Path, results: &str) -> Result<()> {
        let entry = CacheEntry {
            results: results.to_string(),
        };
        let text = serde_json::to_string_pretty(&entry).context("serialize cache entry")?;
        let mut file = tempfile::NamedTempFile::new_in(&self.cache_dir)
            .context("create temp cache entry")?;
        file.write_all(text.as_bytes())
            .context("write temp cache entry")?;
        file.persist(path)
            .map_err(|err| err.error)
            .with_context(|| format!("persist cache entry {}", path.display()))?;
        Ok(())
    }
}

impl WebSearch for CachedSearch {
    fn search(&self, query: &str, use_cache: bool) -> Result<String> {
        if query.trim().is_empty() {
            return Ok(String::new());
        }
        let path = self.cache_path(query);

        if use_cache {
            if let Some(results) = self.read_cache(&path) {
                tracing::debug!(path = %path.display(), "search cache hit");
                return Ok(results);
            }
        }

        let backend = match &self.backend {
            BackendState::Disabled => {
                tracing::warn!("search backend disabled; returning stub");
                return Ok(format!("{STUB_MARKER} search results for: {query}"));
            }
            BackendState::MissingCredentials => {
                tracing::error!("search API key not set");
                return Ok(format!("{ERROR_MARKER} no search API key for query: {query}"));
            }
            BackendState::Ready(backend) => backend,
        };

        let start = Instant::now();
        let snippets = match backend.fetch(query) {
            Ok(snippets) => snippets,
            Err(err) => {
                let detail = format!("{err:#}");
                tracing::error!(error = %detail, "search request failed");
                return Ok(format!("{ERROR_MARKER} search failed for query: {query}"));
            }
        };
        let results = snippets.join("\n\n");
        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            hits = snippets.len(),
            "search complete"
        );

        if let Err(err) = self.write_cache(&path, &results) {
            let detail = format!("{err:#}");
            tracing::error!(error = %detail, "failed to store search cache entry");
        }
        Ok(results)
    }
}
