//! Per-row pipeline state and its append-only trace.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub const TRACE_SEARCH_PROMPT: &str = "search_prompt";
pub const TRACE_NEED_SEARCH_DECISION: &str = "need_search_decision";
pub const TRACE_NEED_SEARCH_ERROR: &str = "need_search_error";
pub const TRACE_ROUTE: &str = "route";
pub const TRACE_SEARCH_QUERY: &str = "search_query";
pub const TRACE_SEARCH_RESULTS: &str = "search_results";
pub const TRACE_SEARCH_ERROR: &str = "search_error";
pub const TRACE_CLASSIFICATION_PROMPT: &str = "classification_prompt";
pub const TRACE_CLASSIFICATION_RESPONSE: &str = "classification_response";
pub const TRACE_CLASSIFICATION_ERROR: &str = "classification_error";

/// Branch chosen by the decide step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Search,
    Classify,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Classify => "classify",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "search" => Some(Self::Search),
            "classify" => Some(Self::Classify),
            _ => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate business record judged against a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    /// May hold several `;`-separated aliases; the first is canonical.
    pub name: String,
    pub address: String,
    pub rubric: String,
    pub reviews_summary: String,
    /// Filled by the search step; absent when search was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_info: Option<String>,
}

/// Structured log of one pipeline run. Keys are written once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace {
    entries: BTreeMap<String, Value>,
}

impl Trace {
    /// Add `key` unless it is already present; returns whether it was added.
    pub fn record(&mut self, key: &str, value: impl Into<Value>) -> bool {
        if self.contains_key(key) {
            tracing::debug!(key, "trace key already recorded; keeping first value");
            return false;
        }
        self.entries.insert(key.to_string(), value.into());
        true
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Route recorded by the decide step, if it ran.
    pub fn route(&self) -> Option<Route> {
        self.get_str(TRACE_ROUTE).and_then(Route::parse)
    }

    /// Compact JSON object, as stored in result files.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(&self.entries).context("serialize trace")
    }
}

/// Everything one pipeline run reads and writes. Built fresh for every row.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub user_query: String,
    pub listing: OrganizationRecord,
    pub trace: Trace,
    /// Raw classifier output, or the failure sentinel. Set by the classify step.
    pub verdict: Option<String>,
    pub cache_enabled: bool,
    /// Template version resolved from the prompt store.
    pub prompt_variant: String,
    pub route: Option<Route>,
}

impl PipelineState {
    pub fn new(
        user_query: impl Into<String>,
        listing: OrganizationRecord,
        prompt_variant: impl Into<String>,
        cache_enabled: bool,
    ) -> Self {
        Self {
            user_query: user_query.into(),
            listing,
            trace: Trace::default(),
            verdict: None,
            cache_enabled,
            prompt_variant: prompt_variant.into(),
            route: None,
        }
    }

    /// Verdict text, empty when the pipeline never reached classification.
    pub fn verdict_str(&self) -> &str {
        self.verdict.as_deref().unwrap_or_default()
    }
}
