//! Verdict to numeric label mapping.
use crate::llm::GENERATION_FAILED;

pub const POSITIVE_MARKER: &str = "RELEVANT_PLUS";
pub const NEGATIVE_MARKER: &str = "IRRELEVANT";

pub const LABEL_RELEVANT: f64 = 1.0;
pub const LABEL_IRRELEVANT: f64 = 0.0;
/// Error or unparseable verdict; excluded from accuracy.
pub const LABEL_UNKNOWN: f64 = -1.0;

/// Map a raw verdict to `1.0`, `0.0` or `-1.0` by substring match.
pub fn map_to_label(verdict: &str) -> f64 {
    let trimmed = verdict.trim();
    if trimmed.is_empty() || trimmed == GENERATION_FAILED {
        return LABEL_UNKNOWN;
    }
    if trimmed.contains(POSITIVE_MARKER) {
        return LABEL_RELEVANT;
    }
    if trimmed.contains(NEGATIVE_MARKER) {
        return LABEL_IRRELEVANT;
    }
    tracing::warn!(verdict = trimmed, "unrecognized classifier verdict");
    LABEL_UNKNOWN
}

pub fn is_unknown(label: f64) -> bool {
    label == LABEL_UNKNOWN
}
