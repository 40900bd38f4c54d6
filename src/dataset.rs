//! JSONL dataset loading and train/val/test split.
//!
//! The first `test_size` rows form the fixed test set; the rest is the
//! training pool from which a seeded validation sample is drawn.
use crate::config::SplitConfig;
use crate::pipeline::OrganizationRecord;
use crate::util::sha256_hex;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Label meaning "annotators were unsure"; dropped when `drop_uncertain` is set.
pub const UNCERTAIN_LABEL: f64 = 0.1;

/// One evaluated (query, listing, ground truth) example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    /// User search query.
    pub text: String,
    pub name: String,
    pub address: String,
    pub normalized_main_rubric_name_ru: String,
    pub reviews_summarized: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prices_summarized: Option<String>,
    /// Ground-truth relevance.
    pub label: f64,
}

impl DatasetRow {
    /// Listing view handed to the pipeline.
    pub fn listing(&self) -> OrganizationRecord {
        OrganizationRecord {
            name: self.name.clone(),
            address: self.address.clone(),
            rubric: self.normalized_main_rubric_name_ru.clone(),
            reviews_summary: self.reviews_summarized.clone(),
            search_info: None,
        }
    }

    fn is_uncertain(&self) -> bool {
        (self.label - UNCERTAIN_LABEL).abs() < 1e-9
    }
}

/// Which evaluation split(s) a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitSelection {
    Val,
    Test,
    /// Validation first, then test.
    #[default]
    All,
}

impl SplitSelection {
    pub fn includes_val(self) -> bool {
        matches!(self, Self::Val | Self::All)
    }

    pub fn includes_test(self) -> bool {
        matches!(self, Self::Test | Self::All)
    }
}

impl fmt::Display for SplitSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Val => "val",
            Self::Test => "test",
            Self::All => "all",
        })
    }
}

impl FromStr for SplitSelection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "val" => Ok(Self::Val),
            "test" => Ok(Self::Test),
            "all" => Ok(Self::All),
            other => Err(format!("unknown split {other:?} (expected val, test or all)")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatasetSplits {
    pub train: Vec<DatasetRow>,
    pub val: Vec<DatasetRow>,
    pub test: Vec<DatasetRow>,
}

/// Read a JSONL dataset file.
pub fn load_dataset(path: &Path, label_column: &str) -> Result<Vec<DatasetRow>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read dataset {}", path.display()))?;
    parse_dataset(&text, label_column).with_context(|| format!("parse dataset {}", path.display()))
}

/// Parse JSONL text; blank lines are skipped, keys are matched case-insensitively.
pub fn parse_dataset(text: &str, label_column: &str) -> Result<Vec<DatasetRow>> {
    let label_column = label_column.to_lowercase();
    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value =
            serde_json::from_str(line).with_context(|| format!("line {line_no}: invalid JSON"))?;
        let Value::Object(object) = value else {
            return Err(anyhow!("line {line_no}: expected a JSON object"));
        };
        let row = row_from_object(lowercase_keys(object), &label_column)
            .with_context(|| format!("line {line_no}"))?;
        rows.push(row);
    }
    Ok(rows)
}

fn lowercase_keys(object: Map<String, Value>) -> Map<String, Value> {
    object
        .into_iter()
        .map(|(key, value)| (key.to_lowercase(), value))
        .collect()
}

fn row_from_object(object: Map<String, Value>, label_column: &str) -> Result<DatasetRow> {
    let label = object
        .get(label_column)
        .ok_or_else(|| anyhow!("missing label column {label_column}"))
        .and_then(parse_label)?;
    Ok(DatasetRow {
        text: field_text(&object, "text"),
        name: field_text(&object, "name"),
        address: field_text(&object, "address"),
        normalized_main_rubric_name_ru: field_text(&object, "normalized_main_rubric_name_ru"),
        reviews_summarized: field_text(&object, "reviews_summarized"),
        permalink: object.get("permalink").filter(|value| !value.is_null()).cloned(),
        prices_summarized: object
            .get("prices_summarized")
            .filter(|value| !value.is_null())
            .map(value_text),
        label,
    })
}

fn parse_label(value: &Value) -> Result<f64> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| anyhow!("label {number} is not representable as f64")),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .with_context(|| format!("label {text:?} is not numeric")),
        other => Err(anyhow!("label must be numeric (got {other})")),
    }
}

fn field_text(object: &Map<String, Value>, key: &str) -> String {
    object.get(key).map(value_text).unwrap_or_default()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Split rows into train/val/test.
pub fn split_dataset(mut rows: Vec<DatasetRow>, config: &SplitConfig) -> Result<DatasetSplits> {
    if rows.len() < config.test_size {
        return Err(anyhow!(
            "dataset has {} rows; at least {} are needed for the test split",
            rows.len(),
            config.test_size
        ));
    }
    let mut pool = rows.split_off(config.test_size);
    let mut test = rows;
    if config.drop_uncertain {
        test.retain(|row| !row.is_uncertain());
        pool.retain(|row| !row.is_uncertain());
    }

    let val_count = ((config.val_frac * pool.len() as f64).round() as usize).min(pool.len());
    let mut order: Vec<(String, usize)> = (0..pool.len())
        .map(|idx| (sha256_hex(&format!("{}:{idx}", config.seed)), idx))
        .collect();
    order.sort();
    let mut in_val = vec![false; pool.len()];
    for (_, idx) in order.iter().take(val_count) {
        in_val[*idx] = true;
    }

    let mut train = Vec::with_capacity(pool.len() - val_count);
    let mut val = Vec::with_capacity(val_count);
    for (row, selected) in pool.into_iter().zip(in_val) {
        if selected {
            val.push(row);
        } else {
            train.push(row);
        }
    }
    Ok(DatasetSplits { train, val, test })
}
