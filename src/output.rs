//! Result files for one evaluated split.
//!
//! Each split produces a predictions CSV (flat, spreadsheet friendly), a
//! JSONL file with one [`ResultRecord`] per row (read back by `inspect`),
//! and a summary JSON with the [`EvalReport`].
use crate::dataset::DatasetRow;
use crate::evaluate::{EvalReport, RowOutcome};
use crate::paths::RunKind;
use crate::pipeline::Trace;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const RESULTS_SCHEMA_VERSION: u32 = 1;

/// Names of the run-specific CSV columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultColumns {
    pub response: &'static str,
    pub predicted: &'static str,
    /// Agent runs also export the trace.
    pub trace: Option<&'static str>,
}

impl ResultColumns {
    pub fn for_kind(kind: RunKind) -> Self {
        match kind {
            RunKind::Agent => Self {
                response: "agent_response",
                predicted: "agent_pred_relevance",
                trace: Some("agent_log"),
            },
            RunKind::Baseline => Self {
                response: "gpt_response",
                predicted: "gpt_pred_relevance",
                trace: None,
            },
        }
    }
}

/// One evaluated row as persisted in the JSONL results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub index: usize,
    pub split: String,
    pub row: DatasetRow,
    pub response: String,
    pub predicted: f64,
    pub trace: Trace,
}

impl ResultRecord {
    /// Valid prediction that disagrees with ground truth.
    pub fn is_mismatch(&self) -> bool {
        !crate::label::is_unknown(self.predicted) && (self.predicted - self.row.label).abs() > 1e-9
    }
}

/// Pair rows with their outcomes, in order.
pub fn build_records(
    split: &str,
    rows: &[DatasetRow],
    outcomes: Vec<RowOutcome>,
) -> Vec<ResultRecord> {
    rows.iter()
        .zip(outcomes)
        .enumerate()
        .map(|(index, (row, outcome))| ResultRecord {
            index,
            split: split.to_string(),
            row: row.clone(),
            response: outcome.response,
            predicted: outcome.predicted,
            trace: outcome.trace,
        })
        .collect()
}

/// Metadata written next to the predictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: u32,
    pub generated_at_epoch_ms: u64,
    pub kind: String,
    pub split: String,
    pub prompt_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    pub model: String,
    pub label_column: String,
    pub cache_enabled: bool,
    pub elapsed_ms: u64,
    pub report: EvalReport,
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
pub fn csv_escape(field: &str) -> String {
    if !field.contains([',', '"', '\n', '\r']) {
        return field.to_string();
    }
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn format_number(value: f64) -> String {
    format!("{value:?}")
}

fn csv_line(fields: &[String]) -> String {
    let mut line = fields
        .iter()
        .map(|field| csv_escape(field))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Render the predictions CSV, header included.
pub fn render_predictions_csv(
    records: &[ResultRecord],
    kind: RunKind,
    label_column: &str,
) -> Result<String> {
    let columns = ResultColumns::for_kind(kind);
    let mut header: Vec<String> = [
        "text",
        "name",
        "address",
        "normalized_main_rubric_name_ru",
        "reviews_summarized",
        label_column,
        columns.response,
        columns.predicted,
    ]
    .iter()
    .map(|name| name.to_string())
    .collect();
    if let Some(trace) = columns.trace {
        header.push(trace.to_string());
    }

    let mut out = csv_line(&header);
    for record in records {
        let row = &record.row;
        let mut fields = vec![
            row.text.clone(),
            row.name.clone(),
            row.address.clone(),
            row.normalized_main_rubric_name_ru.clone(),
            row.reviews_summarized.clone(),
            format_number(row.label),
            record.response.clone(),
            format_number(record.predicted),
        ];
        if columns.trace.is_some() {
            fields.push(record.trace.to_json_string()?);
        }
        out.push_str(&csv_line(&fields));
    }
    Ok(out)
}

pub fn write_predictions_csv(
    path: &Path,
    records: &[ResultRecord],
    kind: RunKind,
    label_column: &str,
) -> Result<()> {
    let text = render_predictions_csv(records, kind, label_column)?;
    write_text(path, &text)
}

pub fn write_predictions_jsonl(path: &Path, records: &[ResultRecord]) -> Result<()> {
    let mut text = String::new();
    for record in records {
        let line = serde_json::to_string(record).context("serialize result record")?;
        text.push_str(&line);
        text.push('\n');
    }
    write_text(path, &text)
}

pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let mut text = serde_json::to_string_pretty(summary).context("serialize run summary")?;
    text.push('\n');
    write_text(path, &text)
}

/// Read a JSONL results file written by [`write_predictions_jsonl`].
pub fn load_results(path: &Path) -> Result<Vec<ResultRecord>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read results {}", path.display()))?;
    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: ResultRecord = serde_json::from_str(line).with_context(|| {
            format!("parse results {} line {}", path.display(), idx + 1)
        })?;
        records.push(record);
    }
    if records.is_empty() {
        return Err(anyhow!("no result records in {}", path.display()));
    }
    Ok(records)
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, text).with_context(|| format!("write {}", path.display()))
}
