//! Plain-text inspector for saved result files.
use crate::output::ResultRecord;
use crate::util::preview;
use anyhow::{anyhow, Context, Result};

const PREVIEW_MAX_CHARS: usize = 60;

fn field_or_empty(text: &str) -> &str {
    if text.trim().is_empty() {
        "<empty>"
    } else {
        text
    }
}

/// Look up the record with `index`.
pub fn find_record(records: &[ResultRecord], index: usize) -> Result<&ResultRecord> {
    records
        .iter()
        .find(|record| record.index == index)
        .ok_or_else(|| anyhow!("no result with index {index} ({} records)", records.len()))
}

/// Full view of one row: inputs, ground truth, verdict and trace.
pub fn render_record(record: &ResultRecord) -> Result<String> {
    let row = &record.row;
    let trace = serde_json::to_string_pretty(&record.trace).context("serialize trace")?;
    let mut out = String::new();
    out.push_str(&format!("index: {} ({})\n", record.index, record.split));
    out.push_str(&format!("query: {}\n", field_or_empty(&row.text)));
    out.push_str(&format!("name: {}\n", field_or_empty(&row.name)));
    out.push_str(&format!("address: {}\n", field_or_empty(&row.address)));
    out.push_str(&format!(
        "rubric: {}\n",
        field_or_empty(&row.normalized_main_rubric_name_ru)
    ));
    if let Some(prices) = row.prices_summarized.as_deref() {
        out.push_str(&format!("prices: {}\n", field_or_empty(prices)));
    }
    out.push_str(&format!("reviews:\n{}\n", field_or_empty(&row.reviews_summarized)));
    out.push_str(&format!("ground truth: {:?}\n", row.label));
    out.push_str(&format!("response: {}\n", field_or_empty(&record.response)));
    out.push_str(&format!("predicted: {:?}\n", record.predicted));
    if record.is_mismatch() {
        out.push_str("status: mismatch\n");
    }
    out.push_str(&format!("trace:\n{trace}\n"));
    Ok(out)
}

/// One summary line per row whose valid prediction disagrees with ground truth.
pub fn mismatch_lines(records: &[ResultRecord]) -> Vec<String> {
    records
        .iter()
        .filter(|record| record.is_mismatch())
        .map(|record| {
            format!(
                "{}\ttruth={:?}\tpred={:?}\t{} | {}",
                record.index,
                record.row.label,
                record.predicted,
                preview(&record.row.text, PREVIEW_MAX_CHARS),
                preview(&record.row.name, PREVIEW_MAX_CHARS),
            )
        })
        .collect()
}
