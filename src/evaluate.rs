//! Batch runner and accuracy report.
//!
//! Rows are processed in chunks of `batch_size`. Inside a chunk the rows are
//! split into contiguous runs handled by up to `workers` scoped threads, each
//! sleeping `delay` after every row to stay under provider rate limits.
//! Results come back in input order.
use crate::dataset::DatasetRow;
use crate::label::{is_unknown, map_to_label};
use crate::llm::GENERATION_FAILED;
use crate::pipeline::{Pipeline, PipelineState, Route, Trace};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};

const WORKER_ERROR_KEY: &str = "worker_error";

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub batch_size: usize,
    pub workers: usize,
    pub delay: Duration,
    pub prompt_version: String,
    pub cache_enabled: bool,
}

/// Pipeline result for one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowOutcome {
    pub response: String,
    pub predicted: f64,
    pub trace: Trace,
}

impl RowOutcome {
    fn from_state(state: PipelineState) -> Self {
        let response = state.verdict_str().to_string();
        Self {
            predicted: map_to_label(&response),
            response,
            trace: state.trace,
        }
    }

    fn worker_failure() -> Self {
        let mut trace = Trace::default();
        trace.record(WORKER_ERROR_KEY, "worker thread panicked");
        Self {
            response: GENERATION_FAILED.to_string(),
            predicted: map_to_label(GENERATION_FAILED),
            trace,
        }
    }
}

/// Aggregate numbers for one evaluated split.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub total: usize,
    /// Rows whose prediction is not the unknown label.
    pub valid: usize,
    pub errors: usize,
    pub correct: usize,
    /// `correct / valid`; absent when nothing was valid.
    pub accuracy: Option<f64>,
    pub search_used: usize,
}

impl EvalReport {
    pub fn from_outcomes(rows: &[DatasetRow], outcomes: &[RowOutcome]) -> Self {
        let mut report = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for (row, outcome) in rows.iter().zip(outcomes) {
            if outcome.trace.route() == Some(Route::Search) {
                report.search_used += 1;
            }
            if is_unknown(outcome.predicted) {
                report.errors += 1;
                continue;
            }
            report.valid += 1;
            if (outcome.predicted - row.label).abs() < 1e-9 {
                report.correct += 1;
            }
        }
        report.accuracy = (report.valid > 0).then(|| report.correct as f64 / report.valid as f64);
        report
    }

    /// Share of rows that went through the search step, in percent.
    pub fn search_share(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.search_used as f64 * 100.0 / self.total as f64
    }
}

pub struct Evaluator<'a> {
    pipeline: &'a Pipeline<'a>,
    options: RunOptions,
}

impl<'a> Evaluator<'a> {
    pub fn new(pipeline: &'a Pipeline<'a>, options: RunOptions) -> Self {
        Self { pipeline, options }
    }

    pub fn evaluate(&self, rows: &[DatasetRow]) -> Vec<RowOutcome> {
        let batch_size = self.options.batch_size.max(1);
        let batches = rows.len().div_ceil(batch_size);
        let start = Instant::now();
        let mut outcomes = Vec::with_capacity(rows.len());
        for (idx, chunk) in rows.chunks(batch_size).enumerate() {
            outcomes.extend(self.evaluate_chunk(chunk));
            tracing::info!(
                batch = idx + 1,
                batches,
                processed = outcomes.len(),
                total = rows.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "batch complete"
            );
        }
        outcomes
    }

    fn evaluate_chunk(&self, chunk: &[DatasetRow]) -> Vec<RowOutcome> {
        let workers = self.options.workers.clamp(1, chunk.len().max(1));
        if workers == 1 {
            return self.evaluate_run(chunk);
        }
        let run_len = chunk.len().div_ceil(workers);
        thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .chunks(run_len)
                .map(|run| (run.len(), scope.spawn(move || self.evaluate_run(run))))
                .collect();
            let mut outcomes = Vec::with_capacity(chunk.len());
            for (len, handle) in handles {
                match handle.join() {
                    Ok(results) => outcomes.extend(results),
                    Err(_) => {
                        tracing::error!(rows = len, "evaluation worker panicked");
                        outcomes.extend((0..len).map(|_| RowOutcome::worker_failure()));
                    }
                }
            }
            outcomes
        })
    }

    fn evaluate_run(&self, run: &[DatasetRow]) -> Vec<RowOutcome> {
        run.iter()
            .map(|row| {
                let outcome = self.evaluate_row(row);
                if !self.options.delay.is_zero() {
                    thread::sleep(self.options.delay);
                }
                outcome
            })
            .collect()
    }

    fn evaluate_row(&self, row: &DatasetRow) -> RowOutcome {
        let state = PipelineState::new(
            row.text.clone(),
            row.listing(),
            self.options.prompt_version.clone(),
            self.options.cache_enabled,
        );
        RowOutcome::from_state(self.pipeline.run(state))
    }
}
