//! Workflow eval and baseline steps.
//!
//! Both load and split the dataset, build a pipeline over the real ports,
//! then evaluate the selected splits and write their result files.
use super::EvalContext;
use crate::cli::{BaselineArgs, EvalArgs, RunArgs};
use crate::dataset::{load_dataset, split_dataset, DatasetRow, DatasetSplits};
use crate::evaluate::{EvalReport, Evaluator, RunOptions};
use crate::llm::{ChatClient, GenerationSettings};
use crate::output::{
    build_records, write_predictions_csv, write_predictions_jsonl, write_summary, RunSummary,
    RESULTS_SCHEMA_VERSION,
};
use crate::paths::RunKind;
use crate::pipeline::{Pipeline, PipelineMode, PipelinePreset};
use crate::prompts::{PromptKind, PromptStore};
use crate::search::{BackendState, CachedSearch};
use crate::util::{now_epoch_ms, workspace_relative};
use anyhow::{Context, Result};
use std::fs;
use std::time::{Duration, Instant};

/// Run the decide/search/classify pipeline over the selected splits.
pub(crate) fn run_eval(args: &EvalArgs) -> Result<()> {
    let mut ctx = EvalContext::load(args.run.root.clone())?;
    ctx.apply_run_args(&args.run)?;
    if args.no_cache {
        ctx.config.use_cache = false;
    }
    let api_key = ctx.secrets.require_openai_key()?;
    let store = prompt_store(&ctx, &[PromptKind::NeedSearch, PromptKind::Classify])?;
    let splits = load_splits(&ctx)?;
    ensure_output_dirs(&ctx)?;

    let generator = ChatClient::new(&ctx.config.llm, api_key);
    let search = CachedSearch::from_config(
        &ctx.config.search,
        ctx.secrets.tavily_api_key.as_deref(),
        ctx.paths.search_cache_dir(),
    );
    let variant = args.pipeline.variant(&ctx.config.search.noise_marker);
    let pipeline = Pipeline::new(
        &generator,
        &search,
        &store,
        GenerationSettings::from_config(&ctx.config.llm),
        variant,
    );
    let prefix = args
        .run
        .output_prefix
        .clone()
        .unwrap_or_else(|| format!("agent_{}", ctx.prompt_version()));

    let run = SplitRun {
        ctx: &ctx,
        pipeline: &pipeline,
        kind: RunKind::Agent,
        preset: Some(args.pipeline),
        prefix: &prefix,
        args: &args.run,
    };
    run.evaluate_splits(&splits)
}

/// Run classification only, without deciding or searching.
pub(crate) fn run_baseline(args: &BaselineArgs) -> Result<()> {
    let mut ctx = EvalContext::load(args.run.root.clone())?;
    ctx.apply_run_args(&args.run)?;
    let api_key = ctx.secrets.require_openai_key()?;
    let store = prompt_store(&ctx, &[PromptKind::Classify])?;
    let splits = load_splits(&ctx)?;
    ensure_output_dirs(&ctx)?;

    let generator = ChatClient::new(&ctx.config.llm, api_key);
    let search = CachedSearch::new(ctx.paths.search_cache_dir(), BackendState::Disabled);
    let pipeline = Pipeline::new(
        &generator,
        &search,
        &store,
        GenerationSettings::from_config(&ctx.config.llm),
        PipelinePreset::V2.variant(""),
    )
    .with_mode(PipelineMode::Baseline);
    let prefix = args
        .run
        .output_prefix
        .clone()
        .unwrap_or_else(|| format!("baseline_{}", ctx.prompt_version()));

    let run = SplitRun {
        ctx: &ctx,
        pipeline: &pipeline,
        kind: RunKind::Baseline,
        preset: None,
        prefix: &prefix,
        args: &args.run,
    };
    run.evaluate_splits(&splits)
}

/// Build the prompt store and fail early when a required template is missing.
fn prompt_store(ctx: &EvalContext, kinds: &[PromptKind]) -> Result<PromptStore> {
    let store = PromptStore::new(ctx.paths.prompt_dir())?;
    for kind in kinds {
        store.load(*kind, ctx.prompt_version())?;
    }
    Ok(store)
}

fn load_splits(ctx: &EvalContext) -> Result<DatasetSplits> {
    let rows = load_dataset(&ctx.paths.data_path(), &ctx.config.label_column)?;
    let splits = split_dataset(rows, &ctx.config.split)?;
    println!(
        "dataset loaded: train {}, val {}, test {}",
        splits.train.len(),
        splits.val.len(),
        splits.test.len()
    );
    Ok(splits)
}

fn ensure_output_dirs(ctx: &EvalContext) -> Result<()> {
    for dir in ctx.paths.required_dirs() {
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    }
    Ok(())
}

struct SplitRun<'a> {
    ctx: &'a EvalContext,
    pipeline: &'a Pipeline<'a>,
    kind: RunKind,
    preset: Option<PipelinePreset>,
    prefix: &'a str,
    args: &'a RunArgs,
}

impl SplitRun<'_> {
    fn evaluate_splits(&self, splits: &DatasetSplits) -> Result<()> {
        if self.args.split.includes_val() {
            self.evaluate_split("val", &splits.val)?;
        }
        if self.args.split.includes_test() {
            self.evaluate_split("test", &splits.test)?;
        }
        Ok(())
    }

    fn evaluate_split(&self, split: &str, rows: &[DatasetRow]) -> Result<()> {
        let rows = match self.args.limit {
            Some(limit) => &rows[..limit.min(rows.len())],
            None => rows,
        };
        let config = &self.ctx.config;
        println!(
            "evaluating {split}: {} rows ({} run, prompt {})",
            rows.len(),
            self.kind.dir_name(),
            config.prompt_version
        );
        tracing::info!(
            split,
            rows = rows.len(),
            variant = ?self.pipeline.variant(),
            cache = config.use_cache,
            "evaluation started"
        );

        let options = RunOptions {
            batch_size: self.args.batch_size,
            workers: self.args.workers,
            delay: Duration::from_millis(self.args.delay_ms),
            prompt_version: config.prompt_version.clone(),
            cache_enabled: config.use_cache,
        };
        let start = Instant::now();
        let outcomes = Evaluator::new(self.pipeline, options).evaluate(rows);
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let report = EvalReport::from_outcomes(rows, &outcomes);
        let records = build_records(split, rows, outcomes);
        self.print_report(split, &report);

        let paths = &self.ctx.paths;
        let csv_path = paths.predictions_csv(self.kind, self.prefix, split);
        write_predictions_csv(&csv_path, &records, self.kind, &config.label_column)?;
        let jsonl_path = paths.predictions_jsonl(self.kind, self.prefix, split);
        write_predictions_jsonl(&jsonl_path, &records)?;
        let summary_path = paths.summary_path(self.kind, self.prefix, split);
        let summary = RunSummary {
            schema_version: RESULTS_SCHEMA_VERSION,
            generated_at_epoch_ms: now_epoch_ms(),
            kind: self.kind.dir_name().to_string(),
            split: split.to_string(),
            prompt_version: config.prompt_version.clone(),
            pipeline: self.preset.map(|preset| preset.to_string()),
            model: config.llm.model.clone(),
            label_column: config.label_column.clone(),
            cache_enabled: config.use_cache,
            elapsed_ms,
            report,
        };
        write_summary(&summary_path, &summary)?;

        for path in [&csv_path, &jsonl_path, &summary_path] {
            println!("wrote {}", workspace_relative(path, paths.root()));
        }
        Ok(())
    }

    fn print_report(&self, split: &str, report: &EvalReport) {
        match report.accuracy {
            Some(accuracy) => println!(
                "{split} accuracy: {accuracy:.4} (over {} valid rows)",
                report.valid
            ),
            None => println!("{split}: no valid predictions; accuracy unavailable"),
        }
        println!("{split} errors: {} of {}", report.errors, report.total);
        if self.pipeline.mode() == PipelineMode::Agent {
            println!(
                "{split} search used: {} of {} ({:.1}%)",
                report.search_used,
                report.total,
                report.search_share()
            );
        }
    }
}

