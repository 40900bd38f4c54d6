//! CLI argument parsing for the evaluation workflow.
//!
//! The CLI stays thin: each command maps onto one function in `workflow`.
use crate::dataset::SplitSelection;
use crate::pipeline::PipelinePreset;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint for relevance evaluation runs.
#[derive(Parser, Debug)]
#[command(
    name = "lrel",
    version,
    about = "LLM relevance evaluation for business listings",
    after_help = "Commands:\n  init --root <dir>                Create prompts, config stub and output dirs\n  check --root <dir>               Report configuration issues\n  eval --root <dir>                Run the search-augmented pipeline on val/test\n  baseline --root <dir>            Run classification only on val/test\n  inspect --results <file.jsonl>   Show one result row or list mismatches\n\nExamples:\n  lrel init --root ./work\n  lrel eval --root ./work --prompt-version v2 --pipeline v3 --split val\n  lrel baseline --root ./work --limit 50\n  lrel inspect --results ./work/experiments/agent/agent_v1_val_predictions.jsonl --mismatches",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Init(InitArgs),
    Check(CheckArgs),
    Eval(EvalArgs),
    Baseline(BaselineArgs),
    Inspect(InspectArgs),
}

/// Init command inputs for bootstrapping a workspace.
#[derive(Parser, Debug)]
#[command(about = "Initialize a workspace (prompts, config stub, output dirs)")]
pub struct InitArgs {
    /// Workspace root holding relevance.json, prompts/, data/ and experiments/
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Overwrite existing prompt templates and relevance.json
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Validate config, dataset, prompts and credentials")]
pub struct CheckArgs {
    /// Workspace root holding relevance.json, prompts/, data/ and experiments/
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Prompt template version to check
    #[arg(long, value_name = "VERSION")]
    pub prompt_version: Option<String>,
}

/// Inputs shared by the agent and baseline runs.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Workspace root holding relevance.json, prompts/, data/ and experiments/
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Prompt template version (classify_<v>.txt, need_search_<v>.txt)
    #[arg(long, value_name = "VERSION")]
    pub prompt_version: Option<String>,

    /// Rows per progress batch
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub batch_size: usize,

    /// Dataset path, relative to the current directory (overrides relevance.json)
    #[arg(long, value_name = "PATH")]
    pub data_path: Option<PathBuf>,

    /// Prefix of the result file names
    #[arg(long, value_name = "PREFIX")]
    pub output_prefix: Option<String>,

    /// Worker threads per batch
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub workers: usize,

    /// Pause after each row, per worker
    #[arg(long, value_name = "MS", default_value_t = 100)]
    pub delay_ms: u64,

    /// Evaluate only the first N rows of each split
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Which split(s) to evaluate: val, test or all
    #[arg(long, value_name = "SPLIT", default_value = "all")]
    pub split: SplitSelection,
}

#[derive(Parser, Debug)]
#[command(about = "Evaluate the search-augmented pipeline")]
pub struct EvalArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Pipeline variant: v1 (merge, raw), v2 (separate, raw), v3 (separate, noise stripped)
    #[arg(long, value_name = "VARIANT", default_value = "v3")]
    pub pipeline: PipelinePreset,

    /// Bypass the search cache for this run
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Evaluate classification without search")]
pub struct BaselineArgs {
    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Inspect a saved results file")]
pub struct InspectArgs {
    /// JSONL results file written by eval or baseline
    #[arg(long, value_name = "PATH")]
    pub results: PathBuf,

    /// Show the row with this index
    #[arg(
        long,
        value_name = "N",
        conflicts_with = "mismatches",
        required_unless_present = "mismatches"
    )]
    pub index: Option<usize>,

    /// List rows whose prediction disagrees with ground truth
    #[arg(long)]
    pub mismatches: bool,
}
