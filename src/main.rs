use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod compose;
mod config;
mod dataset;
mod evaluate;
mod inspect;
mod label;
mod llm;
mod output;
mod paths;
mod pipeline;
mod prompts;
mod search;
mod templates;
mod util;
mod workflow;

use cli::{Command, RootArgs};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Init(args) => workflow::run_init(&args),
        Command::Check(args) => workflow::run_check(&args),
        Command::Eval(args) => workflow::run_eval(&args),
        Command::Baseline(args) => workflow::run_baseline(&args),
        Command::Inspect(args) => workflow::run_inspect(&args),
    }
}

/// Log to stderr so stdout carries only command results.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "debug,ureq=warn"
    } else {
        "info,ureq=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
