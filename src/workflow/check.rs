//! Workflow check step: report every configuration issue at once.
use super::EvalContext;
use crate::cli::CheckArgs;
use crate::config::validate_config;
use anyhow::{anyhow, Result};

pub(crate) fn run_check(args: &CheckArgs) -> Result<()> {
    let mut ctx = EvalContext::load(args.root.clone())?;
    ctx.override_prompt_version(args.prompt_version.as_deref());

    println!("root: {}", ctx.paths.root().display());
    println!("dataset: {}", ctx.paths.data_path().display());
    println!("prompts: {} ({})", ctx.paths.prompt_dir().display(), ctx.prompt_version());
    println!("model: {}", ctx.config.llm.model);
    println!(
        "search: {}",
        if !ctx.config.search.enabled {
            "disabled"
        } else if ctx.secrets.tavily_api_key.is_some() {
            "enabled"
        } else {
            "enabled (no API key; results will be error markers)"
        }
    );

    let issues = validate_config(&ctx.config, &ctx.paths, &ctx.secrets);
    if issues.is_empty() {
        println!("ok");
        return Ok(());
    }
    for issue in &issues {
        println!("issue: {issue}");
    }
    Err(anyhow!("{} configuration issue(s) found", issues.len()))
}
