//! Workflow init step.
//!
//! Init lays out a workspace with the default prompts and a config stub so
//! `check` only has the dataset and API key left to report.
use crate::cli::InitArgs;
use crate::config::{config_stub, EvalConfig};
use crate::paths::WorkspacePaths;
use crate::prompts::install_default_templates;
use crate::util::workspace_relative;
use anyhow::{anyhow, Context, Result};
use std::fs;

/// Create directories, default templates and `relevance.json`.
pub(crate) fn run_init(args: &InitArgs) -> Result<()> {
    let root = args.root.clone();
    fs::create_dir_all(&root).with_context(|| format!("create {}", root.display()))?;
    let paths = WorkspacePaths::new(root, &EvalConfig::default());
    let config_path = paths.config_path();
    if config_path.is_file() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            config_path.display()
        ));
    }

    let mut dirs = paths.required_dirs();
    if let Some(data_dir) = paths.data_path().parent() {
        dirs.push(data_dir.to_path_buf());
    }
    for dir in dirs {
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    }

    for path in install_default_templates(&paths.prompt_dir(), args.force)? {
        println!("wrote {}", workspace_relative(&path, paths.root()));
    }

    let mut text = config_stub()?;
    text.push('\n');
    fs::write(&config_path, text).with_context(|| format!("write {}", config_path.display()))?;
    println!("wrote {}", workspace_relative(&config_path, paths.root()));
    println!(
        "next: place the dataset at {} and set OPENAI_API_KEY",
        workspace_relative(&paths.data_path(), paths.root())
    );
    Ok(())
}

#[cfg(test)]
#[path = "init_tests.rs"]
mod tests;
