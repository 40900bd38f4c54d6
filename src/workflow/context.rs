use crate::cli::RunArgs;
use crate::config::{self, EvalConfig, Secrets};
use crate::paths::WorkspacePaths;
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Resolved configuration for one command invocation.
pub(crate) struct EvalContext {
    pub(crate) paths: WorkspacePaths,
    pub(crate) config: EvalConfig,
    pub(crate) secrets: Secrets,
}

impl EvalContext {
    /// Layer defaults, `relevance.json`, `.env` and environment overrides.
    pub(crate) fn load(root: PathBuf) -> Result<Self> {
        let mut config = config::load_config(&root)?;
        config::load_env_file(&WorkspacePaths::new(root.clone(), &config));
        config::apply_env_overrides(&mut config);
        let paths = WorkspacePaths::new(root, &config);
        Ok(Self {
            paths,
            config,
            secrets: Secrets::from_env(),
        })
    }

    pub(crate) fn override_prompt_version(&mut self, version: Option<&str>) {
        if let Some(version) = version.map(str::trim).filter(|v| !v.is_empty()) {
            self.config.prompt_version = version.to_string();
        }
    }

    /// Apply CLI flags, the last configuration layer.
    ///
    /// `--data-path` is taken relative to the current directory, like `--root`,
    /// while `data_path` from relevance.json stays relative to the root.
    pub(crate) fn apply_run_args(&mut self, args: &RunArgs) -> Result<()> {
        self.override_prompt_version(args.prompt_version.as_deref());
        if let Some(data_path) = args.data_path.as_deref() {
            let data_path = resolve_cli_path(data_path)?;
            self.config.data_path = data_path.to_string_lossy().into_owned();
            self.paths = WorkspacePaths::new(self.paths.root().to_path_buf(), &self.config);
        }
        Ok(())
    }

    pub(crate) fn prompt_version(&self) -> &str {
        &self.config.prompt_version
    }
}

fn resolve_cli_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().context("resolve current directory")?;
    Ok(cwd.join(path))
}
