//! Typed paths into an evaluation workspace.
//!
//! Centralizing path construction keeps file access consistent across the
//! commands and prevents drift when the layout evolves.
use crate::config::EvalConfig;
use std::path::{Path, PathBuf};

/// Name of the optional workspace config file.
pub const CONFIG_FILE_NAME: &str = "relevance.json";

/// Which evaluation flavor produced a set of result files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Agent,
    Baseline,
}

impl RunKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Baseline => "baseline",
        }
    }
}

/// Convenience wrapper for locating workspace artifacts.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    root: PathBuf,
    data_rel: String,
    prompt_rel: String,
    experiments_rel: String,
}

impl WorkspacePaths {
    /// Create a path helper rooted at the workspace root.
    pub fn new(root: PathBuf, config: &EvalConfig) -> Self {
        Self {
            root,
            data_rel: config.data_path.clone(),
            prompt_rel: config.prompt_dir.clone(),
            experiments_rel: config.experiments_dir.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the `relevance.json` path.
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    /// Return the `.env` path.
    pub fn env_path(&self) -> PathBuf {
        self.root.join(".env")
    }

    /// Return the dataset path.
    pub fn data_path(&self) -> PathBuf {
        self.root.join(&self.data_rel)
    }

    /// Return the prompt template directory.
    pub fn prompt_dir(&self) -> PathBuf {
        self.root.join(&self.prompt_rel)
    }

    /// Return the `experiments/` directory.
    pub fn experiments_dir(&self) -> PathBuf {
        self.root.join(&self.experiments_rel)
    }

    /// Return the per-kind results directory (`experiments/agent`, `experiments/baseline`).
    pub fn results_dir(&self, kind: RunKind) -> PathBuf {
        self.experiments_dir().join(kind.dir_name())
    }

    /// Return the search cache directory shared by every agent run.
    pub fn search_cache_dir(&self) -> PathBuf {
        self.results_dir(RunKind::Agent).join("search_cache")
    }

    /// Return the predictions CSV path for one split.
    pub fn predictions_csv(&self, kind: RunKind, prefix: &str, split: &str) -> PathBuf {
        self.results_dir(kind)
            .join(format!("{prefix}_{split}_predictions.csv"))
    }

    /// Return the predictions JSONL path for one split.
    pub fn predictions_jsonl(&self, kind: RunKind, prefix: &str, split: &str) -> PathBuf {
        self.results_dir(kind)
            .join(format!("{prefix}_{split}_predictions.jsonl"))
    }

    /// Return the run summary path for one split.
    pub fn summary_path(&self, kind: RunKind, prefix: &str, split: &str) -> PathBuf {
        self.results_dir(kind)
            .join(format!("{prefix}_{split}_summary.json"))
    }

    /// Directories that must exist before a run writes anything.
    pub fn required_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.experiments_dir(),
            self.results_dir(RunKind::Agent),
            self.results_dir(RunKind::Baseline),
            self.search_cache_dir(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_paths_follow_prefix_and_split() {
        let config = EvalConfig::default();
        let paths = WorkspacePaths::new(PathBuf::from("/work"), &config);
        assert_eq!(
            paths.predictions_csv(RunKind::Agent, "agent_v1", "val"),
            PathBuf::from("/work/experiments/agent/agent_v1_val_predictions.csv")
        );
        assert_eq!(
            paths.search_cache_dir(),
            PathBuf::from("/work/experiments/agent/search_cache")
        );
        assert_eq!(
            paths.summary_path(RunKind::Baseline, "gpt", "test"),
            PathBuf::from("/work/experiments/baseline/gpt_test_summary.json")
        );
    }
}
