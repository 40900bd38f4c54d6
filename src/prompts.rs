//! Prompt template store.
//!
//! Templates live as plain text files named `{kind}_{version}.txt` in one
//! directory. Slots are written `{name}`; any other brace text (JSON examples,
//! for instance) passes through untouched.
use crate::templates;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Substituted for any slot whose value is empty, so the model sees
/// "field present but empty" instead of a gap.
pub const EMPTY_FIELD_PLACEHOLDER: &str = "—";

const PLACEHOLDER_PATTERN: &str = r"\{([A-Za-z_][A-Za-z0-9_]*)\}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Classify,
    NeedSearch,
}

impl PromptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::NeedSearch => "need_search",
        }
    }

    pub fn file_name(self, version: &str) -> String {
        format!("{}_{}.txt", self.as_str(), version)
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves `(kind, version)` pairs to templates and fills their slots.
#[derive(Debug, Clone)]
pub struct PromptStore {
    dir: PathBuf,
    placeholder: Regex,
}

impl PromptStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        let placeholder =
            Regex::new(PLACEHOLDER_PATTERN).context("compile placeholder pattern")?;
        Ok(Self { dir, placeholder })
    }

    /// Read the raw template text; a missing file is an error.
    pub fn load(&self, kind: PromptKind, version: &str) -> Result<String> {
        let path = self.dir.join(kind.file_name(version));
        if !path.is_file() {
            return Err(anyhow!("prompt not found: {}", path.display()));
        }
        fs::read_to_string(&path).with_context(|| format!("read prompt {}", path.display()))
    }

    /// Load a template and substitute every slot.
    pub fn render(
        &self,
        kind: PromptKind,
        version: &str,
        slots: &[(&str, &str)],
    ) -> Result<String> {
        let template = self.load(kind, version)?;
        self.fill(&template, slots)
            .with_context(|| format!("fill {}", kind.file_name(version)))
    }

    /// Substitute `{name}` slots; unknown slot names are an error.
    pub fn fill(&self, template: &str, slots: &[(&str, &str)]) -> Result<String> {
        let mut unknown = Vec::new();
        let filled = self
            .placeholder
            .replace_all(template, |caps: &regex::Captures| {
                let name = &caps[1];
                match slots.iter().find(|(slot, _)| *slot == name) {
                    Some((_, value)) if value.is_empty() => EMPTY_FIELD_PLACEHOLDER.to_string(),
                    Some((_, value)) => (*value).to_string(),
                    None => {
                        unknown.push(name.to_string());
                        caps[0].to_string()
                    }
                }
            })
            .into_owned();
        if !unknown.is_empty() {
            unknown.sort();
            unknown.dedup();
            return Err(anyhow!("unknown template slots: {}", unknown.join(", ")));
        }
        Ok(filled)
    }
}

/// Write the built-in templates into `dir`, skipping existing files unless forced.
pub fn install_default_templates(dir: &Path, force: bool) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let mut written = Vec::new();
    for (name, contents) in templates::DEFAULT_PROMPT_FILES {
        let path = dir.join(name);
        if path.is_file() && !force {
            continue;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> PromptStore {
        PromptStore::new(dir.to_path_buf()).expect("build store")
    }

    #[test]
    fn load_resolves_kind_and_version_to_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::write(dir.path().join("need_search_v2.txt"), "Need search? {query}")
            .expect("write template");

        let text = store(dir.path())
            .load(PromptKind::NeedSearch, "v2")
            .expect("load template");
        assert_eq!(text, "Need search? {query}");
    }

    #[test]
    fn load_missing_template_is_not_found() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let err = store(dir.path())
            .load(PromptKind::Classify, "v9")
            .expect_err("missing template");
        assert!(err.to_string().contains("prompt not found"));
        assert!(err.to_string().contains("classify_v9.txt"));
    }

    #[test]
    fn fill_replaces_empty_values_with_placeholder() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let filled = store(dir.path())
            .fill(
                "q={query} info={search_info}",
                &[("query", "breakfast"), ("search_info", "")],
            )
            .expect("fill");
        assert_eq!(filled, "q=breakfast info=—");
    }

    #[test]
    fn fill_leaves_json_braces_alone() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let filled = store(dir.path())
            .fill(r#"{"label": "x"} for {query}"#, &[("query", "q")])
            .expect("fill");
        assert_eq!(filled, r#"{"label": "x"} for q"#);
    }

    #[test]
    fn fill_rejects_unknown_slots() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let err = store(dir.path())
            .fill("{query} {price}", &[("query", "q")])
            .expect_err("unknown slot");
        assert!(err.to_string().contains("price"));
    }

    #[test]
    fn install_default_templates_respects_force() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let written = install_default_templates(dir.path(), false).expect("install");
        assert_eq!(written.len(), 2);

        fs::write(dir.path().join("classify_v1.txt"), "custom").expect("overwrite");
        let written = install_default_templates(dir.path(), false).expect("reinstall");
        assert!(written.is_empty());
        assert_eq!(
            fs::read_to_string(dir.path().join("classify_v1.txt")).expect("read"),
            "custom"
        );

        let written = install_default_templates(dir.path(), true).expect("force install");
        assert_eq!(written.len(), 2);
    }

    #[test]
    fn default_templates_only_use_known_slots() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = store(dir.path());
        let slots = [
            ("query", "q"),
            ("name", "n"),
            ("address", "a"),
            ("rubric", "r"),
            ("reviews", "rv"),
            ("search_info", "s"),
        ];
        store
            .fill(templates::CLASSIFY_V1_TXT, &slots)
            .expect("classify template fills");
        store
            .fill(templates::NEED_SEARCH_V1_TXT, &slots[..5])
            .expect("need_search template fills");
    }
}
