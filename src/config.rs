use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::policy::{
    ExclusionSet, ExtensionAllowlist, ExtractionPolicy, DEFAULT_EXTENSIONS, DEFAULT_MAX_FILE_BYTES,
};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Replaces the default allowlist when set.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Added to the fixed baseline exclusions.
    #[serde(default)]
    pub exclusions: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            exclusions: Vec::new(),
            max_file_bytes: default_max_file_bytes(),
            follow_symlinks: false,
        }
    }
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}
fn default_max_file_bytes() -> u64 {
    DEFAULT_MAX_FILE_BYTES
}

impl ExtractionConfig {
    /// Immutable policy handed to each traversal.
    pub fn policy(&self) -> ExtractionPolicy {
        ExtractionPolicy {
            exclusions: ExclusionSet::with_additions(&self.exclusions),
            extensions: ExtensionAllowlist::new(&self.extensions),
            max_file_bytes: self.max_file_bytes,
            follow_symlinks: self.follow_symlinks,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ModelsConfig {
    /// Answers the user.
    #[serde(default = "default_main_model")]
    pub main: String,
    /// Picks relevant files and writes sandbox code.
    #[serde(default = "default_selector_model")]
    pub selector: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            main: default_main_model(),
            selector: default_selector_model(),
        }
    }
}

fn default_main_model() -> String {
    "gpt-5.1".to_string()
}
fn default_selector_model() -> String {
    "gpt-5-mini".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_llm_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_sandbox_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            timeout_secs: default_sandbox_timeout_secs(),
        }
    }
}

fn default_interpreter() -> String {
    "python3".to_string()
}
fn default_sandbox_timeout_secs() -> u64 {
    15
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Apply comma-separated `--ext` / `--exclude` values. Both replace the
    /// configured lists; the baseline exclusions stay regardless.
    pub fn with_overrides(mut self, ext: Option<&str>, exclude: Option<&str>) -> Self {
        if let Some(ext) = ext {
            self.extraction.extensions = crate::policy::parse_list(ext);
        }
        if let Some(exclude) = exclude {
            self.extraction.exclusions = crate::policy::parse_list(exclude);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.extraction.max_file_bytes == 0 {
            anyhow::bail!("extraction.max_file_bytes must be > 0");
        }

        if !(60..=120).contains(&self.llm.timeout_secs) {
            anyhow::bail!(
                "llm.timeout_secs must be in [60, 120], got {}",
                self.llm.timeout_secs
            );
        }
        if self.llm.base_url.trim().is_empty() {
            anyhow::bail!("llm.base_url must not be empty");
        }

        if self.models.main.trim().is_empty() || self.models.selector.trim().is_empty() {
            anyhow::bail!("models.main and models.selector must not be empty");
        }

        if self.sandbox.timeout_secs == 0 {
            anyhow::bail!("sandbox.timeout_secs must be > 0");
        }
        if self.sandbox.interpreter.trim().is_empty() {
            anyhow::bail!("sandbox.interpreter must not be empty");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(body: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn empty_file_gives_defaults() {
        let f = write_config("");
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.models.main, "gpt-5.1");
        assert_eq!(config.models.selector, "gpt-5-mini");
        assert_eq!(config.llm.timeout_secs, 120);
        assert_eq!(config.sandbox.timeout_secs, 15);
        assert_eq!(config.extraction.policy(), ExtractionPolicy::default());
    }

    #[test]
    fn sections_override_defaults() {
        let f = write_config(
            r#"
[extraction]
extensions = ["RS", ".toml"]
exclusions = ["fixtures"]
max_file_bytes = 2048

[models]
main = "big"
"#,
        );
        let config = load_config(f.path()).unwrap();
        let policy = config.extraction.policy();
        assert_eq!(policy.extensions.iter().collect::<Vec<_>>(), vec![".rs", ".toml"]);
        assert!(policy.exclusions.contains("fixtures"));
        assert!(policy.exclusions.contains(".git"));
        assert_eq!(policy.max_file_bytes, 2048);
        assert_eq!(config.models.main, "big");
        assert_eq!(config.models.selector, "gpt-5-mini");
    }

    #[test]
    fn timeout_out_of_range_is_rejected() {
        let f = write_config("[llm]\ntimeout_secs = 30\n");
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("llm.timeout_secs"));
    }

    #[test]
    fn zero_ceiling_is_rejected() {
        let f = write_config("[extraction]\nmax_file_bytes = 0\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn overrides_replace_lists() {
        let config = Config::minimal().with_overrides(Some("py, md"), Some("build"));
        let policy = config.extraction.policy();
        assert_eq!(policy.extensions.len(), 2);
        assert!(policy.extensions.contains(".md"));
        assert!(policy.exclusions.contains("build"));
        assert!(policy.exclusions.contains("node_modules"));
    }

    #[test]
    fn missing_file_falls_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_or_default(&dir.path().join("pctx.toml")).unwrap();
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
    }
}
