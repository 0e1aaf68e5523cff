use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::engine::{
    DEFAULT_CONTENT_BUDGET, DEFAULT_INVOKE_TTL, DEFAULT_MANUAL_TTL, DEFAULT_MAX_HINTS,
};

/// Skills gating configuration.
///
/// Controls which stored skills are loaded into the registry.
/// Capability-backed skills registered in code are never gated.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SkillsConfig {
    /// Master switch. When `false` no stored skills are loaded.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Allowlist of skill names. When non-empty only these skills are kept.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Denylist of skill names. Matching skills are removed after allow filtering.
    #[serde(default)]
    pub deny: Vec<String>,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow: Vec::new(),
            deny: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Top-level configuration loaded from `config.yaml`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding `<name>/SKILL.md` documents.  Relative paths are
    /// resolved against the home directory.  When absent, skill authoring
    /// is disabled.
    #[serde(default)]
    pub skills_dir: Option<String>,
    /// Maximum characters of skill content injected per turn.
    #[serde(default = "default_content_budget")]
    pub content_budget: usize,
    /// Idle turns before an invoked or triggered skill is unloaded.
    #[serde(default = "default_invoke_ttl")]
    pub invoke_ttl: u32,
    /// Idle turns before an explicitly loaded skill is unloaded.
    #[serde(default = "default_manual_ttl")]
    pub manual_ttl: u32,
    /// Maximum trigger hints shown per message.
    #[serde(default = "default_max_hints")]
    pub max_hints: usize,
    /// Re-sync the registry whenever `skills_dir` changes on disk.
    #[serde(default)]
    pub watch: bool,
    /// Skills loaded into every new session.
    #[serde(default)]
    pub onboarding: Vec<String>,
    /// Skills gating configuration.
    #[serde(default)]
    pub skills: Option<SkillsConfig>,
}

fn default_content_budget() -> usize {
    DEFAULT_CONTENT_BUDGET
}

fn default_invoke_ttl() -> u32 {
    DEFAULT_INVOKE_TTL
}

fn default_manual_ttl() -> u32 {
    DEFAULT_MANUAL_TTL
}

fn default_max_hints() -> usize {
    DEFAULT_MAX_HINTS
}

impl Default for Config {
    /// Configuration used when no config file exists: skills live in
    /// `<home>/skills`.
    fn default() -> Self {
        Self {
            skills_dir: Some(crate::claw_home().join("skills").to_string_lossy().to_string()),
            content_budget: DEFAULT_CONTENT_BUDGET,
            invoke_ttl: DEFAULT_INVOKE_TTL,
            manual_ttl: DEFAULT_MANUAL_TTL,
            max_hints: DEFAULT_MAX_HINTS,
            watch: false,
            onboarding: Vec::new(),
            skills: None,
        }
    }
}

impl Config {
    /// Read and parse a YAML configuration file, falling back to
    /// `<path>.bak` when the file itself is missing.
    pub async fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let bak_path = bak_path(path);
                match tokio::fs::read_to_string(&bak_path).await {
                    Ok(c) => {
                        tracing::warn!(
                            path = %path.display(),
                            bak = %bak_path.display(),
                            "config file not found, falling back to .bak"
                        );
                        c
                    }
                    Err(_) => {
                        return Err(e).with_context(|| {
                            format!("failed to read config file: {}", path.display())
                        });
                    }
                }
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config file: {}", path.display()));
            }
        };

        let config = Self::from_yaml(&contents)?;
        tracing::debug!(
            path = %path.display(),
            skills_dir = ?config.skills_dir,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Like [`Config::load`], but returns [`Config::default`] when neither
    /// the file nor its `.bak` exists.
    pub async fn load_or_default(path: &Path) -> anyhow::Result<Config> {
        if !path.exists() && !bak_path(path).exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        Self::load(path).await
    }

    /// Parse, validate, and resolve a YAML document.
    pub fn from_yaml(contents: &str) -> anyhow::Result<Config> {
        let mut config: Config =
            serde_yaml::from_str(contents).context("failed to parse config YAML")?;
        config.validate()?;

        if let Some(dir) = &config.skills_dir {
            let p = Path::new(dir);
            if p.is_relative() {
                config.skills_dir = Some(crate::claw_home().join(p).to_string_lossy().to_string());
            }
        }
        Ok(config)
    }

    /// Validate semantic constraints that serde cannot enforce.
    fn validate(&self) -> anyhow::Result<()> {
        if self.content_budget == 0 {
            anyhow::bail!("config: content_budget must be greater than 0");
        }
        if self.invoke_ttl == 0 {
            anyhow::bail!("config: invoke_ttl must be greater than 0");
        }
        if self.manual_ttl == 0 {
            anyhow::bail!("config: manual_ttl must be greater than 0");
        }
        if self.max_hints == 0 {
            anyhow::bail!("config: max_hints must be greater than 0");
        }
        if self.skills_dir.as_deref().is_some_and(|d| d.trim().is_empty()) {
            anyhow::bail!("config: skills_dir must not be empty when set");
        }
        for slug in &self.onboarding {
            crate::skills::validate_slug(slug)
                .map_err(|e| anyhow::anyhow!("config: onboarding entry '{slug}': {e}"))?;
        }
        Ok(())
    }

    /// Resolved skills directory, if storage is configured.
    pub fn skills_path(&self) -> Option<PathBuf> {
        self.skills_dir.as_ref().map(PathBuf::from)
    }

    /// Serialize and write the configuration back to a YAML file.
    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = serde_yaml::to_string(self).context("serialize config YAML")?;
        tokio::fs::write(path, &contents)
            .await
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

fn bak_path(path: &Path) -> PathBuf {
    let mut bak_name = path.as_os_str().to_os_string();
    bak_name.push(".bak");
    PathBuf::from(bak_name)
}
