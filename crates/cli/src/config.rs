use anyhow::{Context as AnyhowContext, Result};
use serde::Deserialize;
use shadow_protocol::DEFAULT_SHADOW_DIR;
use shadow_scheduler::SchedulerConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "shadow-sync.toml";
pub const GENERATOR_ENV: &str = "SHADOW_SYNC_GENERATOR";
pub const DEBOUNCE_ENV: &str = "SHADOW_SYNC_DEBOUNCE_MS";

/// Contents of `shadow-sync.toml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub generator: GeneratorConfig,
    pub scheduler: SchedulerSection,
    pub prompts: PromptsConfig,
    pub shadow: ShadowConfig,
    pub dependencies: DependenciesConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Program and arguments. `{system}` and `{user}` are replaced by the prompts;
    /// without them both prompts go to stdin.
    pub command: Vec<String>,
    pub timeout_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    pub debounce_ms: u64,
    pub poll_interval_ms: Option<u64>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            debounce_ms: 1500,
            poll_interval_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PromptsConfig {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShadowConfig {
    pub dir: String,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            dir: DEFAULT_SHADOW_DIR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DependenciesConfig {
    pub auto_install: bool,
    pub install_timeout_ms: u64,
}

impl Default for DependenciesConfig {
    fn default() -> Self {
        Self {
            auto_install: true,
            install_timeout_ms: 30_000,
        }
    }
}

impl SyncConfig {
    /// Reads `explicit`, or `<root>/shadow-sync.toml` when it exists, then applies
    /// environment overrides.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::from_file(&root.join(path))?,
            None => {
                let default_path = root.join(CONFIG_FILE_NAME);
                if default_path.is_file() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup(GENERATOR_ENV).filter(|v| !v.trim().is_empty()) {
            self.generator.command = serde_json::from_str(&raw)
                .with_context(|| format!("{GENERATOR_ENV} must be a JSON array of strings"))?;
        }
        if let Some(raw) = lookup(DEBOUNCE_ENV).filter(|v| !v.trim().is_empty()) {
            self.scheduler.debounce_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("{DEBOUNCE_ENV} must be a number of milliseconds"))?;
        }
        Ok(self)
    }

    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            debounce: Duration::from_millis(self.scheduler.debounce_ms),
            poll_interval: self
                .scheduler
                .poll_interval_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        }
    }

    #[must_use]
    pub fn prompts_dir(&self, root: &Path) -> Option<PathBuf> {
        self.prompts.dir.as_ref().map(|dir| root.join(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_file_means_defaults() {
        let temp = TempDir::new().expect("tempdir");
        let config = SyncConfig::load_without_env(temp.path());
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.shadow.dir, ".shadows");
        assert_eq!(config.scheduler_config().debounce, Duration::from_millis(1500));
        assert_eq!(config.scheduler_config().poll_interval, None);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = TempDir::new().expect("tempdir");
        std::fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            r#"
[generator]
command = ["llm", "--system", "{system}", "{user}"]

[scheduler]
poll_interval_ms = 5000

[dependencies]
auto_install = false
"#,
        )
        .expect("write");
        let config = SyncConfig::load_without_env(temp.path());
        assert_eq!(config.generator.command[0], "llm");
        assert_eq!(config.generator.timeout_ms, 120_000);
        assert_eq!(
            config.scheduler_config().poll_interval,
            Some(Duration::from_secs(5))
        );
        assert!(!config.dependencies.auto_install);
        assert_eq!(config.dependencies.install_timeout_ms, 30_000);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("custom.toml");
        std::fs::write(&path, "[scheduler]\ndebounce = 10\n").expect("write");
        let err = SyncConfig::from_file(&path).expect_err("unknown key");
        assert!(format!("{err:#}").contains("debounce"));
    }

    #[test]
    fn env_overrides_win_over_the_file() {
        let config = SyncConfig::default()
            .with_overrides(|key| match key {
                GENERATOR_ENV => Some(r#"["cat"]"#.to_string()),
                DEBOUNCE_ENV => Some(" 250 ".to_string()),
                _ => None,
            })
            .expect("overrides");
        assert_eq!(config.generator.command, vec!["cat".to_string()]);
        assert_eq!(config.scheduler.debounce_ms, 250);

        let bad = SyncConfig::default().with_overrides(|key| {
            (key == GENERATOR_ENV).then(|| "cat --flag".to_string())
        });
        assert!(bad.is_err());
    }

    impl SyncConfig {
        fn load_without_env(root: &Path) -> Self {
            let path = root.join(CONFIG_FILE_NAME);
            if path.is_file() {
                Self::from_file(&path).expect("config")
            } else {
                Self::default()
            }
        }
    }
}
