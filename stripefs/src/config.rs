use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Replaces `defaults` when set.
pub const DEFAULTS_ENV: &str = "STRIPEFS_DEFAULTS";
/// Replaces `conf_file` when set.
pub const CONF_FILE_ENV: &str = "CEPH_CONF";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    // default layout, `user@pool,stripeCount,stripeUnit,objectSize`
    pub defaults: Option<String>,
    // cluster configuration file, store default search when absent
    pub conf_file: Option<PathBuf>,
}

impl Config {
    /// Applies overrides from the process environment.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(defaults) = lookup(DEFAULTS_ENV).filter(|v| !v.is_empty()) {
            self.defaults = Some(defaults);
        }
        if let Some(conf) = lookup(CONF_FILE_ENV).filter(|v| !v.is_empty()) {
            self.conf_file = Some(PathBuf::from(conf));
        }
        self
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let cfg: Config = serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    Ok(cfg)
}
