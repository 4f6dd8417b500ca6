use anyhow::{Context, Result};
use planrun::Timeouts;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

/// Contents of `config.toml`
///
/// Every field has a default, so an empty or missing file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extra recipe directories, loaded after the built-in catalog
    pub catalog_dirs: Vec<String>,
    /// Upper bound on steps running at once
    pub jobs: usize,
    /// Undo committed steps when a medium-or-higher plan fails
    pub auto_rollback: bool,
    pub timeouts: Timeouts,
    /// Where plan records live; defaults to the state directory
    pub state_dir: Option<String>,
    /// Profile snapshot JSON used instead of probing this machine
    pub profile: Option<String>,
    /// Named version sources: shell commands printing one version per line
    pub version_sources: BTreeMap<String, String>,
    /// How long fetched version lists stay fresh
    pub version_ttl_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_dirs: Vec::new(),
            jobs: 4,
            auto_rollback: true,
            timeouts: Timeouts::default(),
            state_dir: None,
            profile: None,
            version_sources: BTreeMap::new(),
            version_ttl_secs: resolver::DEFAULT_TTL_SECS,
        }
    }
}

impl Config {
    /// Load from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Directory holding plan records
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => paths::state_dir(),
        }
    }

    /// Extra catalog directories, expanded
    pub fn catalog_dirs(&self) -> Vec<PathBuf> {
        self.catalog_dirs.iter().map(|d| paths::expand(d)).collect()
    }

    pub fn profile_path(&self) -> Option<PathBuf> {
        self.profile.as_deref().map(paths::expand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.jobs, 4);
        assert!(config.auto_rollback);
        assert_eq!(config.timeouts.medium_secs, 900);
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
jobs = 2
catalog_dirs = ["/srv/recipes"]

[timeouts]
long_secs = 7200

[version_sources]
node = "echo 22.1.0"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.jobs, 2);
        assert!(config.auto_rollback);
        assert_eq!(config.timeouts.long_secs, 7200);
        assert_eq!(config.timeouts.short_secs, 120);
        assert_eq!(config.catalog_dirs(), vec![PathBuf::from("/srv/recipes")]);
        assert_eq!(config.version_sources["node"], "echo 22.1.0");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "jobs = \"many\"").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_state_dir_override() {
        let config = Config {
            state_dir: Some("/var/lib/rigger".into()),
            ..Default::default()
        };
        assert_eq!(config.state_dir().unwrap(), PathBuf::from("/var/lib/rigger"));
    }
}
