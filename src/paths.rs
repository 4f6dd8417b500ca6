//! Centralized path resolution for rigger
//!
//! # Environment Variables
//!
//! - `RIGGER_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/rigger`)
//! - `RIGGER_STATE_DIR` - Override state directory (plan records)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `RIGGER_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/rigger` (if set)
//! 3. `~/.config/rigger`
//!
//! For state_dir():
//! 1. `RIGGER_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/rigger` (if set)
//! 3. `~/.local/state/rigger`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "RIGGER_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "RIGGER_STATE_DIR";

const APP: &str = "rigger";

/// Name of the configuration file inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Get the rigger config directory path
pub fn config_dir() -> Result<PathBuf> {
    let path = resolve(
        std::env::var(ENV_CONFIG_DIR).ok(),
        std::env::var("XDG_CONFIG_HOME").ok(),
        dirs::home_dir(),
        &[".config"],
    )
    .context("Could not determine home directory")?;
    log::debug!("Using config dir: {}", path.display());
    Ok(path)
}

/// Get the rigger state directory path
pub fn state_dir() -> Result<PathBuf> {
    let path = resolve(
        std::env::var(ENV_STATE_DIR).ok(),
        std::env::var("XDG_STATE_HOME").ok(),
        dirs::home_dir(),
        &[".local", "state"],
    )
    .context("Could not determine home directory")?;
    log::debug!("Using state dir: {}", path.display());
    Ok(path)
}

/// Path of `config.toml`
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Pick a directory: explicit override, then XDG base, then a home default
fn resolve(
    override_dir: Option<String>,
    xdg_base: Option<String>,
    home: Option<PathBuf>,
    home_default: &[&str],
) -> Option<PathBuf> {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        return Some(expand(&dir));
    }
    if let Some(base) = xdg_base.filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(base).join(APP));
    }
    let mut path = home?;
    for part in home_default {
        path.push(part);
    }
    Some(path.join(APP))
}

/// Expand ~ and environment variables in a path string
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
