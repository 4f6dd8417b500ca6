//! Recipe catalog assembly
//!
//! The built-in recipes are compiled into the binary. Local recipe
//! directories are layered on top in order, so a later directory replaces
//! a recipe with the same id.

use anyhow::{Context, Result};
use blueprint::Catalog;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::paths;

const BUILTIN: &str = include_str!("../catalog/default.toml");

/// Directory under the config dir scanned for local recipes
pub const RECIPES_DIR: &str = "recipes";

/// The recipes shipped with rigger
pub fn builtin() -> Result<Catalog> {
    Catalog::from_toml_str(Path::new("<builtin>"), BUILTIN).context("Built-in catalog is invalid")
}

/// Built-in recipes plus every configured directory that exists
pub fn load(config: &Config) -> Result<Catalog> {
    let mut dirs = Vec::new();
    if let Ok(config_dir) = paths::config_dir() {
        dirs.push(config_dir.join(RECIPES_DIR));
    }
    dirs.extend(config.catalog_dirs());
    layered(&dirs)
}

fn layered(dirs: &[PathBuf]) -> Result<Catalog> {
    let mut catalog = builtin()?;
    for dir in dirs {
        if !dir.is_dir() {
            log::debug!("Skipping missing recipe directory {}", dir.display());
            continue;
        }
        let local = Catalog::load_dir(dir)
            .with_context(|| format!("Failed to load recipes from {}", dir.display()))?;
        log::info!("Loaded {} recipes from {}", local.len(), dir.display());
        catalog.merge(local);
    }
    Ok(catalog)
}
