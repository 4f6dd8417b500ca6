//! Recipe catalog loading
//!
//! Catalog files are TOML with one table per recipe:
//!
//! ```toml
//! [recipes.jq]
//! label = "jq"
//! kind = "tool"
//! install = { apt = "apt-get install -y jq", brew = "brew install jq" }
//! needs_sudo = { apt = true, brew = false }
//! ```
//!
//! The catalog is loaded once and is immutable during resolution.

use crate::error::{Error, Result};
use crate::recipe::Recipe;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    recipes: BTreeMap<String, Recipe>,
}

/// Validated, immutable set of recipes keyed by tool id
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    recipes: BTreeMap<String, Recipe>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog from TOML text
    ///
    /// `origin` is only used in error messages.
    pub fn from_toml_str(origin: &Path, content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content).map_err(|source| Error::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

        let mut catalog = Self::new();
        for (key, mut recipe) in file.recipes {
            if recipe.id.is_empty() {
                recipe.id = key;
            }
            catalog.insert(recipe)?;
        }
        Ok(catalog)
    }

    /// Load every `*.toml` file in a directory, in name order
    ///
    /// A recipe in a later file replaces one with the same id.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        let mut catalog = Self::new();
        for path in paths {
            let content = fs::read_to_string(&path)?;
            let loaded = Self::from_toml_str(&path, &content)?;
            log::debug!("Loaded {} recipes from {}", loaded.len(), path.display());
            catalog.merge(loaded);
        }
        Ok(catalog)
    }

    /// Validate and add a recipe; duplicates are an error
    pub fn insert(&mut self, recipe: Recipe) -> Result<()> {
        recipe.validate()?;
        if self.recipes.contains_key(&recipe.id) {
            return Err(Error::DuplicateRecipe(recipe.id));
        }
        self.recipes.insert(recipe.id.clone(), recipe);
        Ok(())
    }

    /// Merge another catalog; its recipes win on id collisions
    pub fn merge(&mut self, other: Catalog) {
        for (id, recipe) in other.recipes {
            if self.recipes.insert(id.clone(), recipe).is_some() {
                log::debug!("Recipe '{id}' overridden by a later catalog");
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Recipe> {
        self.recipes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.recipes.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.values()
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

impl FromIterator<Recipe> for Catalog {
    /// Build a catalog without validation (tests, programmatic catalogs)
    fn from_iter<I: IntoIterator<Item = Recipe>>(iter: I) -> Self {
        Self {
            recipes: iter.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }
}
