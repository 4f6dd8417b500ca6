//! Dependency collection
//!
//! Depth-first walk over a tool's required binaries. Dependencies land in
//! the chain before their dependents. Installs the primary package manager
//! can do with its canonical command are merged into one package batch;
//! everything else becomes its own install entry.
//!
//! A tool already on the search path stops the walk for that branch, but
//! its required system packages are still checked.
//!
//! Re-encountering a visited tool returns immediately. When that tool is
//! still on the walk stack the edge closes a cycle; it is recorded in
//! [`Collection::cycles_broken`] and the caller logs it.

use crate::error::{Error, Result};
use crate::selector;
use blueprint::{Catalog, EnvironmentProfile, MechanismRegistry, Recipe, RecipeKind};
use std::collections::BTreeSet;

/// A tool that will be installed as part of the plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTool {
    pub tool: String,
    pub mechanism: String,
    /// Packages merged into the batch in place of an install step
    pub batched: Vec<String>,
    /// Install command for tool recipes that are not batched
    pub command: Option<String>,
    pub needs_sudo: bool,
    /// Direct dependencies that get their own install steps
    pub after: Vec<String>,
    /// Environment directives in effect when this tool installs
    pub env: Vec<String>,
}

impl PlannedTool {
    pub fn is_batched(&self) -> bool {
        !self.batched.is_empty()
    }
}

/// Result of walking a tool's dependency chain
#[derive(Debug, Clone, Default)]
pub struct Collection {
    /// System packages to install in one invocation
    pub batch: BTreeSet<String>,
    /// Package manager that installs the batch
    pub batch_mechanism: Option<String>,
    /// Tools to install, dependencies first
    pub chain: Vec<PlannedTool>,
    /// Directives every later step needs, in order
    pub env: Vec<String>,
    /// Tools already present
    pub satisfied: BTreeSet<String>,
    /// `from -> to` edges skipped because they close a cycle
    pub cycles_broken: Vec<String>,
}

impl Collection {
    pub fn planned(&self, tool: &str) -> Option<&PlannedTool> {
        self.chain.iter().find(|p| p.tool == tool)
    }

    /// Whether nothing needs to be installed
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty() && self.chain.is_empty()
    }
}

/// Walks dependencies for one resolution
pub struct Collector<'a> {
    catalog: &'a Catalog,
    /// Root recipe with selections applied; replaces the catalog entry
    root: &'a Recipe,
    env: &'a EnvironmentProfile,
    registry: &'a MechanismRegistry,
    visited: BTreeSet<String>,
    stack: Vec<String>,
    out: Collection,
}

impl<'a> Collector<'a> {
    pub fn new(
        catalog: &'a Catalog,
        root: &'a Recipe,
        env: &'a EnvironmentProfile,
        registry: &'a MechanismRegistry,
    ) -> Self {
        Self {
            catalog,
            root,
            env,
            registry,
            visited: BTreeSet::new(),
            stack: Vec::new(),
            out: Collection::default(),
        }
    }

    /// Walk the root recipe and everything it requires
    ///
    /// The first unsatisfiable tool aborts the walk.
    pub fn collect(mut self) -> Result<Collection> {
        let root = self.root.id.clone();
        self.walk(&root, None)?;
        Ok(self.out)
    }

    fn recipe(&self, id: &str) -> Option<&'a Recipe> {
        if id == self.root.id {
            Some(self.root)
        } else {
            self.catalog.get(id)
        }
    }

    fn walk(&mut self, id: &str, parent: Option<&str>) -> Result<()> {
        if !self.visited.insert(id.to_string()) {
            if self.stack.iter().any(|s| s == id) {
                let from = parent.unwrap_or(id);
                self.out.cycles_broken.push(format!("{from} -> {id}"));
            }
            return Ok(());
        }

        let Some(recipe) = self.recipe(id) else {
            if self.env.has_binary(id) {
                self.out.satisfied.insert(id.to_string());
                return Ok(());
            }
            return Err(Error::Unsatisfiable {
                tool: id.to_string(),
                unusable: Vec::new(),
            });
        };

        let family = self.env.os.family;
        let missing: Vec<String> = recipe
            .requires
            .packages_for(family)
            .iter()
            .filter(|p| !self.env.has_package(p))
            .cloned()
            .collect();

        if self.is_satisfied(recipe) {
            self.add_packages(id, &missing)?;
            self.out.satisfied.insert(id.to_string());
            return Ok(());
        }

        self.stack.push(id.to_string());
        let mut after = Vec::new();
        for dep in &recipe.requires.binaries {
            self.walk(dep, Some(id))?;
            if self.out.planned(dep).is_some_and(|p| !p.is_batched()) && !after.contains(dep) {
                after.push(dep.clone());
            }
        }
        self.stack.pop();

        self.add_packages(id, &missing)?;

        let mechanism = selector::select(recipe, self.env, self.registry).ok_or_else(|| {
            Error::Unsatisfiable {
                tool: id.to_string(),
                unusable: selector::unusable(recipe, self.env, self.registry),
            }
        })?;

        let mut planned = PlannedTool {
            tool: id.to_string(),
            mechanism: mechanism.clone(),
            batched: Vec::new(),
            command: None,
            needs_sudo: self.needs_sudo(recipe, &mechanism),
            after,
            env: self.out.env.clone(),
        };

        if matches!(recipe.kind, RecipeKind::Tool { .. }) {
            let command = recipe
                .install_command(&mechanism, family)
                .ok_or_else(|| Error::Unsatisfiable {
                    tool: id.to_string(),
                    unusable: selector::unusable(recipe, self.env, self.registry),
                })?;
            match self.batchable(&mechanism, command) {
                Some(packages) => {
                    self.out.batch.extend(packages.iter().cloned());
                    self.out.batch_mechanism = Some(mechanism.clone());
                    planned.batched = packages;
                }
                None => planned.command = Some(command.to_string()),
            }
        }

        log::debug!(
            "Collected {id} via {mechanism}{}",
            if planned.is_batched() { " (batched)" } else { "" }
        );
        self.out.chain.push(planned);

        for dir in &recipe.path_additions {
            if self.env.on_search_path(dir) {
                continue;
            }
            let directive = format!("export PATH=\"{dir}:$PATH\"");
            if !self.out.env.contains(&directive) {
                self.out.env.push(directive);
            }
        }
        Ok(())
    }

    /// Primary executable on the search path; data and config never are
    fn is_satisfied(&self, recipe: &Recipe) -> bool {
        match recipe.kind {
            RecipeKind::Tool { .. } | RecipeKind::Build { .. } => {
                self.env.has_binary(recipe.binary_name())
            }
            RecipeKind::Data { .. } | RecipeKind::Config { .. } => false,
        }
    }

    /// Packages when the primary package manager can install this command
    /// as part of the batch
    fn batchable(&self, mechanism: &str, command: &str) -> Option<Vec<String>> {
        if self.env.primary_package_manager() != Some(mechanism) {
            return None;
        }
        self.registry.batch_packages(mechanism, command)
    }

    fn add_packages(&mut self, tool: &str, missing: &[String]) -> Result<()> {
        if missing.is_empty() {
            return Ok(());
        }
        let primary = self
            .env
            .primary_package_manager()
            .filter(|pm| self.registry.install_command(pm, missing).is_some())
            .ok_or_else(|| Error::Unsatisfiable {
                tool: tool.to_string(),
                unusable: Vec::new(),
            })?;
        self.out.batch.extend(missing.iter().cloned());
        self.out.batch_mechanism = Some(primary.to_string());
        Ok(())
    }

    /// Elevation for an install: the recipe's flag, never for mechanisms
    /// that refuse it, never for root
    fn needs_sudo(&self, recipe: &Recipe, mechanism: &str) -> bool {
        let declared = recipe
            .needs_sudo(mechanism)
            .unwrap_or_else(|| self.registry.runs_elevated(mechanism));
        declared && !self.registry.never_elevated(mechanism) && !self.env.privileges.is_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{catalog, debian, macos};

    fn collect(tool: &str, env: &EnvironmentProfile) -> Result<Collection> {
        let catalog = catalog();
        let registry = MechanismRegistry::builtin();
        let root = catalog.get(tool).unwrap().clone();
        Collector::new(&catalog, &root, env, &registry).collect()
    }

    #[test]
    fn test_dependency_packages_batched() {
        let out = collect("poetry", &debian()).unwrap();
        assert_eq!(
            out.batch.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["build-essential", "libssl-dev", "python3"]
        );
        assert_eq!(out.batch_mechanism.as_deref(), Some("apt"));
        let tools: Vec<&str> = out.chain.iter().map(|p| p.tool.as_str()).collect();
        assert_eq!(tools, vec!["python3", "poetry"]);
        assert!(out.planned("python3").unwrap().is_batched());
        // batched dependency is not an install-step dependency
        assert!(out.planned("poetry").unwrap().after.is_empty());
    }

    #[test]
    fn test_satisfied_tool_still_checks_packages() {
        let mut env = debian();
        env.binaries.insert("python3".into());
        let out = collect("poetry", &env).unwrap();
        assert!(out.satisfied.contains("python3"));
        assert!(out.batch.contains("libssl-dev"));
        assert!(!out.batch.contains("python3"));

        env.packages.insert("libssl-dev".into());
        env.packages.insert("build-essential".into());
        let out = collect("poetry", &env).unwrap();
        assert!(out.batch.is_empty());
    }

    #[test]
    fn test_path_additions_propagate() {
        let out = collect("ruff", &debian()).unwrap();
        let uv = out.planned("uv").unwrap();
        let ruff = out.planned("ruff").unwrap();
        assert!(uv.env.is_empty());
        assert_eq!(ruff.env, vec!["export PATH=\"$HOME/.cargo/bin:$PATH\""]);
        assert_eq!(ruff.after, vec!["uv"]);
    }

    #[test]
    fn test_path_addition_skipped_when_on_path() {
        let mut env = debian();
        env.path_dirs.push("/home/dev/.cargo/bin".into());
        let out = collect("ruff", &env).unwrap();
        assert!(out.env.is_empty());
    }

    #[test]
    fn test_unusable_dependency_aborts() {
        let mut catalog = catalog();
        let mut editor = Recipe::tool("editor", "Editor").with_install("fallback", "true", false);
        editor.requires.binaries = vec!["zed".into()];
        catalog.merge([editor.clone()].into_iter().collect());

        let registry = MechanismRegistry::builtin();
        let err = Collector::new(&catalog, &editor, &debian(), &registry)
            .collect()
            .unwrap_err();
        match err {
            Error::Unsatisfiable { tool, unusable } => {
                assert_eq!(tool, "zed");
                assert_eq!(unusable, vec!["flatpak", "snap"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_broken_without_error() {
        let mut a = Recipe::tool("a", "A").with_install("fallback", "install-a", false);
        a.requires.binaries = vec!["b".into()];
        let mut b = Recipe::tool("b", "B").with_install("fallback", "install-b", false);
        b.requires.binaries = vec!["a".into()];
        let catalog: Catalog = [a.clone(), b].into_iter().collect();

        let registry = MechanismRegistry::builtin();
        let out = Collector::new(&catalog, &a, &debian(), &registry)
            .collect()
            .unwrap();
        assert_eq!(out.cycles_broken, vec!["b -> a"]);
        let tools: Vec<&str> = out.chain.iter().map(|p| p.tool.as_str()).collect();
        assert_eq!(tools, vec!["b", "a"]);
    }

    #[test]
    fn test_brew_never_elevated() {
        let out = collect("python3", &macos()).unwrap();
        let python = out.planned("python3").unwrap();
        assert_eq!(python.mechanism, "brew");
        assert!(!python.needs_sudo);
    }
}
