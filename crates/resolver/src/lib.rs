//! # Resolver
//!
//! Turns "install this tool" plus an environment snapshot into an ordered,
//! risk-annotated [`Plan`].
//!
//! ## Pipeline
//!
//! 1. **Choices**: evaluate the recipe's choices against the snapshot and
//!    merge the caller's selections into an effective recipe
//! 2. **Collection**: walk required binaries depth-first, batching system
//!    packages for the primary package manager
//! 3. **Assembly**: emit repository, batch, install, post-install and
//!    verification steps with explicit dependency ids
//! 4. **Risk**: aggregate the risk level and derive the confirmation gate
//!
//! Resolution is a pure function of (catalog, snapshot, selections,
//! inputs). The only time-varying input, remote version lists, goes
//! through a TTL cache.
//!
//! ## Errors
//!
//! Mistakes in the request (unknown tool, bad selection, missing input)
//! return `Err`. An unsatisfiable tool or dependency is not an error: the
//! plan comes back with `error` set and no steps.

pub mod assembler;
pub mod choices;
pub mod collector;
pub mod error;
pub mod lifecycle;
pub mod risk;
pub mod selector;
pub mod versions;

#[cfg(test)]
mod fixtures;

pub use choices::{ChoiceSet, ChoiceState, ChoiceStatus, OptionState, Selections};
pub use error::{Error, ErrorCategory, Result};
pub use versions::{DEFAULT_TTL_SECS, VersionCache, VersionProvider};

use assembler::Assembler;
use blueprint::{Catalog, ConditionRegistry, EnvironmentProfile, MechanismRegistry, Plan, Recipe};
use choices::{Mode, VersionLookup};
use chrono::Utc;
use collector::Collector;
use std::collections::BTreeMap;

/// Caller's answers for one resolution
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Choice id to selected option ids
    pub selections: Selections,
    /// Input id to value
    pub inputs: BTreeMap<String, String>,
}

/// Resolves tools from a catalog
pub struct Resolver {
    catalog: Catalog,
    mechanisms: MechanismRegistry,
    conditions: ConditionRegistry,
    versions: VersionCache,
    provider: Option<Box<dyn VersionProvider>>,
}

impl Resolver {
    /// Resolver with the built-in mechanism and condition tables
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            mechanisms: MechanismRegistry::builtin(),
            conditions: ConditionRegistry::builtin(),
            versions: VersionCache::default(),
            provider: None,
        }
    }

    pub fn with_mechanisms(mut self, mechanisms: MechanismRegistry) -> Self {
        self.mechanisms = mechanisms;
        self
    }

    pub fn with_conditions(mut self, conditions: ConditionRegistry) -> Self {
        self.conditions = conditions;
        self
    }

    /// Source for `versions_from` choices, cached for `ttl_secs`
    pub fn with_version_provider(
        mut self,
        provider: impl VersionProvider + 'static,
        ttl_secs: i64,
    ) -> Self {
        self.provider = Some(Box::new(provider));
        self.versions = VersionCache::new(chrono::Duration::seconds(ttl_secs));
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn mechanisms(&self) -> &MechanismRegistry {
        &self.mechanisms
    }

    fn recipe(&self, tool: &str) -> Result<&Recipe> {
        self.catalog
            .get(tool)
            .ok_or_else(|| Error::UnknownTool(tool.to_string()))
    }

    fn lookup(&self) -> VersionLookup<'_> {
        VersionLookup {
            cache: &self.versions,
            provider: self.provider.as_deref(),
            now: Utc::now(),
        }
    }

    /// Choices for a tool given the selections made so far
    ///
    /// Selections that do not fit are ignored, so a front end can call this
    /// after every answer.
    pub fn discover(
        &self,
        tool: &str,
        env: &EnvironmentProfile,
        prior: &Selections,
    ) -> Result<ChoiceSet> {
        let recipe = self.recipe(tool)?;
        choices::discover(recipe, env, &self.conditions, prior, self.lookup(), Mode::Lenient)
    }

    /// Resolve a tool into a plan
    pub fn resolve(&self, tool: &str, env: &EnvironmentProfile, request: &Request) -> Result<Plan> {
        let recipe = self.recipe(tool)?;
        let set = choices::discover(
            recipe,
            env,
            &self.conditions,
            &request.selections,
            self.lookup(),
            Mode::Strict,
        )?;
        let resolution = choices::apply(recipe, &set, &request.inputs)?;

        let collector = Collector::new(&self.catalog, &resolution.recipe, env, &self.mechanisms);
        let collection = match collector.collect() {
            Ok(collection) => collection,
            Err(err) => return self.fold(recipe, &resolution.selections, err),
        };

        match Assembler::new(&self.catalog, env, &self.mechanisms, &self.conditions)
            .assemble(&resolution, &collection)
        {
            Ok(plan) => {
                log::info!(
                    "Resolved {} into {} step(s), risk {}",
                    plan.tool,
                    plan.steps.len(),
                    plan.risk.level
                );
                Ok(plan)
            }
            Err(err) => self.fold(recipe, &resolution.selections, err),
        }
    }

    /// Plan that removes a tool
    pub fn uninstall(&self, tool: &str, env: &EnvironmentProfile) -> Result<Plan> {
        lifecycle::uninstall(self.recipe(tool)?, env, &self.mechanisms)
    }

    /// Plan that updates a tool in place
    pub fn update(&self, tool: &str, env: &EnvironmentProfile) -> Result<Plan> {
        let recipe = self.recipe(tool)?;
        match lifecycle::update(recipe, env, &self.mechanisms) {
            Err(err @ Error::Unsatisfiable { .. }) => self.fold(recipe, &Selections::new(), err),
            other => other,
        }
    }

    /// Turn plan-level failures into a failed plan; pass the rest through
    fn fold(&self, recipe: &Recipe, selections: &Selections, err: Error) -> Result<Plan> {
        match err.category() {
            ErrorCategory::UnsatisfiableMethod | ErrorCategory::CycleDetected => {
                log::info!("Cannot resolve {}: {err}", recipe.id);
                let mut plan = Plan::failed(&recipe.id, &recipe.label, err.to_plan_error());
                plan.selections = selections.clone();
                Ok(plan)
            }
            _ => Err(err),
        }
    }
}
