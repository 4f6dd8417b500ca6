//! Condition predicates for post-install actions and option gating
//!
//! Conditions are looked up by name in a table registered once at startup.
//! A name that is not in the table is never grounds for dropping a step: it
//! evaluates as [`Evaluation::Unknown`], which includes the step, and the
//! caller logs it.

use crate::profile::EnvironmentProfile;
use std::collections::BTreeMap;

/// A predicate over the environment snapshot
pub type Predicate = fn(&EnvironmentProfile) -> bool;

/// Result of evaluating a named condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// The predicate is registered and returned this value
    Known(bool),
    /// No predicate with this name is registered
    Unknown,
}

impl Evaluation {
    /// Whether a step guarded by this evaluation stays in the plan
    pub fn includes(&self) -> bool {
        match self {
            Self::Known(value) => *value,
            Self::Unknown => true,
        }
    }
}

/// Lookup table from condition name to predicate
#[derive(Debug, Clone, Default)]
pub struct ConditionRegistry {
    predicates: BTreeMap<String, Predicate>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in predicates and their aliases
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("always", |_| true);
        registry.register("has-service-manager", EnvironmentProfile::has_service_manager);
        registry.register("has_systemd", EnvironmentProfile::has_service_manager);
        registry.register("not-privileged-user", |env| !env.privileges.is_root);
        registry.register("not_root", |env| !env.privileges.is_root);
        registry.register("not-in-container", |env| !env.container.in_container);
        registry.register("not_container", |env| !env.container.in_container);
        registry.register("has-gpu", |env| env.hardware.gpu.is_some());
        registry.register("is-wsl", |env| env.container.in_wsl);
        registry.register("has-network", |env| env.network.online);
        registry
    }

    /// Add or replace a predicate
    pub fn register(&mut self, name: &str, predicate: Predicate) {
        self.predicates.insert(name.to_string(), predicate);
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    /// Evaluate a condition; an absent or empty name is always true
    pub fn evaluate(&self, name: Option<&str>, env: &EnvironmentProfile) -> Evaluation {
        let name = match name.map(str::trim) {
            None | Some("") => return Evaluation::Known(true),
            Some(n) => n,
        };
        match self.predicates.get(name) {
            Some(predicate) => Evaluation::Known(predicate(env)),
            None => {
                log::warn!("Unknown condition '{name}', including the step");
                Evaluation::Unknown
            }
        }
    }
}
