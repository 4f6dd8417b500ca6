//! # Blueprint
//!
//! Data model shared by the rigger resolver and plan runner.
//!
//! ## Core Concepts
//!
//! - **Recipe**: static description of how to install, verify, update and undo one tool
//! - **EnvironmentProfile**: immutable snapshot of the target system for one resolution
//! - **Plan** / **Step**: the resolved, ordered unit of work handed to the executor
//! - **MechanismRegistry**: lookup table of install mechanisms (apt, brew, fallback, ...)
//! - **ConditionRegistry**: lookup table of named predicates over the snapshot
//! - **Catalog**: validated set of recipes loaded from TOML
//! - **StepGraph**: validated dependency graph over a plan's steps
//!
//! Everything in this crate is plain data plus pure lookups; nothing here
//! probes the system or runs a command.

pub mod catalog;
pub mod choice;
pub mod condition;
pub mod error;
pub mod graph;
pub mod mechanism;
pub mod plan;
pub mod profile;
pub mod recipe;
pub mod risk;
pub mod template;

pub use catalog::Catalog;
pub use choice::{ChoiceDef, ChoiceKind, InputDef, InputKind, OptionDef, OptionRequires};
pub use condition::{ConditionRegistry, Evaluation, Predicate};
pub use error::{Error, Result};
pub use graph::StepGraph;
pub use mechanism::{MechanismClass, MechanismRegistry, MechanismSpec};
pub use plan::{
    ConfirmationGate, Escalation, Plan, PlanError, RestartScope, RiskSummary, RollbackAction,
    Step, StepKind, TimeoutTier,
};
pub use profile::{EnvironmentProfile, OsFamily};
pub use recipe::{
    BuildStage, InstallCommand, PostInstallAction, Recipe, RecipeKind, RepoSetup, Requirements,
};
pub use risk::RiskLevel;
