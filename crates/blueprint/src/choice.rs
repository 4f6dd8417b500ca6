//! Choice and input definitions declared by recipes
//!
//! These are the static halves. Availability is computed per resolution by
//! the resolver and never stored back here.

use crate::plan::RestartScope;
use crate::recipe::InstallCommand;
use crate::risk::RiskLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a choice is presented
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChoiceKind {
    #[default]
    Single,
    Multi,
    Version,
    Toggle,
}

/// Environment requirements an option needs to be available
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionRequires {
    /// Any of these OS families
    pub os: Vec<String>,
    /// Any of these CPU architectures
    pub arch: Vec<String>,
    /// Any of these package managers installed
    pub package_managers: Vec<String>,
    /// All of these executables on the search path
    pub binaries: Vec<String>,
    /// GPU vendor, lowercase
    pub gpu: Option<String>,
    pub min_memory_mb: Option<u64>,
    pub kernel_headers: bool,
    pub network: bool,
    pub not_container: bool,
    /// Named predicates from the condition table
    pub conditions: Vec<String>,
}

impl OptionRequires {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One option of a choice
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionDef {
    pub id: String,
    pub label: Option<String>,
    pub description: Option<String>,
    /// Preferred when the caller makes no selection
    pub default: bool,
    pub requires: OptionRequires,
    /// Earlier choice values this option depends on (`choice id -> option id`)
    pub when: BTreeMap<String, String>,
    /// Shown next to the option when it is unavailable
    pub enable_hint: Option<String>,
    /// Raises the plan's risk when selected
    pub risk: Option<RiskLevel>,
    pub risk_reason: Option<String>,
    /// Install commands that replace the recipe's when selected
    pub install: BTreeMap<String, InstallCommand>,
    pub needs_sudo: BTreeMap<String, bool>,
    /// Extra system packages, keyed by OS family
    pub packages: BTreeMap<String, Vec<String>>,
    /// Extra tool dependencies
    pub binaries: Vec<String>,
    pub restart: Option<RestartScope>,
}

impl OptionDef {
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

/// A decision point on a recipe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChoiceDef {
    pub id: String,
    pub label: String,
    pub kind: ChoiceKind,
    pub options: Vec<OptionDef>,
    /// Name of a version source for `version` choices without static options
    pub versions_from: Option<String>,
    /// Earlier choice values the whole choice depends on
    pub when: BTreeMap<String, String>,
}

/// Kind of free-form input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Text,
    Number,
    Password,
    Select,
}

/// A free-form value the caller supplies (port, path, token)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputDef {
    pub id: String,
    pub label: String,
    pub kind: InputKind,
    pub default: Option<String>,
    pub options: Vec<String>,
}

impl InputDef {
    /// Password inputs are substituted at execution time only
    pub fn is_secret(&self) -> bool {
        self.kind == InputKind::Password
    }
}
