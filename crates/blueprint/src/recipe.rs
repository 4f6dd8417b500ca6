//! Recipe model
//!
//! A recipe is the static description of how to install, verify, update and
//! undo one tool. Every recipe shares a base (id, label, risk, requirements,
//! lifecycle commands) and carries one kind-specific payload:
//!
//! - `tool`: install commands per mechanism
//! - `build`: ordered build stages
//! - `data`: a download
//! - `config`: a rendered file

use crate::choice::{ChoiceDef, InputDef};
use crate::error::{Error, Result};
use crate::mechanism::{CONFIG, DOWNLOAD, SOURCE};
use crate::plan::RestartScope;
use crate::profile::OsFamily;
use crate::risk::RiskLevel;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Install command, either uniform or keyed by OS family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstallCommand {
    Plain(String),
    /// Keys are OS family names; `default` applies to the rest
    PerOs(BTreeMap<String, String>),
}

impl InstallCommand {
    /// Command for an OS family, if one applies
    pub fn for_os(&self, family: OsFamily) -> Option<&str> {
        match self {
            Self::Plain(cmd) => Some(cmd),
            Self::PerOs(map) => map
                .get(family.as_str())
                .or_else(|| map.get("default"))
                .map(String::as_str),
        }
    }
}

/// Other tools and system packages a recipe needs first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirements {
    /// Tool ids whose executables must exist
    pub binaries: Vec<String>,
    /// System packages keyed by OS family
    pub packages: BTreeMap<String, Vec<String>>,
}

impl Requirements {
    pub fn packages_for(&self, family: OsFamily) -> &[String] {
        self.packages
            .get(family.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Commands that register a package repository before installing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSetup {
    #[serde(default)]
    pub label: Option<String>,
    pub commands: Vec<String>,
    #[serde(default = "default_true")]
    pub needs_sudo: bool,
}

fn default_true() -> bool {
    true
}

/// A command that runs after installation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostInstallAction {
    pub label: String,
    pub command: String,
    /// Name of a predicate from the condition table
    pub condition: Option<String>,
    pub needs_sudo: bool,
    /// Manages a system service rather than a one-off action
    pub service: bool,
    pub risk: Option<RiskLevel>,
    pub restart: Option<RestartScope>,
    pub rollback: Option<String>,
}

/// One stage of a source build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStage {
    pub label: String,
    pub command: String,
    #[serde(default)]
    pub needs_sudo: bool,
}

/// Kind-specific part of a recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecipeKind {
    /// Installed through one of several mechanisms
    Tool {
        #[serde(default)]
        install: BTreeMap<String, InstallCommand>,
        #[serde(default)]
        needs_sudo: BTreeMap<String, bool>,
    },
    /// Built from source in ordered stages
    Build { stages: Vec<BuildStage> },
    /// Data set or model weights
    Data {
        url: String,
        dest: String,
        #[serde(default)]
        sha256: Option<String>,
        #[serde(default)]
        size_mb: Option<u64>,
    },
    /// Configuration file written from a template
    Config {
        dest: String,
        template: String,
        #[serde(default)]
        needs_sudo: bool,
    },
}

/// Static description of one installable thing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(default)]
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub risk: RiskLevel,
    /// Primary executable; defaults to the id
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(flatten)]
    pub kind: RecipeKind,
    #[serde(default)]
    pub requires: Requirements,
    /// Mechanisms to try first, in order
    #[serde(default)]
    pub prefer: Vec<String>,
    /// Repository setup per mechanism
    #[serde(default)]
    pub repo_setup: BTreeMap<String, RepoSetup>,
    #[serde(default)]
    pub post_install: Vec<PostInstallAction>,
    #[serde(default)]
    pub verify: Option<String>,
    #[serde(default)]
    pub update: BTreeMap<String, String>,
    #[serde(default)]
    pub uninstall: BTreeMap<String, String>,
    #[serde(default)]
    pub rollback: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChoiceDef>,
    #[serde(default)]
    pub inputs: Vec<InputDef>,
    /// Directories the install adds to the search path
    #[serde(default)]
    pub path_additions: Vec<String>,
    /// Installing requires a restart before continuing
    #[serde(default)]
    pub restart: Option<RestartScope>,
}

impl Recipe {
    /// Minimal tool recipe, used by tests and programmatic catalogs
    pub fn tool(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            risk: RiskLevel::Low,
            binary: None,
            kind: RecipeKind::Tool {
                install: BTreeMap::new(),
                needs_sudo: BTreeMap::new(),
            },
            requires: Requirements::default(),
            prefer: Vec::new(),
            repo_setup: BTreeMap::new(),
            post_install: Vec::new(),
            verify: None,
            update: BTreeMap::new(),
            uninstall: BTreeMap::new(),
            rollback: None,
            choices: Vec::new(),
            inputs: Vec::new(),
            path_additions: Vec::new(),
            restart: None,
        }
    }

    /// Add an install mechanism with its privilege requirement
    pub fn with_install(mut self, mechanism: &str, command: &str, needs_sudo: bool) -> Self {
        if let RecipeKind::Tool {
            install,
            needs_sudo: sudo,
        } = &mut self.kind
        {
            install.insert(
                mechanism.to_string(),
                InstallCommand::Plain(command.to_string()),
            );
            sudo.insert(mechanism.to_string(), needs_sudo);
        }
        self
    }

    /// Executable that proves the tool is installed
    pub fn binary_name(&self) -> &str {
        self.binary.as_deref().unwrap_or(&self.id)
    }

    /// Mechanism keys this recipe can install with
    pub fn mechanisms(&self) -> Vec<&str> {
        match &self.kind {
            RecipeKind::Tool { install, .. } => install.keys().map(String::as_str).collect(),
            RecipeKind::Build { .. } => vec![SOURCE],
            RecipeKind::Data { .. } => vec![DOWNLOAD],
            RecipeKind::Config { .. } => vec![CONFIG],
        }
    }

    /// Whether the recipe defines a command for a mechanism on this OS
    pub fn supports(&self, mechanism: &str, family: OsFamily) -> bool {
        match &self.kind {
            RecipeKind::Tool { install, .. } => install
                .get(mechanism)
                .is_some_and(|cmd| cmd.for_os(family).is_some()),
            _ => self.mechanisms().contains(&mechanism),
        }
    }

    /// Install command for a tool-kind mechanism
    pub fn install_command(&self, mechanism: &str, family: OsFamily) -> Option<&str> {
        match &self.kind {
            RecipeKind::Tool { install, .. } => install.get(mechanism)?.for_os(family),
            _ => None,
        }
    }

    /// Privilege requirement for a tool-kind mechanism
    pub fn needs_sudo(&self, mechanism: &str) -> Option<bool> {
        match &self.kind {
            RecipeKind::Tool { needs_sudo, .. } => needs_sudo.get(mechanism).copied(),
            RecipeKind::Config { needs_sudo, .. } => Some(*needs_sudo),
            RecipeKind::Build { .. } | RecipeKind::Data { .. } => Some(false),
        }
    }

    /// Explicit undo command for an install made with `mechanism`
    ///
    /// The recipe-level `rollback` wins, then `uninstall[mechanism]`, then
    /// `uninstall["default"]`.
    pub fn undo_command(&self, mechanism: &str) -> Option<&str> {
        self.rollback
            .as_deref()
            .or_else(|| self.uninstall.get(mechanism).map(String::as_str))
            .or_else(|| self.uninstall.get("default").map(String::as_str))
    }

    /// Check structural invariants
    ///
    /// Every install mechanism, including those introduced by choice options,
    /// must declare whether it needs elevation.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidRecipe {
                tool: self.label.clone(),
                message: "recipe id is empty".to_string(),
            });
        }

        let declared: BTreeSet<&str> = match &self.kind {
            RecipeKind::Tool {
                install,
                needs_sudo,
            } => {
                for mechanism in install.keys() {
                    if !needs_sudo.contains_key(mechanism) {
                        return Err(Error::MissingPrivilege {
                            tool: self.id.clone(),
                            mechanism: mechanism.clone(),
                        });
                    }
                }
                needs_sudo.keys().map(String::as_str).collect()
            }
            RecipeKind::Build { stages } if stages.is_empty() => {
                return Err(self.invalid("build recipe has no stages"));
            }
            _ => BTreeSet::new(),
        };

        let mut choice_ids = BTreeSet::new();
        for choice in &self.choices {
            if !choice_ids.insert(choice.id.as_str()) {
                return Err(self.invalid(&format!("duplicate choice '{}'", choice.id)));
            }
            let mut option_ids = BTreeSet::new();
            for option in &choice.options {
                if !option_ids.insert(option.id.as_str()) {
                    return Err(self.invalid(&format!(
                        "duplicate option '{}' in choice '{}'",
                        option.id, choice.id
                    )));
                }
                for mechanism in option.install.keys() {
                    if !option.needs_sudo.contains_key(mechanism)
                        && !declared.contains(mechanism.as_str())
                    {
                        return Err(Error::MissingPrivilege {
                            tool: format!("{}:{}={}", self.id, choice.id, option.id),
                            mechanism: mechanism.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn invalid(&self, message: &str) -> Error {
        Error::InvalidRecipe {
            tool: self.id.clone(),
            message: message.to_string(),
        }
    }
}
