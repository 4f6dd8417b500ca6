//! Error types for resolution.
//!
//! Errors are categorized so front ends can show a short description and
//! an actionable remediation. Some errors are caller mistakes and come back
//! as `Err`; the rest are folded into the plan as a [`PlanError`].

use blueprint::PlanError;
use std::fmt;

/// Result type alias for resolver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classes of resolution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// No usable mechanism for a tool or one of its dependencies.
    UnsatisfiableMethod,
    /// The step graph is invalid.
    CycleDetected,
    /// Tool id, selection or input the caller supplied is wrong.
    InvalidRequest,
    /// There is no known way to undo or update an install.
    NotReversible,
    /// Recipe data is broken.
    Catalog,
    /// A remote version source failed.
    VersionSource,
}

impl ErrorCategory {
    /// Stable identifier used in plan errors.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsatisfiableMethod => "unsatisfiable-method",
            Self::CycleDetected => "cycle-detected",
            Self::InvalidRequest => "invalid-request",
            Self::NotReversible => "not-reversible",
            Self::Catalog => "catalog",
            Self::VersionSource => "version-source",
        }
    }

    /// User-facing description of this category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::UnsatisfiableMethod => "No usable install method",
            Self::CycleDetected => "Invalid step graph",
            Self::InvalidRequest => "Invalid request",
            Self::NotReversible => "No lifecycle command",
            Self::Catalog => "Broken recipe data",
            Self::VersionSource => "Version list unavailable",
        }
    }

    /// Generic advice for this category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::UnsatisfiableMethod => {
                "Install a package manager the recipe supports, or add a fallback method"
            }
            Self::CycleDetected => "Fix the dependency ids in the recipe that produced this plan",
            Self::InvalidRequest => "Run `rigger choices <tool>` to see valid selections",
            Self::NotReversible => "Remove the tool manually",
            Self::Catalog => "Check the recipe files listed in the configuration",
            Self::VersionSource => "Check your network connection or pick a version explicitly",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while resolving a tool.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No recipe for the requested tool.
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// No usable mechanism for a tool in the chain.
    #[error("no usable install method for '{tool}'")]
    Unsatisfiable {
        /// Tool or dependency that could not be satisfied.
        tool: String,
        /// Mechanisms the recipe defines that are unusable here.
        unusable: Vec<String>,
    },

    /// Dependency cycle in the assembled step graph.
    #[error("dependency cycle detected involving: {}", .nodes.join(", "))]
    CycleDetected {
        /// Steps on or behind the cycle.
        nodes: Vec<String>,
    },

    /// A choice needs a selection and none could be derived.
    #[error("choice '{choice}' needs a selection")]
    MissingSelection {
        /// Choice id.
        choice: String,
    },

    /// A selection names an option that does not exist or is unavailable.
    #[error("cannot select '{option}' for '{choice}': {reason}")]
    InvalidSelection {
        /// Choice id.
        choice: String,
        /// Selected option id.
        option: String,
        /// Why the selection was rejected.
        reason: String,
    },

    /// A required input has no value and no default.
    #[error("input '{input}' needs a value")]
    MissingInput {
        /// Input id.
        input: String,
    },

    /// An input value does not fit its kind.
    #[error("invalid value for input '{input}': {reason}")]
    InvalidInput {
        /// Input id.
        input: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// No uninstall command or undo mechanism is known.
    #[error("'{tool}' has no uninstall command for mechanism '{mechanism}'")]
    NotReversible {
        /// Tool id.
        tool: String,
        /// Mechanism the tool would be installed with.
        mechanism: String,
    },

    /// No update command is known and the install cannot simply be re-run.
    #[error("'{tool}' has no update command for mechanism '{mechanism}'")]
    NoUpdate {
        /// Tool id.
        tool: String,
        /// Mechanism the tool is installed with.
        mechanism: String,
    },

    /// Version source failed.
    #[error("failed to list versions for '{tool}' from '{source_name}': {message}")]
    VersionSource {
        /// Tool id.
        tool: String,
        /// Name of the version source.
        source_name: String,
        /// Error message from the provider.
        message: String,
    },

    /// Recipe data error.
    #[error(transparent)]
    Catalog(#[from] blueprint::Error),
}

impl Error {
    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Unsatisfiable { .. } => ErrorCategory::UnsatisfiableMethod,
            Self::CycleDetected { .. } => ErrorCategory::CycleDetected,
            Self::UnknownTool(_)
            | Self::MissingSelection { .. }
            | Self::InvalidSelection { .. }
            | Self::MissingInput { .. }
            | Self::InvalidInput { .. } => ErrorCategory::InvalidRequest,
            Self::NotReversible { .. } | Self::NoUpdate { .. } => ErrorCategory::NotReversible,
            Self::VersionSource { .. } => ErrorCategory::VersionSource,
            Self::Catalog(blueprint::Error::CycleDetected { .. }) => ErrorCategory::CycleDetected,
            Self::Catalog(_) => ErrorCategory::Catalog,
        }
    }

    /// Specific remediation for this error, falling back to the category advice.
    #[must_use]
    pub fn remediation(&self) -> String {
        match self {
            Self::Unsatisfiable { unusable, .. } if !unusable.is_empty() => format!(
                "install one of these to enable this tool: {}",
                unusable.join(", ")
            ),
            Self::UnknownTool(_) => "run `rigger recipes` to list known tools".to_string(),
            Self::MissingSelection { choice } => {
                format!("pass --select {choice}=<option>")
            }
            Self::MissingInput { input } => format!("pass --input {input}=<value>"),
            Self::NotReversible { .. } => "remove the tool manually".to_string(),
            Self::NoUpdate { .. } => "uninstall and install the tool again".to_string(),
            _ => self.category().advice().to_string(),
        }
    }

    /// Tool, choice or input the error is about.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::UnknownTool(tool)
            | Self::Unsatisfiable { tool, .. }
            | Self::NotReversible { tool, .. }
            | Self::NoUpdate { tool, .. }
            | Self::VersionSource { tool, .. } => Some(tool),
            Self::MissingSelection { choice } | Self::InvalidSelection { choice, .. } => {
                Some(choice)
            }
            Self::MissingInput { input } | Self::InvalidInput { input, .. } => Some(input),
            Self::CycleDetected { .. } | Self::Catalog(_) => None,
        }
    }

    /// Convert into the error object a failed plan carries.
    #[must_use]
    pub fn to_plan_error(&self) -> PlanError {
        PlanError {
            category: self.category().as_str().to_string(),
            message: self.to_string(),
            remediation: Some(self.remediation()),
            subject: self.subject().map(str::to_string),
            unusable: match self {
                Self::Unsatisfiable { unusable, .. } => unusable.clone(),
                _ => Vec::new(),
            },
        }
    }
}
