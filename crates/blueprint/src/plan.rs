//! Plan model - the resolved, ordered steps for one tool

use crate::error::Result;
use crate::risk::RiskLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What a step does
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    RepositorySetup,
    PackageBatch,
    ToolInstall,
    PostInstall,
    Verification,
    ServiceAction,
    ConfigWrite,
    DataDownload,
    BuildStage,
    Backup,
    Uninstall,
    Update,
}

impl StepKind {
    /// Timeout tier a step of this kind gets unless overridden
    pub fn default_timeout(&self) -> TimeoutTier {
        match self {
            Self::Verification | Self::Backup | Self::ConfigWrite | Self::ServiceAction => {
                TimeoutTier::Short
            }
            Self::BuildStage | Self::DataDownload => TimeoutTier::Long,
            _ => TimeoutTier::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepositorySetup => "repository-setup",
            Self::PackageBatch => "package-batch",
            Self::ToolInstall => "tool-install",
            Self::PostInstall => "post-install",
            Self::Verification => "verification",
            Self::ServiceAction => "service-action",
            Self::ConfigWrite => "config-write",
            Self::DataDownload => "data-download",
            Self::BuildStage => "build-stage",
            Self::Backup => "backup",
            Self::Uninstall => "uninstall",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution timeout class; the executor maps tiers to durations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutTier {
    /// Verification and metadata queries
    Short,
    #[default]
    Medium,
    /// Builds and large downloads
    Long,
}

/// What has to be restarted before execution may continue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartScope {
    /// Log out and back in
    Session,
    /// Restart a system service
    Service,
    /// Reboot the machine
    System,
}

impl fmt::Display for RestartScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => write!(f, "session"),
            Self::Service => write!(f, "service"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Inline undo for a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackAction {
    pub command: String,
    #[serde(default)]
    pub needs_sudo: bool,
}

/// One executable unit of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub kind: StepKind,
    pub label: String,
    pub command: String,
    #[serde(default)]
    pub needs_sudo: bool,
    /// Explicit dependencies; `None` means "after the previous step"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<RestartScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackAction>,
    /// Id of an earlier step that backs up what this step changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_step: Option<String>,
    /// Environment directives run before the command
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// Exclusive resource held while running (package manager lock)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<String>,
    /// Tool this step belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Packages installed by this step, for undo
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    /// Password inputs substituted at execution time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_inputs: Vec<String>,
    #[serde(default)]
    pub timeout: TimeoutTier,
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        kind: StepKind,
        label: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            command: command.into(),
            needs_sudo: false,
            depends_on: None,
            risk: None,
            restart: None,
            rollback: None,
            backup_step: None,
            env: Vec::new(),
            lock: None,
            mechanism: None,
            tool: None,
            packages: Vec::new(),
            secret_inputs: Vec::new(),
            timeout: kind.default_timeout(),
        }
    }

    pub fn after(mut self, deps: &[&str]) -> Self {
        self.depends_on = Some(deps.iter().map(|d| (*d).to_string()).collect());
        self
    }

    pub fn sudo(mut self, needs_sudo: bool) -> Self {
        self.needs_sudo = needs_sudo;
        self
    }

    pub fn locked(mut self, lock: &str) -> Self {
        self.lock = Some(lock.to_string());
        self
    }

    /// The command as run, environment directives first
    pub fn shell_command(&self) -> String {
        if self.env.is_empty() {
            return self.command.clone();
        }
        format!("{} && {}", self.env.join(" && "), self.command)
    }

    /// Effective risk, low when unset
    pub fn risk_level(&self) -> RiskLevel {
        self.risk.unwrap_or_default()
    }
}

/// A reason the effective risk exceeds the recipe's base risk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub level: RiskLevel,
    pub reason: String,
    /// What caused it, e.g. `choice:driver=dkms`
    pub source: String,
}

/// Aggregate risk of a plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub level: RiskLevel,
    pub base: RiskLevel,
    #[serde(default)]
    pub escalations: Vec<Escalation>,
    /// Steps at high or critical risk
    #[serde(default)]
    pub high_risk_steps: Vec<String>,
    /// High-risk steps with neither rollback nor backup
    #[serde(default)]
    pub violations: Vec<String>,
}

impl RiskSummary {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Acknowledgment required before a plan runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ConfirmationGate {
    #[default]
    None,
    /// Single yes/no confirmation
    Single { prompt: String },
    /// Caller must type `phrase` back
    Typed {
        prompt: String,
        phrase: String,
        steps: Vec<String>,
    },
}

impl ConfirmationGate {
    pub fn is_required(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Resolution failure carried by a plan instead of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanError {
    /// Error category, e.g. "unsatisfiable-method"
    pub category: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    /// Tool or dependency the error is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Mechanisms that exist but are unusable here
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unusable: Vec<String>,
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(hint) = &self.remediation {
            write!(f, " ({hint})")?;
        }
        Ok(())
    }
}

/// Resolved, ordered steps for one tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub tool: String,
    pub label: String,
    #[serde(default)]
    pub already_installed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PlanError>,
    #[serde(default)]
    pub needs_sudo: bool,
    #[serde(default)]
    pub risk: RiskSummary,
    #[serde(default)]
    pub gate: ConfirmationGate,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Choice selections the plan was resolved with
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selections: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Plan {
    /// A plan that failed to resolve; it never carries steps
    pub fn failed(tool: &str, label: &str, error: PlanError) -> Self {
        Self {
            tool: tool.to_string(),
            label: label.to_string(),
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Recompute the plan-level elevation flag from the steps
    pub fn refresh_sudo(&mut self) {
        self.needs_sudo = self.steps.iter().any(|s| s.needs_sudo);
    }

    /// BLAKE3 digest of the canonical JSON form
    ///
    /// Two resolutions against the same snapshot and selections produce the
    /// same fingerprint.
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}
