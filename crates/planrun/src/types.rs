//! Core types for plan execution

use blueprint::{RestartScope, TimeoutTier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::process::Output;
use std::time::Duration;

/// How steps that need elevation can get it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Elevation {
    /// Already running as root; nothing is elevated
    Root,
    /// sudo works without a password
    Passwordless,
    /// sudo needs the password from the secrets
    #[default]
    Password,
    /// No way to elevate
    Unavailable,
}

/// Step timeouts per tier, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub short_secs: u64,
    pub medium_secs: u64,
    pub long_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            short_secs: 120,
            medium_secs: 900,
            long_secs: 3600,
        }
    }
}

impl Timeouts {
    pub fn for_tier(&self, tier: TimeoutTier) -> Duration {
        Duration::from_secs(match tier {
            TimeoutTier::Short => self.short_secs,
            TimeoutTier::Medium => self.medium_secs,
            TimeoutTier::Long => self.long_secs,
        })
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Upper bound on steps running at once
    pub jobs: usize,
    /// Report every step without running anything
    pub dry_run: bool,
    /// Undo committed steps when a medium-or-higher plan fails
    pub auto_rollback: bool,
    pub elevation: Elevation,
    pub timeouts: Timeouts,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            dry_run: false,
            auto_rollback: true,
            elevation: Elevation::default(),
            timeouts: Timeouts::default(),
        }
    }
}

/// What happened to one step during a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum StepOutcome {
    Succeeded,
    /// Non-zero exit, timeout, or the runner could not start it
    Failed {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        #[serde(default)]
        timed_out: bool,
    },
    /// Not run because a dependency failed
    Skipped { reason: String },
    /// Would have run
    DryRun,
}

impl StepOutcome {
    /// Whether the step counts as complete for its dependents
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::DryRun)
    }
}

/// Terminal result of an execute or resume call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RunOutcome {
    /// Every step completed
    Done,
    /// A step that needs a restart completed; resume afterwards
    Paused { step: String, scope: RestartScope },
    /// A ready step needs elevation that was not supplied
    NeedsPrivilege { step: String },
    /// At least one step failed; `skipped` depended on a failure
    Failed {
        failed: Vec<String>,
        skipped: Vec<String>,
    },
    /// Cancelled between ticks
    Cancelled,
}

impl RunOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Undo run for a failed or finished plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub outcome: RunOutcome,
    /// Original step ids whose undo succeeded, in undo order
    pub undone: Vec<String>,
    /// Completed steps with no known undo
    pub not_reversible: Vec<String>,
}

/// Result of an execute or resume call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub plan_id: String,
    pub outcome: RunOutcome,
    /// Steps complete so far, including earlier calls, in plan order
    pub completed: Vec<String>,
    /// Per-step outcomes from this call
    pub steps: BTreeMap<String, StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackReport>,
}

/// Output from a command run by a runner
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
    pub code: Option<i32>,
    pub timed_out: bool,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
            code: output.status.code(),
            timed_out: false,
        }
    }
}

impl CommandOutput {
    /// Successful output with no captured text
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
            ..Default::default()
        }
    }

    /// Failed output with a message on stderr
    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            stderr: stderr.as_bytes().to_vec(),
            code: Some(code),
            ..Default::default()
        }
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_tiers() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.for_tier(TimeoutTier::Short), Duration::from_secs(120));
        assert_eq!(timeouts.for_tier(TimeoutTier::Long), Duration::from_secs(3600));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = RunOutcome::Paused {
            step: "install:nvidia".into(),
            scope: RestartScope::System,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert_eq!(
            json,
            r#"{"outcome":"paused","step":"install:nvidia","scope":"system"}"#
        );
    }

    #[test]
    fn test_dry_run_counts_as_success() {
        assert!(StepOutcome::DryRun.is_success());
        assert!(!StepOutcome::Skipped { reason: "x".into() }.is_success());
    }
}
