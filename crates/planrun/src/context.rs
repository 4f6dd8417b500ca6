//! Collaborator traits and per-call context
//!
//! The executor never spawns a process, prompts a user or draws progress
//! itself. Front ends plug those in through the traits below.

use crate::types::{CommandOutput, StepOutcome};
use blueprint::template::render;
use blueprint::{ConfirmationGate, Step};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// One command invocation
#[derive(Debug)]
pub struct CommandRequest<'a> {
    pub step_id: &'a str,
    /// Shell command line, environment directives included
    pub command: &'a str,
    pub elevated: bool,
    pub timeout: Duration,
    /// Elevation password, when one was supplied
    pub password: Option<&'a str>,
}

/// Runs shell commands, optionally elevated, with a timeout
///
/// Called from worker threads. A timeout is reported through
/// [`CommandOutput::timed_out`], never by hanging.
pub trait CommandRunner: Send + Sync {
    fn run(&self, request: &CommandRequest<'_>) -> std::io::Result<CommandOutput>;
}

/// Receives step lifecycle events, always on the scheduling thread
pub trait EventSink: Send {
    /// Called when a step is dispatched
    fn on_step_start(&mut self, step: &Step);

    /// Called when a step finishes, fails or is skipped
    fn on_step_complete(&mut self, step: &Step, outcome: &StepOutcome);
}

/// Asks the caller to acknowledge a confirmation gate
pub trait GateConfirm: Send {
    /// `true` if the gate was acknowledged
    fn confirm(&mut self, gate: &ConfirmationGate) -> bool;
}

/// Sink that drops every event
pub struct NoEvents;

impl EventSink for NoEvents {
    fn on_step_start(&mut self, _step: &Step) {}
    fn on_step_complete(&mut self, _step: &Step, _outcome: &StepOutcome) {}
}

/// Acknowledges every gate
pub struct AutoConfirm;

impl GateConfirm for AutoConfirm {
    fn confirm(&mut self, _gate: &ConfirmationGate) -> bool {
        true
    }
}

/// Declines every gate
pub struct AutoDecline;

impl GateConfirm for AutoDecline {
    fn confirm(&mut self, _gate: &ConfirmationGate) -> bool {
        false
    }
}

/// Values that only exist for the duration of one call
///
/// Holds the elevation password and password-type inputs. Nothing here is
/// persisted or logged; `Debug` prints key names only.
#[derive(Clone, Default)]
pub struct Secrets {
    password: Option<String>,
    inputs: BTreeMap<String, String>,
}

impl Secrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_input(mut self, id: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(id.into(), value.into());
        self
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn has_input(&self, id: &str) -> bool {
        self.inputs.contains_key(id)
    }

    /// The step's shell command with its secret inputs filled in
    ///
    /// Returns the name of the first missing input as the error.
    pub fn command_for(&self, step: &Step) -> Result<String, String> {
        if let Some(missing) = step.secret_inputs.iter().find(|id| !self.has_input(id)) {
            return Err(missing.clone());
        }
        Ok(render(&step.shell_command(), &self.inputs))
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Cancellation flag shared with the caller
///
/// Checked between ticks; steps already dispatched run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
