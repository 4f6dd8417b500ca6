//! DAG scheduler and executor
//!
//! Each tick computes the ready set (every dependency complete, nothing
//! failed upstream), keeps one step per package-manager lock, dispatches
//! the rest to a bounded rayon pool and joins before the next tick. The
//! record is saved after every tick.
//!
//! A failed step never aborts siblings already dispatched; its downstream
//! steps are marked skipped. A completed step that declares a restart
//! pauses the plan once its tick has drained.
//!
//! A fresh plan enters through [`Executor::execute`], which assigns its id.
//! Stored plans are driven by id through [`Executor::resume`],
//! [`Executor::rollback`] and [`Executor::cancel`].

use crate::context::{CancelToken, CommandRequest, CommandRunner, EventSink, GateConfirm, Secrets};
use crate::error::{Error, Result};
use crate::rollback::{UndoPlan, undo_plan};
use crate::store::{PlanRecord, PlanStatus, StateStore};
use crate::types::{
    CommandOutput, Elevation, ExecuteOptions, ExecutionResult, RollbackReport, RunOutcome,
    StepOutcome,
};
use blueprint::{MechanismRegistry, Plan, RiskLevel, Step, StepGraph};
use chrono::Utc;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Runs plans against a command runner and a state store
pub struct Executor<'a> {
    runner: &'a dyn CommandRunner,
    store: &'a dyn StateStore,
    mechanisms: MechanismRegistry,
    options: ExecuteOptions,
    cancel: CancelToken,
}

impl<'a> Executor<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        store: &'a dyn StateStore,
        options: ExecuteOptions,
    ) -> Self {
        Self {
            runner,
            store,
            mechanisms: MechanismRegistry::builtin(),
            options,
            cancel: CancelToken::new(),
        }
    }

    /// Undo table used for steps without an inline rollback
    pub fn with_mechanisms(mut self, mechanisms: MechanismRegistry) -> Self {
        self.mechanisms = mechanisms;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this executor's runs between ticks
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Validate, confirm and run a freshly resolved plan
    ///
    /// The step graph is checked before anything else, so a cyclic plan
    /// fails without running a single step.
    pub fn execute(
        &self,
        plan: Plan,
        secrets: &Secrets,
        gate: &mut dyn GateConfirm,
        events: &mut dyn EventSink,
    ) -> Result<ExecutionResult> {
        if let Some(error) = &plan.error {
            return Err(Error::InvalidPlan {
                reason: error.message.clone(),
            });
        }
        if !plan.risk.is_valid() {
            return Err(Error::InvalidPlan {
                reason: format!(
                    "high-risk steps without rollback or backup: {}",
                    plan.risk.violations.join(", ")
                ),
            });
        }
        let graph = StepGraph::build(&plan.steps)?;

        if !self.options.dry_run && plan.gate.is_required() && !gate.confirm(&plan.gate) {
            log::info!("Confirmation declined for {}", plan.tool);
            return Err(Error::GateDeclined);
        }

        let mut record = PlanRecord::new(plan)?;
        log::info!(
            "Executing plan {} for {} ({} steps)",
            record.id,
            record.plan.tool,
            record.plan.steps.len()
        );
        self.drive(&mut record, &graph, secrets, events, true)
    }

    /// Continue a paused or failed plan from its first incomplete step
    ///
    /// Completed steps are never re-run. A failed plan gets its failed and
    /// skipped steps back as pending.
    pub fn resume(
        &self,
        id: &str,
        secrets: &Secrets,
        events: &mut dyn EventSink,
    ) -> Result<ExecutionResult> {
        let mut record = self.store.load(id)?;
        if !record.status.is_resumable() {
            return Err(Error::NotResumable {
                id: id.to_string(),
                status: record.status,
            });
        }
        if !record.is_intact()? {
            return Err(Error::InvalidPlan {
                reason: "stored plan no longer matches its fingerprint".to_string(),
            });
        }
        let graph = StepGraph::build(&record.plan.steps)?;

        record.failed.clear();
        record.skipped.clear();
        record.paused_at = None;
        log::info!(
            "Resuming plan {id}: {} of {} steps complete",
            record.completed.len(),
            record.plan.steps.len()
        );
        self.drive(&mut record, &graph, secrets, events, true)
    }

    /// Undo the completed steps of a stored plan
    ///
    /// On success the record is cancelled and archived. Otherwise it is
    /// marked failed and kept live, with the undone steps removed from its
    /// completed set, so it can be resumed or rolled back again.
    pub fn rollback(
        &self,
        id: &str,
        secrets: &Secrets,
        events: &mut dyn EventSink,
    ) -> Result<RollbackReport> {
        let mut record = self.store.load(id)?;
        let report = self.undo(&mut record, secrets, events)?;
        if report.outcome.is_done() {
            record.transition(PlanStatus::Cancelled);
            self.store.save(&record)?;
            self.store.archive(&record.id)?;
        } else {
            record.transition(PlanStatus::Failed);
            self.store.save(&record)?;
        }
        Ok(report)
    }

    /// Cancel a stored plan and archive its record
    pub fn cancel(&self, id: &str) -> Result<PlanRecord> {
        let mut record = self.store.load(id)?;
        if !record.status.is_resumable() {
            return Err(Error::NotResumable {
                id: id.to_string(),
                status: record.status,
            });
        }
        record.transition(PlanStatus::Cancelled);
        self.store.save(&record)?;
        self.store.archive(id)?;
        log::info!("Cancelled plan {id}");
        Ok(record)
    }

    fn drive(
        &self,
        record: &mut PlanRecord,
        graph: &StepGraph,
        secrets: &Secrets,
        events: &mut dyn EventSink,
        persist: bool,
    ) -> Result<ExecutionResult> {
        let persist = persist && !self.options.dry_run;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs.max(1))
            .build()?;

        let mut outcomes = BTreeMap::new();
        record.transition(PlanStatus::Running);
        self.persist(record, persist)?;

        let outcome = loop {
            if self.cancel.is_cancelled() {
                log::info!("Plan {} cancelled", record.id);
                break RunOutcome::Cancelled;
            }

            let (ready, blocked): (Vec<Step>, Vec<Step>) = ready_steps(record, graph)
                .into_iter()
                .partition(|step| !self.lacks_privilege(step, secrets));
            if ready.is_empty() {
                if let Some(step) = blocked.first() {
                    log::info!("Step {} needs elevation; pausing", step.id);
                    record.paused_at = Some(step.id.clone());
                    break RunOutcome::NeedsPrivilege {
                        step: step.id.clone(),
                    };
                }
                break settle(record);
            }

            let batch = exclusive(ready);
            for step in &batch {
                events.on_step_start(step);
            }
            let results: Vec<StepOutcome> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|step| self.run_step(step, secrets))
                    .collect()
            });

            let mut restart = None;
            for (step, result) in batch.iter().zip(results) {
                events.on_step_complete(step, &result);
                if result.is_success() {
                    record.completed.insert(step.id.clone());
                    if restart.is_none()
                        && let Some(scope) = step.restart
                    {
                        restart = Some((step.id.clone(), scope));
                    }
                } else {
                    record.failed.insert(step.id.clone());
                    for id in graph.downstream(&step.id) {
                        if record.completed.contains(&id) || !record.skipped.insert(id.clone()) {
                            continue;
                        }
                        let skipped = StepOutcome::Skipped {
                            reason: format!("dependency '{}' failed", step.id),
                        };
                        if let Some(dependent) = record.plan.step(&id) {
                            events.on_step_complete(dependent, &skipped);
                        }
                        outcomes.insert(id, skipped);
                    }
                }
                outcomes.insert(step.id.clone(), result);
            }
            record.updated_at = Utc::now();
            self.persist(record, persist)?;

            if let Some((step, scope)) = restart
                && !self.options.dry_run
            {
                log::info!("Step {step} requires a {scope} restart; pausing");
                record.paused_at = Some(step.clone());
                break RunOutcome::Paused { step, scope };
            }
        };

        record.transition(match outcome {
            RunOutcome::Done => PlanStatus::Done,
            RunOutcome::Paused { .. } | RunOutcome::NeedsPrivilege { .. } => PlanStatus::Paused,
            RunOutcome::Failed { .. } => PlanStatus::Failed,
            RunOutcome::Cancelled => PlanStatus::Cancelled,
        });

        let failed = matches!(outcome, RunOutcome::Failed { .. });
        let rollback = if persist && failed && self.should_roll_back(record) {
            log::warn!("Plan {} failed; rolling back committed steps", record.id);
            Some(self.undo(record, secrets, events)?)
        } else {
            None
        };

        self.persist(record, persist)?;
        if persist && matches!(record.status, PlanStatus::Done | PlanStatus::Cancelled) {
            self.store.archive(&record.id)?;
        }

        Ok(ExecutionResult {
            plan_id: record.id.clone(),
            outcome,
            completed: record.completed_in_order(),
            steps: outcomes,
            rollback,
        })
    }

    fn persist(&self, record: &PlanRecord, persist: bool) -> Result<()> {
        if persist {
            self.store.save(record)?;
        }
        Ok(())
    }

    /// Only committed steps of medium-or-higher plans are undone
    fn should_roll_back(&self, record: &PlanRecord) -> bool {
        self.options.auto_rollback
            && record.plan.risk.level >= RiskLevel::Medium
            && !record.completed.is_empty()
    }

    /// Run the undo plan for a record's completed steps
    fn undo(
        &self,
        record: &mut PlanRecord,
        secrets: &Secrets,
        events: &mut dyn EventSink,
    ) -> Result<RollbackReport> {
        let UndoPlan {
            plan,
            not_reversible,
        } = undo_plan(&record.plan, &record.completed, &self.mechanisms);
        for id in &not_reversible {
            log::warn!("Step {id} has no known undo");
        }

        let graph = StepGraph::build(&plan.steps)?;
        let mut undo_record = PlanRecord::new(plan)?;
        let result = self.drive(&mut undo_record, &graph, secrets, events, false)?;

        let undone: Vec<String> = result
            .completed
            .iter()
            .filter_map(|id| UndoPlan::original(id))
            .map(str::to_string)
            .collect();
        for id in &undone {
            record.completed.remove(id);
        }
        Ok(RollbackReport {
            outcome: result.outcome,
            undone,
            not_reversible,
        })
    }

    fn lacks_privilege(&self, step: &Step, secrets: &Secrets) -> bool {
        if !step.needs_sudo || self.options.dry_run {
            return false;
        }
        match self.options.elevation {
            Elevation::Root | Elevation::Passwordless => false,
            Elevation::Password => secrets.password().is_none(),
            Elevation::Unavailable => true,
        }
    }

    fn run_step(&self, step: &Step, secrets: &Secrets) -> StepOutcome {
        if self.options.dry_run {
            log::info!("[dry-run] {}: {}", step.id, step.label);
            return StepOutcome::DryRun;
        }

        let command = match secrets.command_for(step) {
            Ok(command) => command,
            Err(missing) => {
                return StepOutcome::Failed {
                    error: format!("missing secret input '{missing}'"),
                    exit_code: None,
                    timed_out: false,
                };
            }
        };
        let elevated = step.needs_sudo && self.options.elevation != Elevation::Root;
        let timeout = self.options.timeouts.for_tier(step.timeout);
        let request = CommandRequest {
            step_id: &step.id,
            command: &command,
            elevated,
            timeout,
            password: if elevated { secrets.password() } else { None },
        };

        log::debug!(
            "Running step {} (elevated: {elevated}, timeout: {}s)",
            step.id,
            timeout.as_secs()
        );
        match self.runner.run(&request) {
            Ok(output) if output.success => StepOutcome::Succeeded,
            Ok(output) => {
                let error = if output.timed_out {
                    format!("timed out after {}s", timeout.as_secs())
                } else {
                    failure_message(&output)
                };
                log::warn!("Step {} failed: {error}", step.id);
                StepOutcome::Failed {
                    error,
                    exit_code: output.code,
                    timed_out: output.timed_out,
                }
            }
            Err(e) => StepOutcome::Failed {
                error: format!("failed to start: {e}"),
                exit_code: None,
                timed_out: false,
            },
        }
    }
}

/// Pending steps whose dependencies are all complete, in graph order
fn ready_steps(record: &PlanRecord, graph: &StepGraph) -> Vec<Step> {
    graph
        .order()
        .iter()
        .filter(|id| {
            !record.completed.contains(*id)
                && !record.failed.contains(*id)
                && !record.skipped.contains(*id)
        })
        .filter(|id| {
            graph
                .dependencies(id)
                .iter()
                .all(|dep| record.completed.contains(dep))
        })
        .filter_map(|id| record.plan.step(id).cloned())
        .collect()
}

/// At most one step per lock group; the rest wait for a later tick
fn exclusive(ready: Vec<Step>) -> Vec<Step> {
    let mut held = BTreeSet::new();
    ready
        .into_iter()
        .filter(|step| match &step.lock {
            Some(lock) => held.insert(lock.clone()),
            None => true,
        })
        .collect()
}

/// Outcome once nothing else is ready
fn settle(record: &PlanRecord) -> RunOutcome {
    let in_order = |set: &BTreeSet<String>| -> Vec<String> {
        record
            .plan
            .steps
            .iter()
            .filter(|s| set.contains(&s.id))
            .map(|s| s.id.clone())
            .collect()
    };
    if record.failed.is_empty() && record.completed.len() == record.plan.steps.len() {
        return RunOutcome::Done;
    }
    RunOutcome::Failed {
        failed: in_order(&record.failed),
        skipped: in_order(&record.skipped),
    }
}

/// Last non-empty stderr line, else the exit code
fn failure_message(output: &CommandOutput) -> String {
    let stderr = output.stderr_str();
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map_or_else(
            || match output.code {
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_string(),
            },
            str::to_string,
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoConfirm, AutoDecline, NoEvents};
    use crate::store::{FileStore, MemoryStore};
    use blueprint::{ConfirmationGate, RestartScope, RiskSummary, RollbackAction, StepKind};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    /// Records every command; fails the listed steps; tracks concurrency per lock
    #[derive(Default)]
    struct MockRunner {
        fail: BTreeSet<String>,
        locks: BTreeMap<String, String>,
        calls: Mutex<Vec<(String, String, Option<String>)>>,
        active: Mutex<BTreeMap<String, usize>>,
        peak: Mutex<BTreeMap<String, usize>>,
    }

    impl MockRunner {
        fn failing(ids: &[&str]) -> Self {
            Self {
                fail: ids.iter().map(|s| (*s).to_string()).collect(),
                ..Default::default()
            }
        }

        fn ids(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|c| c.0.clone()).collect()
        }

        fn command(&self, id: &str) -> Option<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.0 == id)
                .map(|c| c.1.clone())
        }
    }

    impl CommandRunner for MockRunner {
        fn run(&self, request: &CommandRequest<'_>) -> std::io::Result<CommandOutput> {
            self.calls.lock().unwrap().push((
                request.step_id.to_string(),
                request.command.to_string(),
                request.password.map(str::to_string),
            ));
            let lock = self.locks.get(request.step_id).cloned();
            if let Some(lock) = &lock {
                let mut active = self.active.lock().unwrap();
                let count = active.entry(lock.clone()).or_default();
                *count += 1;
                let mut peak = self.peak.lock().unwrap();
                let max = peak.entry(lock.clone()).or_default();
                *max = (*max).max(*count);
            }
            thread::sleep(Duration::from_millis(20));
            if let Some(lock) = &lock {
                *self.active.lock().unwrap().entry(lock.clone()).or_default() -= 1;
            }
            if self.fail.contains(request.step_id) {
                return Ok(CommandOutput::failed(1, "E: something broke\n"));
            }
            Ok(CommandOutput::ok())
        }
    }

    fn step(id: &str, deps: &[&str]) -> Step {
        Step::new(id, StepKind::ToolInstall, id, format!("run {id}")).after(deps)
    }

    fn plan(steps: Vec<Step>) -> Plan {
        Plan {
            tool: "demo".into(),
            label: "Demo".into(),
            steps,
            ..Default::default()
        }
    }

    fn options() -> ExecuteOptions {
        ExecuteOptions {
            elevation: Elevation::Passwordless,
            ..Default::default()
        }
    }

    #[test]
    fn test_runs_in_dependency_order() {
        let runner = MockRunner::default();
        let store = MemoryStore::new();
        let exec = Executor::new(&runner, &store, options());
        let result = exec
            .execute(
                plan(vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])]),
                &Secrets::new(),
                &mut AutoConfirm,
                &mut NoEvents,
            )
            .unwrap();
        assert_eq!(result.outcome, RunOutcome::Done);
        assert_eq!(runner.ids(), vec!["a", "b", "c"]);
        assert_eq!(result.completed, vec!["a", "b", "c"]);
        assert!(store.is_archived(&result.plan_id));
    }

    #[test]
    fn test_cycle_fails_before_any_step() {
        let runner = MockRunner::default();
        let store = MemoryStore::new();
        let exec = Executor::new(&runner, &store, options());
        let err = exec
            .execute(
                plan(vec![step("a", &["b"]), step("b", &["a"]), step("c", &[])]),
                &Secrets::new(),
                &mut AutoConfirm,
                &mut NoEvents,
            )
            .unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
        assert!(runner.ids().is_empty());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_pause_on_restart_then_resume() {
        let runner = MockRunner::default();
        let store = MemoryStore::new();
        let exec = Executor::new(&runner, &store, options());
        let mut driver = step("driver", &["prep"]);
        driver.restart = Some(RestartScope::System);
        let steps = vec![step("prep", &[]), driver, step("cuda", &["driver"])];

        let first = exec
            .execute(plan(steps), &Secrets::new(), &mut AutoConfirm, &mut NoEvents)
            .unwrap();
        assert_eq!(
            first.outcome,
            RunOutcome::Paused {
                step: "driver".into(),
                scope: RestartScope::System
            }
        );
        let record = store.load(&first.plan_id).unwrap();
        assert_eq!(record.status, PlanStatus::Paused);
        assert_eq!(record.completed_in_order(), vec!["prep", "driver"]);

        let second = exec.resume(&first.plan_id, &Secrets::new(), &mut NoEvents).unwrap();
        assert_eq!(second.outcome, RunOutcome::Done);
        assert_eq!(runner.ids(), vec!["prep", "driver", "cuda"]);
        assert_eq!(second.steps.keys().collect::<Vec<_>>(), vec!["cuda"]);
    }

    #[test]
    fn test_same_lock_never_concurrent() {
        let mut runner = MockRunner::default();
        for id in ["apt-a", "apt-b", "apt-c"] {
            runner.locks.insert(id.into(), "dpkg".into());
        }
        let store = MemoryStore::new();
        let exec = Executor::new(&runner, &store, options());
        let steps = ["apt-a", "apt-b", "apt-c", "free"]
            .into_iter()
            .map(|id| {
                let s = step(id, &[]);
                if id.starts_with("apt") { s.locked("dpkg") } else { s }
            })
            .collect();

        let result = exec
            .execute(plan(steps), &Secrets::new(), &mut AutoConfirm, &mut NoEvents)
            .unwrap();
        assert_eq!(result.outcome, RunOutcome::Done);
        assert_eq!(runner.peak.lock().unwrap().get("dpkg"), Some(&1));
        assert_eq!(runner.ids().len(), 4);
    }

    #[test]
    fn test_failure_skips_dependents_not_siblings() {
        let runner = MockRunner::failing(&["a"]);
        let store = MemoryStore::new();
        let exec = Executor::new(&runner, &store, options());
        let result = exec
            .execute(
                plan(vec![step("a", &[]), step("b", &["a"]), step("c", &[]), step("d", &["b"])]),
                &Secrets::new(),
                &mut AutoConfirm,
                &mut NoEvents,
            )
            .unwrap();
        assert_eq!(
            result.outcome,
            RunOutcome::Failed {
                failed: vec!["a".into()],
                skipped: vec!["b".into(), "d".into()]
            }
        );
        assert_eq!(result.completed, vec!["c"]);
        assert!(matches!(
            result.steps["a"],
            StepOutcome::Failed { ref error, exit_code: Some(1), .. } if error == "E: something broke"
        ));
        assert!(matches!(result.steps["b"], StepOutcome::Skipped { .. }));

        let record = store.load(&result.plan_id).unwrap();
        assert_eq!(record.status, PlanStatus::Failed);
        assert!(!store.is_archived(&result.plan_id));

        let retry = MockRunner::default();
        let exec = Executor::new(&retry, &store, options());
        let resumed = exec.resume(&result.plan_id, &Secrets::new(), &mut NoEvents).unwrap();
        assert_eq!(resumed.outcome, RunOutcome::Done);
        assert_eq!(retry.ids(), vec!["a", "b", "d"]);
    }

    #[test]
    fn test_implicit_chaining_without_ids() {
        let runner = MockRunner::failing(&["one"]);
        let store = MemoryStore::new();
        let exec = Executor::new(&runner, &store, options());
        let steps = vec![
            Step::new("one", StepKind::ToolInstall, "one", "run one"),
            Step::new("two", StepKind::ToolInstall, "two", "run two"),
        ];
        let result = exec
            .execute(plan(steps), &Secrets::new(), &mut AutoConfirm, &mut NoEvents)
            .unwrap();
        assert_eq!(runner.ids(), vec!["one"]);
        assert!(
            matches!(result.outcome, RunOutcome::Failed { ref skipped, .. } if skipped == &["two"])
        );
    }

    #[test]
    fn test_needs_privilege_then_resume_with_password() {
        let runner = MockRunner::default();
        let store = MemoryStore::new();
        let exec = Executor::new(
            &runner,
            &store,
            ExecuteOptions {
                elevation: Elevation::Password,
                ..Default::default()
            },
        );
        let steps = vec![step("user", &[]), step("root", &["user"]).sudo(true)];
        let result = exec
            .execute(plan(steps), &Secrets::new(), &mut AutoConfirm, &mut NoEvents)
            .unwrap();
        assert_eq!(result.outcome, RunOutcome::NeedsPrivilege { step: "root".into() });
        assert_eq!(runner.ids(), vec!["user"]);

        let secrets = Secrets::new().with_password("hunter2");
        let resumed = exec.resume(&result.plan_id, &secrets, &mut NoEvents).unwrap();
        assert_eq!(resumed.outcome, RunOutcome::Done);
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[1].2.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_secrets_never_persisted() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let runner = MockRunner::failing(&["after"]);
        let exec = Executor::new(&runner, &store, options());

        let mut secret = Step::new(
            "set-password",
            StepKind::PostInstall,
            "Set admin password",
            "grafana-cli admin reset-admin-password {admin_password}",
        )
        .after(&[]);
        secret.secret_inputs = vec!["admin_password".into()];
        let steps = vec![secret, step("after", &["set-password"])];
        let secrets = Secrets::new()
            .with_password("hunter2")
            .with_input("admin_password", "s3cret");

        let result = exec
            .execute(plan(steps), &secrets, &mut AutoConfirm, &mut NoEvents)
            .unwrap();
        assert!(matches!(result.outcome, RunOutcome::Failed { .. }));
        assert_eq!(
            runner.command("set-password").as_deref(),
            Some("grafana-cli admin reset-admin-password s3cret")
        );

        let path = dir.path().join("plans").join(format!("{}.json", result.plan_id));
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("{admin_password}"));
        assert!(!content.contains("s3cret"));
        assert!(!content.contains("hunter2"));
    }

    #[test]
    fn test_gate_declined_runs_nothing() {
        let runner = MockRunner::default();
        let store = MemoryStore::new();
        let exec = Executor::new(&runner, &store, options());
        let mut gated = plan(vec![step("a", &[])]);
        gated.gate = ConfirmationGate::Single {
            prompt: "Continue?".into(),
        };
        let err = exec
            .execute(gated, &Secrets::new(), &mut AutoDecline, &mut NoEvents)
            .unwrap_err();
        assert!(matches!(err, Error::GateDeclined));
        assert!(runner.ids().is_empty());
    }

    #[test]
    fn test_auto_rollback_undoes_committed_steps() {
        let runner = MockRunner::failing(&["configure"]);
        let store = MemoryStore::new();
        let exec = Executor::new(&runner, &store, options());

        let mut install = step("install", &[]);
        install.rollback = Some(RollbackAction {
            command: "uninstall it".into(),
            needs_sudo: false,
        });
        let mut risky = plan(vec![install, step("configure", &["install"])]);
        risky.risk = RiskSummary {
            level: RiskLevel::Medium,
            ..Default::default()
        };

        let result = exec
            .execute(risky, &Secrets::new(), &mut AutoConfirm, &mut NoEvents)
            .unwrap();
        let report = result.rollback.unwrap();
        assert_eq!(report.outcome, RunOutcome::Done);
        assert_eq!(report.undone, vec!["install"]);
        assert_eq!(runner.ids(), vec!["install", "configure", "undo:install"]);
        assert!(result.completed.is_empty());
    }

    #[test]
    fn test_low_risk_failure_not_rolled_back() {
        let runner = MockRunner::failing(&["configure"]);
        let store = MemoryStore::new();
        let exec = Executor::new(&runner, &store, options());
        let result = exec
            .execute(
                plan(vec![step("install", &[]), step("configure", &["install"])]),
                &Secrets::new(),
                &mut AutoConfirm,
                &mut NoEvents,
            )
            .unwrap();
        assert!(result.rollback.is_none());
        assert_eq!(result.completed, vec!["install"]);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let runner = MockRunner::default();
        let store = MemoryStore::new();
        let exec = Executor::new(
            &runner,
            &store,
            ExecuteOptions {
                dry_run: true,
                elevation: Elevation::Unavailable,
                ..Default::default()
            },
        );
        let result = exec
            .execute(
                plan(vec![step("a", &[]), step("b", &["a"]).sudo(true)]),
                &Secrets::new(),
                &mut AutoConfirm,
                &mut NoEvents,
            )
            .unwrap();
        assert_eq!(result.outcome, RunOutcome::Done);
        assert!(runner.ids().is_empty());
        assert!(result.steps.values().all(|o| *o == StepOutcome::DryRun));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_cancelled_between_ticks() {
        let runner = MockRunner::default();
        let store = MemoryStore::new();
        let token = CancelToken::new();
        token.cancel();
        let exec = Executor::new(&runner, &store, options()).with_cancel(token);
        let result = exec
            .execute(plan(vec![step("a", &[])]), &Secrets::new(), &mut AutoConfirm, &mut NoEvents)
            .unwrap();
        assert_eq!(result.outcome, RunOutcome::Cancelled);
        assert!(runner.ids().is_empty());
        assert!(store.is_archived(&result.plan_id));
        assert!(matches!(
            exec.resume(&result.plan_id, &Secrets::new(), &mut NoEvents),
            Err(Error::NotResumable { .. })
        ));
    }

    #[test]
    fn test_failed_plan_rejected() {
        let runner = MockRunner::default();
        let store = MemoryStore::new();
        let exec = Executor::new(&runner, &store, options());
        let failed = Plan::failed(
            "zed",
            "Zed",
            blueprint::PlanError {
                category: "unsatisfiable-method".into(),
                message: "no usable install method for 'zed'".into(),
                remediation: None,
                subject: Some("zed".into()),
                unusable: vec![],
            },
        );
        let err = exec
            .execute(failed, &Secrets::new(), &mut AutoConfirm, &mut NoEvents)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPlan { .. }));
    }

    #[test]
    fn test_manual_rollback_archives_record() {
        let runner = MockRunner::default();
        let store = MemoryStore::new();
        let exec = Executor::new(&runner, &store, options());
        let mut install = step("install", &[]).locked("dpkg");
        install.mechanism = Some("apt".into());
        install.packages = vec!["jq".into()];
        let result = exec
            .execute(plan(vec![install]), &Secrets::new(), &mut AutoConfirm, &mut NoEvents)
            .unwrap();

        let report = exec.rollback(&result.plan_id, &Secrets::new(), &mut NoEvents).unwrap();
        assert_eq!(report.undone, vec!["install"]);
        assert_eq!(runner.command("undo:install").as_deref(), Some("apt-get remove -y jq"));
        let record = store.load(&result.plan_id).unwrap();
        assert_eq!(record.status, PlanStatus::Cancelled);
        assert!(record.completed.is_empty());
    }

    #[test]
    fn test_failed_rollback_of_done_plan_stays_live() {
        let runner = MockRunner::failing(&["undo:install"]);
        let store = MemoryStore::new();
        let exec = Executor::new(&runner, &store, options());
        let mut install = step("install", &[]).locked("dpkg");
        install.mechanism = Some("apt".into());
        install.packages = vec!["jq".into()];
        let result = exec
            .execute(plan(vec![install]), &Secrets::new(), &mut AutoConfirm, &mut NoEvents)
            .unwrap();
        assert_eq!(store.load(&result.plan_id).unwrap().status, PlanStatus::Done);

        let report = exec.rollback(&result.plan_id, &Secrets::new(), &mut NoEvents).unwrap();
        assert!(!report.outcome.is_done());
        assert!(report.undone.is_empty());

        let record = store.load(&result.plan_id).unwrap();
        assert_eq!(record.status, PlanStatus::Failed);
        assert!(record.status.is_resumable());
        assert!(record.completed.contains("install"));
        let live: Vec<String> = store.list().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(live, vec![result.plan_id]);
    }
}
