//! Command implementations
//!
//! Every command that resolves a plan opens a [`Session`]: configuration,
//! the layered catalog, a resolver and one environment snapshot. Commands
//! that only touch stored plans use [`open_store`] and skip detection.

pub mod choices;
pub mod install;
pub mod lifecycle;
pub mod plan;
pub mod plans;
pub mod profile;
pub mod recipes;

use anyhow::{Context as _, Result, bail};
use blueprint::profile::Privileges;
use blueprint::{EnvironmentProfile, Plan};
use planrun::{
    Elevation, ExecuteOptions, ExecutionResult, Executor, FileStore, GateConfirm, RunOutcome,
    Secrets,
};
use resolver::Resolver;
use std::collections::BTreeMap;

use crate::Context;
use crate::config::Config;
use crate::progress::StepProgress;
use crate::runner::{CommandVersions, ShellRunner};
use crate::{catalog, prompt, ui};

/// Loaded configuration, resolver and environment for one command
pub struct Session {
    pub config: Config,
    pub resolver: Resolver,
    pub env: EnvironmentProfile,
}

impl Session {
    pub fn open() -> Result<Self> {
        let config = Config::load()?;
        let catalog = catalog::load(&config)?;
        log::debug!("Catalog has {} recipes", catalog.len());

        let mut resolver = Resolver::new(catalog);
        if !config.version_sources.is_empty() {
            resolver = resolver.with_version_provider(
                CommandVersions::new(config.version_sources.clone()),
                config.version_ttl_secs,
            );
        }

        let env = match config.profile_path() {
            Some(path) => {
                log::info!("Using profile snapshot {}", path.display());
                crate::profile::load(&path)?
            }
            None => crate::profile::detect(resolver.catalog(), resolver.mechanisms()),
        };

        Ok(Self {
            config,
            resolver,
            env,
        })
    }

    pub fn options(&self, dry_run: bool, jobs: Option<usize>) -> ExecuteOptions {
        options(&self.config, elevation(&self.env.privileges), dry_run, jobs)
    }
}

/// Plan store under the configured state directory
pub fn open_store(config: &Config) -> Result<FileStore> {
    Ok(FileStore::new(config.state_dir()?))
}

/// Executor options from config, privileges and flags
pub fn options(
    config: &Config,
    elevation: Elevation,
    dry_run: bool,
    jobs: Option<usize>,
) -> ExecuteOptions {
    ExecuteOptions {
        jobs: jobs.unwrap_or(config.jobs).max(1),
        dry_run,
        auto_rollback: config.auto_rollback,
        elevation,
        timeouts: config.timeouts,
    }
}

/// How elevated steps can run for this user
pub fn elevation(privileges: &Privileges) -> Elevation {
    if privileges.is_root {
        Elevation::Root
    } else if privileges.passwordless {
        Elevation::Passwordless
    } else if privileges.can_elevate {
        Elevation::Password
    } else {
        Elevation::Unavailable
    }
}

/// Secret values a plan needs, from flags or prompts
///
/// The sudo password is asked for only when a step is elevated, sudo
/// needs one, and the run is real.
pub fn collect_secrets(
    plan: &Plan,
    given: &BTreeMap<String, String>,
    options: &ExecuteOptions,
) -> Result<Secrets> {
    let mut secrets = Secrets::new();
    let mut wanted: Vec<&str> = Vec::new();
    for step in &plan.steps {
        for id in &step.secret_inputs {
            if !wanted.contains(&id.as_str()) {
                wanted.push(id.as_str());
            }
        }
    }

    for id in wanted {
        let value = match given.get(id) {
            Some(value) => value.clone(),
            None if options.dry_run => continue,
            None => prompt::secret_input(id)?,
        };
        secrets = secrets.with_input(id, value);
    }

    if !options.dry_run
        && options.elevation == Elevation::Password
        && plan.steps.iter().any(|s| s.needs_sudo)
    {
        secrets = secrets.with_password(prompt::sudo_password()?);
    }
    Ok(secrets)
}

/// Print a resolved plan; commands are shortened unless verbose
pub fn show_plan(plan: &Plan, verbose: bool) {
    ui::header(&format!("Plan: {}", plan.label));

    if let Some(error) = &plan.error {
        ui::error(&error.message);
        if let Some(remediation) = &error.remediation {
            ui::dim(remediation);
        }
        return;
    }
    if plan.already_installed {
        ui::success(&format!("{} is already installed", plan.label));
        return;
    }

    ui::kv("Risk", &ui::risk(plan.risk.level).to_string());
    for escalation in &plan.risk.escalations {
        ui::dim(&format!(
            "{} raised to {}: {}",
            escalation.source, escalation.level, escalation.reason
        ));
    }
    ui::kv("Needs sudo", if plan.needs_sudo { "yes" } else { "no" });
    if !plan.selections.is_empty() {
        let selected: Vec<String> = plan
            .selections
            .iter()
            .map(|(choice, picked)| format!("{choice}={}", picked.join(",")))
            .collect();
        ui::kv("Selections", &selected.join(" "));
    }

    ui::section("Steps");
    for (n, step) in plan.steps.iter().enumerate() {
        let sudo = if step.needs_sudo { " [sudo]" } else { "" };
        println!("  {:>2}. {}{sudo}", n + 1, step.label);
        if verbose {
            ui::dim(&format!("   {}", step.shell_command()));
        } else {
            ui::dim(&format!("   {}", ui::truncate(&step.command, 100)));
        }
    }

    for warning in &plan.warnings {
        ui::warn(warning);
    }
}

/// Review, confirm and run a resolved plan
pub fn run_plan(
    ctx: &Context,
    session: &Session,
    plan: Plan,
    inputs: &BTreeMap<String, String>,
    gate: &mut dyn GateConfirm,
    dry_run: bool,
    jobs: Option<usize>,
) -> Result<()> {
    if !ctx.quiet {
        show_plan(&plan, ctx.verbose > 0);
    }
    if let Some(error) = &plan.error {
        bail!("Cannot plan {}: {}", plan.tool, error.message);
    }
    if plan.already_installed {
        return Ok(());
    }

    let options = session.options(dry_run, jobs);
    if options.elevation == Elevation::Unavailable && plan.needs_sudo && !dry_run {
        bail!("{} needs sudo, which is not available to this user", plan.tool);
    }
    let secrets = collect_secrets(&plan, inputs, &options)?;

    let store = open_store(&session.config)?;
    let runner = ShellRunner::new();
    let executor = Executor::new(&runner, &store, options)
        .with_mechanisms(session.resolver.mechanisms().clone());
    let mut progress = StepProgress::new(plan.steps.len(), ctx.quiet);

    let result = executor
        .execute(plan, &secrets, gate, &mut progress)
        .context("Plan did not run")?;
    progress.finish();
    report(&result, dry_run)
}

/// Summarise an execution result; a failed run is an error
pub fn report(result: &ExecutionResult, dry_run: bool) -> Result<()> {
    if let Some(rollback) = &result.rollback {
        if rollback.outcome.is_done() {
            ui::info(&format!("Rolled back {} step(s)", rollback.undone.len()));
        } else {
            ui::warn("Automatic rollback did not finish");
        }
        for step in &rollback.not_reversible {
            ui::warn(&format!("Cannot undo {step}"));
        }
    }

    match &result.outcome {
        RunOutcome::Done if dry_run => {
            ui::info("Dry run complete, nothing was changed");
            Ok(())
        }
        RunOutcome::Done => {
            ui::success(&format!("Plan {} complete", result.plan_id));
            Ok(())
        }
        RunOutcome::Paused { step, scope } => {
            ui::warn(&format!("{step} needs a {scope} restart"));
            ui::dim(&format!("Afterwards run: rigger resume {}", result.plan_id));
            Ok(())
        }
        RunOutcome::NeedsPrivilege { step } => {
            ui::warn(&format!("{step} needs elevated privileges"));
            ui::dim(&format!("Run again with sudo access: rigger resume {}", result.plan_id));
            Ok(())
        }
        RunOutcome::Failed { failed, skipped } => {
            if !skipped.is_empty() {
                ui::dim(&format!("Skipped: {}", skipped.join(", ")));
            }
            if result.rollback.is_none() {
                ui::dim(&format!("Retry with: rigger resume {}", result.plan_id));
            }
            bail!("Failed step(s): {}", failed.join(", "))
        }
        RunOutcome::Cancelled => {
            ui::warn(&format!("Plan {} cancelled", result.plan_id));
            Ok(())
        }
    }
}
