//! Stored plan records: list, show, cancel, resume and rollback

use anyhow::{Context as _, Result, bail};
use chrono::Local;
use colored::Colorize;
use dialoguer::Confirm;
use planrun::{Elevation, Executor, PlanRecord, PlanStatus, Secrets, StateStore};
use std::collections::BTreeMap;

use crate::Context;
use crate::cli::PlansCommand;
use crate::commands::{collect_secrets, elevation, open_store, options, report};
use crate::config::Config;
use crate::progress::StepProgress;
use crate::runner::ShellRunner;
use crate::{profile, prompt, ui};

pub fn run(ctx: &Context, cmd: Option<PlansCommand>) -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config)?;

    match cmd.unwrap_or(PlansCommand::List) {
        PlansCommand::List => list(ctx, &store),
        PlansCommand::Show { id, json } => {
            let record = store.load(&id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                show(&record);
            }
            Ok(())
        }
        PlansCommand::Cancel { id } => {
            let runner = ShellRunner::new();
            let options = options(&config, Elevation::Unavailable, false, None);
            let executor = Executor::new(&runner, &store, options);
            let record = executor.cancel(&id)?;
            ui::success(&format!("Cancelled plan {} ({})", record.id, record.plan.tool));
            Ok(())
        }
    }
}

fn list(ctx: &Context, store: &dyn StateStore) -> Result<()> {
    let records = store.list()?;
    if records.is_empty() {
        if !ctx.quiet {
            ui::info("No live plans");
        }
        return Ok(());
    }
    if !ctx.quiet {
        ui::header(&format!("Plans ({})", records.len()));
    }
    for record in &records {
        println!(
            "  {}  {:<14} {:<8} {}/{}  {}",
            record.id.bold(),
            record.plan.tool,
            status_label(record.status),
            record.completed.len(),
            record.plan.steps.len(),
            record
                .updated_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
                .dimmed()
        );
    }
    Ok(())
}

fn status_label(status: PlanStatus) -> colored::ColoredString {
    let text = status.as_str();
    match status {
        PlanStatus::Done => text.green(),
        PlanStatus::Failed => text.red(),
        PlanStatus::Paused => text.yellow(),
        PlanStatus::Cancelled => text.dimmed(),
        PlanStatus::Created | PlanStatus::Running => text.normal(),
    }
}

/// Marker for a step of a stored plan
fn step_marker(record: &PlanRecord, id: &str) -> colored::ColoredString {
    if record.completed.contains(id) {
        "✓".green()
    } else if record.failed.contains(id) {
        "✗".red()
    } else if record.skipped.contains(id) {
        "-".yellow()
    } else if record.paused_at.as_deref() == Some(id) {
        "⏸".yellow()
    } else {
        "·".dimmed()
    }
}

fn show(record: &PlanRecord) {
    ui::header(&format!("Plan {}", record.id));
    ui::kv("Tool", &record.plan.label);
    ui::kv("Status", &status_label(record.status).to_string());
    ui::kv("Risk", &ui::risk(record.plan.risk.level).to_string());
    ui::kv(
        "Created",
        &record.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
    );
    ui::kv("Fingerprint", &record.fingerprint);

    ui::section("Steps");
    for step in &record.plan.steps {
        println!("  {} {}", step_marker(record, &step.id), step.label);
    }
    if let Some(step) = &record.paused_at {
        println!();
        ui::dim(&format!("Paused after {step}; run `rigger resume {}` to continue", record.id));
    }
}

/// Continue a paused or failed plan
pub fn resume(ctx: &Context, plan_id: &str) -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config)?;
    let record = store.load(plan_id)?;
    if !record.status.is_resumable() {
        bail!("Plan {plan_id} is {} and cannot be resumed", record.status);
    }

    let options = options(&config, elevation(&profile::privileges()), false, None);
    let secrets = collect_secrets(&record.plan, &BTreeMap::new(), &options)?;
    let remaining = record.plan.steps.len().saturating_sub(record.completed.len());

    let runner = ShellRunner::new();
    let executor = Executor::new(&runner, &store, options);
    let mut progress = StepProgress::new(remaining, ctx.quiet);
    let result = executor
        .resume(plan_id, &secrets, &mut progress)
        .with_context(|| format!("Could not resume plan {plan_id}"))?;
    progress.finish();
    report(&result, false)
}

/// Undo the completed steps of a plan
pub fn rollback(ctx: &Context, plan_id: &str, yes: bool) -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config)?;
    let record = store.load(plan_id)?;
    if record.completed.is_empty() {
        ui::info(&format!("Plan {plan_id} has no completed steps to undo"));
        return Ok(());
    }

    if !ctx.quiet {
        ui::header(&format!("Roll back {} ({})", record.plan.label, record.id));
        for id in record.completed_in_order().iter().rev() {
            println!("  {} {id}", "↶".yellow());
        }
    }
    if !yes
        && !Confirm::new()
            .with_prompt("Undo these steps?")
            .default(false)
            .interact()?
    {
        ui::info("Rollback cancelled");
        return Ok(());
    }

    let options = options(&config, elevation(&profile::privileges()), false, None);
    let needs_sudo = record
        .plan
        .steps
        .iter()
        .any(|s| s.needs_sudo && record.completed.contains(&s.id));
    let secrets = if needs_sudo && options.elevation == Elevation::Password {
        Secrets::new().with_password(prompt::sudo_password()?)
    } else {
        Secrets::new()
    };

    let runner = ShellRunner::new();
    let executor = Executor::new(&runner, &store, options);
    let mut progress = StepProgress::new(record.completed.len(), ctx.quiet);
    let rollback = executor
        .rollback(plan_id, &secrets, &mut progress)
        .with_context(|| format!("Could not roll back plan {plan_id}"))?;
    progress.finish();

    for step in &rollback.not_reversible {
        ui::warn(&format!("Cannot undo {step}"));
    }
    if rollback.outcome.is_done() {
        ui::success(&format!(
            "Undid {} step(s); plan {plan_id} archived",
            rollback.undone.len()
        ));
        Ok(())
    } else {
        bail!("Rollback of plan {plan_id} stopped early; the plan is now marked failed")
    }
}
