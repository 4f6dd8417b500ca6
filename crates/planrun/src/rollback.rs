//! Undo plans
//!
//! Built from the completed steps of a record, newest first. A step's own
//! rollback descriptor wins (the resolver folds the recipe's explicit
//! rollback into it); otherwise the mechanism's undo command is used for
//! the packages the step installed. Completed steps with neither are
//! reported, never dropped silently. Verification steps are the one
//! exception: they only read state.

use blueprint::template::placeholders;
use blueprint::{MechanismRegistry, Plan, Step, StepGraph, StepKind};
use std::collections::BTreeSet;

/// Prefix of undo step ids
pub const UNDO_PREFIX: &str = "undo:";

/// Undo steps plus what could not be undone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoPlan {
    pub plan: Plan,
    pub not_reversible: Vec<String>,
}

impl UndoPlan {
    /// Original step id an undo step reverses
    pub fn original(undo_id: &str) -> Option<&str> {
        undo_id.strip_prefix(UNDO_PREFIX)
    }
}

/// Derive the undo plan for `completed` steps of `plan`
///
/// Undo steps run strictly one after another, in reverse dependency order.
pub fn undo_plan(
    plan: &Plan,
    completed: &BTreeSet<String>,
    mechanisms: &MechanismRegistry,
) -> UndoPlan {
    let order: Vec<&Step> = match StepGraph::build(&plan.steps) {
        Ok(graph) => graph.order().iter().filter_map(|id| plan.step(id)).collect(),
        Err(_) => plan.steps.iter().collect(),
    };

    let mut steps = Vec::new();
    let mut not_reversible = Vec::new();
    for step in order.into_iter().rev() {
        if !completed.contains(&step.id) {
            continue;
        }
        if step.kind == StepKind::Verification {
            continue;
        }
        match undo_step(step, mechanisms) {
            Some(undo) => steps.push(undo),
            None => not_reversible.push(step.id.clone()),
        }
    }

    let mut undo = Plan {
        tool: plan.tool.clone(),
        label: format!("Roll back {}", plan.label),
        steps,
        ..Default::default()
    };
    undo.refresh_sudo();
    log::debug!(
        "Undo plan for {}: {} step(s), {} not reversible",
        plan.tool,
        undo.steps.len(),
        not_reversible.len()
    );
    UndoPlan {
        plan: undo,
        not_reversible,
    }
}

fn undo_step(step: &Step, mechanisms: &MechanismRegistry) -> Option<Step> {
    let (command, needs_sudo) = match &step.rollback {
        Some(rollback) => (rollback.command.clone(), rollback.needs_sudo),
        None => {
            let mechanism = step.mechanism.as_deref()?;
            if step.packages.is_empty() {
                return None;
            }
            let command = mechanisms.remove_command(mechanism, &step.packages)?;
            (command, step.needs_sudo)
        }
    };

    let mut undo = Step::new(
        format!("{UNDO_PREFIX}{}", step.id),
        StepKind::Uninstall,
        format!("Undo: {}", step.label),
        command,
    )
    .sudo(needs_sudo);
    undo.env = step.env.clone();
    undo.lock = step.lock.clone();
    undo.mechanism = step.mechanism.clone();
    undo.tool = step.tool.clone();
    let used = placeholders(&undo.command);
    undo.secret_inputs = step
        .secret_inputs
        .iter()
        .filter(|id| used.contains(id))
        .cloned()
        .collect();
    Some(undo)
}
