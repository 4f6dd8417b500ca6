//! Uninstall and update plans
//!
//! Both are single-tool plans: no dependency walk, no package batch. The
//! mechanism is the one the selector would pick today, so a tool installed
//! by hand through a different mechanism may need `uninstall["default"]`.

use crate::assembler::{BACKUP_SUFFIX, shell_path, verify_command};
use crate::error::{Error, Result};
use crate::{risk, selector};
use blueprint::mechanism::FALLBACK;
use blueprint::template::render;
use blueprint::{
    EnvironmentProfile, MechanismRegistry, Plan, Recipe, RecipeKind, RiskLevel, RollbackAction,
    Step, StepKind,
};
use std::collections::BTreeMap;

/// Plan that removes a tool
pub fn uninstall(
    recipe: &Recipe,
    env: &EnvironmentProfile,
    registry: &MechanismRegistry,
) -> Result<Plan> {
    let mechanism = selector::select(recipe, env, registry).unwrap_or_else(|| FALLBACK.to_string());
    let command =
        uninstall_command(recipe, &mechanism, env, registry).ok_or_else(|| Error::NotReversible {
            tool: recipe.id.clone(),
            mechanism: mechanism.clone(),
        })?;

    let mut step = lifecycle_step(
        recipe,
        env,
        registry,
        &mechanism,
        format!("uninstall:{}", recipe.id),
        StepKind::Uninstall,
        format!("Remove {}", recipe.label),
        command,
    );
    step.rollback = recipe
        .install_command(&mechanism, env.os.family)
        .map(|command| RollbackAction {
            command: render(command, &input_defaults(recipe)),
            needs_sudo: step.needs_sudo,
        });

    let mut plan = lifecycle_plan(recipe, env, vec![step]);
    if !plan.already_installed {
        plan.warnings
            .push(format!("{} does not appear to be installed", recipe.label));
    }
    log::debug!("Uninstall plan for {} via {mechanism}", recipe.id);
    Ok(plan)
}

/// Plan that updates a tool in place, then verifies it
///
/// Without an update command a tool recipe re-runs its install command,
/// which package managers treat as an upgrade.
pub fn update(
    recipe: &Recipe,
    env: &EnvironmentProfile,
    registry: &MechanismRegistry,
) -> Result<Plan> {
    let mechanism = selector::select(recipe, env, registry).ok_or_else(|| Error::Unsatisfiable {
        tool: recipe.id.clone(),
        unusable: selector::unusable(recipe, env, registry),
    })?;

    let mut warnings = Vec::new();
    let command = match recipe
        .update
        .get(&mechanism)
        .or_else(|| recipe.update.get("default"))
    {
        Some(command) => command.clone(),
        None => {
            let install = recipe
                .install_command(&mechanism, env.os.family)
                .ok_or_else(|| Error::NoUpdate {
                    tool: recipe.id.clone(),
                    mechanism: mechanism.clone(),
                })?;
            warnings.push(format!(
                "{} has no update command for {mechanism}; re-running its install command",
                recipe.label
            ));
            install.to_string()
        }
    };

    let update = lifecycle_step(
        recipe,
        env,
        registry,
        &mechanism,
        format!("update:{}", recipe.id),
        StepKind::Update,
        format!("Update {}", recipe.label),
        command,
    );
    let mut verify = Step::new(
        format!("verify:{}", recipe.id),
        StepKind::Verification,
        format!("Verify {}", recipe.label),
        verify_command(recipe),
    )
    .after(&[update.id.as_str()]);
    verify.env = update.env.clone();
    verify.tool = Some(recipe.id.clone());

    let mut plan = lifecycle_plan(recipe, env, vec![update, verify]);
    if !plan.already_installed {
        warnings.push(format!("{} does not appear to be installed", recipe.label));
    }
    plan.warnings.splice(0..0, warnings);
    Ok(plan)
}

/// Undo command for an install, most specific first
fn uninstall_command(
    recipe: &Recipe,
    mechanism: &str,
    env: &EnvironmentProfile,
    registry: &MechanismRegistry,
) -> Option<String> {
    if let Some(command) = recipe
        .uninstall
        .get(mechanism)
        .or_else(|| recipe.uninstall.get("default"))
    {
        return Some(command.clone());
    }

    let derived = match &recipe.kind {
        RecipeKind::Tool { .. } => recipe
            .install_command(mechanism, env.os.family)
            .and_then(|command| registry.batch_packages(mechanism, command))
            .and_then(|packages| registry.remove_command(mechanism, &packages)),
        RecipeKind::Data { dest, .. } => Some(format!("rm -f {}", shell_path(dest))),
        RecipeKind::Config { dest, .. } => {
            let path = shell_path(dest);
            let backup = shell_path(&format!("{dest}{BACKUP_SUFFIX}"));
            Some(format!(
                "if [ -e {backup} ]; then mv {backup} {path}; else rm -f {path}; fi"
            ))
        }
        RecipeKind::Build { .. } => None,
    };
    derived.or_else(|| recipe.rollback.clone())
}

#[allow(clippy::too_many_arguments)]
fn lifecycle_step(
    recipe: &Recipe,
    env: &EnvironmentProfile,
    registry: &MechanismRegistry,
    mechanism: &str,
    id: String,
    kind: StepKind,
    label: String,
    command: String,
) -> Step {
    let declared = recipe
        .needs_sudo(mechanism)
        .unwrap_or_else(|| registry.runs_elevated(mechanism));
    let sudo = declared && !registry.never_elevated(mechanism) && !env.privileges.is_root;

    let mut step = Step::new(id, kind, label, render(&command, &input_defaults(recipe)))
        .after(&[])
        .sudo(sudo);
    step.lock = registry.lock(mechanism).map(str::to_string);
    step.mechanism = Some(mechanism.to_string());
    step.tool = Some(recipe.id.clone());
    step.risk = (recipe.risk > RiskLevel::Low).then_some(recipe.risk);
    step.env = recipe
        .path_additions
        .iter()
        .filter(|dir| !env.on_search_path(dir))
        .map(|dir| format!("export PATH=\"{dir}:$PATH\""))
        .collect();
    step
}

fn lifecycle_plan(recipe: &Recipe, env: &EnvironmentProfile, steps: Vec<Step>) -> Plan {
    let already_installed = match recipe.kind {
        RecipeKind::Tool { .. } | RecipeKind::Build { .. } => env.has_binary(recipe.binary_name()),
        RecipeKind::Data { .. } | RecipeKind::Config { .. } => true,
    };
    let mut plan = Plan {
        tool: recipe.id.clone(),
        label: recipe.label.clone(),
        already_installed,
        steps,
        ..Default::default()
    };
    plan.refresh_sudo();
    let (summary, gate) = risk::classify(&plan, recipe.risk, &[]);
    for id in &summary.violations {
        plan.warnings
            .push(format!("high-risk step '{id}' has no rollback or backup"));
    }
    plan.risk = summary;
    plan.gate = gate;
    plan
}

/// Non-secret input defaults, for lifecycle commands that use placeholders
fn input_defaults(recipe: &Recipe) -> BTreeMap<String, String> {
    recipe
        .inputs
        .iter()
        .filter(|input| !input.is_secret())
        .filter_map(|input| Some((input.id.clone(), input.default.clone()?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{catalog, container, debian};

    #[test]
    fn test_uninstall_derives_remove_command() {
        let catalog = catalog();
        let mut env = debian();
        env.binaries.insert("docker".into());
        let plan = uninstall(
            catalog.get("docker").unwrap(),
            &env,
            &MechanismRegistry::builtin(),
        )
        .unwrap();
        assert!(plan.already_installed);
        assert_eq!(plan.steps.len(), 1);
        let step = &plan.steps[0];
        assert_eq!(step.id, "uninstall:docker");
        assert_eq!(step.command, "apt-get remove -y docker.io");
        assert!(step.needs_sudo);
        assert_eq!(step.lock.as_deref(), Some("dpkg"));
        assert_eq!(
            step.rollback.as_ref().map(|r| r.command.as_str()),
            Some("apt-get install -y docker.io")
        );
    }

    #[test]
    fn test_uninstall_prefers_recipe_command() {
        let mut recipe = catalog().get("starship").unwrap().clone();
        recipe
            .uninstall
            .insert("default".into(), "rm -f /usr/local/bin/starship".into());
        let plan = uninstall(&recipe, &debian(), &MechanismRegistry::builtin()).unwrap();
        assert_eq!(plan.steps[0].command, "rm -f /usr/local/bin/starship");
        assert!(plan.warnings.iter().any(|w| w.contains("not appear to be installed")));
    }

    #[test]
    fn test_uninstall_without_undo_is_not_reversible() {
        let recipe = catalog().get("starship").unwrap().clone();
        let err = uninstall(&recipe, &debian(), &MechanismRegistry::builtin()).unwrap_err();
        assert!(
            matches!(err, Error::NotReversible { ref mechanism, .. } if mechanism == "fallback")
        );
    }

    #[test]
    fn test_update_falls_back_to_install() {
        let recipe = catalog().get("python3").unwrap().clone();
        let plan = update(&recipe, &container(), &MechanismRegistry::builtin()).unwrap();
        let ids: Vec<&str> = plan.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["update:python3", "verify:python3"]);
        assert_eq!(plan.steps[0].command, "apt-get install -y python3");
        assert!(!plan.needs_sudo);
        assert!(plan.warnings[0].contains("re-running"));
    }

    #[test]
    fn test_update_uses_update_command() {
        let mut recipe = catalog().get("poetry").unwrap().clone();
        recipe.update.insert("fallback".into(), "poetry self update".into());
        let plan = update(&recipe, &debian(), &MechanismRegistry::builtin()).unwrap();
        let step = &plan.steps[0];
        assert_eq!(step.command, "poetry self update");
        assert_eq!(
            step.shell_command(),
            "export PATH=\"$HOME/.local/bin:$PATH\" && poetry self update"
        );
        assert_eq!(plan.steps[1].command, "poetry --version");
    }
}
