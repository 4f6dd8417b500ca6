//! Plan assembly
//!
//! Turns the collector's chain into steps, always in this order:
//!
//! 1. repository setup for every tool in the chain that needs one
//! 2. a single package batch holding every batched package
//! 3. install steps, dependencies first
//! 4. post-install actions whose condition holds
//! 5. exactly one verification of the requested tool
//!
//! Every step gets explicit dependency ids so independent installs may run
//! side by side; steps that share a package manager share its lock.

use crate::choices::Resolution;
use crate::collector::{Collection, PlannedTool};
use crate::error::{Error, Result};
use crate::risk;
use blueprint::mechanism::{DOWNLOAD, SOURCE};
use blueprint::template::{placeholders, render};
use blueprint::{
    Catalog, ConditionRegistry, EnvironmentProfile, Evaluation, MechanismRegistry, Plan, Recipe,
    RecipeKind, RiskLevel, RollbackAction, Step, StepGraph, StepKind,
};
use std::collections::BTreeMap;

/// Id of the package batch step
pub const BATCH_STEP: &str = "packages";

/// Suffix of the file a config step backs up to
pub const BACKUP_SUFFIX: &str = ".rigger-bak";

/// Builds plans from collected chains
pub struct Assembler<'a> {
    catalog: &'a Catalog,
    env: &'a EnvironmentProfile,
    mechanisms: &'a MechanismRegistry,
    conditions: &'a ConditionRegistry,
}

impl<'a> Assembler<'a> {
    pub fn new(
        catalog: &'a Catalog,
        env: &'a EnvironmentProfile,
        mechanisms: &'a MechanismRegistry,
        conditions: &'a ConditionRegistry,
    ) -> Self {
        Self {
            catalog,
            env,
            mechanisms,
            conditions,
        }
    }

    pub fn assemble(&self, resolution: &Resolution, collection: &Collection) -> Result<Plan> {
        let root = &resolution.recipe;
        let mut warnings = Vec::new();
        for edge in &collection.cycles_broken {
            log::warn!("Dependency cycle broken at {edge}");
            warnings.push(format!("dependency cycle broken at {edge}"));
        }

        let mut steps = Vec::new();
        let repo_ids = self.repository_steps(resolution, collection, &mut steps)?;
        let batch = self.batch_step(root, collection, &repo_ids, &mut steps)?;

        let root_risk = resolution
            .escalations
            .iter()
            .map(|e| e.level)
            .fold(root.risk, RiskLevel::max);

        let mut terminal: BTreeMap<&str, String> = BTreeMap::new();
        for planned in &collection.chain {
            let recipe = self.recipe(resolution, &planned.tool)?;
            if planned.is_batched() {
                terminal.insert(&planned.tool, BATCH_STEP.to_string());
                if let Some(step) = steps.iter_mut().find(|s| s.id == BATCH_STEP) {
                    let risk = if recipe.id == root.id {
                        root_risk
                    } else {
                        recipe.risk
                    };
                    if risk > step.risk_level() {
                        step.risk = Some(risk);
                    }
                    if step.restart.is_none() {
                        step.restart = recipe.restart;
                    }
                }
                continue;
            }

            let mut deps: Vec<String> = batch.iter().cloned().collect();
            let repo_id = format!("repo:{}", planned.tool);
            if repo_ids.contains(&repo_id) {
                deps.push(repo_id);
            }
            for dep in &planned.after {
                if let Some(id) = terminal.get(dep.as_str())
                    && !deps.contains(id)
                {
                    deps.push(id.clone());
                }
            }

            let mut expanded = self.install_steps(recipe, planned, deps);
            let Some(last) = expanded.last_mut() else {
                continue;
            };
            let risk = if recipe.id == root.id {
                root_risk
            } else {
                recipe.risk
            };
            last.risk = (risk > RiskLevel::Low).then_some(risk);
            last.restart = recipe.restart;
            terminal.insert(&planned.tool, last.id.clone());
            steps.extend(expanded);
        }

        for planned in &collection.chain {
            let recipe = self.recipe(resolution, &planned.tool)?;
            let after = terminal.get(planned.tool.as_str()).cloned();
            self.post_install_steps(recipe, after, collection, &mut steps, &mut warnings);
        }

        if !steps.is_empty() {
            let leaves: Vec<String> = StepGraph::build(&steps)?
                .leaves()
                .into_iter()
                .map(str::to_string)
                .collect();
            let mut verify = Step::new(
                format!("verify:{}", root.id),
                StepKind::Verification,
                format!("Verify {}", root.label),
                verify_command(root),
            );
            verify.depends_on = Some(leaves);
            verify.env = collection.env.clone();
            verify.tool = Some(root.id.clone());
            steps.push(verify);
        }

        for step in &mut steps {
            substitute(step, resolution, &mut warnings);
        }
        StepGraph::build(&steps)?;

        let mut plan = Plan {
            tool: root.id.clone(),
            label: root.label.clone(),
            already_installed: collection.satisfied.contains(&root.id),
            steps,
            selections: resolution.selections.clone(),
            ..Default::default()
        };
        plan.refresh_sudo();

        let (summary, gate) = risk::classify(&plan, root.risk, &resolution.escalations);
        for id in &summary.violations {
            warnings.push(format!("high-risk step '{id}' has no rollback or backup"));
        }
        plan.risk = summary;
        plan.gate = gate;
        plan.warnings = warnings;
        Ok(plan)
    }

    fn recipe<'r>(&'r self, resolution: &'r Resolution, id: &str) -> Result<&'r Recipe> {
        if id == resolution.recipe.id {
            return Ok(&resolution.recipe);
        }
        self.catalog
            .get(id)
            .ok_or_else(|| Error::UnknownTool(id.to_string()))
    }

    fn elevate(&self, declared: bool, mechanism: Option<&str>) -> bool {
        declared
            && !self.env.privileges.is_root
            && !mechanism.is_some_and(|m| self.mechanisms.never_elevated(m))
    }

    fn repository_steps(
        &self,
        resolution: &Resolution,
        collection: &Collection,
        steps: &mut Vec<Step>,
    ) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for planned in &collection.chain {
            let recipe = self.recipe(resolution, &planned.tool)?;
            let Some(setup) = recipe.repo_setup.get(&planned.mechanism) else {
                continue;
            };
            let label = setup
                .label
                .clone()
                .unwrap_or_else(|| format!("Add package repository for {}", recipe.label));
            let mechanism = planned.mechanism.as_str();
            let mut step = Step::new(
                format!("repo:{}", planned.tool),
                StepKind::RepositorySetup,
                label,
                setup.commands.join(" && "),
            )
            .after(&[])
            .sudo(self.elevate(setup.needs_sudo, Some(mechanism)));
            step.lock = self.mechanisms.lock(mechanism).map(str::to_string);
            step.mechanism = Some(mechanism.to_string());
            step.tool = Some(planned.tool.clone());
            ids.push(step.id.clone());
            steps.push(step);
        }
        Ok(ids)
    }

    fn batch_step(
        &self,
        root: &Recipe,
        collection: &Collection,
        repo_ids: &[String],
        steps: &mut Vec<Step>,
    ) -> Result<Option<String>> {
        if collection.batch.is_empty() {
            return Ok(None);
        }
        let unsatisfiable = || Error::Unsatisfiable {
            tool: root.id.clone(),
            unusable: Vec::new(),
        };
        let pm = collection
            .batch_mechanism
            .as_deref()
            .ok_or_else(unsatisfiable)?;
        let packages: Vec<String> = collection.batch.iter().cloned().collect();
        let command = self
            .mechanisms
            .install_command(pm, &packages)
            .ok_or_else(unsatisfiable)?;

        let mut step = Step::new(
            BATCH_STEP,
            StepKind::PackageBatch,
            format!("Install system packages ({})", packages.join(", ")),
            command,
        )
        .sudo(self.elevate(self.mechanisms.runs_elevated(pm), Some(pm)));
        step.depends_on = Some(repo_ids.to_vec());
        step.lock = self.mechanisms.lock(pm).map(str::to_string);
        step.mechanism = Some(pm.to_string());
        step.rollback = self
            .mechanisms
            .remove_command(pm, &packages)
            .map(|command| RollbackAction {
                command,
                needs_sudo: step.needs_sudo,
            });
        step.packages = packages;
        steps.push(step);
        Ok(Some(BATCH_STEP.to_string()))
    }

    /// Steps for one non-batched tool; the last one is its terminal step
    fn install_steps(
        &self,
        recipe: &Recipe,
        planned: &PlannedTool,
        deps: Vec<String>,
    ) -> Vec<Step> {
        let tool = planned.tool.as_str();
        let mechanism = planned.mechanism.as_str();
        let finish = |mut step: Step| {
            step.tool = Some(tool.to_string());
            step.mechanism = Some(mechanism.to_string());
            step.env = planned.env.clone();
            step
        };

        match &recipe.kind {
            RecipeKind::Tool { .. } => {
                let command = planned.command.clone().unwrap_or_default();
                let packages = self
                    .mechanisms
                    .batch_packages(mechanism, &command)
                    .unwrap_or_default();
                let mut step = Step::new(
                    format!("install:{tool}"),
                    StepKind::ToolInstall,
                    format!("Install {} ({mechanism})", recipe.label),
                    command,
                )
                .sudo(planned.needs_sudo);
                step.depends_on = Some(deps);
                step.lock = self.mechanisms.lock(mechanism).map(str::to_string);
                step.rollback = recipe
                    .undo_command(mechanism)
                    .map(str::to_string)
                    .or_else(|| {
                        (!packages.is_empty())
                            .then(|| self.mechanisms.remove_command(mechanism, &packages))
                            .flatten()
                    })
                    .map(|command| RollbackAction {
                        command,
                        needs_sudo: step.needs_sudo,
                    });
                step.packages = packages;
                vec![finish(step)]
            }
            RecipeKind::Build { stages } => {
                let mut out: Vec<Step> = Vec::with_capacity(stages.len());
                let mut previous = deps;
                for (index, stage) in stages.iter().enumerate() {
                    let mut step = Step::new(
                        format!("build:{tool}:{}", index + 1),
                        StepKind::BuildStage,
                        format!("{}: {}", recipe.label, stage.label),
                        stage.command.clone(),
                    )
                    .sudo(self.elevate(stage.needs_sudo, None));
                    step.depends_on = Some(previous);
                    previous = vec![step.id.clone()];
                    out.push(finish(step));
                }
                if let Some(last) = out.last_mut() {
                    last.rollback = recipe.undo_command(SOURCE).map(|command| RollbackAction {
                        command: command.to_string(),
                        needs_sudo: last.needs_sudo,
                    });
                }
                out
            }
            RecipeKind::Data {
                url, dest, sha256, ..
            } => {
                let path = shell_path(dest);
                let mut command = format!(
                    "mkdir -p \"$(dirname {path})\" && curl -fL --retry 3 -o {path} '{url}'"
                );
                if let Some(sum) = sha256 {
                    command.push_str(&format!(" && echo '{sum}  '{path} | sha256sum -c -"));
                }
                let mut step = Step::new(
                    format!("download:{tool}"),
                    StepKind::DataDownload,
                    format!("Download {}", recipe.label),
                    command,
                );
                step.depends_on = Some(deps);
                step.rollback = Some(RollbackAction {
                    command: recipe
                        .undo_command(DOWNLOAD)
                        .map_or_else(|| format!("rm -f {path}"), str::to_string),
                    needs_sudo: false,
                });
                vec![finish(step)]
            }
            RecipeKind::Config {
                dest,
                template,
                needs_sudo,
            } => {
                let path = shell_path(dest);
                let backup_path = shell_path(&format!("{dest}{BACKUP_SUFFIX}"));
                let sudo = self.elevate(*needs_sudo, None);

                let mut backup = Step::new(
                    format!("backup:{tool}"),
                    StepKind::Backup,
                    format!("Back up {dest}"),
                    format!("if [ -e {path} ]; then cp -p {path} {backup_path}; fi"),
                )
                .sudo(sudo);
                backup.depends_on = Some(deps);

                let mut write = Step::new(
                    format!("config:{tool}"),
                    StepKind::ConfigWrite,
                    format!("Write {dest}"),
                    format!(
                        "mkdir -p \"$(dirname {path})\" && cat > {path} <<'RIGGER_EOF'\n{template}\nRIGGER_EOF"
                    ),
                )
                .sudo(sudo)
                .after(&[backup.id.as_str()]);
                write.backup_step = Some(backup.id.clone());
                write.rollback = Some(RollbackAction {
                    command: format!(
                        "if [ -e {backup_path} ]; then mv {backup_path} {path}; else rm -f {path}; fi"
                    ),
                    needs_sudo: sudo,
                });
                vec![finish(backup), finish(write)]
            }
        }
    }

    fn post_install_steps(
        &self,
        recipe: &Recipe,
        after: Option<String>,
        collection: &Collection,
        steps: &mut Vec<Step>,
        warnings: &mut Vec<String>,
    ) {
        let mut previous = after;
        for (index, action) in recipe.post_install.iter().enumerate() {
            let condition = action.condition.as_deref();
            match self.conditions.evaluate(condition, self.env) {
                Evaluation::Known(false) => {
                    log::debug!(
                        "Skipping post-install '{}' of {}: condition {} is false",
                        action.label,
                        recipe.id,
                        condition.unwrap_or_default()
                    );
                    continue;
                }
                Evaluation::Unknown => warnings.push(format!(
                    "unknown condition '{}' on post-install '{}' of {}; step included",
                    condition.unwrap_or_default(),
                    action.label,
                    recipe.id
                )),
                Evaluation::Known(true) => {}
            }

            let kind = if action.service {
                StepKind::ServiceAction
            } else {
                StepKind::PostInstall
            };
            let label = if action.label.is_empty() {
                format!("{} post-install {}", recipe.label, index + 1)
            } else {
                action.label.clone()
            };
            let mut step = Step::new(
                format!("post:{}:{}", recipe.id, index + 1),
                kind,
                label,
                action.command.clone(),
            )
            .sudo(self.elevate(action.needs_sudo, None));
            step.depends_on = Some(previous.iter().cloned().collect());
            step.env = collection.env.clone();
            step.tool = Some(recipe.id.clone());
            step.risk = action.risk;
            step.restart = action.restart;
            step.rollback = action.rollback.as_ref().map(|command| RollbackAction {
                command: command.clone(),
                needs_sudo: step.needs_sudo,
            });
            previous = Some(step.id.clone());
            steps.push(step);
        }
    }
}

/// Verification command for the requested tool
pub fn verify_command(recipe: &Recipe) -> String {
    if let Some(verify) = &recipe.verify {
        return verify.clone();
    }
    match &recipe.kind {
        RecipeKind::Tool { .. } | RecipeKind::Build { .. } => {
            format!("command -v {}", recipe.binary_name())
        }
        RecipeKind::Data { dest, .. } => format!("test -s {}", shell_path(dest)),
        RecipeKind::Config { dest, .. } => format!("test -f {}", shell_path(dest)),
    }
}

/// Double-quoted path with a leading `~` turned into `$HOME`
pub fn shell_path(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) => format!("\"$HOME/{rest}\""),
        None => format!("\"{path}\""),
    }
}

/// Fill template values; password inputs stay as placeholders
fn substitute(step: &mut Step, resolution: &Resolution, warnings: &mut Vec<String>) {
    step.command = render(&step.command, &resolution.values);
    if let Some(rollback) = &mut step.rollback {
        rollback.command = render(&rollback.command, &resolution.values);
    }
    for name in placeholders(&step.command) {
        if resolution.secrets.contains(&name) {
            if !step.secret_inputs.contains(&name) {
                step.secret_inputs.push(name);
            }
        } else {
            log::warn!("Step '{}' has no value for '{{{name}}}'", step.id);
            warnings.push(format!("step '{}' has no value for '{{{name}}}'", step.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::choices::{ChoiceSet, apply};
    use crate::collector::Collector;
    use crate::fixtures::{catalog, container, debian};
    use blueprint::recipe::RepoSetup;
    use blueprint::{ConfirmationGate, InputDef, InputKind};

    fn assemble(recipe: &Recipe, catalog: &Catalog, env: &EnvironmentProfile) -> Plan {
        let mechanisms = MechanismRegistry::builtin();
        let conditions = ConditionRegistry::builtin();
        let set = ChoiceSet {
            tool: recipe.id.clone(),
            label: recipe.label.clone(),
            choices: Vec::new(),
            inputs: recipe.inputs.clone(),
            versions_fetched_at: None,
        };
        let resolution = apply(recipe, &set, &BTreeMap::new()).unwrap();
        let collection = Collector::new(catalog, &resolution.recipe, env, &mechanisms)
            .collect()
            .unwrap();
        Assembler::new(catalog, env, &mechanisms, &conditions)
            .assemble(&resolution, &collection)
            .unwrap()
    }

    fn ids(plan: &Plan) -> Vec<&str> {
        plan.steps.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_fixed_step_order() {
        let catalog = catalog();
        let mut docker = catalog.get("docker").unwrap().clone();
        docker.repo_setup.insert(
            "apt".into(),
            RepoSetup {
                label: None,
                commands: vec![
                    "install -m 0755 -d /etc/apt/keyrings".into(),
                    "curl -fsSL https://download.docker.com/linux/ubuntu/gpg -o /etc/apt/keyrings/docker.asc".into(),
                ],
                needs_sudo: true,
            },
        );
        docker.requires.binaries = vec!["starship".into()];

        let plan = assemble(&docker, &catalog, &debian());
        assert_eq!(
            ids(&plan),
            vec![
                "repo:docker",
                "packages",
                "install:starship",
                "post:docker:1",
                "post:docker:2",
                "verify:docker"
            ]
        );
        let repo = plan.step("repo:docker").unwrap();
        assert!(repo.command.contains(" && "));
        assert_eq!(repo.lock.as_deref(), Some("dpkg"));

        let batch = plan.step("packages").unwrap();
        assert_eq!(batch.command, "apt-get install -y docker.io");
        assert_eq!(batch.depends_on, Some(vec!["repo:docker".to_string()]));
    }

    #[test]
    fn test_verify_depends_on_leaves() {
        let catalog = catalog();
        let plan = assemble(catalog.get("ruff").unwrap(), &catalog, &debian());
        assert_eq!(ids(&plan), vec!["install:uv", "install:ruff", "verify:ruff"]);
        let ruff = plan.step("install:ruff").unwrap();
        assert_eq!(ruff.depends_on, Some(vec!["install:uv".to_string()]));
        assert_eq!(
            ruff.shell_command(),
            "export PATH=\"$HOME/.cargo/bin:$PATH\" && uv tool install ruff"
        );
        let verify = plan.step("verify:ruff").unwrap();
        assert_eq!(verify.depends_on, Some(vec!["install:ruff".to_string()]));
        assert_eq!(verify.command, "command -v ruff");
    }

    #[test]
    fn test_root_never_elevated() {
        let catalog = catalog();
        let plan = assemble(catalog.get("docker").unwrap(), &catalog, &container());
        assert!(!plan.needs_sudo);
        assert!(plan.steps.iter().all(|s| !s.needs_sudo));
    }

    #[test]
    fn test_config_recipe_backs_up() {
        let mut recipe = Recipe::tool("gitconfig", "Git config");
        recipe.kind = RecipeKind::Config {
            dest: "~/.gitconfig".into(),
            template: "[user]\n  name = {name}".into(),
            needs_sudo: false,
        };
        recipe.risk = RiskLevel::High;
        recipe.inputs = vec![InputDef {
            id: "name".into(),
            label: "Name".into(),
            kind: InputKind::Text,
            default: Some("Dev".into()),
            ..Default::default()
        }];
        let catalog: Catalog = [recipe.clone()].into_iter().collect();

        let plan = assemble(&recipe, &catalog, &debian());
        assert_eq!(ids(&plan), vec!["backup:gitconfig", "config:gitconfig", "verify:gitconfig"]);
        let write = plan.step("config:gitconfig").unwrap();
        assert_eq!(write.backup_step.as_deref(), Some("backup:gitconfig"));
        assert!(write.command.contains("name = Dev"));
        assert!(write.command.contains("\"$HOME/.gitconfig\""));
        assert!(plan.risk.is_valid());
        assert!(matches!(plan.gate, ConfirmationGate::Typed { .. }));
    }

    #[test]
    fn test_secret_input_stays_placeholder() {
        let mut recipe = Recipe::tool("grafana", "Grafana").with_install(
            "fallback",
            "grafana-cli admin reset-admin-password {admin_password}",
            false,
        );
        recipe.inputs = vec![InputDef {
            id: "admin_password".into(),
            label: "Admin password".into(),
            kind: InputKind::Password,
            ..Default::default()
        }];
        let catalog: Catalog = [recipe.clone()].into_iter().collect();

        let plan = assemble(&recipe, &catalog, &debian());
        let install = plan.step("install:grafana").unwrap();
        assert!(install.command.contains("{admin_password}"));
        assert_eq!(install.secret_inputs, vec!["admin_password"]);
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_unknown_condition_included_with_warning() {
        let catalog = catalog();
        let mut docker = catalog.get("docker").unwrap().clone();
        docker.post_install[0].condition = Some("has-quantum-computer".into());
        let plan = assemble(&docker, &catalog, &debian());
        assert!(plan.step("post:docker:1").is_some());
        assert!(plan.warnings.iter().any(|w| w.contains("has-quantum-computer")));
    }

    #[test]
    fn test_build_stages_chain() {
        let catalog = catalog();
        let plan = assemble(catalog.get("hello").unwrap(), &catalog, &debian());
        assert_eq!(ids(&plan), vec!["build:hello:1", "build:hello:2", "verify:hello"]);
        let install = plan.step("build:hello:2").unwrap();
        assert!(install.needs_sudo);
        assert_eq!(install.depends_on, Some(vec!["build:hello:1".to_string()]));
        assert_eq!(install.timeout, blueprint::TimeoutTier::Long);
    }
}
