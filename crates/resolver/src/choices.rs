//! Choice resolution
//!
//! Two passes over a recipe's choices:
//!
//! - **discover**: evaluate every option against the environment and the
//!   selections known so far. Unavailable options stay in the list with a
//!   reason; a choice with exactly one available option is auto-selected
//!   but still returned.
//! - **apply**: turn final selections and inputs into an effective recipe
//!   (option install overrides, extra packages and dependencies), template
//!   values and risk escalations.
//!
//! Choices are evaluated in declaration order, repeated until no further
//! gate settles, so a `when` may name a choice declared later. A choice
//! whose gate never settles stays pending; in strict mode a selection for
//! it is an error rather than being dropped.

use crate::error::{Error, Result};
use crate::versions::{VersionCache, VersionProvider};
use blueprint::choice::OptionRequires;
use blueprint::{
    ChoiceDef, ChoiceKind, ConditionRegistry, EnvironmentProfile, Escalation, Evaluation,
    InputDef, InputKind, OptionDef, Recipe, RecipeKind, RiskLevel,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Choice id to selected option ids
pub type Selections = BTreeMap<String, Vec<String>>;

/// Availability of one option for this environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionState {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub available: bool,
    /// Set whenever `available` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_hint: Option<String>,
    pub default: bool,
    /// Waiting on an earlier choice before it can be evaluated
    pub pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,
}

/// Whether a choice applies given earlier selections
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ChoiceStatus {
    Active,
    /// Gated on a choice that has no value yet
    Pending { waiting_on: String },
    /// Gated on a value that was not selected
    Inactive { reason: String },
}

/// One evaluated choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceState {
    pub id: String,
    pub label: String,
    pub kind: ChoiceKind,
    pub status: ChoiceStatus,
    /// Every defined option, available or not
    pub options: Vec<OptionState>,
    /// Set when exactly one option is available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_selected: Option<String>,
    /// Effective selection: explicit, auto-selected or default
    pub selected: Vec<String>,
}

impl ChoiceState {
    pub fn available(&self) -> impl Iterator<Item = &OptionState> {
        self.options.iter().filter(|o| o.available)
    }

    pub fn option(&self, id: &str) -> Option<&OptionState> {
        self.options.iter().find(|o| o.id == id)
    }
}

/// Result of choice discovery for one tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceSet {
    pub tool: String,
    pub label: String,
    pub choices: Vec<ChoiceState>,
    /// Free-form inputs the caller may supply
    pub inputs: Vec<InputDef>,
    /// When a remote version list was fetched; excluded from determinism
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions_fetched_at: Option<DateTime<Utc>>,
}

impl ChoiceSet {
    /// Whether every choice has a value and nothing is pending
    pub fn is_complete(&self) -> bool {
        self.choices.iter().all(|c| match c.status {
            ChoiceStatus::Pending { .. } => false,
            ChoiceStatus::Inactive { .. } => true,
            ChoiceStatus::Active => c.kind == ChoiceKind::Multi || !c.selected.is_empty(),
        })
    }

    /// Effective selections of active choices
    pub fn selections(&self) -> Selections {
        self.choices
            .iter()
            .filter(|c| c.status == ChoiceStatus::Active && !c.selected.is_empty())
            .map(|c| (c.id.clone(), c.selected.clone()))
            .collect()
    }

    pub fn choice(&self, id: &str) -> Option<&ChoiceState> {
        self.choices.iter().find(|c| c.id == id)
    }
}

/// Version lists for `versions_from` choices
#[derive(Clone, Copy)]
pub struct VersionLookup<'a> {
    pub cache: &'a VersionCache,
    pub provider: Option<&'a dyn VersionProvider>,
    pub now: DateTime<Utc>,
}

/// How selections that do not fit are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Ignore them (discovery)
    Lenient,
    /// Reject them (resolution)
    Strict,
}

/// Evaluate every choice of a recipe
pub fn discover(
    recipe: &Recipe,
    env: &EnvironmentProfile,
    conditions: &ConditionRegistry,
    selections: &Selections,
    versions: VersionLookup<'_>,
    mode: Mode,
) -> Result<ChoiceSet> {
    if mode == Mode::Strict
        && let Some((choice, picked)) = selections
            .iter()
            .find(|(id, _)| !recipe.choices.iter().any(|c| &c.id == *id))
    {
        return Err(Error::InvalidSelection {
            choice: choice.clone(),
            option: picked.join(","),
            reason: "no such choice".to_string(),
        });
    }

    // Settle gates leniently first so strict checks see every known value
    let mut values: Selections = BTreeMap::new();
    for _ in 0..=recipe.choices.len() {
        let before = values.clone();
        let (states, _) = evaluate(
            recipe,
            env,
            conditions,
            selections,
            versions,
            Mode::Lenient,
            &mut values,
        )?;
        if values == before || !states.iter().any(is_pending) {
            break;
        }
    }
    let (states, fetched_at) = evaluate(
        recipe,
        env,
        conditions,
        selections,
        versions,
        mode,
        &mut values,
    )?;

    if mode == Mode::Strict
        && let Some((state, picked)) = states
            .iter()
            .filter(|s| is_pending(s))
            .find_map(|s| selections.get(&s.id).filter(|p| !p.is_empty()).map(|p| (s, p)))
    {
        let waiting_on = match &state.status {
            ChoiceStatus::Pending { waiting_on } => waiting_on.as_str(),
            _ => "",
        };
        return Err(Error::InvalidSelection {
            choice: state.id.clone(),
            option: picked.join(","),
            reason: format!("depends on '{waiting_on}', which never gets a value"),
        });
    }

    Ok(ChoiceSet {
        tool: recipe.id.clone(),
        label: recipe.label.clone(),
        choices: states,
        inputs: recipe.inputs.clone(),
        versions_fetched_at: fetched_at,
    })
}

fn is_pending(state: &ChoiceState) -> bool {
    matches!(state.status, ChoiceStatus::Pending { .. })
}

/// One pass over the choices in declaration order, recording values as they settle
fn evaluate(
    recipe: &Recipe,
    env: &EnvironmentProfile,
    conditions: &ConditionRegistry,
    selections: &Selections,
    versions: VersionLookup<'_>,
    mode: Mode,
    values: &mut Selections,
) -> Result<(Vec<ChoiceState>, Option<DateTime<Utc>>)> {
    let mut fetched_at = None;
    let mut states = Vec::with_capacity(recipe.choices.len());

    for choice in &recipe.choices {
        let status = gate(&choice.when, values, |dep, want| {
            format!("only applies when {dep} = {want}")
        });

        let (definitions, fetched) = option_definitions(recipe, choice, versions)?;
        if fetched.is_some() {
            fetched_at = fetched;
        }

        let options: Vec<OptionState> = definitions
            .iter()
            .map(|def| evaluate_option(def, &status, values, env, conditions))
            .collect();

        let auto_selected = match status {
            ChoiceStatus::Active => {
                let mut available = options.iter().filter(|o| o.available);
                match (available.next(), available.next()) {
                    (Some(only), None) => Some(only.id.clone()),
                    _ => None,
                }
            }
            _ => None,
        };

        let mut state = ChoiceState {
            id: choice.id.clone(),
            label: choice.label.clone(),
            kind: choice.kind,
            status,
            options,
            auto_selected,
            selected: Vec::new(),
        };

        match state.status {
            ChoiceStatus::Active => {
                state.selected = select(&state, selections.get(&choice.id), mode)?;
                if !state.selected.is_empty() || state.kind == ChoiceKind::Multi {
                    values.insert(choice.id.clone(), state.selected.clone());
                }
            }
            ChoiceStatus::Inactive { .. } => {
                values.insert(choice.id.clone(), Vec::new());
            }
            ChoiceStatus::Pending { .. } => {}
        }
        states.push(state);
    }
    Ok((states, fetched_at))
}

/// Check `when` gates against values known so far
fn gate(
    when: &BTreeMap<String, String>,
    values: &Selections,
    mismatch: impl Fn(&str, &str) -> String,
) -> ChoiceStatus {
    for (dep, want) in when {
        match values.get(dep) {
            None => {
                return ChoiceStatus::Pending {
                    waiting_on: dep.clone(),
                };
            }
            Some(picked) if !picked.contains(want) => {
                return ChoiceStatus::Inactive {
                    reason: mismatch(dep, want),
                };
            }
            Some(_) => {}
        }
    }
    ChoiceStatus::Active
}

/// Static options, synthesized toggle options, or a cached version list
fn option_definitions(
    recipe: &Recipe,
    choice: &ChoiceDef,
    versions: VersionLookup<'_>,
) -> Result<(Vec<OptionDef>, Option<DateTime<Utc>>)> {
    if !choice.options.is_empty() {
        return Ok((choice.options.clone(), None));
    }

    if choice.kind == ChoiceKind::Toggle {
        let toggle = |id: &str, label: &str, default: bool| OptionDef {
            id: id.to_string(),
            label: Some(label.to_string()),
            default,
            ..Default::default()
        };
        return Ok((
            vec![toggle("on", "Enabled", false), toggle("off", "Disabled", true)],
            None,
        ));
    }

    let Some(source) = choice.versions_from.as_deref() else {
        return Ok((Vec::new(), None));
    };
    let Some(provider) = versions.provider else {
        log::warn!(
            "No version provider configured for '{}:{}'",
            recipe.id,
            choice.id
        );
        return Ok((Vec::new(), None));
    };

    let cached = versions
        .cache
        .get_or_fetch(&recipe.id, source, provider, versions.now)?;
    let definitions = cached
        .versions
        .iter()
        .enumerate()
        .map(|(i, version)| OptionDef {
            id: version.clone(),
            default: i == 0,
            ..Default::default()
        })
        .collect();
    Ok((definitions, Some(cached.fetched_at)))
}

fn evaluate_option(
    def: &OptionDef,
    status: &ChoiceStatus,
    values: &Selections,
    env: &EnvironmentProfile,
    conditions: &ConditionRegistry,
) -> OptionState {
    let mut state = OptionState {
        id: def.id.clone(),
        label: def.display_label().to_string(),
        description: def.description.clone(),
        available: false,
        disabled_reason: None,
        enable_hint: def.enable_hint.clone(),
        default: def.default,
        pending: false,
        risk: def.risk,
    };

    let status = match status {
        ChoiceStatus::Active => gate(&def.when, values, |dep, want| {
            format!("requires {dep} = {want}")
        }),
        other => other.clone(),
    };

    match status {
        ChoiceStatus::Pending { waiting_on } => {
            state.pending = true;
            state.disabled_reason = Some(format!("waiting for a '{waiting_on}' selection"));
        }
        ChoiceStatus::Inactive { reason } => state.disabled_reason = Some(reason),
        ChoiceStatus::Active => match unmet(&def.requires, env, conditions) {
            Some((reason, hint)) => {
                state.disabled_reason = Some(reason);
                if state.enable_hint.is_none() {
                    state.enable_hint = hint;
                }
            }
            None => state.available = true,
        },
    }
    state
}

/// First unmet requirement, with a generic hint
fn unmet(
    req: &OptionRequires,
    env: &EnvironmentProfile,
    conditions: &ConditionRegistry,
) -> Option<(String, Option<String>)> {
    if !req.os.is_empty()
        && !req
            .os
            .iter()
            .any(|os| os == env.os.family.as_str() || *os == env.os.distro)
    {
        return Some((format!("requires OS: {}", req.os.join(", ")), None));
    }
    if !req.arch.is_empty() && !req.arch.contains(&env.os.arch) {
        return Some((
            format!("requires architecture: {}", req.arch.join(", ")),
            None,
        ));
    }
    if !req.package_managers.is_empty()
        && !req.package_managers.iter().any(|pm| env.has_package_manager(pm))
    {
        return Some((
            format!("requires one of: {}", req.package_managers.join(", ")),
            Some(format!("install {}", req.package_managers[0])),
        ));
    }
    if let Some(missing) = req.binaries.iter().find(|b| !env.has_binary(b)) {
        return Some((
            format!("requires `{missing}` on PATH"),
            Some(format!("install {missing} first")),
        ));
    }
    if let Some(vendor) = &req.gpu
        && env.gpu_vendor() != Some(vendor.as_str())
    {
        return Some((format!("requires a {vendor} GPU"), None));
    }
    if let Some(min) = req.min_memory_mb
        && env.hardware.memory_mb < min
    {
        return Some((
            format!(
                "requires at least {min} MB of memory ({} MB available)",
                env.hardware.memory_mb
            ),
            None,
        ));
    }
    if req.kernel_headers && !env.kernel.headers_installed {
        return Some((
            "requires kernel headers".to_string(),
            Some(format!("install headers for kernel {}", env.kernel.release)),
        ));
    }
    if req.network && !env.network.online {
        return Some((
            "requires network access".to_string(),
            Some("connect to the network and retry".to_string()),
        ));
    }
    if req.not_container && env.container.in_container {
        return Some(("not available inside a container".to_string(), None));
    }
    for condition in &req.conditions {
        if conditions.evaluate(Some(condition), env) == Evaluation::Known(false) {
            return Some((format!("condition '{condition}' is not met"), None));
        }
    }
    None
}

/// Effective selection for an active choice
fn select(state: &ChoiceState, given: Option<&Vec<String>>, mode: Mode) -> Result<Vec<String>> {
    if let Some(given) = given.filter(|g| !g.is_empty()) {
        match validate(state, given) {
            Ok(()) => return Ok(given.clone()),
            Err(err) if mode == Mode::Strict => return Err(err),
            Err(err) => log::debug!("Ignoring selection: {err}"),
        }
    }

    if let Some(auto) = &state.auto_selected {
        return Ok(vec![auto.clone()]);
    }

    let mut defaults = state.available().filter(|o| o.default).map(|o| o.id.clone());
    let picked: Vec<String> = match state.kind {
        ChoiceKind::Multi => defaults.collect(),
        _ => defaults.next().into_iter().collect(),
    };
    if picked.is_empty() && state.kind != ChoiceKind::Multi && mode == Mode::Strict {
        return Err(Error::MissingSelection {
            choice: state.id.clone(),
        });
    }
    Ok(picked)
}

fn validate(state: &ChoiceState, given: &[String]) -> Result<()> {
    let invalid = |option: &str, reason: String| Error::InvalidSelection {
        choice: state.id.clone(),
        option: option.to_string(),
        reason,
    };

    if state.kind != ChoiceKind::Multi && given.len() > 1 {
        return Err(invalid(
            &given.join(","),
            "only one option may be selected".to_string(),
        ));
    }
    let mut seen = BTreeSet::new();
    for id in given {
        if !seen.insert(id.as_str()) {
            return Err(invalid(id, "selected more than once".to_string()));
        }
        let Some(option) = state.option(id) else {
            return Err(invalid(id, "no such option".to_string()));
        };
        if !option.available {
            let reason = option
                .disabled_reason
                .clone()
                .unwrap_or_else(|| "option is unavailable".to_string());
            return Err(invalid(id, reason));
        }
    }
    Ok(())
}

/// Selections and inputs applied to a recipe
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Recipe with option overrides merged in
    pub recipe: Recipe,
    pub selections: Selections,
    /// Template values: choice ids and non-secret inputs
    pub values: BTreeMap<String, String>,
    /// Password inputs, substituted only at execution time
    pub secrets: BTreeSet<String>,
    pub escalations: Vec<Escalation>,
}

/// Merge the selected options and supplied inputs into the recipe
pub fn apply(
    recipe: &Recipe,
    set: &ChoiceSet,
    inputs: &BTreeMap<String, String>,
) -> Result<Resolution> {
    let mut effective = recipe.clone();
    let mut values = BTreeMap::new();
    let mut escalations = Vec::new();
    let selections = set.selections();

    for (choice_id, picked) in &selections {
        values.insert(choice_id.clone(), picked.join(" "));
        let Some(def) = recipe.choices.iter().find(|c| &c.id == choice_id) else {
            continue;
        };
        for option in def.options.iter().filter(|o| picked.contains(&o.id)) {
            merge_option(&mut effective, option);
            if let Some(level) = option.risk.filter(|level| *level > recipe.risk) {
                escalations.push(Escalation {
                    level,
                    reason: option.risk_reason.clone().unwrap_or_else(|| {
                        format!("{} = {} raises the risk", def.label, option.display_label())
                    }),
                    source: format!("choice:{}={}", def.id, option.id),
                });
            }
        }
    }

    if let Some(unknown) = inputs
        .keys()
        .find(|key| !recipe.inputs.iter().any(|i| &i.id == *key))
    {
        return Err(Error::InvalidInput {
            input: unknown.clone(),
            reason: "no such input".to_string(),
        });
    }

    let mut secrets = BTreeSet::new();
    for input in &recipe.inputs {
        if input.is_secret() {
            secrets.insert(input.id.clone());
            continue;
        }
        let value = inputs
            .get(&input.id)
            .or(input.default.as_ref())
            .ok_or_else(|| Error::MissingInput {
                input: input.id.clone(),
            })?;
        check_input(input, value)?;
        values.insert(input.id.clone(), value.clone());
    }

    Ok(Resolution {
        recipe: effective,
        selections,
        values,
        secrets,
        escalations,
    })
}

fn merge_option(recipe: &mut Recipe, option: &OptionDef) {
    if let RecipeKind::Tool {
        install,
        needs_sudo,
    } = &mut recipe.kind
    {
        for (mechanism, command) in &option.install {
            install.insert(mechanism.clone(), command.clone());
        }
        for (mechanism, sudo) in &option.needs_sudo {
            needs_sudo.insert(mechanism.clone(), *sudo);
        }
    }
    for (family, packages) in &option.packages {
        let target = recipe.requires.packages.entry(family.clone()).or_default();
        for package in packages {
            if !target.contains(package) {
                target.push(package.clone());
            }
        }
    }
    for binary in &option.binaries {
        if !recipe.requires.binaries.contains(binary) {
            recipe.requires.binaries.push(binary.clone());
        }
    }
    if option.restart.is_some() {
        recipe.restart = option.restart;
    }
}

fn check_input(input: &InputDef, value: &str) -> Result<()> {
    let reason = match input.kind {
        InputKind::Number if value.parse::<f64>().is_err() => Some("expected a number".to_string()),
        InputKind::Select if !input.options.iter().any(|o| o == value) => {
            Some(format!("expected one of: {}", input.options.join(", ")))
        }
        _ => None,
    };
    match reason {
        Some(reason) => Err(Error::InvalidInput {
            input: input.id.clone(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{container, debian};
    use blueprint::InstallCommand;
    use blueprint::profile::GpuInfo;

    fn torch() -> Recipe {
        let mut recipe = Recipe::tool("torch", "PyTorch")
            .with_install("pip", "pip3 install torch", false);
        recipe.choices = vec![
            ChoiceDef {
                id: "backend".into(),
                label: "Compute backend".into(),
                options: vec![
                    OptionDef {
                        id: "cpu".into(),
                        default: true,
                        ..Default::default()
                    },
                    OptionDef {
                        id: "cuda".into(),
                        label: Some("NVIDIA CUDA".into()),
                        requires: OptionRequires {
                            gpu: Some("nvidia".into()),
                            ..Default::default()
                        },
                        enable_hint: Some("install an NVIDIA driver".into()),
                        install: BTreeMap::from([(
                            "pip".to_string(),
                            InstallCommand::Plain(
                                "pip3 install torch --index-url {index}".to_string(),
                            ),
                        )]),
                        risk: Some(RiskLevel::Medium),
                        ..Default::default()
                    },
                    OptionDef {
                        id: "rocm".into(),
                        requires: OptionRequires {
                            gpu: Some("amd".into()),
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
            ChoiceDef {
                id: "cuda_version".into(),
                label: "CUDA version".into(),
                kind: ChoiceKind::Version,
                when: BTreeMap::from([("backend".to_string(), "cuda".to_string())]),
                options: vec![
                    OptionDef {
                        id: "12.4".into(),
                        default: true,
                        ..Default::default()
                    },
                    OptionDef {
                        id: "11.8".into(),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
        ];
        recipe
    }

    fn lookup(cache: &VersionCache) -> VersionLookup<'_> {
        VersionLookup {
            cache,
            provider: None,
            now: Utc::now(),
        }
    }

    fn with_nvidia() -> EnvironmentProfile {
        let mut env = debian();
        env.hardware.gpu = Some(GpuInfo {
            vendor: "nvidia".into(),
            model: "RTX 4090".into(),
            ..Default::default()
        });
        env
    }

    #[test]
    fn test_unavailable_options_are_kept() {
        let cache = VersionCache::default();
        let set = discover(
            &torch(),
            &debian(),
            &ConditionRegistry::builtin(),
            &Selections::new(),
            lookup(&cache),
            Mode::Lenient,
        )
        .unwrap();
        let backend = set.choice("backend").unwrap();
        assert_eq!(backend.options.len(), 3);
        let cuda = backend.option("cuda").unwrap();
        assert!(!cuda.available);
        assert_eq!(cuda.disabled_reason.as_deref(), Some("requires a nvidia GPU"));
        assert_eq!(cuda.enable_hint.as_deref(), Some("install an NVIDIA driver"));
        // only cpu is available
        assert_eq!(backend.auto_selected.as_deref(), Some("cpu"));
        assert_eq!(backend.selected, vec!["cpu"]);

        let version = set.choice("cuda_version").unwrap();
        assert!(matches!(version.status, ChoiceStatus::Inactive { .. }));
        assert_eq!(version.options.len(), 2);
        assert!(set.is_complete());
    }

    #[test]
    fn test_gated_choice_follows_selection() {
        let cache = VersionCache::default();
        let selections = Selections::from([("backend".to_string(), vec!["cuda".to_string()])]);
        let set = discover(
            &torch(),
            &with_nvidia(),
            &ConditionRegistry::builtin(),
            &selections,
            lookup(&cache),
            Mode::Strict,
        )
        .unwrap();
        assert_eq!(set.choice("backend").unwrap().auto_selected, None);
        let version = set.choice("cuda_version").unwrap();
        assert_eq!(version.status, ChoiceStatus::Active);
        assert_eq!(version.selected, vec!["12.4"]);
    }

    #[test]
    fn test_gate_on_later_choice() {
        let cache = VersionCache::default();
        let mut recipe = torch();
        recipe.choices.reverse();
        let selections = Selections::from([
            ("backend".to_string(), vec!["cuda".to_string()]),
            ("cuda_version".to_string(), vec!["11.8".to_string()]),
        ]);
        let set = discover(
            &recipe,
            &with_nvidia(),
            &ConditionRegistry::builtin(),
            &selections,
            lookup(&cache),
            Mode::Strict,
        )
        .unwrap();
        let version = set.choice("cuda_version").unwrap();
        assert_eq!(version.status, ChoiceStatus::Active);
        assert_eq!(version.selected, vec!["11.8"]);
        assert!(set.is_complete());
        assert_eq!(set.selections().get("cuda_version"), Some(&vec!["11.8".to_string()]));
    }

    #[test]
    fn test_selection_for_unsettled_choice_rejected() {
        let cache = VersionCache::default();
        let mut recipe = torch();
        recipe.choices[0].when = BTreeMap::from([("cuda_version".to_string(), "12.4".to_string())]);
        let selections = Selections::from([("backend".to_string(), vec!["cpu".to_string()])]);

        let lenient = discover(
            &recipe,
            &with_nvidia(),
            &ConditionRegistry::builtin(),
            &selections,
            lookup(&cache),
            Mode::Lenient,
        )
        .unwrap();
        assert!(!lenient.is_complete());

        let err = discover(
            &recipe,
            &with_nvidia(),
            &ConditionRegistry::builtin(),
            &selections,
            lookup(&cache),
            Mode::Strict,
        )
        .unwrap_err();
        assert!(
            matches!(err, Error::InvalidSelection { ref choice, ref reason, .. } if choice == "backend" && reason.contains("cuda_version"))
        );
    }

    #[test]
    fn test_unavailable_selection_rejected() {
        let cache = VersionCache::default();
        let selections = Selections::from([("backend".to_string(), vec!["cuda".to_string()])]);
        let err = discover(
            &torch(),
            &debian(),
            &ConditionRegistry::builtin(),
            &selections,
            lookup(&cache),
            Mode::Strict,
        )
        .unwrap_err();
        assert!(
            matches!(err, Error::InvalidSelection { ref option, ref reason, .. } if option == "cuda" && reason.contains("GPU"))
        );
    }

    #[test]
    fn test_missing_selection_without_default() {
        let mut recipe = torch();
        recipe.choices.truncate(1);
        for option in &mut recipe.choices[0].options {
            option.default = false;
        }
        let cache = VersionCache::default();
        let err = discover(
            &recipe,
            &with_nvidia(),
            &ConditionRegistry::builtin(),
            &Selections::new(),
            lookup(&cache),
            Mode::Strict,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingSelection { .. }));
    }

    #[test]
    fn test_apply_overrides_and_escalates() {
        let recipe = torch();
        let cache = VersionCache::default();
        let selections = Selections::from([("backend".to_string(), vec!["cuda".to_string()])]);
        let set = discover(
            &recipe,
            &with_nvidia(),
            &ConditionRegistry::builtin(),
            &selections,
            lookup(&cache),
            Mode::Strict,
        )
        .unwrap();
        let resolution = apply(&recipe, &set, &BTreeMap::new()).unwrap();
        assert_eq!(
            resolution.recipe.install_command("pip", blueprint::OsFamily::Debian),
            Some("pip3 install torch --index-url {index}")
        );
        assert_eq!(resolution.values["backend"], "cuda");
        assert_eq!(resolution.values["cuda_version"], "12.4");
        assert_eq!(resolution.escalations.len(), 1);
        assert_eq!(resolution.escalations[0].source, "choice:backend=cuda");
    }

    #[test]
    fn test_toggle_synthesized() {
        let mut recipe =
            Recipe::tool("zsh", "zsh").with_install("apt", "apt-get install -y zsh", true);
        recipe.choices.push(ChoiceDef {
            id: "default_shell".into(),
            label: "Make default shell".into(),
            kind: ChoiceKind::Toggle,
            ..Default::default()
        });
        let cache = VersionCache::default();
        let set = discover(
            &recipe,
            &container(),
            &ConditionRegistry::builtin(),
            &Selections::new(),
            lookup(&cache),
            Mode::Strict,
        )
        .unwrap();
        let toggle = set.choice("default_shell").unwrap();
        assert_eq!(toggle.options.len(), 2);
        assert_eq!(toggle.selected, vec!["off"]);
    }

    #[test]
    fn test_inputs_and_secrets() {
        let mut recipe = Recipe::tool("grafana", "Grafana");
        recipe.inputs = vec![
            InputDef {
                id: "port".into(),
                label: "Port".into(),
                kind: InputKind::Number,
                default: Some("3000".into()),
                ..Default::default()
            },
            InputDef {
                id: "admin_password".into(),
                label: "Admin password".into(),
                kind: InputKind::Password,
                ..Default::default()
            },
        ];
        let set = ChoiceSet {
            tool: "grafana".into(),
            label: "Grafana".into(),
            choices: Vec::new(),
            inputs: recipe.inputs.clone(),
            versions_fetched_at: None,
        };

        let resolution = apply(&recipe, &set, &BTreeMap::new()).unwrap();
        assert_eq!(resolution.values["port"], "3000");
        assert!(!resolution.values.contains_key("admin_password"));
        assert!(resolution.secrets.contains("admin_password"));

        let bad = BTreeMap::from([("port".to_string(), "http".to_string())]);
        assert!(matches!(apply(&recipe, &set, &bad), Err(Error::InvalidInput { .. })));
    }
}
