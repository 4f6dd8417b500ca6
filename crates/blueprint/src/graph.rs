//! Step dependency graph
//!
//! Steps without explicit dependencies depend on the step before them, so a
//! plan with no annotations runs strictly in order. The graph is validated
//! up front: duplicate ids, references to unknown ids and cycles are all
//! rejected before anything runs.

use crate::error::{Error, Result};
use crate::plan::Step;
use std::collections::{BTreeMap, BTreeSet};

/// Validated dependency graph over a plan's steps
#[derive(Debug, Clone, Default)]
pub struct StepGraph {
    /// Step ids in plan order
    ids: Vec<String>,
    deps: BTreeMap<String, Vec<String>>,
    reverse: BTreeMap<String, BTreeSet<String>>,
    /// A topological order, ties broken by plan position
    order: Vec<String>,
}

impl StepGraph {
    pub fn build(steps: &[Step]) -> Result<Self> {
        let mut ids = Vec::with_capacity(steps.len());
        let mut position = BTreeMap::new();
        for (index, step) in steps.iter().enumerate() {
            if position.insert(step.id.clone(), index).is_some() {
                return Err(Error::InvalidGraph {
                    reason: format!("duplicate step id '{}'", step.id),
                });
            }
            ids.push(step.id.clone());
        }

        let mut deps: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut reverse: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (index, step) in steps.iter().enumerate() {
            let step_deps = match &step.depends_on {
                Some(explicit) => explicit.clone(),
                None if index == 0 => Vec::new(),
                None => vec![steps[index - 1].id.clone()],
            };
            for dep in &step_deps {
                if !position.contains_key(dep) {
                    return Err(Error::InvalidGraph {
                        reason: format!("step '{}' depends on unknown step '{dep}'", step.id),
                    });
                }
                reverse
                    .entry(dep.clone())
                    .or_default()
                    .insert(step.id.clone());
            }
            deps.insert(step.id.clone(), step_deps);
        }

        let order = topo_order(&ids, &position, &deps, &reverse)?;
        Ok(Self {
            ids,
            deps,
            reverse,
            order,
        })
    }

    /// Step ids in plan order
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn dependencies(&self, id: &str) -> &[String] {
        self.deps.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Steps that directly depend on `id`
    pub fn dependents(&self, id: &str) -> impl Iterator<Item = &str> {
        self.reverse
            .get(id)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Every step reachable from `id` through dependents
    pub fn downstream(&self, id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = self.dependents(id).collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next.to_string()) {
                stack.extend(self.dependents(next));
            }
        }
        seen
    }

    /// Topological order, ties broken by position in the plan
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Steps with no dependents
    pub fn leaves(&self) -> Vec<&str> {
        self.ids
            .iter()
            .filter(|id| self.reverse.get(*id).is_none_or(BTreeSet::is_empty))
            .map(String::as_str)
            .collect()
    }
}

fn topo_order(
    ids: &[String],
    position: &BTreeMap<String, usize>,
    deps: &BTreeMap<String, Vec<String>>,
    reverse: &BTreeMap<String, BTreeSet<String>>,
) -> Result<Vec<String>> {
    let mut in_degree: BTreeMap<&str, usize> = deps
        .iter()
        .map(|(id, d)| (id.as_str(), d.iter().collect::<BTreeSet<_>>().len()))
        .collect();

    // keyed by plan position so ties keep authoring order
    let mut ready: BTreeSet<(usize, &str)> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| (position[*id], *id))
        .collect();
    let mut ordered = Vec::with_capacity(ids.len());

    while let Some((_, next)) = ready.pop_first() {
        ordered.push(next.to_string());
        if let Some(children) = reverse.get(next) {
            for child in children {
                if let Some(degree) = in_degree.get_mut(child.as_str()) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert((position[child], child.as_str()));
                    }
                }
            }
        }
    }

    if ordered.len() != ids.len() {
        let done: BTreeSet<&str> = ordered.iter().map(String::as_str).collect();
        let nodes: Vec<String> = ids
            .iter()
            .filter(|id| !done.contains(id.as_str()))
            .cloned()
            .collect();
        return Err(Error::CycleDetected { nodes });
    }
    Ok(ordered)
}
