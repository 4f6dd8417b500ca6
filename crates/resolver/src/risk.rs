//! Risk classification and confirmation gates
//!
//! Aggregate risk is the maximum of the recipe's base risk, every step's
//! risk and every choice escalation. The gate follows from it:
//!
//! | Aggregate        | Gate                                   |
//! |------------------|----------------------------------------|
//! | low              | none                                   |
//! | medium           | single confirmation                    |
//! | high, critical   | typed confirmation naming the steps    |
//!
//! A high or critical step must carry an inline rollback or point at an
//! earlier backup step; otherwise it is listed as a violation and the plan
//! is invalid.

use blueprint::{ConfirmationGate, Escalation, Plan, RiskLevel, RiskSummary};
use std::collections::BTreeMap;

/// Compute the risk summary and gate for a plan
pub fn classify(
    plan: &Plan,
    base: RiskLevel,
    escalations: &[Escalation],
) -> (RiskSummary, ConfirmationGate) {
    let position: BTreeMap<&str, usize> = plan
        .steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut level = base;
    let mut high_risk_steps = Vec::new();
    let mut violations = Vec::new();

    for (index, step) in plan.steps.iter().enumerate() {
        let risk = step.risk_level();
        level = level.max(risk);
        if !risk.is_high() {
            continue;
        }
        high_risk_steps.push(step.id.clone());

        let backed_up = step
            .backup_step
            .as_deref()
            .and_then(|id| position.get(id))
            .is_some_and(|backup| *backup < index);
        if step.rollback.is_none() && !backed_up {
            violations.push(step.id.clone());
        }
    }

    for escalation in escalations {
        level = level.max(escalation.level);
    }

    let gate = gate_for(plan, level, &high_risk_steps, escalations);
    let summary = RiskSummary {
        level,
        base,
        escalations: escalations.to_vec(),
        high_risk_steps,
        violations,
    };
    (summary, gate)
}

fn gate_for(
    plan: &Plan,
    level: RiskLevel,
    high_risk_steps: &[String],
    escalations: &[Escalation],
) -> ConfirmationGate {
    match level {
        RiskLevel::Low => ConfirmationGate::None,
        RiskLevel::Medium => ConfirmationGate::Single {
            prompt: format!("Installing {} makes system changes. Continue?", plan.label),
        },
        RiskLevel::High | RiskLevel::Critical => {
            let mut prompt = format!(
                "Installing {} is {} risk. Type '{}' to continue.",
                plan.label, level, plan.tool
            );
            for escalation in escalations.iter().filter(|e| e.level.is_high()) {
                prompt.push_str(&format!("\n  - {}", escalation.reason));
            }
            ConfirmationGate::Typed {
                prompt,
                phrase: plan.tool.clone(),
                steps: high_risk_steps.to_vec(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint::{RollbackAction, Step, StepKind};

    fn plan(steps: Vec<Step>) -> Plan {
        Plan {
            tool: "nvidia-driver".into(),
            label: "NVIDIA driver".into(),
            steps,
            ..Default::default()
        }
    }

    fn step(id: &str, risk: Option<RiskLevel>) -> Step {
        let mut step = Step::new(id, StepKind::ToolInstall, id, "true");
        step.risk = risk;
        step
    }

    #[test]
    fn test_all_low_has_no_gate() {
        let (summary, gate) = classify(&plan(vec![step("a", None)]), RiskLevel::Low, &[]);
        assert_eq!(summary.level, RiskLevel::Low);
        assert_eq!(gate, ConfirmationGate::None);
    }

    #[test]
    fn test_medium_is_single_confirmation() {
        let (_, gate) = classify(
            &plan(vec![step("a", Some(RiskLevel::Medium))]),
            RiskLevel::Low,
            &[],
        );
        assert!(matches!(gate, ConfirmationGate::Single { .. }));
    }

    #[test]
    fn test_high_step_typed_gate_names_step() {
        let mut risky = step("install:nvidia-driver", Some(RiskLevel::High));
        risky.rollback = Some(RollbackAction {
            command: "apt-get remove -y nvidia-driver-550".into(),
            needs_sudo: true,
        });
        let (summary, gate) = classify(&plan(vec![step("a", None), risky]), RiskLevel::Low, &[]);
        assert!(summary.is_valid());
        match gate {
            ConfirmationGate::Typed { phrase, steps, .. } => {
                assert_eq!(phrase, "nvidia-driver");
                assert_eq!(steps, vec!["install:nvidia-driver"]);
            }
            other => panic!("expected typed gate, got {other:?}"),
        }
    }

    #[test]
    fn test_high_step_without_undo_is_violation() {
        let (summary, _) = classify(
            &plan(vec![step("dkms", Some(RiskLevel::Critical))]),
            RiskLevel::Low,
            &[],
        );
        assert_eq!(summary.violations, vec!["dkms"]);
        assert!(!summary.is_valid());
    }

    #[test]
    fn test_backup_must_precede_step() {
        let mut write = step("config:grub", Some(RiskLevel::High));
        write.backup_step = Some("backup:grub".into());
        let backup = step("backup:grub", None);

        let (summary, _) = classify(
            &plan(vec![backup.clone(), write.clone()]),
            RiskLevel::Low,
            &[],
        );
        assert!(summary.is_valid());

        let (summary, _) = classify(&plan(vec![write, backup]), RiskLevel::Low, &[]);
        assert_eq!(summary.violations, vec!["config:grub"]);
    }

    #[test]
    fn test_escalation_raises_level() {
        let escalation = Escalation {
            level: RiskLevel::High,
            reason: "building a kernel module".into(),
            source: "choice:method=dkms".into(),
        };
        let (summary, gate) =
            classify(&plan(vec![step("a", None)]), RiskLevel::Medium, &[escalation]);
        assert_eq!(summary.level, RiskLevel::High);
        assert_eq!(summary.base, RiskLevel::Medium);
        match gate {
            ConfirmationGate::Typed { prompt, .. } => assert!(prompt.contains("kernel module")),
            other => panic!("expected typed gate, got {other:?}"),
        }
    }
}
