//! Interactive prompts: confirmation gates, passwords, secret inputs

use anyhow::{Context, Result};
use blueprint::ConfirmationGate;
use colored::Colorize;
use dialoguer::{Confirm, Input, Password};
use planrun::GateConfirm;

/// Asks on the terminal unless the caller pre-approved
///
/// `--yes` acknowledges single gates only. A typed gate needs the phrase,
/// either typed at the prompt or passed with `--confirm`.
pub struct TerminalGate {
    yes: bool,
    phrase: Option<String>,
}

impl TerminalGate {
    pub fn new(yes: bool, phrase: Option<String>) -> Self {
        Self { yes, phrase }
    }
}

impl GateConfirm for TerminalGate {
    fn confirm(&mut self, gate: &ConfirmationGate) -> bool {
        match gate {
            ConfirmationGate::None => true,
            ConfirmationGate::Single { prompt } => {
                self.yes
                    || Confirm::new()
                        .with_prompt(prompt.as_str())
                        .default(false)
                        .interact()
                        .unwrap_or(false)
            }
            ConfirmationGate::Typed {
                prompt,
                phrase,
                steps,
            } => {
                if self.phrase.as_deref() == Some(phrase.as_str()) {
                    return true;
                }
                println!();
                println!("  {} {}", "HIGH RISK:".red().bold(), prompt);
                for step in steps {
                    println!("    • {step}");
                }
                println!();
                Input::<String>::new()
                    .with_prompt(format!("Type '{phrase}' to continue"))
                    .allow_empty(true)
                    .interact_text()
                    .is_ok_and(|typed| typed_matches(&typed, phrase))
            }
        }
    }
}

fn typed_matches(typed: &str, phrase: &str) -> bool {
    typed.trim() == phrase
}

/// Prompt for the sudo password
pub fn sudo_password() -> Result<String> {
    Password::new()
        .with_prompt("sudo password")
        .interact()
        .context("Failed to read password")
}

/// Prompt for a password-type input
pub fn secret_input(label: &str) -> Result<String> {
    Password::new()
        .with_prompt(label)
        .interact()
        .with_context(|| format!("Failed to read {label}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_none_and_yes() {
        let mut gate = TerminalGate::new(true, None);
        assert!(gate.confirm(&ConfirmationGate::None));
        assert!(gate.confirm(&ConfirmationGate::Single {
            prompt: "Continue?".into()
        }));
    }

    #[test]
    fn test_typed_gate_phrase_flag() {
        let mut gate = TerminalGate::new(false, Some("nvidia".into()));
        assert!(gate.confirm(&ConfirmationGate::Typed {
            prompt: "Installs a kernel driver".into(),
            phrase: "nvidia".into(),
            steps: vec!["install:nvidia".into()],
        }));
    }

    #[test]
    fn test_typed_matches_trims() {
        assert!(typed_matches("  nvidia \n", "nvidia"));
        assert!(!typed_matches("NVIDIA", "nvidia"));
    }
}
