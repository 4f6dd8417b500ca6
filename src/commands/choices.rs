//! Choice discovery for one tool

use anyhow::Result;
use blueprint::ChoiceKind;
use colored::Colorize;
use resolver::{ChoiceSet, ChoiceState, ChoiceStatus, OptionState};

use crate::Context;
use crate::cli::{self, ChoicesArgs};
use crate::commands::Session;
use crate::ui;

pub fn run(_ctx: &Context, args: ChoicesArgs) -> Result<()> {
    let session = Session::open()?;
    let set = session
        .resolver
        .discover(&args.tool, &session.env, &cli::selections(&args.select))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&set)?);
        return Ok(());
    }
    show(&set);
    Ok(())
}

fn kind_name(kind: ChoiceKind) -> &'static str {
    match kind {
        ChoiceKind::Single => "pick one",
        ChoiceKind::Multi => "pick any",
        ChoiceKind::Version => "version",
        ChoiceKind::Toggle => "on/off",
    }
}

fn show(set: &ChoiceSet) {
    ui::header(&format!("Choices: {}", set.label));
    if set.choices.is_empty() && set.inputs.is_empty() {
        ui::info("Nothing to choose; the recipe installs as is");
        return;
    }

    for choice in &set.choices {
        show_choice(choice);
    }

    if !set.inputs.is_empty() {
        ui::section("Inputs (--input id=value)");
        for input in &set.inputs {
            let default = match (&input.default, input.is_secret()) {
                (_, true) => " (secret, prompted if not given)".to_string(),
                (Some(d), false) => format!(" (default {d})"),
                (None, false) => String::new(),
            };
            println!("  {} {}{}", input.id.bold(), input.label, default.dimmed());
        }
    }

    println!();
    if set.is_complete() {
        ui::success("All choices have a value");
    } else {
        ui::warn("Some choices still need a selection (--select choice=option)");
    }
}

fn show_choice(choice: &ChoiceState) {
    ui::section(&format!("{} ({}, {})", choice.label, choice.id, kind_name(choice.kind)));
    match &choice.status {
        ChoiceStatus::Active => {}
        ChoiceStatus::Pending { waiting_on } => {
            ui::dim(&format!("waiting on '{waiting_on}'"));
        }
        ChoiceStatus::Inactive { reason } => {
            ui::dim(&format!("not applicable: {reason}"));
            return;
        }
    }
    if choice.options.is_empty() {
        ui::dim("no options available");
    }
    for option in &choice.options {
        println!("  {}", option_line(option, &choice.selected));
        if let Some(hint) = option.disabled_reason.as_ref().and(option.enable_hint.as_ref()) {
            ui::dim(&format!("    to enable: {hint}"));
        }
    }
}

fn option_line(option: &OptionState, selected: &[String]) -> String {
    let marker = if selected.contains(&option.id) {
        "●".green()
    } else if option.available {
        "○".normal()
    } else {
        "✗".red()
    };
    let mut line = format!("{marker} {} {}", option.id.bold(), option.label);
    if let Some(risk) = option.risk {
        line.push_str(&format!(" [{}]", ui::risk(risk)));
    }
    if let Some(reason) = &option.disabled_reason {
        line.push_str(&format!(" {}", format!("({reason})").dimmed()));
    } else if option.pending {
        line.push_str(&format!(" {}", "(pending)".dimmed()));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(id: &str, available: bool) -> OptionState {
        OptionState {
            id: id.into(),
            label: id.to_uppercase(),
            description: None,
            available,
            disabled_reason: (!available).then(|| "needs an NVIDIA GPU".to_string()),
            enable_hint: None,
            default: false,
            pending: false,
            risk: None,
        }
    }

    #[test]
    fn test_option_line_mentions_reason() {
        colored::control::set_override(false);
        let line = option_line(&option("open", false), &[]);
        assert!(line.contains("open"));
        assert!(line.contains("needs an NVIDIA GPU"));

        let line = option_line(&option("recommended", true), &["recommended".into()]);
        assert!(line.starts_with('●'));
    }
}
