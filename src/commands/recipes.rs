//! Catalog browsing

use anyhow::{Result, bail};
use blueprint::{Recipe, RecipeKind};
use colored::Colorize;

use crate::Context;
use crate::catalog;
use crate::cli::RecipesCommand;
use crate::config::Config;
use crate::ui;

pub fn run(ctx: &Context, cmd: Option<RecipesCommand>) -> Result<()> {
    let config = Config::load()?;
    let catalog = catalog::load(&config)?;

    match cmd.unwrap_or(RecipesCommand::List) {
        RecipesCommand::List => {
            if !ctx.quiet {
                ui::header(&format!("Recipes ({})", catalog.len()));
            }
            for recipe in catalog.iter() {
                println!(
                    "  {:<16} {:<8} {:<7} {}",
                    recipe.id.bold(),
                    kind_name(&recipe.kind),
                    ui::risk(recipe.risk),
                    recipe.label.dimmed()
                );
            }
            Ok(())
        }
        RecipesCommand::Show { id } => match catalog.get(&id) {
            Some(recipe) => {
                show(recipe);
                Ok(())
            }
            None => bail!("No recipe named '{id}' (see `rigger recipes list`)"),
        },
    }
}

fn kind_name(kind: &RecipeKind) -> &'static str {
    match kind {
        RecipeKind::Tool { .. } => "tool",
        RecipeKind::Build { .. } => "build",
        RecipeKind::Data { .. } => "data",
        RecipeKind::Config { .. } => "config",
    }
}

fn show(recipe: &Recipe) {
    ui::header(&recipe.label);
    ui::kv("Id", &recipe.id);
    ui::kv("Kind", kind_name(&recipe.kind));
    ui::kv("Risk", &ui::risk(recipe.risk).to_string());
    ui::kv("Binary", recipe.binary_name());
    if !recipe.requires.binaries.is_empty() {
        ui::kv("Requires", &recipe.requires.binaries.join(", "));
    }
    if let Some(scope) = recipe.restart {
        ui::kv("Restart", &scope.to_string());
    }

    match &recipe.kind {
        RecipeKind::Tool { install, needs_sudo } => {
            ui::section("Install");
            for mechanism in install.keys() {
                let sudo = if needs_sudo.get(mechanism).copied().unwrap_or(false) {
                    " [sudo]"
                } else {
                    ""
                };
                println!("  {mechanism}{sudo}");
            }
        }
        RecipeKind::Build { stages } => {
            ui::section("Stages");
            for (n, stage) in stages.iter().enumerate() {
                println!("  {:>2}. {}", n + 1, stage.label);
            }
        }
        RecipeKind::Data { url, dest, size_mb, .. } => {
            ui::kv("Source", url);
            ui::kv("Destination", dest);
            if let Some(size) = size_mb {
                ui::kv("Size", &format!("{size} MB"));
            }
        }
        RecipeKind::Config { dest, .. } => ui::kv("Destination", dest),
    }

    if !recipe.choices.is_empty() {
        ui::section("Choices");
        for choice in &recipe.choices {
            let options: Vec<&str> = choice.options.iter().map(|o| o.id.as_str()).collect();
            let listed = if options.is_empty() {
                choice
                    .versions_from
                    .as_deref()
                    .map(|source| format!("versions from '{source}'"))
                    .unwrap_or_default()
            } else {
                options.join(", ")
            };
            println!("  {} {}", choice.id.bold(), listed.dimmed());
        }
    }
    if !recipe.inputs.is_empty() {
        ui::section("Inputs");
        for input in &recipe.inputs {
            let default = input
                .default
                .as_deref()
                .map(|d| format!(" (default {d})"))
                .unwrap_or_default();
            println!("  {} {}{}", input.id.bold(), input.label, default.dimmed());
        }
    }
    if !recipe.post_install.is_empty() {
        ui::section("After install");
        for action in &recipe.post_install {
            println!("  {}", action.label);
        }
    }
}
