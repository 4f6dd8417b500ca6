mod catalog;
mod cli;
mod commands;
mod config;
mod paths;
mod profile;
mod progress;
mod prompt;
mod runner;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Recipes { command } => commands::recipes::run(&ctx, command),
        Command::Profile { json } => commands::profile::run(&ctx, json),
        Command::Choices(args) => commands::choices::run(&ctx, args),
        Command::Plan(args) => commands::plan::run(&ctx, args),
        Command::Install(args) => commands::install::run(&ctx, args),
        Command::Resume { plan_id } => commands::plans::resume(&ctx, &plan_id),
        Command::Rollback { plan_id, yes } => commands::plans::rollback(&ctx, &plan_id, yes),
        Command::Uninstall(args) => commands::lifecycle::uninstall(&ctx, args),
        Command::Update(args) => commands::lifecycle::update(&ctx, args),
        Command::Plans { command } => commands::plans::run(&ctx, command),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "rigger", &mut io::stdout());
            Ok(())
        }
    }
}
