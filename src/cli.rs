use clap::{Parser, Subcommand};
use clap_complete::Shell;
use resolver::Selections;
use std::collections::BTreeMap;

#[derive(Parser)]
#[command(name = "rigger")]
#[command(version)]
#[command(about = "Resolve, review and run tool installation plans", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Browse the recipe catalog
    Recipes {
        #[command(subcommand)]
        command: Option<RecipesCommand>,
    },

    /// Show the environment profile used for resolution
    Profile {
        /// Print the profile as JSON (usable as a `profile` snapshot)
        #[arg(long)]
        json: bool,
    },

    /// Show the choices a tool offers on this machine
    Choices(ChoicesArgs),

    /// Resolve a plan without running it
    Plan(PlanArgs),

    /// Resolve and run an installation plan
    Install(InstallArgs),

    /// Continue a paused or failed plan
    Resume {
        /// Plan id (see `rigger plans list`)
        plan_id: String,
    },

    /// Undo the completed steps of a plan
    Rollback {
        /// Plan id (see `rigger plans list`)
        plan_id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Remove an installed tool
    Uninstall(LifecycleArgs),

    /// Update an installed tool
    Update(LifecycleArgs),

    /// Manage live plan records
    Plans {
        #[command(subcommand)]
        command: Option<PlansCommand>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Recipes
// ============================================================================

#[derive(Subcommand)]
pub enum RecipesCommand {
    /// List all recipes
    List,

    /// Show one recipe
    Show {
        /// Recipe id
        id: String,
    },
}

// ============================================================================
// Resolution
// ============================================================================

#[derive(Parser)]
pub struct ChoicesArgs {
    /// Tool id
    pub tool: String,

    /// Choice selection as choice=option (repeatable, comma-separated for multi)
    #[arg(short, long = "select", value_parser = parse_key_value)]
    pub select: Vec<(String, String)>,

    /// Print the choice set as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Tool id
    pub tool: String,

    /// Choice selection as choice=option (repeatable, comma-separated for multi)
    #[arg(short, long = "select", value_parser = parse_key_value)]
    pub select: Vec<(String, String)>,

    /// Input value as input=value (repeatable)
    #[arg(short, long = "input", value_parser = parse_key_value)]
    pub input: Vec<(String, String)>,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct InstallArgs {
    /// Tool id
    pub tool: String,

    /// Choice selection as choice=option (repeatable, comma-separated for multi)
    #[arg(short, long = "select", value_parser = parse_key_value)]
    pub select: Vec<(String, String)>,

    /// Input value as input=value (repeatable)
    #[arg(short, long = "input", value_parser = parse_key_value)]
    pub input: Vec<(String, String)>,

    /// Accept a single confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Phrase that satisfies a typed high-risk confirmation
    #[arg(long)]
    pub confirm: Option<String>,

    /// Dry run - show what would be done
    #[arg(short, long)]
    pub dry_run: bool,

    /// Number of steps to run at once (defaults to the config value)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Parser)]
pub struct LifecycleArgs {
    /// Tool id
    pub tool: String,

    /// Accept a single confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Dry run - show what would be done
    #[arg(short, long)]
    pub dry_run: bool,
}

// ============================================================================
// Plans
// ============================================================================

#[derive(Subcommand)]
pub enum PlansCommand {
    /// List live plan records
    List,

    /// Show one plan record
    Show {
        /// Plan id
        id: String,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Cancel a plan and archive its record
    Cancel {
        /// Plan id
        id: String,
    },
}

/// Parse `key=value`
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{s}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Group `--select` pairs by choice; comma-separated values add options
pub fn selections(pairs: &[(String, String)]) -> Selections {
    let mut selections = Selections::new();
    for (choice, value) in pairs {
        let picked = selections.entry(choice.clone()).or_default();
        for option in value.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            if !picked.iter().any(|p| p == option) {
                picked.push(option.to_string());
            }
        }
    }
    selections
}

/// `--input` pairs as a map; a repeated key keeps the last value
pub fn inputs(pairs: &[(String, String)]) -> BTreeMap<String, String> {
    pairs.iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("version=22").unwrap(),
            ("version".to_string(), "22".to_string())
        );
        assert_eq!(
            parse_key_value("url=https://x?a=b").unwrap(),
            ("url".to_string(), "https://x?a=b".to_string())
        );
        assert!(parse_key_value("version").is_err());
        assert!(parse_key_value("=22").is_err());
    }

    #[test]
    fn test_selections_merge_per_choice() {
        let pairs = vec![
            ("plugins".to_string(), "compose, buildx".to_string()),
            ("plugins".to_string(), "compose".to_string()),
            ("flavor".to_string(), "open".to_string()),
        ];
        let selected = selections(&pairs);
        assert_eq!(selected["plugins"], vec!["compose", "buildx"]);
        assert_eq!(selected["flavor"], vec!["open"]);
    }

    #[test]
    fn test_install_flags() {
        let cli = Cli::try_parse_from([
            "rigger",
            "install",
            "docker",
            "-s",
            "plugins=compose",
            "--input",
            "http_port=8080",
            "--dry-run",
            "--jobs",
            "2",
        ])
        .unwrap();
        let Command::Install(args) = cli.command else {
            panic!("expected install");
        };
        assert_eq!(args.tool, "docker");
        assert!(args.dry_run);
        assert_eq!(args.jobs, Some(2));
        assert_eq!(inputs(&args.input)["http_port"], "8080");
    }
}
