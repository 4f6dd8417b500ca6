use anyhow::Result;
use resolver::Request;

use crate::Context;
use crate::cli::{self, InstallArgs};
use crate::commands::{Session, run_plan};
use crate::prompt::TerminalGate;

/// Resolve a tool against this machine and run the plan
pub fn run(ctx: &Context, args: InstallArgs) -> Result<()> {
    let session = Session::open()?;
    let inputs = cli::inputs(&args.input);
    let request = Request {
        selections: cli::selections(&args.select),
        inputs: inputs.clone(),
    };
    let plan = session.resolver.resolve(&args.tool, &session.env, &request)?;

    let mut gate = TerminalGate::new(args.yes, args.confirm);
    run_plan(ctx, &session, plan, &inputs, &mut gate, args.dry_run, args.jobs)
}
