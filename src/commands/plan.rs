//! Plan resolution without execution

use anyhow::Result;
use resolver::Request;

use crate::Context;
use crate::cli::{self, PlanArgs};
use crate::commands::{Session, show_plan};
use crate::ui;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let session = Session::open()?;
    let request = Request {
        selections: cli::selections(&args.select),
        inputs: cli::inputs(&args.input),
    };
    let plan = session.resolver.resolve(&args.tool, &session.env, &request)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }
    show_plan(&plan, ctx.verbose > 0);
    if plan.error.is_none() && !plan.already_installed {
        println!();
        ui::kv("Fingerprint", &plan.fingerprint()?);
        if plan.gate.is_required() {
            ui::dim("Installing asks for confirmation first");
        }
    }
    Ok(())
}
