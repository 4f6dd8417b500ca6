//! Uninstall and update

use anyhow::Result;
use std::collections::BTreeMap;

use crate::Context;
use crate::cli::LifecycleArgs;
use crate::commands::{Session, run_plan};
use crate::prompt::TerminalGate;

pub fn uninstall(ctx: &Context, args: LifecycleArgs) -> Result<()> {
    let session = Session::open()?;
    let plan = session.resolver.uninstall(&args.tool, &session.env)?;
    let mut gate = TerminalGate::new(args.yes, None);
    run_plan(ctx, &session, plan, &BTreeMap::new(), &mut gate, args.dry_run, None)
}

pub fn update(ctx: &Context, args: LifecycleArgs) -> Result<()> {
    let session = Session::open()?;
    let plan = session.resolver.update(&args.tool, &session.env)?;
    let mut gate = TerminalGate::new(args.yes, None);
    run_plan(ctx, &session, plan, &BTreeMap::new(), &mut gate, args.dry_run, None)
}
