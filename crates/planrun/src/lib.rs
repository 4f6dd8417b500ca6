//! # Planrun
//!
//! Executes resolved plans as a dependency graph.
//!
//! ## Model
//!
//! - Steps become ready when every dependency has completed
//! - Ready steps run on a bounded worker pool, at most one per lock group
//! - A failure skips everything downstream of it; siblings keep running
//! - A completed step that needs a restart pauses the plan
//! - Progress is saved after every tick so [`Executor::resume`] never
//!   re-runs a completed step
//! - Undo plans run completed steps' rollbacks in reverse order
//!
//! Processes, prompts and progress output are supplied by the caller
//! through [`CommandRunner`], [`GateConfirm`] and [`EventSink`].

pub mod context;
pub mod error;
pub mod executor;
pub mod rollback;
pub mod store;
pub mod types;

pub use context::{
    AutoConfirm, AutoDecline, CancelToken, CommandRequest, CommandRunner, EventSink, GateConfirm,
    NoEvents, Secrets,
};
pub use error::{Error, Result};
pub use executor::Executor;
pub use rollback::{UNDO_PREFIX, UndoPlan, undo_plan};
pub use store::{FileStore, MemoryStore, PlanRecord, PlanStatus, StateStore};
pub use types::{
    CommandOutput, Elevation, ExecuteOptions, ExecutionResult, RollbackReport, RunOutcome,
    StepOutcome, Timeouts,
};
