//! Step progress for plan execution
//!
//! A single bar counts finished steps; each finished step is printed above
//! it with its elapsed time. The bar lives on the scheduling thread, which
//! is where the executor delivers events.

use blueprint::Step;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use planrun::{EventSink, StepOutcome};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::ui;

const LABEL_WIDTH: usize = 48;

/// Progress bar plus a line per finished step
pub struct StepProgress {
    bar: ProgressBar,
    started: BTreeMap<String, Instant>,
    running: Vec<String>,
}

impl StepProgress {
    pub fn new(total: usize, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self {
            bar,
            started: BTreeMap::new(),
            running: Vec::new(),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn refresh_message(&self) {
        let message = match self.running.as_slice() {
            [] => String::new(),
            [only] => only.clone(),
            [first, rest @ ..] => format!("{first} (+{} more)", rest.len()),
        };
        self.bar.set_message(message);
    }
}

impl EventSink for StepProgress {
    fn on_step_start(&mut self, step: &Step) {
        self.started.insert(step.id.clone(), Instant::now());
        self.running.push(ui::truncate(&step.label, LABEL_WIDTH));
        self.refresh_message();
    }

    fn on_step_complete(&mut self, step: &Step, outcome: &StepOutcome) {
        let label = ui::truncate(&step.label, LABEL_WIDTH);
        self.running.retain(|l| *l != label);
        let elapsed = self
            .started
            .remove(&step.id)
            .map(|t| ui::format_elapsed(t.elapsed()))
            .unwrap_or_default();

        let line = match outcome {
            StepOutcome::Succeeded => format!("  {} {label} {}", "✓".green(), elapsed.dimmed()),
            StepOutcome::DryRun => format!("  {} {label} {}", "○".blue(), "(dry run)".dimmed()),
            StepOutcome::Failed { error, .. } => {
                format!("  {} {label}: {}", "✗".red(), error.red())
            }
            StepOutcome::Skipped { reason } => {
                format!("  {} {label} {}", "-".yellow(), format!("({reason})").dimmed())
            }
        };
        self.bar.suspend(|| println!("{line}"));
        self.bar.inc(1);
        self.refresh_message();
    }
}

impl Drop for StepProgress {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
