//! Step registry and orchestrator
//!
//! A run is a fixed, ordered list of named steps. Each step is either
//! critical (its failure ends the run with the step's exit code) or optional
//! (its failure is logged and the run moves on). Steps run strictly one after
//! another; resilience lives inside the steps' command runners, not here.

use crate::error::Result;
use std::collections::HashSet;
use std::fmt;
use strum::Display;
use tracing::{error, info, warn};

/// Whether a failing step ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Criticality {
    #[strum(to_string = "critical")]
    Critical,
    #[strum(to_string = "optional")]
    Optional,
}

/// Work performed by a step. Consumed exactly once.
pub type StepAction<'a> = Box<dyn FnOnce() -> Result<()> + 'a>;

/// One named unit of installation work.
pub struct Step<'a> {
    pub label: String,
    pub criticality: Criticality,
    action: StepAction<'a>,
}

impl<'a> Step<'a> {
    pub fn new(
        label: impl Into<String>,
        criticality: Criticality,
        action: impl FnOnce() -> Result<()> + 'a,
    ) -> Self {
        Self {
            label: label.into(),
            criticality,
            action: Box::new(action),
        }
    }

    pub fn critical(label: impl Into<String>, action: impl FnOnce() -> Result<()> + 'a) -> Self {
        Self::new(label, Criticality::Critical, action)
    }

    pub fn optional(label: impl Into<String>, action: impl FnOnce() -> Result<()> + 'a) -> Self {
        Self::new(label, Criticality::Optional, action)
    }
}

impl fmt::Debug for Step<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("label", &self.label)
            .field("criticality", &self.criticality)
            .finish_non_exhaustive()
    }
}

/// Result of running one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The action succeeded.
    Done,
    /// An optional step failed; the run continues.
    FailedOptional { code: i32 },
    /// A critical step failed; the run must stop with `code`.
    Aborted { code: i32 },
    /// Not executed (skipped on request or dry run).
    Skipped,
}

/// What a whole run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub completed: Vec<String>,
    pub failed_optional: Vec<(String, i32)>,
    pub skipped: Vec<String>,
    /// Label and exit code of the critical step that ended the run.
    pub aborted: Option<(String, i32)>,
}

impl RunReport {
    /// 0 unless a critical step failed.
    pub fn exit_code(&self) -> i32 {
        self.aborted.as_ref().map_or(0, |(_, code)| *code)
    }

    /// Human-readable summary block printed at the end of a run.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str("==================== Provisioning summary ====================\n");
        if self.completed.is_empty() {
            out.push_str("Installed: nothing\n");
        } else {
            out.push_str("Installed:\n");
            for label in &self.completed {
                out.push_str(&format!("  ✓ {}\n", label));
            }
        }
        if !self.failed_optional.is_empty() {
            out.push_str("Failed (optional, run continued):\n");
            for (label, code) in &self.failed_optional {
                out.push_str(&format!("  ✗ {} (exit code {})\n", label, code));
            }
        }
        if !self.skipped.is_empty() {
            out.push_str("Skipped:\n");
            for label in &self.skipped {
                out.push_str(&format!("  - {}\n", label));
            }
        }
        if let Some((label, code)) = &self.aborted {
            out.push_str(&format!("Aborted at critical step: {} (exit code {})\n", label, code));
        }
        out.push_str("===============================================================");
        out
    }
}

/// Runs steps in registration order.
#[derive(Debug, Default)]
pub struct Orchestrator {
    dry_run: bool,
    skip: HashSet<String>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log each step instead of running it.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Labels of optional steps not to run. Critical steps are never skipped.
    pub fn skip<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip.extend(labels.into_iter().map(Into::into));
        self
    }

    /// Run a single step and classify its result. Never panics on failure.
    pub fn run_step(&self, step: Step<'_>) -> StepOutcome {
        let Step {
            label,
            criticality,
            action,
        } = step;

        if self.dry_run {
            info!("[DRY RUN] Would run step: {} ({})", label, criticality);
            return StepOutcome::Skipped;
        }
        if criticality == Criticality::Optional && self.skip.contains(&label) {
            info!("SKIP {} (requested)", label);
            return StepOutcome::Skipped;
        }

        info!("START {} ({})", label, criticality);
        match action() {
            Ok(()) => {
                info!("DONE {}", label);
                StepOutcome::Done
            }
            Err(e) => {
                let code = e.exit_code();
                match criticality {
                    Criticality::Optional => {
                        warn!(
                            "Optional step {} failed (exit code {}): {}; continuing",
                            label, code, e
                        );
                        StepOutcome::FailedOptional { code }
                    }
                    Criticality::Critical => {
                        error!(
                            "Critical step {} failed (exit code {}): {}; aborting run",
                            label, code, e
                        );
                        StepOutcome::Aborted { code }
                    }
                }
            }
        }
    }

    /// Run every step in order, stopping at the first critical failure.
    pub fn run(&self, steps: Vec<Step<'_>>) -> RunReport {
        let mut report = RunReport::default();
        for step in steps {
            let label = step.label.clone();
            match self.run_step(step) {
                StepOutcome::Done => report.completed.push(label),
                StepOutcome::FailedOptional { code } => report.failed_optional.push((label, code)),
                StepOutcome::Skipped => report.skipped.push(label),
                StepOutcome::Aborted { code } => {
                    report.aborted = Some((label, code));
                    break;
                }
            }
        }
        report
    }
}
