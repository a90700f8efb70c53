//! Command-class runners
//!
//! Thin call sites over the retry engine, one per class of external command.
//! They differ only in which policy they bind, except that package-manager
//! failures are checked for lock contention so operators can tell a busy
//! dpkg lock from a real package error.

use crate::command::{CommandOutput, CommandSpec, Executor, Sleeper};
use crate::config::{CommandClass, Settings};
use crate::error::ExecFailure;
use crate::retry::{diagnose_generic, Diagnose, FailureKind, RetryEngine};

/// Output fragments apt and dpkg print when another process holds their lock.
const LOCK_CONTENTION_MARKERS: &[&str] = &[
    "Could not get lock",
    "Unable to acquire the dpkg frontend lock",
    "Unable to lock directory",
    "is another process using it?",
];

/// Whether captured output shows package database lock contention.
pub fn detect_lock_contention(text: &str) -> bool {
    LOCK_CONTENTION_MARKERS
        .iter()
        .any(|marker| text.contains(marker))
}

/// Diagnosis used for package-manager calls.
pub fn diagnose_package(output: &CommandOutput) -> FailureKind {
    if output.timed_out {
        FailureKind::TimedOut
    } else if detect_lock_contention(&output.combined()) {
        FailureKind::LockContention
    } else {
        FailureKind::Generic
    }
}

/// The three runners, bound to the run's settings.
pub struct Runners<'a> {
    settings: &'a Settings,
    engine: RetryEngine<'a>,
}

impl<'a> Runners<'a> {
    pub fn new(settings: &'a Settings, executor: &'a dyn Executor, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            settings,
            engine: RetryEngine::new(executor, sleeper),
        }
    }

    /// Raw network fetches (release metadata, installer scripts, archives).
    pub fn network(&self, command: &CommandSpec) -> Result<CommandOutput, ExecFailure> {
        self.run(CommandClass::Network, command)
    }

    /// Package-manager invocations.
    pub fn package(&self, command: &CommandSpec) -> Result<CommandOutput, ExecFailure> {
        self.run(CommandClass::Package, command)
    }

    /// Fetched install scripts and long-running toolchain installers.
    pub fn installer(&self, command: &CommandSpec) -> Result<CommandOutput, ExecFailure> {
        self.run(CommandClass::Installer, command)
    }

    pub fn run(&self, class: CommandClass, command: &CommandSpec) -> Result<CommandOutput, ExecFailure> {
        let diagnose: Diagnose = match class {
            CommandClass::Package => diagnose_package,
            CommandClass::Network | CommandClass::Installer => diagnose_generic,
        };
        self.engine
            .execute(self.settings.policy(class), command, diagnose)
            .inspect_err(|failure| forward_output(class, failure))
    }
}

/// Show the last attempt's output so the real error is visible.
fn forward_output(class: CommandClass, failure: &ExecFailure) {
    if failure.stdout.trim().is_empty() && failure.stderr.trim().is_empty() {
        return;
    }
    eprintln!("--- Output of last {} attempt: {} ---", class, failure.command);
    if !failure.stdout.trim().is_empty() {
        eprintln!("{}", failure.stdout.trim_end());
    }
    if !failure.stderr.trim().is_empty() {
        eprintln!("{}", failure.stderr.trim_end());
    }
    eprintln!("--- End of output ---");
}
