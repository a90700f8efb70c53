//! Retry/backoff engine
//!
//! Runs a command up to `max_attempts` times. Each attempt is bounded by the
//! policy timeout; between attempts the engine sleeps for the positional
//! backoff delay, reusing the final entry once the schedule runs out. There is
//! no jitter, so the sleep sequence is fully determined by the policy.

use crate::command::{CommandOutput, CommandSpec, Executor, Sleeper};
use crate::config::RetryPolicy;
use crate::error::ExecFailure;
use strum::Display;
use tracing::{debug, error, warn};

/// Why an attempt failed, as far as the log line is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FailureKind {
    #[strum(to_string = "failed")]
    Generic,
    #[strum(to_string = "hit package manager lock contention")]
    LockContention,
    #[strum(to_string = "timed out")]
    TimedOut,
}

/// Classifies a failed attempt from its captured output.
pub type Diagnose = fn(&CommandOutput) -> FailureKind;

/// Diagnosis that only distinguishes timeouts.
pub fn diagnose_generic(output: &CommandOutput) -> FailureKind {
    if output.timed_out {
        FailureKind::TimedOut
    } else {
        FailureKind::Generic
    }
}

/// The WARN line logged after a failed, non-final attempt.
pub fn attempt_warning(
    command: &str,
    attempt: u32,
    max_attempts: u32,
    kind: FailureKind,
    exit_code: i32,
    delay: std::time::Duration,
) -> String {
    let cause = match kind {
        FailureKind::LockContention => {
            " (another process holds the package database lock)".to_string()
        }
        _ => String::new(),
    };
    format!(
        "Attempt {}/{} of `{}` {} with exit code {}{}; retrying in {}s",
        attempt,
        max_attempts,
        command,
        kind,
        exit_code,
        cause,
        delay.as_secs_f64()
    )
}

/// Executes commands under a retry policy.
pub struct RetryEngine<'a> {
    executor: &'a dyn Executor,
    sleeper: &'a dyn Sleeper,
}

impl<'a> RetryEngine<'a> {
    pub fn new(executor: &'a dyn Executor, sleeper: &'a dyn Sleeper) -> Self {
        Self { executor, sleeper }
    }

    /// Run `command` under `policy`.
    ///
    /// Returns the successful attempt's output, or the last attempt's exit
    /// code and output once every attempt has failed.
    pub fn execute(
        &self,
        policy: &RetryPolicy,
        command: &CommandSpec,
        diagnose: Diagnose,
    ) -> Result<CommandOutput, ExecFailure> {
        let rendered = command.display();
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!("Running `{}` (attempt {}/{})", rendered, attempt, max_attempts);
            let output = self.executor.run(command, policy.timeout_per_attempt);
            if output.succeeded() {
                return Ok(output);
            }

            if attempt >= max_attempts {
                error!(
                    "`{}` failed after {} attempt(s) (exit code {})",
                    rendered, attempt, output.exit_code
                );
                return Err(ExecFailure {
                    command: rendered,
                    attempts: attempt,
                    last_code: output.exit_code,
                    timed_out: output.timed_out,
                    stdout: output.stdout,
                    stderr: output.stderr,
                });
            }

            let delay = policy.delay_for(attempt);
            let kind = if output.timed_out {
                FailureKind::TimedOut
            } else {
                diagnose(&output)
            };
            warn!(
                "{}",
                attempt_warning(&rendered, attempt, max_attempts, kind, output.exit_code, delay)
            );
            self.sleeper.sleep(delay);
            attempt += 1;
        }
    }
}
