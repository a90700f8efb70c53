//! External command invocation
//!
//! `CommandSpec` describes one external call; an `Executor` performs a single
//! bounded attempt of it and reports the captured output. Retrying is layered
//! on top in `retry`.
//!
//! All commands go through `ProcessExecutor`, which spawns the child in its own
//! process group (see `process_guard`) so a timed-out attempt can be killed
//! together with anything it started.

use crate::error::{SPAWN_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE};
use crate::process_guard::{self, CommandProcessGroup};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};
use tracing::debug;

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long captured output may keep arriving once the attempt is over.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// One external command: program, arguments, extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Run through `sudo -u <user> -H` unless the target is already us.
    ///
    /// Extra environment is forwarded with `env` on the far side of sudo,
    /// since sudo resets the environment.
    pub fn as_user(self, user: &str, current_user_is_target: bool) -> Self {
        if current_user_is_target {
            return self;
        }
        let mut wrapped = CommandSpec::new("sudo").args(["-u", user, "-H", "env"]);
        wrapped.current_dir = self.current_dir;
        for (key, value) in &self.env {
            wrapped.args.push(format!("{}={}", key, value));
        }
        wrapped.args.push(self.program);
        wrapped.args.extend(self.args);
        wrapped
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("'{}'", part)
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a single attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit status; `TIMEOUT_EXIT_CODE` on timeout, `SPAWN_FAILURE_EXIT_CODE`
    /// when the program could not be started, `128 + n` when killed by signal n.
    pub exit_code: i32,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Failed output with the given code and stderr.
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code,
            ..Self::default()
        }
    }

    pub fn timeout() -> Self {
        Self {
            exit_code: TIMEOUT_EXIT_CODE,
            timed_out: true,
            ..Self::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut combined = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        combined.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') && !self.stderr.is_empty() {
            combined.push('\n');
        }
        combined.push_str(&self.stderr);
        combined
    }
}

/// Performs one attempt of a command, bounded by `timeout`.
pub trait Executor {
    fn run(&self, command: &CommandSpec, timeout: Duration) -> CommandOutput;
}

/// Waits between attempts.
pub trait Sleeper {
    fn sleep(&self, delay: Duration);
}

/// Real blocking sleep.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Executes commands as child processes in their own process group.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    kill_grace: Duration,
}

impl ProcessExecutor {
    /// `kill_grace` is the SIGTERM-to-SIGKILL window for timed-out attempts.
    pub fn new(kill_grace: Duration) -> Self {
        Self { kill_grace }
    }
}

impl Executor for ProcessExecutor {
    fn run(&self, spec: &CommandSpec, timeout: Duration) -> CommandOutput {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return CommandOutput::failure(
                    SPAWN_FAILURE_EXIT_CODE,
                    format!("failed to start {}: {}", spec.program, e),
                );
            }
        };

        let pid = child.id();
        process_guard::track(pid);
        debug!("Spawned `{}` as process group {}", spec.display(), pid);

        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        // A timeout too large to represent means the attempt is unbounded.
        let deadline = Instant::now().checked_add(timeout);
        let (exit_code, timed_out) = wait_with_deadline(&mut child, deadline, self.kill_grace);
        // Background processes left in the group would hold our pipes open.
        process_guard::kill_group_remnants(pid);
        process_guard::untrack(pid);

        let drain_deadline = Instant::now() + OUTPUT_DRAIN_GRACE;
        CommandOutput {
            stdout: collect(stdout_reader, drain_deadline),
            stderr: collect(stderr_reader, drain_deadline),
            exit_code,
            timed_out,
        }
    }
}

fn wait_with_deadline(child: &mut Child, deadline: Option<Instant>, kill_grace: Duration) -> (i32, bool) {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return (status_code(status), false),
            Ok(None) if deadline.is_some_and(|d| Instant::now() >= d) => {
                debug!("Process group {} exceeded its deadline, terminating", child.id());
                process_guard::terminate_group(child.id(), kill_grace);
                // Reap so the zombie does not linger; the code is irrelevant now.
                let _ = child.wait();
                return (TIMEOUT_EXIT_CODE, true);
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                debug!("Waiting on process {} failed: {}", child.id(), e);
                let _ = child.kill();
                let _ = child.wait();
                return (SPAWN_FAILURE_EXIT_CODE, false);
            }
        }
    }
}

fn status_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(1)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
        rx
    })
}

/// Take a reader's output, giving up at `deadline`.
///
/// A process that left the group but kept the pipe open would otherwise
/// block the attempt forever; its reader thread is abandoned.
fn collect(reader: Option<Receiver<String>>, deadline: Instant) -> String {
    let Some(rx) = reader else {
        return String::new();
    };
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(text) => text,
        Err(e) => {
            debug!("Output pipe still open after exit, dropping it: {}", e);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").args(["-c", script])
    }

    #[test]
    fn test_display_quotes_whitespace() {
        let spec = CommandSpec::new("bash").args(["-c", "echo hi"]);
        assert_eq!(spec.display(), "bash -c 'echo hi'");
    }

    #[test]
    fn test_as_user_wraps_with_sudo() {
        let spec = CommandSpec::new("sh")
            .arg("/tmp/rustup.sh")
            .env("RUSTUP_INIT_SKIP_PATH_CHECK", "yes")
            .as_user("dev", false);
        assert_eq!(spec.program, "sudo");
        assert_eq!(
            spec.args,
            vec!["-u", "dev", "-H", "env", "RUSTUP_INIT_SKIP_PATH_CHECK=yes", "sh", "/tmp/rustup.sh"]
        );
    }

    #[test]
    fn test_as_user_is_noop_for_current_user() {
        let spec = CommandSpec::new("sh").arg("x");
        assert_eq!(spec.clone().as_user("root", true), spec);
    }

    #[test]
    fn test_combined_output() {
        let output = CommandOutput {
            stdout: "out".to_string(),
            stderr: "err".to_string(),
            exit_code: 1,
            timed_out: false,
        };
        assert_eq!(output.combined(), "out\nerr");
    }

    #[test]
    fn test_process_executor_captures_output_and_code() {
        let executor = ProcessExecutor::new(Duration::from_millis(200));
        let output = executor.run(&sh("echo hello; echo oops >&2; exit 3"), Duration::from_secs(10));
        assert_eq!(output.exit_code, 3);
        assert!(!output.timed_out);
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[test]
    fn test_process_executor_passes_environment() {
        let executor = ProcessExecutor::new(Duration::from_millis(200));
        let output = executor.run(
            &sh("printf %s \"$DEVPROV_TEST_VALUE\"").env("DEVPROV_TEST_VALUE", "42"),
            Duration::from_secs(10),
        );
        assert!(output.succeeded());
        assert_eq!(output.stdout, "42");
    }

    #[test]
    fn test_process_executor_times_out() {
        let executor = ProcessExecutor::new(Duration::from_millis(200));
        let started = Instant::now();
        let output = executor.run(&sh("sleep 30"), Duration::from_millis(300));
        assert!(output.timed_out);
        assert_eq!(output.exit_code, TIMEOUT_EXIT_CODE);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_unrepresentable_timeout_means_no_deadline() {
        let executor = ProcessExecutor::new(Duration::from_millis(200));
        let output = executor.run(&sh("exit 0"), Duration::from_secs(u64::MAX));
        assert!(output.succeeded());
        assert!(!output.timed_out);
    }

    #[test]
    fn test_process_executor_reports_spawn_failure() {
        let executor = ProcessExecutor::new(Duration::from_millis(200));
        let output = executor.run(
            &CommandSpec::new("devprov-no-such-program-12345"),
            Duration::from_secs(1),
        );
        assert_eq!(output.exit_code, SPAWN_FAILURE_EXIT_CODE);
        assert!(!output.succeeded());
    }
}
