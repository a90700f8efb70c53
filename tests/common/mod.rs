//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use devprov::command::{CommandOutput, CommandSpec, Executor, Sleeper};
use devprov::user_context::UserContext;
use std::cell::RefCell;
use std::path::Path;
use std::time::Duration;

/// Executor answering every command through a closure, recording what ran.
pub struct FakeExecutor<F: Fn(&CommandSpec) -> CommandOutput> {
    respond: F,
    pub calls: RefCell<Vec<String>>,
}

impl<F: Fn(&CommandSpec) -> CommandOutput> FakeExecutor<F> {
    pub fn new(respond: F) -> Self {
        Self {
            respond,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl<F: Fn(&CommandSpec) -> CommandOutput> Executor for FakeExecutor<F> {
    fn run(&self, command: &CommandSpec, _timeout: Duration) -> CommandOutput {
        self.calls.borrow_mut().push(command.display());
        (self.respond)(command)
    }
}

/// Executor replaying a fixed sequence of exit codes (0 = success).
pub struct SequenceExecutor {
    codes: RefCell<std::vec::IntoIter<i32>>,
    pub attempts: RefCell<u32>,
}

impl SequenceExecutor {
    pub fn new(codes: Vec<i32>) -> Self {
        Self {
            codes: RefCell::new(codes.into_iter()),
            attempts: RefCell::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        *self.attempts.borrow()
    }
}

impl Executor for SequenceExecutor {
    fn run(&self, _command: &CommandSpec, _timeout: Duration) -> CommandOutput {
        *self.attempts.borrow_mut() += 1;
        match self.codes.borrow_mut().next() {
            Some(0) => CommandOutput::success("ok"),
            Some(code) => CommandOutput::failure(code, "failed"),
            None => CommandOutput::failure(1, "script exhausted"),
        }
    }
}

/// Sleeper that records requested delays instead of waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    pub delays: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration) {
        self.delays.borrow_mut().push(delay);
    }
}

/// A non-root target user living in `home`, without ownership changes.
pub fn test_user(home: &Path) -> UserContext {
    UserContext {
        username: "dev".to_string(),
        home: home.to_path_buf(),
        resolved: true,
        uid: None,
        gid: None,
    }
}
