//! Error handling module for devprov
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Every error carries the process exit code it maps to, so a failing critical
//! step can hand its code straight to `main`.

use thiserror::Error;

/// Exit code reported for an attempt that exceeded its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the program could not be spawned at all.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Exit code for downloaded artifacts that failed validation (EX_DATAERR).
pub const VALIDATION_EXIT_CODE: i32 = 65;

/// Exit code for unusable host environment (EX_CONFIG).
pub const ENVIRONMENT_EXIT_CODE: i32 = 78;

/// Exit code for command line misuse, the same one clap uses.
pub const USAGE_EXIT_CODE: i32 = 2;

/// Final failure of a command after the retry policy is exhausted.
#[derive(Error, Debug, Clone)]
#[error("`{command}` failed after {attempts} attempt(s) (exit code {last_code}{})", timeout_suffix(.timed_out))]
pub struct ExecFailure {
    /// Rendered command line.
    pub command: String,
    /// Number of attempts that were made.
    pub attempts: u32,
    /// Exit code observed on the last attempt.
    pub last_code: i32,
    /// Whether the last attempt was killed for exceeding its timeout.
    pub timed_out: bool,
    /// Captured stdout of the last attempt.
    pub stdout: String,
    /// Captured stderr of the last attempt.
    pub stderr: String,
}

fn timeout_suffix(timed_out: &bool) -> &'static str {
    if *timed_out { ", timed out" } else { "" }
}

/// Main error type for devprov
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// IO errors (file operations, temp files, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid command line arguments
    #[error("Configuration error: {0}")]
    Config(String),

    /// An external command exhausted its retry policy
    #[error("Command failed: {0}")]
    Command(#[from] ExecFailure),

    /// Downloaded artifact is empty, has the wrong architecture or content
    #[error("Validation error: {0}")]
    Validation(String),

    /// Host environment cannot support the operation
    #[error("Environment error: {0}")]
    Environment(String),

    /// JSON deserialization errors (release metadata)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General errors (catch-all for edge cases)
    #[error("{0}")]
    General(String),
}

/// Result type alias for devprov operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

impl ProvisionError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an environment error
    pub fn environment(msg: impl Into<String>) -> Self {
        Self::Environment(msg.into())
    }

    /// Create a general error
    pub fn general(msg: impl Into<String>) -> Self {
        Self::General(msg.into())
    }

    /// Process exit code this error propagates as.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Command(failure) if failure.timed_out => TIMEOUT_EXIT_CODE,
            // A zero code can only come from a misbehaving executor; never report success.
            Self::Command(failure) if failure.last_code == 0 => 1,
            Self::Command(failure) => failure.last_code,
            Self::Validation(_) => VALIDATION_EXIT_CODE,
            Self::Environment(_) => ENVIRONMENT_EXIT_CODE,
            Self::Config(_) => USAGE_EXIT_CODE,
            Self::Io(_) | Self::Json(_) | Self::General(_) => 1,
        }
    }
}
