//! devprov library
//!
//! Provisions a Debian/Ubuntu development workstation from a fixed catalog
//! of steps. Every external command goes through a retrying runner for its
//! class, and shell startup files are edited idempotently.

pub mod catalog;
pub mod cli;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod process_guard;
pub mod retry;
pub mod runners;
pub mod sanity;
pub mod shellrc;
pub mod step;
pub mod user_context;

// Re-export main types for convenience
pub use command::{CommandOutput, CommandSpec, Executor, ProcessExecutor, Sleeper, ThreadSleeper};
pub use config::{CommandClass, RetryPolicy, Settings};
pub use context::ProvisionContext;
pub use error::{ExecFailure, ProvisionError};
pub use process_guard::{ChildRegistry, CommandProcessGroup};
pub use retry::{FailureKind, RetryEngine};
pub use runners::Runners;
pub use shellrc::{BlockOutcome, ShellConfigBlock, ShellRcEditor};
pub use step::{Criticality, Orchestrator, RunReport, Step, StepOutcome};
pub use user_context::{AccountLookup, UserContext};
