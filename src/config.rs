//! Configuration management module
//!
//! Builds the three retry policies and the run-wide knobs from environment
//! variables. Everything is resolved once at startup and read-only afterward.

use std::time::Duration;
use strum::Display;
use tracing::warn;

/// Prefix shared by every environment variable devprov reads.
pub const ENV_PREFIX: &str = "DEVPROV";

/// Retry behaviour for one class of external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Upper bound on a single attempt.
    pub timeout_per_attempt: Duration,
    /// Delays between attempts, read positionally. The last entry repeats.
    pub backoff_schedule: Vec<Duration>,
}

impl RetryPolicy {
    /// Create a policy from whole seconds.
    pub fn from_secs(max_attempts: u32, timeout_secs: u64, backoff_secs: &[u64]) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            timeout_per_attempt: Duration::from_secs(timeout_secs),
            backoff_schedule: backoff_secs.iter().copied().map(Duration::from_secs).collect(),
        }
    }

    /// Delay to sleep after failed attempt `attempt` (1-based).
    ///
    /// Reads `backoff_schedule[attempt - 1]`, clamped to the final entry.
    /// An empty schedule means no delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let Some(last) = self.backoff_schedule.len().checked_sub(1) else {
            return Duration::ZERO;
        };
        let index = (attempt.saturating_sub(1) as usize).min(last);
        self.backoff_schedule[index]
    }
}

/// The three command classes that get independent policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum CommandClass {
    #[strum(to_string = "network")]
    Network,
    #[strum(to_string = "package")]
    Package,
    #[strum(to_string = "installer")]
    Installer,
}

impl CommandClass {
    /// Short tag used in environment variable names (`DEVPROV_<TAG>_ATTEMPTS`).
    pub fn env_tag(self) -> &'static str {
        match self {
            CommandClass::Network => "NET",
            CommandClass::Package => "PKG",
            CommandClass::Installer => "INSTALLER",
        }
    }

    /// Built-in policy used when nothing is configured.
    pub fn default_policy(self) -> RetryPolicy {
        match self {
            CommandClass::Network => RetryPolicy::from_secs(3, 60, &[5, 15, 30]),
            CommandClass::Package => RetryPolicy::from_secs(5, 900, &[10, 30, 60]),
            CommandClass::Installer => RetryPolicy::from_secs(3, 1800, &[15, 45, 90]),
        }
    }
}

/// Process-wide settings, constructed once and passed by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub network: RetryPolicy,
    pub package: RetryPolicy,
    pub installer: RetryPolicy,
    /// Time a timed-out process group gets between SIGTERM and SIGKILL.
    pub kill_grace: Duration,
    /// Skip the root requirement in pre-flight checks.
    pub skip_root_check: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            network: CommandClass::Network.default_policy(),
            package: CommandClass::Package.default_policy(),
            installer: CommandClass::Installer.default_policy(),
            kill_grace: Duration::from_secs(5),
            skip_root_check: false,
        }
    }
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    ///
    /// Invalid values are reported and replaced by the default for that knob only.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let kill_grace = read_u64(&lookup, &format!("{ENV_PREFIX}_KILL_GRACE"))
            .map(Duration::from_secs)
            .unwrap_or(defaults.kill_grace);
        let skip_root_check = lookup(&format!("{ENV_PREFIX}_SKIP_ROOT_CHECK"))
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            network: policy_from_lookup(&lookup, CommandClass::Network),
            package: policy_from_lookup(&lookup, CommandClass::Package),
            installer: policy_from_lookup(&lookup, CommandClass::Installer),
            kill_grace,
            skip_root_check,
        }
    }

    /// Policy bound to a command class.
    pub fn policy(&self, class: CommandClass) -> &RetryPolicy {
        match class {
            CommandClass::Network => &self.network,
            CommandClass::Package => &self.package,
            CommandClass::Installer => &self.installer,
        }
    }
}

fn policy_from_lookup(lookup: &impl Fn(&str) -> Option<String>, class: CommandClass) -> RetryPolicy {
    let defaults = class.default_policy();
    let tag = class.env_tag();

    let max_attempts = read_u64(lookup, &format!("{ENV_PREFIX}_{tag}_ATTEMPTS"))
        .and_then(|n| {
            let attempts = u32::try_from(n).ok().filter(|n| *n >= 1);
            if attempts.is_none() {
                warn!("{ENV_PREFIX}_{tag}_ATTEMPTS must be a positive integer, using default");
            }
            attempts
        })
        .unwrap_or(defaults.max_attempts);

    let timeout_per_attempt = read_u64(lookup, &format!("{ENV_PREFIX}_{tag}_TIMEOUT"))
        .and_then(|secs| {
            if secs == 0 {
                warn!("{ENV_PREFIX}_{tag}_TIMEOUT must be at least 1 second, using default");
                return None;
            }
            Some(Duration::from_secs(secs))
        })
        .unwrap_or(defaults.timeout_per_attempt);

    let backoff_key = format!("{ENV_PREFIX}_{tag}_BACKOFF");
    let backoff_schedule = match lookup(&backoff_key) {
        Some(raw) => match parse_backoff_schedule(&raw) {
            Ok(schedule) => schedule,
            Err(reason) => {
                warn!("Ignoring {}={:?}: {}", backoff_key, raw, reason);
                defaults.backoff_schedule
            }
        },
        None => defaults.backoff_schedule,
    };

    RetryPolicy {
        max_attempts,
        timeout_per_attempt,
        backoff_schedule,
    }
}

fn read_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a non-negative integer", key, raw);
            None
        }
    }
}

/// Parse a comma-separated list of whole seconds, e.g. `"5,15,30"`.
pub fn parse_backoff_schedule(raw: &str) -> Result<Vec<Duration>, String> {
    let schedule = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| format!("'{}' is not a number of seconds", part))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if schedule.is_empty() {
        return Err("schedule is empty".to_string());
    }
    Ok(schedule)
}
