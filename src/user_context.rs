//! Target user resolution
//!
//! devprov usually runs under sudo, yet the tools it sets up belong to the
//! person who invoked it. The resolver picks that user and their home
//! directory once at startup; every step reads the result.

use crate::error::{ProvisionError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// An account record as far as provisioning cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub home: PathBuf,
    pub uid: u32,
    pub gid: u32,
}

/// Source of system account records.
pub trait AccountLookup {
    fn lookup(&self, name: &str) -> Option<Account>;
}

/// Account lookup backed by the passwd database.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAccounts;

impl AccountLookup for SystemAccounts {
    fn lookup(&self, name: &str) -> Option<Account> {
        match nix::unistd::User::from_name(name) {
            Ok(Some(user)) => Some(Account {
                name: user.name,
                home: user.dir,
                uid: user.uid.as_raw(),
                gid: user.gid.as_raw(),
            }),
            Ok(None) => None,
            Err(e) => {
                debug!("Account lookup for {} failed: {}", name, e);
                None
            }
        }
    }
}

/// The user whose environment gets configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub username: String,
    pub home: PathBuf,
    /// False when derived from environment variables instead of an account record.
    pub resolved: bool,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl UserContext {
    pub fn is_root(&self) -> bool {
        self.username == "root" || self.uid == Some(0)
    }

    /// The user's bash startup file.
    pub fn bashrc(&self) -> PathBuf {
        self.home.join(".bashrc")
    }

    /// Owner to hand created files to, when it is somebody other than root.
    pub fn ownership(&self) -> Option<(u32, u32)> {
        match (self.uid, self.gid) {
            (Some(uid), Some(gid)) if uid != 0 => Some((uid, gid)),
            _ => None,
        }
    }
}

/// Resolve the target user from the process environment.
pub fn resolve() -> Result<UserContext> {
    resolve_with(&SystemAccounts, |key| std::env::var(key).ok(), Path::is_dir)
}

/// Resolve the target user.
///
/// Candidates in order: `SUDO_USER`, the session user (`USER`, then
/// `LOGNAME`), then `root`. The first candidate with an account record whose
/// home directory exists wins. Otherwise `USER`/`HOME` from the environment
/// are used and the context is marked unresolved.
pub fn resolve_with(
    accounts: &dyn AccountLookup,
    env: impl Fn(&str) -> Option<String>,
    home_exists: impl Fn(&Path) -> bool,
) -> Result<UserContext> {
    let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    let mut candidates: Vec<String> = Vec::new();
    for candidate in [
        non_empty("SUDO_USER"),
        non_empty("USER").or_else(|| non_empty("LOGNAME")),
        Some("root".to_string()),
    ]
    .into_iter()
    .flatten()
    {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }

    for candidate in &candidates {
        match accounts.lookup(candidate) {
            Some(account) if home_exists(&account.home) => {
                info!(
                    "Target user: {} (home {})",
                    account.name,
                    account.home.display()
                );
                return Ok(UserContext {
                    username: account.name,
                    home: account.home,
                    resolved: true,
                    uid: Some(account.uid),
                    gid: Some(account.gid),
                });
            }
            Some(account) => debug!(
                "Skipping {}: home {} does not exist",
                candidate,
                account.home.display()
            ),
            None => debug!("Skipping {}: no account record", candidate),
        }
    }

    let home = non_empty("HOME").ok_or_else(|| {
        ProvisionError::environment("no usable account record and HOME is not set")
    })?;
    let username = non_empty("USER")
        .or_else(|| non_empty("LOGNAME"))
        .unwrap_or_else(|| "root".to_string());

    warn!(
        "Could not resolve a user account (tried {}); falling back to {} with home {}",
        candidates.join(", "),
        username,
        home
    );
    Ok(UserContext {
        username,
        home: PathBuf::from(home),
        resolved: false,
        uid: None,
        gid: None,
    })
}
