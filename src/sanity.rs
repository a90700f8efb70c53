//! Pre-flight sanity checks for the host
//!
//! Verified before any step runs:
//! - running with root privileges (EUID 0), unless explicitly skipped
//! - the binaries every step relies on are on `PATH`
//!
//! A failed check prints a report and ends the process before anything is
//! installed.

/// Result of environment verification
#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub is_root: bool,
}

impl SanityCheckResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && self.is_root
    }
}

/// Binaries that must exist before the first step.
const REQUIRED_BINARIES: &[&str] = &[
    "bash",    // Installer scripts
    "curl",    // Release metadata, archives, installer scripts
    "apt-get", // Host package manager
    "tar",     // Release archives
];

/// Binaries only some optional steps use.
const OPTIONAL_BINARIES: &[&str] = &[
    "sudo",      // Running per-user installers as the target user
    "systemctl", // Enabling the container runtime
];

/// Check if a binary is available in `PATH`
pub fn binary_exists(name: &str) -> bool {
    binary_exists_in(name, std::env::var_os("PATH").as_deref())
}

fn binary_exists_in(name: &str, path: Option<&std::ffi::OsStr>) -> bool {
    use std::os::unix::fs::PermissionsExt;

    let Some(path) = path else {
        return false;
    };
    std::env::split_paths(path).any(|dir| {
        std::fs::metadata(dir.join(name))
            .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    })
}

/// Check if running as root (EUID 0)
pub fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Perform all sanity checks and return the result
pub fn verify_environment(skip_root: bool) -> SanityCheckResult {
    let missing = REQUIRED_BINARIES
        .iter()
        .filter(|binary| !binary_exists(binary))
        .map(|binary| (*binary).to_string())
        .collect();

    for binary in OPTIONAL_BINARIES {
        if !binary_exists(binary) {
            tracing::warn!("Optional binary not found: {} (some steps may fail)", binary);
        }
    }

    if skip_root {
        tracing::warn!("Root check skipped (DEVPROV_SKIP_ROOT_CHECK / --skip-root-check)");
    }

    SanityCheckResult {
        missing_binaries: missing,
        is_root: skip_root || is_running_as_root(),
    }
}

/// Human-readable pre-flight failure report.
pub fn failure_report(result: &SanityCheckResult) -> String {
    let mut out = String::new();
    out.push_str("devprov pre-flight check failed\n\n");

    if !result.is_root {
        out.push_str("ERROR: root privileges required\n");
        out.push_str("   Installing packages needs root. Run with sudo:\n");
        out.push_str("     sudo -E devprov\n\n");
    }

    if !result.missing_binaries.is_empty() {
        out.push_str("ERROR: missing required binaries\n");
        for binary in &result.missing_binaries {
            out.push_str(&format!("   • {} (install: apt-get install {})\n", binary, package_for_binary(binary)));
        }
        out.push('\n');
    }

    out.push_str("Fix the above issues and try again.");
    out
}

/// Map binary names to their Debian package names
fn package_for_binary(binary: &str) -> &'static str {
    match binary {
        "bash" => "bash",
        "curl" => "curl",
        "apt-get" => "apt",
        "tar" => "tar",
        "sudo" => "sudo",
        "systemctl" => "systemd",
        _ => "unknown",
    }
}

/// Verify the environment and exit with code 1 if it is unusable.
pub fn run_preflight_checks(skip_root: bool) {
    tracing::debug!("Running pre-flight sanity checks (skip_root={})", skip_root);

    let result = verify_environment(skip_root);
    if !result.is_ok() {
        tracing::error!("Pre-flight checks failed");
        eprintln!("{}", failure_report(&result));
        std::process::exit(1);
    }

    tracing::info!("Pre-flight checks passed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_exists_sh() {
        assert!(binary_exists("sh"), "sh should be available");
    }

    #[test]
    fn test_binary_exists_nonexistent() {
        assert!(!binary_exists("this_binary_definitely_does_not_exist_12345"));
    }

    #[test]
    fn test_binary_lookup_without_path() {
        assert!(!binary_exists_in("sh", None));
    }

    #[test]
    fn test_binary_lookup_requires_executable_file() {
        use std::os::unix::fs::PermissionsExt;

        let first = tempfile::tempdir().expect("tempdir");
        let second = tempfile::tempdir().expect("tempdir");
        let tool = second.path().join("devprov-tool");
        std::fs::write(&tool, "#!/bin/sh\n").expect("write tool");
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        let data = second.path().join("devprov-data");
        std::fs::write(&data, "not a program").expect("write data");
        std::fs::set_permissions(&data, std::fs::Permissions::from_mode(0o644)).expect("chmod");
        std::fs::create_dir(first.path().join("devprov-dir")).expect("mkdir");

        let path = std::env::join_paths([first.path(), second.path()]).expect("join PATH");
        assert!(binary_exists_in("devprov-tool", Some(path.as_os_str())));
        assert!(!binary_exists_in("devprov-data", Some(path.as_os_str())));
        assert!(!binary_exists_in("devprov-dir", Some(path.as_os_str())));
        assert!(!binary_exists_in("devprov-missing", Some(path.as_os_str())));
    }

    #[test]
    fn test_package_mapping() {
        assert_eq!(package_for_binary("apt-get"), "apt");
        assert_eq!(package_for_binary("systemctl"), "systemd");
    }

    #[test]
    fn test_sanity_result_is_ok() {
        let ok_result = SanityCheckResult {
            missing_binaries: vec![],
            is_root: true,
        };
        assert!(ok_result.is_ok());

        let missing_binary = SanityCheckResult {
            missing_binaries: vec!["curl".to_string()],
            is_root: true,
        };
        assert!(!missing_binary.is_ok());
        assert!(failure_report(&missing_binary).contains("curl (install: apt-get install curl)"));

        let not_root = SanityCheckResult {
            missing_binaries: vec![],
            is_root: false,
        };
        assert!(!not_root.is_ok());
        assert!(failure_report(&not_root).contains("root privileges required"));
    }
}
