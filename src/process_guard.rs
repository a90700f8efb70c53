//! Process lifecycle management for child processes
//!
//! Every external command runs in its own process group so that a hung
//! installer can be killed together with everything it spawned. Running
//! groups are tracked in a registry; a termination signal to devprov
//! tears all of them down before the process exits.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static CHILD_REGISTRY: OnceLock<Mutex<ChildRegistry>> = OnceLock::new();

/// Grace period given to children when devprov itself is interrupted.
const SIGNAL_CLEANUP_GRACE: Duration = Duration::from_secs(3);

/// Registry of process groups currently running.
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
}

impl ChildRegistry {
    /// The registry shared by the executor and the signal handler.
    pub fn global() -> &'static Mutex<ChildRegistry> {
        CHILD_REGISTRY.get_or_init(|| Mutex::new(ChildRegistry::default()))
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        debug!("Registered child process group {}", pid);
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        debug!("Unregistered child process group {}", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Terminate every tracked group: SIGTERM, wait up to `grace`, then SIGKILL.
    pub fn terminate_all(&mut self, grace: Duration) {
        if self.pids.is_empty() {
            return;
        }
        info!("Terminating {} child process group(s)", self.pids.len());
        for pid in self.pids.drain() {
            terminate_group(pid, grace);
        }
    }
}

/// Register a spawned child in the global registry.
pub fn track(pid: u32) {
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.register(pid);
    }
}

/// Remove a finished child from the global registry.
pub fn untrack(pid: u32) {
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.unregister(pid);
    }
}

/// Forcibly stop the process group led by `pgid`.
///
/// Sends SIGTERM to the group, polls until `grace` elapses, then SIGKILLs
/// whatever is left.
pub fn terminate_group(pgid: u32, grace: Duration) {
    if let Err(e) = send_signal_to_group(pgid, Signal::SIGTERM) {
        debug!("SIGTERM to process group {} failed: {}", pgid, e);
        if let Err(e) = send_signal(pgid, Signal::SIGTERM) {
            debug!("SIGTERM to PID {} failed: {}", pgid, e);
            return;
        }
    }

    let start = Instant::now();
    while start.elapsed() < grace {
        if !is_process_alive(pgid) {
            debug!("Process group {} exited after SIGTERM", pgid);
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    if is_process_alive(pgid) {
        warn!("Process group {} ignored SIGTERM, sending SIGKILL", pgid);
        if send_signal_to_group(pgid, Signal::SIGKILL).is_err() {
            let _ = send_signal(pgid, Signal::SIGKILL);
        }
    }
}

/// SIGKILL whatever is left in the group once its leader has exited.
///
/// ESRCH means the group is already empty and is not an error.
pub fn kill_group_remnants(pgid: u32) {
    match send_signal_to_group(pgid, Signal::SIGKILL) {
        Ok(()) => debug!("Killed leftover processes in group {}", pgid),
        Err(nix::Error::ESRCH) => {}
        Err(e) => debug!("SIGKILL to process group {} failed: {}", pgid, e),
    }
}

fn send_signal(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), signal)
}

/// Negative PID addresses the whole group.
fn send_signal_to_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

/// Alive means it exists and is neither a zombie nor dead.
pub(crate) fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // The command name field is parenthesised and may contain spaces.
        if let Some(state) = stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
        {
            return !matches!(state, "Z" | "X");
        }
    }

    true
}

/// Install handlers for SIGINT, SIGTERM and SIGHUP.
///
/// On delivery every tracked child group is terminated and the process exits
/// with `128 + signal`.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            let signal_name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "UNKNOWN",
            };
            warn!("Received {}, stopping running commands", signal_name);

            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(SIGNAL_CLEANUP_GRACE);
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Run the child as leader of a new process group that dies with devprov.
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: only async-signal-safe calls (setpgid, prctl) run between fork and exec.
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;

                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }
}
