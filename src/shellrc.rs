//! Idempotent shell startup file editing
//!
//! Configuration is appended to files such as `~/.bashrc` inside blocks
//! delimited by marker lines that embed a block id:
//!
//! ```text
//! # devprov START [rust-toolchain]
//! . "$HOME/.cargo/env"
//! # devprov END [rust-toolchain]
//! ```
//!
//! Only the presence of the start marker is checked, so re-running never
//! duplicates a block and never rewrites the body of an existing one. The
//! first mutation of each file in a run is preceded by a timestamped backup.
//!
//! Environment problems (missing or read-only home directory) downgrade to a
//! skipped edit: shell convenience must never block tool installation.

use crate::error::{ProvisionError, Result};
use chrono::Local;
use nix::unistd::{access, AccessFlags};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MARKER_PREFIX: &str = "# devprov";

/// A block of shell configuration identified by `block_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfigBlock {
    pub block_id: String,
    pub content: String,
}

impl ShellConfigBlock {
    pub fn new(block_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            block_id: block_id.into(),
            content: content.into(),
        }
    }

    pub fn start_marker(&self) -> String {
        start_marker(&self.block_id)
    }

    pub fn end_marker(&self) -> String {
        end_marker(&self.block_id)
    }

    /// Text appended to the file, including the surrounding newlines.
    pub fn render(&self) -> String {
        format!(
            "\n{}\n{}\n{}\n",
            self.start_marker(),
            self.content.trim_end_matches('\n'),
            self.end_marker()
        )
    }
}

pub fn start_marker(block_id: &str) -> String {
    format!("{} START [{}]", MARKER_PREFIX, block_id)
}

pub fn end_marker(block_id: &str) -> String {
    format!("{} END [{}]", MARKER_PREFIX, block_id)
}

/// What happened to a block append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    /// The block was written.
    Appended,
    /// A block with this id already exists; the file was not touched.
    AlreadyPresent,
    /// The environment did not allow the edit; the reason was logged.
    Skipped(String),
}

/// Filesystem operations the editor needs beyond reading.
pub trait FileAccess {
    /// Whether the current process may write `path`.
    fn writable(&self, path: &Path) -> bool;
    /// Append `bytes` to `path`, creating it when missing.
    fn append(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()>;
}

/// The real filesystem, with `access(2)` for permission checks.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFiles;

impl FileAccess for HostFiles {
    fn writable(&self, path: &Path) -> bool {
        access(path, AccessFlags::W_OK).is_ok()
    }

    fn append(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(bytes)?;
        file.flush()
    }
}

/// Appends marked blocks and takes one backup per file per run.
#[derive(Debug, Default)]
pub struct ShellRcEditor<F = HostFiles> {
    /// Files already backed up (or created) during this run.
    backed_up: RefCell<HashSet<PathBuf>>,
    /// uid/gid given to files this editor creates.
    owner: Option<(u32, u32)>,
    files: F,
}

impl ShellRcEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand newly created files and backups to `owner` (uid, gid).
    pub fn with_owner(owner: Option<(u32, u32)>) -> Self {
        Self::with_files(HostFiles, owner)
    }
}

impl<F: FileAccess> ShellRcEditor<F> {
    pub fn with_files(files: F, owner: Option<(u32, u32)>) -> Self {
        Self {
            backed_up: RefCell::default(),
            owner,
            files,
        }
    }

    /// Append `block` to `path` unless a block with the same id exists.
    ///
    /// Returns an error only when `path` exists and is not a regular file.
    pub fn append_block_if_missing(&self, path: &Path, block: &ShellConfigBlock) -> Result<BlockOutcome> {
        let existed = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => true,
            Ok(_) => {
                return Err(ProvisionError::environment(format!(
                    "{} exists but is not a regular file",
                    path.display()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                return Ok(self.skip(path, &block.block_id, format!("cannot inspect file: {}", e)));
            }
        };

        if existed {
            if !self.files.writable(path) {
                return Ok(self.skip(path, &block.block_id, "file is not writable".to_string()));
            }
        } else {
            match path.parent() {
                Some(parent) if parent.is_dir() && self.files.writable(parent) => {}
                _ => {
                    return Ok(self.skip(
                        path,
                        &block.block_id,
                        "file is missing and its directory is not writable".to_string(),
                    ));
                }
            }
        }

        // Raw bytes: startup files are not guaranteed to be UTF-8.
        let current = if existed {
            match fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    return Ok(self.skip(path, &block.block_id, format!("cannot read file: {}", e)));
                }
            }
        } else {
            Vec::new()
        };

        if contains_marker(&current, &block.start_marker()) {
            info!(
                "Block [{}] already present in {}, leaving it unchanged",
                block.block_id,
                path.display()
            );
            return Ok(BlockOutcome::AlreadyPresent);
        }

        if existed {
            if let Err(e) = self.backup_once(path) {
                return Ok(self.skip(path, &block.block_id, format!("backup failed: {}", e)));
            }
        } else {
            // Nothing to preserve for a file this run creates.
            self.backed_up.borrow_mut().insert(path.to_path_buf());
        }

        if let Err(e) = self.append(path, &block.render(), !existed) {
            return Ok(self.skip(path, &block.block_id, format!("write failed: {}", e)));
        }

        info!("Added block [{}] to {}", block.block_id, path.display());
        Ok(BlockOutcome::Appended)
    }

    /// Copy `path` to a timestamped sibling, once per file per run.
    ///
    /// Returns the backup path when a copy was made.
    pub fn backup_once(&self, path: &Path) -> std::io::Result<Option<PathBuf>> {
        if self.backed_up.borrow().contains(path) {
            return Ok(None);
        }
        let backup = backup_path(path, &Local::now().format("%Y%m%d%H%M%S").to_string());
        fs::copy(path, &backup)?;
        self.chown(&backup);
        self.backed_up.borrow_mut().insert(path.to_path_buf());
        info!("Backed up {} to {}", path.display(), backup.display());
        Ok(Some(backup))
    }

    fn append(&self, path: &Path, text: &str, created: bool) -> std::io::Result<()> {
        self.files.append(path, text.as_bytes())?;
        if created {
            self.chown(path);
        }
        Ok(())
    }

    fn chown(&self, path: &Path) {
        if let Some((uid, gid)) = self.owner {
            if let Err(e) = std::os::unix::fs::chown(path, Some(uid), Some(gid)) {
                debug!("Could not chown {} to {}:{}: {}", path.display(), uid, gid, e);
            }
        }
    }

    fn skip(&self, path: &Path, block_id: &str, reason: String) -> BlockOutcome {
        warn!(
            "Skipping block [{}] for {}: {}",
            block_id,
            path.display(),
            reason
        );
        BlockOutcome::Skipped(reason)
    }
}

/// `<file>.devprov-backup-<stamp>` next to the original.
pub fn backup_path(path: &Path, stamp: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".devprov-backup-{}", stamp));
    path.with_file_name(name)
}

fn contains_marker(haystack: &[u8], marker: &str) -> bool {
    let marker = marker.as_bytes();
    haystack.windows(marker.len()).any(|window| window == marker)
}
