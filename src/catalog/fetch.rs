//! Downloads and artifact validation.
//!
//! Fetches go through the network runner (curl); what comes back is checked
//! before anything executes it. Validation failures are final: retrying a bad
//! artifact would only burn the retry budget.

use crate::command::CommandSpec;
use crate::context::ProvisionContext;
use crate::error::{ProvisionError, Result};
use regex::Regex;
use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// ELF `e_machine` values for the architectures devprov supports.
pub const EM_X86_64: u16 = 0x3e;
pub const EM_AARCH64: u16 = 0xb7;

fn curl(url: &str) -> CommandSpec {
    CommandSpec::new("curl").args(["--proto", "=https", "--tlsv1.2", "-fsSL", url])
}

/// GET `url` and return the body, which must not be empty.
pub fn fetch_text(ctx: &ProvisionContext<'_>, url: &str) -> Result<String> {
    let output = ctx.network(&curl(url))?;
    if output.stdout.trim().is_empty() {
        return Err(ProvisionError::validation(format!("empty response from {}", url)));
    }
    Ok(output.stdout)
}

/// Download `url` to `dest`, rejecting an empty file.
pub fn download(ctx: &ProvisionContext<'_>, url: &str, dest: &Path) -> Result<()> {
    ctx.network(&curl(url).arg("-o").arg(dest.to_string_lossy()))?;
    let size = fs::metadata(dest).map(|m| m.len()).unwrap_or(0);
    if size == 0 {
        return Err(ProvisionError::validation(format!(
            "downloaded artifact {} is empty",
            url
        )));
    }
    debug!("Downloaded {} ({} bytes)", url, size);
    Ok(())
}

/// Compile a validation pattern.
pub fn pattern(re: &str) -> Result<Regex> {
    Regex::new(re).map_err(|e| ProvisionError::general(format!("bad pattern {}: {}", re, e)))
}

/// Check that a fetched installer script looks like what we asked for.
pub fn validate_script(name: &str, body: &str, pattern: &Regex) -> Result<()> {
    if body.trim().is_empty() {
        return Err(ProvisionError::validation(format!("{} installer is empty", name)));
    }
    if !pattern.is_match(body) {
        return Err(ProvisionError::validation(format!(
            "{} installer does not match expected content /{}/",
            name,
            pattern.as_str()
        )));
    }
    Ok(())
}

/// Scratch directory the target user can read, removed when dropped.
pub fn scratch_dir(ctx: &ProvisionContext<'_>) -> Result<TempDir> {
    let dir = tempfile::Builder::new().prefix("devprov-").tempdir()?;
    if let Some((uid, gid)) = ctx.user.ownership() {
        std::os::unix::fs::chown(dir.path(), Some(uid), Some(gid))?;
    }
    Ok(dir)
}

/// Write a validated script into `dir` so the target user can execute it.
pub fn stage_script(ctx: &ProvisionContext<'_>, dir: &TempDir, name: &str, body: &str) -> Result<PathBuf> {
    let path = dir.path().join(name);
    fs::write(&path, body)?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    if let Some((uid, gid)) = ctx.user.ownership() {
        std::os::unix::fs::chown(&path, Some(uid), Some(gid))?;
    }
    info!("Staged {} installer at {}", name, path.display());
    Ok(path)
}

/// `e_machine` of an ELF image, if `header` is one.
pub fn elf_machine(header: &[u8]) -> Option<u16> {
    if header.len() < 20 || &header[..4] != b"\x7fELF" {
        return None;
    }
    match header[5] {
        1 => Some(u16::from_le_bytes([header[18], header[19]])),
        2 => Some(u16::from_be_bytes([header[18], header[19]])),
        _ => None,
    }
}

/// `e_machine` expected for binaries that run on this host.
pub fn host_elf_machine() -> Option<u16> {
    match std::env::consts::ARCH {
        "x86_64" => Some(EM_X86_64),
        "aarch64" => Some(EM_AARCH64),
        _ => None,
    }
}

/// Fail unless `binary` is an ELF executable for the host architecture.
pub fn check_architecture(binary: &Path) -> Result<()> {
    let mut header = [0u8; 20];
    let read = fs::File::open(binary).and_then(|mut f| f.read(&mut header))?;
    let found = elf_machine(&header[..read]).ok_or_else(|| {
        ProvisionError::validation(format!("{} is not an ELF binary", binary.display()))
    })?;
    let expected = host_elf_machine().ok_or_else(|| {
        ProvisionError::validation(format!(
            "unsupported host architecture {}",
            std::env::consts::ARCH
        ))
    })?;
    if found != expected {
        return Err(ProvisionError::validation(format!(
            "{} targets ELF machine {:#x}, host needs {:#x}",
            binary.display(),
            found,
            expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn elf_header(class_endian: u8, machine: u16) -> Vec<u8> {
        let mut header = vec![0u8; 64];
        header[..4].copy_from_slice(b"\x7fELF");
        header[4] = 2;
        header[5] = class_endian;
        let bytes = if class_endian == 1 {
            machine.to_le_bytes()
        } else {
            machine.to_be_bytes()
        };
        header[18..20].copy_from_slice(&bytes);
        header
    }

    #[test]
    fn test_elf_machine_parses_both_endians() {
        assert_eq!(elf_machine(&elf_header(1, EM_X86_64)), Some(EM_X86_64));
        assert_eq!(elf_machine(&elf_header(2, EM_AARCH64)), Some(EM_AARCH64));
        assert_eq!(elf_machine(b"#!/bin/sh\necho not elf\n"), None);
        assert_eq!(elf_machine(b"\x7fELF"), None);
    }

    #[test]
    fn test_check_architecture_rejects_foreign_binary() {
        let Some(host) = host_elf_machine() else {
            return;
        };
        let foreign = if host == EM_X86_64 { EM_AARCH64 } else { EM_X86_64 };

        let good = NamedTempFile::new().expect("temp file");
        fs::write(good.path(), elf_header(1, host)).expect("write");
        assert!(check_architecture(good.path()).is_ok());

        let bad = NamedTempFile::new().expect("temp file");
        fs::write(bad.path(), elf_header(1, foreign)).expect("write");
        let err = check_architecture(bad.path()).expect_err("foreign arch");
        assert!(matches!(err, ProvisionError::Validation(_)));
    }

    #[test]
    fn test_validate_script() {
        let pattern = Regex::new(r"(?m)^#!/bin/sh").expect("regex");
        assert!(validate_script("rustup", "#!/bin/sh\nmain \"$@\"\n", &pattern).is_ok());

        let err = validate_script("rustup", "<html>rate limited</html>", &pattern).expect_err("html");
        assert!(matches!(err, ProvisionError::Validation(_)));
        assert!(validate_script("rustup", "  \n", &pattern).is_err());
    }
}
