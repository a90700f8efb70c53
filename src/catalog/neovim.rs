//! Neovim from its latest GitHub release.
//!
//! The release metadata supplies the version tag; the matching Linux tarball
//! is downloaded to a scratch directory, unpacked, architecture-checked and
//! copied under `/opt` with a link in `/usr/local/bin`.

use super::fetch;
use crate::command::CommandSpec;
use crate::context::ProvisionContext;
use crate::error::{ProvisionError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const RELEASE_METADATA_URL: &str = "https://api.github.com/repos/neovim/neovim/releases/latest";
const INSTALL_ROOT: &str = "/opt";
const LINK_PATH: &str = "/usr/local/bin/nvim";

#[derive(Debug, Deserialize)]
struct ReleaseMetadata {
    tag_name: String,
}

/// Extract and validate the version tag from release metadata JSON.
pub fn parse_release_tag(json: &str) -> Result<String> {
    let release: ReleaseMetadata = serde_json::from_str(json)?;
    let tag = release.tag_name.trim().to_string();
    if !fetch::pattern(r"^v\d+\.\d+\.\d+$")?.is_match(&tag) {
        return Err(ProvisionError::validation(format!(
            "unexpected neovim release tag {:?}",
            tag
        )));
    }
    Ok(tag)
}

/// Release asset name for this host (`nvim-linux-x86_64`, `nvim-linux-arm64`).
pub fn asset_stem(arch: &str) -> Option<&'static str> {
    match arch {
        "x86_64" => Some("nvim-linux-x86_64"),
        "aarch64" => Some("nvim-linux-arm64"),
        _ => None,
    }
}

pub fn asset_url(tag: &str, stem: &str) -> String {
    format!(
        "https://github.com/neovim/neovim/releases/download/{}/{}.tar.gz",
        tag, stem
    )
}

pub fn neovim(ctx: &ProvisionContext<'_>) -> Result<()> {
    let stem = asset_stem(std::env::consts::ARCH).ok_or_else(|| {
        ProvisionError::validation(format!(
            "no neovim release for architecture {}",
            std::env::consts::ARCH
        ))
    })?;
    let install_dir = Path::new(INSTALL_ROOT).join(stem);
    if install_dir.join("bin/nvim").exists() && Path::new(LINK_PATH).exists() {
        info!("Neovim already installed at {}", install_dir.display());
        return Ok(());
    }

    let tag = parse_release_tag(&fetch::fetch_text(ctx, RELEASE_METADATA_URL)?)?;
    info!("Latest neovim release: {}", tag);

    let scratch = fetch::scratch_dir(ctx)?;
    let archive = scratch.path().join(format!("{}.tar.gz", stem));
    fetch::download(ctx, &asset_url(&tag, stem), &archive)?;

    ctx.installer(
        &CommandSpec::new("tar")
            .arg("-xzf")
            .arg(archive.to_string_lossy())
            .arg("-C")
            .arg(scratch.path().to_string_lossy()),
    )?;
    let unpacked: PathBuf = scratch.path().join(stem);
    fetch::check_architecture(&unpacked.join("bin/nvim"))?;

    if install_dir.exists() {
        std::fs::remove_dir_all(&install_dir)?;
    }
    ctx.installer(
        &CommandSpec::new("cp")
            .arg("-a")
            .arg(unpacked.to_string_lossy())
            .arg(INSTALL_ROOT),
    )?;

    let link = Path::new(LINK_PATH);
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(link)?;
    }
    std::os::unix::fs::symlink(install_dir.join("bin/nvim"), link)?;
    info!("Installed neovim {} to {}", tag, install_dir.display());
    Ok(())
}
