//! Per-user language toolchains installed from third-party shell installers.
//!
//! Both installers are fetched with the network runner, validated, staged in
//! a scratch directory and executed as the target user with the installer
//! runner. The scratch directory is removed on every exit path.

use super::fetch;
use crate::command::CommandSpec;
use crate::context::ProvisionContext;
use crate::error::Result;
use crate::shellrc::ShellConfigBlock;
use tracing::info;

pub const RUSTUP_URL: &str = "https://sh.rustup.rs";
pub const NVM_VERSION: &str = "v0.40.1";

pub fn nvm_install_url() -> String {
    format!(
        "https://raw.githubusercontent.com/nvm-sh/nvm/{}/install.sh",
        NVM_VERSION
    )
}

pub const CARGO_ENV_BLOCK: &str = r#". "$HOME/.cargo/env""#;

pub const NVM_BLOCK: &str = r#"export NVM_DIR="$HOME/.nvm"
[ -s "$NVM_DIR/nvm.sh" ] && \. "$NVM_DIR/nvm.sh"
[ -s "$NVM_DIR/bash_completion" ] && \. "$NVM_DIR/bash_completion""#;

pub fn rust_toolchain(ctx: &ProvisionContext<'_>) -> Result<()> {
    let rustup = ctx.user.home.join(".cargo/bin/rustup");
    if rustup.exists() {
        info!("rustup already installed at {}", rustup.display());
    } else {
        let body = fetch::fetch_text(ctx, RUSTUP_URL)?;
        fetch::validate_script("rustup", &body, &fetch::pattern(r"(?m)^#!/bin/sh[\s\S]*rustup")?)?;

        let scratch = fetch::scratch_dir(ctx)?;
        let script = fetch::stage_script(ctx, &scratch, "rustup-init.sh", &body)?;
        let install = CommandSpec::new("sh")
            .arg(script.to_string_lossy())
            .args(["-y", "--no-modify-path", "--profile", "default"])
            .env("RUSTUP_INIT_SKIP_PATH_CHECK", "yes");
        ctx.installer(&ctx.as_user(install))?;
    }

    ctx.add_to_bashrc(&ShellConfigBlock::new("rust-toolchain", CARGO_ENV_BLOCK))?;
    Ok(())
}

pub fn node_via_nvm(ctx: &ProvisionContext<'_>) -> Result<()> {
    let nvm_sh = ctx.user.home.join(".nvm/nvm.sh");
    if nvm_sh.exists() {
        info!("nvm already installed at {}", nvm_sh.display());
    } else {
        let url = nvm_install_url();
        let body = fetch::fetch_text(ctx, &url)?;
        fetch::validate_script("nvm", &body, &fetch::pattern(r"nvm_do_install")?)?;

        let scratch = fetch::scratch_dir(ctx)?;
        let script = fetch::stage_script(ctx, &scratch, "nvm-install.sh", &body)?;
        // PROFILE=/dev/null keeps the installer away from .bashrc; devprov owns that edit.
        let install = CommandSpec::new("bash")
            .arg(script.to_string_lossy())
            .env("PROFILE", "/dev/null");
        ctx.installer(&ctx.as_user(install))?;
    }

    ctx.add_to_bashrc(&ShellConfigBlock::new("nvm", NVM_BLOCK))?;

    let lts = CommandSpec::new("bash").args([
        "-c",
        r#". "$HOME/.nvm/nvm.sh" && nvm install --lts && nvm alias default 'lts/*'"#,
    ]);
    ctx.installer(&ctx.as_user(lts))?;
    Ok(())
}
