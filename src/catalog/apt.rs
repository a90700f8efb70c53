//! Host package manager steps (apt on Debian/Ubuntu).

use crate::command::CommandSpec;
use crate::context::ProvisionContext;
use crate::error::Result;
use crate::shellrc::ShellConfigBlock;
use tracing::info;

pub const BASE_PACKAGES: &[&str] = &[
    "build-essential",
    "curl",
    "wget",
    "git",
    "unzip",
    "ca-certificates",
    "jq",
    "pkg-config",
    "libssl-dev",
];

pub const PYTHON_PACKAGES: &[&str] = &["python3", "python3-pip", "python3-venv", "pipx"];

/// `apt-get` with a non-interactive frontend.
pub fn apt_get<I, S>(args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new("apt-get")
        .env("DEBIAN_FRONTEND", "noninteractive")
        .args(args)
}

/// Install command for `packages`.
pub fn install_command(packages: &[&str]) -> CommandSpec {
    apt_get(["install", "-y", "--no-install-recommends"]).args(packages.iter().copied())
}

pub fn refresh_index(ctx: &ProvisionContext<'_>) -> Result<()> {
    ctx.package(&apt_get(["update"]))?;
    Ok(())
}

pub fn base_build_tools(ctx: &ProvisionContext<'_>) -> Result<()> {
    ctx.package(&install_command(BASE_PACKAGES))?;
    Ok(())
}

pub fn python_tooling(ctx: &ProvisionContext<'_>) -> Result<()> {
    ctx.package(&install_command(PYTHON_PACKAGES))?;
    // pipx installs into ~/.local/bin, which stock profiles do not always add.
    ctx.add_to_bashrc(&ShellConfigBlock::new(
        "local-bin-path",
        r#"case ":$PATH:" in *":$HOME/.local/bin:"*) ;; *) export PATH="$HOME/.local/bin:$PATH" ;; esac"#,
    ))?;
    Ok(())
}

pub fn github_cli(ctx: &ProvisionContext<'_>) -> Result<()> {
    ctx.package(&install_command(&["gh"]))?;
    Ok(())
}

/// Docker engine from the distribution archive, enabled and usable without sudo.
pub fn container_runtime(ctx: &ProvisionContext<'_>) -> Result<()> {
    ctx.package(&install_command(&["docker.io"]))?;
    ctx.package(&CommandSpec::new("systemctl").args(["enable", "--now", "docker"]))?;

    if ctx.user.is_root() {
        info!("Target user is root, not adding it to the docker group");
    } else {
        ctx.package(
            &CommandSpec::new("usermod").args(["-aG", "docker", ctx.user.username.as_str()]),
        )?;
        info!(
            "Added {} to the docker group (takes effect at next login)",
            ctx.user.username
        );
    }
    Ok(())
}
