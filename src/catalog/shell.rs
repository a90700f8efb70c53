//! Interactive shell conveniences.

use crate::context::ProvisionContext;
use crate::error::Result;
use crate::shellrc::{BlockOutcome, ShellConfigBlock};
use tracing::info;

pub const ALIASES_BLOCK_ID: &str = "dev-aliases";

pub const ALIASES: &str = r#"alias ll='ls -alF'
alias la='ls -A'
alias gs='git status'
alias gd='git diff'
alias gl='git log --oneline --graph --decorate'
alias dps='docker ps --format "table {{.Names}}\t{{.Status}}\t{{.Ports}}"'"#;

pub fn shell_aliases(ctx: &ProvisionContext<'_>) -> Result<()> {
    let outcome = ctx.add_to_bashrc(&ShellConfigBlock::new(ALIASES_BLOCK_ID, ALIASES))?;
    if let BlockOutcome::Skipped(reason) = outcome {
        info!("Shell aliases not installed: {}", reason);
    }
    Ok(())
}
