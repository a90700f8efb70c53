use crate::catalog;
use crate::error::{ProvisionError, Result};
use crate::step::Criticality;
use clap::{Parser, Subcommand};

/// devprov - provision a Linux development workstation
#[derive(Parser, Debug)]
#[command(name = "devprov")]
#[command(about = "Install a fixed catalog of developer tools, in order, with retries")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: list the steps that would run without executing anything.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Skip an optional step by label (repeatable). Critical steps cannot be skipped.
    #[arg(long = "skip", value_name = "LABEL", global = true)]
    pub skip: Vec<String>,

    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Do not require root (also DEVPROV_SKIP_ROOT_CHECK=1).
    #[arg(long, global = true)]
    pub skip_root_check: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run every step in the catalog (default)
    Run,
    /// Print the catalog: order, label and criticality
    List,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Map `--skip` values onto catalog labels.
    ///
    /// Unknown labels and critical steps are usage errors.
    pub fn skipped_labels(&self) -> Result<Vec<&'static str>> {
        self.skip
            .iter()
            .map(|requested| {
                let entry = catalog::find(requested).ok_or_else(|| {
                    ProvisionError::config(format!("unknown step {:?} (see `devprov list`)", requested))
                })?;
                if entry.criticality == Criticality::Critical {
                    return Err(ProvisionError::config(format!(
                        "step {:?} is critical and cannot be skipped",
                        entry.label
                    )));
                }
                Ok(entry.label)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_none() {
        let cli = Cli::try_parse_from(["devprov"]).expect("parses");
        assert!(cli.command.is_none());
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_repeated_skip() {
        let cli = Cli::try_parse_from(["devprov", "--skip", "Neovim", "run", "--skip", "GitHub CLI"])
            .expect("parses");
        assert_eq!(cli.command, Some(Commands::Run));
        assert_eq!(cli.skip, vec!["Neovim", "GitHub CLI"]);
    }

    #[test]
    fn test_list_with_dry_run() {
        let cli = Cli::try_parse_from(["devprov", "list", "--dry-run"]).expect("parses");
        assert_eq!(cli.command, Some(Commands::List));
        assert!(cli.dry_run);
    }

    #[test]
    fn test_skipped_labels_are_canonical() {
        let cli = Cli::try_parse_from(["devprov", "--skip", "neovim"]).expect("parses");
        assert_eq!(cli.skipped_labels().expect("optional step"), vec!["Neovim"]);
    }

    #[test]
    fn test_skipping_critical_or_unknown_is_rejected() {
        let cli = Cli::try_parse_from(["devprov", "--skip", "Base build tools"]).expect("parses");
        let err = cli.skipped_labels().expect_err("critical");
        assert!(err.to_string().contains("cannot be skipped"));
        assert_eq!(err.exit_code(), 2);

        let cli = Cli::try_parse_from(["devprov", "--skip", "emacs"]).expect("parses");
        let err = cli.skipped_labels().expect_err("unknown");
        assert!(err.to_string().contains("unknown step"));
    }
}
