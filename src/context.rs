//! Run-wide context shared by every step.

use crate::command::{CommandOutput, CommandSpec, Executor, Sleeper};
use crate::config::Settings;
use crate::error::Result;
use crate::runners::Runners;
use crate::shellrc::{BlockOutcome, ShellConfigBlock, ShellRcEditor};
use crate::user_context::UserContext;

/// Everything a step needs, resolved once at startup.
pub struct ProvisionContext<'a> {
    pub settings: &'a Settings,
    pub user: &'a UserContext,
    /// Whether devprov itself runs as the target user (no sudo wrapping needed).
    pub running_as_target: bool,
    runners: Runners<'a>,
    editor: ShellRcEditor,
}

impl<'a> ProvisionContext<'a> {
    pub fn new(
        settings: &'a Settings,
        user: &'a UserContext,
        running_as_target: bool,
        executor: &'a dyn Executor,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            settings,
            user,
            running_as_target,
            runners: Runners::new(settings, executor, sleeper),
            editor: ShellRcEditor::with_owner(user.ownership()),
        }
    }

    pub fn network(&self, command: &CommandSpec) -> Result<CommandOutput> {
        Ok(self.runners.network(command)?)
    }

    pub fn package(&self, command: &CommandSpec) -> Result<CommandOutput> {
        Ok(self.runners.package(command)?)
    }

    pub fn installer(&self, command: &CommandSpec) -> Result<CommandOutput> {
        Ok(self.runners.installer(command)?)
    }

    /// Wrap `command` so it runs as the target user.
    pub fn as_user(&self, command: CommandSpec) -> CommandSpec {
        command.as_user(&self.user.username, self.running_as_target)
    }

    /// Append `block` to the target user's `.bashrc` once.
    pub fn add_to_bashrc(&self, block: &ShellConfigBlock) -> Result<BlockOutcome> {
        self.editor.append_block_if_missing(&self.user.bashrc(), block)
    }
}
