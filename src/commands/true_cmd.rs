use crate::commands::{Command, CommandContext, CommandResult};

pub struct TrueCommand;

impl Command for TrueCommand {
    fn name(&self) -> &'static str {
        "true"
    }

    fn execute(&self, _ctx: CommandContext<'_>) -> CommandResult {
        CommandResult::success(String::new())
    }
}

pub struct FalseCommand;

impl Command for FalseCommand {
    fn name(&self) -> &'static str {
        "false"
    }

    fn execute(&self, _ctx: CommandContext<'_>) -> CommandResult {
        CommandResult::with_exit_code(String::new(), String::new(), 1)
    }
}
