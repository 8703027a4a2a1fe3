// src/commands/types.rs
use crate::ast::types::ScriptRef;
use crate::disk::DeviceContext;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::types::{ExecResult, InterpreterState};

/// Result of running one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(stdout: String) -> Self {
        Self { stdout, stderr: String::new(), exit_code: 0 }
    }

    pub fn error(stderr: String) -> Self {
        Self { stdout: String::new(), stderr, exit_code: 1 }
    }

    pub fn with_exit_code(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self { stdout, stderr, exit_code }
    }

    /// Report `err` and carry its status.
    pub fn from_error(err: RuntimeError) -> Self {
        Self::with_exit_code(String::new(), err.report(), err.exit_code())
    }

    /// Status only: zero when `ok`, one otherwise.
    pub fn status(ok: bool) -> Self {
        Self::with_exit_code(String::new(), String::new(), if ok { 0 } else { 1 })
    }
}

impl From<CommandResult> for ExecResult {
    fn from(r: CommandResult) -> Self {
        ExecResult::new(r.stdout, r.stderr, r.exit_code)
    }
}

impl From<Result<CommandResult, RuntimeError>> for CommandResult {
    fn from(r: Result<CommandResult, RuntimeError>) -> Self {
        r.unwrap_or_else(CommandResult::from_error)
    }
}

/// What a command sees of the interpreter while it runs.
pub struct CommandContext<'a> {
    /// argv[0], as typed (`[` and `test` share an implementation).
    pub name: &'a str,
    pub args: Vec<String>,
    /// Script of a trailing `{ ... }` argument.
    pub block: Option<ScriptRef>,
    pub state: &'a mut InterpreterState,
    pub devices: &'a mut DeviceContext,
}

pub trait Command {
    fn name(&self) -> &'static str;
    fn execute(&self, ctx: CommandContext<'_>) -> CommandResult;
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::rc::Rc;

    use super::*;
    use crate::fs::InMemoryFs;

    /// Interpreter state plus devices for calling one command directly.
    pub struct Harness {
        pub state: InterpreterState,
        pub devices: DeviceContext,
        pub fs: InMemoryFs,
    }

    impl Harness {
        pub fn new() -> Self {
            let fs = InMemoryFs::new();
            Self {
                state: InterpreterState::default(),
                devices: DeviceContext::new(Rc::new(fs.clone())),
                fs,
            }
        }

        pub fn run(&mut self, cmd: &dyn Command, args: &[&str]) -> CommandResult {
            self.run_as(cmd.name(), cmd, args)
        }

        pub fn run_as(&mut self, name: &str, cmd: &dyn Command, args: &[&str]) -> CommandResult {
            cmd.execute(CommandContext {
                name,
                args: args.iter().map(|a| a.to_string()).collect(),
                block: None,
                state: &mut self.state,
                devices: &mut self.devices,
            })
        }
    }
}
