// src/commands/control_cmd.rs
//! Loop and function control: `break`, `continue`, `return`, `shift` and
//! `setparams`. The first three only record a signal; the engine acts on it
//! once the command has returned.

use crate::commands::{Command, CommandContext, CommandResult};
use crate::interpreter::control_flow::{loop_levels, parse_count};
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::types::ControlSignal;

pub struct BreakCommand;

impl Command for BreakCommand {
    fn name(&self) -> &'static str {
        "break"
    }

    fn execute(&self, ctx: CommandContext<'_>) -> CommandResult {
        signal_loops(ctx, ControlSignal::Break).into()
    }
}

pub struct ContinueCommand;

impl Command for ContinueCommand {
    fn name(&self) -> &'static str {
        "continue"
    }

    fn execute(&self, ctx: CommandContext<'_>) -> CommandResult {
        signal_loops(ctx, ControlSignal::Continue).into()
    }
}

// Outside any loop there is nothing to leave, so this succeeds silently.
fn signal_loops(
    ctx: CommandContext<'_>,
    signal: fn(u32) -> ControlSignal,
) -> Result<CommandResult, RuntimeError> {
    let levels = loop_levels(ctx.name, &ctx.args, ctx.state.loop_depth)?;
    if levels > 0 {
        ctx.state.pending = Some(signal(levels));
    }
    Ok(CommandResult::success(String::new()))
}

pub struct ReturnCommand;

impl Command for ReturnCommand {
    fn name(&self) -> &'static str {
        "return"
    }

    fn execute(&self, ctx: CommandContext<'_>) -> CommandResult {
        signal_return(ctx).into()
    }
}

// Without an argument the function returns the last status.
fn signal_return(ctx: CommandContext<'_>) -> Result<CommandResult, RuntimeError> {
    if !ctx.state.in_function() {
        return Err(RuntimeError::NotInFunction);
    }
    let code = match ctx.args.as_slice() {
        [] => ctx.state.last_status,
        [arg] => arg
            .parse::<i32>()
            .map_err(|_| RuntimeError::BadNumber(arg.clone()))?,
        _ => return Err(RuntimeError::BadArgument("too many arguments".to_string())),
    };
    ctx.state.pending = Some(ControlSignal::Return(code));
    Ok(CommandResult::with_exit_code(String::new(), String::new(), code))
}

pub struct ShiftCommand;

impl Command for ShiftCommand {
    fn name(&self) -> &'static str {
        "shift"
    }

    fn execute(&self, ctx: CommandContext<'_>) -> CommandResult {
        let count = match parse_count(&ctx.args, 1) {
            Ok(count) => count as usize,
            Err(err) => return CommandResult::from_error(err),
        };
        let params = ctx.state.params_mut();
        if count > params.len() {
            return CommandResult::from_error(RuntimeError::BadArgument("can't shift that many".to_string()));
        }
        params.drain(..count);
        CommandResult::success(String::new())
    }
}

/// Replace the current positional parameters.
pub struct SetparamsCommand;

impl Command for SetparamsCommand {
    fn name(&self) -> &'static str {
        "setparams"
    }

    fn execute(&self, ctx: CommandContext<'_>) -> CommandResult {
        *ctx.state.params_mut() = ctx.args;
        CommandResult::success(String::new())
    }
}
