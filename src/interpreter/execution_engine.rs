//! Execution Engine
//!
//! Walks a parsed [`Script`] statement by statement:
//!
//! execute_script -> exec_cmdlist -> exec_command -> exec_cmdline / exec_cmdif /
//! exec_cmdfor / exec_cmdwhile
//!
//! A command line is looked up in the command registry first, then among the
//! script's functions, then tried as a `name=value` assignment. Statement
//! errors become an `error: ...` line plus a non-zero `$?`; only `break`,
//! `continue` and `return` unwind through [`InterpreterError`].

use std::mem;

use tracing::debug;

use crate::ast::types::{CmdFor, CmdIf, CmdLine, CmdWhile, CommandKind, CommandNode, Script};
use crate::commands::{CommandContext, CommandRegistry};
use crate::disk::DeviceContext;
use crate::interpreter::errors::{
    BreakError, ContinueError, InterpreterError, ReturnError, RuntimeError,
};
use crate::interpreter::functions::{call_function, execute_function_def};
use crate::interpreter::types::{ControlSignal, ExecResult, InterpreterState};
use crate::interpreter::variables::parse_assignment;
use crate::interpreter::word_expansion::expand_arglist;

/// What a loop does after one run of its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopFlow {
    Next,
    Stop,
}

/// The execution engine that ties all interpreter components together.
pub struct ExecutionEngine<'a> {
    pub commands: &'a CommandRegistry,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(commands: &'a CommandRegistry) -> Self {
        Self { commands }
    }

    /// Execute a complete script.
    ///
    /// `break`/`continue` have nothing to leave at this level and are
    /// dropped; `return` propagates to the caller.
    pub fn execute_script(
        &self,
        state: &mut InterpreterState,
        devices: &mut DeviceContext,
        script: &Script,
    ) -> Result<ExecResult, InterpreterError> {
        match self.exec_cmdlist(state, devices, script.cmd()) {
            Ok(result) => Ok(result),
            Err(InterpreterError::Break(e)) => Ok(ExecResult::new(e.stdout, e.stderr, 0)),
            Err(InterpreterError::Continue(e)) => Ok(ExecResult::new(e.stdout, e.stderr, 0)),
            Err(e) => Err(e),
        }
    }

    /// Run a chain of statements in order. Output accumulates; the status is
    /// that of the last statement.
    pub fn exec_cmdlist(
        &self,
        state: &mut InterpreterState,
        devices: &mut DeviceContext,
        list: Option<&CommandNode>,
    ) -> Result<ExecResult, InterpreterError> {
        let mut result = ExecResult::ok();
        let Some(head) = list else {
            return Ok(result);
        };

        for node in head.iter() {
            match self.exec_command(state, devices, node) {
                Ok(r) => {
                    result.absorb(r);
                    state.last_status = result.exit_code;
                }
                Err(mut e) => {
                    e.prepend_output(&result.stdout, &result.stderr);
                    return Err(e);
                }
            }
        }
        Ok(result)
    }

    fn exec_command(
        &self,
        state: &mut InterpreterState,
        devices: &mut DeviceContext,
        node: &CommandNode,
    ) -> Result<ExecResult, InterpreterError> {
        match &node.kind {
            CommandKind::CmdLine(cmd) => self.exec_cmdline(state, devices, cmd),
            CommandKind::If(cmd) => self.exec_cmdif(state, devices, cmd),
            CommandKind::For(cmd) => self.exec_cmdfor(state, devices, cmd),
            CommandKind::While(cmd) => self.exec_cmdwhile(state, devices, cmd),
            CommandKind::Block(block) => self.exec_cmdlist(state, devices, block.list.as_deref()),
            CommandKind::Function(def) => Ok(execute_function_def(state, def)),
        }
    }

    /// Expand and dispatch one command line.
    pub fn exec_cmdline(
        &self,
        state: &mut InterpreterState,
        devices: &mut DeviceContext,
        cmd: &CmdLine,
    ) -> Result<ExecResult, InterpreterError> {
        let expanded = match expand_arglist(state, devices, &cmd.arglist) {
            Ok(expanded) => expanded,
            Err(err) => return Ok(self.statement_failed(state, &err)),
        };
        let mut argv = expanded.argv.into_iter();
        let Some(name) = argv.next() else {
            return Ok(ExecResult::ok());
        };
        let args: Vec<String> = argv.collect();

        let result = if let Some(command) = self.commands.get(&name) {
            let ctx = CommandContext {
                name: &name,
                args,
                block: expanded.block,
                state: &mut *state,
                devices: &mut *devices,
            };
            command.execute(ctx).into()
        } else if let Some(body) = state.functions.get(&name).cloned() {
            call_function(self, state, devices, &body, args)?
        } else if let Some((var, value)) = parse_assignment(&name) {
            state.vars.set(var, value);
            ExecResult::ok()
        } else {
            return Ok(self.statement_failed(state, &RuntimeError::CommandNotFound(name)));
        };

        debug!(command = %name, status = result.exit_code, "command finished");
        state.last_status = result.exit_code;

        match state.pending.take() {
            None => Ok(result),
            Some(ControlSignal::Break(levels)) => {
                Err(BreakError::new(levels, result.stdout, result.stderr).into())
            }
            Some(ControlSignal::Continue(levels)) => {
                Err(ContinueError::new(levels, result.stdout, result.stderr).into())
            }
            Some(ControlSignal::Return(code)) => {
                Err(ReturnError::new(code, result.stdout, result.stderr).into())
            }
        }
    }

    /// The condition's status picks the branch; a missing branch succeeds.
    pub fn exec_cmdif(
        &self,
        state: &mut InterpreterState,
        devices: &mut DeviceContext,
        cmd: &CmdIf,
    ) -> Result<ExecResult, InterpreterError> {
        let cond = self.exec_cmdlist(state, devices, cmd.exec_to_evaluate.as_deref())?;
        let branch = if cond.success() {
            cmd.exec_on_true.as_deref()
        } else {
            cmd.exec_on_false.as_deref()
        };

        let mut result = ExecResult::new(cond.stdout, cond.stderr, 0);
        match self.exec_cmdlist(state, devices, branch) {
            Ok(r) => {
                result.absorb(r);
                Ok(result)
            }
            Err(mut e) => {
                e.prepend_output(&result.stdout, &result.stderr);
                Err(e)
            }
        }
    }

    /// Words are expanded once, then bound to the loop variable in turn.
    pub fn exec_cmdfor(
        &self,
        state: &mut InterpreterState,
        devices: &mut DeviceContext,
        cmd: &CmdFor,
    ) -> Result<ExecResult, InterpreterError> {
        let words = match expand_arglist(state, devices, &cmd.words) {
            Ok(expanded) => expanded.argv,
            Err(err) => return Ok(self.statement_failed(state, &err)),
        };

        state.loop_depth += 1;
        let result = self.for_iterations(state, devices, cmd, words);
        state.loop_depth -= 1;
        result
    }

    fn for_iterations(
        &self,
        state: &mut InterpreterState,
        devices: &mut DeviceContext,
        cmd: &CmdFor,
        words: Vec<String>,
    ) -> Result<ExecResult, InterpreterError> {
        let mut acc = ExecResult::ok();
        for word in words {
            state.vars.set(&cmd.name, &word);
            if self.loop_body(state, devices, cmd.list.as_deref(), &mut acc)? == LoopFlow::Stop {
                break;
            }
        }
        Ok(acc)
    }

    /// `while` runs while its condition succeeds, `until` while it fails.
    /// The status is that of the last body run, zero if none ran.
    pub fn exec_cmdwhile(
        &self,
        state: &mut InterpreterState,
        devices: &mut DeviceContext,
        cmd: &CmdWhile,
    ) -> Result<ExecResult, InterpreterError> {
        state.loop_depth += 1;
        let result = self.while_iterations(state, devices, cmd);
        state.loop_depth -= 1;
        result
    }

    fn while_iterations(
        &self,
        state: &mut InterpreterState,
        devices: &mut DeviceContext,
        cmd: &CmdWhile,
    ) -> Result<ExecResult, InterpreterError> {
        let mut acc = ExecResult::ok();
        let mut status = 0;
        loop {
            if self.loop_body(state, devices, cmd.cond.as_deref(), &mut acc)? == LoopFlow::Stop {
                break;
            }
            if acc.success() == cmd.until {
                break;
            }
            let flow = self.loop_body(state, devices, cmd.list.as_deref(), &mut acc)?;
            status = acc.exit_code;
            if flow == LoopFlow::Stop {
                break;
            }
        }
        acc.exit_code = status;
        Ok(acc)
    }

    /// Run one part of a loop, consuming the `break`/`continue` aimed at it.
    fn loop_body(
        &self,
        state: &mut InterpreterState,
        devices: &mut DeviceContext,
        list: Option<&CommandNode>,
        acc: &mut ExecResult,
    ) -> Result<LoopFlow, InterpreterError> {
        match self.exec_cmdlist(state, devices, list) {
            Ok(r) => {
                acc.absorb(r);
                Ok(LoopFlow::Next)
            }
            Err(InterpreterError::Break(e)) => {
                acc.absorb(ExecResult::new(e.stdout, e.stderr, 0));
                if e.levels > 1 {
                    let (stdout, stderr) = (mem::take(&mut acc.stdout), mem::take(&mut acc.stderr));
                    return Err(BreakError::new(e.levels - 1, stdout, stderr).into());
                }
                Ok(LoopFlow::Stop)
            }
            Err(InterpreterError::Continue(e)) => {
                acc.absorb(ExecResult::new(e.stdout, e.stderr, 0));
                if e.levels > 1 {
                    let (stdout, stderr) = (mem::take(&mut acc.stdout), mem::take(&mut acc.stderr));
                    return Err(ContinueError::new(e.levels - 1, stdout, stderr).into());
                }
                Ok(LoopFlow::Next)
            }
            Err(mut e) => {
                e.prepend_output(&acc.stdout, &acc.stderr);
                Err(e)
            }
        }
    }

    fn statement_failed(&self, state: &mut InterpreterState, err: &RuntimeError) -> ExecResult {
        debug!(error = %err, "statement failed");
        state.last_status = err.exit_code();
        ExecResult::failure_with_code(err.report(), err.exit_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::commands::{create_default_registry, Command, CommandResult};
    use crate::fs::InMemoryFs;
    use crate::parser::{parse, StrLines};

    type Calls = Rc<RefCell<Vec<Vec<String>>>>;

    /// Records its argv and succeeds.
    struct Recorder {
        name: &'static str,
        calls: Calls,
    }

    impl Command for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn execute(&self, ctx: CommandContext<'_>) -> CommandResult {
            let mut argv = vec![ctx.name.to_string()];
            argv.extend(ctx.args);
            self.calls.borrow_mut().push(argv);
            CommandResult::success(String::new())
        }
    }

    fn recording_registry(calls: &Calls) -> CommandRegistry {
        let mut registry = create_default_registry();
        registry.register(Box::new(Recorder { name: "echo", calls: calls.clone() }));
        registry
    }

    /// Parse and run one unit per line until the source is drained.
    fn run_with(registry: &CommandRegistry, state: &mut InterpreterState, source: &str) -> ExecResult {
        let mut devices = DeviceContext::new(Rc::new(InMemoryFs::new()));
        let engine = ExecutionEngine::new(registry);
        let mut lines = StrLines::new(source);
        let mut result = ExecResult::ok();
        while !lines.is_exhausted() {
            let script = parse(None, Some(&mut lines)).unwrap();
            result.absorb(engine.execute_script(state, &mut devices, &script).unwrap());
        }
        result
    }

    fn run(source: &str) -> ExecResult {
        let registry = create_default_registry();
        run_with(&registry, &mut InterpreterState::default(), source)
    }

    fn recorded(source: &str) -> Vec<Vec<String>> {
        let calls = Calls::default();
        let registry = recording_registry(&calls);
        run_with(&registry, &mut InterpreterState::default(), source);
        let out = calls.borrow().clone();
        out
    }

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_if_takes_true_branch() {
        let calls = recorded("if [ -n \"x\" ]; then echo yes; else echo no; fi\n");
        assert_eq!(calls, vec![argv(&["echo", "yes"])]);
    }

    #[test]
    fn test_for_binds_each_word() {
        let calls = recorded("for x in a b c; do echo $x; done\n");
        assert_eq!(
            calls,
            vec![argv(&["echo", "a"]), argv(&["echo", "b"]), argv(&["echo", "c"])]
        );
    }

    #[test]
    fn test_elif_chain() {
        let calls = recorded("if false; then echo 1; elif true; then echo 2; else echo 3; fi");
        assert_eq!(calls, vec![argv(&["echo", "2"])]);
    }

    #[test]
    fn test_if_without_else_succeeds() {
        let result = run("if false; then echo x; fi");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "");
    }

    #[test]
    fn test_failing_statement_does_not_stop_script() {
        let result = run("nosuchcmd\necho after");
        assert_eq!(result.stdout, "after\n");
        assert_eq!(result.stderr, "error: can't find command `nosuchcmd'.\n");
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn test_status_variable_follows_last_command() {
        let result = run("nosuchcmd; echo $?; false; echo $?; true; echo $?");
        assert_eq!(result.stdout, "16\n1\n0\n");
    }

    #[test]
    fn test_assignment() {
        let mut state = InterpreterState::default();
        let result = run_with(&create_default_registry(), &mut state, "root=hd0,msdos1\necho $root");
        assert_eq!(result.stdout, "hd0,msdos1\n");
        assert_eq!(state.vars.get("root").as_deref(), Some("hd0,msdos1"));
    }

    #[test]
    fn test_while_and_until() {
        let result = run("x=a\nwhile [ $x != aaa ]; do echo $x; x=${x}a; done");
        assert_eq!(result.stdout, "a\naa\n");
        let result = run("x=\nuntil [ \"$x\" = bb ]; do x=${x}b; echo $x; done");
        assert_eq!(result.stdout, "b\nbb\n");
    }

    #[test]
    fn test_while_status_is_last_body_status() {
        assert_eq!(run("while false; do true; done").exit_code, 0);
        let result = run("x=\nwhile [ -z \"$x\" ]; do x=1; false; done");
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn test_break_leaves_innermost_loop() {
        let result = run("for a in 1 2; do for b in x y; do echo $a$b; break; done; done");
        assert_eq!(result.stdout, "1x\n2x\n");
    }

    #[test]
    fn test_break_two_levels() {
        let result = run("for a in 1 2; do for b in x y; do echo $a$b; break 2; done; done; echo end");
        assert_eq!(result.stdout, "1x\nend\n");
    }

    #[test]
    fn test_continue_skips_rest_of_body() {
        let result = run("for a in 1 2 3; do if [ $a = 2 ]; then continue; fi; echo $a; done");
        assert_eq!(result.stdout, "1\n3\n");
    }

    #[test]
    fn test_continue_two_levels() {
        let result = run("for a in 1 2; do for b in x y; do continue 2; echo no; done; echo no; done; echo $a");
        assert_eq!(result.stdout, "2\n");
    }

    #[test]
    fn test_break_outside_loop_is_ignored() {
        let result = run("break\necho still");
        assert_eq!(result.stdout, "still\n");
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn test_function_call_and_return() {
        let result = run(
            "function greet { echo hello $1; return 3; echo unreachable }\ngreet world\necho $?",
        );
        assert_eq!(result.stdout, "hello world\n3\n");
    }

    #[test]
    fn test_function_positional_frames_are_restored() {
        let mut state = InterpreterState::default();
        state.positional = vec![argv(&["outer"])];
        let result = run_with(
            &create_default_registry(),
            &mut state,
            "function f { echo $# $1 }\nf a b\necho $1",
        );
        assert_eq!(result.stdout, "2 a\nouter\n");
        assert_eq!(state.call_depth, 0);
    }

    #[test]
    fn test_break_does_not_escape_function() {
        let result = run("function f { break; echo in }\nfor x in 1 2; do f; done");
        assert_eq!(result.stdout, "in\nin\n");
    }

    #[test]
    fn test_return_outside_function_fails() {
        let result = run("return 1\necho $?");
        assert_eq!(result.stdout, "18\n");
        assert_eq!(result.stderr, "error: not in function body.\n");
    }

    #[test]
    fn test_recursion() {
        let result = run(
            "function count { if [ $1 != xxx ]; then echo $1; count ${1}x; fi }\ncount x",
        );
        assert_eq!(result.stdout, "x\nxx\n");
    }

    #[test]
    fn test_group_block() {
        let result = run("{ echo a; echo b; }");
        assert_eq!(result.stdout, "a\nb\n");
    }

    #[test]
    fn test_output_before_break_is_kept() {
        let result = run("for x in 1; do echo before; break; done; echo after");
        assert_eq!(result.stdout, "before\nafter\n");
    }
}
