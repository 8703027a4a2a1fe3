//! Function Handling
//!
//! Handles script function definition and invocation:
//! - Function definition (adding the body to the function table)
//! - Function calls (with a fresh positional parameter frame)

use tracing::debug;

use crate::ast::types::{FunctionDefNode, ScriptRef};
use crate::disk::DeviceContext;
use crate::interpreter::errors::InterpreterError;
use crate::interpreter::execution_engine::ExecutionEngine;
use crate::interpreter::types::{ExecResult, InterpreterState};

/// Execute a function definition (add to function table).
/// A later definition replaces an earlier one.
pub fn execute_function_def(state: &mut InterpreterState, node: &FunctionDefNode) -> ExecResult {
    state.functions.insert(node.name.clone(), node.body.clone());
    ExecResult::ok()
}

/// Check if a function is defined
pub fn is_function_defined(state: &InterpreterState, name: &str) -> bool {
    state.functions.contains_key(name)
}

/// Remove a function definition
pub fn unset_function(state: &mut InterpreterState, name: &str) -> bool {
    state.functions.shift_remove(name).is_some()
}

/// Run a function body with `args` as its positional parameters.
///
/// Loops of the caller are invisible inside the body, so `break` and
/// `continue` there cannot reach them. `return` ends the call with its code;
/// falling off the end yields the last statement's status.
pub fn call_function(
    engine: &ExecutionEngine<'_>,
    state: &mut InterpreterState,
    devices: &mut DeviceContext,
    body: &ScriptRef,
    args: Vec<String>,
) -> Result<ExecResult, InterpreterError> {
    let saved_loops = std::mem::replace(&mut state.loop_depth, 0);
    state.positional.push(args);
    state.call_depth += 1;
    debug!(depth = state.call_depth, "function call");

    let result = engine.exec_cmdlist(state, devices, body.cmd());

    state.call_depth -= 1;
    state.positional.pop();
    state.loop_depth = saved_loops;

    match result {
        Ok(result) => Ok(result),
        Err(InterpreterError::Return(e)) => Ok(ExecResult::new(e.stdout, e.stderr, e.exit_code)),
        Err(InterpreterError::Break(e)) => Ok(ExecResult::new(e.stdout, e.stderr, 0)),
        Err(InterpreterError::Continue(e)) => Ok(ExecResult::new(e.stdout, e.stderr, 0)),
    }
}
