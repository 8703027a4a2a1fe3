//! Interpreter Types
//!
//! State shared by the engine and the commands it dispatches to.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::types::ScriptRef;
use crate::interpreter::variables::{Environment, VariableStore};
use crate::shell::wildcard::WildcardTranslator;

/// Field separators used when an unquoted expansion is split.
pub const DEFAULT_IFS: &str = " \t\n";

/// Translation hook for `$"..."` strings.
pub type Localizer = Rc<dyn Fn(&str) -> String>;

/// Set by a control command; the engine turns it into an
/// [`InterpreterError`](crate::interpreter::errors::InterpreterError) once the
/// command returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Break(u32),
    Continue(u32),
    Return(i32),
}

/// A `menuentry` or `submenu` registered while running a configuration.
#[derive(Debug, Clone)]
pub struct MenuEntry {
    pub title: String,
    /// Positional arguments after the title.
    pub args: Vec<String>,
    pub classes: Vec<String>,
    pub id: Option<String>,
    pub submenu: bool,
    pub script: ScriptRef,
    /// Verbatim text of the entry's block.
    pub source: String,
}

pub struct InterpreterState {
    pub vars: Box<dyn VariableStore>,
    /// Positional parameter frames; the last one is current.
    pub positional: Vec<Vec<String>>,
    pub functions: IndexMap<String, ScriptRef>,
    pub loop_depth: u32,
    pub call_depth: u32,
    pub pending: Option<ControlSignal>,
    /// `$?`
    pub last_status: i32,
    pub menu: Vec<MenuEntry>,
    pub ifs: String,
    pub localizer: Option<Localizer>,
    pub wildcard: Option<Rc<dyn WildcardTranslator>>,
}

impl InterpreterState {
    pub fn new(vars: Box<dyn VariableStore>) -> Self {
        Self {
            vars,
            positional: vec![Vec::new()],
            functions: IndexMap::new(),
            loop_depth: 0,
            call_depth: 0,
            pending: None,
            last_status: 0,
            menu: Vec::new(),
            ifs: DEFAULT_IFS.to_string(),
            localizer: None,
            wildcard: None,
        }
    }

    pub fn params(&self) -> &[String] {
        self.positional.last().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn params_mut(&mut self) -> &mut Vec<String> {
        if self.positional.is_empty() {
            self.positional.push(Vec::new());
        }
        let last = self.positional.len() - 1;
        &mut self.positional[last]
    }

    pub fn in_function(&self) -> bool {
        self.call_depth > 0
    }

    pub fn translate(&self, text: &str) -> String {
        match &self.localizer {
            Some(localize) => localize(text),
            None => text.to_string(),
        }
    }
}

impl Default for InterpreterState {
    fn default() -> Self {
        Self::new(Box::new(Environment::new()))
    }
}

impl fmt::Debug for InterpreterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpreterState")
            .field("vars", &self.vars.names())
            .field("positional", &self.positional)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("loop_depth", &self.loop_depth)
            .field("call_depth", &self.call_depth)
            .field("pending", &self.pending)
            .field("last_status", &self.last_status)
            .field("menu", &self.menu.len())
            .finish()
    }
}

/// Execution result from a command or script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    pub fn new(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self { stdout, stderr, exit_code }
    }

    /// Success result with no output
    pub fn ok() -> Self {
        Self::new(String::new(), String::new(), 0)
    }

    /// Failure result with stderr message
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self::new(String::new(), stderr.into(), 1)
    }

    /// Failure result with stderr message and custom exit code
    pub fn failure_with_code(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self::new(String::new(), stderr.into(), exit_code)
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Append another result's output, taking over its status.
    pub fn absorb(&mut self, other: ExecResult) {
        self.stdout.push_str(&other.stdout);
        self.stderr.push_str(&other.stderr);
        self.exit_code = other.exit_code;
    }
}

impl Default for ExecResult {
    fn default() -> Self {
        Self::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_frames() {
        let mut state = InterpreterState::default();
        assert!(state.params().is_empty());
        state.params_mut().push("a".to_string());
        state.positional.push(vec!["x".to_string(), "y".to_string()]);
        assert_eq!(state.params(), ["x", "y"]);
        state.positional.pop();
        assert_eq!(state.params(), ["a"]);
    }

    #[test]
    fn test_translate_uses_localizer() {
        let mut state = InterpreterState::default();
        assert_eq!(state.translate("Boot"), "Boot");
        state.localizer = Some(Rc::new(|s: &str| format!("<{s}>")));
        assert_eq!(state.translate("Boot"), "<Boot>");
    }

    #[test]
    fn test_absorb() {
        let mut acc = ExecResult::ok();
        acc.absorb(ExecResult::new("a\n".into(), String::new(), 0));
        acc.absorb(ExecResult::failure("bad\n"));
        assert_eq!(acc, ExecResult::new("a\n".into(), "bad\n".into(), 1));
    }
}
