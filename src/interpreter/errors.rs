//! Interpreter Errors
//!
//! Two families live here:
//! - Control flow (`break`, `continue`, `return`) travels as [`InterpreterError`]
//!   and unwinds the enclosing loops or function call. Each carries the output
//!   produced before it fired so nothing is lost while unwinding.
//! - [`RuntimeError`] aborts only the statement that raised it. The engine turns
//!   it into an `error: ...` line and a numeric status taken from [`ErrorKind`].

use std::fmt;

use thiserror::Error;

use crate::disk::DiskError;
use crate::fs::FsError;
use crate::search::SearchError;

/// Base trait for control flow errors that carry stdout/stderr.
pub trait ControlFlowError: std::error::Error {
    fn stdout(&self) -> &str;
    fn stderr(&self) -> &str;
    fn stdout_mut(&mut self) -> &mut String;
    fn stderr_mut(&mut self) -> &mut String;

    /// Prepend output from the current context before re-throwing.
    fn prepend_output(&mut self, stdout: &str, stderr: &str) {
        let new_stdout = format!("{}{}", stdout, self.stdout());
        let new_stderr = format!("{}{}", stderr, self.stderr());
        *self.stdout_mut() = new_stdout;
        *self.stderr_mut() = new_stderr;
    }
}

/// Raised by `break` to leave `levels` enclosing loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakError {
    pub levels: u32,
    pub stdout: String,
    pub stderr: String,
}

impl BreakError {
    pub fn new(levels: u32, stdout: String, stderr: String) -> Self {
        Self { levels, stdout, stderr }
    }
}

impl Default for BreakError {
    fn default() -> Self {
        Self { levels: 1, stdout: String::new(), stderr: String::new() }
    }
}

impl fmt::Display for BreakError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "break")
    }
}

impl std::error::Error for BreakError {}

impl ControlFlowError for BreakError {
    fn stdout(&self) -> &str { &self.stdout }
    fn stderr(&self) -> &str { &self.stderr }
    fn stdout_mut(&mut self) -> &mut String { &mut self.stdout }
    fn stderr_mut(&mut self) -> &mut String { &mut self.stderr }
}

/// Raised by `continue`; the innermost of `levels` loops starts its next round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinueError {
    pub levels: u32,
    pub stdout: String,
    pub stderr: String,
}

impl ContinueError {
    pub fn new(levels: u32, stdout: String, stderr: String) -> Self {
        Self { levels, stdout, stderr }
    }
}

impl Default for ContinueError {
    fn default() -> Self {
        Self { levels: 1, stdout: String::new(), stderr: String::new() }
    }
}

impl fmt::Display for ContinueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "continue")
    }
}

impl std::error::Error for ContinueError {}

impl ControlFlowError for ContinueError {
    fn stdout(&self) -> &str { &self.stdout }
    fn stderr(&self) -> &str { &self.stderr }
    fn stdout_mut(&mut self) -> &mut String { &mut self.stdout }
    fn stderr_mut(&mut self) -> &mut String { &mut self.stderr }
}

/// Raised by `return` to leave the current function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnError {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ReturnError {
    pub fn new(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self { exit_code, stdout, stderr }
    }
}

impl fmt::Display for ReturnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "return")
    }
}

impl std::error::Error for ReturnError {}

impl ControlFlowError for ReturnError {
    fn stdout(&self) -> &str { &self.stdout }
    fn stderr(&self) -> &str { &self.stderr }
    fn stdout_mut(&mut self) -> &mut String { &mut self.stdout }
    fn stderr_mut(&mut self) -> &mut String { &mut self.stderr }
}

/// Control flow unwinding through the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpreterError {
    Break(BreakError),
    Continue(ContinueError),
    Return(ReturnError),
}

impl InterpreterError {
    pub fn as_control_flow_mut(&mut self) -> &mut dyn ControlFlowError {
        match self {
            InterpreterError::Break(e) => e,
            InterpreterError::Continue(e) => e,
            InterpreterError::Return(e) => e,
        }
    }

    pub fn prepend_output(&mut self, stdout: &str, stderr: &str) {
        if !stdout.is_empty() || !stderr.is_empty() {
            self.as_control_flow_mut().prepend_output(stdout, stderr);
        }
    }
}

impl fmt::Display for InterpreterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpreterError::Break(e) => write!(f, "{}", e),
            InterpreterError::Continue(e) => write!(f, "{}", e),
            InterpreterError::Return(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for InterpreterError {}

impl From<BreakError> for InterpreterError {
    fn from(e: BreakError) -> Self { InterpreterError::Break(e) }
}

impl From<ContinueError> for InterpreterError {
    fn from(e: ContinueError) -> Self { InterpreterError::Continue(e) }
}

impl From<ReturnError> for InterpreterError {
    fn from(e: ReturnError) -> Self { InterpreterError::Return(e) }
}

// ============================================================================
// Statement-level errors
// ============================================================================

/// A malformed wildcard pattern.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid pattern `{pattern}': {reason}")]
pub struct GlobError {
    pub pattern: String,
    pub reason: String,
}

impl GlobError {
    pub fn new(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { pattern: pattern.into(), reason: reason.into() }
    }
}

/// Error numbers as seen through `$?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    None = 0,
    TestFailure = 1,
    OutOfMemory = 3,
    BadFileType = 4,
    FileNotFound = 5,
    BadFilename = 7,
    UnknownFs = 8,
    BadNumber = 10,
    OutOfRange = 11,
    UnknownDevice = 12,
    BadDevice = 13,
    ReadError = 14,
    UnknownCommand = 16,
    InvalidCommand = 17,
    BadArgument = 18,
    BadPartTable = 19,
    NotImplementedYet = 24,
}

impl ErrorKind {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<&DiskError> for ErrorKind {
    fn from(err: &DiskError) -> Self {
        match err {
            DiskError::OutOfRange { .. } => ErrorKind::OutOfRange,
            DiskError::UnknownDevice(_) | DiskError::NoSuchPartition(_) => ErrorKind::UnknownDevice,
            DiskError::NotRecognized(_) | DiskError::BadDeviceName(_) => ErrorKind::BadDevice,
            DiskError::BadPartitionTable { .. }
            | DiskError::LoopDetected { .. }
            | DiskError::ChecksumMismatch { .. } => ErrorKind::BadPartTable,
            DiskError::Unsupported(_) => ErrorKind::NotImplementedYet,
            DiskError::Io { .. } => ErrorKind::ReadError,
        }
    }
}

/// Aborts the current statement only.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    #[error("can't find command `{0}'")]
    CommandNotFound(String),

    #[error(transparent)]
    Glob(#[from] GlobError),

    #[error(transparent)]
    Device(#[from] DiskError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("{0}")]
    BadArgument(String),

    #[error("unrecognized number `{0}'")]
    BadNumber(String),

    #[error("not in function body")]
    NotInFunction,
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::CommandNotFound(_) => ErrorKind::UnknownCommand,
            RuntimeError::Glob(_) => ErrorKind::BadFilename,
            RuntimeError::Device(err) => ErrorKind::from(err),
            RuntimeError::Search(_) => ErrorKind::FileNotFound,
            RuntimeError::Fs(FsError::UnknownFs { .. }) => ErrorKind::UnknownFs,
            RuntimeError::Fs(FsError::NotFound { .. }) => ErrorKind::FileNotFound,
            RuntimeError::Fs(FsError::NotDirectory { .. }) => ErrorKind::BadFileType,
            RuntimeError::BadArgument(_) | RuntimeError::NotInFunction => ErrorKind::BadArgument,
            RuntimeError::BadNumber(_) => ErrorKind::BadNumber,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().code()
    }

    /// The line printed for an uncaught statement error.
    pub fn report(&self) -> String {
        format!("error: {}.\n", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_output_accumulates() {
        let mut err = InterpreterError::Break(BreakError::new(2, "b\n".into(), String::new()));
        err.prepend_output("a\n", "warn\n");
        match err {
            InterpreterError::Break(e) => {
                assert_eq!(e.levels, 2);
                assert_eq!(e.stdout, "a\nb\n");
                assert_eq!(e.stderr, "warn\n");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_runtime_error_kinds() {
        assert_eq!(RuntimeError::CommandNotFound("x".into()).exit_code(), 16);
        assert_eq!(
            RuntimeError::Search(SearchError::NoSuchDevice { key: "k".into() }).exit_code(),
            5
        );
        let loop_err = RuntimeError::Device(DiskError::LoopDetected { device: "hd0".into(), sector: 10 });
        assert_eq!(loop_err.kind(), ErrorKind::BadPartTable);
        assert_eq!(RuntimeError::NotInFunction.exit_code(), 18);
    }

    #[test]
    fn test_report_format() {
        let err = RuntimeError::CommandNotFound("frobnicate".into());
        assert_eq!(err.report(), "error: can't find command `frobnicate'.\n");
    }
}
