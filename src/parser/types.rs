//! Parser Types and Constants
//!
//! Shared error type and limits used across the lexer and parser.

use thiserror::Error;

use crate::parser::alloc_tracker::AllocError;

/// Longest single line accepted from a line source.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;
/// Max nesting of if/for/while/blocks in one parse.
pub const MAX_PARSER_DEPTH: usize = 200;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("syntax error at {line}:{column}: {message}")]
pub struct ParseException {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseException {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }

    pub fn unexpected_eof(line: usize, column: usize) -> Self {
        Self::new("unexpected end of file", line, column)
    }

    pub fn from_alloc(err: AllocError, line: usize, column: usize) -> Self {
        Self::new(err.to_string(), line, column)
    }
}
