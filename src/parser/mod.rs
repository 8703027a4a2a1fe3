//! Parser module for boot scripts
//!
//! This module contains the allocation tracker, the lexer and the parser
//! that turn script text into reference-counted [`Script`](crate::ast::types::Script)s.

pub mod types;
pub mod alloc_tracker;
pub mod ast_builder;
pub mod lexer;
pub mod parser;

// Re-exports
pub use types::ParseException;
pub use alloc_tracker::{free_list, AllocError, AllocId, AllocList, AllocTracker};
pub use lexer::{Keyword, Lexer, LineSource, StrLines, Token, TokenType};
pub use parser::{parse, parse_with, Parser};
