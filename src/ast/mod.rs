//! Abstract Syntax Tree (AST) for the boot configuration language
//!
//! Architecture:
//!   Line source → Lexer → Parser → Script → ExecutionEngine → Commands

pub mod types;
