//! boot-script - A boot loader script interpreter
//!
//! This library parses GRUB-style boot scripts into reference-counted ASTs,
//! runs them against a registry of commands, and resolves the devices those
//! scripts name: disks, partitions, RAID volumes and filesystem searches.

pub mod ast;
pub mod boot_shell;
pub mod commands;
pub mod config;
pub mod disk;
pub mod diskfilter;
pub mod fs;
pub mod interpreter;
pub mod parser;
pub mod partition;
pub mod search;
pub mod shell;

pub use ast::types::*;
pub use boot_shell::{BootShell, BootShellOptions};
pub use interpreter::types::ExecResult;
pub use parser::{parse, LineSource, ParseException, Parser};
