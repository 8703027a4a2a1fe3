//! Interpreter module
//!
//! This module contains the boot script execution engine, variable store,
//! word expansion and function handling.

pub mod control_flow;
pub mod errors;
pub mod execution_engine;
pub mod functions;
pub mod types;
pub mod variables;
pub mod word_expansion;

pub use control_flow::*;
pub use errors::*;
pub use execution_engine::ExecutionEngine;
pub use functions::*;
pub use types::*;
pub use variables::*;
pub use word_expansion::{expand_arglist, ExpandedArgs};
