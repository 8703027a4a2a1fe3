// src/commands/mod.rs
pub mod control_cmd;
pub mod echo;
pub mod ls;
pub mod menu_cmd;
pub mod registry;
pub mod search_cmd;
pub mod set_cmd;
pub mod test_cmd;
pub mod true_cmd;
pub mod types;

pub use registry::{create_default_registry, CommandRegistry};
pub use types::{Command, CommandContext, CommandResult};
