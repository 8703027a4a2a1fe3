//! Command Table
//!
//! Every command a script can call, keyed by name. Built-ins and commands a
//! host adds later live in the same table and are reached the same way:
//! the engine asks for a name and runs whatever it gets back.

use std::collections::HashMap;

use super::control_cmd::{BreakCommand, ContinueCommand, ReturnCommand, SetparamsCommand, ShiftCommand};
use super::echo::EchoCommand;
use super::ls::LsCommand;
use super::menu_cmd::{MenuEntryCommand, SubmenuCommand};
use super::search_cmd::SearchCommand;
use super::set_cmd::{SetCommand, UnsetCommand};
use super::test_cmd::{BracketCommand, TestCommand};
use super::true_cmd::{FalseCommand, TrueCommand};
use super::types::Command;

#[derive(Default)]
pub struct CommandRegistry {
    by_name: HashMap<&'static str, Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `cmd` under its own name, shadowing any earlier holder.
    pub fn register(&mut self, cmd: Box<dyn Command>) {
        self.by_name.insert(cmd.name(), cmd);
    }

    /// Drop the command called `name`; scripts calling it get "can't find command".
    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn Command>> {
        self.by_name.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.by_name.get(name).map(Box::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Installed command names in byte order, `[` first.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// General purpose commands.
pub fn register_core(registry: &mut CommandRegistry) {
    registry.register(Box::new(EchoCommand));
    registry.register(Box::new(TrueCommand));
    registry.register(Box::new(FalseCommand));
    registry.register(Box::new(TestCommand));
    registry.register(Box::new(BracketCommand));
    registry.register(Box::new(SetCommand));
    registry.register(Box::new(UnsetCommand));
}

/// Commands that steer loops and function calls.
pub fn register_control(registry: &mut CommandRegistry) {
    registry.register(Box::new(BreakCommand));
    registry.register(Box::new(ContinueCommand));
    registry.register(Box::new(ReturnCommand));
    registry.register(Box::new(ShiftCommand));
    registry.register(Box::new(SetparamsCommand));
}

/// Device and menu commands.
pub fn register_boot(registry: &mut CommandRegistry) {
    registry.register(Box::new(LsCommand));
    registry.register(Box::new(SearchCommand));
    registry.register(Box::new(MenuEntryCommand));
    registry.register(Box::new(SubmenuCommand));
}

pub fn create_default_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    register_core(&mut registry);
    register_control(&mut registry);
    register_boot(&mut registry);
    registry
}
