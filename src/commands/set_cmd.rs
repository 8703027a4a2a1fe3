// src/commands/set_cmd.rs
use crate::commands::{Command, CommandContext, CommandResult};
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::functions::unset_function;

/// `set` lists every variable; `set name=value` assigns one.
pub struct SetCommand;

impl Command for SetCommand {
    fn name(&self) -> &'static str {
        "set"
    }

    fn execute(&self, ctx: CommandContext<'_>) -> CommandResult {
        match ctx.args.as_slice() {
            [] => {
                let vars = &ctx.state.vars;
                let mut out = String::new();
                for name in vars.names() {
                    let value = vars.get(&name).unwrap_or_default();
                    out.push_str(&format!("{name}={value}\n"));
                }
                CommandResult::success(out)
            }
            [assignment] => match assignment.split_once('=') {
                Some((name, value)) if !name.is_empty() => {
                    ctx.state.vars.set(name, value);
                    CommandResult::success(String::new())
                }
                _ => CommandResult::from_error(RuntimeError::BadArgument("not an assignment".to_string())),
            },
            _ => CommandResult::from_error(RuntimeError::BadArgument("too many arguments".to_string())),
        }
    }
}

/// `unset name...` drops variables, and functions of the same name.
pub struct UnsetCommand;

impl Command for UnsetCommand {
    fn name(&self) -> &'static str {
        "unset"
    }

    fn execute(&self, ctx: CommandContext<'_>) -> CommandResult {
        if ctx.args.is_empty() {
            return CommandResult::from_error(RuntimeError::BadArgument("one argument expected".to_string()));
        }
        for name in &ctx.args {
            if ctx.state.vars.get(name).is_some() {
                ctx.state.vars.unset(name);
            } else {
                unset_function(ctx.state, name);
            }
        }
        CommandResult::success(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::types::test_support::Harness;
    use crate::interpreter::ErrorKind;

    #[test]
    fn test_set_assigns_and_lists() {
        let mut h = Harness::new();
        assert_eq!(h.run(&SetCommand, &["root=hd0,msdos1"]).exit_code, 0);
        assert_eq!(h.run(&SetCommand, &["timeout=5"]).exit_code, 0);
        assert_eq!(h.run(&SetCommand, &["empty="]).exit_code, 0);
        assert_eq!(h.state.vars.get("root").as_deref(), Some("hd0,msdos1"));

        let listing = h.run(&SetCommand, &[]);
        assert_eq!(listing.stdout, "root=hd0,msdos1\ntimeout=5\nempty=\n");
    }

    #[test]
    fn test_set_value_keeps_later_equals() {
        let mut h = Harness::new();
        h.run(&SetCommand, &["linux_args=root=/dev/sda1"]);
        assert_eq!(h.state.vars.get("linux_args").as_deref(), Some("root=/dev/sda1"));
    }

    #[test]
    fn test_set_rejects_non_assignment() {
        let mut h = Harness::new();
        let result = h.run(&SetCommand, &["root"]);
        assert_eq!(result.exit_code, ErrorKind::BadArgument.code());
        assert_eq!(result.stderr, "error: not an assignment.\n");
    }

    #[test]
    fn test_unset_variables() {
        let mut h = Harness::new();
        h.state.vars.set("a", "1");
        h.state.vars.set("b", "2");
        assert_eq!(h.run(&UnsetCommand, &["a", "missing"]).exit_code, 0);
        assert_eq!(h.state.vars.get("a"), None);
        assert_eq!(h.state.vars.get("b").as_deref(), Some("2"));
        assert_eq!(h.run(&UnsetCommand, &[]).exit_code, ErrorKind::BadArgument.code());
    }
}
