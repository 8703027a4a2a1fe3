// src/commands/menu_cmd.rs
use tracing::debug;

use crate::commands::{Command, CommandContext, CommandResult};
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::types::MenuEntry;

/// `menuentry [--class=C]... [--id=ID] TITLE [ARG]... { ... }`
pub struct MenuEntryCommand;

/// Same syntax as `menuentry`; the entry opens a nested menu.
pub struct SubmenuCommand;

impl Command for MenuEntryCommand {
    fn name(&self) -> &'static str {
        "menuentry"
    }

    fn execute(&self, ctx: CommandContext<'_>) -> CommandResult {
        add_entry(ctx, false).into()
    }
}

impl Command for SubmenuCommand {
    fn name(&self) -> &'static str {
        "submenu"
    }

    fn execute(&self, ctx: CommandContext<'_>) -> CommandResult {
        add_entry(ctx, true).into()
    }
}

// Options that take a value, either `--opt=value` or `--opt value`.
const VALUE_OPTIONS: &[&str] = &["--class", "--id", "--users", "--hotkey", "--source"];

fn add_entry(ctx: CommandContext<'_>, submenu: bool) -> Result<CommandResult, RuntimeError> {
    let script = ctx
        .block
        .clone()
        .ok_or_else(|| RuntimeError::BadArgument("no menuentry definition".to_string()))?;

    // The block travels as the last word.
    let words = match ctx.args.split_last() {
        Some((last, rest)) if last.starts_with('{') => rest,
        _ => ctx.args.as_slice(),
    };
    let source = ctx
        .args
        .last()
        .and_then(|last| last.strip_prefix('{'))
        .and_then(|body| body.strip_suffix('}'))
        .unwrap_or_default()
        .to_string();

    let mut classes = Vec::new();
    let mut id = None;
    let mut positional: Vec<String> = Vec::new();
    let mut options_done = false;
    let mut iter = words.iter();
    // Options may appear anywhere before `--`, title included.
    while let Some(word) = iter.next() {
        if options_done || !word.starts_with("--") {
            positional.push(word.clone());
            continue;
        }
        if word == "--" {
            options_done = true;
            continue;
        }
        if word == "--unrestricted" {
            continue;
        }
        let (option, value) = match word.split_once('=') {
            Some((option, value)) => (option, value.to_string()),
            None if VALUE_OPTIONS.contains(&word.as_str()) => {
                let value = iter
                    .next()
                    .ok_or_else(|| RuntimeError::BadArgument(format!("missing mandatory option for `{word}'")))?;
                (word.as_str(), value.clone())
            }
            None => return Err(RuntimeError::BadArgument(format!("unrecognized option `{word}'"))),
        };
        match option {
            "--class" => classes.push(value),
            "--id" => id = Some(value),
            "--users" | "--hotkey" | "--source" => {}
            other => return Err(RuntimeError::BadArgument(format!("unrecognized option `{other}'"))),
        }
    }

    let mut positional = positional.into_iter();
    let title = positional
        .next()
        .ok_or_else(|| RuntimeError::BadArgument("missing arguments".to_string()))?;
    debug!(title = %title, submenu, "menu entry registered");
    ctx.state.menu.push(MenuEntry {
        title,
        args: positional.collect(),
        classes,
        id,
        submenu,
        script,
        source,
    });
    Ok(CommandResult::success(String::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::types::test_support::Harness;
    use crate::commands::CommandContext;
    use crate::interpreter::ErrorKind;
    use crate::parser::parse;

    fn run_with_block(h: &mut Harness, cmd: &dyn Command, args: &[&str]) -> CommandResult {
        let script = parse(Some("echo booting"), None).unwrap();
        let mut args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        args.push("{echo booting}".to_string());
        cmd.execute(CommandContext {
            name: cmd.name(),
            args,
            block: Some(script),
            state: &mut h.state,
            devices: &mut h.devices,
        })
    }

    #[test]
    fn test_registers_entry_with_options() {
        let mut h = Harness::new();
        let result = run_with_block(
            &mut h,
            &MenuEntryCommand,
            &["--class", "gnu-linux", "--class=os", "--id=linux-5", "Linux 5", "extra"],
        );
        assert_eq!(result.exit_code, 0);
        let entry = &h.state.menu[0];
        assert_eq!(entry.title, "Linux 5");
        assert_eq!(entry.args, vec!["extra"]);
        assert_eq!(entry.classes, vec!["gnu-linux", "os"]);
        assert_eq!(entry.id.as_deref(), Some("linux-5"));
        assert_eq!(entry.source, "echo booting");
        assert!(!entry.submenu);
    }

    #[test]
    fn test_options_follow_title() {
        let mut h = Harness::new();
        run_with_block(
            &mut h,
            &SubmenuCommand,
            &["Advanced", "--class", "ubuntu", "--id", "adv", "x", "--", "--literal"],
        );
        let entry = &h.state.menu[0];
        assert!(entry.submenu);
        assert_eq!(entry.title, "Advanced");
        assert_eq!(entry.classes, vec!["ubuntu"]);
        assert_eq!(entry.id.as_deref(), Some("adv"));
        assert_eq!(entry.args, vec!["x", "--literal"]);
    }

    #[test]
    fn test_missing_block_or_title() {
        let mut h = Harness::new();
        let result = h.run(&MenuEntryCommand, &["Linux"]);
        assert_eq!(result.exit_code, ErrorKind::BadArgument.code());
        assert_eq!(result.stderr, "error: no menuentry definition.\n");

        let result = run_with_block(&mut h, &MenuEntryCommand, &["--class=os"]);
        assert_eq!(result.stderr, "error: missing arguments.\n");
        assert!(h.state.menu.is_empty());
    }

    #[test]
    fn test_unknown_option() {
        let mut h = Harness::new();
        let result = run_with_block(&mut h, &MenuEntryCommand, &["--bogus", "Linux"]);
        assert_eq!(result.exit_code, ErrorKind::BadArgument.code());
    }
}
