// src/commands/search_cmd.rs
use crate::commands::{Command, CommandContext, CommandResult};
use crate::interpreter::errors::RuntimeError;
use crate::search::{resolve, SearchKey, SearchKind, SearchRequest};

/// `search [--fs-uuid|--label|--part-uuid|--part-label|--disk-uuid|--file]
/// [--set[=VAR]] [--no-floppy] [--hint=DEV]... KEY`
pub struct SearchCommand;

struct SearchArgs {
    kind: Option<SearchKind>,
    var: Option<String>,
    no_floppy: bool,
    hints: Vec<String>,
    key: Option<String>,
}

fn parse_args(args: &[String]) -> Result<SearchArgs, RuntimeError> {
    let mut parsed = SearchArgs {
        kind: None,
        var: None,
        no_floppy: false,
        hints: Vec::new(),
        key: None,
    };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--fs-uuid" | "-u" => parsed.kind = Some(SearchKind::FsUuid),
            "--label" | "-l" => parsed.kind = Some(SearchKind::Label),
            "--part-uuid" => parsed.kind = Some(SearchKind::PartUuid),
            "--part-label" => parsed.kind = Some(SearchKind::PartLabel),
            "--disk-uuid" => parsed.kind = Some(SearchKind::DiskUuid),
            "--file" | "-f" => parsed.kind = Some(SearchKind::File),
            "--set" | "-s" => parsed.var = Some("root".to_string()),
            "--no-floppy" | "-n" => parsed.no_floppy = true,
            "--hint" | "-h" => {
                let hint = iter
                    .next()
                    .ok_or_else(|| RuntimeError::BadArgument(format!("missing mandatory option for `{arg}'")))?;
                parsed.hints.push(hint.clone());
            }
            "--" => {
                for rest in iter.by_ref() {
                    set_key(&mut parsed, rest)?;
                }
            }
            other => {
                if let Some(var) = other.strip_prefix("--set=") {
                    parsed.var = Some(var.to_string());
                } else if let Some((_, hint)) = other.strip_prefix("--hint").and_then(|h| h.split_once('=')) {
                    // --hint-bios=, --hint-efi= and friends are plain hints here.
                    parsed.hints.push(hint.to_string());
                } else if other.starts_with("--") {
                    return Err(RuntimeError::BadArgument(format!("unrecognized option `{other}'")));
                } else {
                    set_key(&mut parsed, other)?;
                }
            }
        }
    }
    Ok(parsed)
}

fn set_key(parsed: &mut SearchArgs, key: &str) -> Result<(), RuntimeError> {
    if parsed.key.is_some() {
        return Err(RuntimeError::BadArgument("one argument expected".to_string()));
    }
    parsed.key = Some(key.to_string());
    Ok(())
}

impl Command for SearchCommand {
    fn name(&self) -> &'static str {
        "search"
    }

    fn execute(&self, ctx: CommandContext<'_>) -> CommandResult {
        run_search(ctx).into()
    }
}

fn run_search(ctx: CommandContext<'_>) -> Result<CommandResult, RuntimeError> {
    let args = parse_args(&ctx.args)?;
    let key = args
        .key
        .ok_or_else(|| RuntimeError::BadArgument("one argument expected".to_string()))?;
    let kind = args
        .kind
        .ok_or_else(|| RuntimeError::BadArgument("unspecified search type".to_string()))?;
    let listing = args.var.is_none();
    let request = SearchRequest {
        key: SearchKey::new(kind, key),
        var: args.var,
        no_floppy: args.no_floppy,
        hints: args.hints,
    };
    let found = resolve(ctx.devices, &request, ctx.state.vars.as_mut())?;
    if !listing {
        return Ok(CommandResult::success(String::new()));
    }
    let mut line: String = found.iter().map(|name| format!(" {name}")).collect();
    line.push('\n');
    Ok(CommandResult::success(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::types::test_support::Harness;
    use crate::disk::MemDisk;
    use crate::interpreter::ErrorKind;
    use crate::partition::test_images::write_mbr;
    use std::rc::Rc;

    fn harness() -> Harness {
        let mut h = Harness::new();
        for name in ["hd0", "hd1"] {
            let mut disk = MemDisk::zeroed(name, 256);
            write_mbr(&mut disk, 0, &[(0x83, 8, 100), (0x83, 120, 100)]);
            h.devices.register_disk(Rc::new(disk));
        }
        h.fs.format("hd0,msdos1", "ext2", Some("AAAA-0001"), Some("boot"));
        h.fs.format("hd1,msdos2", "ext2", Some("bbbb-0002"), Some("boot"));
        h.fs.write_file("hd1,msdos2", "/vmlinuz", b"k").unwrap();
        h
    }

    #[test]
    fn test_set_defaults_to_root() {
        let mut h = harness();
        let result = h.run(&SearchCommand, &["--fs-uuid", "--set", "aaaa-0001"]);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "");
        assert_eq!(h.state.vars.get("root").as_deref(), Some("hd0,msdos1"));
    }

    #[test]
    fn test_set_named_variable() {
        let mut h = harness();
        let result = h.run(&SearchCommand, &["--file", "--set=kdev", "/vmlinuz"]);
        assert_eq!(result.exit_code, 0);
        assert_eq!(h.state.vars.get("kdev").as_deref(), Some("hd1,msdos2"));
        assert_eq!(h.state.vars.get("root"), None);
    }

    #[test]
    fn test_list_mode_prints_every_match() {
        let mut h = harness();
        let result = h.run(&SearchCommand, &["--label", "boot"]);
        assert_eq!(result.stdout, " hd0,msdos1 hd1,msdos2\n");
    }

    #[test]
    fn test_hint_is_tried_first() {
        let mut h = harness();
        let result = h.run(&SearchCommand, &["-l", "-s", "--hint=hd1,msdos2", "boot"]);
        assert_eq!(result.exit_code, 0);
        assert_eq!(h.state.vars.get("root").as_deref(), Some("hd1,msdos2"));
    }

    #[test]
    fn test_no_match_reports_key() {
        let mut h = harness();
        let result = h.run(&SearchCommand, &["--fs-uuid", "--set=foo", "nonexistent-uuid"]);
        assert_eq!(result.exit_code, ErrorKind::FileNotFound.code());
        assert_eq!(result.stderr, "error: no such device: nonexistent-uuid.\n");
        assert_eq!(h.state.vars.get("foo"), None);
    }

    #[yare::parameterized(
        no_key = { &["--label"] },
        no_kind = { &["boot"] },
        two_keys = { &["--label", "a", "b"] },
        unknown_option = { &["--label", "--bogus", "boot"] },
        hint_without_value = { &["--label", "boot", "--hint"] },
    )]
    fn test_bad_arguments(args: &[&str]) {
        let mut h = harness();
        assert_eq!(h.run(&SearchCommand, args).exit_code, ErrorKind::BadArgument.code());
    }
}
