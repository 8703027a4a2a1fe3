// src/commands/test_cmd/mod.rs
use crate::commands::{Command, CommandContext, CommandResult};
use crate::disk::context::split_device_path;
use crate::fs::FsProbe;
use crate::interpreter::errors::RuntimeError;

pub struct TestCommand;

impl Command for TestCommand {
    fn name(&self) -> &'static str {
        "test"
    }

    fn execute(&self, ctx: CommandContext<'_>) -> CommandResult {
        let args: Vec<&str> = ctx.args.iter().map(String::as_str).collect();
        run_test(&args, &ctx)
    }
}

// Same evaluator; the closing bracket is mandatory.
pub struct BracketCommand;

impl Command for BracketCommand {
    fn name(&self) -> &'static str {
        "["
    }

    fn execute(&self, ctx: CommandContext<'_>) -> CommandResult {
        if ctx.args.last().map(String::as_str) != Some("]") {
            return CommandResult::from_error(RuntimeError::BadArgument("missing `]'".to_string()));
        }
        let args: Vec<&str> = ctx.args[..ctx.args.len() - 1].iter().map(String::as_str).collect();
        run_test(&args, &ctx)
    }
}

fn run_test(args: &[&str], ctx: &CommandContext<'_>) -> CommandResult {
    if args.is_empty() {
        return CommandResult::status(false);
    }
    let root = ctx.state.vars.get("root");
    let files = FileTests { fs: ctx.devices.fs(), root: root.as_deref() };
    CommandResult::status(evaluate_expression(args, &files))
}

/// Resolves `(dev)/path` operands, falling back to `root` for bare paths.
struct FileTests<'a> {
    fs: &'a dyn FsProbe,
    root: Option<&'a str>,
}

impl FileTests<'_> {
    fn locate<'p>(&'p self, operand: &'p str) -> Option<(&'p str, &'p str)> {
        match split_device_path(operand) {
            (Some(device), path) => Some((device, path)),
            (None, path) => self.root.filter(|r| !r.is_empty()).map(|root| (root, path)),
        }
    }

    fn exists(&self, operand: &str) -> bool {
        match self.locate(operand) {
            Some((device, "")) => self.fs.probe(device, true).is_some(),
            Some((device, path)) => self.fs.exists(device, path, true),
            None => false,
        }
    }

    fn is_directory(&self, operand: &str) -> bool {
        match self.locate(operand) {
            Some((device, "")) => self.fs.probe(device, true).is_some(),
            Some((device, path)) => self.fs.read_dir(device, path).is_ok(),
            None => false,
        }
    }

    fn is_file(&self, operand: &str) -> bool {
        self.exists(operand) && !self.is_directory(operand)
    }
}

fn number(text: &str) -> i64 {
    text.trim().parse().unwrap_or(0)
}

fn evaluate_expression(args: &[&str], files: &FileTests<'_>) -> bool {
    // A single argument is true when non-empty.
    if args.len() == 1 {
        return !args[0].is_empty();
    }

    if args[0] == "!" {
        return !evaluate_expression(&args[1..], files);
    }

    // -o binds looser than -a, so split on it first.
    if args.len() >= 3 {
        for op in ["-o", "-a"] {
            if let Some(i) = args[1..args.len() - 1].iter().position(|a| *a == op).map(|i| i + 1) {
                let left = evaluate_expression(&args[..i], files);
                let right = evaluate_expression(&args[i + 1..], files);
                return if op == "-o" { left || right } else { left && right };
            }
        }
    }

    if args.len() == 3 {
        let (left, op, right) = (args[0], args[1], args[2]);
        match op {
            "=" | "==" => return left == right,
            "!=" => return left != right,
            "<" => return left < right,
            ">" => return left > right,
            "-eq" => return number(left) == number(right),
            "-ne" => return number(left) != number(right),
            "-lt" => return number(left) < number(right),
            "-le" => return number(left) <= number(right),
            "-gt" => return number(left) > number(right),
            "-ge" => return number(left) >= number(right),
            _ => {}
        }
    }

    if args.len() == 2 {
        let (op, operand) = (args[0], args[1]);
        match op {
            "-z" => return operand.is_empty(),
            "-n" => return !operand.is_empty(),
            "-e" => return files.exists(operand),
            "-f" => return files.is_file(operand),
            "-d" => return files.is_directory(operand),
            _ => {}
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::types::test_support::Harness;
    use crate::interpreter::ErrorKind;
    use yare::parameterized;

    fn harness() -> Harness {
        let h = Harness::new();
        h.fs.format("hd0,msdos1", "ext2", Some("1234"), None);
        h.fs.write_file("hd0,msdos1", "/boot/vmlinuz", b"kernel").unwrap();
        h
    }

    fn status(args: &[&str]) -> i32 {
        harness().run(&TestCommand, args).exit_code
    }

    #[test]
    fn test_empty_args() {
        assert_eq!(status(&[]), 1);
    }

    #[parameterized(
        single_nonempty = { &["hello"], 0 },
        single_empty = { &[""], 1 },
        string_equal = { &["a", "=", "a"], 0 },
        string_double_equal = { &["a", "==", "b"], 1 },
        string_not_equal = { &["a", "!=", "b"], 0 },
        numeric_eq = { &["5", "-eq", "5"], 0 },
        numeric_lt = { &["3", "-lt", "5"], 0 },
        numeric_ge = { &["3", "-ge", "5"], 1 },
        z_empty = { &["-z", ""], 0 },
        n_nonempty = { &["-n", "x"], 0 },
        negation = { &["!", "-z", "x"], 0 },
        and = { &["a", "-a", ""], 1 },
        or = { &["", "-o", "a"], 0 },
        or_looser_than_and = { &["a", "-o", "", "-a", ""], 0 },
    )]
    fn test_expressions(args: &[&str], expected: i32) {
        assert_eq!(status(args), expected);
    }

    #[parameterized(
        file_exists = { &["-e", "(hd0,msdos1)/boot/vmlinuz"], 0 },
        file_missing = { &["-e", "(hd0,msdos1)/boot/initrd"], 1 },
        is_file = { &["-f", "(hd0,msdos1)/boot/vmlinuz"], 0 },
        dir_not_file = { &["-f", "(hd0,msdos1)/boot"], 1 },
        is_dir = { &["-d", "(hd0,msdos1)/boot"], 0 },
        device_root_is_dir = { &["-d", "(hd0,msdos1)"], 0 },
        unknown_device = { &["-e", "(hd9)/boot"], 1 },
    )]
    fn test_file_tests(args: &[&str], expected: i32) {
        assert_eq!(status(args), expected);
    }

    #[test]
    fn test_bare_path_uses_root() {
        let mut h = harness();
        assert_eq!(h.run(&TestCommand, &["-e", "/boot/vmlinuz"]).exit_code, 1);
        h.state.vars.set("root", "hd0,msdos1");
        assert_eq!(h.run(&TestCommand, &["-e", "/boot/vmlinuz"]).exit_code, 0);
    }

    #[test]
    fn test_bracket_requires_closing() {
        let mut h = harness();
        assert_eq!(h.run(&BracketCommand, &["a", "=", "a", "]"]).exit_code, 0);
        let result = h.run(&BracketCommand, &["a", "=", "a"]);
        assert_eq!(result.exit_code, ErrorKind::BadArgument.code());
        assert_eq!(result.stderr, "error: missing `]'.\n");
    }
}
