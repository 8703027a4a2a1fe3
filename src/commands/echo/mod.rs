// src/commands/echo/mod.rs
use crate::commands::{Command, CommandContext, CommandResult};

pub struct EchoCommand;

impl Command for EchoCommand {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn execute(&self, ctx: CommandContext<'_>) -> CommandResult {
        let args = &ctx.args;
        let mut no_newline = false;
        let mut interpret_escapes = false;
        let mut start_index = 0;

        // Flags are only recognised before the first word.
        while start_index < args.len() {
            match args[start_index].as_str() {
                "-n" => no_newline = true,
                "-e" => interpret_escapes = true,
                "-ne" | "-en" => {
                    no_newline = true;
                    interpret_escapes = true;
                }
                _ => break,
            }
            start_index += 1;
        }

        let mut output: String = args[start_index..].join(" ");

        if interpret_escapes {
            let result = process_escapes(&output);
            output = result.output;
            if result.stop {
                return CommandResult::success(output);
            }
        }

        if !no_newline {
            output.push('\n');
        }

        CommandResult::success(output)
    }
}

/// Result of processing escape sequences
struct EscapeResult {
    output: String,
    stop: bool,
}

/// Process `echo -e` escape sequences
fn process_escapes(input: &str) -> EscapeResult {
    let mut result = String::new();
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            None => result.push('\\'),
            Some('\\') => result.push('\\'),
            Some('a') => result.push('\x07'),
            Some('f') => result.push('\x0c'),
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('v') => result.push('\x0b'),
            Some('c') => {
                // \c stops output and suppresses trailing newline
                return EscapeResult { output: result, stop: true };
            }
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
        }
    }

    EscapeResult { output: result, stop: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::types::test_support::Harness;

    fn echo(args: &[&str]) -> String {
        Harness::new().run(&EchoCommand, args).stdout
    }

    #[test]
    fn test_echo_joins_with_spaces() {
        assert_eq!(echo(&["hello", "world"]), "hello world\n");
        assert_eq!(echo(&[]), "\n");
    }

    #[test]
    fn test_echo_no_newline() {
        assert_eq!(echo(&["-n", "hi"]), "hi");
    }

    #[test]
    fn test_echo_escapes_only_with_e() {
        assert_eq!(echo(&["a\\tb"]), "a\\tb\n");
        assert_eq!(echo(&["-e", "a\\tb\\n"]), "a\tb\n\n");
        assert_eq!(echo(&["-e", "keep\\q"]), "keep\\q\n");
    }

    #[test]
    fn test_echo_backslash_c_stops_output() {
        assert_eq!(echo(&["-e", "abc\\cdef"]), "abc");
    }

    #[test]
    fn test_flags_after_words_are_text() {
        assert_eq!(echo(&["x", "-n"]), "x -n\n");
    }
}
