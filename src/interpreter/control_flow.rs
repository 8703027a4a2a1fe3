//! Control Flow Helpers
//!
//! Shared by the loop constructs and the `break`/`continue`/`return`/`shift`
//! commands.

use regex_lite::Regex;

use crate::interpreter::errors::RuntimeError;

lazy_static::lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap();
}

/// Validate that a variable name is a valid identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Optional decimal count argument, `default` when absent.
pub fn parse_count(args: &[String], default: u32) -> Result<u32, RuntimeError> {
    match args {
        [] => Ok(default),
        [arg] => arg
            .parse::<u32>()
            .map_err(|_| RuntimeError::BadNumber(arg.clone())),
        _ => Err(RuntimeError::BadArgument("too many arguments".to_string())),
    }
}

/// Loop count for `break`/`continue`, clamped to the loops actually open.
/// Zero means there is nothing to leave.
pub fn loop_levels(command: &str, args: &[String], loop_depth: u32) -> Result<u32, RuntimeError> {
    let count = parse_count(args, 1)?;
    if count == 0 {
        return Err(RuntimeError::BadArgument(format!("can't {command} 0 loops")));
    }
    Ok(count.min(loop_depth))
}
