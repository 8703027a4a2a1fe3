//! Glob Helper Functions
//!
//! Pattern handling shared by word expansion and the wildcard translator.
//! Patterns use backslash to quote a metacharacter: word expansion escapes
//! every character that came from a quoted fragment, so only unquoted `*`,
//! `?` and `[` reach the translator as wildcards.
//!
//! ## Functions
//!
//! - `has_glob_chars`: Whether a pattern has an unescaped wildcard
//! - `escape_glob` / `unescape_glob`: Quote and unquote metacharacters
//! - `glob_to_regex`: Convert a pattern to an anchored regex where wildcards
//!   stop at a separator character

use std::collections::HashMap;

use crate::interpreter::errors::GlobError;

lazy_static::lazy_static! {
    /// Valid POSIX character class names mapped to regex equivalents.
    static ref POSIX_CLASSES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("alnum", "a-zA-Z0-9");
        m.insert("alpha", "a-zA-Z");
        m.insert("blank", " \\t");
        m.insert("digit", "0-9");
        m.insert("lower", "a-z");
        m.insert("punct", "!-/:-@\\[-`{-~");
        m.insert("space", " \\t\\n\\r\\f\\v");
        m.insert("upper", "A-Z");
        m.insert("xdigit", "0-9A-Fa-f");
        m
    };
}

fn is_glob_char(c: char) -> bool {
    matches!(c, '*' | '?' | '[')
}

/// True when `pattern` holds a wildcard that is not backslash-escaped.
pub fn has_glob_chars(pattern: &str) -> bool {
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if is_glob_char(c) {
            return true;
        }
    }
    false
}

/// Quote every character that would otherwise be special in a pattern.
pub fn escape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '(' | ')' | ',' | '/') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Drop the quoting backslashes, giving the literal text.
pub fn unescape_glob(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Index of the first unescaped `target` at or after `from`.
pub fn find_unescaped(pattern: &str, target: char, from: usize) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in pattern.char_indices().skip_while(|(i, _)| *i < from) {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == target {
            return Some(i);
        }
    }
    None
}

/// Convert a glob pattern to an anchored regex string.
///
/// `*` and `?` never match `separator`. An unterminated bracket expression is
/// an error rather than a literal `[`.
pub fn glob_to_regex(pattern: &str, separator: char) -> Result<String, GlobError> {
    let sep = regex_escape_char(separator);
    let mut regex = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\\' && i + 1 < chars.len() {
            push_literal(&mut regex, chars[i + 1]);
            i += 2;
        } else if c == '*' {
            regex.push_str(&format!("[^{}]*", sep));
            i += 1;
        } else if c == '?' {
            regex.push_str(&format!("[^{}]", sep));
            i += 1;
        } else if c == '[' {
            let class_end = find_bracket_end(&chars, i)
                .ok_or_else(|| GlobError::new(pattern, "unterminated `['"))?;
            let class_content: String = chars[i + 1..class_end].iter().collect();
            regex.push_str(&convert_char_class(&class_content));
            i = class_end + 1;
        } else {
            push_literal(&mut regex, c);
            i += 1;
        }
    }

    regex.push('$');
    Ok(regex)
}

// ---------------------------------------------------------------------------
// Private helper functions
// ---------------------------------------------------------------------------

/// Check if a character is a regex special character that needs escaping.
fn is_regex_special(c: char) -> bool {
    "\\^$.|+(){}[]*?".contains(c)
}

fn regex_escape_char(c: char) -> String {
    if is_regex_special(c) {
        format!("\\{}", c)
    } else {
        c.to_string()
    }
}

fn push_literal(regex: &mut String, c: char) {
    if is_regex_special(c) {
        regex.push('\\');
    }
    regex.push(c);
}

/// Index of the `]` closing the bracket expression opened at `start`.
///
/// A `]` right after `[`, `[!` or `[^` is literal, as are escaped characters.
/// POSIX classes `[:name:]` are skipped whole.
fn find_bracket_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;

    if i < chars.len() && (chars[i] == '!' || chars[i] == '^') {
        i += 1;
    }
    if i < chars.len() && chars[i] == ']' {
        i += 1;
    }

    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() {
            i += 2;
            continue;
        }
        if chars[i] == ']' {
            return Some(i);
        }
        if chars[i] == '[' && i + 1 < chars.len() && chars[i + 1] == ':' {
            let rest: String = chars[i + 2..].iter().collect();
            if let Some(close_pos) = rest.find(":]") {
                i = i + 2 + close_pos + 2;
                continue;
            }
        }
        i += 1;
    }

    None
}

/// Convert the content inside a shell character class `[...]` to a regex
/// character class. The input is the content between `[` and `]` (exclusive).
fn convert_char_class(content: &str) -> String {
    let mut result = String::from("[");
    let chars: Vec<char> = content.chars().collect();
    let mut i = 0;

    if !chars.is_empty() && (chars[0] == '!' || chars[0] == '^') {
        result.push('^');
        i += 1;
    }

    while i < chars.len() {
        if chars[i] == '[' && i + 1 < chars.len() && chars[i + 1] == ':' {
            let rest: String = chars[i + 2..].iter().collect();
            if let Some(close_pos) = rest.find(":]") {
                let class_name: String = chars[i + 2..i + 2 + close_pos].iter().collect();
                if let Some(expansion) = POSIX_CLASSES.get(class_name.as_str()) {
                    result.push_str(expansion);
                }
                i = i + 2 + close_pos + 2;
                continue;
            }
        }

        if chars[i] == '\\' && i + 1 < chars.len() {
            push_literal(&mut result, chars[i + 1]);
            i += 2;
            continue;
        }

        // Literal inside a glob class but special to the regex engine.
        if chars[i] == '[' || chars[i] == ']' || (chars[i] == '^' && i > 0) {
            result.push('\\');
        }
        result.push(chars[i]);
        i += 1;
    }

    result.push(']');
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex_lite::Regex;
    use yare::parameterized;

    fn matches(pattern: &str, sep: char, text: &str) -> bool {
        let regex = glob_to_regex(pattern, sep).unwrap();
        Regex::new(&regex).unwrap().is_match(text)
    }

    #[parameterized(
        star_in_disk = { "hd*", "hd0", true },
        star_stops_at_comma = { "hd*", "hd0,msdos1", false },
        partitions = { "hd*,*", "hd0,msdos1", true },
        partitions_not_disks = { "hd*,*", "hd0", false },
        question = { "hd?", "hd1", true },
        question_one_char = { "hd?", "hd10", false },
        class = { "hd[01]", "hd1", true },
        negated_class = { "hd[!01]", "hd1", false },
        posix_class = { "hd[[:digit:]],msdos1", "hd7,msdos1", true },
        escaped_star = { "hd\\*", "hd*", true },
        escaped_star_literal = { "hd\\*", "hd0", false },
        regex_chars_literal = { "md/0.1", "md/0.1", true },
        dot_not_wild = { "md/0.1", "md/0x1", false },
    )]
    fn test_device_patterns(pattern: &str, text: &str, expected: bool) {
        assert_eq!(matches(pattern, ',', text), expected);
    }

    #[test]
    fn test_unterminated_bracket_is_error() {
        let err = glob_to_regex("hd[0", ',').unwrap_err();
        assert_eq!(err.pattern, "hd[0");
    }

    #[test]
    fn test_literal_bracket_first_in_class() {
        assert!(matches("[]a]", '/', "]"));
        assert!(matches("[]a]", '/', "a"));
    }

    #[test]
    fn test_has_glob_chars() {
        assert!(has_glob_chars("vmlinuz*"));
        assert!(has_glob_chars("(hd?)"));
        assert!(!has_glob_chars("vmlinuz\\*"));
        assert!(!has_glob_chars("/boot/grub"));
    }

    #[test]
    fn test_escape_round_trip() {
        let text = "a*b?(c)[d],e/f\\";
        assert!(!has_glob_chars(&escape_glob(text)));
        assert_eq!(unescape_glob(&escape_glob(text)), text);
    }

    #[test]
    fn test_find_unescaped() {
        assert_eq!(find_unescaped("(hd0)/x", ')', 0), Some(4));
        assert_eq!(find_unescaped("(a\\)b)", ')', 0), Some(5));
        assert_eq!(find_unescaped("(hd0", ')', 0), None);
        assert_eq!(find_unescaped("a/b/c", '/', 2), Some(3));
    }
}
