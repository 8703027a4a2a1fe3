//! Word Expansion
//!
//! Turns a command's [`ArgList`] into a flat argv:
//! - Variables (`$name`, `${name}`, `$?`, `$#`, `$1`.., `$@`, `$*`)
//! - Gettext strings (`$"..."`), translated and then interpolated
//! - Block arguments, kept as `{text}` with the parsed script alongside
//! - Field splitting of unquoted expansions on the configured separators
//! - Wildcards in unquoted text, through the registered translator
//!
//! An unset variable expands to nothing. A pattern the translator rejects
//! fails the statement; a pattern with no matches stays as written.

use crate::ast::types::{ArgList, ArgType, Argument, ScriptRef};
use crate::disk::DeviceContext;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::types::InterpreterState;
use crate::shell::glob_helpers::{escape_glob, has_glob_chars};

/// Result of expanding a command's arguments.
#[derive(Debug, Clone, Default)]
pub struct ExpandedArgs {
    pub argv: Vec<String>,
    /// Script of the last block argument, if any.
    pub block: Option<ScriptRef>,
}

#[derive(Debug, Default)]
struct Field {
    text: String,
    /// `text` with quoted characters escaped, for the wildcard translator.
    pattern: String,
    glob: bool,
}

/// Accumulates fields for one command line.
struct Fields<'s> {
    ifs: &'s str,
    done: Vec<Field>,
    current: Option<Field>,
}

impl<'s> Fields<'s> {
    fn new(ifs: &'s str) -> Self {
        Self { ifs, done: Vec::new(), current: None }
    }

    fn current(&mut self) -> &mut Field {
        self.current.get_or_insert_with(Field::default)
    }

    fn push_quoted(&mut self, text: &str) {
        let field = self.current();
        field.text.push_str(text);
        field.pattern.push_str(&escape_glob(text));
    }

    fn push_unquoted(&mut self, text: &str) {
        let field = self.current();
        field.text.push_str(text);
        field.pattern.push_str(text);
        if has_glob_chars(text) {
            field.glob = true;
        }
    }

    /// Unquoted expansion: separators end the current field.
    fn push_split(&mut self, value: &str) {
        let mut buf = [0u8; 4];
        for c in value.chars() {
            if self.ifs.contains(c) {
                self.finish();
            } else {
                self.push_unquoted(c.encode_utf8(&mut buf));
            }
        }
    }

    fn finish(&mut self) {
        if let Some(field) = self.current.take() {
            self.done.push(field);
        }
    }

    fn into_fields(mut self) -> Vec<Field> {
        self.finish();
        self.done
    }
}

/// Value of a single variable reference; `None` when unset.
pub fn lookup_variable(state: &InterpreterState, name: &str) -> Option<String> {
    match name {
        "?" => Some(state.last_status.to_string()),
        "#" => Some(state.params().len().to_string()),
        "@" | "*" => Some(state.params().join(" ")),
        _ if !name.is_empty() && name.chars().all(|c| c.is_ascii_digit()) => {
            let index: usize = name.parse().ok()?;
            if index == 0 {
                return None;
            }
            state.params().get(index - 1).cloned()
        }
        _ => state.vars.get(name),
    }
}

/// Replace `$name` and `${name}` references inside already-quoted text.
pub fn interpolate(state: &InterpreterState, text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '$' || i + 1 >= chars.len() {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let (name, next) = if chars[i + 1] == '{' {
            match chars[i + 2..].iter().position(|&c| c == '}') {
                Some(len) => (chars[i + 2..i + 2 + len].iter().collect::<String>(), i + 3 + len),
                None => (String::new(), i),
            }
        } else if matches!(chars[i + 1], '?' | '#' | '@' | '*') || chars[i + 1].is_ascii_digit() {
            (chars[i + 1].to_string(), i + 2)
        } else {
            let len = chars[i + 1..]
                .iter()
                .take_while(|c| c.is_ascii_alphanumeric() || **c == '_')
                .count();
            (chars[i + 1..i + 1 + len].iter().collect(), i + 1 + len)
        };
        if name.is_empty() {
            out.push('$');
            i += 1;
            continue;
        }
        if let Some(value) = lookup_variable(state, &name) {
            out.push_str(&value);
        }
        i = next;
    }
    out
}

fn expand_argument(
    state: &InterpreterState,
    arg: &Argument,
    fields: &mut Fields<'_>,
    block: &mut Option<ScriptRef>,
) {
    for part in &arg.parts {
        match part.arg_type {
            ArgType::Text => fields.push_unquoted(&part.text),
            ArgType::SqStr | ArgType::DqStr => fields.push_quoted(&part.text),
            ArgType::Var => match part.text.as_str() {
                "@" | "*" => {
                    for (i, param) in state.params().iter().enumerate() {
                        if i > 0 {
                            fields.finish();
                        }
                        fields.push_split(param);
                    }
                }
                name => {
                    if let Some(value) = lookup_variable(state, name) {
                        fields.push_split(&value);
                    }
                }
            },
            ArgType::DqVar => match part.text.as_str() {
                "@" => {
                    for (i, param) in state.params().iter().enumerate() {
                        if i > 0 {
                            fields.finish();
                        }
                        fields.push_quoted(param);
                    }
                }
                name => {
                    let value = lookup_variable(state, name).unwrap_or_default();
                    fields.push_quoted(&value);
                }
            },
            ArgType::Gettext => {
                let translated = state.translate(&part.text);
                fields.push_quoted(&interpolate(state, &translated));
            }
            ArgType::Block => {
                fields.push_quoted(&format!("{{{}}}", part.text));
                if let Some(script) = &part.script {
                    *block = Some(script.clone());
                }
            }
        }
    }
}

/// Expand every argument of a command line.
pub fn expand_arglist(
    state: &InterpreterState,
    devices: &DeviceContext,
    arglist: &ArgList,
) -> Result<ExpandedArgs, RuntimeError> {
    let mut expanded = ExpandedArgs::default();
    let mut fields = Fields::new(&state.ifs);
    for arg in &arglist.args {
        expand_argument(state, arg, &mut fields, &mut expanded.block);
        fields.finish();
    }

    let root = state.vars.get("root");
    for field in fields.into_fields() {
        let translator = state.wildcard.as_ref().filter(|_| field.glob);
        let Some(translator) = translator else {
            expanded.argv.push(field.text);
            continue;
        };
        let matches = translator.expand(&field.pattern, devices, root.as_deref())?;
        if matches.is_empty() {
            expanded.argv.push(field.text);
        } else {
            expanded.argv.extend(matches);
        }
    }
    Ok(expanded)
}
