//! Wildcard Translator
//!
//! Expands unquoted wildcard words. One pattern may glob over devices and
//! files at once: `(hd*,*)/vmlinuz*` first matches device names against the
//! parenthesised part, then walks each matching device's filesystem for the
//! path part. A bare path is looked up on the `root` device.

use std::ops::ControlFlow;
use std::rc::Rc;

use glob::{MatchOptions, Pattern};
use regex_lite::Regex;
use tracing::debug;

use crate::disk::{Disk, DeviceContext};
use crate::fs::FsProbe;
use crate::interpreter::errors::GlobError;
use crate::shell::glob_helpers::{find_unescaped, glob_to_regex, has_glob_chars, unescape_glob};

/// Pluggable expansion hook. An empty result means "no match"; the caller
/// then keeps the word as written.
pub trait WildcardTranslator {
    fn expand(
        &self,
        pattern: &str,
        devices: &DeviceContext,
        root: Option<&str>,
    ) -> Result<Vec<String>, GlobError>;
}

/// Default translator over the device table and [`FsProbe`] directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceWildcard;

impl DeviceWildcard {
    pub fn new() -> Self {
        Self
    }
}

impl WildcardTranslator for DeviceWildcard {
    fn expand(
        &self,
        pattern: &str,
        devices: &DeviceContext,
        root: Option<&str>,
    ) -> Result<Vec<String>, GlobError> {
        let (device, path) = split_pattern(pattern)?;

        let Some(device) = device else {
            let Some(root) = root.filter(|r| !r.is_empty()) else {
                return Ok(Vec::new());
            };
            return match_paths(devices.fs(), root, path, pattern);
        };

        let names = if has_glob_chars(device) {
            match_devices(devices, device, pattern)?
        } else {
            let name = unescape_glob(device);
            if devices.open(&name).is_err() {
                return Ok(Vec::new());
            }
            vec![name]
        };

        if path.is_empty() {
            return Ok(names.iter().map(|name| format!("({})", name)).collect());
        }

        let mut results = Vec::new();
        for name in &names {
            for file in match_paths(devices.fs(), name, path, pattern)? {
                results.push(format!("({}){}", name, file));
            }
        }
        Ok(results)
    }
}

/// Split off a leading `(device)` part.
fn split_pattern(pattern: &str) -> Result<(Option<&str>, &str), GlobError> {
    if !pattern.starts_with('(') {
        return Ok((None, pattern));
    }
    let close = find_unescaped(pattern, ')', 1)
        .ok_or_else(|| GlobError::new(pattern, "unmatched `('"))?;
    Ok((Some(&pattern[1..close]), &pattern[close + 1..]))
}

fn match_devices(
    devices: &DeviceContext,
    device_pattern: &str,
    pattern: &str,
) -> Result<Vec<String>, GlobError> {
    let regex = glob_to_regex(device_pattern, ',')
        .map_err(|e| GlobError::new(pattern, e.reason))?;
    let regex = Regex::new(&regex).map_err(|e| GlobError::new(pattern, e.to_string()))?;

    let mut names = Vec::new();
    devices.iterate_devices(&mut |name: &str, _disk: &Rc<dyn Disk>| {
        if regex.is_match(name) {
            names.push(name.to_string());
        }
        ControlFlow::Continue(())
    });
    debug!(pattern = device_pattern, matches = names.len(), "device wildcard");
    Ok(names)
}

/// Files on `device` matching `path`, one directory level per component.
fn match_paths(
    fs: &dyn FsProbe,
    device: &str,
    path: &str,
    pattern: &str,
) -> Result<Vec<String>, GlobError> {
    let components = split_components(path);
    let trailing_slash = path.len() > 1 && path.ends_with('/') && !path.ends_with("\\/");
    let relative = !path.starts_with('/');

    let mut prefixes = vec![String::new()];
    for (i, component) in components.iter().enumerate() {
        let last = i + 1 == components.len();
        let mut next = Vec::new();

        if has_glob_chars(component) {
            let matcher = component_pattern(component)
                .map_err(|e| GlobError::new(pattern, e.to_string()))?;
            let options = MatchOptions {
                case_sensitive: true,
                require_literal_separator: false,
                require_literal_leading_dot: true,
            };
            for prefix in &prefixes {
                let dir = if prefix.is_empty() { "/" } else { prefix.as_str() };
                let Ok(entries) = fs.read_dir(device, dir) else {
                    continue;
                };
                for entry in entries {
                    if (last || entry.is_directory) && matcher.matches_with(&entry.name, options) {
                        next.push(format!("{}/{}", prefix, entry.name));
                    }
                }
            }
        } else {
            let literal = unescape_glob(component);
            for prefix in &prefixes {
                next.push(format!("{}/{}", prefix, literal));
            }
        }

        prefixes = next;
        if prefixes.is_empty() {
            break;
        }
    }

    Ok(prefixes
        .into_iter()
        .filter(|p| !p.is_empty() && fs.exists(device, p, true))
        .map(|p| {
            // Hand a relative pattern back in the form it was written.
            let p = if relative { p.trim_start_matches('/').to_string() } else { p };
            if trailing_slash {
                format!("{}/", p)
            } else {
                p
            }
        })
        .collect())
}

/// Non-empty `/`-separated components, escapes kept.
fn split_components(path: &str) -> Vec<&str> {
    let mut components = Vec::new();
    let mut start = 0;
    while let Some(slash) = find_unescaped(path, '/', start) {
        if slash > start {
            components.push(&path[start..slash]);
        }
        start = slash + 1;
    }
    if start < path.len() {
        components.push(&path[start..]);
    }
    components
}

/// Backslash escapes become the glob crate's bracket escapes.
fn component_pattern(component: &str) -> Result<Pattern, glob::PatternError> {
    let mut text = String::with_capacity(component.len());
    let mut chars = component.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next) => text.push_str(&Pattern::escape(&next.to_string())),
                None => text.push_str(&Pattern::escape("\\")),
            },
            _ => text.push(c),
        }
    }
    Pattern::new(&text)
}
