// src/commands/ls/mod.rs
use crate::commands::{Command, CommandContext, CommandResult};
use crate::disk::context::split_device_path;
use crate::disk::DeviceContext;
use crate::fs::{FsError, FsInfo};
use crate::interpreter::errors::RuntimeError;

/// `ls` lists devices; `ls (dev)` describes one; `ls (dev)/dir` lists files.
pub struct LsCommand;

struct LsOptions {
    show_all: bool,
    long_format: bool,
}

fn describe(name: &str, info: Option<&FsInfo>) -> String {
    let Some(info) = info else {
        return format!("Device {name}: No known filesystem detected\n");
    };
    let mut line = format!("Device {name}: Filesystem type {}", info.fs_type);
    if let Some(label) = &info.label {
        line.push_str(&format!(" - Label `{label}'"));
    }
    if let Some(uuid) = &info.uuid {
        line.push_str(&format!(" - UUID {uuid}"));
    }
    line.push('\n');
    line
}

fn list_devices(devices: &DeviceContext, opts: &LsOptions) -> String {
    let names = devices.device_names();
    if opts.long_format {
        return names
            .iter()
            .map(|name| describe(name, devices.fs().probe(name, true).as_ref()))
            .collect();
    }
    let mut out: String = names.iter().map(|name| format!("({name}) ")).collect();
    out.push('\n');
    out
}

fn list_path(
    devices: &DeviceContext,
    root: Option<&str>,
    arg: &str,
    opts: &LsOptions,
) -> Result<String, RuntimeError> {
    let (device, path) = match split_device_path(arg) {
        (Some(device), path) => (device.to_string(), path),
        (None, path) => match root.filter(|r| !r.is_empty()) {
            Some(root) => (root.to_string(), path),
            None => return Err(RuntimeError::BadArgument("no device specified".to_string())),
        },
    };
    devices.open(&device)?;

    if path.is_empty() {
        return Ok(describe(&device, devices.fs().probe(&device, true).as_ref()));
    }

    let entries = match devices.fs().read_dir(&device, path) {
        Ok(entries) => entries,
        // A plain file lists as itself.
        Err(FsError::NotDirectory { .. }) => return Ok(format!("{path}\n")),
        Err(err) => return Err(err.into()),
    };
    let mut out = String::new();
    for entry in entries {
        if !opts.show_all && entry.name.starts_with('.') {
            continue;
        }
        let suffix = if entry.is_directory { "/" } else { "" };
        if opts.long_format {
            let kind = if entry.is_directory { "DIR" } else { "FILE" };
            out.push_str(&format!("{kind:<5} {}{suffix}\n", entry.name));
        } else {
            out.push_str(&format!("{}{suffix} ", entry.name));
        }
    }
    if !opts.long_format {
        out.push('\n');
    }
    Ok(out)
}

impl Command for LsCommand {
    fn name(&self) -> &'static str {
        "ls"
    }

    fn execute(&self, ctx: CommandContext<'_>) -> CommandResult {
        let mut opts = LsOptions { show_all: false, long_format: false };
        let mut paths: Vec<&str> = Vec::new();

        for arg in &ctx.args {
            match arg.as_str() {
                "-a" | "--all" => opts.show_all = true,
                "-l" | "--long" => opts.long_format = true,
                "-la" | "-al" => {
                    opts.long_format = true;
                    opts.show_all = true;
                }
                other if other.starts_with('-') => {
                    return CommandResult::from_error(RuntimeError::BadArgument(format!(
                        "unrecognized option `{other}'"
                    )));
                }
                other => paths.push(other),
            }
        }

        if paths.is_empty() {
            return CommandResult::success(list_devices(ctx.devices, &opts));
        }

        let root = ctx.state.vars.get("root");
        let mut stdout = String::new();
        for path in paths {
            match list_path(ctx.devices, root.as_deref(), path, &opts) {
                Ok(out) => stdout.push_str(&out),
                Err(err) => {
                    return CommandResult::with_exit_code(stdout, err.report(), err.exit_code());
                }
            }
        }
        CommandResult::success(stdout)
    }
}
