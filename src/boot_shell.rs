//! Boot Shell Environment
//!
//! Main entry point for running boot scripts.
//! Ties together the parser, the execution engine, the command registry and
//! the device context.

use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::commands::{create_default_registry, Command, CommandRegistry};
use crate::disk::{Disk, DeviceContext};
use crate::fs::{FsProbe, InMemoryFs};
use crate::interpreter::errors::{ErrorKind, InterpreterError};
use crate::interpreter::functions::call_function;
use crate::interpreter::types::{ExecResult, InterpreterState, Localizer, MenuEntry};
use crate::interpreter::variables::{Environment, VariableStore};
use crate::interpreter::ExecutionEngine;
use crate::parser::{parse, LineSource, ParseException, StrLines};
use crate::shell::{DeviceWildcard, WildcardTranslator};
use crate::ast::types::ScriptRef;

/// Options for creating a boot shell.
#[derive(Default)]
pub struct BootShellOptions {
    /// Initial variables
    pub env: Option<IndexMap<String, String>>,
    /// Variable store (defaults to an in-memory [`Environment`])
    pub vars: Option<Box<dyn VariableStore>>,
    /// Filesystem probe (defaults to an empty [`InMemoryFs`])
    pub fs: Option<Rc<dyn FsProbe>>,
    /// Field separators for unquoted expansions
    pub ifs: Option<String>,
    /// Wildcard translator (defaults to [`DeviceWildcard`])
    pub wildcard: Option<Rc<dyn WildcardTranslator>>,
    /// Translation hook for `$"..."` strings
    pub localizer: Option<Localizer>,
    /// Command registry (defaults to the built-in commands)
    pub commands: Option<CommandRegistry>,
}

/// The boot script environment.
pub struct BootShell {
    state: InterpreterState,
    devices: DeviceContext,
    commands: CommandRegistry,
}

/// Line source wrapper that remembers whether the input ran dry.
struct Tracked<'s> {
    inner: &'s mut dyn LineSource,
    exhausted: bool,
}

impl LineSource for Tracked<'_> {
    fn next_line(&mut self, continuation: bool) -> Option<String> {
        let line = self.inner.next_line(continuation);
        self.exhausted |= line.is_none();
        line
    }
}

impl BootShell {
    pub fn new(options: BootShellOptions) -> Self {
        let vars = options.vars.unwrap_or_else(|| Box::new(Environment::new()));
        let mut state = InterpreterState::new(vars);
        for (name, value) in options.env.unwrap_or_default() {
            state.vars.set(&name, &value);
        }
        if let Some(ifs) = options.ifs {
            state.ifs = ifs;
        }
        state.wildcard = Some(options.wildcard.unwrap_or_else(|| Rc::new(DeviceWildcard::new())));
        state.localizer = options.localizer;

        let fs = options.fs.unwrap_or_else(|| Rc::new(InMemoryFs::new()));
        Self {
            state,
            devices: DeviceContext::new(fs),
            commands: options.commands.unwrap_or_else(create_default_registry),
        }
    }

    /// Execute script text.
    pub fn exec(&mut self, script: &str) -> ExecResult {
        self.exec_source(&mut StrLines::new(script))
    }

    /// Parse every unit `source` yields, then run them in order. A parse
    /// error fails the whole invocation before anything runs.
    pub fn exec_source(&mut self, source: &mut dyn LineSource) -> ExecResult {
        let units = match parse_units(source) {
            Ok(units) => units,
            Err(err) => {
                let code = ErrorKind::InvalidCommand.code();
                self.state.last_status = code;
                return ExecResult::failure_with_code(format!("error: {err}.\n"), code);
            }
        };

        let engine = ExecutionEngine::new(&self.commands);
        let mut result = ExecResult::ok();
        for unit in units {
            match engine.execute_script(&mut self.state, &mut self.devices, &unit) {
                Ok(r) => result.absorb(r),
                Err(InterpreterError::Return(e)) => {
                    result.absorb(ExecResult::new(e.stdout, e.stderr, e.exit_code));
                    break;
                }
                Err(e) => {
                    // execute_script absorbs loop signals.
                    debug!(error = %e, "control flow escaped the top level");
                    break;
                }
            }
        }
        result
    }

    pub fn menu_entries(&self) -> &[MenuEntry] {
        &self.state.menu
    }

    /// Index of the entry whose id, or failing that title, is `key`.
    pub fn find_menu_entry(&self, key: &str) -> Option<usize> {
        let menu = &self.state.menu;
        menu.iter()
            .position(|e| e.id.as_deref() == Some(key))
            .or_else(|| menu.iter().position(|e| e.title == key))
    }

    /// Run a registered entry with its title as `$1` and its arguments after
    /// it. Entering a submenu replaces the current menu with the entries its
    /// block registers.
    pub fn run_menu_entry(&mut self, index: usize) -> Option<ExecResult> {
        let entry = self.state.menu.get(index)?.clone();
        let mut args = vec![entry.title.clone()];
        args.extend(entry.args.iter().cloned());
        if entry.submenu {
            self.state.menu.clear();
        }
        Some(self.call(&entry.script, args))
    }

    fn call(&mut self, script: &ScriptRef, args: Vec<String>) -> ExecResult {
        let engine = ExecutionEngine::new(&self.commands);
        match call_function(&engine, &mut self.state, &mut self.devices, script, args) {
            Ok(result) => result,
            Err(e) => {
                debug!(error = %e, "control flow escaped a menu entry");
                ExecResult::ok()
            }
        }
    }

    pub fn register_command(&mut self, command: Box<dyn Command>) {
        self.commands.register(command);
    }

    pub fn register_disk(&mut self, disk: Rc<dyn Disk>) {
        self.devices.register_disk(disk);
    }

    pub fn devices(&self) -> &DeviceContext {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut DeviceContext {
        &mut self.devices
    }

    pub fn get_var(&self, name: &str) -> Option<String> {
        self.state.vars.get(name)
    }

    pub fn set_var(&mut self, name: &str, value: &str) {
        self.state.vars.set(name, value);
    }

    /// Status of the last statement, `$?`.
    pub fn last_status(&self) -> i32 {
        self.state.last_status
    }

    pub fn state(&self) -> &InterpreterState {
        &self.state
    }
}

impl Default for BootShell {
    fn default() -> Self {
        Self::new(BootShellOptions::default())
    }
}

fn parse_units(source: &mut dyn LineSource) -> Result<Vec<ScriptRef>, ParseException> {
    let mut tracked = Tracked { inner: source, exhausted: false };
    let mut units = Vec::new();
    while !tracked.exhausted {
        let unit = parse(None, Some(&mut tracked))?;
        if unit.cmd().is_some() {
            units.push(unit);
        }
    }
    debug!(units = units.len(), "source parsed");
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandContext, CommandResult};
    use crate::diskfilter::mdraid09::test_images::write_sb09;
    use crate::disk::MemDisk;
    use crate::partition::test_images::write_mbr;
    use std::cell::RefCell;

    fn shell_with_disks() -> (BootShell, InMemoryFs) {
        let fs = InMemoryFs::new();
        let mut shell = BootShell::new(BootShellOptions {
            fs: Some(Rc::new(fs.clone())),
            ..Default::default()
        });
        for name in ["hd0", "hd1"] {
            let mut disk = MemDisk::zeroed(name, 256);
            write_mbr(&mut disk, 0, &[(0x83, 8, 100), (0x83, 120, 100)]);
            shell.register_disk(Rc::new(disk));
        }
        fs.format("hd0,msdos1", "ext2", Some("AAAA-0001"), Some("boot"));
        fs.write_file("hd0,msdos1", "/vmlinuz-6.1", b"k").unwrap();
        fs.write_file("hd0,msdos1", "/vmlinuz-6.6", b"k").unwrap();
        fs.format("hd1,msdos2", "ext2", Some("bbbb-0002"), Some("data"));
        (shell, fs)
    }

    #[test]
    fn test_exec_basic_script() {
        let mut shell = BootShell::default();
        let result = shell.exec("set greeting=hello\necho $greeting world\n");
        assert_eq!(result.stdout, "hello world\n");
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn test_initial_env() {
        let mut env = IndexMap::new();
        env.insert("prefix".to_string(), "/boot/grub".to_string());
        let mut shell = BootShell::new(BootShellOptions {
            env: Some(env),
            ..Default::default()
        });
        assert_eq!(shell.exec("echo $prefix").stdout, "/boot/grub\n");
    }

    #[test]
    fn test_parse_error_runs_nothing() {
        let mut shell = BootShell::default();
        let result = shell.exec("echo first\nif true; then echo x\n");
        assert_eq!(result.stdout, "");
        assert_eq!(result.exit_code, ErrorKind::InvalidCommand.code());
        assert!(result.stderr.starts_with("error: syntax error"));
        assert_eq!(shell.last_status(), ErrorKind::InvalidCommand.code());
    }

    #[test]
    fn test_failing_statement_does_not_stop_script() {
        let mut shell = BootShell::default();
        let result = shell.exec("frobnicate\necho after\n");
        assert_eq!(result.stdout, "after\n");
        assert_eq!(result.stderr, "error: can't find command `frobnicate'.\n");
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn test_line_source_callback() {
        let mut lines = vec!["for x in a b c; do echo $x; done".to_string()].into_iter();
        let mut source = move |_continuation: bool| lines.next();
        let mut shell = BootShell::default();
        assert_eq!(shell.exec_source(&mut source).stdout, "a\nb\nc\n");
    }

    #[test]
    fn test_multi_line_constructs_span_units() {
        let mut shell = BootShell::default();
        let result = shell.exec(
            "function greet {\n  echo hi $1\n}\nif true\nthen\n  greet there\nfi\n",
        );
        assert_eq!(result.stdout, "hi there\n");
    }

    #[test]
    fn test_localizer_translates_gettext_strings() {
        let localizer: Localizer = Rc::new(|text: &str| text.replace("Booting", "Demarrage"));
        let mut shell = BootShell::new(BootShellOptions {
            localizer: Some(localizer),
            ..Default::default()
        });
        shell.set_var("os", "Linux");
        assert_eq!(shell.exec("echo $\"Booting $os\"").stdout, "Demarrage Linux\n");
    }

    #[test]
    fn test_custom_ifs() {
        let mut shell = BootShell::new(BootShellOptions {
            ifs: Some(":".to_string()),
            ..Default::default()
        });
        shell.set_var("path", "a:b");
        assert_eq!(shell.exec("for p in $path; do echo $p; done").stdout, "a\nb\n");
    }

    #[test]
    fn test_menu_entries_register_and_run() {
        let mut shell = BootShell::default();
        let result = shell.exec(
            "menuentry 'Linux' --class gnu --id linux {\n  echo booting $1 $2\n}\n\
             submenu 'Advanced' {\n  menuentry 'Recovery' { echo recovery }\n}\n",
        );
        assert_eq!(result.exit_code, 0, "{}", result.stderr);
        let titles: Vec<&str> = shell.menu_entries().iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Linux", "Advanced"]);

        let linux = shell.find_menu_entry("linux").unwrap();
        assert_eq!(shell.run_menu_entry(linux).unwrap().stdout, "booting Linux\n");

        let advanced = shell.find_menu_entry("Advanced").unwrap();
        shell.run_menu_entry(advanced).unwrap();
        let titles: Vec<&str> = shell.menu_entries().iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Recovery"]);
        assert!(shell.run_menu_entry(5).is_none());
    }

    #[test]
    fn test_search_then_glob_kernels() {
        let (mut shell, _fs) = shell_with_disks();
        let result = shell.exec(
            "search --label --set boot\nfor k in /vmlinuz*; do echo ($root)$k; done\n",
        );
        assert_eq!(result.stdout, "(hd0,msdos1)/vmlinuz-6.1\n(hd0,msdos1)/vmlinuz-6.6\n");
    }

    #[test]
    fn test_glob_across_devices() {
        let (mut shell, _fs) = shell_with_disks();
        let result = shell.exec("for k in (hd*,*)/vmlinuz*; do echo $k; done\n");
        assert_eq!(result.stdout, "(hd0,msdos1)/vmlinuz-6.1\n(hd0,msdos1)/vmlinuz-6.6\n");
    }

    #[test]
    fn test_search_failure_is_checked_by_if() {
        let (mut shell, _fs) = shell_with_disks();
        let result = shell.exec(
            "if search --fs-uuid --set=foo nonexistent-uuid; then echo found; else echo missing; fi\n",
        );
        assert_eq!(result.stdout, "missing\n");
        assert_eq!(result.stderr, "error: no such device: nonexistent-uuid.\n");
        assert_eq!(shell.get_var("foo"), None);
    }

    #[test]
    fn test_raid_volume_is_searchable() {
        let (mut shell, fs) = shell_with_disks();
        for (i, name) in ["hd2", "hd3"].iter().enumerate() {
            let mut member = MemDisk::zeroed(*name, 256);
            write_sb09(&mut member, false, 1, 2, i as u32, 3);
            shell.register_disk(Rc::new(member));
        }
        fs.format("md/3", "ext2", Some("cafe-0001"), None);
        let result = shell.exec("search --fs-uuid --set=r CAFE-0001\necho $r\n");
        assert_eq!(result.stdout, "md/3\n");
    }

    #[test]
    fn test_registered_command_is_dispatched() {
        struct Linux(Rc<RefCell<Vec<String>>>);
        impl Command for Linux {
            fn name(&self) -> &'static str {
                "linux"
            }
            fn execute(&self, ctx: CommandContext<'_>) -> CommandResult {
                self.0.borrow_mut().extend(ctx.args);
                CommandResult::success(String::new())
            }
        }
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut shell = BootShell::default();
        shell.register_command(Box::new(Linux(seen.clone())));
        shell.exec("set root=hd0,msdos1\nlinux /vmlinuz root=/dev/sda1 quiet\n");
        assert_eq!(*seen.borrow(), vec!["/vmlinuz", "root=/dev/sda1", "quiet"]);
    }
}
