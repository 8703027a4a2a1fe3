//! Abstract Syntax Tree (AST) Types for Boot Scripts
//!
//! A parsed unit is a [`Script`]: the root command chain, the block-argument
//! sub-scripts discovered while parsing it, and the arena of tracked
//! allocations every node was charged to. Scripts are shared through
//! [`ScriptRef`] so a function body or menu entry can run many times while
//! being freed exactly once.

use std::fmt;
use std::rc::Rc;

use crate::parser::alloc_tracker::AllocList;

// =============================================================================
// ARGUMENTS
// =============================================================================

/// Fragment kinds a single word is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgType {
    /// Unquoted literal text
    Text,
    /// `$name` / `${name}` outside quotes
    Var,
    /// `$name` inside double quotes
    DqVar,
    /// Literal text inside double quotes
    DqStr,
    /// `'...'` contents, or a backslash-escaped character
    SqStr,
    /// `$"..."`, translated at expansion time
    Gettext,
    /// `{ ... }` block argument
    Block,
}

impl ArgType {
    /// Quoted fragments are never word-split or globbed.
    pub fn is_quoted(self) -> bool {
        matches!(
            self,
            ArgType::DqVar | ArgType::DqStr | ArgType::SqStr | ArgType::Gettext | ArgType::Block
        )
    }
}

#[derive(Clone)]
pub struct ArgPart {
    pub arg_type: ArgType,
    pub text: String,
    /// Only set for [`ArgType::Block`].
    pub script: Option<ScriptRef>,
}

impl fmt::Debug for ArgPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgPart")
            .field("arg_type", &self.arg_type)
            .field("text", &self.text)
            .field("script", &self.script.is_some())
            .finish()
    }
}

/// One shell word before expansion: an ordered run of fragments.
#[derive(Debug, Clone, Default)]
pub struct Argument {
    pub parts: Vec<ArgPart>,
}

impl Argument {
    /// The word's text when it is a single unquoted literal fragment.
    pub fn bare_word(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [part] if part.arg_type == ArgType::Text => Some(part.text.as_str()),
            _ => None,
        }
    }

    /// Concatenated text when no fragment needs expansion.
    pub fn literal(&self) -> Option<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part.arg_type {
                ArgType::Text | ArgType::DqStr | ArgType::SqStr => out.push_str(&part.text),
                _ => return None,
            }
        }
        Some(out)
    }

    pub fn block(&self) -> Option<&ScriptRef> {
        self.parts.iter().find_map(|p| p.script.as_ref())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArgList {
    pub args: Vec<Argument>,
}

impl ArgList {
    pub fn argcount(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Head of a command chain; `None` is the empty list.
pub type CommandList = Option<Box<CommandNode>>;

/// One statement plus the link to the statement after it.
#[derive(Debug)]
pub struct CommandNode {
    pub kind: CommandKind,
    pub line: usize,
    pub next: CommandList,
}

#[derive(Debug)]
pub enum CommandKind {
    CmdLine(CmdLine),
    If(CmdIf),
    For(CmdFor),
    While(CmdWhile),
    Block(CmdBlock),
    Function(FunctionDefNode),
}

impl CommandKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            CommandKind::CmdLine(_) => "cmdline",
            CommandKind::If(_) => "if",
            CommandKind::For(_) => "for",
            CommandKind::While(w) if w.until => "until",
            CommandKind::While(_) => "while",
            CommandKind::Block(_) => "block",
            CommandKind::Function(_) => "function",
        }
    }
}

#[derive(Debug)]
pub struct CmdLine {
    pub arglist: ArgList,
}

#[derive(Debug)]
pub struct CmdIf {
    pub exec_to_evaluate: CommandList,
    pub exec_on_true: CommandList,
    pub exec_on_false: CommandList,
}

#[derive(Debug)]
pub struct CmdFor {
    pub name: String,
    pub words: ArgList,
    pub list: CommandList,
}

#[derive(Debug)]
pub struct CmdWhile {
    pub cond: CommandList,
    pub list: CommandList,
    pub until: bool,
}

/// `{ ...; }` in command position.
#[derive(Debug)]
pub struct CmdBlock {
    pub list: CommandList,
}

#[derive(Debug)]
pub struct FunctionDefNode {
    pub name: String,
    pub body: ScriptRef,
}

impl CommandNode {
    pub fn new(kind: CommandKind, line: usize) -> Self {
        Self { kind, line, next: None }
    }

    /// Walk this node and everything chained after it.
    pub fn iter(&self) -> CommandIter<'_> {
        CommandIter { next: Some(self) }
    }
}

pub struct CommandIter<'a> {
    next: Option<&'a CommandNode>,
}

impl<'a> Iterator for CommandIter<'a> {
    type Item = &'a CommandNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.next.as_deref();
        Some(node)
    }
}

impl Drop for CommandNode {
    // Unlink iteratively so long chains don't recurse once per statement.
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(mut node) = next {
            next = node.next.take();
        }
    }
}

// =============================================================================
// SCRIPT
// =============================================================================

pub type ScriptRef = Rc<Script>;

pub struct Script {
    cmd: CommandList,
    children: Vec<ScriptRef>,
    // Declared last: nodes above are dropped before their arena is released.
    arena: AllocList,
}

impl Script {
    pub fn new(cmd: CommandList, children: Vec<ScriptRef>, arena: AllocList) -> Self {
        Self { cmd, children, arena }
    }

    pub fn cmd(&self) -> Option<&CommandNode> {
        self.cmd.as_deref()
    }

    pub fn children(&self) -> &[ScriptRef] {
        &self.children
    }

    pub fn arena(&self) -> &AllocList {
        &self.arena
    }

    /// True when the script holds no statements.
    pub fn is_empty(&self) -> bool {
        self.cmd.is_none()
    }

    pub fn len(&self) -> usize {
        self.cmd().map(|c| c.iter().count()).unwrap_or(0)
    }

    /// Tracked blocks owned by this script and all of its children.
    pub fn total_blocks(&self) -> usize {
        self.arena.len() + self.children.iter().map(|c| c.total_blocks()).sum::<usize>()
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("cmd", &self.cmd)
            .field("children", &self.children.len())
            .field("arena", &self.arena)
            .finish()
    }
}
