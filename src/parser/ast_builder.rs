//! AST Construction Primitives
//!
//! Grammar actions build nodes only through these helpers so every node,
//! fragment and list cell is charged to the current allocation checkpoint.

use std::mem::size_of;
use std::rc::Rc;

use crate::ast::types::{
    ArgList, ArgPart, ArgType, Argument, CmdBlock, CmdFor, CmdIf, CmdLine, CmdWhile, CommandKind,
    CommandList, CommandNode, FunctionDefNode, Script, ScriptRef,
};
use crate::parser::alloc_tracker::{AllocError, AllocList, AllocTracker};

/// Append a fragment to `existing`, or start a new argument.
pub fn arg_add(
    tracker: &AllocTracker,
    existing: Option<Argument>,
    arg_type: ArgType,
    text: impl Into<String>,
) -> Result<Argument, AllocError> {
    let text = text.into();
    tracker.track_alloc(size_of::<ArgPart>() + text.len() + 1)?;
    let mut arg = match existing {
        Some(arg) => arg,
        None => {
            tracker.track_alloc(size_of::<Argument>())?;
            Argument::default()
        }
    };
    arg.parts.push(ArgPart {
        arg_type,
        text,
        script: None,
    });
    Ok(arg)
}

/// Append a `{ ... }` fragment carrying its parsed sub-script.
pub fn arg_add_block(
    tracker: &AllocTracker,
    existing: Option<Argument>,
    text: String,
    script: ScriptRef,
) -> Result<Argument, AllocError> {
    let mut arg = arg_add(tracker, existing, ArgType::Block, text)?;
    if let Some(part) = arg.parts.last_mut() {
        part.script = Some(script);
    }
    Ok(arg)
}

pub fn arglist_add(
    tracker: &AllocTracker,
    existing: Option<ArgList>,
    arg: Argument,
) -> Result<ArgList, AllocError> {
    tracker.track_alloc(size_of::<Argument>())?;
    let mut list = existing.unwrap_or_default();
    list.args.push(arg);
    Ok(list)
}

fn make_node(
    tracker: &AllocTracker,
    kind: CommandKind,
    line: usize,
) -> Result<CommandNode, AllocError> {
    tracker.track_alloc(size_of::<CommandNode>())?;
    Ok(CommandNode::new(kind, line))
}

pub fn make_cmdline(
    tracker: &AllocTracker,
    arglist: ArgList,
    line: usize,
) -> Result<CommandNode, AllocError> {
    make_node(tracker, CommandKind::CmdLine(CmdLine { arglist }), line)
}

pub fn make_if(
    tracker: &AllocTracker,
    cond: CommandList,
    on_true: CommandList,
    on_false: CommandList,
    line: usize,
) -> Result<CommandNode, AllocError> {
    make_node(
        tracker,
        CommandKind::If(CmdIf {
            exec_to_evaluate: cond,
            exec_on_true: on_true,
            exec_on_false: on_false,
        }),
        line,
    )
}

pub fn make_for(
    tracker: &AllocTracker,
    name: String,
    words: ArgList,
    list: CommandList,
    line: usize,
) -> Result<CommandNode, AllocError> {
    tracker.track_alloc(name.len() + 1)?;
    make_node(tracker, CommandKind::For(CmdFor { name, words, list }), line)
}

pub fn make_while(
    tracker: &AllocTracker,
    cond: CommandList,
    list: CommandList,
    until: bool,
    line: usize,
) -> Result<CommandNode, AllocError> {
    make_node(tracker, CommandKind::While(CmdWhile { cond, list, until }), line)
}

pub fn make_block(
    tracker: &AllocTracker,
    list: CommandList,
    line: usize,
) -> Result<CommandNode, AllocError> {
    make_node(tracker, CommandKind::Block(CmdBlock { list }), line)
}

pub fn make_function(
    tracker: &AllocTracker,
    name: String,
    body: ScriptRef,
    line: usize,
) -> Result<CommandNode, AllocError> {
    tracker.track_alloc(name.len() + 1)?;
    make_node(tracker, CommandKind::Function(FunctionDefNode { name, body }), line)
}

/// Chain `new_tail` after the last node of `list`.
pub fn append_command(list: CommandList, new_tail: Option<CommandNode>) -> CommandList {
    let Some(tail) = new_tail else {
        return list;
    };
    let mut list = list;
    let mut slot = &mut list;
    while let Some(node) = slot {
        slot = &mut node.next;
    }
    *slot = Some(Box::new(tail));
    list
}

/// Link `nodes` into one chain, keeping their order.
pub fn chain_commands(nodes: Vec<CommandNode>) -> CommandList {
    nodes.into_iter().rev().fold(None, |next, mut node| {
        node.next = next;
        Some(Box::new(node))
    })
}

/// Package a finished unit; `arena` must be the checkpoint list it was built in.
pub fn create_script(cmd: CommandList, children: Vec<ScriptRef>, arena: AllocList) -> ScriptRef {
    Rc::new(Script::new(cmd, children, arena))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(tracker: &AllocTracker, text: &str) -> Argument {
        arg_add(tracker, None, ArgType::Text, text).unwrap()
    }

    #[test]
    fn test_arg_add_merges_fragments() {
        let tracker = AllocTracker::new();
        let arg = arg_add(&tracker, None, ArgType::Text, "foo").unwrap();
        let arg = arg_add(&tracker, Some(arg), ArgType::Var, "bar").unwrap();
        let arg = arg_add(&tracker, Some(arg), ArgType::Text, "baz").unwrap();
        let types: Vec<ArgType> = arg.parts.iter().map(|p| p.arg_type).collect();
        assert_eq!(types, vec![ArgType::Text, ArgType::Var, ArgType::Text]);
        assert!(arg.bare_word().is_none());
    }

    #[test]
    fn test_arglist_add_counts() {
        let tracker = AllocTracker::new();
        let list = arglist_add(&tracker, None, word(&tracker, "a")).unwrap();
        let list = arglist_add(&tracker, Some(list), word(&tracker, "b")).unwrap();
        assert_eq!(list.argcount(), 2);
        assert_eq!(list.args[1].bare_word(), Some("b"));
    }

    #[test]
    fn test_append_command_keeps_empty_list_empty() {
        assert!(append_command(None, None).is_none());
    }

    #[test]
    fn test_append_command_chains_in_order() {
        let tracker = AllocTracker::new();
        let mut list = None;
        for name in ["a", "b", "c"] {
            let args = arglist_add(&tracker, None, word(&tracker, name)).unwrap();
            let node = make_cmdline(&tracker, args, 1).unwrap();
            list = append_command(list, Some(node));
        }
        let head = list.unwrap();
        let names: Vec<String> = head
            .iter()
            .filter_map(|n| match &n.kind {
                CommandKind::CmdLine(c) => c.arglist.args[0].literal(),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_chain_commands_handles_long_runs() {
        let tracker = AllocTracker::new();
        let nodes: Vec<CommandNode> = (0..100_000)
            .map(|i| {
                let args = arglist_add(&tracker, None, word(&tracker, &i.to_string())).unwrap();
                make_cmdline(&tracker, args, i + 1).unwrap()
            })
            .collect();
        let head = chain_commands(nodes).unwrap();
        assert_eq!(head.iter().count(), 100_000);
        assert_eq!(head.line, 1);
        assert_eq!(head.iter().last().map(|n| n.line), Some(100_000));
        assert!(chain_commands(Vec::new()).is_none());
    }

    #[test]
    fn test_every_builder_charges_the_tracker() {
        let tracker = AllocTracker::new();
        let saved = tracker.mark();
        let args = arglist_add(&tracker, None, word(&tracker, "true")).unwrap();
        let cond = make_cmdline(&tracker, args, 1).unwrap();
        make_if(&tracker, Some(Box::new(cond)), None, None, 1).unwrap();
        let list = tracker.release_to_checkpoint(saved);
        // fragment + argument + list cell + cmdline + if
        assert_eq!(list.len(), 5);
    }
}
