//! Recursive Descent Parser for Boot Scripts
//!
//! Grammar (one unit per [`parse`] call):
//!
//! ```text
//! script    := list EOF
//! list      := { delim } [ command { delim { delim } command } ] { delim }
//! command   := cmdline | if | for | while | until | function | "{" list "}"
//! cmdline   := WORD { WORD | block }
//! block     := "{" list "}"                      (parsed into a child Script)
//! if        := "if" list "then" list { "elif" list "then" list } [ "else" list ] "fi"
//! for       := "for" NAME "in" { WORD } delim "do" list "done"
//! while     := ("while" | "until") list "do" list "done"
//! function  := "function" WORD block
//! ```
//!
//! Every node is charged to the allocation tracker. The whole parse runs
//! inside one checkpoint: on success the checkpoint's blocks become the
//! Script's arena, on any error they are freed before returning.

use std::rc::Rc;

use tracing::debug;

use crate::ast::types::{ArgList, CommandList, CommandNode, ScriptRef};
use crate::parser::alloc_tracker::{free_list, AllocError, AllocTracker};
use crate::parser::ast_builder::{
    arg_add_block, arglist_add, chain_commands, create_script, make_block, make_cmdline, make_for,
    make_function, make_if, make_while,
};
use crate::parser::lexer::{Keyword, Lexer, LineSource, Token, TokenType};
use crate::parser::types::{ParseException, MAX_PARSER_DEPTH};

/// Parse one unit with a private tracker.
pub fn parse(
    initial: Option<&str>,
    source: Option<&mut dyn LineSource>,
) -> Result<ScriptRef, ParseException> {
    let tracker = AllocTracker::new();
    parse_with(&tracker, initial, source)
}

/// Parse one unit, charging every node to `tracker`.
pub fn parse_with<'s>(
    tracker: &AllocTracker,
    initial: Option<&str>,
    source: Option<&'s mut (dyn LineSource + 's)>,
) -> Result<ScriptRef, ParseException> {
    let saved = tracker.mark();
    let result = Parser::new(tracker, initial, source).and_then(|mut parser| parser.parse_script());
    let arena = tracker.release_to_checkpoint(saved);
    match result {
        Ok((cmd, children)) => Ok(create_script(cmd, children, arena)),
        Err(err) => {
            debug!(error = %err, blocks = arena.len(), "parse failed, releasing checkpoint");
            free_list(arena);
            Err(err)
        }
    }
}

pub struct Parser<'t, 's> {
    lexer: Lexer<'t, 's>,
    tracker: &'t AllocTracker,
    current: Token,
    /// Block-argument scripts found at the current nesting level.
    scripts: Vec<ScriptRef>,
    depth: usize,
}

impl<'t, 's> Parser<'t, 's> {
    pub fn new(
        tracker: &'t AllocTracker,
        initial: Option<&str>,
        source: Option<&'s mut (dyn LineSource + 's)>,
    ) -> Result<Self, ParseException> {
        let mut lexer = Lexer::new(tracker, initial, source)?;
        let current = lexer.next_token();
        Ok(Self {
            lexer,
            tracker,
            current,
            scripts: Vec::new(),
            depth: 0,
        })
    }

    /// Root command chain plus the block scripts it references.
    pub fn parse_script(&mut self) -> Result<(CommandList, Vec<ScriptRef>), ParseException> {
        let cmd = self.parse_list(&[])?;
        match self.current.token_type {
            TokenType::Eof => Ok((cmd, std::mem::take(&mut self.scripts))),
            TokenType::RBrace => Err(self.fail("unmatched `}'")),
            _ => Err(self.unexpected()),
        }
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn advance(&mut self) {
        self.current = self.lexer.next_token();
    }

    fn fail(&mut self, message: impl Into<String>) -> ParseException {
        let err = ParseException::new(message, self.current.line, self.current.column);
        self.lexer.flag_error(err.clone());
        err
    }

    fn alloc_failed(&mut self, err: AllocError) -> ParseException {
        let err = ParseException::from_alloc(err, self.current.line, self.current.column);
        self.lexer.flag_error(err.clone());
        err
    }

    fn check_bad(&mut self) -> Result<(), ParseException> {
        if self.current.token_type != TokenType::Bad {
            return Ok(());
        }
        let (line, column) = (self.current.line, self.current.column);
        Err(self
            .lexer
            .error()
            .cloned()
            .unwrap_or_else(|| ParseException::new("bad token", line, column)))
    }

    fn unexpected(&mut self) -> ParseException {
        if let Err(err) = self.check_bad() {
            return err;
        }
        let message = match self.current.token_type {
            TokenType::Eof => "unexpected end of file".to_string(),
            TokenType::Pipe | TokenType::Amp | TokenType::Less | TokenType::Great => {
                format!("unsupported operator `{}'", self.current.token_type.as_str())
            }
            TokenType::Word => format!("unexpected `{}'", self.current.text),
            other => format!("unexpected `{}'", other.as_str()),
        };
        self.fail(message)
    }

    fn skip_delimiters(&mut self) {
        while self.current.token_type.is_delimiter() {
            self.advance();
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<(), ParseException> {
        self.check_bad()?;
        if self.current.is_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(self.missing(keyword))
        }
    }

    fn missing(&mut self, keyword: Keyword) -> ParseException {
        if self.current.is_eof() {
            self.fail(format!("expected `{}' before end of file", keyword.as_str()))
        } else {
            let found = self.current.text.clone();
            self.fail(format!("expected `{}', found `{}'", keyword.as_str(), found))
        }
    }

    /// Like [`expect_keyword`](Self::expect_keyword) but closes a construct:
    /// the lexer reference is dropped before looking past the keyword.
    fn close_keyword(&mut self, keyword: Keyword) -> Result<(), ParseException> {
        self.check_bad()?;
        if !self.current.is_keyword(keyword) {
            return self.expect_keyword(keyword);
        }
        self.lexer.pop_ref();
        self.advance();
        Ok(())
    }

    // =========================================================================
    // LISTS AND COMMANDS
    // =========================================================================

    /// Commands up to EOF, a `}` or one of the `stops` keywords in command
    /// position. The terminator is left as the current token.
    fn parse_list(&mut self, stops: &[Keyword]) -> Result<CommandList, ParseException> {
        let mut nodes = Vec::new();
        loop {
            self.check_bad()?;
            self.skip_delimiters();
            self.check_bad()?;
            match self.current.token_type {
                TokenType::Eof | TokenType::RBrace => break,
                TokenType::Word if self.current.keyword().map_or(false, |k| stops.contains(&k)) => {
                    break
                }
                _ => {}
            }

            nodes.push(self.parse_command()?);

            self.check_bad()?;
            match self.current.token_type {
                TokenType::Newline | TokenType::Semicolon | TokenType::Eof | TokenType::RBrace => {}
                _ => return Err(self.unexpected()),
            }
        }
        Ok(chain_commands(nodes))
    }

    fn parse_command(&mut self) -> Result<CommandNode, ParseException> {
        self.depth += 1;
        if self.depth > MAX_PARSER_DEPTH {
            return Err(self.fail("nesting too deep"));
        }
        let result = self.parse_command_inner();
        self.depth -= 1;
        result
    }

    fn parse_command_inner(&mut self) -> Result<CommandNode, ParseException> {
        match self.current.token_type {
            TokenType::Word => match self.current.keyword() {
                Some(Keyword::If) => self.parse_if(),
                Some(Keyword::For) => self.parse_for(),
                Some(Keyword::While) => self.parse_while(false),
                Some(Keyword::Until) => self.parse_while(true),
                Some(Keyword::Function) => self.parse_function(),
                Some(
                    Keyword::Then
                    | Keyword::Elif
                    | Keyword::Else
                    | Keyword::Fi
                    | Keyword::Do
                    | Keyword::Done,
                ) => Err(self.unexpected()),
                Some(Keyword::In) | None => self.parse_cmdline(),
            },
            TokenType::LBrace => self.parse_group(),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_cmdline(&mut self) -> Result<CommandNode, ParseException> {
        let line = self.current.line;
        let mut arglist: Option<ArgList> = None;
        loop {
            match self.current.token_type {
                TokenType::Word => {
                    let word = self.current.word.take().unwrap_or_default();
                    arglist = Some(
                        arglist_add(self.tracker, arglist, word).map_err(|e| self.alloc_failed(e))?,
                    );
                    self.advance();
                }
                TokenType::LBrace => {
                    let (script, text) = self.parse_block_script()?;
                    let arg = arg_add_block(self.tracker, None, text, script)
                        .map_err(|e| self.alloc_failed(e))?;
                    arglist = Some(
                        arglist_add(self.tracker, arglist, arg).map_err(|e| self.alloc_failed(e))?,
                    );
                }
                _ => break,
            }
        }
        make_cmdline(self.tracker, arglist.unwrap_or_default(), line).map_err(|e| self.alloc_failed(e))
    }

    /// `{ list }` in command position runs inline.
    fn parse_group(&mut self) -> Result<CommandNode, ParseException> {
        let line = self.current.line;
        self.lexer.push_ref();
        self.advance();
        let list = self.parse_list(&[])?;
        self.check_bad()?;
        if self.current.token_type != TokenType::RBrace {
            return Err(self.unexpected());
        }
        self.lexer.pop_ref();
        self.advance();
        make_block(self.tracker, list, line).map_err(|e| self.alloc_failed(e))
    }

    /// `{ list }` as an argument: parsed into its own Script under a nested
    /// checkpoint, with the verbatim text between the braces.
    fn parse_block_script(&mut self) -> Result<(ScriptRef, String), ParseException> {
        self.lexer.push_ref();
        let offset = self.lexer.record_start();
        let saved = self.tracker.mark();
        let outer = std::mem::take(&mut self.scripts);

        let body = self.parse_block_body(offset);

        let children = std::mem::replace(&mut self.scripts, outer);
        let arena = self.tracker.release_to_checkpoint(saved);
        match body {
            Ok((cmd, text)) => {
                let script = create_script(cmd, children, arena);
                self.scripts.push(Rc::clone(&script));
                self.advance();
                Ok((script, text))
            }
            Err(err) => {
                drop(children);
                free_list(arena);
                Err(err)
            }
        }
    }

    fn parse_block_body(&mut self, offset: usize) -> Result<(CommandList, String), ParseException> {
        self.advance();
        let cmd = self.parse_list(&[])?;
        self.check_bad()?;
        if self.current.token_type != TokenType::RBrace {
            return Err(self.unexpected());
        }
        let mut text = self.lexer.record_stop(offset)?;
        if text.ends_with('}') {
            text.pop();
        }
        self.lexer.pop_ref();
        Ok((cmd, text))
    }

    // =========================================================================
    // COMPOUND COMMANDS
    // =========================================================================

    fn parse_if(&mut self) -> Result<CommandNode, ParseException> {
        let line = self.current.line;
        self.lexer.push_ref();
        self.advance();
        let node = self.parse_if_clauses(line)?;
        self.close_keyword(Keyword::Fi)?;
        Ok(node)
    }

    /// Condition, `then` branch and the chain of `elif`/`else` after it.
    /// Stops with `fi` as the current token.
    fn parse_if_clauses(&mut self, line: usize) -> Result<CommandNode, ParseException> {
        let cond = self.parse_list(&[Keyword::Then])?;
        if cond.is_none() {
            self.check_bad()?;
            return Err(self.fail("empty condition"));
        }
        self.expect_keyword(Keyword::Then)?;
        let on_true = self.parse_list(&[Keyword::Elif, Keyword::Else, Keyword::Fi])?;
        self.check_bad()?;

        let on_false = match self.current.keyword() {
            Some(Keyword::Elif) => {
                let elif_line = self.current.line;
                self.advance();
                // Each `elif` nests one `if` deeper in the false branch.
                self.depth += 1;
                if self.depth > MAX_PARSER_DEPTH {
                    return Err(self.fail("nesting too deep"));
                }
                let nested = self.parse_if_clauses(elif_line);
                self.depth -= 1;
                Some(Box::new(nested?))
            }
            Some(Keyword::Else) => {
                self.advance();
                self.parse_list(&[Keyword::Fi])?
            }
            _ => None,
        };
        self.check_bad()?;
        if !self.current.is_keyword(Keyword::Fi) {
            return Err(self.missing(Keyword::Fi));
        }
        make_if(self.tracker, cond, on_true, on_false, line).map_err(|e| self.alloc_failed(e))
    }

    fn parse_for(&mut self) -> Result<CommandNode, ParseException> {
        let line = self.current.line;
        self.lexer.push_ref();
        self.advance();

        self.check_bad()?;
        let name = match self.current.word.as_ref().and_then(|w| w.bare_word()) {
            Some(name) if is_valid_name(name) => name.to_string(),
            _ => {
                let found = self.current.text.clone();
                return Err(self.fail(format!("`{}' is not a valid identifier", found)));
            }
        };
        self.advance();
        self.expect_keyword(Keyword::In)?;

        let mut words = ArgList::default();
        while self.current.token_type == TokenType::Word {
            let word = self.current.word.take().unwrap_or_default();
            words = arglist_add(self.tracker, Some(words), word).map_err(|e| self.alloc_failed(e))?;
            self.advance();
        }
        self.check_bad()?;
        if !self.current.token_type.is_delimiter() {
            return Err(self.unexpected());
        }
        self.skip_delimiters();
        self.expect_keyword(Keyword::Do)?;
        let body = self.parse_list(&[Keyword::Done])?;
        self.close_keyword(Keyword::Done)?;
        make_for(self.tracker, name, words, body, line).map_err(|e| self.alloc_failed(e))
    }

    fn parse_while(&mut self, until: bool) -> Result<CommandNode, ParseException> {
        let line = self.current.line;
        self.lexer.push_ref();
        self.advance();
        let cond = self.parse_list(&[Keyword::Do])?;
        if cond.is_none() {
            self.check_bad()?;
            return Err(self.fail("empty condition"));
        }
        self.expect_keyword(Keyword::Do)?;
        let body = self.parse_list(&[Keyword::Done])?;
        self.close_keyword(Keyword::Done)?;
        make_while(self.tracker, cond, body, until, line).map_err(|e| self.alloc_failed(e))
    }

    fn parse_function(&mut self) -> Result<CommandNode, ParseException> {
        let line = self.current.line;
        self.advance();
        self.check_bad()?;
        let name = match self.current.word.as_ref().and_then(|w| w.literal()) {
            Some(name) if !name.is_empty() => name,
            _ => return Err(self.fail("function name expected")),
        };
        self.advance();
        self.check_bad()?;
        if self.current.token_type != TokenType::LBrace {
            return Err(self.fail(format!("expected `{{' after function `{}'", name)));
        }
        let (body, _) = self.parse_block_script()?;
        make_function(self.tracker, name, body, line).map_err(|e| self.alloc_failed(e))
    }
}

fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
