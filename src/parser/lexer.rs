//! Lexer for Boot Scripts
//!
//! The lexer turns script text into tokens for the parser. Input arrives one
//! line at a time from a [`LineSource`]; the lexer only asks for another line
//! when a quote is still open, a backslash-newline continues the current line,
//! or the parser holds a reference (an unfinished `if`, loop or block).
//!
//! A word is built from typed fragments (`foo`, `${bar}`, `"baz"`) that are
//! merged into one [`Argument`] and only concatenated at expansion time.
//!
//! While a recording is active every consumed character is mirrored into a
//! buffer so the parser can recover the verbatim text of a block.

use std::collections::HashMap;
use std::collections::VecDeque;

use tracing::debug;

use crate::ast::types::{ArgType, Argument};
use crate::parser::alloc_tracker::AllocTracker;
use crate::parser::ast_builder::arg_add;
use crate::parser::types::{ParseException, MAX_LINE_LENGTH};

/// Supplies script text one line at a time.
pub trait LineSource {
    /// Next line, with or without its trailing newline. `None` means the input
    /// is exhausted; an empty string is a blank line. `continuation` is set
    /// when the lexer is in the middle of an unfinished construct.
    fn next_line(&mut self, continuation: bool) -> Option<String>;
}

impl<F> LineSource for F
where
    F: FnMut(bool) -> Option<String>,
{
    fn next_line(&mut self, continuation: bool) -> Option<String> {
        self(continuation)
    }
}

/// Line source over an in-memory string.
#[derive(Debug, Clone, Default)]
pub struct StrLines {
    lines: VecDeque<String>,
}

impl StrLines {
    pub fn new(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.lines.is_empty()
    }
}

impl LineSource for StrLines {
    fn next_line(&mut self, _continuation: bool) -> Option<String> {
        self.lines.pop_front()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Eof,
    /// Lexing failed; the error is held by the lexer.
    Bad,
    Newline,
    Semicolon,
    LBrace,
    RBrace,
    Pipe,
    Amp,
    Less,
    Great,
    Word,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eof => "end of file",
            Self::Bad => "bad token",
            Self::Newline => "newline",
            Self::Semicolon => ";",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Pipe => "|",
            Self::Amp => "&",
            Self::Less => "<",
            Self::Great => ">",
            Self::Word => "word",
        }
    }

    /// Ends a command in a list.
    pub fn is_delimiter(&self) -> bool {
        matches!(self, Self::Newline | Self::Semicolon)
    }
}

/// Reserved words. Whether one acts as a keyword is decided by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    If,
    Then,
    Elif,
    Else,
    Fi,
    For,
    In,
    Do,
    Done,
    While,
    Until,
    Function,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Then => "then",
            Self::Elif => "elif",
            Self::Else => "else",
            Self::Fi => "fi",
            Self::For => "for",
            Self::In => "in",
            Self::Do => "do",
            Self::Done => "done",
            Self::While => "while",
            Self::Until => "until",
            Self::Function => "function",
        }
    }
}

lazy_static::lazy_static! {
    static ref RESERVED_WORDS: HashMap<&'static str, Keyword> = {
        let mut m = HashMap::new();
        m.insert("if", Keyword::If);
        m.insert("then", Keyword::Then);
        m.insert("elif", Keyword::Elif);
        m.insert("else", Keyword::Else);
        m.insert("fi", Keyword::Fi);
        m.insert("for", Keyword::For);
        m.insert("in", Keyword::In);
        m.insert("do", Keyword::Do);
        m.insert("done", Keyword::Done);
        m.insert("while", Keyword::While);
        m.insert("until", Keyword::Until);
        m.insert("function", Keyword::Function);
        m
    };
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    /// Fragments of a [`TokenType::Word`].
    pub word: Option<Argument>,
    /// Raw source characters of the token.
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    fn new(token_type: TokenType, text: String, line: usize, column: usize) -> Self {
        Self {
            token_type,
            word: None,
            text,
            line,
            column,
        }
    }

    /// The reserved word this token spells, if it is a single unquoted fragment.
    pub fn keyword(&self) -> Option<Keyword> {
        let word = self.word.as_ref()?.bare_word()?;
        RESERVED_WORDS.get(word).copied()
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.keyword() == Some(keyword)
    }

    pub fn is_eof(&self) -> bool {
        self.token_type == TokenType::Eof
    }
}

fn is_word_boundary(c: char) -> bool {
    matches!(
        c,
        ' ' | '\t' | '\r' | '\n' | ';' | '|' | '&' | '<' | '>' | '{' | '}'
    )
}

fn starts_fragment(c: char) -> bool {
    matches!(c, '\'' | '"' | '$' | '\\')
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_special_param(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '?' | '#' | '@' | '*')
}

pub struct Lexer<'t, 's> {
    tracker: &'t AllocTracker,
    source: Option<&'s mut (dyn LineSource + 's)>,
    buf: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    /// Outstanding parser constructs that need more input before EOF.
    refs: usize,
    merge_start: bool,
    merge_end: bool,
    recording: Option<String>,
    record_depth: usize,
    raw: String,
    error: Option<ParseException>,
}

impl<'t, 's> Lexer<'t, 's> {
    /// Prime a lexer with `initial` text, or with the first line of `source`.
    pub fn new(
        tracker: &'t AllocTracker,
        initial: Option<&str>,
        source: Option<&'s mut (dyn LineSource + 's)>,
    ) -> Result<Self, ParseException> {
        if initial.is_none() && source.is_none() {
            return Err(ParseException::unexpected_eof(1, 1));
        }
        let mut lexer = Self {
            tracker,
            source,
            buf: Vec::new(),
            pos: 0,
            line: 1,
            column: 1,
            refs: 0,
            merge_start: false,
            merge_end: false,
            recording: None,
            record_depth: 0,
            raw: String::new(),
            error: None,
        };
        match initial {
            Some(text) => lexer.buf = text.chars().collect(),
            None => {
                lexer.next_line(false)?;
            }
        }
        Ok(lexer)
    }

    pub fn tracker(&self) -> &'t AllocTracker {
        self.tracker
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn push_ref(&mut self) {
        self.refs += 1;
    }

    pub fn pop_ref(&mut self) {
        self.refs = self.refs.saturating_sub(1);
    }

    pub fn refs(&self) -> usize {
        self.refs
    }

    /// Remember a parser error; every later token is [`TokenType::Bad`].
    pub fn flag_error(&mut self, err: ParseException) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub fn error(&self) -> Option<&ParseException> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<ParseException> {
        self.error.take()
    }

    // =========================================================================
    // RECORDING
    // =========================================================================

    /// Start mirroring consumed characters. Returns the offset to hand back
    /// to the matching [`record_stop`](Self::record_stop).
    pub fn record_start(&mut self) -> usize {
        self.record_depth += 1;
        self.recording.get_or_insert_with(String::new).len()
    }

    /// Text consumed since `offset`. The copy is charged to the tracker.
    pub fn record_stop(&mut self, offset: usize) -> Result<String, ParseException> {
        let text = match self.recording.as_ref() {
            Some(rec) => rec.get(offset..).unwrap_or_default().to_string(),
            None => String::new(),
        };
        self.record_depth = self.record_depth.saturating_sub(1);
        if self.record_depth == 0 {
            self.recording = None;
        }
        self.tracker
            .track_alloc(text.len() + 1)
            .map_err(|e| ParseException::from_alloc(e, self.line, self.column))?;
        Ok(text)
    }

    // =========================================================================
    // INPUT
    // =========================================================================

    /// Pull one more line, keeping any unread suffix in front of it.
    fn next_line(&mut self, continuation: bool) -> Result<bool, ParseException> {
        let Some(source) = self.source.as_deref_mut() else {
            return Ok(false);
        };
        let Some(mut line) = source.next_line(continuation) else {
            return Ok(false);
        };
        if line.len() > MAX_LINE_LENGTH {
            return Err(ParseException::new("line too long", self.line, 1));
        }
        if !line.ends_with('\n') {
            line.push('\n');
        }
        debug!(line = self.line, continuation, "fetched script line");

        let mut buf: Vec<char> = self.buf.drain(self.pos..).collect();
        buf.extend(line.chars());
        self.buf = buf;
        self.pos = 0;
        Ok(true)
    }

    /// Input must continue here; running dry is an error.
    fn need_more(&mut self) -> Result<(), ParseException> {
        if self.next_line(true)? {
            Ok(())
        } else {
            Err(ParseException::unexpected_eof(self.line, self.column))
        }
    }

    fn ensure_input(&mut self) -> Result<(), ParseException> {
        if self.peek().is_none() {
            self.need_more()?;
        }
        Ok(())
    }

    fn peek(&self) -> Option<char> {
        self.buf.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.buf.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = *self.buf.get(self.pos)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.raw.push(c);
        if let Some(rec) = self.recording.as_mut() {
            rec.push(c);
        }
        Some(c)
    }

    fn at_boundary(&self) -> bool {
        self.peek().map_or(true, is_word_boundary)
    }

    fn add(
        &self,
        arg: Option<Argument>,
        arg_type: ArgType,
        text: String,
    ) -> Result<Argument, ParseException> {
        arg_add(self.tracker, arg, arg_type, text)
            .map_err(|e| ParseException::from_alloc(e, self.line, self.column))
    }

    // =========================================================================
    // TOKENS
    // =========================================================================

    pub fn next_token(&mut self) -> Token {
        if self.error.is_some() {
            return self.bad_token();
        }
        match self.scan_token() {
            Ok(token) => token,
            Err(err) => {
                debug!(error = %err, "lexer error");
                self.error = Some(err);
                self.bad_token()
            }
        }
    }

    fn bad_token(&self) -> Token {
        Token::new(TokenType::Bad, String::new(), self.line, self.column)
    }

    fn scan_token(&mut self) -> Result<Token, ParseException> {
        loop {
            self.skip_blanks()?;
            match self.peek() {
                None => {
                    if self.refs == 0 {
                        return Ok(Token::new(TokenType::Eof, String::new(), self.line, self.column));
                    }
                    self.need_more()?;
                }
                Some('#') => {
                    while matches!(self.peek(), Some(c) if c != '\n') {
                        self.bump();
                    }
                }
                Some(_) => break,
            }
        }

        self.raw.clear();
        let (line, column) = (self.line, self.column);
        let op = match self.peek() {
            Some('\n') => Some(TokenType::Newline),
            Some(';') => Some(TokenType::Semicolon),
            Some('{') => Some(TokenType::LBrace),
            Some('}') => Some(TokenType::RBrace),
            Some('|') => Some(TokenType::Pipe),
            Some('&') => Some(TokenType::Amp),
            Some('<') => Some(TokenType::Less),
            Some('>') => Some(TokenType::Great),
            _ => None,
        };
        if let Some(token_type) = op {
            self.bump();
            return Ok(Token::new(token_type, self.raw.clone(), line, column));
        }

        let word = self.scan_word()?;
        let mut token = Token::new(TokenType::Word, self.raw.clone(), line, column);
        token.word = Some(word);
        Ok(token)
    }

    fn skip_blanks(&mut self) -> Result<(), ParseException> {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.bump();
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    self.bump();
                    self.bump();
                    self.ensure_input()?;
                }
                _ => return Ok(()),
            }
        }
    }

    /// Merge fragments until the word is closed by a boundary character.
    fn scan_word(&mut self) -> Result<Argument, ParseException> {
        self.merge_start = true;
        self.merge_end = false;
        let mut arg = None;
        loop {
            arg = self.scan_fragment(arg)?;
            if self.at_boundary() {
                self.merge_end = true;
            }
            if !self.merge_start || self.merge_end {
                break;
            }
        }
        self.merge_start = false;
        arg.ok_or_else(|| ParseException::new("empty word", self.line, self.column))
    }

    fn scan_fragment(&mut self, arg: Option<Argument>) -> Result<Option<Argument>, ParseException> {
        let Some(c) = self.peek() else {
            return Ok(arg);
        };
        match c {
            '\'' => {
                self.bump();
                let mut text = String::new();
                loop {
                    match self.peek() {
                        None => self.need_more()?,
                        Some('\'') => {
                            self.bump();
                            break;
                        }
                        Some(ch) => {
                            self.bump();
                            text.push(ch);
                        }
                    }
                }
                self.add(arg, ArgType::SqStr, text).map(Some)
            }
            '"' => {
                self.bump();
                self.scan_dquote(arg).map(Some)
            }
            '$' if self.peek_at(1) == Some('"') => {
                self.bump();
                self.bump();
                let text = self.scan_gettext()?;
                self.add(arg, ArgType::Gettext, text).map(Some)
            }
            '$' => self.scan_variable(arg, ArgType::Var, ArgType::Text).map(Some),
            '\\' => {
                self.bump();
                match self.bump() {
                    Some('\n') => {
                        self.ensure_input()?;
                        Ok(arg)
                    }
                    Some(ch) => self.add(arg, ArgType::SqStr, ch.to_string()).map(Some),
                    None => self.add(arg, ArgType::Text, "\\".to_string()).map(Some),
                }
            }
            _ => {
                let mut text = String::new();
                while let Some(ch) = self.peek() {
                    if is_word_boundary(ch) || starts_fragment(ch) {
                        break;
                    }
                    self.bump();
                    text.push(ch);
                }
                self.add(arg, ArgType::Text, text).map(Some)
            }
        }
    }

    /// `$name`, `${name}` or a special parameter. A `$` that starts none of
    /// those is literal text of type `literal`.
    fn scan_variable(
        &mut self,
        arg: Option<Argument>,
        var_type: ArgType,
        literal: ArgType,
    ) -> Result<Argument, ParseException> {
        self.bump();
        match self.peek() {
            Some('{') => {
                self.bump();
                let mut name = String::new();
                loop {
                    match self.peek() {
                        Some('}') => {
                            self.bump();
                            break;
                        }
                        Some(ch) if ch != '\n' => {
                            self.bump();
                            name.push(ch);
                        }
                        _ => {
                            return Err(ParseException::new(
                                "unterminated `${'",
                                self.line,
                                self.column,
                            ))
                        }
                    }
                }
                if name.is_empty() {
                    return Err(ParseException::new("bad substitution", self.line, self.column));
                }
                self.add(arg, var_type, name)
            }
            Some(ch) if is_name_start(ch) => {
                let mut name = String::new();
                while let Some(ch) = self.peek().filter(|c| is_name_char(*c)) {
                    self.bump();
                    name.push(ch);
                }
                self.add(arg, var_type, name)
            }
            Some(ch) if is_special_param(ch) => {
                self.bump();
                self.add(arg, var_type, ch.to_string())
            }
            _ => self.add(arg, literal, "$".to_string()),
        }
    }

    fn scan_dquote(&mut self, mut arg: Option<Argument>) -> Result<Argument, ParseException> {
        let mut text = String::new();
        let mut produced = false;
        loop {
            let Some(c) = self.peek() else {
                self.need_more()?;
                continue;
            };
            match c {
                '"' => {
                    self.bump();
                    break;
                }
                '\\' => {
                    self.bump();
                    self.ensure_input()?;
                    match self.peek() {
                        Some('\n') => {
                            self.bump();
                        }
                        Some(n @ ('$' | '"' | '\\')) => {
                            self.bump();
                            text.push(n);
                        }
                        _ => text.push('\\'),
                    }
                }
                '$' if self
                    .peek_at(1)
                    .map_or(false, |n| n == '{' || is_name_start(n) || is_special_param(n)) =>
                {
                    if !text.is_empty() {
                        arg = Some(self.add(arg, ArgType::DqStr, std::mem::take(&mut text))?);
                    }
                    arg = Some(self.scan_variable(arg, ArgType::DqVar, ArgType::DqStr)?);
                    produced = true;
                }
                _ => {
                    self.bump();
                    text.push(c);
                }
            }
        }
        match arg {
            Some(existing) if text.is_empty() && produced => Ok(existing),
            other => self.add(other, ArgType::DqStr, text),
        }
    }

    fn scan_gettext(&mut self) -> Result<String, ParseException> {
        let mut text = String::new();
        loop {
            let Some(c) = self.peek() else {
                self.need_more()?;
                continue;
            };
            self.bump();
            match c {
                '"' => return Ok(text),
                '\\' => {
                    self.ensure_input()?;
                    match self.peek() {
                        Some('\n') => {
                            self.bump();
                        }
                        Some(n @ ('$' | '"' | '\\')) => {
                            self.bump();
                            text.push(n);
                        }
                        _ => text.push('\\'),
                    }
                }
                _ => text.push(c),
            }
        }
    }
}
