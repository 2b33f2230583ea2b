//! Phase 2: Lexer
//!
//! The lexer turns prepared source text into tokens on demand. Block
//! structure is tracked with a stack of indentation columns, and the lexer
//! emits:
//! - `BlockMappingStart` / `BlockSequenceStart`: when a deeper block begins
//! - `BlockEnd`: when indentation drops back out of a block
//! - `Key` / `Value` / `BlockEntry`: the `?`, `:` and `-` indicators
//! - Flow delimiters, node properties, aliases and scalars
//!
//! Simple keys (`key: value`) are found by looking ahead on the current
//! line, so the `Key` token is queued before the key's own tokens and the
//! parser never has to backtrack.

use std::collections::VecDeque;

use crate::error::{LexError, ParseContext, ParseError, Result};
use crate::scanner::{Cursor, Mark};

/// How a scalar was written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarStyle {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
}

/// Token type in the lexer output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    StreamEnd,
    /// `---`
    DocumentStart,
    /// `...`
    DocumentEnd,
    BlockSequenceStart,
    BlockMappingStart,
    /// Dedent out of the innermost block collection.
    BlockEnd,
    /// `-`
    BlockEntry,
    /// `?`, or the implied start of a simple key.
    Key,
    /// `:`
    Value,
    FlowSequenceStart,
    FlowSequenceEnd,
    FlowMappingStart,
    FlowMappingEnd,
    /// `,`
    FlowEntry,
    Alias(String),
    Anchor(String),
    /// Tag text after the first `!`.
    Tag(String),
    Scalar(ScalarStyle, String),
}

impl TokenKind {
    /// Human-readable description for error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::StreamEnd => "end of input".to_string(),
            TokenKind::DocumentStart => "\"---\"".to_string(),
            TokenKind::DocumentEnd => "\"...\"".to_string(),
            TokenKind::BlockSequenceStart | TokenKind::BlockEntry => "\"-\"".to_string(),
            TokenKind::BlockMappingStart => "block mapping".to_string(),
            TokenKind::BlockEnd => "end of block".to_string(),
            TokenKind::Key => "mapping key".to_string(),
            TokenKind::Value => "\":\"".to_string(),
            TokenKind::FlowSequenceStart => "\"[\"".to_string(),
            TokenKind::FlowSequenceEnd => "\"]\"".to_string(),
            TokenKind::FlowMappingStart => "\"{\"".to_string(),
            TokenKind::FlowMappingEnd => "\"}\"".to_string(),
            TokenKind::FlowEntry => "\",\"".to_string(),
            TokenKind::Alias(name) => format!("alias *{}", name),
            TokenKind::Anchor(name) => format!("anchor &{}", name),
            TokenKind::Tag(tag) => format!("tag !{}", tag),
            TokenKind::Scalar(_, text) => format!("scalar {:?}", text),
        }
    }
}

/// A single token with the position where it starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: Mark,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IndentKind {
    Mapping,
    Sequence,
    /// A sequence whose `-` sits at its parent mapping's column.
    IndentlessSequence,
}

#[derive(Clone, Copy, Debug)]
struct Indent {
    col: usize,
    kind: IndentKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FlowKind {
    Sequence,
    Mapping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Chomp {
    Strip,
    Clip,
    Keep,
}

/// Pull-based YAML tokenizer.
pub struct Lexer<'a> {
    cur: Cursor<'a>,
    ctx: &'a ParseContext,
    queue: VecDeque<Token>,
    indents: Vec<Indent>,
    /// Open flow collections with the mark of their opening bracket.
    flows: Vec<(FlowKind, Mark)>,
    /// A simple key or block entry may start at the current position.
    allow_simple_key: bool,
    /// A `Key` was emitted and its `:` has not been seen yet.
    key_open: bool,
    /// The previous token was a quoted scalar or flow end, so `:` may
    /// follow it directly in flow context (`{"a":1}`).
    adjacent_value: bool,
    seen_content: bool,
    done: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, ctx: &'a ParseContext) -> Self {
        Self {
            cur: Cursor::new(src),
            ctx,
            queue: VecDeque::new(),
            indents: Vec::new(),
            flows: Vec::new(),
            allow_simple_key: true,
            key_open: false,
            adjacent_value: false,
            seen_content: false,
            done: false,
        }
    }

    /// Produce the next token. After the end of input this keeps
    /// returning `StreamEnd`.
    pub fn next_token(&mut self) -> Result<Token> {
        if self.queue.is_empty() {
            self.fetch()?;
        }
        Ok(self.queue.pop_front().unwrap_or(Token {
            kind: TokenKind::StreamEnd,
            start: self.cur.mark(),
        }))
    }

    fn push(&mut self, kind: TokenKind, start: Mark) {
        if !matches!(kind, TokenKind::BlockEnd | TokenKind::StreamEnd) {
            self.seen_content = true;
        }
        self.queue.push_back(Token { kind, start });
    }

    fn in_flow(&self) -> bool {
        !self.flows.is_empty()
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    fn fetch(&mut self) -> Result<()> {
        if self.done {
            self.push(TokenKind::StreamEnd, self.cur.mark());
            return Ok(());
        }

        self.skip_to_next_token()?;
        let mark = self.cur.mark();

        let Some(ch) = self.cur.peek() else {
            if let Some(&(_, open)) = self.flows.last() {
                return Err(LexError::UnterminatedFlow(self.ctx.location(open)).into());
            }
            self.unwind_indent(None, mark);
            self.done = true;
            self.push(TokenKind::StreamEnd, mark);
            return Ok(());
        };

        if mark.col == 0 && self.at_document_marker() {
            return self.fetch_document_marker(mark);
        }

        if !self.in_flow() {
            self.unwind_indent(Some(mark.col), mark);
        }

        let flow = self.in_flow();
        match ch {
            '[' => {
                self.maybe_simple_key(mark);
                self.fetch_flow_start(FlowKind::Sequence, mark);
            }
            '{' => {
                self.maybe_simple_key(mark);
                self.fetch_flow_start(FlowKind::Mapping, mark);
            }
            ']' => self.fetch_flow_end(FlowKind::Sequence, mark)?,
            '}' => self.fetch_flow_end(FlowKind::Mapping, mark)?,
            ',' if flow => {
                self.cur.bump();
                self.allow_simple_key = true;
                self.adjacent_value = false;
                self.push(TokenKind::FlowEntry, mark);
            }
            '-' if self.cur.is_blank_at(1) => self.fetch_block_entry(mark)?,
            '?' if self.cur.is_blank_at(1) || (flow && self.flow_indicator_at(1)) => {
                self.fetch_key(mark)?
            }
            ':' if self.cur.is_blank_at(1)
                || (flow && (self.flow_indicator_at(1) || self.adjacent_value)) =>
            {
                self.fetch_value(mark)?
            }
            '*' => {
                self.maybe_simple_key(mark);
                self.fetch_alias_or_anchor(true, mark)?;
            }
            '&' => {
                self.maybe_simple_key(mark);
                self.fetch_alias_or_anchor(false, mark)?;
            }
            '!' => {
                self.maybe_simple_key(mark);
                self.fetch_tag(mark)?;
            }
            '|' | '>' if !flow => self.fetch_block_scalar(ch == '>', mark)?,
            '\'' | '"' => {
                self.maybe_simple_key(mark);
                self.fetch_quoted(ch == '"', mark)?;
            }
            '@' | '`' => {
                return Err(LexError::ReservedIndicator(ch, self.ctx.location(mark)).into())
            }
            ',' | '|' | '>' | '#' => {
                return Err(LexError::UnexpectedChar(ch, self.ctx.location(mark)).into())
            }
            _ => {
                self.maybe_simple_key(mark);
                self.fetch_plain(mark);
            }
        }
        Ok(())
    }

    /// Skip whitespace, comments, line breaks and leading directives.
    fn skip_to_next_token(&mut self) -> Result<()> {
        loop {
            let line_start = self.cur.col() == 0;
            if line_start && !self.in_flow() {
                self.allow_simple_key = true;
            }

            let mut tab: Option<Mark> = None;
            while let Some(c) = self.cur.peek() {
                match c {
                    ' ' => {}
                    '\t' => {
                        if line_start && tab.is_none() {
                            tab = Some(self.cur.mark());
                        }
                    }
                    _ => break,
                }
                self.cur.bump();
            }

            match self.cur.peek() {
                None => return Ok(()),
                Some('\n') => {
                    self.cur.bump();
                }
                Some('#') => self.skip_line(),
                Some('%')
                    if self.cur.col() == 0
                        && !self.in_flow()
                        && self.indents.is_empty()
                        && !self.seen_content =>
                {
                    self.skip_line()
                }
                Some(_) => {
                    if let Some(tab) = tab.filter(|_| !self.in_flow()) {
                        return Err(LexError::TabIndent(self.ctx.location(tab)).into());
                    }
                    return Ok(());
                }
            }
        }
    }

    fn skip_line(&mut self) {
        let end = self.cur.pos() + self.cur.rest_of_line().len();
        self.cur.advance_to(end);
    }

    fn at_document_marker(&self) -> bool {
        (self.cur.starts_with("---") || self.cur.starts_with("...")) && self.cur.is_blank_at(3)
    }

    fn flow_indicator_at(&self, n: usize) -> bool {
        matches!(self.cur.peek_at(n), Some(',' | '[' | ']' | '{' | '}'))
    }

    /// Close block collections deeper than `col`, or all of them for `None`.
    fn unwind_indent(&mut self, col: Option<usize>, mark: Mark) {
        while let Some(top) = self.indents.last().copied() {
            let close = match col {
                None => true,
                Some(col) => {
                    top.col > col
                        || (top.col == col
                            && top.kind == IndentKind::IndentlessSequence
                            && !(self.cur.peek() == Some('-') && self.cur.is_blank_at(1)))
                }
            };
            if !close {
                break;
            }
            self.indents.pop();
            self.push(TokenKind::BlockEnd, mark);
        }
    }

    /// Whether a block collection starting at `col` would be a new one.
    fn opens_block(&self, col: usize) -> bool {
        self.indents.last().map_or(true, |top| top.col < col)
    }

    fn open_block_mapping(&mut self, mark: Mark) {
        if self.opens_block(mark.col) {
            self.indents.push(Indent {
                col: mark.col,
                kind: IndentKind::Mapping,
            });
            self.push(TokenKind::BlockMappingStart, mark);
        }
    }

    // ========================================================================
    // Indicators
    // ========================================================================

    fn fetch_document_marker(&mut self, mark: Mark) -> Result<()> {
        if let Some(&(_, open)) = self.flows.last() {
            return Err(LexError::UnterminatedFlow(self.ctx.location(open)).into());
        }
        self.unwind_indent(None, mark);
        let kind = if self.cur.starts_with("---") {
            TokenKind::DocumentStart
        } else {
            TokenKind::DocumentEnd
        };
        self.cur.bump_n(3);
        self.allow_simple_key = false;
        self.key_open = false;
        self.push(kind, mark);
        Ok(())
    }

    fn maybe_simple_key(&mut self, mark: Mark) {
        if self.in_flow() || !self.allow_simple_key || !self.simple_key_ahead() {
            return;
        }
        self.open_block_mapping(mark);
        self.push(TokenKind::Key, mark);
        self.key_open = true;
        self.allow_simple_key = false;
    }

    fn fetch_flow_start(&mut self, kind: FlowKind, mark: Mark) {
        self.cur.bump();
        self.flows.push((kind, mark));
        self.allow_simple_key = true;
        self.adjacent_value = false;
        self.push(
            match kind {
                FlowKind::Sequence => TokenKind::FlowSequenceStart,
                FlowKind::Mapping => TokenKind::FlowMappingStart,
            },
            mark,
        );
    }

    fn fetch_flow_end(&mut self, kind: FlowKind, mark: Mark) -> Result<()> {
        match self.flows.pop() {
            Some((open, _)) if open == kind => {}
            _ => {
                let loc = self.ctx.location(mark);
                return Err(match kind {
                    FlowKind::Sequence => ParseError::UnmatchedBracket(loc),
                    FlowKind::Mapping => ParseError::UnmatchedBrace(loc),
                }
                .into());
            }
        }
        self.cur.bump();
        self.allow_simple_key = false;
        self.adjacent_value = true;
        self.push(
            match kind {
                FlowKind::Sequence => TokenKind::FlowSequenceEnd,
                FlowKind::Mapping => TokenKind::FlowMappingEnd,
            },
            mark,
        );
        Ok(())
    }

    fn fetch_block_entry(&mut self, mark: Mark) -> Result<()> {
        if self.in_flow() || !self.allow_simple_key {
            return Err(ParseError::UnexpectedEntry(self.ctx.location(mark)).into());
        }
        match self.indents.last().copied() {
            Some(top) if top.col == mark.col && top.kind == IndentKind::Mapping => {
                self.indents.push(Indent {
                    col: mark.col,
                    kind: IndentKind::IndentlessSequence,
                });
                self.push(TokenKind::BlockSequenceStart, mark);
            }
            _ if self.opens_block(mark.col) => {
                self.indents.push(Indent {
                    col: mark.col,
                    kind: IndentKind::Sequence,
                });
                self.push(TokenKind::BlockSequenceStart, mark);
            }
            _ => {}
        }
        self.cur.bump();
        self.allow_simple_key = true;
        self.adjacent_value = false;
        self.push(TokenKind::BlockEntry, mark);
        Ok(())
    }

    fn fetch_key(&mut self, mark: Mark) -> Result<()> {
        if !self.in_flow() {
            if !self.allow_simple_key {
                return Err(ParseError::Unexpected {
                    found: "\"?\"".to_string(),
                    expected: "a node",
                    location: self.ctx.location(mark),
                }
                .into());
            }
            self.open_block_mapping(mark);
        }
        self.cur.bump();
        self.allow_simple_key = true;
        self.key_open = true;
        self.adjacent_value = false;
        self.push(TokenKind::Key, mark);
        Ok(())
    }

    fn fetch_value(&mut self, mark: Mark) -> Result<()> {
        if !self.in_flow() {
            if !self.key_open {
                if !self.allow_simple_key {
                    return Err(ParseError::UnexpectedValue(self.ctx.location(mark)).into());
                }
                self.open_block_mapping(mark);
            }
            self.allow_simple_key = false;
        } else {
            self.allow_simple_key = true;
        }
        self.cur.bump();
        self.key_open = false;
        self.adjacent_value = false;
        self.push(TokenKind::Value, mark);
        Ok(())
    }

    fn fetch_alias_or_anchor(&mut self, alias: bool, mark: Mark) -> Result<()> {
        self.cur.bump();
        let start = self.cur.pos();
        while !self.cur.is_blank_at(0) && !self.flow_indicator_at(0) {
            self.cur.bump();
        }
        let name = self.cur.slice(start, self.cur.pos());
        if name.is_empty() {
            return Err(LexError::EmptyAnchorName(self.ctx.location(mark)).into());
        }
        let name = name.to_string();
        self.allow_simple_key = false;
        self.adjacent_value = alias;
        self.push(
            if alias {
                TokenKind::Alias(name)
            } else {
                TokenKind::Anchor(name)
            },
            mark,
        );
        Ok(())
    }

    fn fetch_tag(&mut self, mark: Mark) -> Result<()> {
        self.cur.bump();
        let start = self.cur.pos();
        if self.cur.peek() == Some('<') {
            let Some(len) = self.cur.rest_of_line().find('>') else {
                return Err(LexError::InvalidTag(self.ctx.location(mark)).into());
            };
            let verbatim = &self.cur.rest_of_line()[..=len];
            if verbatim.len() < 3 || verbatim.contains([' ', '\t']) {
                return Err(LexError::InvalidTag(self.ctx.location(mark)).into());
            }
            self.cur.bump_n(verbatim.chars().count());
        } else {
            while !self.cur.is_blank_at(0) && !(self.in_flow() && self.flow_indicator_at(0)) {
                self.cur.bump();
            }
        }
        if !self.cur.is_blank_at(0) && !(self.in_flow() && self.flow_indicator_at(0)) {
            return Err(LexError::InvalidTag(self.ctx.location(mark)).into());
        }
        let tag = self.cur.slice(start, self.cur.pos()).to_string();
        self.allow_simple_key = false;
        self.adjacent_value = false;
        self.push(TokenKind::Tag(tag), mark);
        Ok(())
    }

    // ========================================================================
    // Simple Key Lookahead
    // ========================================================================

    /// Whether the rest of this line is a single node followed by `:`.
    fn simple_key_ahead(&self) -> bool {
        let b = self.cur.rest_of_line().as_bytes();
        let mut i = 0;

        // Node properties.
        while matches!(b.get(i), Some(b'&' | b'!')) {
            while i < b.len() && !is_space(b[i]) {
                i += 1;
            }
            while i < b.len() && is_space(b[i]) {
                i += 1;
            }
        }

        match b.get(i) {
            None | Some(b'#') => return false,
            Some(b'*') => {
                i += 1;
                while i < b.len() && !is_space(b[i]) && !is_flow_indicator(b[i]) {
                    i += 1;
                }
            }
            Some(b'"' | b'\'') => match skip_quoted(b, i) {
                Some(end) => i = end,
                None => return false,
            },
            Some(b'[' | b'{') => {
                let mut depth = 0usize;
                loop {
                    match b.get(i) {
                        None => return false,
                        Some(b'[' | b'{') => depth += 1,
                        Some(b']' | b'}') => {
                            depth -= 1;
                            if depth == 0 {
                                i += 1;
                                break;
                            }
                        }
                        Some(b'"' | b'\'') => match skip_quoted(b, i) {
                            Some(end) => {
                                i = end;
                                continue;
                            }
                            None => return false,
                        },
                        Some(_) => {}
                    }
                    i += 1;
                }
            }
            Some(&c) => {
                let next_blank = b.get(i + 1).map_or(true, |&n| is_space(n));
                if matches!(c, b'-' | b'?' | b':') && next_blank {
                    return false;
                }
                if matches!(c, b',' | b']' | b'}' | b'|' | b'>' | b'@' | b'`') {
                    return false;
                }
                // A plain key ends at the first `: `.
                let mut j = i;
                while j < b.len() {
                    match b[j] {
                        b':' if b.get(j + 1).map_or(true, |&n| is_space(n)) => return true,
                        b'#' if j > i && is_space(b[j - 1]) => return false,
                        _ => j += 1,
                    }
                }
                return false;
            }
        }

        while i < b.len() && is_space(b[i]) {
            i += 1;
        }
        b.get(i) == Some(&b':') && b.get(i + 1).map_or(true, |&n| is_space(n))
    }

    // ========================================================================
    // Scalars
    // ========================================================================

    fn fetch_plain(&mut self, mark: Mark) {
        let text = self.scan_plain();
        self.allow_simple_key = false;
        self.adjacent_value = false;
        self.push(TokenKind::Scalar(ScalarStyle::Plain, text), mark);
    }

    /// Scan a plain scalar, folding continuation lines.
    fn scan_plain(&mut self) -> String {
        let flow = self.in_flow();
        let indent = self.indents.last().map_or(-1, |top| top.col as isize);
        let mut text = String::new();

        loop {
            let start = self.cur.pos();
            let mut end = start;
            let mut after_space = false;
            while let Some(c) = self.cur.peek() {
                match c {
                    '\n' => break,
                    ':' if self.cur.is_blank_at(1) || (flow && self.flow_indicator_at(1)) => break,
                    ',' | '[' | ']' | '{' | '}' if flow => break,
                    '#' if after_space => break,
                    ' ' | '\t' => {
                        self.cur.bump();
                        after_space = true;
                    }
                    _ => {
                        self.cur.bump();
                        end = self.cur.pos();
                        after_space = false;
                    }
                }
            }
            text.push_str(self.cur.slice(start, end));

            if self.cur.peek() != Some('\n') {
                return text;
            }

            // Look past the line break for a continuation line.
            let mut look = self.cur;
            let mut breaks = 0;
            loop {
                if look.peek() == Some('\n') {
                    look.bump();
                    breaks += 1;
                }
                while matches!(look.peek(), Some(' ' | '\t')) {
                    look.bump();
                }
                if look.peek() != Some('\n') {
                    break;
                }
            }
            let continues = match look.peek() {
                None | Some('#') => false,
                Some(':') if look.is_blank_at(1) => false,
                Some(',' | '[' | ']' | '{' | '}') if flow => false,
                Some(_) => {
                    let doc_marker = look.col() == 0
                        && (look.starts_with("---") || look.starts_with("..."))
                        && look.is_blank_at(3);
                    !doc_marker && (flow || look.col() as isize > indent)
                }
            };
            if !continues {
                return text;
            }
            if breaks == 1 {
                text.push(' ');
            } else {
                for _ in 1..breaks {
                    text.push('\n');
                }
            }
            self.cur = look;
        }
    }

    fn fetch_quoted(&mut self, double: bool, mark: Mark) -> Result<()> {
        let text = self.scan_quoted(double, mark)?;
        self.allow_simple_key = false;
        self.adjacent_value = true;
        let style = if double {
            ScalarStyle::DoubleQuoted
        } else {
            ScalarStyle::SingleQuoted
        };
        self.push(TokenKind::Scalar(style, text), mark);
        Ok(())
    }

    fn scan_quoted(&mut self, double: bool, mark: Mark) -> Result<String> {
        self.cur.bump();
        let mut text = String::new();
        loop {
            // Length of `text` before trailing unescaped whitespace on this line.
            let mut trailing: Option<usize> = None;
            loop {
                match self.cur.peek() {
                    None => {
                        return Err(LexError::UnterminatedQuote(self.ctx.location(mark)).into())
                    }
                    Some('\n') => break,
                    Some('\'') if !double => {
                        self.cur.bump();
                        if self.cur.peek() == Some('\'') {
                            self.cur.bump();
                            text.push('\'');
                            trailing = None;
                        } else {
                            return Ok(text);
                        }
                    }
                    Some('"') if double => {
                        self.cur.bump();
                        return Ok(text);
                    }
                    Some('\\') if double => {
                        if self.cur.peek_at(1) == Some('\n') {
                            // Escaped line break joins lines without a space.
                            self.cur.bump_n(2);
                            self.cur.skip_inline_space();
                        } else {
                            self.scan_escape(&mut text)?;
                        }
                        trailing = None;
                    }
                    Some(c @ (' ' | '\t')) => {
                        trailing.get_or_insert(text.len());
                        text.push(c);
                        self.cur.bump();
                    }
                    Some(c) => {
                        text.push(c);
                        self.cur.bump();
                        trailing = None;
                    }
                }
            }

            if let Some(len) = trailing {
                text.truncate(len);
            }
            let mut breaks = 0;
            while self.cur.peek() == Some('\n') {
                self.cur.bump();
                breaks += 1;
                self.cur.skip_inline_space();
            }
            if breaks == 1 {
                text.push(' ');
            } else {
                for _ in 1..breaks {
                    text.push('\n');
                }
            }
        }
    }

    /// Decode one backslash escape, with the cursor on the backslash.
    fn scan_escape(&mut self, out: &mut String) -> Result<()> {
        let mark = self.cur.mark();
        self.cur.bump();
        let Some(esc) = self.cur.bump() else {
            return Err(LexError::BadEscape(self.ctx.location(mark)).into());
        };
        let ch = match esc {
            '0' => '\0',
            'a' => '\x07',
            'b' => '\x08',
            't' | '\t' => '\t',
            'n' => '\n',
            'v' => '\x0B',
            'f' => '\x0C',
            'r' => '\r',
            'e' => '\x1B',
            ' ' => ' ',
            '"' => '"',
            '/' => '/',
            '\\' => '\\',
            'N' => '\u{85}',
            '_' => '\u{A0}',
            'L' => '\u{2028}',
            'P' => '\u{2029}',
            'x' => self.scan_hex_escape(2, mark)?,
            'u' => self.scan_hex_escape(4, mark)?,
            'U' => self.scan_hex_escape(8, mark)?,
            _ => return Err(LexError::BadEscape(self.ctx.location(mark)).into()),
        };
        out.push(ch);
        Ok(())
    }

    fn scan_hex_escape(&mut self, digits: usize, mark: Mark) -> Result<char> {
        let mut code: u32 = 0;
        for _ in 0..digits {
            let digit = self.cur.peek().and_then(|c| c.to_digit(16));
            let Some(digit) = digit else {
                return Err(LexError::BadUnicodeEscape(self.ctx.location(mark)).into());
            };
            code = code * 16 + digit;
            self.cur.bump();
        }
        // Rejects surrogates and anything past U+10FFFF.
        char::from_u32(code)
            .ok_or_else(|| LexError::BadUnicodeEscape(self.ctx.location(mark)).into())
    }

    fn fetch_block_scalar(&mut self, folded: bool, mark: Mark) -> Result<()> {
        let text = self.scan_block_scalar(folded, mark)?;
        self.allow_simple_key = true;
        self.key_open = false;
        self.adjacent_value = false;
        let style = if folded {
            ScalarStyle::Folded
        } else {
            ScalarStyle::Literal
        };
        self.push(TokenKind::Scalar(style, text), mark);
        Ok(())
    }

    fn scan_block_scalar(&mut self, folded: bool, mark: Mark) -> Result<String> {
        self.cur.bump();

        let mut chomp: Option<Chomp> = None;
        let mut increment: Option<usize> = None;
        loop {
            match self.cur.peek() {
                Some('+') if chomp.is_none() => chomp = Some(Chomp::Keep),
                Some('-') if chomp.is_none() => chomp = Some(Chomp::Strip),
                Some(c @ '1'..='9') if increment.is_none() => {
                    increment = c.to_digit(10).map(|d| d as usize)
                }
                _ => break,
            }
            self.cur.bump();
        }
        let chomp = chomp.unwrap_or(Chomp::Clip);

        let before_space = self.cur.pos();
        self.cur.skip_inline_space();
        match self.cur.peek() {
            Some('#') if self.cur.pos() > before_space => self.skip_line(),
            None | Some('\n') => {}
            Some(_) => return Err(LexError::BadBlockHeader(self.ctx.location(mark)).into()),
        }
        if self.cur.peek() == Some('\n') {
            self.cur.bump();
        }

        let parent = self.indents.last().map_or(-1, |top| top.col as isize);
        let min_indent = (parent + 1).max(1) as usize;
        let mut indent = increment.map(|d| parent.max(0) as usize + d);

        let src = self.cur.source();
        let mut pos = self.cur.pos();
        let mut end = pos;
        let mut text = String::new();
        let mut pending_breaks = 0usize;
        let mut has_content = false;
        let mut last_more_indented = false;
        let mut last_had_break = false;

        while pos < src.len() {
            let line_end = src[pos..].find('\n').map_or(src.len(), |i| pos + i);
            let line = &src[pos..line_end];
            let next = (line_end + 1).min(src.len());
            let spaces = line.bytes().take_while(|&b| b == b' ').count();
            let blank = spaces == line.len();

            if indent.is_none() && !blank {
                if spaces < min_indent {
                    break;
                }
                indent = Some(spaces);
            }

            let content_indent = indent.unwrap_or(usize::MAX);
            if blank && spaces <= content_indent {
                if line_end == src.len() {
                    // Trailing spaces with no line break after them.
                    end = line_end;
                    break;
                }
                pending_breaks += 1;
                pos = next;
                end = next;
                continue;
            }
            if spaces < content_indent {
                break;
            }

            let content = &line[content_indent..];
            let more_indented = content.starts_with([' ', '\t']);
            if has_content {
                if folded && !more_indented && !last_more_indented {
                    if pending_breaks == 0 {
                        text.push(' ');
                    }
                } else {
                    text.push('\n');
                }
            }
            for _ in 0..pending_breaks {
                text.push('\n');
            }
            text.push_str(content);

            has_content = true;
            last_more_indented = more_indented;
            last_had_break = line_end < src.len();
            pending_breaks = 0;
            pos = next;
            end = next;
        }

        match chomp {
            Chomp::Strip => {}
            Chomp::Clip => {
                if has_content && last_had_break {
                    text.push('\n');
                }
            }
            Chomp::Keep => {
                if has_content && last_had_break {
                    text.push('\n');
                }
                for _ in 0..pending_breaks {
                    text.push('\n');
                }
            }
        }

        self.cur.advance_to(end);
        Ok(text)
    }
}

fn is_space(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn is_flow_indicator(b: u8) -> bool {
    matches!(b, b',' | b'[' | b']' | b'{' | b'}')
}

/// Index just past the quoted scalar starting at `i`, if it closes on this line.
fn skip_quoted(b: &[u8], i: usize) -> Option<usize> {
    let quote = b[i];
    let mut j = i + 1;
    while j < b.len() {
        match b[j] {
            b'\\' if quote == b'"' => j += 2,
            c if c == quote => {
                if quote == b'\'' && b.get(j + 1) == Some(&b'\'') {
                    j += 2;
                } else {
                    return Some(j + 1);
                }
            }
            _ => j += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind::*;

    fn lex(src: &str) -> Result<Vec<TokenKind>> {
        let ctx = ParseContext::default();
        let mut lexer = Lexer::new(src, &ctx);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let end = token.kind == StreamEnd;
            out.push(token.kind);
            if end {
                return Ok(out);
            }
        }
    }

    fn plain(s: &str) -> TokenKind {
        Scalar(ScalarStyle::Plain, s.to_string())
    }

    fn scalars(src: &str) -> Vec<String> {
        lex(src)
            .unwrap()
            .into_iter()
            .filter_map(|k| match k {
                Scalar(_, s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_block_mapping_with_flow_value() {
        assert_eq!(
            lex("a: 1\nb: [x, y]\n").unwrap(),
            vec![
                BlockMappingStart,
                Key,
                plain("a"),
                Value,
                plain("1"),
                Key,
                plain("b"),
                Value,
                FlowSequenceStart,
                plain("x"),
                FlowEntry,
                plain("y"),
                FlowSequenceEnd,
                BlockEnd,
                StreamEnd,
            ]
        );
    }

    #[test]
    fn test_nested_blocks_and_indentless_sequence() {
        assert_eq!(
            lex("k:\n- a\n- b: c\nz: ~\n").unwrap(),
            vec![
                BlockMappingStart,
                Key,
                plain("k"),
                Value,
                BlockSequenceStart,
                BlockEntry,
                plain("a"),
                BlockEntry,
                BlockMappingStart,
                Key,
                plain("b"),
                Value,
                plain("c"),
                BlockEnd,
                BlockEnd,
                Key,
                plain("z"),
                Value,
                plain("~"),
                BlockEnd,
                StreamEnd,
            ]
        );
    }

    #[test]
    fn test_properties_and_alias() {
        assert_eq!(
            lex("&a !t x: *a\n").unwrap(),
            vec![
                BlockMappingStart,
                Key,
                Anchor("a".into()),
                Tag("t".into()),
                plain("x"),
                Value,
                Alias("a".into()),
                BlockEnd,
                StreamEnd,
            ]
        );
        assert_eq!(
            lex("!!str 42").unwrap(),
            vec![Tag("!str".into()), plain("42"), StreamEnd]
        );
    }

    #[test]
    fn test_plain_scalars() {
        assert_eq!(scalars("a b  # note\n"), vec!["a b"]);
        assert_eq!(scalars("k: one\n  two\n\n  three\n"), vec!["k", "one two\nthree"]);
        assert_eq!(scalars("url: http://x.y/z#frag\n"), vec!["url", "http://x.y/z#frag"]);
        assert_eq!(scalars("[a:b, c]"), vec!["a:b", "c"]);
    }

    #[test]
    fn test_quoted_scalars() {
        assert_eq!(scalars(r#""a\tb\u00e9\x41""#), vec!["a\tbéA"]);
        assert_eq!(scalars("'it''s'"), vec!["it's"]);
        assert_eq!(scalars("\"one\n  two\n\n  three\""), vec!["one two\nthree"]);
        assert_eq!(scalars("\"ab\\\n   cd\""), vec!["abcd"]);
        assert_eq!(scalars("{\"a\":1}"), vec!["a", "1"]);
    }

    #[test]
    fn test_block_scalars() {
        assert_eq!(scalars("a: |\n  x\n   y\n\nb: 1\n"), vec!["a", "x\n y\n", "b", "1"]);
        assert_eq!(scalars("a: |-\n  x\n"), vec!["a", "x"]);
        assert_eq!(scalars("a: |+\n  x\n\n"), vec!["a", "x\n\n"]);
        assert_eq!(scalars("a: >\n  one\n  two\n\n  three\n"), vec!["a", "one two\nthree\n"]);
        assert_eq!(scalars("a: >\n  one\n    more\n  two\n"), vec!["a", "one\n  more\ntwo\n"]);
        assert_eq!(scalars("- |2\n    lead\n"), vec!["  lead\n"]);
        assert_eq!(scalars("a: |\nb: 1\n"), vec!["a", "", "b", "1"]);
    }

    #[test]
    fn test_document_markers_and_directives() {
        assert_eq!(
            lex("%YAML 1.2\n--- x\n...\n").unwrap(),
            vec![DocumentStart, plain("x"), DocumentEnd, StreamEnd]
        );
    }

    #[test]
    fn test_lex_errors() {
        let err = lex("a:\n\tb: 1\n").unwrap_err();
        assert_eq!(err.to_string(), "Tab not allowed in indentation (use spaces) at 2:1");

        let err = lex("a: \"open\n").unwrap_err();
        assert_eq!(err.to_string(), "Unterminated quoted scalar at 1:4");

        let err = lex("[a, b").unwrap_err();
        assert_eq!(err.to_string(), "Unterminated flow collection at 1:1");

        let err = lex("@x").unwrap_err();
        assert_eq!(err.to_string(), "Reserved indicator \"@\" at 1:1");

        assert!(lex("\"\\q\"").unwrap_err().is_lex());
        assert!(lex("| x\n").unwrap_err().is_lex());
        assert!(lex("&\n").unwrap_err().is_lex());
    }

    #[test]
    fn test_structural_errors() {
        let err = lex("a: b: c\n").unwrap_err();
        assert_eq!(err.to_string(), "Mapping values are not allowed here at 1:5");

        let err = lex("a: - b\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Block sequence entries are not allowed here at 1:4"
        );

        assert_eq!(lex("]").unwrap_err().to_string(), "Unmatched bracket at 1:1");
        assert_eq!(lex("[}").unwrap_err().to_string(), "Unmatched brace at 1:2");
    }
}
