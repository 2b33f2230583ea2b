//! Phase 1: Scanner
//!
//! The scanner prepares raw source text for the lexer. It performs:
//! - BOM removal
//! - Code point validation (YAML's printable set)
//! - Line break normalization (CRLF and lone CR become LF)
//!
//! It also provides the character cursor the lexer walks, which keeps
//! track of line and column for error reporting.

use std::borrow::Cow;

use crate::error::{LexError, ParseContext, Result};

/// A zero-based position in the prepared source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Mark {
    /// Byte offset.
    pub index: usize,
    pub line: usize,
    pub col: usize,
}

/// Validate and normalize source text.
pub fn prepare<'a>(source: &'a str, ctx: &ParseContext) -> Result<Cow<'a, str>> {
    let source = source.strip_prefix('\u{FEFF}').unwrap_or(source);

    validate_code_points(source, ctx)?;

    if source.contains('\r') {
        Ok(Cow::Owned(source.replace("\r\n", "\n").replace('\r', "\n")))
    } else {
        Ok(Cow::Borrowed(source))
    }
}

/// Check whether a code point may appear in a YAML stream.
fn is_allowed_code_point(cp: u32) -> bool {
    cp == 0x0009
        || cp == 0x000A
        || cp == 0x000D
        || (0x0020..=0x007E).contains(&cp)
        || cp == 0x0085
        || (0x00A0..=0xD7FF).contains(&cp)
        || (0xE000..=0xFFFD).contains(&cp)
        || (0x10000..=0x10FFFF).contains(&cp)
}

/// Validate that the source contains no forbidden code points.
fn validate_code_points(source: &str, ctx: &ParseContext) -> Result<()> {
    let mut line = 0;
    let mut col = 0;
    for (index, ch) in source.char_indices() {
        let cp = ch as u32;
        if !is_allowed_code_point(cp) {
            let loc = ctx.location(Mark { index, line, col });
            return Err(LexError::ForbiddenCodePoint(cp, loc).into());
        }
        if ch == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
    }
    Ok(())
}

/// Character cursor over prepared source.
#[derive(Clone, Copy, Debug)]
pub struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 0,
            col: 0,
        }
    }

    pub fn mark(&self) -> Mark {
        Mark {
            index: self.pos,
            line: self.line,
            col: self.col,
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn col(&self) -> usize {
        self.col
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    /// Space, tab, line break, or end of input at offset `n`.
    pub fn is_blank_at(&self, n: usize) -> bool {
        matches!(self.peek_at(n), None | Some(' ' | '\t' | '\n'))
    }

    pub fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    pub fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Remaining text up to (not including) the next line break.
    pub fn rest_of_line(&self) -> &'a str {
        let rest = self.rest();
        &rest[..rest.find('\n').unwrap_or(rest.len())]
    }

    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.src[start..end]
    }

    pub fn source(&self) -> &'a str {
        self.src
    }

    pub fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    pub fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            if self.bump().is_none() {
                break;
            }
        }
    }

    /// Advance to byte offset `pos`, keeping line and column in step.
    pub fn advance_to(&mut self, pos: usize) {
        while self.pos < pos && self.bump().is_some() {}
    }

    /// Skip spaces and tabs on the current line.
    pub fn skip_inline_space(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_strips_bom_and_crlf() {
        let ctx = ParseContext::new(None);
        let text = prepare("\u{FEFF}a: 1\r\nb: 2\r", &ctx).unwrap();
        assert_eq!(text, "a: 1\nb: 2\n");
    }

    #[test]
    fn test_prepare_borrows_clean_input() {
        let ctx = ParseContext::new(None);
        assert!(matches!(prepare("a: 1\n", &ctx).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_forbidden_code_point() {
        let ctx = ParseContext::new(None);
        let err = prepare("ok\nb\u{0007}", &ctx).unwrap_err();
        assert_eq!(err.to_string(), "Forbidden code point U+0007 at 2:2");
    }

    #[test]
    fn test_cursor_tracks_lines() {
        let mut cur = Cursor::new("ab\ncé\n");
        cur.bump_n(4);
        assert_eq!(cur.mark().line, 1);
        assert_eq!(cur.mark().col, 1);
        assert_eq!(cur.peek(), Some('é'));
        cur.bump();
        assert_eq!(cur.peek(), Some('\n'));
        assert!(cur.is_blank_at(0));
        assert_eq!(cur.rest_of_line(), "");
    }
}
