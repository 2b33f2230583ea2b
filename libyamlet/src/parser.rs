//! Phase 3: Parser
//!
//! Recursive descent over the lexer's token stream. Block collections are
//! delimited by the lexer's start and end tokens, flow collections by their
//! brackets. Scalars and tagged collections go through the tag resolver.
//!
//! An anchor is registered in the document before its node is parsed, so a
//! node may refer to itself through an alias.

use std::collections::HashMap;

use tracing::trace;

use crate::document::Document;
use crate::error::{ParseContext, ParseError, Result};
use crate::lexer::{Lexer, ScalarStyle, Token, TokenKind};
use crate::mapping::Mapping;
use crate::options::ParseOptions;
use crate::resolver;
use crate::scanner::Mark;
use crate::value::{AnchorId, Tag, Value};

/// Parse prepared source into a document.
pub fn parse_root(src: &str, ctx: &ParseContext, options: &ParseOptions) -> Result<Document> {
    let mut parser = Parser {
        lexer: Lexer::new(src, ctx),
        peeked: None,
        doc: Document::default(),
        names: HashMap::new(),
        ctx,
        max_depth: options.max_depth,
        depth: 0,
    };
    parser.parse_document()?;
    Ok(parser.doc)
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Token>,
    doc: Document,
    /// Most recent definition of each anchor name.
    names: HashMap<String, AnchorId>,
    ctx: &'a ParseContext,
    max_depth: usize,
    depth: usize,
}

/// Node properties collected before a node.
#[derive(Default)]
struct Properties {
    anchor: Option<(String, Mark)>,
    tag: Option<Tag>,
}

impl Properties {
    fn is_empty(&self) -> bool {
        self.anchor.is_none() && self.tag.is_none()
    }
}

impl<'a> Parser<'a> {
    // ========================================================================
    // Token Access
    // ========================================================================

    fn peek(&mut self) -> Result<&Token> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        Ok(self.peeked.insert(token))
    }

    fn peek_kind(&mut self) -> Result<&TokenKind> {
        Ok(&self.peek()?.kind)
    }

    fn next(&mut self) -> Result<Token> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lexer.next_token(),
        }
    }

    fn unexpected(&self, token: &Token, expected: &'static str) -> ParseError {
        ParseError::Unexpected {
            found: token.kind.describe(),
            expected,
            location: self.ctx.location(token.start),
        }
    }

    // ========================================================================
    // Document
    // ========================================================================

    fn parse_document(&mut self) -> Result<()> {
        if *self.peek_kind()? == TokenKind::DocumentStart {
            self.next()?;
        }

        let root = match self.peek_kind()? {
            TokenKind::StreamEnd | TokenKind::DocumentEnd | TokenKind::DocumentStart => Value::Null,
            _ => self.parse_node()?,
        };
        self.doc.set_root(root);

        if *self.peek_kind()? == TokenKind::DocumentEnd {
            self.next()?;
        }

        let token = self.next()?;
        match token.kind {
            TokenKind::StreamEnd => Ok(()),
            TokenKind::DocumentStart => {
                Err(ParseError::MultipleDocuments(self.ctx.location(token.start)).into())
            }
            _ => Err(self.unexpected(&token, "end of document").into()),
        }
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    fn parse_node(&mut self) -> Result<Value> {
        let props = self.parse_properties()?;

        if let TokenKind::Alias(name) = self.peek_kind()? {
            let name = name.clone();
            let token = self.next()?;
            if !props.is_empty() {
                return Err(ParseError::AliasProperties(self.ctx.location(token.start)).into());
            }
            return match self.names.get(&name) {
                Some(&id) => Ok(Value::Shared(id)),
                None => Err(ParseError::UnknownAnchor(name, self.ctx.location(token.start)).into()),
            };
        }

        // Reserve the anchor first so aliases inside the node can see it.
        let anchor = props.anchor.map(|(name, mark)| {
            let id = self.doc.add_anchor(name.clone(), Value::Null);
            trace!(anchor = %name, id = id.index(), line = mark.line + 1, "registered anchor");
            self.names.insert(name, id);
            id
        });

        let value = self.parse_content(props.tag.as_ref())?;

        Ok(match anchor {
            Some(id) => {
                self.doc.set_anchor(id, value);
                Value::Shared(id)
            }
            None => value,
        })
    }

    fn parse_properties(&mut self) -> Result<Properties> {
        let mut props = Properties::default();
        loop {
            match self.peek_kind()? {
                TokenKind::Anchor(_) => {
                    let token = self.next()?;
                    if props.anchor.is_some() {
                        return Err(ParseError::DuplicateProperty(
                            "anchor",
                            self.ctx.location(token.start),
                        )
                        .into());
                    }
                    if let TokenKind::Anchor(name) = token.kind {
                        props.anchor = Some((name, token.start));
                    }
                }
                TokenKind::Tag(_) => {
                    let token = self.next()?;
                    if props.tag.is_some() {
                        return Err(ParseError::DuplicateProperty(
                            "tag",
                            self.ctx.location(token.start),
                        )
                        .into());
                    }
                    if let TokenKind::Tag(tag) = token.kind {
                        props.tag = Some(Tag::new(tag));
                    }
                }
                _ => return Ok(props),
            }
        }
    }

    fn parse_content(&mut self, tag: Option<&Tag>) -> Result<Value> {
        let token = self.next()?;
        let start = token.start;
        let parse: fn(&mut Self) -> Result<Value> = match token.kind {
            TokenKind::Scalar(style, text) => {
                return resolver::resolve_scalar(&text, style, tag, self.ctx, start)
            }
            TokenKind::FlowSequenceStart => Self::parse_flow_sequence,
            TokenKind::FlowMappingStart => Self::parse_flow_mapping,
            TokenKind::BlockSequenceStart => Self::parse_block_sequence,
            TokenKind::BlockMappingStart => Self::parse_block_mapping,
            // Anything else leaves the node empty.
            kind => {
                self.peeked = Some(Token { kind, start });
                return resolver::resolve_scalar("", ScalarStyle::Plain, tag, self.ctx, start);
            }
        };
        let value = self.nested(start, parse)?;
        resolver::resolve_collection(tag, value, self.ctx, start)
    }

    /// Run a collection parser one level deeper, enforcing the depth limit.
    fn nested(&mut self, start: Mark, parse: fn(&mut Self) -> Result<Value>) -> Result<Value> {
        if self.depth >= self.max_depth {
            return Err(ParseError::TooDeep(self.max_depth, self.ctx.location(start)).into());
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    // ========================================================================
    // Block Collections
    // ========================================================================

    fn parse_block_sequence(&mut self) -> Result<Value> {
        let mut items = Vec::new();
        loop {
            let token = self.next()?;
            match token.kind {
                TokenKind::BlockEntry => items.push(self.parse_node()?),
                TokenKind::BlockEnd => return Ok(Value::Sequence(items)),
                TokenKind::BlockMappingStart | TokenKind::Key | TokenKind::Value => {
                    return Err(ParseError::BadIndentation(self.ctx.location(token.start)).into())
                }
                _ => return Err(self.unexpected(&token, "\"-\" or end of block").into()),
            }
        }
    }

    fn parse_block_mapping(&mut self) -> Result<Value> {
        let mut map = Mapping::new();
        loop {
            let token = self.next()?;
            let key = match &token.kind {
                TokenKind::Key => self.parse_node()?,
                // `: value` with no key.
                TokenKind::Value => {
                    self.peeked = Some(token.clone());
                    Value::Null
                }
                TokenKind::BlockEnd => return Ok(Value::Mapping(map)),
                TokenKind::BlockMappingStart
                | TokenKind::BlockSequenceStart
                | TokenKind::BlockEntry
                | TokenKind::Scalar(..) => {
                    return Err(ParseError::BadIndentation(self.ctx.location(token.start)).into())
                }
                _ => return Err(self.unexpected(&token, "mapping key or end of block").into()),
            };
            let value = if *self.peek_kind()? == TokenKind::Value {
                self.next()?;
                self.parse_node()?
            } else {
                Value::Null
            };
            self.insert_entry(&mut map, key, value, token.start)?;
        }
    }

    // ========================================================================
    // Flow Collections
    // ========================================================================

    fn parse_flow_sequence(&mut self) -> Result<Value> {
        let mut items = Vec::new();
        loop {
            let start = self.peek()?.start;
            match self.peek_kind()? {
                TokenKind::FlowSequenceEnd => {
                    self.next()?;
                    return Ok(Value::Sequence(items));
                }
                TokenKind::FlowEntry => {
                    let token = self.next()?;
                    return Err(self.unexpected(&token, "flow sequence entry").into());
                }
                _ => {}
            }

            // `[? k : v]` and `[k: v]` are single-pair mappings.
            let explicit = *self.peek_kind()? == TokenKind::Key;
            if explicit {
                self.next()?;
            }
            let node = self.parse_flow_node()?;
            if explicit || *self.peek_kind()? == TokenKind::Value {
                let value = if *self.peek_kind()? == TokenKind::Value {
                    self.next()?;
                    self.parse_flow_node()?
                } else {
                    Value::Null
                };
                let mut pair = Mapping::new();
                self.insert_entry(&mut pair, node, value, start)?;
                items.push(Value::Mapping(pair));
            } else {
                items.push(node);
            }

            let token = self.next()?;
            match token.kind {
                TokenKind::FlowEntry => {}
                TokenKind::FlowSequenceEnd => return Ok(Value::Sequence(items)),
                _ => return Err(self.unexpected(&token, "\",\" or \"]\"").into()),
            }
        }
    }

    fn parse_flow_mapping(&mut self) -> Result<Value> {
        let mut map = Mapping::new();
        loop {
            let start = self.peek()?.start;
            match self.peek_kind()? {
                TokenKind::FlowMappingEnd => {
                    self.next()?;
                    return Ok(Value::Mapping(map));
                }
                TokenKind::FlowEntry => {
                    let token = self.next()?;
                    return Err(self.unexpected(&token, "flow mapping entry").into());
                }
                TokenKind::Key => {
                    self.next()?;
                }
                _ => {}
            }

            let key = self.parse_flow_node()?;
            let value = if *self.peek_kind()? == TokenKind::Value {
                self.next()?;
                self.parse_flow_node()?
            } else {
                Value::Null
            };
            self.insert_entry(&mut map, key, value, start)?;

            let token = self.next()?;
            match token.kind {
                TokenKind::FlowEntry => {}
                TokenKind::FlowMappingEnd => return Ok(Value::Mapping(map)),
                _ => return Err(self.unexpected(&token, "\",\" or \"}\"").into()),
            }
        }
    }

    /// A node inside a flow collection; empty before `:`, `,` or a closer.
    fn parse_flow_node(&mut self) -> Result<Value> {
        match self.peek_kind()? {
            TokenKind::Value
            | TokenKind::FlowEntry
            | TokenKind::FlowSequenceEnd
            | TokenKind::FlowMappingEnd => Ok(Value::Null),
            _ => self.parse_node(),
        }
    }

    // ========================================================================
    // Keys
    // ========================================================================

    fn insert_entry(&self, map: &mut Mapping, key: Value, value: Value, at: Mark) -> Result<()> {
        if self.is_duplicate(map, &key) {
            let shown = format!("{:?}", self.doc.resolve(&key));
            return Err(ParseError::DuplicateKey(shown, self.ctx.location(at)).into());
        }
        map.insert(key, value);
        Ok(())
    }

    /// Keys compare by content, looking through anchors.
    fn is_duplicate(&self, map: &Mapping, key: &Value) -> bool {
        if map.contains_key(key) {
            return true;
        }
        // Without anchors no key is a handle, so content equality is all there is.
        if self.doc.anchors().is_empty() {
            return false;
        }
        let resolved = self.doc.resolve(key);
        map.keys().any(|existing| {
            (matches!(existing, Value::Shared(_)) || matches!(key, Value::Shared(_)))
                && self.doc.resolve(existing) == resolved
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<Document> {
        parse_root(src, &ParseContext::default(), &ParseOptions::default())
    }

    fn root(src: &str) -> Value {
        parse(src).unwrap().into_root()
    }

    fn seq(items: Vec<Value>) -> Value {
        Value::Sequence(items)
    }

    fn map(pairs: Vec<(&str, Value)>) -> Value {
        Value::Mapping(pairs.into_iter().map(|(k, v)| (Value::from(k), v)).collect())
    }

    #[test]
    fn test_empty_documents() {
        assert_eq!(root(""), Value::Null);
        assert_eq!(root("# only a comment\n"), Value::Null);
        assert_eq!(root("---\n"), Value::Null);
        assert_eq!(root("--- \n...\n"), Value::Null);
    }

    #[test]
    fn test_block_structures() {
        assert_eq!(
            root("a: 1\nb:\n  - x\n  -\n  - y: z\nc:\n"),
            map(vec![
                ("a", Value::from(1)),
                (
                    "b",
                    seq(vec![Value::from("x"), Value::Null, map(vec![("y", Value::from("z"))])])
                ),
                ("c", Value::Null),
            ])
        );
        assert_eq!(
            root("- - a\n  - b\n- c\n"),
            seq(vec![seq(vec![Value::from("a"), Value::from("b")]), Value::from("c")])
        );
    }

    #[test]
    fn test_explicit_keys() {
        let v = root("? [a, b]\n: 1\n? x\n");
        let m = v.as_mapping().unwrap();
        assert_eq!(
            m.get(&seq(vec![Value::from("a"), Value::from("b")])),
            Some(&Value::from(1))
        );
        assert_eq!(m.get_str("x"), Some(&Value::Null));
    }

    #[test]
    fn test_flow_structures() {
        assert_eq!(
            root("{a: [1, 2], b: {c: d}, e}"),
            map(vec![
                ("a", seq(vec![Value::from(1), Value::from(2)])),
                ("b", map(vec![("c", Value::from("d"))])),
                ("e", Value::Null),
            ])
        );
        assert_eq!(
            root("[a: 1, b, ]"),
            seq(vec![map(vec![("a", Value::from(1))]), Value::from("b")])
        );
    }

    #[test]
    fn test_anchor_and_alias_share_handle() {
        let doc = parse("base: &b {x: 1}\nother: *b\n").unwrap();
        let m = doc.root().as_mapping().unwrap();
        assert_eq!(m.get_str("base"), m.get_str("other"));
        assert_eq!(doc.anchors().len(), 1);
        assert_eq!(doc.get("other"), Some(&map(vec![("x", Value::from(1))])));
    }

    #[test]
    fn test_cycle() {
        let doc = parse("&a [*a]").unwrap();
        let id = doc.root().as_shared().unwrap();
        assert_eq!(
            doc.anchor(id).map(|a| &a.value),
            Some(&Value::Sequence(vec![Value::Shared(id)]))
        );
    }

    #[test]
    fn test_latest_anchor_wins() {
        let doc = parse("- &a 1\n- &a 2\n- *a\n").unwrap();
        let items = doc.root().as_sequence().unwrap();
        assert_eq!(doc.resolve(&items[2]), &Value::from(2));
    }

    #[test]
    fn test_tagged_collections() {
        assert_eq!(
            root("!!seq [a]"),
            seq(vec![Value::from("a")])
        );
        assert_eq!(
            root("!set {a, b}"),
            Value::tagged("set", map(vec![("a", Value::Null), ("b", Value::Null)]))
        );
        assert_eq!(root("k: !foo\n"), map(vec![("k", Value::tagged("foo", Value::from("")))]));
    }

    #[test]
    fn test_structural_errors() {
        let cases = [
            ("{ invalid: yaml: content }", "Unexpected \":\", expected \",\" or \"}\" at 1:16"),
            ("a: 1\n  b: 2\n", "Mapping values are not allowed here at 2:4"),
            ("a:\n    b: 1\n  c: 2\n", "Bad indentation at 3:3"),
            ("*nope", "Unknown anchor \"nope\" at 1:1"),
            ("a: 1\na: 2\n", "Duplicate mapping key \"a\" at 2:1"),
            ("&a *b", "Alias cannot carry an anchor or tag at 1:4"),
            ("!a !b x", "Node has more than one tag at 1:4"),
            ("a\n---\nb\n", "Multiple documents are not supported at 2:1"),
            ("[a,, b]", "Unexpected \",\", expected flow sequence entry at 1:4"),
            ("- a\nb: 1\n", "Bad indentation at 2:1"),
        ];
        for (src, message) in cases {
            let err = parse(src).unwrap_err();
            assert!(err.is_parse(), "{}: {}", src, err);
            assert_eq!(err.to_string(), message, "{}", src);
        }
    }

    #[test]
    fn test_duplicate_through_anchor() {
        let err = parse("&k a: 1\n*k : 2\n").unwrap_err();
        assert_eq!(err.to_string(), "Duplicate mapping key \"a\" at 2:1");
    }

    #[test]
    fn test_wide_mapping() {
        let src: String = (0..20_000).map(|i| format!("k{}: {}\n", i, i)).collect();
        let value = root(&src);
        let m = value.as_mapping().unwrap();
        assert_eq!(m.len(), 20_000);
        assert_eq!(m.get_str("k19999"), Some(&Value::from(19_999)));

        let dup = format!("{}k7: again\n", src);
        let err = parse(&dup).unwrap_err();
        assert_eq!(err.to_string(), "Duplicate mapping key \"k7\" at 20001:1");
    }

    #[test]
    fn test_depth_limit() {
        let deep = "[".repeat(5) + &"]".repeat(5);
        let options = ParseOptions::default().max_depth(4);
        let err = parse_root(&deep, &ParseContext::default(), &options).unwrap_err();
        assert_eq!(err.to_string(), "Nesting exceeds depth limit of 4 at 1:5");
        assert!(parse_root(&deep, &ParseContext::default(), &ParseOptions::default()).is_ok());
    }
}
