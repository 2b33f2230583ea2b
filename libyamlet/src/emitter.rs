//! Phase 4: Emitter
//!
//! Writes a document as block-style YAML. Scalars are plain unless they
//! would read back as something else, multi-line strings use literal block
//! style where that is exact, and shared nodes get `&name` at their first
//! appearance and `*name` after that.

use std::collections::HashMap;
use std::fmt;
use std::io;

use base64::prelude::*;

use crate::document::{Anchor, Document};
use crate::error::{Result, SerializeError};
use crate::mapping::Mapping;
use crate::options::SerializeOptions;
use crate::resolver::resolve_plain;
use crate::value::{AnchorId, Value};

/// Emit a document into a `fmt::Write` sink.
pub fn emit<W: fmt::Write>(doc: &Document, out: &mut W, options: &SerializeOptions) -> Result<()> {
    let mut emitter = Emitter::new(out, doc.anchors(), options);
    emitter.plan(doc.root(), &mut vec![false; doc.anchors().len()], &mut 0)?;
    emitter.write_root(doc.root())
}

/// Emit a document into an `io::Write` sink.
pub fn emit_io<W: io::Write>(doc: &Document, writer: W, options: &SerializeOptions) -> Result<()> {
    let mut adapter = IoAdapter {
        inner: writer,
        error: None,
    };
    let result = emit(doc, &mut adapter, options);
    if let Some(e) = adapter.error.take() {
        return Err(SerializeError::Io(e.to_string()).into());
    }
    result?;
    adapter
        .inner
        .flush()
        .map_err(|e| SerializeError::Io(e.to_string()).into())
}

/// Forwards formatted text to an `io::Write`, keeping the first I/O error.
struct IoAdapter<W> {
    inner: W,
    error: Option<io::Error>,
}

impl<W: io::Write> fmt::Write for IoAdapter<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.inner.write_all(s.as_bytes()).map_err(|e| {
            self.error.get_or_insert(e);
            fmt::Error
        })
    }
}

/// A value classified for layout.
enum Node<'a> {
    /// Fits on the current line.
    Inline(String),
    /// Literal block scalar; `header` includes any properties.
    Literal { header: String, text: &'a str },
    Sequence { props: String, items: &'a [Value] },
    Mapping { props: String, map: &'a Mapping },
}

struct Emitter<'a, W> {
    out: &'a mut W,
    anchors: &'a [Anchor],
    step: usize,
    /// Running count of handle occurrences in output order.
    position: usize,
    /// Position of each handle's last occurrence.
    last_use: Vec<usize>,
    /// Name given to each handle at its first occurrence.
    names: Vec<Option<String>>,
    /// Handle each name currently refers to.
    bound: HashMap<String, AnchorId>,
    generated: usize,
}

impl<'a, W: fmt::Write> Emitter<'a, W> {
    fn new(out: &'a mut W, anchors: &'a [Anchor], options: &SerializeOptions) -> Self {
        Self {
            out,
            anchors,
            step: options.effective_indent(),
            position: 0,
            last_use: vec![0; anchors.len()],
            names: vec![None; anchors.len()],
            bound: HashMap::new(),
            generated: 0,
        }
    }

    /// Walk the tree in output order, recording where each handle is last used.
    fn plan(&mut self, value: &Value, seen: &mut [bool], position: &mut usize) -> Result<()> {
        match value {
            Value::Shared(id) => {
                let anchors = self.anchors;
                let anchor = anchors
                    .get(id.0)
                    .ok_or(SerializeError::DanglingAnchor(id.0))?;
                *position += 1;
                self.last_use[id.0] = *position;
                if !seen[id.0] {
                    seen[id.0] = true;
                    self.plan(&anchor.value, seen, position)?;
                }
            }
            Value::Sequence(items) => {
                for item in items {
                    self.plan(item, seen, position)?;
                }
            }
            Value::Mapping(map) => {
                for (k, v) in map {
                    self.plan(k, seen, position)?;
                    self.plan(v, seen, position)?;
                }
            }
            Value::Tagged(t) => self.plan(&t.value, seen, position)?,
            _ => {}
        }
        Ok(())
    }

    /// Pick the name written for a handle's first occurrence.
    ///
    /// The table name is kept unless it is unusable or an earlier handle
    /// holding it is still referenced later in the output.
    fn choose_name(&mut self, id: AnchorId) -> String {
        let wanted = &self.anchors[id.0].name;
        let clash = self
            .bound
            .get(wanted)
            .is_some_and(|other| self.last_use[other.0] > self.position);
        if is_anchor_name(wanted) && !clash {
            return wanted.clone();
        }
        loop {
            self.generated += 1;
            let candidate = format!("id{:03}", self.generated);
            let taken = self.bound.contains_key(&candidate)
                || self.anchors.iter().any(|a| a.name == candidate);
            if !taken {
                return candidate;
            }
        }
    }

    fn classify(&mut self, value: &'a Value, props: String, key: bool) -> Result<Node<'a>> {
        Ok(match value {
            Value::Shared(id) => {
                self.position += 1;
                let anchors = self.anchors;
                let anchor = anchors
                    .get(id.0)
                    .ok_or(SerializeError::DanglingAnchor(id.0))?;
                if let Some(name) = &self.names[id.0] {
                    return Ok(Node::Inline(format!("*{}", name)));
                }
                if let Value::Shared(inner) = anchor.value {
                    return Err(SerializeError::NestedHandle(id.0, inner.0).into());
                }
                let name = self.choose_name(*id);
                self.bound.insert(name.clone(), *id);
                self.names[id.0] = Some(name.clone());
                return self.classify(&anchor.value, with_prop(props, &format!("&{}", name)), key);
            }
            Value::Tagged(t) => {
                if matches!(t.value, Value::Shared(_) | Value::Tagged(_) | Value::Binary(_)) {
                    return Err(SerializeError::UnrepresentableTag(t.tag.to_string()).into());
                }
                let props = with_prop(props, &t.tag.to_string());
                if let Value::String(s) = &t.value {
                    // The tag already fixes the type, so only the syntax matters.
                    if is_plain_syntax(s) {
                        return Ok(Node::Inline(join(&props, s)));
                    }
                }
                return self.classify(&t.value, props, key);
            }
            Value::Sequence(items) if items.is_empty() => Node::Inline(join(&props, "[]")),
            Value::Mapping(map) if map.is_empty() => Node::Inline(join(&props, "{}")),
            Value::Sequence(items) => Node::Sequence { props, items },
            Value::Mapping(map) => Node::Mapping { props, map },
            Value::String(s) if !key && is_literal_safe(s) => Node::Literal {
                header: join(&props, literal_header(s)),
                text: s,
            },
            other => Node::Inline(join(&props, &scalar_text(other))),
        })
    }

    // ========================================================================
    // Layout
    // ========================================================================

    fn write_root(&mut self, value: &'a Value) -> Result<()> {
        match self.classify(value, String::new(), false)? {
            Node::Inline(text) => {
                self.put(&text)?;
                self.put("\n")
            }
            Node::Literal { header, text } => {
                self.put(&header)?;
                self.put("\n")?;
                self.write_literal_body(text, self.step)
            }
            Node::Sequence { props, items } => {
                self.props_line(&props)?;
                self.write_sequence(items, 0, false)
            }
            Node::Mapping { props, map } => {
                self.props_line(&props)?;
                self.write_mapping(map, 0, false)
            }
        }
    }

    fn props_line(&mut self, props: &str) -> Result<()> {
        if !props.is_empty() {
            self.put(props)?;
            self.put("\n")?;
        }
        Ok(())
    }

    /// `inline_first`: the cursor already sits where the first entry goes.
    fn write_sequence(&mut self, items: &'a [Value], indent: usize, inline_first: bool) -> Result<()> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 || !inline_first {
                self.pad(indent)?;
            }
            self.put("-")?;
            let node = self.classify(item, String::new(), false)?;
            self.write_compact(node, indent)?;
        }
        Ok(())
    }

    fn write_mapping(&mut self, map: &'a Mapping, indent: usize, inline_first: bool) -> Result<()> {
        for (i, (k, v)) in map.iter().enumerate() {
            if i > 0 || !inline_first {
                self.pad(indent)?;
            }
            match self.classify(k, String::new(), true)? {
                Node::Inline(text) => {
                    self.put(&text)?;
                    // `*a:` would read as an alias named `a:`.
                    if text.starts_with('*') {
                        self.put(" ")?;
                    }
                    self.put(":")?;
                }
                complex => {
                    self.put("?")?;
                    self.write_compact(complex, indent)?;
                    self.pad(indent)?;
                    self.put(":")?;
                }
            }
            let node = self.classify(v, String::new(), false)?;
            self.write_value(node, indent)?;
        }
        Ok(())
    }

    /// Node after a `-` or `?` indicator at column `indent`.
    fn write_compact(&mut self, node: Node<'a>, indent: usize) -> Result<()> {
        match node {
            Node::Sequence { props, items } if props.is_empty() => {
                self.put(" ")?;
                self.write_sequence(items, indent + 2, true)
            }
            Node::Mapping { props, map } if props.is_empty() => {
                self.put(" ")?;
                self.write_mapping(map, indent + 2, true)
            }
            other => self.write_value(other, indent),
        }
    }

    /// Node after a `:` indicator (or a propertied node after `-`/`?`).
    fn write_value(&mut self, node: Node<'a>, indent: usize) -> Result<()> {
        match node {
            Node::Inline(text) => {
                self.put(" ")?;
                self.put(&text)?;
                self.put("\n")
            }
            Node::Literal { header, text } => {
                self.put(" ")?;
                self.put(&header)?;
                self.put("\n")?;
                self.write_literal_body(text, indent + self.step)
            }
            Node::Sequence { props, items } => {
                self.trailing_props(&props)?;
                self.write_sequence(items, indent + self.step, false)
            }
            Node::Mapping { props, map } => {
                self.trailing_props(&props)?;
                self.write_mapping(map, indent + self.step, false)
            }
        }
    }

    fn trailing_props(&mut self, props: &str) -> Result<()> {
        if !props.is_empty() {
            self.put(" ")?;
            self.put(props)?;
        }
        self.put("\n")
    }

    fn write_literal_body(&mut self, text: &str, indent: usize) -> Result<()> {
        let body = text.trim_end_matches('\n');
        let trailing = text.len() - body.len();
        for line in body.split('\n') {
            if !line.is_empty() {
                self.pad(indent)?;
                self.put(line)?;
            }
            self.put("\n")?;
        }
        for _ in 1..trailing {
            self.put("\n")?;
        }
        Ok(())
    }

    fn pad(&mut self, indent: usize) -> Result<()> {
        for _ in 0..indent {
            self.put(" ")?;
        }
        Ok(())
    }

    fn put(&mut self, s: &str) -> Result<()> {
        self.out
            .write_str(s)
            .map_err(|_| SerializeError::Io("formatter error".to_string()).into())
    }
}

fn with_prop(props: String, prop: &str) -> String {
    if props.is_empty() {
        prop.to_string()
    } else {
        format!("{} {}", props, prop)
    }
}

fn join(props: &str, text: &str) -> String {
    if props.is_empty() {
        text.to_string()
    } else {
        format!("{} {}", props, text)
    }
}

fn is_anchor_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| is_printable(c) && !c.is_whitespace() && !",[]{}:".contains(c))
}

// ============================================================================
// Scalars
// ============================================================================

/// Canonical text of a scalar value.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Float(f) => format_float(*f),
        Value::String(s) => {
            if is_plain_safe(s) {
                s.clone()
            } else {
                double_quote(s)
            }
        }
        Value::Binary(bytes) => {
            if bytes.is_empty() {
                "!binary \"\"".to_string()
            } else {
                format!("!binary {}", BASE64_STANDARD.encode(bytes))
            }
        }
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        // Collections, tags and handles are laid out by the emitter.
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) | Value::Shared(_) => {
            String::new()
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        ".nan".to_string()
    } else if f == f64::INFINITY {
        ".inf".to_string()
    } else if f == f64::NEG_INFINITY {
        "-.inf".to_string()
    } else {
        let text = format!("{:?}", f);
        if text.contains(['.', 'e', 'E']) {
            text
        } else {
            text + ".0"
        }
    }
}

fn is_printable(c: char) -> bool {
    matches!(c,
        '\x20'..='\x7E'
        | '\u{A0}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
        && !matches!(c, '\u{2028}' | '\u{2029}' | '\u{FEFF}')
}

/// A string that can be written unquoted without changing structure.
fn is_plain_syntax(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if s.trim() != s || "[]{},#&*!|>'\"%@`".contains(first) {
        return false;
    }
    if matches!(first, '-' | '?' | ':') && matches!(chars.next(), None | Some(' ')) {
        return false;
    }
    if s.starts_with("---") || s.starts_with("...") {
        return false;
    }
    if s.contains(": ") || s.contains(" #") || s.ends_with(':') {
        return false;
    }
    s.chars().all(|c| is_printable(c) && !",[]{}".contains(c))
}

/// A string that can be written unquoted and still read back as a string.
fn is_plain_safe(s: &str) -> bool {
    is_plain_syntax(s) && matches!(resolve_plain(s), Value::String(_))
}

/// A multi-line string that literal block style reproduces exactly.
fn is_literal_safe(s: &str) -> bool {
    let body = s.trim_end_matches('\n');
    s.contains('\n')
        && !body.is_empty()
        && !body.trim_start_matches('\n').starts_with([' ', '\t'])
        && body
            .split('\n')
            .all(|line| line.is_empty() || !line.trim().is_empty())
        && body.chars().all(|c| c == '\n' || c == '\t' || is_printable(c))
}

fn literal_header(s: &str) -> &'static str {
    let body = s.trim_end_matches('\n');
    match s.len() - body.len() {
        0 => "|-",
        1 => "|",
        _ => "|+",
    }
}

fn double_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0B' => out.push_str("\\v"),
            '\x0C' => out.push_str("\\f"),
            '\x1B' => out.push_str("\\e"),
            '\u{85}' => out.push_str("\\N"),
            '\u{A0}' => out.push_str("\\_"),
            '\u{2028}' => out.push_str("\\L"),
            '\u{2029}' => out.push_str("\\P"),
            c if is_printable(c) => out.push(c),
            c if (c as u32) <= 0xFF => out.push_str(&format!("\\x{:02X}", c as u32)),
            c if (c as u32) <= 0xFFFF => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push_str(&format!("\\U{:08X}", c as u32)),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit_value(value: Value) -> String {
        let mut out = String::new();
        emit(&Document::new(value), &mut out, &SerializeOptions::default()).unwrap();
        out
    }

    fn map(pairs: Vec<(Value, Value)>) -> Value {
        Value::Mapping(pairs.into_iter().collect())
    }

    #[test]
    fn test_scalars() {
        assert_eq!(emit_value(Value::Null), "null\n");
        assert_eq!(emit_value(Value::Float(3.0)), "3.0\n");
        assert_eq!(emit_value(Value::Float(f64::NEG_INFINITY)), "-.inf\n");
        assert_eq!(emit_value(Value::Float(1e300)), "1e300\n");
        assert_eq!(emit_value(Value::date(2023, 4, 14).unwrap()), "2023-04-14\n");
        assert_eq!(emit_value(Value::Binary(b"Hi".to_vec())), "!binary SGk=\n");
    }

    #[test]
    fn test_string_quoting() {
        assert_eq!(scalar_text(&Value::from("plain text")), "plain text");
        assert_eq!(scalar_text(&Value::from("42")), "\"42\"");
        assert_eq!(scalar_text(&Value::from("true")), "\"true\"");
        assert_eq!(scalar_text(&Value::from("2023-04-14")), "\"2023-04-14\"");
        assert_eq!(scalar_text(&Value::from("")), "\"\"");
        assert_eq!(scalar_text(&Value::from("a: b")), "\"a: b\"");
        assert_eq!(scalar_text(&Value::from("- x")), "\"- x\"");
        assert_eq!(scalar_text(&Value::from("-x")), "-x");
        assert_eq!(scalar_text(&Value::from(" pad")), "\" pad\"");
        assert_eq!(scalar_text(&Value::from("tab\there")), "\"tab\\there\"");
        assert_eq!(scalar_text(&Value::from("bell\u{7}")), "\"bell\\a\"");
        assert_eq!(scalar_text(&Value::from("\u{FEFF}")), "\"\\uFEFF\"");
    }

    #[test]
    fn test_block_layout() {
        let value = map(vec![
            (Value::from("name"), Value::from("John Doe")),
            (
                Value::from("hobbies"),
                Value::Sequence(vec![Value::from("reading"), Value::from("swimming")]),
            ),
            (
                Value::from("address"),
                map(vec![(Value::from("city"), Value::from("Anytown"))]),
            ),
            (Value::from("empty"), Value::Sequence(vec![])),
        ]);
        assert_eq!(
            emit_value(value),
            "name: John Doe\nhobbies:\n  - reading\n  - swimming\naddress:\n  city: Anytown\nempty: []\n"
        );
    }

    #[test]
    fn test_compact_sequences() {
        let value = Value::Sequence(vec![
            Value::Sequence(vec![Value::from(1), Value::from(2)]),
            map(vec![
                (Value::from("a"), Value::from(1)),
                (Value::from("b"), Value::Sequence(vec![Value::from("x")])),
            ]),
        ]);
        assert_eq!(emit_value(value), "- - 1\n  - 2\n- a: 1\n  b:\n    - x\n");
    }

    #[test]
    fn test_complex_key() {
        let value = map(vec![(
            Value::Sequence(vec![Value::from("a"), Value::from("b")]),
            Value::from("v"),
        )]);
        assert_eq!(emit_value(value), "? - a\n  - b\n: v\n");
    }

    #[test]
    fn test_literal_blocks() {
        let value = map(vec![
            (Value::from("clip"), Value::from("one\ntwo\n")),
            (Value::from("strip"), Value::from("one\n\ntwo")),
            (Value::from("keep"), Value::from("end\n\n")),
            (Value::from("indented"), Value::from(" lead\n")),
        ]);
        assert_eq!(
            emit_value(value),
            "clip: |\n  one\n  two\nstrip: |-\n  one\n\n  two\nkeep: |+\n  end\n\nindented: \" lead\\n\"\n"
        );
    }

    #[test]
    fn test_literal_after_blank_lines() {
        // Leading spaces on the first content line would be read as indentation.
        let value = map(vec![(Value::Null, Value::from("\n \u{e9}"))]);
        assert_eq!(emit_value(value), "null: \"\\n \u{e9}\"\n");

        let value = map(vec![(Value::from("a"), Value::from("\n\nx\n"))]);
        assert_eq!(emit_value(value), "a: |\n\n\n  x\n");
    }

    #[test]
    fn test_tagged_values() {
        assert_eq!(
            emit_value(Value::tagged("binary", Value::from("SGVsbG8sIFdvcmxkIQ=="))),
            "!binary SGVsbG8sIFdvcmxkIQ==\n"
        );
        assert_eq!(
            emit_value(Value::tagged("semver", Value::from("1.2"))),
            "!semver 1.2\n"
        );
        let nested = Value::tagged("a", Value::tagged("b", Value::Null));
        let mut out = String::new();
        let err = emit(&Document::new(nested), &mut out, &SerializeOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "Tag !a cannot wrap an alias or another tag");
    }

    #[test]
    fn test_anchors_by_identity() {
        let mut doc = Document::default();
        let id = doc.add_anchor("base", map(vec![(Value::from("x"), Value::from(1))]));
        doc.set_root(map(vec![
            (Value::from("a"), Value::Shared(id)),
            (Value::from("b"), Value::Shared(id)),
            (Value::from("c"), map(vec![(Value::from("x"), Value::from(1))])),
        ]));
        let mut out = String::new();
        emit(&doc, &mut out, &SerializeOptions::default()).unwrap();
        assert_eq!(out, "a: &base\n  x: 1\nb: *base\nc:\n  x: 1\n");
    }

    #[test]
    fn test_cycle_and_reused_names() {
        let mut doc = Document::default();
        let id = doc.add_anchor("a", Value::Null);
        doc.set_anchor(id, Value::Sequence(vec![Value::Shared(id)]));
        doc.set_root(Value::Shared(id));
        let mut out = String::new();
        emit(&doc, &mut out, &SerializeOptions::default()).unwrap();
        assert_eq!(out, "&a\n- *a\n");

        let mut doc = Document::default();
        let first = doc.add_anchor("n", Value::from(1));
        let second = doc.add_anchor("n", Value::from(2));
        doc.set_root(Value::Sequence(vec![
            Value::Shared(first),
            Value::Shared(second),
            Value::Shared(first),
        ]));
        let mut out = String::new();
        emit(&doc, &mut out, &SerializeOptions::default()).unwrap();
        assert_eq!(out, "- &n 1\n- &id001 2\n- *n\n");
    }

    #[test]
    fn test_dangling_handle() {
        let doc = Document::new(Value::Shared(AnchorId(0)));
        let mut out = String::new();
        let err = emit(&doc, &mut out, &SerializeOptions::default()).unwrap_err();
        assert!(err.is_serialize());
    }

    #[test]
    fn test_indent_option() {
        let value = map(vec![(
            Value::from("a"),
            map(vec![(Value::from("b"), Value::from(1))]),
        )]);
        let mut out = String::new();
        emit(&Document::new(value), &mut out, &SerializeOptions::new().indent(4)).unwrap();
        assert_eq!(out, "a:\n    b: 1\n");
    }
}
