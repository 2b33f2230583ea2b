//! yamlet: a YAML parser and serializer.
//!
//! Documents are parsed into a [`Value`] tree owned by a [`Document`].
//! Anchored nodes live in the document's anchor table and are referenced
//! by handle from every place they appear, so aliases share one node and
//! cyclic documents are representable.
//!
//! # Parsing Pipeline
//!
//! 1. **Scanner**: Validates the source text, strips a byte-order mark and
//!    normalizes line breaks.
//!
//! 2. **Lexer**: Produces tokens on demand, turning indentation changes
//!    into explicit block start and end tokens.
//!
//! 3. **Parser**: Builds the tree by recursive descent, registering
//!    anchors and consulting the tag resolver for every scalar.
//!
//! 4. **Emitter**: Writes a document back out as block-style YAML that
//!    parses to an equal document.

mod document;
mod emitter;
mod error;
mod lexer;
mod mapping;
mod options;
mod parser;
mod resolver;
mod scanner;
mod value;

use std::io;

use tracing::debug;

pub use document::{Anchor, Document};
pub use error::{Error, LexError, Location, ParseError, Result, SerializeError, TagError};
pub use mapping::Mapping;
pub use options::{ParseOptions, SerializeOptions, DEFAULT_INDENT, DEFAULT_MAX_DEPTH};
pub use value::{AnchorId, Tag, TaggedValue, Value};

/// Parse a YAML document from a string.
///
/// # Example
///
/// ```
/// use libyamlet::{parse, Value};
///
/// let doc = parse("answer: 42").unwrap();
/// assert_eq!(doc.get("answer"), Some(&Value::from(42)));
/// ```
pub fn parse(input: &str) -> Result<Document> {
    parse_with_options(input, &ParseOptions::default())
}

/// Parse a YAML document with a filename for error messages.
pub fn parse_with_filename(input: &str, filename: Option<&str>) -> Result<Document> {
    let options = ParseOptions {
        filename: filename.map(str::to_string),
        ..ParseOptions::default()
    };
    parse_with_options(input, &options)
}

/// Parse a YAML document with explicit options.
pub fn parse_with_options(input: &str, options: &ParseOptions) -> Result<Document> {
    let ctx = error::ParseContext::new(options.filename.as_deref());

    // Phase 1: Validate and normalize the source
    let source = scanner::prepare(input, &ctx)?;

    // Phases 2 and 3: Lex on demand while building the tree
    let doc = parser::parse_root(&source, &ctx, options)?;

    debug!(
        bytes = input.len(),
        anchors = doc.anchors().len(),
        "parsed document"
    );
    Ok(doc)
}

/// Serialize a document to YAML text.
///
/// # Example
///
/// ```
/// use libyamlet::{parse, serialize};
///
/// let doc = parse("- &a x\n- *a\n").unwrap();
/// assert_eq!(serialize(&doc).unwrap(), "- &a x\n- *a\n");
/// ```
pub fn serialize(doc: &Document) -> Result<String> {
    serialize_with_options(doc, &SerializeOptions::default())
}

/// Serialize a document with explicit options.
pub fn serialize_with_options(doc: &Document, options: &SerializeOptions) -> Result<String> {
    let mut out = String::new();
    emitter::emit(doc, &mut out, options)?;
    debug!(
        bytes = out.len(),
        anchors = doc.anchors().len(),
        "serialized document"
    );
    Ok(out)
}

/// Serialize a bare value, which must not contain handles.
pub fn serialize_value(value: &Value) -> Result<String> {
    serialize(&Document::new(value.clone()))
}

/// Serialize a document into a byte sink.
pub fn serialize_to_writer<W: io::Write>(doc: &Document, writer: W) -> Result<()> {
    emitter::emit_io(doc, writer, &SerializeOptions::default())?;
    debug!(anchors = doc.anchors().len(), "serialized document to writer");
    Ok(())
}

/// Parse a document and render its tree for inspection.
pub fn parse_and_format(input: &str) -> Result<String> {
    let doc = parse(input)?;
    Ok(format!("Parsed YAML content:\n{:#?}", doc))
}
