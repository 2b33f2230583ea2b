//! Error types for YAML parsing and serialization.

use std::fmt;

use thiserror::Error;

use crate::scanner::Mark;

/// Result type for yamlet operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Parse context carrying filename for error reporting.
#[derive(Clone, Debug, Default)]
pub struct ParseContext {
    pub filename: Option<String>,
}

impl ParseContext {
    /// Create a new parse context.
    pub fn new(filename: Option<&str>) -> Self {
        Self {
            filename: filename.map(String::from),
        }
    }

    /// Turn a zero-based scanner mark into a reportable location.
    pub fn location(&self, mark: Mark) -> Location {
        Location {
            line: mark.line + 1,
            column: mark.col + 1,
            filename: self.filename.clone(),
        }
    }
}

/// A one-based source position, optionally naming the file it came from.
///
/// Displays as a message suffix: `" at 3:7"` or `" at 3:7 of <config.yaml>"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
    pub filename: Option<String>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, " at {}:{}", self.line, self.column)?;
        if let Some(name) = &self.filename {
            write!(f, " of <{}>", name)?;
        }
        Ok(())
    }
}

/// Any failure produced by the engine.
///
/// A parse either yields a complete document or exactly one of these;
/// partial trees are never returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Tag(#[from] TagError),

    #[error(transparent)]
    Serialize(#[from] SerializeError),
}

impl Error {
    /// Source position of the failure, when one is known.
    pub fn location(&self) -> Option<&Location> {
        match self {
            Error::Lex(e) => Some(e.location()),
            Error::Parse(e) => Some(e.location()),
            Error::Tag(e) => Some(e.location()),
            Error::Serialize(_) => None,
        }
    }

    pub fn is_lex(&self) -> bool {
        matches!(self, Error::Lex(_))
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse(_))
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, Error::Tag(_))
    }

    pub fn is_serialize(&self) -> bool {
        matches!(self, Error::Serialize(_))
    }
}

/// Malformed token-level syntax.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    /// Control or otherwise non-printable character in the source.
    #[error("Forbidden code point U+{0:04X}{1}")]
    ForbiddenCodePoint(u32, Location),

    /// Tab character used for block indentation.
    #[error("Tab not allowed in indentation (use spaces){0}")]
    TabIndent(Location),

    /// Quoted scalar without its closing quote.
    #[error("Unterminated quoted scalar{0}")]
    UnterminatedQuote(Location),

    /// End of input inside `[...]` or `{...}`.
    #[error("Unterminated flow collection{0}")]
    UnterminatedFlow(Location),

    /// Unknown escape in a double-quoted scalar.
    #[error("Bad escaped character{0}")]
    BadEscape(Location),

    /// Malformed `\x`, `\u` or `\U` escape.
    #[error("Bad Unicode escape{0}")]
    BadUnicodeEscape(Location),

    /// `@` and `` ` `` cannot start a plain scalar.
    #[error("Reserved indicator \"{0}\"{1}")]
    ReservedIndicator(char, Location),

    /// Tag that cannot be read (for example `!<` without `>`).
    #[error("Invalid tag{0}")]
    InvalidTag(Location),

    /// `&` or `*` not followed by a name.
    #[error("Expected anchor name{0}")]
    EmptyAnchorName(Location),

    /// Block scalar header with stray content.
    #[error("Bad block scalar header{0}")]
    BadBlockHeader(Location),

    /// Character that cannot start a token here.
    #[error("Unexpected character \"{0}\"{1}")]
    UnexpectedChar(char, Location),
}

impl LexError {
    pub fn location(&self) -> &Location {
        match self {
            LexError::ForbiddenCodePoint(_, loc)
            | LexError::ReservedIndicator(_, loc)
            | LexError::UnexpectedChar(_, loc) => loc,
            LexError::TabIndent(loc)
            | LexError::UnterminatedQuote(loc)
            | LexError::UnterminatedFlow(loc)
            | LexError::BadEscape(loc)
            | LexError::BadUnicodeEscape(loc)
            | LexError::InvalidTag(loc)
            | LexError::EmptyAnchorName(loc)
            | LexError::BadBlockHeader(loc) => loc,
        }
    }
}

/// Structural errors found while assembling the tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A line's indentation does not match any enclosing block.
    #[error("Bad indentation{0}")]
    BadIndentation(Location),

    /// A token that cannot appear at this point of the grammar.
    #[error("Unexpected {found}, expected {expected}{location}")]
    Unexpected {
        found: String,
        expected: &'static str,
        location: Location,
    },

    /// Closing `]` without a matching `[`, or `[` closed by `}`.
    #[error("Unmatched bracket{0}")]
    UnmatchedBracket(Location),

    /// Closing `}` without a matching `{`, or `{` closed by `]`.
    #[error("Unmatched brace{0}")]
    UnmatchedBrace(Location),

    /// `*name` with no earlier `&name`.
    #[error("Unknown anchor \"{0}\"{1}")]
    UnknownAnchor(String, Location),

    /// The same key twice in one mapping.
    #[error("Duplicate mapping key {0}{1}")]
    DuplicateKey(String, Location),

    /// `&a *b` or `!tag *b`.
    #[error("Alias cannot carry an anchor or tag{0}")]
    AliasProperties(Location),

    /// Two anchors or two tags on one node.
    #[error("Node has more than one {0}{1}")]
    DuplicateProperty(&'static str, Location),

    /// `:` where no mapping key can start, as in `a: b: c`.
    #[error("Mapping values are not allowed here{0}")]
    UnexpectedValue(Location),

    /// `-` where no block sequence can start, as in `a: - b`.
    #[error("Block sequence entries are not allowed here{0}")]
    UnexpectedEntry(Location),

    /// A second `---` document.
    #[error("Multiple documents are not supported{0}")]
    MultipleDocuments(Location),

    /// Nesting deeper than `ParseOptions::max_depth`.
    #[error("Nesting exceeds depth limit of {0}{1}")]
    TooDeep(usize, Location),
}

impl ParseError {
    pub fn location(&self) -> &Location {
        match self {
            ParseError::Unexpected { location, .. } => location,
            ParseError::UnknownAnchor(_, loc)
            | ParseError::DuplicateKey(_, loc)
            | ParseError::DuplicateProperty(_, loc)
            | ParseError::TooDeep(_, loc) => loc,
            ParseError::BadIndentation(loc)
            | ParseError::UnmatchedBracket(loc)
            | ParseError::UnmatchedBrace(loc)
            | ParseError::AliasProperties(loc)
            | ParseError::UnexpectedValue(loc)
            | ParseError::UnexpectedEntry(loc)
            | ParseError::MultipleDocuments(loc) => loc,
        }
    }
}

/// A value matched an explicit tag but failed its conversion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("Invalid base64 in {tag}: {reason}{location}")]
    InvalidBase64 {
        tag: String,
        reason: String,
        location: Location,
    },

    #[error("Invalid timestamp \"{text}\" (expected YYYY-MM-DD){location}")]
    InvalidTimestamp { text: String, location: Location },

    #[error("Invalid value \"{text}\" for {tag}{location}")]
    InvalidValue {
        tag: String,
        text: String,
        location: Location,
    },

    #[error("Tag {tag} cannot be applied to a {kind}{location}")]
    WrongKind {
        tag: String,
        kind: &'static str,
        location: Location,
    },
}

impl TagError {
    pub fn location(&self) -> &Location {
        match self {
            TagError::InvalidBase64 { location, .. }
            | TagError::InvalidTimestamp { location, .. }
            | TagError::InvalidValue { location, .. }
            | TagError::WrongKind { location, .. } => location,
        }
    }
}

/// Errors turning a document back into output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializeError {
    /// A `Shared` handle that the document's anchor table does not hold.
    #[error("Dangling anchor handle #{0}")]
    DanglingAnchor(usize),

    /// Tags can only decorate scalars and collections.
    #[error("Tag {0} cannot wrap an alias or another tag")]
    UnrepresentableTag(String),

    /// An anchor whose value is itself a handle; a node takes one anchor.
    #[error("Anchor #{0} points directly at anchor #{1}")]
    NestedHandle(usize, usize),

    /// The document refers to itself and cannot be expanded into a tree.
    #[error("Anchor \"{0}\" is cyclic and cannot be expanded")]
    Cycle(String),

    /// The output sink failed.
    #[error("Write failed: {0}")]
    Io(String),
}
