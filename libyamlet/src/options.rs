//! Parse and serialize configuration.

use std::env;

/// Default number of spaces per nesting level in serialized output.
pub const DEFAULT_INDENT: usize = 2;

/// Default limit on collection nesting while parsing.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Options for [`parse_with_options`](crate::parse_with_options).
#[derive(Clone, Debug)]
pub struct ParseOptions {
    /// Name reported in error locations.
    pub filename: Option<String>,
    /// Deepest allowed collection nesting.
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            filename: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Options for [`serialize_with_options`](crate::serialize_with_options).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Spaces per nesting level. Values below 2 are raised to 2.
    pub indent: usize,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            indent: DEFAULT_INDENT,
        }
    }
}

impl SerializeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    /// Read the indentation from `YAMLET_INDENT`, falling back to the default.
    pub fn from_env() -> Self {
        let indent = env::var("YAMLET_INDENT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_INDENT);
        Self { indent }
    }

    pub(crate) fn effective_indent(&self) -> usize {
        self.indent.max(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let opts = ParseOptions::new().filename("a.yaml").max_depth(4);
        assert_eq!(opts.filename.as_deref(), Some("a.yaml"));
        assert_eq!(opts.max_depth, 4);
        assert_eq!(ParseOptions::default().max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_indent_floor() {
        assert_eq!(SerializeOptions::new().indent(0).effective_indent(), 2);
        assert_eq!(SerializeOptions::new().indent(4).effective_indent(), 4);
        assert_eq!(SerializeOptions::default().indent, DEFAULT_INDENT);
    }
}
