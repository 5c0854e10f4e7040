//! Source positions attached to AST nodes.
//!
//! Positions are produced by the grammar front-end and only carried through
//! resolution so that diagnostics can point back at the offending text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A range in one source file, 1-based and inclusive on both ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    pub source_id: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SourceSpan {
    pub fn new(
        source_id: impl Into<String>,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// A single-line span, handy for fixtures.
    pub fn line(source_id: impl Into<String>, line: u32) -> Self {
        Self::new(source_id, line, 1, line, 1)
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:[{}:{}-{}:{}]",
            self.source_id, self.start_line, self.start_column, self.end_line, self.end_column
        )
    }
}

/// A value together with the span it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Spanned<T> {
    pub value: T,
    #[serde(default)]
    pub span: SourceSpan,
}

impl<T> Spanned<T> {
    pub fn new(value: T, span: SourceSpan) -> Self {
        Self { value, span }
    }
}

impl Spanned<String> {
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl From<&str> for Spanned<String> {
    fn from(value: &str) -> Self {
        Spanned::new(value.to_string(), SourceSpan::default())
    }
}

impl From<String> for Spanned<String> {
    fn from(value: String) -> Self {
        Spanned::new(value, SourceSpan::default())
    }
}
