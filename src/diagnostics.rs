//! Structured diagnostics reported to editors and build tools.

use std::fmt;

use serde::Serialize;

use crate::model::span::SourceSpan;

/// Broad class of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Malformed textual structure; fatal to the enclosing source file.
    Parse,
    /// Semantic or referential failure found during resolution.
    Compilation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Parse => write!(f, "ParseError"),
            ErrorKind::Compilation => write!(f, "CompilationError"),
        }
    }
}

/// A diagnostic: kind, verbatim message and the span it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub span: SourceSpan,
}

impl Diagnostic {
    pub fn compilation(span: &SourceSpan, message: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Compilation,
            message: message.to_string(),
            span: span.clone(),
        }
    }

    pub fn parse(span: &SourceSpan, message: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Parse,
            message: message.to_string(),
            span: span.clone(),
        }
    }

    pub fn is_parse_error(&self) -> bool {
        self.kind == ErrorKind::Parse
    }

    pub fn source_id(&self) -> &str {
        &self.span.source_id
    }

    pub fn start_line(&self) -> u32 {
        self.span.start_line
    }

    pub fn start_column(&self) -> u32 {
        self.span.start_column
    }

    pub fn end_line(&self) -> u32 {
        self.span.end_line
    }

    pub fn end_column(&self) -> u32 {
        self.span.end_column
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.span, self.message)
    }
}

impl std::error::Error for Diagnostic {}
