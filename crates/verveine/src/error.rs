//! Error types for template compilation
//!
//! Parse failures carry the byte offset of the offending input plus the
//! template source, so callers can display them as `name:line:col`.

use std::sync::Arc;
use thiserror::Error;

/// A span in template source (offset, length)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    offset: usize,
    len: usize,
}

impl SourceSpan {
    /// Create a new span from offset and length
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// Get the offset (start position)
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Get the length
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the span is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A template source for error reporting
#[derive(Debug, Clone)]
pub struct TemplateSource {
    /// Name of the template (usually filename)
    pub name: String,
    /// The full source text
    pub source: Arc<String>,
}

impl TemplateSource {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: Arc::new(source.into()),
        }
    }

    /// Compute (line, column) from byte offset. Line and column are 1-based.
    pub fn offset_to_line_col(&self, offset: usize) -> (usize, usize) {
        let mut line = 1;
        let mut col = 1;
        for (i, ch) in self.source.char_indices() {
            if i >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }

    /// Format a span as "name:line:col"
    pub fn location(&self, span: &SourceSpan) -> String {
        let (line, col) = self.offset_to_line_col(span.offset());
        format!("{}:{}:{}", self.name, line, col)
    }
}

/// All template errors
#[derive(Error, Debug, Clone)]
pub enum TemplateError {
    #[error("Syntax error: {0}")]
    Syntax(Box<SyntaxError>),
}

impl From<SyntaxError> for TemplateError {
    fn from(e: SyntaxError) -> Self {
        Self::Syntax(Box::new(e))
    }
}

impl TemplateError {
    /// Byte offset of the offending input
    pub fn offset(&self) -> usize {
        match self {
            Self::Syntax(e) => e.span.offset(),
        }
    }
}

/// Syntax error during parsing
#[derive(Error, Debug, Clone)]
#[error("{}: Unexpected {found}, expected {expected}", self.location())]
pub struct SyntaxError {
    /// What we found
    pub found: String,
    /// What we expected
    pub expected: String,
    /// Location in source
    pub span: SourceSpan,
    /// The template this error came from
    pub src: TemplateSource,
}

impl SyntaxError {
    /// Format the location as "name:line:col"
    pub fn location(&self) -> String {
        self.src.location(&self.span)
    }
}
