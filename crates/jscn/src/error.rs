use std::ops::Range;

use thiserror::Error;

/// A parse failure with the byte offset it was detected at. The offset is
/// `None` for failures that have no single source position, such as a
/// definition conflict between two `where` bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    pub message: String,
    pub offset: Option<usize>,
}

impl ParseDiagnostic {
    pub fn new(message: String, offset: Option<usize>) -> Self {
        Self { message, offset }
    }

    /// Byte range to label in `source`: one character at the reported
    /// offset, clamped so end-of-input errors still point at text and the
    /// label never splits a UTF-8 sequence.
    pub fn label_span(&self, source: &str) -> Range<usize> {
        let len = source.len();
        if len == 0 {
            return 0..0;
        }
        let at = self.offset.unwrap_or(0).min(len - 1);
        let start = (0..=at)
            .rev()
            .find(|i| source.is_char_boundary(*i))
            .unwrap_or(0);
        let end = (start + 1..=len)
            .find(|i| source.is_char_boundary(*i))
            .unwrap_or(len);
        start..end
    }
}

impl std::fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseDiagnostic {}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JscnError {
    /// A literal whose content could not be decoded (bad JSON between
    /// back-quotes, integer overflow).
    #[error("lex error at offset {offset}: {message}")]
    Lex { offset: usize, message: String },

    /// Grammar mismatch. `expected` is the human-readable expected-set.
    #[error("parse error at offset {offset}: {expected}")]
    Parse { offset: usize, expected: String },

    #[error("unresolved reference <{0}>")]
    UnresolvedReference(String),

    #[error("conflicting definitions for `{0}`")]
    DefinitionConflict(String),

    #[error("invalid cardinal at offset {offset}: {message}")]
    InvalidCardinal { offset: usize, message: String },

    #[error("duplicate property `{key}` at offset {offset}")]
    DuplicateProperty { key: String, offset: usize },
}

impl JscnError {
    /// Byte offset of the offending token, when the error carries one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::Lex { offset, .. }
            | Self::Parse { offset, .. }
            | Self::InvalidCardinal { offset, .. }
            | Self::DuplicateProperty { offset, .. } => Some(*offset),
            Self::UnresolvedReference(_) | Self::DefinitionConflict(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, JscnError>;
