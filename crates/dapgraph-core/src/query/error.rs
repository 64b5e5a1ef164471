//! Parse errors for query patterns.

use thiserror::Error;

/// Category of parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A character no token starts with.
    InvalidCharacter,
    /// Found token X where Y was expected.
    UnexpectedToken,
    /// Input ended mid-pattern.
    UnexpectedEof,
    /// Pattern exceeds the length limit.
    TooLong,
}

/// A malformed query pattern.
///
/// Returned as a value so callers can show the message instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Byte offset of the offending token.
    pub offset: usize,
    /// Source text of the offending token, if any.
    pub found: Option<String>,
    pub message: String,
}

impl ParseError {
    pub(crate) fn invalid_character(offset: usize, found: &str) -> Self {
        Self {
            kind: ParseErrorKind::InvalidCharacter,
            offset,
            found: Some(found.to_string()),
            message: format!("invalid character {found:?}"),
        }
    }

    pub(crate) fn unexpected(offset: usize, found: Option<&str>, expected: &str) -> Self {
        match found {
            Some(text) => Self {
                kind: ParseErrorKind::UnexpectedToken,
                offset,
                found: Some(text.to_string()),
                message: format!("expected {expected}, found {text:?}"),
            },
            None => Self {
                kind: ParseErrorKind::UnexpectedEof,
                offset,
                found: None,
                message: format!("expected {expected}, found end of pattern"),
            },
        }
    }

    pub(crate) fn too_long(length: usize, limit: usize) -> Self {
        Self {
            kind: ParseErrorKind::TooLong,
            offset: limit,
            found: None,
            message: format!("pattern is {length} bytes, limit is {limit}"),
        }
    }
}
