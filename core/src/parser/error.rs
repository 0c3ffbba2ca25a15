use thiserror::Error;

use crate::lexer::Span;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("expected {expected} but found {found} at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },
    #[error("expression nesting exceeded the parser's recursion limit ({limit}) at {span}")]
    RecursionLimitExceeded { limit: usize, span: Span },
    #[error("invalid assignment target at {span}: only identifiers and array accesses may appear on the left of '='")]
    InvalidAssignmentTarget { span: Span },
    #[error("parser made no progress at {span}; this is an internal error, not a malformed-input error")]
    NoProgress { span: Span },
}
