use thiserror::Error;

use crate::lexer::Span;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("undefined variable '{name}' at {span}")]
    UndefinedVariable { name: String, span: Span },
    #[error("undefined function '{name}' at {span}")]
    UndefinedFunction { name: String, span: Span },
    #[error("function '{name}' takes {expected} argument(s) but {found} were given, at {span}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },
    #[error("function '{name}' is defined more than once (second definition at {span})")]
    DuplicateFunction { name: String, span: Span },
    #[error("internal error: label {0} was never resolved to an address")]
    UnresolvedLabel(usize),
    #[error("operator '{op}' is not supported by the target machine, at {span}")]
    UnsupportedOperator { op: String, span: Span },
}
