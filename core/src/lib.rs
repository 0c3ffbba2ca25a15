//! `stackvm-core` — lexer, parser, code generator, optimizer, linker,
//! disassembler, bundle codec, virtual machine and debugger for a small
//! imperative language that targets a custom stack-based bytecode VM.
//!
//! This crate has no I/O and no process exit codes; [`stackvm_cli`] is the
//! host that wires it to a terminal. Every public error type implements
//! [`std::error::Error`] via `thiserror` and carries enough context (line,
//! column, program counter, opcode name) to render a useful diagnostic.

pub mod bundle;
pub mod codegen;
pub mod debugger;
pub mod disassembler;
pub mod lexer;
pub mod linker;
pub mod opcode;
pub mod optimizer;
pub mod parser;
pub mod vm;

use thiserror::Error;
use tracing::{info_span, warn};

use codegen::{Codegen, CodegenError, CompiledModule};
use lexer::{LexError, Lexer, Span};
use linker::{LinkError, LinkedProgram};
use optimizer::OptimizeReport;
use parser::{ParseError, Parser};

/// Compiler-facing configuration. Optimizations are on by default, matching
/// the common case of "compile what I'm about to run"; `build --no-optimize`
/// and the debugger's "see the code as written" mode turn this off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub enable_optimizations: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            enable_optimizations: true,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
}

/// Severity shown by the CLI's `ariadne`-backed renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// The common currency every error in this crate can be rendered through.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub message: String,
    pub span: Option<Span>,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Option<Span>) -> Self {
        Diagnostic {
            message: message.into(),
            span,
            severity: Severity::Error,
        }
    }
}

impl From<&LexError> for Diagnostic {
    fn from(err: &LexError) -> Self {
        let span = match err {
            LexError::UnexpectedChar { line, col, .. } => Some(Span::point(*line, *col)),
            LexError::UnterminatedString { line, col } => Some(Span::point(*line, *col)),
        };
        Diagnostic::error(err.to_string(), span)
    }
}

impl From<&ParseError> for Diagnostic {
    fn from(err: &ParseError) -> Self {
        let span = match err {
            ParseError::UnexpectedToken { span, .. } => Some(*span),
            ParseError::UnexpectedEof { .. } => None,
            ParseError::RecursionLimitExceeded { span, .. } => Some(*span),
            ParseError::InvalidAssignmentTarget { span } => Some(*span),
            ParseError::NoProgress { span } => Some(*span),
        };
        Diagnostic::error(err.to_string(), span)
    }
}

impl From<&CodegenError> for Diagnostic {
    fn from(err: &CodegenError) -> Self {
        let span = match err {
            CodegenError::UndefinedVariable { span, .. }
            | CodegenError::UndefinedFunction { span, .. }
            | CodegenError::ArityMismatch { span, .. }
            | CodegenError::DuplicateFunction { span, .. }
            | CodegenError::UnsupportedOperator { span, .. } => Some(*span),
            CodegenError::UnresolvedLabel(_) => None,
        };
        Diagnostic::error(err.to_string(), span)
    }
}

impl From<&CompileError> for Diagnostic {
    fn from(err: &CompileError) -> Self {
        match err {
            CompileError::Lex(e) => e.into(),
            CompileError::Parse(e) => e.into(),
            CompileError::Codegen(e) => e.into(),
        }
    }
}

impl From<&LinkError> for Diagnostic {
    fn from(err: &LinkError) -> Self {
        Diagnostic::error(err.to_string(), None)
    }
}

impl From<&vm::VmError> for Diagnostic {
    fn from(err: &vm::VmError) -> Self {
        Diagnostic::error(err.to_string(), None)
    }
}

/// Lex, parse, generate code for, and (unless disabled) optimize `source`.
pub fn compile(
    source: &str,
    options: CompileOptions,
) -> Result<(CompiledModule, Option<OptimizeReport>), CompileError> {
    let _span = info_span!("compile", len = source.len()).entered();
    let tokens = Lexer::tokenize(source).map_err(|e| {
        warn!(error = %e, "lexing failed");
        CompileError::Lex(e)
    })?;
    let program = Parser::parse_program(&tokens).map_err(|e| {
        warn!(error = %e, "parsing failed");
        CompileError::Parse(e)
    })?;
    let module = Codegen::compile(&program).map_err(|e| {
        warn!(error = %e, "code generation failed");
        CompileError::Codegen(e)
    })?;

    if options.enable_optimizations {
        let (optimized, report) = optimizer::optimize(module);
        Ok((optimized, Some(report)))
    } else {
        Ok((module, None))
    }
}

/// Links compiled modules, named in the order they should be concatenated.
pub fn link_modules(modules: Vec<(String, CompiledModule)>) -> Result<LinkedProgram, LinkError> {
    let _span = info_span!("link", modules = modules.len()).entered();
    linker::link(modules).map_err(|e| {
        warn!(error = %e, "linking failed");
        e
    })
}
