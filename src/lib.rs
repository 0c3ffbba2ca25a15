//! `stackvm` — a thin façade over [`stackvm_core`] for downstream consumers
//! who want a single dependency: the compiler/VM API re-exported flat, plus
//! an `ariadne`-backed error renderer for turning a [`Diagnostic`] into
//! something worth printing to a terminal.
//!
//! ```
//! use stackvm::{compile, CompileOptions};
//!
//! let (module, report) = compile("let x = 1 + 2; print x;", CompileOptions::default())
//!     .expect("valid program");
//! assert!(report.is_some());
//! assert!(module.exports.is_empty());
//! ```

mod error_renderer;

pub use error_renderer::{render_error, render_error_to_string};
pub use stackvm_core::bundle::{Bundle, BundleError, BundleMetadata};
pub use stackvm_core::codegen::{CodegenError, CompiledModule};
pub use stackvm_core::debugger::{DebugEvent, DebugSymbols, Debugger, Watch, WatchKind, WatchValue};
pub use stackvm_core::disassembler::Disassembly;
pub use stackvm_core::lexer::{LexError, Span};
pub use stackvm_core::linker::{LinkError, LinkedProgram};
pub use stackvm_core::optimizer::OptimizeReport;
pub use stackvm_core::parser::ParseError;
pub use stackvm_core::vm::{DebugOptions, StepOutcome, Vm, VmError, VmLimits};
pub use stackvm_core::{compile, link_modules, CompileError, CompileOptions, Diagnostic, Severity};
