//! Bundle codec — the JSON on-disk/wire format for a compiled module.
//!
//! A bundle is what `stackvm build` writes and `stackvm run`/`link`/`disasm`
//! read back: a self-describing envelope around a [`CompiledModule`] so a
//! bundle from an incompatible version of this toolchain fails with a clear
//! error instead of a confusing decode panic deep in the VM.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codegen::{CompiledModule, ImportSite};
use crate::lexer::Span;
use crate::linker::LinkedProgram;
use crate::opcode::Word;

pub const BUNDLE_FORMAT: &str = "stackvm-bytecode";
pub const BUNDLE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default)]
    pub optimized: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolTable {
    pub globals: std::collections::BTreeMap<String, usize>,
    pub functions: std::collections::BTreeMap<String, usize>,
    #[serde(rename = "sourceMap")]
    pub source_map: Vec<(usize, Span)>,
    #[serde(rename = "functionLocals", default)]
    pub function_locals: std::collections::BTreeMap<String, std::collections::BTreeMap<String, usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub format: String,
    pub version: u32,
    pub metadata: BundleMetadata,
    pub bytecode: Vec<Word>,
    #[serde(rename = "symbolTable")]
    pub symbol_table: SymbolTable,
    pub exports: std::collections::BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<ImportSite>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("unrecognized bundle format '{0}', expected '{BUNDLE_FORMAT}'")]
    UnknownFormat(String),
    #[error("bundle version {found} is not supported by this toolchain (expected {expected})")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("malformed bundle JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Bundle {
    pub fn from_module(name: impl Into<String>, module: &CompiledModule, optimized: bool) -> Self {
        Bundle {
            format: BUNDLE_FORMAT.to_string(),
            version: BUNDLE_VERSION,
            metadata: BundleMetadata {
                name: name.into(),
                source_file: None,
                optimized,
            },
            bytecode: module.instructions.clone(),
            symbol_table: SymbolTable {
                globals: module.globals.clone(),
                functions: module.functions.clone(),
                source_map: module.source_map.clone(),
                function_locals: module.function_locals.clone(),
            },
            exports: module.exports.clone(),
            imports: module.imports.clone(),
            dependencies: module
                .imports
                .iter()
                .map(|i| i.module.clone())
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect(),
        }
    }

    /// A linked program has already resolved every import, so the bundle
    /// carries no `imports`/`dependencies`; its entry point is always word 0
    /// (the first module's own leading `JMP`), so no extra field is needed.
    pub fn from_linked(name: impl Into<String>, linked: &LinkedProgram) -> Self {
        Bundle {
            format: BUNDLE_FORMAT.to_string(),
            version: BUNDLE_VERSION,
            metadata: BundleMetadata {
                name: name.into(),
                source_file: None,
                optimized: false,
            },
            bytecode: linked.instructions.clone(),
            symbol_table: SymbolTable {
                globals: linked.globals.clone(),
                functions: linked.exports.clone(),
                source_map: linked
                    .source_map
                    .iter()
                    .map(|(addr, _module, span)| (*addr, *span))
                    .collect(),
                function_locals: linked.function_locals.clone(),
            },
            exports: linked.exports.clone(),
            imports: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn into_module(self) -> Result<CompiledModule, BundleError> {
        self.validate()?;
        Ok(CompiledModule {
            instructions: self.bytecode,
            source_map: self.symbol_table.source_map,
            globals: self.symbol_table.globals,
            functions: self.symbol_table.functions,
            exports: self.exports,
            imports: self.imports,
            function_locals: self.symbol_table.function_locals,
        })
    }

    pub fn validate(&self) -> Result<(), BundleError> {
        if self.format != BUNDLE_FORMAT {
            return Err(BundleError::UnknownFormat(self.format.clone()));
        }
        if self.version != BUNDLE_VERSION {
            return Err(BundleError::VersionMismatch {
                expected: BUNDLE_VERSION,
                found: self.version,
            });
        }
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String, BundleError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Bundle, BundleError> {
        let bundle: Bundle = serde_json::from_str(text)?;
        bundle.validate()?;
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::Codegen;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn compile(src: &str) -> CompiledModule {
        let tokens = Lexer::tokenize(src).unwrap();
        let program = Parser::parse_program(&tokens).unwrap();
        Codegen::compile(&program).unwrap()
    }

    #[test]
    fn round_trips_through_json() {
        let module = compile("let x = 1 + 2; print x;");
        let bundle = Bundle::from_module("main", &module, false);
        let json = bundle.to_json_pretty().unwrap();
        let parsed = Bundle::from_json(&json).unwrap();
        assert_eq!(parsed.bytecode, module.instructions);
        assert_eq!(parsed.into_module().unwrap(), module);
    }

    #[test]
    fn rejects_unknown_format() {
        let module = compile("let x = 1; print x;");
        let mut bundle = Bundle::from_module("main", &module, false);
        bundle.format = "something-else".to_string();
        let err = bundle.validate().unwrap_err();
        assert!(matches!(err, BundleError::UnknownFormat(_)));
    }

    #[test]
    fn rejects_future_version() {
        let module = compile("let x = 1; print x;");
        let mut bundle = Bundle::from_module("main", &module, false);
        bundle.version = BUNDLE_VERSION + 1;
        let err = bundle.validate().unwrap_err();
        assert!(matches!(err, BundleError::VersionMismatch { .. }));
    }

    #[test]
    fn dependencies_are_deduped_module_names() {
        let module = compile("import a, b from \"lib\"; let x = a(1); print x;");
        let bundle = Bundle::from_module("main", &module, false);
        assert_eq!(bundle.dependencies, vec!["lib".to_string()]);
    }

    #[test]
    fn linked_bundle_has_no_pending_imports() {
        let lib = compile("export fn id(a) { return a; }");
        let main = compile("import id from \"lib\"; print id(9);");
        let linked = crate::linker::link(vec![
            ("lib".to_string(), lib),
            ("main".to_string(), main),
        ])
        .unwrap();
        let bundle = Bundle::from_linked("program", &linked);
        assert!(bundle.imports.is_empty());
        assert!(bundle.exports.contains_key("lib.id"));
        let json = bundle.to_json_pretty().unwrap();
        assert!(Bundle::from_json(&json).is_ok());
    }
}
