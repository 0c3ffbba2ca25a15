//! Linker — concatenates compiled modules into one executable program.
//!
//! Modules are laid out in input order; each module's code base address is
//! the sum of the lengths of every module before it, and likewise for the
//! flat global-variable memory each module's `LOAD`/`STORE` (not
//! `LOAD_LOCAL`/`STORE_LOCAL`, which are frame-relative and never rebased)
//! operands index into. Exports are promoted into the linked program's
//! export table under `"<module-name>.<export-name>"`; every pending import
//! site left by the code generator is resolved against that table using the
//! exact operand-word offset recorded at emission time — no placeholder
//! scanning. The first module's own leading `JMP` (past its function bodies
//! to its top-level script) makes the first module's base address the
//! linked program's entry point automatically.

pub mod error;

pub use error::LinkError;

use std::collections::BTreeMap;

use crate::codegen::CompiledModule;
use crate::lexer::Span;
use crate::opcode::{Instruction, Word};

#[derive(Debug, Clone, PartialEq)]
pub struct LinkedProgram {
    pub instructions: Vec<Word>,
    pub entry_point: usize,
    /// `(address, module_name, span)`, sorted by address.
    pub source_map: Vec<(usize, String, Span)>,
    pub exports: BTreeMap<String, usize>,
    pub globals: BTreeMap<String, usize>,
    /// `"<module>.<function>"` to local-name-to-slot-index map, for the
    /// debugger's name-based watch resolution.
    pub function_locals: BTreeMap<String, BTreeMap<String, usize>>,
}

pub fn link(modules: Vec<(String, CompiledModule)>) -> Result<LinkedProgram, LinkError> {
    if modules.is_empty() {
        return Err(LinkError::NoModules);
    }
    let mut seen_names = std::collections::BTreeSet::new();
    for (name, _) in &modules {
        if !seen_names.insert(name.clone()) {
            return Err(LinkError::DuplicateModuleName(name.clone()));
        }
    }

    let mut code_base = Vec::with_capacity(modules.len());
    let mut memory_base = Vec::with_capacity(modules.len());
    let mut code_acc = 0usize;
    let mut mem_acc = 0usize;
    for (_, module) in &modules {
        code_base.push(code_acc);
        memory_base.push(mem_acc);
        code_acc += module.instructions.len();
        mem_acc += module.globals.len();
    }

    let mut qualified_exports: BTreeMap<String, usize> = BTreeMap::new();
    for (i, (name, module)) in modules.iter().enumerate() {
        for (export_name, &addr) in &module.exports {
            qualified_exports.insert(format!("{name}.{export_name}"), code_base[i] + addr);
        }
    }

    let mut instructions = Vec::with_capacity(code_acc);
    let mut source_map = Vec::new();
    let mut globals = BTreeMap::new();
    let mut function_locals = BTreeMap::new();

    for (i, (name, module)) in modules.iter().enumerate() {
        let base = code_base[i];
        let mem_base = memory_base[i];
        let start = instructions.len();
        instructions.extend_from_slice(&module.instructions);
        rebase_code(&mut instructions[start..], base, mem_base);

        for site in &module.imports {
            let qualified = format!("{}.{}", site.module, site.local_name);
            let resolved = qualified_exports
                .get(&qualified)
                .copied()
                .ok_or_else(|| LinkError::MissingImport {
                    module: site.module.clone(),
                    name: site.local_name.clone(),
                })?;
            instructions[base + site.operand_address] = resolved as Word;
        }

        for (addr, span) in &module.source_map {
            source_map.push((base + addr, name.clone(), *span));
        }
        for (var_name, addr) in &module.globals {
            globals.insert(format!("{name}.{var_name}"), mem_base + addr);
        }
        for (func_name, locals) in &module.function_locals {
            function_locals.insert(format!("{name}.{func_name}"), locals.clone());
        }
    }

    source_map.sort_by_key(|(addr, _, _)| *addr);

    Ok(LinkedProgram {
        instructions,
        entry_point: code_base[0],
        source_map,
        exports: qualified_exports,
        globals,
        function_locals,
    })
}

/// Rebase every address-carrying operand in a freshly concatenated module's
/// instruction slice: code addresses (jump/call/try-entry targets) by
/// `code_base`, and flat global memory addresses (`LOAD`/`STORE`) by
/// `mem_base`. `LOAD_LOCAL`/`STORE_LOCAL` and heap instructions
/// (`LOAD8`/`LOAD32`/`STORE8`/`STORE32`, which index a dynamically-allocated
/// heap rather than static module memory) are left untouched.
fn rebase_code(words: &mut [Word], code_base: usize, mem_base: usize) {
    let mut pc = 0;
    while pc < words.len() {
        let Ok((instr, width)) = Instruction::decode(words, pc) else {
            break;
        };
        match instr {
            _ if instr.is_address_operand() => {
                if let Some(operand) = instr.operand() {
                    words[pc + 1] = operand + code_base as Word;
                }
            }
            Instruction::Load(_) | Instruction::Store(_) => {
                if let Some(operand) = instr.operand() {
                    words[pc + 1] = operand + mem_base as Word;
                }
            }
            _ => {}
        }
        pc += width;
    }
}
