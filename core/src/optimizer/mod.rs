//! Optimizer — peephole rewriting plus dead-code elimination.
//!
//! Runs as a small fixpoint loop over two rewrites applied to a decoded,
//! address-tagged instruction list:
//!
//! - **dead code elimination**: a reachability walk from the module entry
//!   and every export address, following each instruction's control-flow
//!   successors (a `Call` target is followed the same as a `Jmp` target, so
//!   a function transitively reachable from a root survives without being a
//!   root itself); a function that is merely defined but neither exported
//!   nor called from reachable code is never reached, and is dropped.
//! - **constant folding**: a `PUSH a; PUSH b; ADD|SUB|MUL` run with neither
//!   of its last two instructions targeted by any jump/call/try-entry in the
//!   module collapses to a single `PUSH` of the folded value.
//!
//! Both rewrites change instruction addresses, so every round rebuilds an
//! old-address-to-new-address map and uses it to patch every branch/call/
//! try-entry operand, the function and export address tables, the pending
//! import call sites, and the source map in lockstep. This mirrors the
//! "return applied transformations and size statistics" requirement: each
//! round that changes anything records a named transformation before
//! looping again, bounded so a pathological program can't loop forever.

use std::collections::{BTreeMap, BTreeSet};

use crate::codegen::{CompiledModule, SCRATCH_SLOT};
use crate::opcode::{Instruction, Word};

const MAX_ROUNDS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptimizeReport {
    pub applied: Vec<String>,
    pub instructions_before: usize,
    pub instructions_after: usize,
}

pub fn optimize(mut module: CompiledModule) -> (CompiledModule, OptimizeReport) {
    let words_before = module.instructions.len();
    let mut applied = Vec::new();

    for _ in 0..MAX_ROUNDS {
        let decoded = decode_all(&module.instructions);
        let targets = collect_targets(&decoded);
        let roots = collect_roots(&module);
        let reachable = reachable_addresses(&decoded, &roots);

        let mut removed_any = false;
        let mut folded_any = false;
        let mut identity_any = false;

        let mut new_words: Vec<Word> = Vec::new();
        let mut remap: BTreeMap<usize, usize> = BTreeMap::new();
        let mut new_source_starts: BTreeSet<usize> = BTreeSet::new();

        let mut i = 0;
        while i < decoded.len() {
            let (addr, instr) = decoded[i];
            if !reachable.contains(&addr) {
                removed_any = true;
                i += 1;
                continue;
            }

            if let Some(folded) = try_fold(&decoded, i, &reachable, &targets) {
                let new_addr = new_words.len();
                for &(old_addr, _) in &decoded[i..i + 3] {
                    remap.insert(old_addr, new_addr);
                }
                folded.encode(&mut new_words);
                new_source_starts.insert(new_addr);
                folded_any = true;
                i += 3;
                continue;
            }

            if let Some(rewrite) = try_identity(&decoded, i, &reachable, &targets) {
                match rewrite {
                    // `PUSH 0; ADD` and `PUSH 1; MUL` vanish entirely: the
                    // operand already sitting on the stack from whatever
                    // came before is already the result.
                    IdentityRewrite::Remove => {
                        identity_any = true;
                        i += 2;
                        continue;
                    }
                    // `PUSH 0; MUL` always yields 0 regardless of the
                    // operand already on the stack, but that operand still
                    // has to come off the stack; `Store(SCRATCH_SLOT)`
                    // discards it the same way an expression-statement
                    // discards a value nobody reads.
                    IdentityRewrite::AbsorbToZero => {
                        let store_addr = new_words.len();
                        remap.insert(decoded[i].0, store_addr);
                        Instruction::Store(SCRATCH_SLOT).encode(&mut new_words);
                        new_source_starts.insert(store_addr);

                        let push_addr = new_words.len();
                        remap.insert(decoded[i + 1].0, push_addr);
                        Instruction::Push(0).encode(&mut new_words);
                        new_source_starts.insert(push_addr);

                        identity_any = true;
                        i += 2;
                        continue;
                    }
                }
            }

            let new_addr = new_words.len();
            remap.insert(addr, new_addr);
            instr.encode(&mut new_words);
            new_source_starts.insert(new_addr);
            i += 1;
        }

        if !removed_any && !folded_any && !identity_any {
            break;
        }

        rewrite_operands(&mut new_words, &remap);
        module.instructions = new_words;
        module.functions = remap_table(&module.functions, &remap);
        module.exports = remap_table(&module.exports, &remap);
        // An import call site whose instruction address didn't survive into
        // `remap` was itself eliminated as dead code; drop it rather than
        // leaving a stale operand address that would alias something else in
        // the shrunk instruction stream.
        module.imports.retain_mut(|site| {
            let instr_addr = site.operand_address - 1;
            match remap.get(&instr_addr) {
                Some(&new_instr_addr) => {
                    site.operand_address = new_instr_addr + 1;
                    true
                }
                None => false,
            }
        });
        module.source_map = module
            .source_map
            .iter()
            .filter_map(|(addr, span)| remap.get(addr).map(|&a| (a, *span)))
            .collect();
        module.source_map.sort_by_key(|(addr, _)| *addr);
        module.source_map.dedup_by_key(|(addr, _)| *addr);

        if removed_any {
            applied.push("dead-code-elimination".to_string());
            tracing::debug!(
                words_before = words_before,
                words_now = module.instructions.len(),
                "optimizer: dropped unreachable code"
            );
        }
        if folded_any {
            applied.push("constant-folding".to_string());
            tracing::debug!(
                words_before = words_before,
                words_now = module.instructions.len(),
                "optimizer: folded constant arithmetic"
            );
        }
        if identity_any {
            applied.push("identity-simplification".to_string());
            tracing::debug!(
                words_before = words_before,
                words_now = module.instructions.len(),
                "optimizer: simplified identity/absorbing arithmetic"
            );
        }
    }

    let report = OptimizeReport {
        applied,
        instructions_before: words_before,
        instructions_after: module.instructions.len(),
    };
    (module, report)
}

fn decode_all(words: &[Word]) -> Vec<(usize, Instruction)> {
    let mut out = Vec::new();
    let mut pc = 0;
    while pc < words.len() {
        match Instruction::decode(words, pc) {
            Ok((instr, width)) => {
                out.push((pc, instr));
                pc += width;
            }
            Err(_) => break,
        }
    }
    out
}

/// Reachability roots per `spec.md` §4.4: the module entry point (address 0)
/// plus every exported address, since an export may be called from another
/// module after linking even if nothing in this module calls it. A function
/// that is merely *defined* but neither exported nor called from reachable
/// code is genuinely dead and must not be a root, or DCE could never remove
/// an unused function.
fn collect_roots(module: &CompiledModule) -> BTreeSet<usize> {
    let mut roots = BTreeSet::new();
    roots.insert(0);
    roots.extend(module.exports.values().copied());
    roots
}

fn collect_targets(decoded: &[(usize, Instruction)]) -> BTreeSet<usize> {
    decoded
        .iter()
        .filter_map(|(_, instr)| {
            if instr.is_address_operand() {
                instr.operand().map(|w| w as usize)
            } else {
                None
            }
        })
        .collect()
}

fn reachable_addresses(decoded: &[(usize, Instruction)], roots: &BTreeSet<usize>) -> BTreeSet<usize> {
    let index: BTreeMap<usize, usize> = decoded
        .iter()
        .enumerate()
        .map(|(idx, (addr, _))| (*addr, idx))
        .collect();

    let mut visited = BTreeSet::new();
    let mut stack: Vec<usize> = roots.iter().copied().collect();
    while let Some(addr) = stack.pop() {
        if !visited.insert(addr) {
            continue;
        }
        let Some(&idx) = index.get(&addr) else { continue };
        let (_, instr) = decoded[idx];
        let next_addr = decoded.get(idx + 1).map(|(a, _)| *a);

        match instr {
            Instruction::Halt | Instruction::Ret | Instruction::Throw => {}
            Instruction::Jmp(t) => stack.push(t as usize),
            Instruction::JmpIfZero(t) | Instruction::JmpIfNeg(t) => {
                stack.push(t as usize);
                if let Some(n) = next_addr {
                    stack.push(n);
                }
            }
            Instruction::Call(t) => {
                stack.push(t as usize);
                if let Some(n) = next_addr {
                    stack.push(n);
                }
            }
            Instruction::EnterTry(handler) => {
                stack.push(handler as usize);
                if let Some(n) = next_addr {
                    stack.push(n);
                }
            }
            _ => {
                if let Some(n) = next_addr {
                    stack.push(n);
                }
            }
        }
    }
    visited
}

fn try_fold(
    decoded: &[(usize, Instruction)],
    i: usize,
    reachable: &BTreeSet<usize>,
    targets: &BTreeSet<usize>,
) -> Option<Instruction> {
    if i + 2 >= decoded.len() {
        return None;
    }
    let (a0, i0) = decoded[i];
    let (a1, i1) = decoded[i + 1];
    let (a2, i2) = decoded[i + 2];
    if !reachable.contains(&a0) || !reachable.contains(&a1) || !reachable.contains(&a2) {
        return None;
    }
    // Folding removes the middle and last instructions as standalone
    // addresses; a jump landing on either would break, so both must be
    // untargeted. The first instruction's address survives as the folded
    // instruction's address, so it's fine if something targets it.
    if targets.contains(&a1) || targets.contains(&a2) {
        return None;
    }
    let (Instruction::Push(lhs), Instruction::Push(rhs)) = (i0, i1) else {
        return None;
    };
    let folded = match i2 {
        Instruction::Add => lhs.checked_add(rhs)?,
        Instruction::Sub => lhs.checked_sub(rhs)?,
        Instruction::Mul => lhs.checked_mul(rhs)?,
        _ => return None,
    };
    Some(Instruction::Push(folded))
}

enum IdentityRewrite {
    Remove,
    AbsorbToZero,
}

/// The additive/multiplicative identity and multiplicative-absorption
/// patterns, which fire on a non-constant left operand (`try_fold` above
/// only matches when *both* operands are literal `PUSH`es): `PUSH 0; ADD`
/// and `PUSH 1; MUL` are no-ops given whatever is already on the stack, and
/// `PUSH 0; MUL` always yields 0 regardless of it.
fn try_identity(
    decoded: &[(usize, Instruction)],
    i: usize,
    reachable: &BTreeSet<usize>,
    targets: &BTreeSet<usize>,
) -> Option<IdentityRewrite> {
    if i + 1 >= decoded.len() {
        return None;
    }
    let (a0, i0) = decoded[i];
    let (a1, i1) = decoded[i + 1];
    if !reachable.contains(&a0) || !reachable.contains(&a1) {
        return None;
    }
    let Instruction::Push(k) = i0 else {
        return None;
    };
    match (k, i1) {
        (0, Instruction::Add) | (1, Instruction::Mul) => {
            // Both addresses vanish outright, so neither may be a jump
            // target (unlike `try_fold`, where the first address survives).
            if targets.contains(&a0) || targets.contains(&a1) {
                return None;
            }
            Some(IdentityRewrite::Remove)
        }
        (0, Instruction::Mul) => Some(IdentityRewrite::AbsorbToZero),
        _ => None,
    }
}

fn rewrite_operands(words: &mut [Word], remap: &BTreeMap<usize, usize>) {
    let mut pc = 0;
    while pc < words.len() {
        let Ok((instr, width)) = Instruction::decode(words, pc) else {
            break;
        };
        if instr.is_address_operand() {
            if let Some(old) = instr.operand() {
                if let Some(&new_addr) = remap.get(&(old as usize)) {
                    words[pc + 1] = new_addr as Word;
                }
            }
        }
        pc += width;
    }
}

/// Remaps every address in `table` through `remap`, dropping entries whose
/// address fell out of the reachable set this round (e.g. a dead function).
fn remap_table(
    table: &BTreeMap<String, usize>,
    remap: &BTreeMap<usize, usize>,
) -> BTreeMap<String, usize> {
    table
        .iter()
        .filter_map(|(name, addr)| remap.get(addr).map(|&new_addr| (name.clone(), new_addr)))
        .collect()
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
    fn folds_constant_arithmetic() {
        let module = compile("let x = 1 + 2 * 3; print x;");
        let (optimized, report) = optimize(module);
        assert!(report.applied.contains(&"constant-folding".to_string()));
        assert!(optimized.instructions.len() < report.instructions_before);
    }

    #[test]
    fn removes_unreachable_function() {
        let module = compile("fn dead() { return 1; } let x = 1; print x;");
        let (optimized, report) = optimize(module);
        assert!(report.applied.contains(&"dead-code-elimination".to_string()));
        assert!(!optimized.functions.contains_key("dead"));
    }

    #[test]
    fn eliminates_additive_identity_with_non_constant_left_operand() {
        let module = compile("let x = 5; let y = x + 0; print y;");
        let (optimized, report) = optimize(module);
        assert!(report.applied.contains(&"identity-simplification".to_string()));
        assert!(optimized.instructions.len() < report.instructions_before);
    }

    #[test]
    fn eliminates_multiplicative_identity_with_non_constant_left_operand() {
        let module = compile("let x = 5; let y = x * 1; print y;");
        let (optimized, report) = optimize(module);
        assert!(report.applied.contains(&"identity-simplification".to_string()));
        assert!(optimized.instructions.len() < report.instructions_before);
    }

    #[test]
    fn absorbs_multiplication_by_zero_with_non_constant_left_operand() {
        let module = compile("let x = 5; let y = x * 0; print y;");
        let (optimized, report) = optimize(module);
        assert!(report.applied.contains(&"identity-simplification".to_string()));
    }

    #[test]
    fn keeps_exported_function_reachable() {
        let module = compile("export fn id(a) { return a; } let x = 1; print x;");
        let (optimized, _report) = optimize(module);
        assert!(optimized.exports.contains_key("id"));
        assert!(optimized.functions.contains_key("id"));
    }

    #[test]
    fn idempotent_on_already_optimal_code() {
        let module = compile("let x = 1; print x;");
        let (once, _) = optimize(module);
        let (twice, report) = optimize(once.clone());
        assert_eq!(once.instructions, twice.instructions);
        assert!(report.applied.is_empty());
    }
}
