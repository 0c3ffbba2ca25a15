//! Code generator — AST to bytecode.
//!
//! Two passes over the program: pass one walks top-level items collecting function
//! signatures and import declarations so a call can reference a function
//! defined later in the file; pass two emits function bodies first, then the
//! top-level script (so a single leading `JMP` can skip over them), patching
//! every forward reference through a per-label fixup-site list accumulated
//! at emission time rather than re-scanning already-emitted words.

pub mod error;

pub use error::CodegenError;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::lexer::Span;
use crate::opcode::{Instruction, Word};
use crate::parser::ast::{
    BinaryOp, Block, Expression, FunctionDecl, Item, Program, Statement,
};

/// Memory slot reserved for discarding the value of an expression statement.
/// Never present in the variable map, so it can never be resolved by name.
pub const SCRATCH_SLOT: Word = 255;

/// Maximum number of local variable slots per call frame; mirrored by the
/// VM's frame-base arithmetic (`frameBase = callDepth * LOCALS_PER_FRAME`).
pub const LOCALS_PER_FRAME: usize = 16;

/// Byte size of an array object's length header and of a string object's
/// length header, both little-endian `u32`: `[length][elements...]`.
const HEAP_HEADER_BYTES: i64 = 4;

/// A call that targets an imported name, left for the linker to resolve once
/// modules are concatenated and every module's exports are known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSite {
    pub local_name: String,
    pub module: String,
    /// Operand-word address of the `CALL` instruction to patch.
    pub operand_address: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledModule {
    pub instructions: Vec<Word>,
    pub source_map: Vec<(usize, Span)>,
    pub globals: BTreeMap<String, usize>,
    pub functions: BTreeMap<String, usize>,
    pub exports: BTreeMap<String, usize>,
    pub imports: Vec<ImportSite>,
    /// Per-function local-variable name to frame-slot-index map, consulted
    /// by the debugger to resolve a `watch <name>` command lazily against
    /// whichever function is currently executing.
    pub function_locals: BTreeMap<String, BTreeMap<String, usize>>,
}

struct FunctionInfo {
    label: usize,
    arity: usize,
    address: Option<usize>,
}

pub struct Codegen {
    output: Vec<Word>,
    source_map: Vec<(usize, Span)>,
    globals: BTreeMap<String, usize>,
    next_global: usize,
    functions: BTreeMap<String, FunctionInfo>,
    exports: BTreeMap<String, usize>,
    imports: Vec<ImportSite>,
    import_modules: BTreeMap<String, String>,
    fixups: HashMap<usize, Vec<usize>>,
    label_addr: HashMap<usize, usize>,
    next_label: usize,
    function_locals: BTreeMap<String, BTreeMap<String, usize>>,
    /// Name-to-slot map for the function currently being emitted; empty and
    /// unused while emitting top-level script statements.
    locals: BTreeMap<String, usize>,
    next_local: usize,
    in_function: bool,
}

impl Codegen {
    pub fn compile(program: &Program) -> Result<CompiledModule, CodegenError> {
        let mut gen = Codegen {
            output: Vec::new(),
            source_map: Vec::new(),
            globals: BTreeMap::new(),
            next_global: 0,
            functions: BTreeMap::new(),
            exports: BTreeMap::new(),
            imports: Vec::new(),
            import_modules: BTreeMap::new(),
            fixups: HashMap::new(),
            label_addr: HashMap::new(),
            next_label: 0,
            function_locals: BTreeMap::new(),
            locals: BTreeMap::new(),
            next_local: 0,
            in_function: false,
        };
        gen.collect_signatures(program)?;
        gen.emit_program(program)?;
        gen.patch_fixups()?;
        Ok(CompiledModule {
            instructions: gen.output,
            source_map: gen.source_map,
            globals: gen.globals,
            functions: gen
                .functions
                .iter()
                .map(|(name, info)| (name.clone(), info.address.expect("emitted")))
                .collect(),
            exports: gen.exports,
            imports: gen.imports,
            function_locals: gen.function_locals,
        })
    }

    fn new_label(&mut self) -> usize {
        let id = self.next_label;
        self.next_label += 1;
        id
    }

    fn mark_label(&mut self, label: usize) {
        self.label_addr.insert(label, self.output.len());
    }

    fn here(&self) -> usize {
        self.output.len()
    }

    fn emit(&mut self, instr: Instruction, span: Span) {
        self.source_map.push((self.here(), span));
        instr.encode(&mut self.output);
    }

    /// Emit an instruction whose operand is a not-yet-known label address;
    /// records the operand word's position so `patch_fixups` can rewrite it.
    fn emit_to_label(&mut self, placeholder: Instruction, label: usize, span: Span) {
        debug_assert!(placeholder.operand().is_some());
        self.source_map.push((self.here(), span));
        let operand_site = self.here() + 1;
        placeholder.encode(&mut self.output);
        self.fixups.entry(label).or_default().push(operand_site);
    }

    fn patch_fixups(&mut self) -> Result<(), CodegenError> {
        for (label, sites) in &self.fixups {
            let address = self
                .label_addr
                .get(label)
                .copied()
                .ok_or(CodegenError::UnresolvedLabel(*label))?;
            for &site in sites {
                self.output[site] = address as Word;
            }
        }
        Ok(())
    }

    fn collect_signatures(&mut self, program: &Program) -> Result<(), CodegenError> {
        for item in &program.items {
            if let Item::Function(f) = item {
                if self.functions.contains_key(&f.name) {
                    return Err(CodegenError::DuplicateFunction {
                        name: f.name.clone(),
                        span: f.span,
                    });
                }
                let label = self.new_label();
                self.functions.insert(
                    f.name.clone(),
                    FunctionInfo {
                        label,
                        arity: f.params.len(),
                        address: None,
                    },
                );
            }
        }
        for item in &program.items {
            if let Item::Import(import) = item {
                for name in &import.names {
                    self.import_modules
                        .insert(name.clone(), import.module.clone());
                }
            }
        }
        Ok(())
    }

    fn emit_program(&mut self, program: &Program) -> Result<(), CodegenError> {
        let entry_label = self.new_label();
        let entry_span = Span::default();
        self.emit_to_label(Instruction::Jmp(0), entry_label, entry_span);

        for item in &program.items {
            if let Item::Function(f) = item {
                self.emit_function(f)?;
            }
        }

        self.mark_label(entry_label);
        self.in_function = false;
        for item in &program.items {
            if let Item::Statement(stmt) = item {
                self.emit_statement(stmt)?;
            }
        }
        self.emit(Instruction::Halt, Span::default());

        for item in &program.items {
            if let Item::Function(f) = item {
                if f.exported {
                    let address = self.functions[&f.name].address.expect("emitted above");
                    self.exports.insert(f.name.clone(), address);
                }
            }
        }
        Ok(())
    }

    fn emit_function(&mut self, f: &FunctionDecl) -> Result<(), CodegenError> {
        let label = self.functions[&f.name].label;
        self.mark_label(label);
        let address = self.here();
        self.functions.get_mut(&f.name).unwrap().address = Some(address);

        self.in_function = true;
        self.locals = BTreeMap::new();
        for (idx, param) in f.params.iter().enumerate() {
            self.locals.insert(param.clone(), idx);
        }
        // Arguments arrive on the stack in call order; pop them into locals
        // back-to-front since the last-pushed argument is popped first.
        for idx in (0..f.params.len()).rev() {
            self.emit(Instruction::StoreLocal(idx as Word), f.span);
        }
        self.next_local = f.params.len();

        self.emit_block(&f.body)?;

        // Implicit `return 0;` if control falls off the end of the body.
        self.emit(Instruction::Push(0), f.span);
        self.emit(Instruction::Ret, f.span);
        self.function_locals
            .insert(f.name.clone(), std::mem::take(&mut self.locals));
        self.in_function = false;
        self.next_local = 0;
        Ok(())
    }

    fn emit_block(&mut self, block: &Block) -> Result<(), CodegenError> {
        for stmt in &block.statements {
            self.emit_statement(stmt)?;
        }
        Ok(())
    }

    /// Allocates a fresh scratch slot distinct from every user-named local
    /// or global — a local slot while emitting inside a function body, a
    /// global memory cell otherwise — and returns the store/load instruction
    /// pair that addresses it. Used for holding intermediate values (a heap
    /// address being built up, a value mid-assignment) that don't correspond
    /// to any source-level name.
    fn alloc_temp(&mut self) -> (Instruction, Instruction) {
        if self.in_function {
            let idx = self.next_local;
            self.next_local += 1;
            (
                Instruction::StoreLocal(idx as Word),
                Instruction::LoadLocal(idx as Word),
            )
        } else {
            let idx = self.next_global;
            self.next_global += 1;
            (Instruction::Store(idx as Word), Instruction::Load(idx as Word))
        }
    }

    fn emit_statement(&mut self, stmt: &Statement) -> Result<(), CodegenError> {
        match stmt {
            Statement::Let {
                name,
                value,
                exported,
                span,
            } => {
                self.emit_expr(value, *span)?;
                if self.in_function {
                    let idx = self.next_local;
                    self.next_local += 1;
                    self.locals.insert(name.clone(), idx);
                    self.emit(Instruction::StoreLocal(idx as Word), *span);
                } else {
                    let addr = *self.globals.entry(name.clone()).or_insert_with(|| {
                        let a = self.next_global;
                        self.next_global += 1;
                        a
                    });
                    self.emit(Instruction::Store(addr as Word), *span);
                    if *exported {
                        self.exports.insert(name.clone(), addr);
                    }
                }
            }
            Statement::Read { var, span } => {
                self.emit(Instruction::Read, *span);
                let instr = self.store_instruction(var, *span)?;
                self.emit(instr, *span);
            }
            Statement::Print { value, span } => {
                self.emit_expr(value, *span)?;
                self.emit(Instruction::Print, *span);
            }
            Statement::Throw { value, span } => {
                self.emit_expr(value, *span)?;
                self.emit(Instruction::Throw, *span);
            }
            Statement::Return { value, span } => {
                match value {
                    Some(expr) => self.emit_expr(expr, *span)?,
                    None => self.emit(Instruction::Push(0), *span),
                }
                self.emit(Instruction::Ret, *span);
            }
            Statement::Expr { value, span } => {
                self.emit_expr(value, *span)?;
                self.emit(Instruction::Store(SCRATCH_SLOT), *span);
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
                span,
            } => {
                self.emit_expr(condition, *span)?;
                let else_label = self.new_label();
                let end_label = self.new_label();
                self.emit_to_label(Instruction::JmpIfZero(0), else_label, *span);
                self.emit_block(then_branch)?;
                self.emit_to_label(Instruction::Jmp(0), end_label, *span);
                self.mark_label(else_label);
                if let Some(block) = else_branch {
                    self.emit_block(block)?;
                }
                self.mark_label(end_label);
            }
            Statement::While {
                condition,
                body,
                span,
            } => {
                let top_label = self.new_label();
                let end_label = self.new_label();
                self.mark_label(top_label);
                self.emit_expr(condition, *span)?;
                self.emit_to_label(Instruction::JmpIfZero(0), end_label, *span);
                self.emit_block(body)?;
                self.emit_to_label(Instruction::Jmp(0), top_label, *span);
                self.mark_label(end_label);
            }
            Statement::TryCatch {
                try_block,
                catch_name,
                catch_block,
                span,
            } => {
                let handler_label = self.new_label();
                let end_label = self.new_label();
                self.emit_to_label(Instruction::EnterTry(0), handler_label, *span);
                self.emit_block(try_block)?;
                self.emit(Instruction::LeaveTry, *span);
                self.emit_to_label(Instruction::Jmp(0), end_label, *span);
                self.mark_label(handler_label);
                let store_instr = match catch_name {
                    Some(name) if self.in_function => {
                        let idx = self.next_local;
                        self.next_local += 1;
                        self.locals.insert(name.clone(), idx);
                        Instruction::StoreLocal(idx as Word)
                    }
                    Some(name) => {
                        let addr = *self.globals.entry(name.clone()).or_insert_with(|| {
                            let a = self.next_global;
                            self.next_global += 1;
                            a
                        });
                        Instruction::Store(addr as Word)
                    }
                    // `catch ()` binds nothing; the thrown value is still on
                    // the stack when the handler starts, so it's discarded
                    // through the same scratch slot an expression-statement
                    // uses to drop a value nobody reads.
                    None => Instruction::Store(SCRATCH_SLOT),
                };
                self.emit(store_instr, *span);
                self.emit_block(catch_block)?;
                self.mark_label(end_label);
            }
        }
        Ok(())
    }

    fn store_instruction(&mut self, name: &str, span: Span) -> Result<Instruction, CodegenError> {
        if self.in_function {
            if let Some(&idx) = self.locals.get(name) {
                return Ok(Instruction::StoreLocal(idx as Word));
            }
        }
        if let Some(&addr) = self.globals.get(name) {
            return Ok(Instruction::Store(addr as Word));
        }
        Err(CodegenError::UndefinedVariable {
            name: name.to_string(),
            span,
        })
    }

    fn load_instruction(&self, name: &str, span: Span) -> Result<Instruction, CodegenError> {
        if self.in_function {
            if let Some(&idx) = self.locals.get(name) {
                return Ok(Instruction::LoadLocal(idx as Word));
            }
        }
        if let Some(&addr) = self.globals.get(name) {
            return Ok(Instruction::Load(addr as Word));
        }
        Err(CodegenError::UndefinedVariable {
            name: name.to_string(),
            span,
        })
    }

    fn emit_expr(&mut self, expr: &Expression, _outer: Span) -> Result<(), CodegenError> {
        match expr {
            Expression::Number { value, span } => self.emit(Instruction::Push(*value), *span),
            Expression::StringLit { value, span } => self.emit_string_lit(value, *span),
            Expression::Ident { name, span } => {
                let instr = self.load_instruction(name, *span)?;
                self.emit(instr, *span);
            }
            Expression::Negate { value, span } => {
                self.emit(Instruction::Push(0), *span);
                self.emit_expr(value, *span)?;
                self.emit(Instruction::Sub, *span);
            }
            Expression::Binary {
                op,
                left,
                right,
                span,
            } => self.emit_binary(*op, left, right, *span)?,
            Expression::Call { callee, args, span } => {
                for arg in args {
                    self.emit_expr(arg, *span)?;
                }
                self.emit_call(callee, args.len(), *span)?;
            }
            Expression::ArrayLit { elements, span } => self.emit_array_lit(elements, *span)?,
            Expression::ArrayAccess { array, index, span } => {
                self.emit_array_element_address(array, index, *span)?;
                self.emit(Instruction::Load32Stack, *span);
            }
            Expression::Assignment { target, value, span } => {
                self.emit_assignment(target, value, *span)?;
            }
        }
        Ok(())
    }

    fn emit_call(&mut self, callee: &str, argc: usize, span: Span) -> Result<(), CodegenError> {
        if let Some(info) = self.functions.get(callee) {
            if info.arity != argc {
                return Err(CodegenError::ArityMismatch {
                    name: callee.to_string(),
                    expected: info.arity,
                    found: argc,
                    span,
                });
            }
            let label = info.label;
            self.emit_to_label(Instruction::Call(0), label, span);
            return Ok(());
        }
        if let Some(module) = self.import_modules.get(callee).cloned() {
            self.source_map.push((self.here(), span));
            let operand_address = self.here() + 1;
            Instruction::Call(0).encode(&mut self.output);
            self.imports.push(ImportSite {
                local_name: callee.to_string(),
                module,
                operand_address,
            });
            return Ok(());
        }
        Err(CodegenError::UndefinedFunction {
            name: callee.to_string(),
            span,
        })
    }

    /// Computes `array_expr[index_expr]`'s element address and leaves it on
    /// top of stack: `base + 4 + index * 4` (the 4-byte length header,
    /// followed by 4-byte elements). Shared by both reading an element
    /// (`Load32Stack` on top) and writing one (`Store32Stack` after pushing
    /// the new value).
    fn emit_array_element_address(
        &mut self,
        array: &Expression,
        index: &Expression,
        span: Span,
    ) -> Result<(), CodegenError> {
        self.emit_expr(array, span)?;
        self.emit_expr(index, span)?;
        self.emit(Instruction::Push(4), span);
        self.emit(Instruction::Mul, span);
        self.emit(Instruction::Push(HEAP_HEADER_BYTES), span);
        self.emit(Instruction::Add, span);
        self.emit(Instruction::Add, span);
        Ok(())
    }

    /// Allocates a `4 + 4*N` byte heap object (length header + N 4-byte
    /// elements), writes the length and every element, and leaves the
    /// object's base address on top of stack.
    fn emit_array_lit(&mut self, elements: &[Expression], span: Span) -> Result<(), CodegenError> {
        let n = elements.len() as Word;
        self.emit(Instruction::Push(HEAP_HEADER_BYTES + 4 * n), span);
        self.emit(Instruction::Malloc, span);
        let (store_addr, load_addr) = self.alloc_temp();
        self.emit(store_addr, span);

        self.emit(Instruction::Push(n), span);
        self.emit(load_addr, span);
        self.emit(Instruction::Store32Stack, span);

        for (i, element) in elements.iter().enumerate() {
            self.emit_expr(element, span)?;
            self.emit(load_addr, span);
            self.emit(
                Instruction::Push(HEAP_HEADER_BYTES + 4 * i as Word),
                span,
            );
            self.emit(Instruction::Add, span);
            self.emit(Instruction::Store32Stack, span);
        }

        self.emit(load_addr, span);
        Ok(())
    }

    /// Allocates a `4 + N + 1` byte heap object (length header + N
    /// UTF-8 bytes + a zero terminator), writes the length, bytes, and
    /// terminator, and leaves the object's base address on top of stack.
    fn emit_string_lit(&mut self, value: &str, span: Span) {
        let bytes = value.as_bytes();
        let n = bytes.len() as Word;
        self.emit(Instruction::Push(HEAP_HEADER_BYTES + n + 1), span);
        self.emit(Instruction::Malloc, span);
        let (store_addr, load_addr) = self.alloc_temp();
        self.emit(store_addr, span);

        self.emit(Instruction::Push(n), span);
        self.emit(load_addr, span);
        self.emit(Instruction::Store32Stack, span);

        for (i, byte) in bytes.iter().enumerate() {
            self.emit(Instruction::Push(*byte as Word), span);
            self.emit(load_addr, span);
            self.emit(Instruction::Push(HEAP_HEADER_BYTES + i as Word), span);
            self.emit(Instruction::Add, span);
            self.emit(Instruction::Store8Stack, span);
        }
        self.emit(Instruction::Push(0), span);
        self.emit(load_addr, span);
        self.emit(Instruction::Push(HEAP_HEADER_BYTES + n), span);
        self.emit(Instruction::Add, span);
        self.emit(Instruction::Store8Stack, span);

        self.emit(load_addr, span);
    }

    /// `target = value` always leaves `value` on top of stack afterward, so
    /// chained assignment (`a = b = 1;`) and assignment-as-expression both
    /// work without re-reading the target back out of memory: the assigned
    /// value is held in a scratch temp across the store and reloaded from
    /// there.
    fn emit_assignment(
        &mut self,
        target: &Expression,
        value: &Expression,
        span: Span,
    ) -> Result<(), CodegenError> {
        match target {
            Expression::Ident { name, span: tspan } => {
                self.emit_expr(value, span)?;
                let (store_v, load_v) = self.alloc_temp();
                self.emit(store_v, span);
                self.emit(load_v, span);
                let store_instr = self.store_instruction(name, *tspan)?;
                self.emit(store_instr, span);
                self.emit(load_v, span);
                Ok(())
            }
            Expression::ArrayAccess { array, index, .. } => {
                self.emit_array_element_address(array, index, span)?;
                let (store_addr, load_addr) = self.alloc_temp();
                self.emit(store_addr, span);

                self.emit_expr(value, span)?;
                let (store_v, load_v) = self.alloc_temp();
                self.emit(store_v, span);

                self.emit(load_v, span);
                self.emit(load_addr, span);
                self.emit(Instruction::Store32Stack, span);
                self.emit(load_v, span);
                Ok(())
            }
            other => unreachable!(
                "parser only ever produces an Ident or ArrayAccess assignment target, got {other:?}"
            ),
        }
    }

    /// `==`/`!=` lower to `JMP_IF_ZERO` on `left - right` (possibly preceded
    /// by a branch-sense flip); ordered comparisons lower to `JMP_IF_NEG`,
    /// with operand emission order chosen per comparison so that the test
    /// reduces to `(a - b) <compare> 0` without needing a dedicated swap
    /// opcode.
    fn emit_binary(
        &mut self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
        span: Span,
    ) -> Result<(), CodegenError> {
        match op {
            BinaryOp::Add => {
                self.emit_expr(left, span)?;
                self.emit_expr(right, span)?;
                self.emit(Instruction::Add, span);
            }
            BinaryOp::Sub => {
                self.emit_expr(left, span)?;
                self.emit_expr(right, span)?;
                self.emit(Instruction::Sub, span);
            }
            BinaryOp::Mul => {
                self.emit_expr(left, span)?;
                self.emit_expr(right, span)?;
                self.emit(Instruction::Mul, span);
            }
            BinaryOp::Div => {
                // No dedicated opcode, and no host-import mechanism is
                // assumed to exist for it either: division is simply outside
                // what the target machine can execute, so this fails at
                // codegen rather than silently degrading to another
                // operator or a fabricated builtin call.
                return Err(CodegenError::UnsupportedOperator {
                    op: "/".to_string(),
                    span,
                });
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                self.emit_expr(left, span)?;
                self.emit_expr(right, span)?;
                self.emit(Instruction::Sub, span);
                self.emit_bool_from_branch(
                    |offset| Instruction::JmpIfZero(offset),
                    op == BinaryOp::Ne,
                    span,
                );
            }
            BinaryOp::Lt => {
                self.emit_expr(left, span)?;
                self.emit_expr(right, span)?;
                self.emit(Instruction::Sub, span);
                self.emit_bool_from_branch(Instruction::JmpIfNeg, false, span);
            }
            BinaryOp::Gt => {
                self.emit_expr(right, span)?;
                self.emit_expr(left, span)?;
                self.emit(Instruction::Sub, span);
                self.emit_bool_from_branch(Instruction::JmpIfNeg, false, span);
            }
            BinaryOp::Le => {
                self.emit_expr(right, span)?;
                self.emit_expr(left, span)?;
                self.emit(Instruction::Sub, span);
                self.emit_bool_from_branch(Instruction::JmpIfNeg, true, span);
            }
            BinaryOp::Ge => {
                self.emit_expr(left, span)?;
                self.emit_expr(right, span)?;
                self.emit(Instruction::Sub, span);
                self.emit_bool_from_branch(Instruction::JmpIfNeg, true, span);
            }
        }
        Ok(())
    }

    /// Materializes a 0/1 boolean on the stack from a conditional branch over
    /// the difference already on top of stack. `invert` flips which side of
    /// the branch pushes 1 (used to implement `<=`/`>=` as "not the strict
    /// opposite" without an extra compare opcode).
    fn emit_bool_from_branch(
        &mut self,
        branch: impl Fn(Word) -> Instruction,
        invert: bool,
        span: Span,
    ) {
        let true_label = self.new_label();
        let end_label = self.new_label();
        self.emit_to_label(branch(0), true_label, span);
        self.emit(Instruction::Push(if invert { 1 } else { 0 }), span);
        self.emit_to_label(Instruction::Jmp(0), end_label, span);
        self.mark_label(true_label);
        self.emit(Instruction::Push(if invert { 0 } else { 1 }), span);
        self.mark_label(end_label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::vm::{DebugOptions, Vm, VmLimits};

    fn compile(src: &str) -> CompiledModule {
        let tokens = Lexer::tokenize(src).expect("lex ok");
        let program = Parser::parse_program(&tokens).expect("parse ok");
        Codegen::compile(&program).expect("codegen ok")
    }

    fn run(src: &str) -> Vec<Word> {
        let module = compile(src);
        let mut vm = Vm::new(VmLimits::default(), DebugOptions::default());
        vm.run(&module.instructions).expect("vm ok");
        vm.output().to_vec()
    }

    #[test]
    fn compiles_arithmetic_and_print() {
        assert_eq!(run("print 1 + 2 * 3;"), vec![7]);
    }

    #[test]
    fn division_fails_at_codegen() {
        let tokens = Lexer::tokenize("print 4 / 2;").unwrap();
        let program = Parser::parse_program(&tokens).unwrap();
        let err = Codegen::compile(&program).unwrap_err();
        assert!(matches!(err, CodegenError::UnsupportedOperator { .. }));
    }

    #[test]
    fn array_literal_and_access_round_trip() {
        assert_eq!(run("let a = [10, 20, 30]; print a[0]; print a[2];"), vec![10, 30]);
    }

    #[test]
    fn array_index_assignment_updates_element() {
        assert_eq!(
            run("let a = [1, 2, 3]; a[1] = 99; print a[1];"),
            vec![99]
        );
    }

    #[test]
    fn chained_assignment_assigns_both_targets() {
        let module = compile("let a = 0; let b = 0; a = b = 7; print a; print b;");
        let mut vm = Vm::new(VmLimits::default(), DebugOptions::default());
        vm.run(&module.instructions).expect("vm ok");
        assert_eq!(vm.output(), &[7, 7]);
    }

    #[test]
    fn exported_let_appears_in_exports() {
        let module = compile("export let x = 1;");
        assert!(module.exports.contains_key("x"));
    }

    #[test]
    fn read_statement_stores_into_existing_variable() {
        let module = compile("let n = 0; read n; print n;");
        let mut vm = Vm::new(VmLimits::default(), DebugOptions::default());
        vm.feed_input(vec![42]);
        vm.run(&module.instructions).expect("vm ok");
        assert_eq!(vm.output(), &[42]);
    }

    #[test]
    fn read_into_undeclared_variable_is_undefined() {
        let tokens = Lexer::tokenize("read n;").unwrap();
        let program = Parser::parse_program(&tokens).unwrap();
        let err = Codegen::compile(&program).unwrap_err();
        assert!(matches!(err, CodegenError::UndefinedVariable { .. }));
    }

    #[test]
    fn string_literal_allocates_a_heap_object() {
        // A string literal's value is its heap address; distinct literals
        // get distinct (non-zero, increasing) addresses since the heap never
        // reuses bump-allocated space.
        let module = compile("let a = \"hi\"; let b = \"there\"; print a; print b;");
        let mut vm = Vm::new(VmLimits::default(), DebugOptions::default());
        vm.run(&module.instructions).expect("vm ok");
        let out = vm.output();
        assert_eq!(out.len(), 2);
        assert!(out[1] > out[0]);
    }
}
