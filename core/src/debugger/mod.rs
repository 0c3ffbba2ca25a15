//! Debugger controller — breakpoints, stepping and watches over a running VM.
//!
//! Wraps [`Vm::step`] with the bookkeeping a host-side debugger shell needs:
//! a breakpoint address set, step-over/step-out built from comparing call
//! depth across single steps, and watches that resolve a source-level name
//! against the symbol tables lazily (at evaluation time, not registration
//! time, since a local only has a meaningful frame once its function is
//! actually running). Suspending and resuming is just not calling `step()`
//! for a while — the `Vm` holds every bit of state (pc, stacks, memory, heap)
//! a resumed run needs, nothing is serialized out and back in.

use std::collections::BTreeSet;

use crate::opcode::Word;
use crate::vm::{StepOutcome, Vm, VmError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchKind {
    Global(String),
    Local(String),
    Memory(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    pub label: String,
    pub kind: WatchKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchValue {
    Word(Word),
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    Breakpoint { pc: usize },
    Stepped { pc: usize },
    Halted,
    Exception { value: Word, pc: usize },
}

/// Symbol information the debugger needs to resolve name-based watches;
/// supplied by whichever of [`crate::codegen::CompiledModule`] or
/// [`crate::linker::LinkedProgram`] produced the running program.
pub struct DebugSymbols {
    pub globals: std::collections::BTreeMap<String, usize>,
    pub function_locals: std::collections::BTreeMap<String, std::collections::BTreeMap<String, usize>>,
}

pub struct Debugger<'a> {
    vm: Vm,
    program: &'a [Word],
    symbols: DebugSymbols,
    breakpoints: BTreeSet<usize>,
    watches: Vec<Watch>,
    /// Name of the function whose frame is currently active, used to
    /// resolve `WatchKind::Local` watches against `function_locals`. The
    /// debugger shell updates this as it observes `CALL`/`RET` boundaries;
    /// left `None` while running top-level script code.
    pub current_function: Option<String>,
}

impl<'a> Debugger<'a> {
    pub fn new(vm: Vm, program: &'a [Word], symbols: DebugSymbols) -> Self {
        Debugger {
            vm,
            program,
            symbols,
            breakpoints: BTreeSet::new(),
            watches: Vec::new(),
            current_function: None,
        }
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn add_breakpoint(&mut self, address: usize) {
        self.breakpoints.insert(address);
    }

    pub fn remove_breakpoint(&mut self, address: usize) -> bool {
        self.breakpoints.remove(&address)
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = &usize> {
        self.breakpoints.iter()
    }

    pub fn add_watch(&mut self, watch: Watch) {
        self.watches.push(watch);
    }

    pub fn watches(&self) -> &[Watch] {
        &self.watches
    }

    pub fn evaluate_watch(&self, watch: &Watch) -> WatchValue {
        match &watch.kind {
            WatchKind::Global(name) => self
                .symbols
                .globals
                .get(name)
                .and_then(|&addr| self.vm.global(addr))
                .map(WatchValue::Word)
                .unwrap_or(WatchValue::Unresolved),
            WatchKind::Local(name) => self
                .current_function
                .as_ref()
                .and_then(|func| self.symbols.function_locals.get(func))
                .and_then(|locals| locals.get(name))
                .and_then(|&idx| self.vm.local(idx))
                .map(WatchValue::Word)
                .unwrap_or(WatchValue::Unresolved),
            WatchKind::Memory(address) => self
                .vm
                .global(*address)
                .map(WatchValue::Word)
                .unwrap_or(WatchValue::Unresolved),
        }
    }

    pub fn evaluate_all_watches(&self) -> Vec<(String, WatchValue)> {
        self.watches
            .iter()
            .map(|w| (w.label.clone(), self.evaluate_watch(w)))
            .collect()
    }

    fn outcome_to_event(&self, outcome: StepOutcome) -> DebugEvent {
        match outcome {
            StepOutcome::Running => DebugEvent::Stepped { pc: self.vm.pc() },
            StepOutcome::Halted => DebugEvent::Halted,
            StepOutcome::PausedOnException { value } => DebugEvent::Exception {
                value,
                pc: self.vm.pc(),
            },
        }
    }

    /// Executes exactly one instruction.
    pub fn step_into(&mut self) -> Result<DebugEvent, VmError> {
        let outcome = self.vm.step(self.program)?;
        Ok(self.outcome_to_event(outcome))
    }

    /// Executes instructions until control returns to the current call
    /// depth (i.e. skips over a `CALL` instead of stepping into the callee),
    /// or a breakpoint/halt/exception interrupts it first.
    pub fn step_over(&mut self) -> Result<DebugEvent, VmError> {
        let starting_depth = self.vm.call_depth();
        loop {
            let outcome = self.vm.step(self.program)?;
            match outcome {
                StepOutcome::Running => {
                    if self.vm.call_depth() <= starting_depth {
                        if self.breakpoints.contains(&self.vm.pc()) {
                            return Ok(DebugEvent::Breakpoint { pc: self.vm.pc() });
                        }
                        if self.vm.call_depth() == starting_depth {
                            return Ok(DebugEvent::Stepped { pc: self.vm.pc() });
                        }
                    }
                }
                other => return Ok(self.outcome_to_event(other)),
            }
        }
    }

    /// Executes instructions until control returns to the caller of the
    /// current frame (call depth drops below its starting value).
    pub fn step_out(&mut self) -> Result<DebugEvent, VmError> {
        let starting_depth = self.vm.call_depth();
        if starting_depth == 0 {
            return self.step_into();
        }
        loop {
            let outcome = self.vm.step(self.program)?;
            match outcome {
                StepOutcome::Running => {
                    if self.vm.call_depth() < starting_depth {
                        return Ok(DebugEvent::Stepped { pc: self.vm.pc() });
                    }
                }
                other => return Ok(self.outcome_to_event(other)),
            }
        }
    }

    /// Runs until the next breakpoint, halt, or exception.
    pub fn resume(&mut self) -> Result<DebugEvent, VmError> {
        loop {
            let outcome = self.vm.step(self.program)?;
            match outcome {
                StepOutcome::Running => {
                    if self.breakpoints.contains(&self.vm.pc()) {
                        return Ok(DebugEvent::Breakpoint { pc: self.vm.pc() });
                    }
                }
                other => return Ok(self.outcome_to_event(other)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::Codegen;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::vm::{DebugOptions, VmLimits};

    fn compile(src: &str) -> crate::codegen::CompiledModule {
        let tokens = Lexer::tokenize(src).unwrap();
        let program = Parser::parse_program(&tokens).unwrap();
        Codegen::compile(&program).unwrap()
    }

    #[test]
    fn breakpoint_halts_resume_at_target_address() {
        let module = compile("let x = 1; let y = 2; print x + y;");
        // Second statement's STORE is the first instruction after x's store;
        // break on whatever address that store begins at.
        let breakpoint_pc = module.source_map.get(2).map(|(addr, _)| *addr).unwrap_or(0);
        let vm = Vm::new(VmLimits::default(), DebugOptions::default());
        let symbols = DebugSymbols {
            globals: module.globals.clone(),
            function_locals: module.function_locals.clone(),
        };
        let mut debugger = Debugger::new(vm, &module.instructions, symbols);
        debugger.add_breakpoint(breakpoint_pc);
        let event = debugger.resume().unwrap();
        assert_eq!(event, DebugEvent::Breakpoint { pc: breakpoint_pc });
    }

    #[test]
    fn step_over_does_not_stop_inside_callee() {
        let module = compile("fn f() { return 1; } let x = f(); print x;");
        let vm = Vm::new(VmLimits::default(), DebugOptions::default());
        let symbols = DebugSymbols {
            globals: module.globals.clone(),
            function_locals: module.function_locals.clone(),
        };
        let mut debugger = Debugger::new(vm, &module.instructions, symbols);
        // Run to the entry of the top-level script (past the functions).
        loop {
            match debugger.step_into().unwrap() {
                DebugEvent::Stepped { .. } => {
                    if debugger.vm().call_depth() == 0 && debugger.vm().pc() > 0 {
                        break;
                    }
                }
                _ => break,
            }
        }
        let depth_before = debugger.vm().call_depth();
        let event = debugger.step_over().unwrap();
        assert!(matches!(event, DebugEvent::Stepped { .. } | DebugEvent::Halted));
        assert_eq!(debugger.vm().call_depth(), depth_before);
    }

    #[test]
    fn global_watch_resolves_by_name() {
        let module = compile("let x = 41; x = x + 1;");
        let vm = Vm::new(VmLimits::default(), DebugOptions::default());
        let symbols = DebugSymbols {
            globals: module.globals.clone(),
            function_locals: module.function_locals.clone(),
        };
        let mut debugger = Debugger::new(vm, &module.instructions, symbols);
        debugger.add_watch(Watch {
            label: "x".to_string(),
            kind: WatchKind::Global("x".to_string()),
        });
        debugger.resume().unwrap();
        let values = debugger.evaluate_all_watches();
        assert_eq!(values[0], ("x".to_string(), WatchValue::Word(42)));
    }

    #[test]
    fn unresolved_watch_reports_unresolved() {
        let module = compile("let x = 1;");
        let vm = Vm::new(VmLimits::default(), DebugOptions::default());
        let symbols = DebugSymbols {
            globals: module.globals.clone(),
            function_locals: module.function_locals.clone(),
        };
        let mut debugger = Debugger::new(vm, &module.instructions, symbols);
        debugger.add_watch(Watch {
            label: "missing".to_string(),
            kind: WatchKind::Global("missing".to_string()),
        });
        let values = debugger.evaluate_all_watches();
        assert_eq!(values[0], ("missing".to_string(), WatchValue::Unresolved));
    }
}
