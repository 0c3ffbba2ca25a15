//! Integration tests exercising the full pipeline (lex → parse → codegen →
//! optimize → [link] → VM) against literal source programs, one test per
//! scenario, plus the optimizer- and debugger-specific properties.

use stackvm_core::codegen::Codegen;
use stackvm_core::debugger::{DebugEvent, DebugSymbols, Debugger, Watch, WatchKind};
use stackvm_core::lexer::Lexer;
use stackvm_core::opcode::{Instruction, Word};
use stackvm_core::optimizer;
use stackvm_core::parser::Parser;
use stackvm_core::vm::{DebugOptions, Vm, VmLimits};
use stackvm_core::{compile, link_modules, CompileOptions};

fn run_source(src: &str) -> Vec<Word> {
    let (module, _report) = compile(src, CompileOptions::default()).expect("compiles");
    let mut vm = Vm::new(VmLimits::default(), DebugOptions::default());
    vm.run(&module.instructions).expect("runs");
    vm.output().to_vec()
}

fn compile_unoptimized(src: &str) -> stackvm_core::codegen::CompiledModule {
    let tokens = Lexer::tokenize(src).expect("lexes");
    let program = Parser::parse_program(&tokens).expect("parses");
    Codegen::compile(&program).expect("generates code")
}

#[test]
fn scenario_1_arithmetic_and_print() {
    assert_eq!(run_source("let x=5; let y=10; print x+y;"), vec![15]);
}

#[test]
fn scenario_2_while_loop() {
    assert_eq!(
        run_source("let i=0; while (i<3) { print i; i = i+1; }"),
        vec![0, 1, 2]
    );
}

#[test]
fn scenario_3_recursive_factorial() {
    assert_eq!(
        run_source("fn fact(n){ if (n==0) { return 1; } return n * fact(n-1); } print fact(5);"),
        vec![120]
    );
}

#[test]
fn scenario_4_array_literal_and_access() {
    assert_eq!(
        run_source("let a=[10,20,30]; print a[0]; print a[2];"),
        vec![10, 30]
    );
}

#[test]
fn scenario_5_try_throw_catch() {
    let module = compile_unoptimized("try { throw 7; print 99; } catch (e) { print e; }");
    let mut vm = Vm::new(VmLimits::default(), DebugOptions::default());
    vm.run(&module.instructions).expect("runs");
    assert_eq!(vm.output(), &[7]);
    assert_eq!(vm.call_depth(), 0);
}

#[test]
fn scenario_6_two_module_link_and_call() {
    let math = compile_unoptimized("export fn add(a, b) { return a + b; }");
    let main = compile_unoptimized("import add from \"math\"; print add(2, 3);");

    let linked = link_modules(vec![
        ("math".to_string(), math),
        ("main".to_string(), main),
    ])
    .expect("links");

    let mut vm = Vm::new(VmLimits::default(), DebugOptions::default());
    vm.set_pc(linked.entry_point);
    vm.run(&linked.instructions).expect("runs");
    assert_eq!(vm.output(), &[5]);

    // The CALL emitted in main's bytecode for `add` must target an address
    // inside math's address range (before main's own code starts).
    let main_start = linked.entry_point;
    let mut call_targets_math = false;
    let mut pc = 0;
    while pc < main_start {
        let (instr, width) = Instruction::decode(&linked.instructions, pc).unwrap();
        if let Instruction::Call(target) = instr {
            if (target as usize) < main_start {
                call_targets_math = true;
            }
        }
        pc += width;
    }
    assert!(call_targets_math);
}

#[test]
fn optimizer_folds_constant_addition() {
    let unoptimized = compile_unoptimized("print 5+3;");
    let contains_push_add_sequence = unoptimized
        .instructions
        .windows(4)
        .any(|w| w == [1, 5, 1, 3]); // PUSH 5, PUSH 3 (opcode 0x01 == 1)
    assert!(contains_push_add_sequence);

    let mut vm = Vm::new(VmLimits::default(), DebugOptions::default());
    vm.run(&unoptimized.instructions).expect("runs");
    assert_eq!(vm.output(), &[8]);

    let (optimized, report) = optimizer::optimize(unoptimized);
    assert!(report.applied.contains(&"constant-folding".to_string()));
    assert!(optimized.instructions.contains(&8));

    let mut vm2 = Vm::new(VmLimits::default(), DebugOptions::default());
    vm2.run(&optimized.instructions).expect("runs");
    assert_eq!(vm2.output(), &[8]);
}

#[test]
fn debugger_breakpoint_on_print_suspends_with_expected_state() {
    let module = compile_unoptimized("let x=5; let y=10; print x+y;");
    let print_pc = module
        .source_map
        .iter()
        .find_map(|(addr, _)| {
            let (instr, _) = Instruction::decode(&module.instructions, *addr).ok()?;
            matches!(instr, Instruction::Print).then_some(*addr)
        })
        .expect("program contains a PRINT");

    let vm = Vm::new(VmLimits::default(), DebugOptions::default());
    let symbols = DebugSymbols {
        globals: module.globals.clone(),
        function_locals: module.function_locals.clone(),
    };
    let mut debugger = Debugger::new(vm, &module.instructions, symbols);
    debugger.add_breakpoint(print_pc);

    let event = debugger.resume().expect("runs to breakpoint");
    assert_eq!(event, DebugEvent::Breakpoint { pc: print_pc });
    assert_eq!(debugger.vm().pc(), print_pc);
    assert_eq!(debugger.vm().stack().last().copied(), Some(15));
    assert!(debugger.vm().output().is_empty());

    let event = debugger.resume().expect("runs to completion");
    assert_eq!(event, DebugEvent::Halted);
    assert_eq!(debugger.vm().output(), &[15]);
}

#[test]
fn debugger_watch_resolves_global_after_breakpoint() {
    let module = compile_unoptimized("let total = 0; total = total + 41; total = total + 1;");
    let vm = Vm::new(VmLimits::default(), DebugOptions::default());
    let symbols = DebugSymbols {
        globals: module.globals.clone(),
        function_locals: module.function_locals.clone(),
    };
    let mut debugger = Debugger::new(vm, &module.instructions, symbols);
    debugger.add_watch(Watch {
        label: "total".to_string(),
        kind: WatchKind::Global("total".to_string()),
    });
    debugger.resume().expect("runs to completion");
    let values = debugger.evaluate_all_watches();
    assert_eq!(values[0].0, "total");
    assert_eq!(
        values[0].1,
        stackvm_core::debugger::WatchValue::Word(42)
    );
}
