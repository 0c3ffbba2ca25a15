//! `stackvm` — compiler, linker, runner and interactive debugger for the toy
//! stack-VM language described by this workspace's `stackvm-core` crate.
//!
//! Exit codes: `0` on success, `1` for a compile/link diagnostic, `2` for an
//! uncaught runtime error.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;

use stackvm::{
    Bundle, CompileOptions, DebugEvent, DebugOptions, DebugSymbols, Debugger, Diagnostic,
    Disassembly, Watch, WatchKind, WatchValue,
};

#[derive(Parser)]
#[command(
    name = "stackvm",
    version,
    about = "Compiler, linker, runner and debugger for a small stack-VM language"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a source file to a bundle.
    Build {
        file: PathBuf,
        #[arg(long)]
        no_optimize: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Link (if more than one file) and execute a program.
    Run {
        files: Vec<PathBuf>,
        #[arg(long, value_delimiter = ',')]
        input: Vec<i64>,
    },
    /// Print the addressed mnemonic listing for a file.
    Disasm { file: PathBuf },
    /// Start an interactive debugger session over a file.
    Debug { file: PathBuf },
    /// Link several bundles into one.
    Link {
        bundles: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let cli = Cli::parse();
    match cli.command {
        Command::Build {
            file,
            no_optimize,
            output,
        } => cmd_build(&file, !no_optimize, output.as_deref()),
        Command::Run { files, input } => cmd_run(&files, &input),
        Command::Disasm { file } => cmd_disasm(&file),
        Command::Debug { file } => cmd_debug(&file),
        Command::Link { bundles, output } => cmd_link(&bundles, &output),
    }
}

fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string())
}

fn is_bundle(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

fn read_file(path: &Path) -> Result<String, ExitCode> {
    fs::read_to_string(path).map_err(|e| {
        eprintln!("error: could not read {}: {e}", path.display());
        ExitCode::from(1)
    })
}

/// Compiles a source file (or loads a bundle) to a `CompiledModule`, printing
/// a rendered diagnostic and returning exit code 1 on failure.
fn compile_file(
    path: &Path,
    optimize: bool,
) -> Result<stackvm::CompiledModule, ExitCode> {
    let text = read_file(path)?;
    if is_bundle(path) {
        return Bundle::from_json(&text)
            .and_then(Bundle::into_module)
            .map_err(|e| {
                eprintln!("error: {e}");
                ExitCode::from(1)
            });
    }
    let options = CompileOptions {
        enable_optimizations: optimize,
    };
    match stackvm::compile(&text, options) {
        Ok((module, report)) => {
            if let Some(report) = report {
                info!(applied = ?report.applied, "optimizer ran");
            }
            Ok(module)
        }
        Err(err) => {
            let diagnostic = Diagnostic::from(&err);
            let rendered = stackvm::render_error_to_string(
                &diagnostic,
                &path.display().to_string(),
                &text,
            );
            eprint!("{rendered}");
            Err(ExitCode::from(1))
        }
    }
}

fn cmd_build(file: &Path, optimize: bool, output: Option<&Path>) -> ExitCode {
    let module = match compile_file(file, optimize) {
        Ok(m) => m,
        Err(code) => return code,
    };
    let bundle = Bundle::from_module(module_name(file), &module, optimize);
    let json = match bundle.to_json_pretty() {
        Ok(j) => j,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(1);
        }
    };
    match output {
        Some(path) => {
            if let Err(e) = fs::write(path, json) {
                eprintln!("error: could not write {}: {e}", path.display());
                return ExitCode::from(1);
            }
        }
        None => println!("{json}"),
    }
    ExitCode::from(0)
}

fn cmd_run(files: &[PathBuf], input: &[i64]) -> ExitCode {
    if files.is_empty() {
        eprintln!("error: run requires at least one file");
        return ExitCode::from(1);
    }
    let instructions = if files.len() == 1 {
        match compile_file(&files[0], true) {
            Ok(m) => m.instructions,
            Err(code) => return code,
        }
    } else {
        let mut modules = Vec::new();
        for file in files {
            match compile_file(file, true) {
                Ok(m) => modules.push((module_name(file), m)),
                Err(code) => return code,
            }
        }
        match stackvm::link_modules(modules) {
            Ok(linked) => linked.instructions,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(1);
            }
        }
    };

    let mut vm = stackvm::Vm::new(stackvm::VmLimits::default(), DebugOptions::default());
    vm.feed_input(input.iter().copied());
    match vm.run(&instructions) {
        Ok(result) => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for value in result.output {
                let _ = writeln!(out, "{value}");
            }
            ExitCode::from(0)
        }
        Err(e) => {
            eprintln!("runtime error: {e}");
            ExitCode::from(2)
        }
    }
}

fn cmd_disasm(file: &Path) -> ExitCode {
    let module = match compile_file(file, false) {
        Ok(m) => m,
        Err(code) => return code,
    };
    let disasm = Disassembly::new(&module.instructions, &module.source_map);
    print!("{}", disasm.render());
    ExitCode::from(0)
}

fn cmd_link(bundles: &[PathBuf], output: &Path) -> ExitCode {
    if bundles.is_empty() {
        eprintln!("error: link requires at least one bundle");
        return ExitCode::from(1);
    }
    let mut modules = Vec::new();
    for path in bundles {
        let text = match read_file(path) {
            Ok(t) => t,
            Err(code) => return code,
        };
        match Bundle::from_json(&text).and_then(Bundle::into_module) {
            Ok(module) => modules.push((module_name(path), module)),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(1);
            }
        }
    }
    let linked = match stackvm::link_modules(modules) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(1);
        }
    };
    let bundle = Bundle::from_linked(module_name(output), &linked);
    match bundle.to_json_pretty() {
        Ok(json) => {
            if let Err(e) = fs::write(output, json) {
                eprintln!("error: could not write {}: {e}", output.display());
                return ExitCode::from(1);
            }
            ExitCode::from(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}

fn cmd_debug(file: &Path) -> ExitCode {
    let module = match compile_file(file, false) {
        Ok(m) => m,
        Err(code) => return code,
    };
    let symbols = DebugSymbols {
        globals: module.globals.clone(),
        function_locals: module.function_locals.clone(),
    };
    let vm = stackvm::Vm::new(
        stackvm::VmLimits::default(),
        DebugOptions {
            pause_on_exception: true,
        },
    );
    let mut debugger = Debugger::new(vm, &module.instructions, symbols);

    println!("stackvm debugger — type 'help' for commands");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let cmd = parts.next().unwrap_or("");
        let arg = parts.next();
        match cmd {
            "help" => println!(
                "break <addr> | watch <name|addr> | step | next | out | continue | print | quit"
            ),
            "break" => match arg.and_then(|a| a.parse::<usize>().ok()) {
                Some(addr) => {
                    debugger.add_breakpoint(addr);
                    println!("breakpoint set at {addr}");
                }
                None => eprintln!("usage: break <addr>"),
            },
            "watch" => match arg {
                Some(name) => {
                    let kind = match name.parse::<usize>() {
                        Ok(addr) => WatchKind::Memory(addr),
                        Err(_) => WatchKind::Global(name.to_string()),
                    };
                    debugger.add_watch(Watch {
                        label: name.to_string(),
                        kind,
                    });
                    println!("watching {name}");
                }
                None => eprintln!("usage: watch <name|addr>"),
            },
            "step" => report_event(debugger.step_into()),
            "next" => report_event(debugger.step_over()),
            "out" => report_event(debugger.step_out()),
            "continue" => report_event(debugger.resume()),
            "print" => {
                println!("pc={} stack={:?}", debugger.vm().pc(), debugger.vm().stack());
                for (label, value) in debugger.evaluate_all_watches() {
                    match value {
                        WatchValue::Word(v) => println!("  {label} = {v}"),
                        WatchValue::Unresolved => println!("  {label} = <unresolved>"),
                    }
                }
            }
            "quit" | "exit" => break,
            other => eprintln!("unknown command '{other}' (try 'help')"),
        }
    }
    ExitCode::from(0)
}

fn report_event(result: Result<DebugEvent, stackvm::VmError>) {
    match result {
        Ok(DebugEvent::Breakpoint { pc }) => println!("breakpoint hit at {pc}"),
        Ok(DebugEvent::Stepped { pc }) => println!("stepped to {pc}"),
        Ok(DebugEvent::Halted) => println!("halted"),
        Ok(DebugEvent::Exception { value, pc }) => {
            println!("paused on uncaught exception: value={value} pc={pc}")
        }
        Err(e) => eprintln!("runtime error: {e}"),
    }
}
