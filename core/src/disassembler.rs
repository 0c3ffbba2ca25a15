//! Disassembler — addressed mnemonic listing.
//!
//! Produces one line per instruction: its address, mnemonic, operand (if
//! any), and, when a source map is supplied, the originating line:column.
//! Used by both the `disasm` CLI subcommand and the debugger's `list`
//! command.

use std::fmt::Write as _;

use crate::lexer::Span;
use crate::opcode::{Instruction, Word};

pub struct Disassembly {
    pub lines: Vec<DisassembledLine>,
}

pub struct DisassembledLine {
    pub address: usize,
    pub instruction: Instruction,
    pub span: Option<Span>,
}

impl Disassembly {
    pub fn new(words: &[Word], source_map: &[(usize, Span)]) -> Self {
        let mut lines = Vec::new();
        let mut pc = 0;
        while pc < words.len() {
            let Ok((instruction, width)) = Instruction::decode(words, pc) else {
                break;
            };
            let span = source_map
                .iter()
                .rev()
                .find(|(addr, _)| *addr <= pc)
                .map(|(_, span)| *span);
            lines.push(DisassembledLine {
                address: pc,
                instruction,
                span,
            });
            pc += width;
        }
        Disassembly { lines }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            let _ = match line.span {
                Some(span) => writeln!(
                    out,
                    "{:>6}: {:<30} ; {}",
                    line.address, line.instruction, span
                ),
                None => writeln!(out, "{:>6}: {}", line.address, line.instruction),
            };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Instruction;

    #[test]
    fn renders_one_line_per_instruction() {
        let mut words = Vec::new();
        Instruction::Push(5).encode(&mut words);
        Instruction::Print.encode(&mut words);
        Instruction::Halt.encode(&mut words);

        let disasm = Disassembly::new(&words, &[]);
        assert_eq!(disasm.lines.len(), 3);
        assert_eq!(disasm.lines[0].address, 0);
        assert_eq!(disasm.lines[1].address, 2);
        assert_eq!(disasm.lines[2].address, 3);
    }

    #[test]
    fn attaches_nearest_preceding_span() {
        let mut words = Vec::new();
        Instruction::Push(5).encode(&mut words);
        Instruction::Print.encode(&mut words);
        let span = Span {
            start_line: 3,
            start_col: 1,
            end_line: 3,
            end_col: 5,
        };
        let disasm = Disassembly::new(&words, &[(0, span)]);
        assert_eq!(disasm.lines[1].span, Some(span));
    }

    #[test]
    fn render_contains_mnemonics() {
        let mut words = Vec::new();
        Instruction::Halt.encode(&mut words);
        let text = Disassembly::new(&words, &[]).render();
        assert!(text.contains("HALT"));
    }
}
