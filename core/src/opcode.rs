//! Opcode set & encoding.
//!
//! The instruction set is a flat, word-addressable stream of `i64`s: an
//! opcode tag, optionally followed by exactly one operand word. Every other
//! component (codegen, optimizer, linker, disassembler, VM) decodes and
//! re-encodes through this module, so the operand arity table here is the
//! single source of truth for how many words an instruction occupies.
//!
//! Opcode numbering is an implementation detail; the only contract that
//! matters is `decode(encode(i)) == i`, which the tests below check for
//! every variant.

use std::fmt;

use thiserror::Error;

pub type Word = i64;

static_assertions::assert_eq_size!(Word, i64);

/// A single decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Halt,
    Push(Word),
    Add,
    Sub,
    Mul,
    Print,
    Jmp(Word),
    JmpIfZero(Word),
    JmpIfNeg(Word),
    Load(Word),
    Store(Word),
    Read,
    Call(Word),
    Ret,
    LoadLocal(Word),
    StoreLocal(Word),
    EnterTry(Word),
    LeaveTry,
    Throw,
    Malloc,
    Load8(Word),
    Load32(Word),
    Store8(Word),
    Store32(Word),
    Load32Stack,
    Store32Stack,
    Store8Stack,
}

/// Raw opcode tags as encoded on the wire.
pub mod tag {
    use super::Word;

    pub const HALT: Word = 0x00;
    pub const PUSH: Word = 0x01;
    pub const ADD: Word = 0x02;
    pub const SUB: Word = 0x03;
    pub const MUL: Word = 0x04;
    pub const PRINT: Word = 0x05;
    pub const JMP: Word = 0x06;
    pub const JMP_IF_ZERO: Word = 0x07;
    pub const JMP_IF_NEG: Word = 0x08;
    pub const LOAD: Word = 0x09;
    pub const STORE: Word = 0x0A;
    pub const READ: Word = 0x0B;
    pub const CALL: Word = 0x0C;
    pub const RET: Word = 0x0D;
    pub const LOAD_LOCAL: Word = 0x0E;
    pub const STORE_LOCAL: Word = 0x0F;
    pub const ENTER_TRY: Word = 0x10;
    pub const LEAVE_TRY: Word = 0x11;
    pub const THROW: Word = 0x12;
    pub const MALLOC: Word = 0x13;
    pub const LOAD8: Word = 0x14;
    pub const LOAD32: Word = 0x15;
    pub const STORE8: Word = 0x16;
    pub const STORE32: Word = 0x17;
    pub const LOAD32_STACK: Word = 0x18;
    pub const STORE32_STACK: Word = 0x19;
    pub const STORE8_STACK: Word = 0x1A;
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown opcode {0:#04x} at address {1}")]
    UnknownOpcode(Word, usize),
    #[error("truncated instruction at address {0}: missing operand")]
    MissingOperand(usize),
}

impl Instruction {
    /// Number of operand words following the opcode tag (0 or 1 for every
    /// instruction in this set).
    pub const fn operand_count(opcode: Word) -> Option<usize> {
        use tag::*;
        match opcode {
            HALT | ADD | SUB | MUL | PRINT | READ | RET | LEAVE_TRY | THROW | MALLOC
            | LOAD32_STACK | STORE32_STACK | STORE8_STACK => Some(0),
            PUSH | JMP | JMP_IF_ZERO | JMP_IF_NEG | LOAD | STORE | CALL | LOAD_LOCAL
            | STORE_LOCAL | ENTER_TRY | LOAD8 | LOAD32 | STORE8 | STORE32 => Some(1),
            _ => None,
        }
    }

    /// Total width in words (opcode + operands) of this instruction once encoded.
    pub fn width(&self) -> usize {
        1 + Self::operand_count(self.opcode()).unwrap_or(0)
    }

    pub const fn opcode(&self) -> Word {
        use tag::*;
        match self {
            Instruction::Halt => HALT,
            Instruction::Push(_) => PUSH,
            Instruction::Add => ADD,
            Instruction::Sub => SUB,
            Instruction::Mul => MUL,
            Instruction::Print => PRINT,
            Instruction::Jmp(_) => JMP,
            Instruction::JmpIfZero(_) => JMP_IF_ZERO,
            Instruction::JmpIfNeg(_) => JMP_IF_NEG,
            Instruction::Load(_) => LOAD,
            Instruction::Store(_) => STORE,
            Instruction::Read => READ,
            Instruction::Call(_) => CALL,
            Instruction::Ret => RET,
            Instruction::LoadLocal(_) => LOAD_LOCAL,
            Instruction::StoreLocal(_) => STORE_LOCAL,
            Instruction::EnterTry(_) => ENTER_TRY,
            Instruction::LeaveTry => LEAVE_TRY,
            Instruction::Throw => THROW,
            Instruction::Malloc => MALLOC,
            Instruction::Load8(_) => LOAD8,
            Instruction::Load32(_) => LOAD32,
            Instruction::Store8(_) => STORE8,
            Instruction::Store32(_) => STORE32,
            Instruction::Load32Stack => LOAD32_STACK,
            Instruction::Store32Stack => STORE32_STACK,
            Instruction::Store8Stack => STORE8_STACK,
        }
    }

    /// The operand word, if this instruction carries one.
    pub const fn operand(&self) -> Option<Word> {
        match self {
            Instruction::Push(v)
            | Instruction::Jmp(v)
            | Instruction::JmpIfZero(v)
            | Instruction::JmpIfNeg(v)
            | Instruction::Load(v)
            | Instruction::Store(v)
            | Instruction::Call(v)
            | Instruction::LoadLocal(v)
            | Instruction::StoreLocal(v)
            | Instruction::EnterTry(v)
            | Instruction::Load8(v)
            | Instruction::Load32(v)
            | Instruction::Store8(v)
            | Instruction::Store32(v) => Some(*v),
            _ => None,
        }
    }

    /// True for instructions whose operand is a branch/call/try-entry target
    /// address rather than an immediate, memory address, or local offset.
    /// Used by the optimizer and linker to know which operands to rewrite
    /// when addresses shift.
    pub const fn is_address_operand(&self) -> bool {
        matches!(
            self,
            Instruction::Jmp(_)
                | Instruction::JmpIfZero(_)
                | Instruction::JmpIfNeg(_)
                | Instruction::Call(_)
                | Instruction::EnterTry(_)
        )
    }

    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Halt => "HALT",
            Instruction::Push(_) => "PUSH",
            Instruction::Add => "ADD",
            Instruction::Sub => "SUB",
            Instruction::Mul => "MUL",
            Instruction::Print => "PRINT",
            Instruction::Jmp(_) => "JMP",
            Instruction::JmpIfZero(_) => "JMP_IF_ZERO",
            Instruction::JmpIfNeg(_) => "JMP_IF_NEG",
            Instruction::Load(_) => "LOAD",
            Instruction::Store(_) => "STORE",
            Instruction::Read => "READ",
            Instruction::Call(_) => "CALL",
            Instruction::Ret => "RET",
            Instruction::LoadLocal(_) => "LOAD_LOCAL",
            Instruction::StoreLocal(_) => "STORE_LOCAL",
            Instruction::EnterTry(_) => "ENTER_TRY",
            Instruction::LeaveTry => "LEAVE_TRY",
            Instruction::Throw => "THROW",
            Instruction::Malloc => "MALLOC",
            Instruction::Load8(_) => "LOAD8",
            Instruction::Load32(_) => "LOAD32",
            Instruction::Store8(_) => "STORE8",
            Instruction::Store32(_) => "STORE32",
            Instruction::Load32Stack => "LOAD32_STACK",
            Instruction::Store32Stack => "STORE32_STACK",
            Instruction::Store8Stack => "STORE8_STACK",
        }
    }

    /// Encode this instruction by appending its words to `out`.
    pub fn encode(&self, out: &mut Vec<Word>) {
        out.push(self.opcode());
        if let Some(operand) = self.operand() {
            out.push(operand);
        }
    }

    /// Decode the instruction starting at `words[pc]`. Returns the
    /// instruction and its width in words.
    pub fn decode(words: &[Word], pc: usize) -> Result<(Instruction, usize), DecodeError> {
        let opcode = *words
            .get(pc)
            .ok_or(DecodeError::MissingOperand(pc))?;
        let operand_count =
            Self::operand_count(opcode).ok_or(DecodeError::UnknownOpcode(opcode, pc))?;
        let operand = if operand_count == 1 {
            Some(
                *words
                    .get(pc + 1)
                    .ok_or(DecodeError::MissingOperand(pc))?,
            )
        } else {
            None
        };
        let instruction = Self::from_parts(opcode, operand, pc)?;
        Ok((instruction, 1 + operand_count))
    }

    fn from_parts(opcode: Word, operand: Option<Word>, pc: usize) -> Result<Self, DecodeError> {
        use tag::*;
        Ok(match opcode {
            HALT => Instruction::Halt,
            PUSH => Instruction::Push(operand.ok_or(DecodeError::MissingOperand(pc))?),
            ADD => Instruction::Add,
            SUB => Instruction::Sub,
            MUL => Instruction::Mul,
            PRINT => Instruction::Print,
            JMP => Instruction::Jmp(operand.ok_or(DecodeError::MissingOperand(pc))?),
            JMP_IF_ZERO => Instruction::JmpIfZero(operand.ok_or(DecodeError::MissingOperand(pc))?),
            JMP_IF_NEG => Instruction::JmpIfNeg(operand.ok_or(DecodeError::MissingOperand(pc))?),
            LOAD => Instruction::Load(operand.ok_or(DecodeError::MissingOperand(pc))?),
            STORE => Instruction::Store(operand.ok_or(DecodeError::MissingOperand(pc))?),
            READ => Instruction::Read,
            CALL => Instruction::Call(operand.ok_or(DecodeError::MissingOperand(pc))?),
            RET => Instruction::Ret,
            LOAD_LOCAL => Instruction::LoadLocal(operand.ok_or(DecodeError::MissingOperand(pc))?),
            STORE_LOCAL => {
                Instruction::StoreLocal(operand.ok_or(DecodeError::MissingOperand(pc))?)
            }
            ENTER_TRY => Instruction::EnterTry(operand.ok_or(DecodeError::MissingOperand(pc))?),
            LEAVE_TRY => Instruction::LeaveTry,
            THROW => Instruction::Throw,
            MALLOC => Instruction::Malloc,
            LOAD8 => Instruction::Load8(operand.ok_or(DecodeError::MissingOperand(pc))?),
            LOAD32 => Instruction::Load32(operand.ok_or(DecodeError::MissingOperand(pc))?),
            STORE8 => Instruction::Store8(operand.ok_or(DecodeError::MissingOperand(pc))?),
            STORE32 => Instruction::Store32(operand.ok_or(DecodeError::MissingOperand(pc))?),
            LOAD32_STACK => Instruction::Load32Stack,
            STORE32_STACK => Instruction::Store32Stack,
            STORE8_STACK => Instruction::Store8Stack,
            other => return Err(DecodeError::UnknownOpcode(other, pc)),
        })
    }

    /// With the operand rewritten (no-op for operand-less instructions).
    pub fn with_operand(&self, operand: Word) -> Self {
        match self {
            Instruction::Push(_) => Instruction::Push(operand),
            Instruction::Jmp(_) => Instruction::Jmp(operand),
            Instruction::JmpIfZero(_) => Instruction::JmpIfZero(operand),
            Instruction::JmpIfNeg(_) => Instruction::JmpIfNeg(operand),
            Instruction::Load(_) => Instruction::Load(operand),
            Instruction::Store(_) => Instruction::Store(operand),
            Instruction::Call(_) => Instruction::Call(operand),
            Instruction::LoadLocal(_) => Instruction::LoadLocal(operand),
            Instruction::StoreLocal(_) => Instruction::StoreLocal(operand),
            Instruction::EnterTry(_) => Instruction::EnterTry(operand),
            Instruction::Load8(_) => Instruction::Load8(operand),
            Instruction::Load32(_) => Instruction::Load32(operand),
            Instruction::Store8(_) => Instruction::Store8(operand),
            Instruction::Store32(_) => Instruction::Store32(operand),
            other => *other,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand() {
            Some(operand) => write!(f, "{:<12} {}", self.mnemonic(), operand),
            None => write!(f, "{}", self.mnemonic()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<Instruction> {
        vec![
            Instruction::Halt,
            Instruction::Push(42),
            Instruction::Add,
            Instruction::Sub,
            Instruction::Mul,
            Instruction::Print,
            Instruction::Jmp(7),
            Instruction::JmpIfZero(7),
            Instruction::JmpIfNeg(7),
            Instruction::Load(3),
            Instruction::Store(3),
            Instruction::Read,
            Instruction::Call(10),
            Instruction::Ret,
            Instruction::LoadLocal(1),
            Instruction::StoreLocal(1),
            Instruction::EnterTry(20),
            Instruction::LeaveTry,
            Instruction::Throw,
            Instruction::Malloc,
            Instruction::Load8(5),
            Instruction::Load32(5),
            Instruction::Store8(5),
            Instruction::Store32(5),
            Instruction::Load32Stack,
            Instruction::Store32Stack,
            Instruction::Store8Stack,
        ]
    }

    #[test]
    fn round_trips_every_variant() {
        for inst in all_variants() {
            let mut words = Vec::new();
            inst.encode(&mut words);
            let (decoded, width) = Instruction::decode(&words, 0).unwrap();
            assert_eq!(decoded, inst);
            assert_eq!(width, inst.width());
            assert_eq!(width, words.len());
        }
    }

    #[test]
    fn unknown_opcode_errors() {
        let err = Instruction::decode(&[0x7F], 0).unwrap_err();
        assert_eq!(err, DecodeError::UnknownOpcode(0x7F, 0));
    }

    #[test]
    fn missing_operand_errors() {
        let err = Instruction::decode(&[tag::PUSH], 0).unwrap_err();
        assert_eq!(err, DecodeError::MissingOperand(0));
    }

    #[test]
    fn sequence_decodes_end_to_end() {
        let mut words = Vec::new();
        Instruction::Push(5).encode(&mut words);
        Instruction::Push(3).encode(&mut words);
        Instruction::Add.encode(&mut words);
        Instruction::Print.encode(&mut words);
        Instruction::Halt.encode(&mut words);

        let mut pc = 0;
        let mut decoded = Vec::new();
        while pc < words.len() {
            let (inst, width) = Instruction::decode(&words, pc).unwrap();
            decoded.push(inst);
            pc += width;
        }
        assert_eq!(
            decoded,
            vec![
                Instruction::Push(5),
                Instruction::Push(3),
                Instruction::Add,
                Instruction::Print,
                Instruction::Halt,
            ]
        );
    }
}
