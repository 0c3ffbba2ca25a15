use thiserror::Error;

use crate::opcode::Word;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("operand stack overflow at pc {pc} (limit {limit})")]
    StackOverflow { pc: usize, limit: usize },
    #[error("operand stack underflow at pc {pc} executing {opcode}")]
    StackUnderflow { pc: usize, opcode: &'static str },
    #[error("call stack overflow at pc {pc} (limit {limit})")]
    CallStackOverflow { pc: usize, limit: usize },
    #[error("RET with no active call frame at pc {pc}")]
    CallStackUnderflow { pc: usize },
    #[error("LEAVE_TRY with no active try frame at pc {pc}")]
    TryStackUnderflow { pc: usize },
    #[error("global memory access out of bounds: address {address} (size {size}) at pc {pc}")]
    MemoryOutOfBounds {
        address: usize,
        size: usize,
        pc: usize,
    },
    #[error("heap access out of bounds: address {address}, len {len} (heap size {heap_size}) at pc {pc}")]
    HeapOutOfBounds {
        address: usize,
        len: usize,
        heap_size: usize,
        pc: usize,
    },
    #[error("heap exhausted: requested {requested} bytes, {remaining} remaining, at pc {pc}")]
    HeapExhausted {
        requested: usize,
        remaining: usize,
        pc: usize,
    },
    #[error("unknown opcode {opcode:#04x} at pc {pc}")]
    UnknownOpcode { opcode: Word, pc: usize },
    #[error("program counter {pc} ran past the end of the instruction stream")]
    ProgramCounterOutOfBounds { pc: usize },
    #[error("uncaught exception with value {value} thrown at pc {pc}")]
    UncaughtException { value: Word, pc: usize },
    #[error("execution exceeded the instruction fuse ({limit} instructions)")]
    InstructionFuseExceeded { limit: u64 },
    #[error("READ requested input but none remained")]
    InputExhausted,
}
