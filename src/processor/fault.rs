use std::error;
use std::fmt;

use crate::memory::{Byte, Word};

use super::Instruction;

/// Conditions that stop the processor. Every fault carries the address of
/// the instruction that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// The program counter left the memory
    OutOfBoundsFetch { pc: Word },
    /// PUSH or CALL with a full stack
    StackOverflow { pc: Word },
    /// POP or RET with an empty stack
    StackUnderflow { pc: Word },
    /// The byte at `pc` is not an instruction
    UnknownOpcode { opcode: Byte, pc: Word },
    /// The configured instruction ceiling was reached before HALT
    InstructionLimitReached { pc: Word, limit: u64 },
}

impl Fault {
    pub fn pc(&self) -> Word {
        match *self {
            Fault::OutOfBoundsFetch { pc }
            | Fault::StackOverflow { pc }
            | Fault::StackUnderflow { pc }
            | Fault::UnknownOpcode { pc, .. }
            | Fault::InstructionLimitReached { pc, .. } => pc,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::OutOfBoundsFetch { pc } => {
                write!(f, "fetch outside of memory at 0x{:02X}", pc)
            }
            Fault::StackOverflow { pc } => write!(f, "stack overflow at 0x{:02X}", pc),
            Fault::StackUnderflow { pc } => write!(f, "stack underflow at 0x{:02X}", pc),
            Fault::UnknownOpcode { opcode, pc } => {
                write!(f, "unknown opcode 0x{:02X} at 0x{:02X}", opcode, pc)
            }
            Fault::InstructionLimitReached { pc, limit } => {
                write!(f, "instruction limit of {} reached at 0x{:02X}", limit, pc)
            }
        }
    }
}

impl error::Error for Fault {}

/// Non-fatal conditions. The instruction degrades and execution continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Warning {
    /// The operand addresses a cell outside of the memory. Data instructions
    /// operate against zero (STORE writes nothing), jumps are not taken.
    OutOfRangeOperand {
        instruction: Instruction,
        address: Byte,
        pc: Word,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::OutOfRangeOperand {
                instruction,
                address,
                pc,
            } => write!(
                f,
                "{} at 0x{:02X}: address 0x{:02X} is outside of memory",
                instruction, pc, address
            ),
        }
    }
}
