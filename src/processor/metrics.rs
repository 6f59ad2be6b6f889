use std::fmt;
use std::time::Duration;

use crate::memory::Word;

/// Counters collected while the processor runs. They are purely
/// observational and never influence execution.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionMetrics {
    /// Instructions that completed
    pub instructions: u64,
    /// One cycle per instruction
    pub cycles: u64,
    /// Reads from memory, opcode and operand fetches included
    pub memory_reads: u64,
    /// Writes to memory, stack pushes included
    pub memory_writes: u64,
    pub jumps_taken: u64,
    pub jumps_not_taken: u64,
    /// Highest number of bytes on the stack at any point
    pub peak_stack_depth: Word,
    /// Wall-clock time spent in [`Processor::run`](super::Processor::run)
    pub duration: Duration,
}

impl ExecutionMetrics {
    /// Total number of memory accesses
    pub fn memory_accesses(&self) -> u64 {
        self.memory_reads + self.memory_writes
    }

    pub(super) fn record_instruction(&mut self) {
        self.instructions += 1;
        self.cycles += 1;
    }

    pub(super) fn record_jump(&mut self, taken: bool) {
        if taken {
            self.jumps_taken += 1;
        } else {
            self.jumps_not_taken += 1;
        }
    }

    pub(super) fn observe_stack_depth(&mut self, depth: Word) {
        self.peak_stack_depth = self.peak_stack_depth.max(depth);
    }
}

impl fmt::Display for ExecutionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "instructions:     {}", self.instructions)?;
        writeln!(f, "cycles:           {}", self.cycles)?;
        writeln!(
            f,
            "memory accesses:  {} ({} reads, {} writes)",
            self.memory_accesses(),
            self.memory_reads,
            self.memory_writes
        )?;
        writeln!(
            f,
            "jumps:            {} taken, {} not taken",
            self.jumps_taken, self.jumps_not_taken
        )?;
        writeln!(f, "peak stack depth: {}", self.peak_stack_depth)?;
        write!(f, "duration:         {:?}", self.duration)
    }
}
