use std::fmt;
use std::time::Instant;

use crate::memory::{Byte, Memory, Word, MEMORY_SIZE};
use log::*;
use num_enum::IntoPrimitive;
use num_enum::TryFromPrimitive;

mod fault;
mod metrics;

pub use fault::{Fault, Warning};
pub use metrics::ExecutionMetrics;

/// The main entrypoint. First instruction should be placed here.
pub const ENTRYPOINT: Word = 0x00;

/// Snapshot of the architectural registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registers {
    pub a: Byte,
    pub pc: Word,
    pub sp: Word,
    pub z: bool,
    pub t: bool,
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A=0x{:02X} ({}) PC=0x{:02X} SP=0x{:02X} Z={} halted={}",
            self.a, self.a, self.pc, self.sp, self.z as u8, self.t
        )
    }
}

/// Outcome of [`Processor::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub registers: Registers,
    pub metrics: ExecutionMetrics,
    pub warnings: Vec<Warning>,
    /// The fault that stopped the run, `None` if it ended with HALT
    pub fault: Option<Fault>,
}

impl RunReport {
    /// True if the program halted without a fault
    pub fn is_clean(&self) -> bool {
        self.fault.is_none()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.registers)?;
        match &self.fault {
            Some(fault) => writeln!(f, "fault: {}", fault)?,
            None => writeln!(f, "fault: none")?,
        }
        for warning in &self.warnings {
            writeln!(f, "warning: {}", warning)?;
        }
        write!(f, "{}", self.metrics)
    }
}

/// Emulates an accumulator CPU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processor {
    /// Accumulator
    pub a: Byte,
    /// Program counter
    pub pc: Word,
    /// Stack Pointer. Points at the next free cell, the stack grows downwards
    pub sp: Word,
    /// Zero flag
    pub z: bool,
    /// Termination flag. Set on HALT or when a fault occurs
    pub t: bool,
    entrypoint: Word,
    /// Initial stack pointer; the stack is empty when `sp` is here
    stack_top: Word,
    instruction_limit: Option<u64>,
    metrics: ExecutionMetrics,
    warnings: Vec<Warning>,
    fault: Option<Fault>,
}

impl Default for Processor {
    /// Initializes a new CPU for the standard memory
    fn default() -> Self {
        Self::new(ENTRYPOINT, (MEMORY_SIZE - 1) as Word)
    }
}

impl Processor {
    /// Initializes a new CPU
    /// @param entrypoint The start of the program
    /// @param stack_top The last valid address, where the stack starts
    pub fn new(entrypoint: Word, stack_top: Word) -> Self {
        Self {
            a: 0,
            pc: entrypoint,
            sp: stack_top,
            z: false,
            t: false,
            entrypoint,
            stack_top,
            instruction_limit: None,
            metrics: ExecutionMetrics::default(),
            warnings: Vec::new(),
            fault: None,
        }
    }

    /// Initializes a new CPU whose stack starts at the last cell of `memory`
    pub fn for_memory<const S: usize>(_memory: &Memory<S>) -> Self {
        Self::new(ENTRYPOINT, S.saturating_sub(1) as Word)
    }

    /// Stops [`Processor::run`] with a fault once `limit` instructions ran
    pub fn with_instruction_limit(mut self, limit: u64) -> Self {
        self.instruction_limit = Some(limit);
        self
    }

    /// Restores the initial register state and clears metrics, warnings and faults
    pub fn reset(&mut self) {
        let limit = self.instruction_limit;
        *self = Self::new(self.entrypoint, self.stack_top);
        self.instruction_limit = limit;
    }

    pub fn registers(&self) -> Registers {
        Registers {
            a: self.a,
            pc: self.pc,
            sp: self.sp,
            z: self.z,
            t: self.t,
        }
    }

    pub fn metrics(&self) -> &ExecutionMetrics {
        &self.metrics
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    /// Number of bytes currently on the stack
    pub fn stack_depth(&self) -> Word {
        self.stack_top.saturating_sub(self.sp)
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            registers: self.registers(),
            metrics: self.metrics,
            warnings: self.warnings.clone(),
            fault: self.fault,
        }
    }

    /// Executes a single instruction whose opcode was fetched from `at`
    pub fn execute_instruction<const S: usize>(
        &mut self,
        instruction: Instruction,
        at: Word,
        memory: &mut Memory<S>,
    ) -> Result<(), Fault> {
        match instruction {
            Instruction::NOP => {
                debug!("NOP");
            }
            Instruction::STORE => {
                let addr = self.fetch(memory)?;
                let value = self.a;
                if self.check_operand(instruction, addr, at, memory) {
                    self.metrics.memory_writes += 1;
                    memory.write_byte(addr as Word, value);
                }

                debug!("STORE {}: {}", addr, value);
            }
            Instruction::ADD => {
                let addr = self.fetch(memory)?;
                let value = self.load(instruction, addr, at, memory);
                let result = self.a.wrapping_add(value);

                debug!("ADD {}: {} + {} = {}", addr, self.a, value, result);
                self.set_accumulator(result);
            }
            Instruction::SUB => {
                let addr = self.fetch(memory)?;
                let value = self.load(instruction, addr, at, memory);
                let result = self.a.wrapping_sub(value);

                debug!("SUB {}: {} - {} = {}", addr, self.a, value, result);
                self.set_accumulator(result);
            }
            Instruction::LOADI => {
                let value = self.fetch(memory)?;
                self.set_accumulator(value);

                debug!("LOADI {}", value);
            }
            Instruction::LOADM => {
                let addr = self.fetch(memory)?;
                let value = self.load(instruction, addr, at, memory);
                self.set_accumulator(value);

                debug!("LOADM {}: {}", addr, value);
            }
            Instruction::JMP => {
                let addr = self.fetch(memory)?;
                self.jump(instruction, addr, true, at, memory);

                debug!("JMP {}", addr);
            }
            Instruction::HALT => {
                self.t = true; // set termination flag

                debug!("HALT");
            }
            Instruction::PUSH => {
                let value = self.a;
                self.push(value, at, memory)?;

                debug!("PUSH {}", value);
            }
            Instruction::POP => {
                let value = self.pop(at, memory)?;
                self.set_accumulator(value);

                debug!("POP {}", value);
            }
            Instruction::CALL => {
                let addr = self.fetch(memory)?;
                if self.check_operand(instruction, addr, at, memory) {
                    // return addresses are a single byte and must be fetchable
                    let ret = match Byte::try_from(self.pc) {
                        Ok(ret) if memory.contains(self.pc) => ret,
                        _ => return Err(Fault::OutOfBoundsFetch { pc: self.pc }),
                    };
                    self.push(ret, at, memory)?;
                    self.pc = addr as Word;
                    self.metrics.record_jump(true);
                } else {
                    self.metrics.record_jump(false);
                }

                debug!("CALL {}", addr);
            }
            Instruction::RET => {
                let addr = self.pop(at, memory)?;
                self.pc = addr as Word;
                self.metrics.record_jump(true);

                debug!("RET {}", addr);
            }
            Instruction::JMPZ => {
                let addr = self.fetch(memory)?;
                let zero = self.z;
                self.jump(instruction, addr, zero, at, memory);

                debug!("JMPZ {}: {}", addr, zero);
            }
            Instruction::MUL => {
                let addr = self.fetch(memory)?;
                let value = self.load(instruction, addr, at, memory);
                let result = self.a.wrapping_mul(value);

                debug!("MUL {}: {} * {} = {}", addr, self.a, value, result);
                self.set_accumulator(result);
            }
        }

        Ok(())
    }

    /// Runs one execution step. A fault halts the processor and is kept for
    /// the report.
    pub fn execute<const S: usize>(&mut self, memory: &mut Memory<S>) -> Result<(), Fault> {
        let result = self.step(memory);
        if let Err(fault) = result {
            self.halt_with(fault);
        }
        result
    }

    /// Run program until it halts or faults
    pub fn run<const S: usize>(&mut self, memory: &mut Memory<S>) -> RunReport {
        let started = Instant::now();

        while !self.t {
            if let Some(limit) = self.instruction_limit {
                if self.metrics.instructions >= limit {
                    self.halt_with(Fault::InstructionLimitReached { pc: self.pc, limit });
                    break;
                }
            }

            if self.execute(memory).is_err() {
                break;
            }
        }

        self.metrics.duration += started.elapsed();
        info!(
            "Program terminated after {} instructions. A: 0x{:02X} / {}",
            self.metrics.instructions, self.a, self.a
        );

        self.report()
    }

    fn step<const S: usize>(&mut self, memory: &mut Memory<S>) -> Result<(), Fault> {
        let at = self.pc;
        let opcode = self.fetch(memory)?; // Read opcode where PC is
        let instruction =
            Instruction::try_from(opcode).map_err(|_| Fault::UnknownOpcode { opcode, pc: at })?;

        self.execute_instruction(instruction, at, memory)?;
        self.metrics.record_instruction();

        Ok(())
    }

    fn halt_with(&mut self, fault: Fault) {
        error!("{}", fault);
        self.t = true;
        self.fault = Some(fault);
    }

    fn set_accumulator(&mut self, value: Byte) {
        self.a = value;
        self.z = value == 0;
    }

    /// Reads the byte at PC and advances PC
    fn fetch<const S: usize>(&mut self, memory: &Memory<S>) -> Result<Byte, Fault> {
        let byte = memory
            .get(self.pc)
            .ok_or(Fault::OutOfBoundsFetch { pc: self.pc })?;
        self.pc = self.pc.wrapping_add(1);
        self.metrics.memory_reads += 1;

        Ok(byte)
    }

    /// Records a warning if `address` is outside of `memory`
    fn check_operand<const S: usize>(
        &mut self,
        instruction: Instruction,
        address: Byte,
        at: Word,
        memory: &Memory<S>,
    ) -> bool {
        if memory.contains(address as Word) {
            return true;
        }

        let warning = Warning::OutOfRangeOperand {
            instruction,
            address,
            pc: at,
        };
        warn!("{}", warning);
        self.warnings.push(warning);

        false
    }

    /// Reads an operand from memory, zero if the address is out of range
    fn load<const S: usize>(
        &mut self,
        instruction: Instruction,
        address: Byte,
        at: Word,
        memory: &Memory<S>,
    ) -> Byte {
        if self.check_operand(instruction, address, at, memory) {
            self.metrics.memory_reads += 1;
            memory.read_byte(address as Word)
        } else {
            0
        }
    }

    fn jump<const S: usize>(
        &mut self,
        instruction: Instruction,
        address: Byte,
        condition: bool,
        at: Word,
        memory: &Memory<S>,
    ) {
        let taken = self.check_operand(instruction, address, at, memory) && condition;
        if taken {
            self.pc = address as Word;
        }
        self.metrics.record_jump(taken);
    }

    fn push<const S: usize>(
        &mut self,
        value: Byte,
        at: Word,
        memory: &mut Memory<S>,
    ) -> Result<(), Fault> {
        if self.sp == 0 || !memory.contains(self.sp) {
            return Err(Fault::StackOverflow { pc: at });
        }

        memory.write_byte(self.sp, value);
        self.metrics.memory_writes += 1;
        self.sp -= 1;
        self.metrics.observe_stack_depth(self.stack_depth());

        Ok(())
    }

    fn pop<const S: usize>(&mut self, at: Word, memory: &Memory<S>) -> Result<Byte, Fault> {
        if self.sp >= self.stack_top || !memory.contains(self.sp + 1) {
            return Err(Fault::StackUnderflow { pc: at });
        }

        self.sp += 1;
        self.metrics.memory_reads += 1;

        Ok(memory.read_byte(self.sp))
    }
}

macro_rules! instructions {
    (@operand) => { None };
    (@operand $operand:ident) => { Some(stringify!($operand)) };
    ( $( $( #[doc = $doc:expr] )+ $name:ident $( ( $operand:ident ) )? = $repr:literal , )+ ) => {
        /// Defines the instructions
        /// Every instruction works on the accumulator and takes at most one byte operand
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(TryFromPrimitive, IntoPrimitive)]
        pub enum Instruction {
            $(
                $( #[doc = $doc] )+
                $name = $repr,
            )+
        }

        impl Instruction {
            pub const ALL: &'static [Self] = &[
                $( Self::$name , )+
            ];

            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name) , )+
                }
            }

            /// Name of the operand, `None` if the instruction takes none
            pub fn operand(&self) -> Option<&'static str> {
                match self {
                    $( Self::$name => instructions!(@operand $( $operand )?) , )+
                }
            }
        }

        impl ::std::fmt::Display for Instruction {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $( Self::$name => f.write_str(stringify!($name)) , )+
                }
            }
        }
    }
}

instructions! {
    /// No operation
    NOP = 1,
    /// Write the accumulator to memory
    /// @param address Destination cell
    STORE(address) = 2,
    /// Add a memory cell to the accumulator
    /// @param address Cell holding the summand
    ADD(address) = 3,
    /// Subtract a memory cell from the accumulator
    /// @param address Cell holding the subtrahend
    SUB(address) = 4,
    /// Load a constant into the accumulator
    /// @param value The value to load
    LOADI(value) = 5,
    /// Load a memory cell into the accumulator
    /// @param address The cell to load
    LOADM(address) = 6,
    /// Jump to an address
    /// @param address The address to jump to
    JMP(address) = 7,
    /// Stop the execution of the program
    HALT = 8,
    /// Push the accumulator onto the stack
    PUSH = 9,
    /// Pop the top of the stack into the accumulator
    POP = 10,
    /// Push the return address and jump to a subroutine
    /// @param address The subroutine
    CALL(address) = 11,
    /// Pop the return address and jump back to it
    RET = 12,
    /// Jump if the zero flag is set
    /// @param address The address to jump to
    JMPZ(address) = 13,
    /// Multiply the accumulator with a memory cell
    /// @param address Cell holding the factor
    MUL(address) = 14,
}

impl Instruction {
    /// Encoded size in bytes: the opcode plus an optional operand byte
    pub fn size(&self) -> Word {
        if self.operand().is_some() {
            2
        } else {
            1
        }
    }

    /// Looks up an instruction by mnemonic, ignoring case. `LOAD` and `LOADA`
    /// are accepted as aliases of `LOADM` and `LOADI`.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        let mnemonic = mnemonic.to_ascii_uppercase();
        match mnemonic.as_str() {
            "LOAD" => Some(Self::LOADM),
            "LOADA" => Some(Self::LOADI),
            name => Self::ALL
                .iter()
                .copied()
                .find(|instruction| instruction.name() == name),
        }
    }
}
