//! Toolchain for a small accumulator machine with 256 bytes of memory.
//!
//! - [`assembler`] turns labeled assembly into a [`assembler::Program`]
//! - [`memory`] holds code, data and stack, and reads/writes memory files
//! - [`processor`] fetches, decodes and executes a memory image

pub mod assembler;
pub mod memory;
pub mod processor;
