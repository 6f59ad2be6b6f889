use color_eyre::eyre::{eyre, Result};

use neumann::assembler::assemble;
use neumann::memory::StdMem;
use neumann::processor::Processor;
use simple_logger::SimpleLogger;

/// Where the program leaves its result
const RESULT: u16 = 200;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new().init()?; // logging

    let program = assemble(include_str!("programs/factorial.asm"))?;
    print!("{}", program.to_mem_string());

    let mut mem: StdMem = program
        .to_memory()
        .ok_or_else(|| eyre!("program does not fit into memory"))?;
    let mut cpu = Processor::for_memory(&mem).with_instruction_limit(10_000);

    let report = cpu.run(&mut mem);
    if let Some(fault) = report.fault {
        return Err(eyre!(fault));
    }

    println!("{}", report);
    println!("5! = {}", mem.read_byte(RESULT));

    Ok(())
}
