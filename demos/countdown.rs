use color_eyre::eyre::Result;

use log::LevelFilter;
use neumann::assembler::assemble;
use neumann::memory::StdMem;
use neumann::processor::Processor;
use simple_logger::SimpleLogger;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(LevelFilter::Debug)
        .init()?; // logging

    let program = assemble(include_str!("programs/countdown.asm"))?;
    let mut mem: StdMem = program
        .to_memory()
        .ok_or_else(|| color_eyre::eyre::eyre!("program does not fit into memory"))?;
    let mut cpu = Processor::for_memory(&mem);

    let report = cpu.run(&mut mem);
    println!("{}", report);
    mem.dump();

    Ok(())
}
