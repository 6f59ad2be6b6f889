use color_eyre::eyre::Result;

use neumann::memory::StdMem;
use neumann::processor::{Processor, ENTRYPOINT};
use neumann::write_instructions;
use simple_logger::SimpleLogger;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new().init()?; // logging

    let mut mem = StdMem::default();
    let mut cpu = Processor::default();

    use neumann::processor::Instruction::*;
    write_instructions!(mem : ENTRYPOINT =>
        LOADI,
        42,
        STORE,
        100,
        LOADI,
        58,
        ADD,
        100,
        HALT
    );

    let report = cpu.run(&mut mem);
    println!("{}", report);

    Ok(())
}
