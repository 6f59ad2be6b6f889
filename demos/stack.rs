use color_eyre::eyre::{eyre, Result};

use neumann::assembler::Assembler;
use neumann::memory::StdMem;
use neumann::processor::Processor;
use simple_logger::SimpleLogger;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new().init()?; // logging

    let mut assembler = Assembler::new();
    assembler.first_pass(include_str!("programs/stack.asm"))?;
    for label in assembler.labels().iter() {
        println!("{:<8} 0x{:02X}", label.name, label.address);
    }

    let program = assembler.second_pass()?;
    let mut mem: StdMem = program
        .to_memory()
        .ok_or_else(|| eyre!("program does not fit into memory"))?;
    let mut cpu = Processor::for_memory(&mem);

    let report = cpu.run(&mut mem);
    println!("{}", report);
    println!(
        "double: {}, saved: {}",
        mem.read_byte(101),
        mem.read_byte(102)
    );

    Ok(())
}
