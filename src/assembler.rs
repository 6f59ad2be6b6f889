//! Two-pass assembler for the accumulator machine.
//!
//! ```text
//! ; count down from three
//!         LOADI 1
//!         STORE 101       ; constant one
//!         LOADI 3
//! loop:
//!         JMPZ end        ; labels may be used before they are defined
//!         SUB 101
//!         JMP loop
//! end:
//!         HALT
//! ```
//!
//! The first pass records every label with the address of the next
//! instruction and keeps the instruction lines for later. Because every
//! instruction has a fixed size, the mnemonic alone is enough to compute
//! addresses. The second pass resolves operands and emits the bytes.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::memory::{to_binary_lines, Byte, Memory, Word, MEMORY_SIZE};
use crate::processor::Instruction;

mod error;

pub use error::{AsmError, AsmErrorKind, Result};

/// A symbolic name bound to an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub address: Word,
}

/// Labels of one assembly unit, in definition order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<Label>,
    index: HashMap<String, usize>,
}

impl LabelTable {
    /// Binds `name` to `address`.
    ///
    /// # Errors
    ///
    /// Fails if `name` is already defined.
    pub fn define(&mut self, name: &str, address: Word, line_nr: usize) -> Result<()> {
        if self.index.contains_key(name) {
            return Err(AsmError::new(
                AsmErrorKind::DuplicateLabel,
                format!("`{}`", name),
                line_nr,
            ));
        }

        self.index.insert(name.to_owned(), self.labels.len());
        self.labels.push(Label {
            name: name.to_owned(),
            address,
        });

        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<Word> {
        self.index.get(name).map(|&i| self.labels[i].address)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }
}

/// An instruction line seen by the first pass, waiting to be encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInstruction {
    /// The line without comment and surrounding whitespace
    pub text: String,
    pub address: Word,
    pub line_nr: usize,
}

/// Encoded program, loaded at address zero
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    bytes: Vec<Byte>,
}

impl Program {
    pub fn as_bytes(&self) -> &[Byte] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Places the program into a fresh memory, `None` if it does not fit
    pub fn to_memory<const S: usize>(&self) -> Option<Memory<S>> {
        Memory::from_bytes(&self.bytes)
    }

    /// The program in the memory file format
    pub fn to_mem_string(&self) -> String {
        to_binary_lines(&self.bytes)
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_mem_string())
            .map_err(|err| AsmError::io(format!("failed to write `{}`: {}", path.display(), err)))
    }
}

/// State of one assembly unit. Labels and pending instructions are owned
/// here, so independent units never share anything.
#[derive(Debug, Clone)]
pub struct Assembler {
    labels: LabelTable,
    pending: Vec<PendingInstruction>,
    /// Address of the next instruction
    address: usize,
    capacity: usize,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    /// Creates an assembler for programs that fit into the standard memory
    pub fn new() -> Self {
        Self::with_capacity(MEMORY_SIZE)
    }

    /// Creates an assembler for programs of at most `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            labels: LabelTable::default(),
            pending: Vec::new(),
            address: 0,
            capacity,
        }
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn pending(&self) -> &[PendingInstruction] {
        &self.pending
    }

    /// Number of bytes the pending instructions will occupy
    pub fn size(&self) -> usize {
        self.address
    }

    /// Records labels and instruction lines of `source` and assigns addresses.
    ///
    /// # Errors
    ///
    /// Stops at the first invalid or duplicate label, unknown mnemonic or
    /// when the program grows larger than the capacity.
    pub fn first_pass(&mut self, source: &str) -> Result<()> {
        for (index, raw) in source.lines().enumerate() {
            let line_nr = index + 1;
            let line = strip_comment(raw).trim();

            if line.is_empty() {
                continue;
            }

            if let Some(name) = line.strip_suffix(':') {
                let name = name.trim();
                validate_label(name, line_nr)?;
                log::debug!("[{}] Label `{}` at 0x{:02X}", line_nr, name, self.address);

                self.labels.define(name, self.address as Word, line_nr)?;
                continue;
            }

            let mnemonic = tokenize(line).next().unwrap_or_default();
            let instruction = lookup(mnemonic, line_nr)?;
            let size = instruction.size() as usize;

            if self.address + size > self.capacity {
                return Err(AsmError::new(
                    AsmErrorKind::CapacityExceeded {
                        capacity: self.capacity,
                    },
                    format!("`{}` would end at byte {}", line, self.address + size),
                    line_nr,
                ));
            }

            log::debug!("[{}] {} at 0x{:02X}", line_nr, instruction, self.address);
            self.pending.push(PendingInstruction {
                text: line.to_owned(),
                address: self.address as Word,
                line_nr,
            });
            self.address += size;
        }

        Ok(())
    }

    /// Encodes the pending instructions in the order the first pass saw them.
    ///
    /// # Errors
    ///
    /// Stops at the first operand that is missing, superfluous or neither a
    /// number nor a label.
    pub fn second_pass(&self) -> Result<Program> {
        let mut bytes: Vec<Byte> = Vec::with_capacity(self.address);

        for pending in &self.pending {
            debug_assert_eq!(bytes.len(), pending.address as usize);

            let mut tokens = tokenize(&pending.text);
            let mnemonic = tokens.next().unwrap_or_default();
            let instruction = lookup(mnemonic, pending.line_nr)?;
            bytes.push(instruction.into());

            if let Some(operand) = instruction.operand() {
                let token = tokens.next().ok_or_else(|| {
                    AsmError::new(
                        AsmErrorKind::MissingOperand,
                        format!("{} expects an {}", instruction, operand),
                        pending.line_nr,
                    )
                })?;
                bytes.push(self.resolve_operand(token, pending.line_nr)?);
            }

            if let Some(extra) = tokens.next() {
                return Err(AsmError::new(
                    AsmErrorKind::UnexpectedOperand,
                    format!("`{}`", extra),
                    pending.line_nr,
                ));
            }
        }

        Ok(Program { bytes })
    }

    /// Numbers take precedence over labels. Values wrap to a byte.
    fn resolve_operand(&self, token: &str, line_nr: usize) -> Result<Byte> {
        if let Some(value) = parse_number(token) {
            return Ok(value);
        }

        self.labels
            .resolve(token)
            .map(|address| address as Byte)
            .ok_or_else(|| {
                AsmError::new(
                    AsmErrorKind::UnresolvedOperand,
                    format!("`{}`", token),
                    line_nr,
                )
            })
    }
}

/// Assembles `source` into a program.
pub fn assemble(source: &str) -> Result<Program> {
    let mut assembler = Assembler::new();
    assembler.first_pass(source)?;
    let program = assembler.second_pass()?;

    log::info!(
        "Assembled {} instructions, {} labels, {} bytes",
        assembler.pending().len(),
        assembler.labels().len(),
        program.len()
    );

    Ok(program)
}

/// Assembles the file at `input` and writes the memory file to `output`.
/// Nothing is written if assembly fails.
pub fn assemble_file<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<Program> {
    let input = input.as_ref();
    let source = fs::read_to_string(input)
        .map_err(|err| AsmError::io(format!("failed to read `{}`: {}", input.display(), err)))?;

    let program = assemble(&source)?;
    program.write_file(output)?;

    Ok(program)
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(start) => &line[..start],
        None => line,
    }
}

fn tokenize(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
}

fn lookup(mnemonic: &str, line_nr: usize) -> Result<Instruction> {
    Instruction::from_mnemonic(mnemonic).ok_or_else(|| {
        AsmError::new(
            AsmErrorKind::UnknownMnemonic,
            format!("`{}`", mnemonic),
            line_nr,
        )
    })
}

/// A label line holds nothing but the name.
fn validate_label(name: &str, line_nr: usize) -> Result<()> {
    let context = if name.is_empty() {
        "label name is empty"
    } else if name
        .chars()
        .any(|c| c.is_whitespace() || c == ',' || c == ':')
    {
        "a label line must not contain an instruction"
    } else if parse_number(name).is_some() {
        "a label must not be a number"
    } else {
        return Ok(());
    };

    Err(AsmError::new(AsmErrorKind::InvalidLabel, context, line_nr))
}

/// Parses decimal (optionally negative), `0x` hexadecimal and `0b` binary.
/// The value is reduced modulo 256 however many digits it has.
fn parse_number(token: &str) -> Option<Byte> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };

    let (radix, digits) = match digits.as_bytes() {
        [b'0', b'x', ..] | [b'0', b'X', ..] => (16, &digits[2..]),
        [b'0', b'b', ..] | [b'0', b'B', ..] => (2, &digits[2..]),
        _ => (10, digits),
    };

    if digits.is_empty() {
        return None;
    }

    let value = digits.chars().try_fold(0 as Byte, |value, c| {
        let digit = c.to_digit(radix)? as Byte;
        Some(value.wrapping_mul(radix as Byte).wrapping_add(digit))
    })?;
    Some(if negative { value.wrapping_neg() } else { value })
}

#[cfg(test)]
mod tests {
    use crate::memory::StdMem;
    use crate::processor::{Instruction::*, Processor};

    use super::*;
    use color_eyre::eyre::Result;

    const FACTORIAL: &str = "
        ; factorial of five, result in 200
                LOADI 5
                STORE 100       ; n
                LOADI 1
                STORE 200       ; result
                LOADI 1
                STORE 2         ; constant one, overwrites code that already ran
        loop:
                LOADM 100
                JMPZ end
                LOADM 200
                MUL 100
                STORE 200
                LOADM 100
                SUB 2
                STORE 100
                JMP loop
        end:
                HALT
    ";

    fn error_of(source: &str) -> AsmError {
        assemble(source).unwrap_err()
    }

    #[test]
    fn assemble_simple() -> Result<()> {
        let program = assemble("LOADI 30\nSTORE 200\nHALT")?;

        assert_eq!(
            program.as_bytes(),
            &[LOADI as Byte, 30, STORE as Byte, 200, HALT as Byte]
        );

        Ok(())
    }

    #[test]
    fn assemble_canonical_opcodes() -> Result<()> {
        let cases: &[(&str, Byte)] = &[
            ("NOP", 1),
            ("STORE 0", 2),
            ("ADD 0", 3),
            ("SUB 0", 4),
            ("LOADI 0", 5),
            ("LOADM 0", 6),
            ("JMP 0", 7),
            ("HALT", 8),
            ("PUSH", 9),
            ("POP", 10),
            ("CALL 0", 11),
            ("RET", 12),
            ("JMPZ 0", 13),
            ("MUL 0", 14),
        ];

        for &(line, opcode) in cases {
            let program = assemble(line)?;
            assert_eq!(program.as_bytes()[0], opcode, "{}", line);
        }

        Ok(())
    }

    #[test]
    fn assemble_skips_comments_and_blank_lines() -> Result<()> {
        let source = "
            ; leading comment

            LOADI 7   ; trailing comment
                      ; only a comment
            HALT
        ";
        let program = assemble(source)?;

        assert_eq!(program.as_bytes(), &[LOADI as Byte, 7, HALT as Byte]);

        Ok(())
    }

    #[test]
    fn assemble_mnemonics_ignore_case_and_aliases() -> Result<()> {
        let program = assemble("loadi 1\nLoad 2\nloada 3\nhalt")?;

        assert_eq!(
            program.as_bytes(),
            &[
                LOADI as Byte,
                1,
                LOADM as Byte,
                2,
                LOADI as Byte,
                3,
                HALT as Byte
            ]
        );

        Ok(())
    }

    #[test]
    fn assemble_number_formats() -> Result<()> {
        let program = assemble("LOADI 0x1F\nLOADI 0b101\nLOADI 0XfF\nLOADI -1\nLOADI 300")?;

        let operands: Vec<Byte> = program.as_bytes().iter().skip(1).step_by(2).copied().collect();
        assert_eq!(operands, vec![0x1F, 0b101, 0xFF, 255, 44]);

        Ok(())
    }

    #[test]
    fn assemble_wraps_numbers_of_any_length() -> Result<()> {
        // 10^20 and 2^70 are multiples of 256
        let source = "LOADI 100000000000000000000\nLOADI 0x400000000000000005\nLOADI -99999999999999999999";
        let program = assemble(source)?;

        assert_eq!(program.as_bytes(), &[LOADI as Byte, 0, LOADI as Byte, 5, LOADI as Byte, 1]);

        Ok(())
    }

    #[test]
    fn assemble_comma_separated_operand() -> Result<()> {
        let program = assemble("STORE,100\nADD ,\t101")?;

        assert_eq!(program.as_bytes(), &[STORE as Byte, 100, ADD as Byte, 101]);

        Ok(())
    }

    #[test]
    fn forward_and_backward_references_agree() -> Result<()> {
        let source = "
                JMP target      ; forward
                NOP
        target:
                HALT
                JMP target      ; backward
        ";
        let program = assemble(source)?;

        assert_eq!(
            program.as_bytes(),
            &[JMP as Byte, 3, NOP as Byte, HALT as Byte, JMP as Byte, 3]
        );

        Ok(())
    }

    #[test]
    fn labels_resolve_like_literal_addresses() -> Result<()> {
        let labelled = assemble("LOADM value\nHALT\nvalue:\nNOP")?;
        let literal = assemble("LOADM 3\nHALT\nNOP")?;
        assert_eq!(labelled, literal);

        let mut assembler = Assembler::new();
        assembler.first_pass("JMP start\nvalue:\nNOP\nstart:\nLOADM value\nHALT")?;
        assert_eq!(assembler.labels().resolve("value"), Some(2));
        assert_eq!(assembler.labels().resolve("start"), Some(3));
        assert_eq!(
            assembler.second_pass()?.as_bytes(),
            &[JMP as Byte, 3, NOP as Byte, LOADM as Byte, 2, HALT as Byte]
        );

        Ok(())
    }

    #[test]
    fn first_pass_accounting() -> Result<()> {
        let mut assembler = Assembler::new();
        assembler.first_pass(FACTORIAL)?;

        let instruction_lines = FACTORIAL
            .lines()
            .map(|line| strip_comment(line).trim())
            .filter(|line| !line.is_empty() && !line.ends_with(':'))
            .count();
        assert_eq!(assembler.pending().len(), instruction_lines);
        assert_eq!(assembler.pending().len(), 16);
        assert_eq!(assembler.labels().len(), 2);
        assert_eq!(assembler.labels().resolve("loop"), Some(12));
        assert_eq!(assembler.labels().resolve("end"), Some(30));

        let sizes: usize = assembler
            .pending()
            .iter()
            .map(|pending| {
                let mnemonic = tokenize(&pending.text).next().unwrap();
                Instruction::from_mnemonic(mnemonic).unwrap().size() as usize
            })
            .sum();
        let program = assembler.second_pass()?;
        assert_eq!(sizes, program.len());
        assert_eq!(assembler.size(), program.len());
        assert_eq!(program.len(), 31);

        let addresses: Vec<Word> = assembler.pending().iter().map(|p| p.address).collect();
        assert_eq!(&addresses[..3], &[0, 2, 4]);
        assert_eq!(addresses.last(), Some(&30));
        assert_eq!(assembler.pending()[6].line_nr, 10);

        Ok(())
    }

    #[test]
    fn factorial_end_to_end() -> Result<()> {
        let program = assemble(FACTORIAL)?;
        let mut mem: StdMem = program.to_memory().unwrap();
        let mut cpu = Processor::for_memory(&mem);

        let report = cpu.run(&mut mem);

        assert!(report.is_clean());
        assert_eq!(mem.read_byte(200), 120);
        assert_eq!(mem.read_byte(100), 0);
        assert_eq!(report.metrics.jumps_taken, 6);
        assert_eq!(report.metrics.jumps_not_taken, 5);

        Ok(())
    }

    #[test]
    fn factorial_without_constant_setup_assembles() -> Result<()> {
        let source = "LOADI 5\nSTORE 100\nLOADI 1\nSTORE 200\nloop:\nLOADM 100\nJMPZ end\nLOADM 200\nMUL 100\nSTORE 200\nLOADM 100\nSUB 2\nSTORE 100\nJMP loop\nend:\nHALT";
        let program = assemble(source)?;

        assert_eq!(program.len(), 27);
        assert_eq!(program.as_bytes()[11], 26);

        Ok(())
    }

    #[test]
    fn mem_string_is_eight_binary_digits_per_byte() -> Result<()> {
        let program = assemble("LOADI 5\nHALT")?;

        assert_eq!(program.to_mem_string(), "00000101\n00000101\n00001000\n");

        Ok(())
    }

    #[test]
    fn unknown_mnemonic() -> Result<()> {
        let err = error_of("LOADI 1\n\nFOO 3\nHALT");

        assert_eq!(err.kind(), AsmErrorKind::UnknownMnemonic);
        assert_eq!(err.line_nr(), Some(3));
        assert!(err.to_string().contains("FOO"));

        Ok(())
    }

    #[test]
    fn unresolved_operand() -> Result<()> {
        let err = error_of("JMP nowhere\nHALT");

        assert_eq!(err.kind(), AsmErrorKind::UnresolvedOperand);
        assert_eq!(err.line_nr(), Some(1));

        // hex prefix without digits is not a number
        let err = error_of("LOADI 0x");
        assert_eq!(err.kind(), AsmErrorKind::UnresolvedOperand);

        Ok(())
    }

    #[test]
    fn operand_count() -> Result<()> {
        let err = error_of("HALT\nSTORE");
        assert_eq!(err.kind(), AsmErrorKind::MissingOperand);
        assert_eq!(err.line_nr(), Some(2));

        let err = error_of("PUSH 5");
        assert_eq!(err.kind(), AsmErrorKind::UnexpectedOperand);

        let err = error_of("ADD 1 2");
        assert_eq!(err.kind(), AsmErrorKind::UnexpectedOperand);

        Ok(())
    }

    #[test]
    fn label_errors() -> Result<()> {
        let err = error_of("a:\nNOP\na:\nHALT");
        assert_eq!(err.kind(), AsmErrorKind::DuplicateLabel);
        assert_eq!(err.line_nr(), Some(3));

        assert_eq!(error_of(":").kind(), AsmErrorKind::InvalidLabel);
        assert_eq!(error_of("NOP loop:").kind(), AsmErrorKind::InvalidLabel);
        assert_eq!(error_of("12:").kind(), AsmErrorKind::InvalidLabel);

        // an instruction after the colon is not a label line
        assert_eq!(error_of("loop: NOP").kind(), AsmErrorKind::UnknownMnemonic);

        Ok(())
    }

    #[test]
    fn capacity_exceeded() -> Result<()> {
        let source = "NOP\n".repeat(MEMORY_SIZE);
        assert_eq!(assemble(&source)?.len(), MEMORY_SIZE);

        let source = format!("{}LOADI 1", "NOP\n".repeat(MEMORY_SIZE - 1));
        let err = error_of(&source);
        assert_eq!(
            err.kind(),
            AsmErrorKind::CapacityExceeded {
                capacity: MEMORY_SIZE
            }
        );
        assert_eq!(err.line_nr(), Some(MEMORY_SIZE));

        let mut assembler = Assembler::with_capacity(2);
        assert!(assembler.first_pass("NOP\nNOP\nNOP").is_err());

        Ok(())
    }

    #[test]
    fn assemblers_are_independent() -> Result<()> {
        let mut first = Assembler::new();
        first.first_pass("here:\nHALT")?;
        let mut second = Assembler::new();
        second.first_pass("NOP\nhere:\nHALT")?;

        assert_eq!(first.labels().resolve("here"), Some(0));
        assert_eq!(second.labels().resolve("here"), Some(1));

        Ok(())
    }

    #[test]
    fn assemble_file_writes_nothing_on_error() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("neumann-asm-{}", std::process::id()));
        fs::create_dir_all(&dir)?;
        let input = dir.join("bad.asm");
        let output = dir.join("bad.mem");
        fs::write(&input, "LOADI 1\nBOGUS\n")?;

        let err = assemble_file(&input, &output).unwrap_err();
        assert_eq!(err.kind(), AsmErrorKind::UnknownMnemonic);
        assert!(!output.exists());

        let err = assemble_file(dir.join("missing.asm"), &output).unwrap_err();
        assert_eq!(err.kind(), AsmErrorKind::Io);
        assert_eq!(err.line_nr(), None);

        fs::write(&input, FACTORIAL)?;
        let program = assemble_file(&input, &output)?;
        let mem: StdMem = fs::read_to_string(&output)?.parse().unwrap();
        assert_eq!(&mem.data[..program.len()], program.as_bytes());

        fs::remove_dir_all(&dir)?;

        Ok(())
    }
}
