use std::fs;
use std::path::Path;

use color_eyre::eyre::{eyre, Result, WrapErr};

pub mod parse;

pub type Byte = u8; // 1 byte
pub type Word = u16; // 2 bytes

/// Number of cells in the standard memory image. Addresses are a single byte.
pub const MEMORY_SIZE: usize = 256;

/// Default memory
pub type StdMem = Memory<MEMORY_SIZE>;

/// Emulates memory for use with the CPU. Code, data and the stack all live here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Memory<const S: usize> {
    /// The actual data of the memory
    pub data: [Byte; S],
}

impl<const S: usize> Default for Memory<S> {
    /// Initializes the memory
    fn default() -> Self {
        Memory { data: [0; S] }
    }
}

impl<const S: usize> Memory<S> {
    /// Number of addressable cells
    pub const SIZE: usize = S;

    /// Creates a memory image with `bytes` placed at address zero.
    ///
    /// Returns `None` if the bytes do not fit.
    pub fn from_bytes(bytes: &[Byte]) -> Option<Self> {
        if bytes.len() > S {
            return None;
        }

        let mut memory = Self::default();
        memory.data[..bytes.len()].copy_from_slice(bytes);
        Some(memory)
    }

    /// Loads a memory file from disk. See [`parse`] for the accepted format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read memory file `{}`", path.display()))?;

        parse::Parser::new(&data, Self::default())
            .parse()
            .map_err(|errors| {
                let messages: Vec<String> = errors.iter().map(|err| err.to_string()).collect();
                eyre!(
                    "Failed to load memory file `{}`:\n{}",
                    path.display(),
                    messages.join("\n")
                )
            })
    }

    /// Checks whether `position` is a valid address
    pub fn contains(&self, position: Word) -> bool {
        (position as usize) < S
    }

    /// Reads a byte from the memory, `None` if the address is out of range
    pub fn get(&self, position: Word) -> Option<Byte> {
        self.data.get(position as usize).copied()
    }

    /// Reads a byte from the memory
    pub fn read_byte(&self, position: Word) -> Byte {
        self.data[position as usize]
    }

    /// Writes a byte to the memory
    pub fn write_byte(&mut self, position: Word, value: Byte) {
        self.data[position as usize] = value;
    }

    /// Writes an array of bytes to the memory
    pub fn write_array(&mut self, position: Word, data: &[Byte]) {
        self.data[position as usize..position as usize + data.len()].copy_from_slice(data);
    }

    /// Rows of 16 bytes in hex, all-zero rows left out
    pub fn hex_rows(&self) -> Vec<String> {
        self.data
            .chunks(16)
            .enumerate()
            .filter(|(_, chunk)| chunk.iter().any(|&byte| byte != 0))
            .map(|(row, chunk)| {
                let bytes: String = chunk.iter().map(|byte| format!(" {:02X}", byte)).collect();
                format!("0x{:02X}:{}", row * 16, bytes)
            })
            .collect()
    }

    /// Logs every non-empty row of 16 bytes
    pub fn dump(&self) {
        for row in self.hex_rows() {
            log::info!("{}", row);
        }
    }
}

/// Renders bytes in the memory file format: one byte per line as eight
/// binary digits, most significant bit first.
pub fn to_binary_lines(bytes: &[Byte]) -> String {
    bytes.iter().map(|byte| format!("{:08b}\n", byte)).collect()
}

/// Writes a block of instructions directly into the memory
#[macro_export]
macro_rules! write_instructions {
    ( $mem:ident : $pos:expr => $( $byte:expr ),+ ) => {
        $mem.write_array($pos, &[
            $(
                $byte as $crate::memory::Byte,
            )+
        ]);
    };
}
