//! Loader for memory files.
//!
//! Each non-empty line holds exactly one byte and is written into the next
//! memory cell, starting at address zero:
//!
//! ```text
//! 00000101    # binary, only `0` and `1` digits
//! 0x1e        # hexadecimal
//! 200         # decimal
//! ```
//!
//! A line made of `0`/`1` digits is always read as binary, so `10` is two.

use std::borrow::Cow;
use std::error;
use std::str::FromStr;
use std::{fmt, str::Lines};

use super::{Byte, Memory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    InvalidAddress { address: usize },
    InvalidNumber { radix: u32 },
    InvalidByte { value: u64 },
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::InvalidAddress { address } => {
                write!(f, "memory has no address `0x{:x}`", address)
            }
            ParseErrorKind::InvalidNumber { radix } => {
                write!(f, "failed to parse number with radix `{}`", radix)
            }
            ParseErrorKind::InvalidByte { value } => {
                write!(f, "value `{}` does not fit into a byte", value)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    kind: ParseErrorKind,
    context: Option<Cow<'static, str>>,
    line_nr: usize,
}

impl ParseError {
    fn new<C, S>(kind: ParseErrorKind, context: C, line_nr: usize) -> Self
    where
        C: Into<Option<S>>,
        S: Into<Cow<'static, str>>,
    {
        Self {
            kind,
            context: context.into().map(|inner| inner.into()),
            line_nr,
        }
    }

    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }

    pub fn line_nr(&self) -> usize {
        self.line_nr
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(
                f,
                "error [ln: {}]: {} - {}",
                self.line_nr, self.kind, context
            )
        } else {
            write!(f, "error [ln: {}]: {}", self.line_nr, self.kind)
        }
    }
}

impl error::Error for ParseError {}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;

macro_rules! parse_number {
    ( $ty:ty: $s:expr ) => {{
        let line: &str = $s;

        let (radix, offset) = match line.as_bytes() {
            digits if digits.iter().all(|b| matches!(b, b'0' | b'1')) => (2, 0),
            [b'0', b'x', ..] | [b'0', b'X', ..] => (16, 2),
            _ => (10, 0),
        };

        <$ty>::from_str_radix(&line[offset..], radix).map_err(|_| radix)
    }};
}

#[derive(Debug, Clone)]
pub struct Parser<'a, const S: usize> {
    lines: Lines<'a>,
    line_nr: usize,
    position: usize,
    memory: Memory<S>,
}

impl<'a, const S: usize> Parser<'a, S> {
    /// Creates a new parser for `data` which will try to populate `memory`.
    pub fn new(data: &'a str, memory: Memory<S>) -> Self {
        Self {
            lines: data.lines(),
            line_nr: 0,
            position: 0,
            memory,
        }
    }

    /// Consumes `self` and tries to parse all `self.data` into memory.
    ///
    /// # Errors
    ///
    /// All errors which may occur are collected and returned at the end.
    pub fn parse(mut self) -> Result<Memory<S>, Vec<ParseError>> {
        let mut errors = Vec::new();

        while let Some(res) = self.parse_next_line() {
            if let Err(err) = res {
                log::error!("{}", err);
                errors.push(err);
            }
        }

        if errors.is_empty() {
            log::debug!("Loaded {} bytes into memory", self.position);
            Ok(self.memory)
        } else {
            Err(errors)
        }
    }

    fn parse_next_line(&mut self) -> Option<Result<()>> {
        let line = self.lines.next()?.trim();
        self.line_nr += 1;

        if line.is_empty() || line.starts_with('#') {
            // Comment or empty line; skip
            return Some(Ok(()));
        }

        // Trailing comments are allowed after the value
        let line = line.split('#').next().unwrap_or_default().trim();

        Some(self.parse_byte(line))
    }

    /// Tries to parse `line` as a single byte and writes it to the next cell.
    ///
    /// # Examples
    ///
    /// - `00101101`
    /// - `0x2d`
    /// - `45`
    fn parse_byte(&mut self, line: &str) -> Result<()> {
        let value = parse_number!(u64: line).map_err(|radix| {
            ParseError::new(
                ParseErrorKind::InvalidNumber { radix },
                format!("`{}`", line),
                self.line_nr,
            )
        })?;

        if value > Byte::MAX as u64 {
            return Err(ParseError::new(
                ParseErrorKind::InvalidByte { value },
                format!("`{}`", line),
                self.line_nr,
            ));
        }

        self.write_byte(value as Byte)
    }

    /// Writes `byte` into the next free cell.
    ///
    /// # Errors
    ///
    /// This will return an error if the memory is already full.
    fn write_byte(&mut self, byte: Byte) -> Result<()> {
        if self.position >= S {
            return Err(ParseError::new(
                ParseErrorKind::InvalidAddress {
                    address: self.position,
                },
                "memory file is larger than the memory",
                self.line_nr,
            ));
        }

        self.memory.data[self.position] = byte;
        self.position += 1;
        Ok(())
    }
}

impl<const S: usize> FromStr for Memory<S> {
    type Err = Vec<ParseError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parser::new(s, Self::default()).parse()
    }
}

#[cfg(test)]
mod tests {
    use crate::memory::{to_binary_lines, Memory, StdMem};
    use std::str::FromStr;

    use super::*;
    use color_eyre::Result;

    #[test]
    fn parse_binary_lines() -> Result<()> {
        let data = r#"
            00000101
            00011110
            00001000
        "#;

        let mem = StdMem::from_str(data).unwrap();

        assert_eq!(mem.read_byte(0), 5);
        assert_eq!(mem.read_byte(1), 30);
        assert_eq!(mem.read_byte(2), 8);
        assert_eq!(mem.read_byte(3), 0);

        Ok(())
    }

    #[test]
    fn parse_mixed_radix() -> Result<()> {
        let data = r#"
            # LOADI 30
            0x05
            30
            10      # only 0 and 1 digits: binary
            0XfF
        "#;

        let mem = StdMem::from_str(data).unwrap();

        assert_eq!(mem.read_byte(0), 5);
        assert_eq!(mem.read_byte(1), 30);
        assert_eq!(mem.read_byte(2), 2);
        assert_eq!(mem.read_byte(3), 255);

        Ok(())
    }

    #[test]
    fn parse_written_image() -> Result<()> {
        let bytes = [5, 30, 2, 200, 8];
        let mem = StdMem::from_str(&to_binary_lines(&bytes)).unwrap();

        assert_eq!(&mem.data[..5], &bytes);

        Ok(())
    }

    #[test]
    fn parse_collects_all_errors() -> Result<()> {
        let data = "0x05\n300\nzz\n8\n";

        let errors = StdMem::from_str(data).unwrap_err();

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line_nr(), 2);
        assert_eq!(errors[0].kind(), ParseErrorKind::InvalidByte { value: 300 });
        assert_eq!(errors[1].line_nr(), 3);
        assert_eq!(errors[1].kind(), ParseErrorKind::InvalidNumber { radix: 10 });

        Ok(())
    }

    #[test]
    fn parse_oversized_value_names_the_line() -> Result<()> {
        let errors = StdMem::from_str("0x05\n0x1ff\n").unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ParseErrorKind::InvalidByte { value: 511 });
        assert_eq!(
            errors[0].to_string(),
            "error [ln: 2]: value `511` does not fit into a byte - `0x1ff`"
        );

        Ok(())
    }

    #[test]
    fn parse_too_large_image() -> Result<()> {
        let errors = Memory::<2>::from_str("1\n1\n1\n").unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].kind(),
            ParseErrorKind::InvalidAddress { address: 2 }
        );

        Ok(())
    }
}
