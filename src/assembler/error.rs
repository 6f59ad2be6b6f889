use std::borrow::Cow;
use std::error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmErrorKind {
    UnknownMnemonic,
    UnresolvedOperand,
    MissingOperand,
    UnexpectedOperand,
    DuplicateLabel,
    InvalidLabel,
    CapacityExceeded { capacity: usize },
    Io,
}

impl fmt::Display for AsmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmErrorKind::UnknownMnemonic => f.write_str("unknown instruction"),
            AsmErrorKind::UnresolvedOperand => {
                f.write_str("operand is neither a number nor a known label")
            }
            AsmErrorKind::MissingOperand => f.write_str("missing operand"),
            AsmErrorKind::UnexpectedOperand => f.write_str("unexpected operand"),
            AsmErrorKind::DuplicateLabel => f.write_str("label is already defined"),
            AsmErrorKind::InvalidLabel => f.write_str("invalid label"),
            AsmErrorKind::CapacityExceeded { capacity } => {
                write!(f, "program does not fit into {} bytes", capacity)
            }
            AsmErrorKind::Io => f.write_str("i/o error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmError {
    kind: AsmErrorKind,
    context: Option<Cow<'static, str>>,
    line_nr: Option<usize>,
}

impl AsmError {
    pub(crate) fn new<C, S>(kind: AsmErrorKind, context: C, line_nr: usize) -> Self
    where
        C: Into<Option<S>>,
        S: Into<Cow<'static, str>>,
    {
        Self {
            kind,
            context: context.into().map(|inner| inner.into()),
            line_nr: Some(line_nr),
        }
    }

    pub(crate) fn io(context: String) -> Self {
        Self {
            kind: AsmErrorKind::Io,
            context: Some(context.into()),
            line_nr: None,
        }
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.kind
    }

    /// Source line the error was found on, `None` for i/o errors
    pub fn line_nr(&self) -> Option<usize> {
        self.line_nr
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line_nr, &self.context) {
            (Some(line_nr), Some(context)) => {
                write!(f, "error [ln: {}]: {} - {}", line_nr, self.kind, context)
            }
            (Some(line_nr), None) => write!(f, "error [ln: {}]: {}", line_nr, self.kind),
            (None, Some(context)) => write!(f, "error: {} - {}", self.kind, context),
            (None, None) => write!(f, "error: {}", self.kind),
        }
    }
}

impl error::Error for AsmError {}

pub type Result<T, E = AsmError> = std::result::Result<T, E>;
