use crate::debugger::breakpoint::{BreakpointId, BreakpointKind, Location};
use crate::machine::{Register, Word};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognised input '{text}' at column {}", .position + 1)]
pub struct LexError {
    pub position: usize,
    pub text: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at column {}", .position + 1)]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(position: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            position,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("register {0} is not available on this machine")]
    UnknownRegister(Register),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no breakpoint with id {0}")]
    UnknownId(BreakpointId),
    #[error("address 0x{0:X} is outside the 16-bit address space")]
    InvalidAddress(Word),
    #[error("port 0x{0:X} is outside the 16-bit port space")]
    InvalidPort(Word),
    #[error("memory page {0} does not exist")]
    InvalidPage(Word),
    #[error("address range 0x{start:04X}-0x{end:04X} is empty")]
    InvalidRange { start: u16, end: u16 },
    #[error("a {kind} breakpoint cannot be placed on {location}")]
    LocationMismatch {
        kind: BreakpointKind,
        location: Location,
    },
    #[error("no breakpoint at address 0x{0:04X}")]
    NothingAtAddress(u16),
}

/// Everything a debugger command can fail with. None of these ever reach the
/// CPU loop: they are returned to whoever issued the command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebuggerError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("unsupported output base {0}, expected 10 or 16")]
    UnsupportedBase(Word),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmulationError {
    #[error("${address:04X}: Unknown op_code 0x{op_code:02X}")]
    InstructionDecoding { address: u16, op_code: u8 },
    #[error("${address:04X}: Error while executing instruction: {message}")]
    InstructionExecution { address: u16, message: String },
}
