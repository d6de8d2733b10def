use crate::errors::DebuggerError;
use crate::machine::Word;
use std::fmt;

pub const DEFAULT_DISASSEMBLE_LINES: usize = 8;

/// Base used when printing values back to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputBase {
    #[default]
    Hexadecimal,
    Decimal,
}

impl OutputBase {
    pub fn from_radix(radix: Word) -> Result<OutputBase, DebuggerError> {
        match radix {
            16 => Ok(OutputBase::Hexadecimal),
            10 => Ok(OutputBase::Decimal),
            other => Err(DebuggerError::UnsupportedBase(other)),
        }
    }

    pub fn radix(self) -> Word {
        match self {
            OutputBase::Hexadecimal => 16,
            OutputBase::Decimal => 10,
        }
    }

    pub fn format(self, value: Word) -> String {
        match self {
            OutputBase::Hexadecimal => format!("0x{:X}", value),
            OutputBase::Decimal => value.to_string(),
        }
    }
}

impl fmt::Display for OutputBase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.radix())
    }
}

/// Debugger settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerConfig {
    pub output_base: OutputBase,
    /// Instructions shown by a bare `disassemble`
    pub disassemble_lines: usize,
    /// Commands run once before the first prompt, in order
    pub startup_commands: Vec<String>,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            output_base: OutputBase::default(),
            disassemble_lines: DEFAULT_DISASSEMBLE_LINES,
            startup_commands: Vec::new(),
        }
    }
}
