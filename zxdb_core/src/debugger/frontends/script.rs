use crate::debugger::frontends::{list_breakpoints, report_stop, Control, Frontend};
use crate::debugger::Debugger;
use crate::machine::Machine;
use std::io::{self, Write};
use tracing::warn;

/// Feeds a fixed list of commands to the debugger, one line at a time.
/// Blank lines and lines starting with `#` are skipped. A command that
/// resumes the machine hands control back; the next call carries on with
/// the following line.
pub struct ScriptDebugger {
    lines: Vec<String>,
    next_line: usize,
    output: Box<dyn Write>,
}

impl ScriptDebugger {
    pub fn new(script: &str, output: Box<dyn Write>) -> ScriptDebugger {
        ScriptDebugger {
            lines: script.lines().map(str::to_string).collect(),
            next_line: 0,
            output,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.next_line >= self.lines.len()
    }
}

impl Frontend for ScriptDebugger {
    fn interact(&mut self, debugger: &mut Debugger, machine: &mut dyn Machine) -> io::Result<Control> {
        report_stop(&mut self.output, debugger, machine)?;

        while let Some(line) = self.lines.get(self.next_line) {
            let number = self.next_line + 1;
            self.next_line += 1;

            let command = line.trim();
            if command.is_empty() || command.starts_with('#') {
                continue;
            }

            match command {
                "list" => list_breakpoints(&mut self.output, debugger)?,
                "quit" => return Ok(Control::Quit),
                _ => match debugger.dispatch(command, machine) {
                    Ok(effect) => {
                        writeln!(self.output, "{}", effect)?;
                        if debugger.is_running() {
                            return Ok(Control::Resume);
                        }
                    }
                    Err(error) => {
                        warn!(line = number, %error, "script command failed");
                        writeln!(self.output, "line {}: error: {}", number, error)?;
                    }
                },
            }
        }

        Ok(Control::Quit)
    }
}
