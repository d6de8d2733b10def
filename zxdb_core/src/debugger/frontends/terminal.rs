use crate::debugger::frontends::{list_breakpoints, report_stop, Control, Frontend};
use crate::debugger::Debugger;
use crate::machine::Machine;
use std::io::{self, BufRead, Write};

/// Interactive console over any line reader and writer.
pub struct TerminalDebugger {
    input: Box<dyn BufRead>,
    output: Box<dyn Write>,
    last_command: Option<String>,
}

impl TerminalDebugger {
    pub fn new(input: Box<dyn BufRead>, output: Box<dyn Write>) -> TerminalDebugger {
        TerminalDebugger {
            input,
            output,
            last_command: None,
        }
    }

    pub fn stdio() -> TerminalDebugger {
        TerminalDebugger::new(Box::new(io::BufReader::new(io::stdin())), Box::new(io::stdout()))
    }

    fn show_usage(&mut self) -> io::Result<()> {
        let out = &mut self.output;

        writeln!(out)?;
        writeln!(out, "Usage:")?;
        writeln!(out, "------------------------------------------------------------------------")?;
        writeln!(out, "break [read|write] [page P] [ADDR [, END]] [if E]   break on execute/access")?;
        writeln!(out, "break port read|write PORT [if E]                  port watchpoint")?;
        writeln!(out, "break time T [if E]                                stop when tstates passes T")?;
        writeln!(out, "tbreak ...                                         as break, deleted once hit")?;
        writeln!(out, "clear [ADDR]                                       delete breakpoints at ADDR")?;
        writeln!(out, "delete [ID]                                        delete one or all breakpoints")?;
        writeln!(out, "condition ID [E]                                   set or remove a condition")?;
        writeln!(out, "ignore ID N                                        skip the next N hits")?;
        writeln!(out, "continue | step | next | finish                    resume execution")?;
        writeln!(out, "disassemble [ADDR]                                 disassemble from ADDR")?;
        writeln!(out, "print E                                            evaluate an expression")?;
        writeln!(out, "set REG E | set ADDR E                             write a register or memory")?;
        writeln!(out, "out PORT E                                         write to a port")?;
        writeln!(out, "base 10|16                                         output base for print")?;
        writeln!(out, "list                                               show all breakpoints")?;
        writeln!(out, "help | quit")?;
        writeln!(out, "An empty line repeats the last command.")?;
        writeln!(out)
    }
}

impl Frontend for TerminalDebugger {
    fn interact(&mut self, debugger: &mut Debugger, machine: &mut dyn Machine) -> io::Result<Control> {
        report_stop(&mut self.output, debugger, machine)?;

        loop {
            write!(self.output, "0x{:04X} -> ", machine.program_counter())?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                return Ok(Control::Quit);
            }

            let line = match line.trim() {
                "" => match self.last_command.clone() {
                    Some(last) => last,
                    None => continue,
                },
                trimmed => trimmed.to_string(),
            };

            self.last_command = Some(line.clone());

            match line.as_str() {
                "help" => self.show_usage()?,
                "list" => list_breakpoints(&mut self.output, debugger)?,
                "quit" => return Ok(Control::Quit),
                command => match debugger.dispatch(command, machine) {
                    Ok(effect) => {
                        writeln!(self.output, "{}", effect)?;
                        if debugger.is_running() {
                            return Ok(Control::Resume);
                        }
                    }
                    Err(error) => writeln!(self.output, "error: {}", error)?,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::StopReason;
    use crate::machine::FlatMachine;
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    fn console(script: &str) -> (TerminalDebugger, SharedBuffer) {
        let output = SharedBuffer::default();
        let terminal = TerminalDebugger::new(
            Box::new(Cursor::new(script.as_bytes().to_vec())),
            Box::new(output.clone()),
        );
        (terminal, output)
    }

    #[test]
    fn prompt_shows_pc_and_effects_are_printed() {
        let (mut terminal, output) = console("break 0x8000\nlist\nquit\n");
        let mut debugger = Debugger::default();
        let mut machine = FlatMachine::new();
        machine.registers.pc = 0x4000;
        debugger.stop(StopReason::Manual, Some(0x4000));

        assert_eq!(terminal.interact(&mut debugger, &mut machine).unwrap(), Control::Quit);

        let text = output.text();
        assert!(text.starts_with("Stopped at 0x4000\n0x4000 -> "), "{}", text);
        assert!(text.contains("Breakpoint 1: execute 0x8000"));
        assert!(text.contains("  1  execute    0x8000"));
    }

    #[test]
    fn errors_are_reported_and_the_console_continues() {
        let (mut terminal, output) = console("break 0x10000\nprint 1 +\nprint 2\n");
        let mut debugger = Debugger::default();
        let mut machine = FlatMachine::new();
        debugger.stop(StopReason::Manual, Some(0));

        assert_eq!(terminal.interact(&mut debugger, &mut machine).unwrap(), Control::Quit);

        let text = output.text();
        assert!(text.contains("error: address 0x10000 is outside the 16-bit address space"));
        assert!(text.contains("error: expected an expression, found end of input at column 10"));
        assert!(text.contains("0x2\n"));
        assert!(debugger.registry().is_empty());
    }

    #[test]
    fn resuming_hands_control_back() {
        let (mut terminal, _output) = console("step\n\n");
        let mut debugger = Debugger::default();
        let mut machine = FlatMachine::new();
        debugger.stop(StopReason::Manual, Some(0));

        assert_eq!(terminal.interact(&mut debugger, &mut machine).unwrap(), Control::Resume);
        assert!(debugger.is_running());

        // an empty line repeats "step"
        debugger.stop(StopReason::Step, Some(1));
        assert_eq!(terminal.interact(&mut debugger, &mut machine).unwrap(), Control::Resume);
    }
}
