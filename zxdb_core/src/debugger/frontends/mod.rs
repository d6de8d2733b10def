use crate::debugger::frontends::script::ScriptDebugger;
use crate::debugger::frontends::terminal::TerminalDebugger;
use crate::debugger::{Debugger, RunState, StopReason};
use crate::machine::Machine;
use enum_dispatch::enum_dispatch;
use std::io::{self, Write};

pub mod script;
pub mod terminal;

/// What the session should do once a front end hands control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Resume,
    Quit,
}

#[enum_dispatch]
pub trait Frontend {
    /// Takes commands while the debugger is stopped. Returns once a command
    /// resumes the machine, or the user is done.
    fn interact(&mut self, debugger: &mut Debugger, machine: &mut dyn Machine) -> io::Result<Control>;
}

#[enum_dispatch(Frontend)]
pub enum DebuggerFrontend {
    TerminalDebugger,
    ScriptDebugger,
}

/// Prints why the run stopped, followed by any breakpoint conditions that
/// failed on the way.
pub(crate) fn report_stop(
    output: &mut dyn Write,
    debugger: &mut Debugger,
    machine: &dyn Machine,
) -> io::Result<()> {
    for error in debugger.take_condition_errors() {
        writeln!(output, "warning: {}", error)?;
    }

    let pc = machine.program_counter();
    match debugger.run_state() {
        RunState::Stopped(StopReason::Breakpoint(id)) => {
            writeln!(output, "Breakpoint {} hit at 0x{:04X}", id, pc)
        }
        RunState::Stopped(StopReason::Step) => writeln!(output, "Stepped to 0x{:04X}", pc),
        RunState::Stopped(StopReason::Manual) => writeln!(output, "Stopped at 0x{:04X}", pc),
        RunState::Stopped(StopReason::Error) => {
            writeln!(output, "Stopped at 0x{:04X} after a CPU error", pc)
        }
        RunState::Running => Ok(()),
    }
}

/// Breakpoint listing, one per line under a header.
pub(crate) fn list_breakpoints(output: &mut dyn Write, debugger: &Debugger) -> io::Result<()> {
    if debugger.registry().is_empty() {
        return writeln!(output, "No breakpoints.");
    }

    writeln!(output, " ID  Type       Location      Life")?;
    for breakpoint in debugger.registry().all() {
        writeln!(output, "{}", breakpoint)?;
    }
    Ok(())
}
