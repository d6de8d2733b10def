pub mod config;
pub mod debugger;
mod errors;
pub mod machine;
pub mod memory;

use crate::debugger::frontends::{Control, DebuggerFrontend, Frontend};
use crate::debugger::{Debugger, Effect, RunState, StopReason};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

pub use crate::config::{DebuggerConfig, OutputBase};
pub use crate::errors::{DebuggerError, EmulationError, EvalError, LexError, ParseError, RegistryError};
pub use crate::machine::{FlatMachine, Machine, Register, Word};

/// A CPU core the session can drive one instruction at a time.
pub trait Cpu<M: Machine> {
    /// Executes the instruction at PC. Every memory and port access it makes
    /// must be reported through `debugger.check_memory_access` and
    /// `debugger.check_port_access`.
    fn step(&mut self, machine: &mut M, debugger: &mut Debugger) -> Result<(), EmulationError>;
}

/// Asks a running session to stop. Cloneable and usable from any thread;
/// the request is picked up at the next instruction boundary.
#[derive(Debug, Clone, Default)]
pub struct PauseHandle(Arc<AtomicBool>);

impl PauseHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

pub struct Session<M: Machine> {
    pub machine: M,
    pub debugger: Debugger,
    pause: PauseHandle,
    startup_commands: Vec<String>,
}

impl<M: Machine> Session<M> {
    pub fn new(machine: M, config: DebuggerConfig) -> Session<M> {
        Session {
            machine,
            debugger: Debugger::new(&config),
            pause: PauseHandle::default(),
            startup_commands: config.startup_commands,
        }
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.pause.clone()
    }

    pub fn dispatch(&mut self, input: &str) -> Result<Effect, DebuggerError> {
        self.debugger.dispatch(input, &mut self.machine)
    }

    /// Runs the configured startup commands in order, stopping at the first
    /// one that fails.
    pub fn run_startup_commands(&mut self) -> Result<Vec<Effect>, DebuggerError> {
        let commands = std::mem::take(&mut self.startup_commands);
        let mut effects = Vec::with_capacity(commands.len());

        for command in &commands {
            match self.debugger.dispatch(command, &mut self.machine) {
                Ok(effect) => {
                    info!(%command, %effect, "startup command");
                    effects.push(effect);
                }
                Err(error) => {
                    warn!(%command, %error, "startup command failed");
                    return Err(error);
                }
            }
        }

        Ok(effects)
    }

    /// Executes instructions until the debugger stops the run or
    /// `max_instructions` have executed. Does nothing unless running.
    pub fn run<C: Cpu<M>>(&mut self, cpu: &mut C, max_instructions: u64) -> Result<RunState, EmulationError> {
        for _ in 0..max_instructions {
            let pc = self.machine.program_counter();

            self.debugger.check_execute(pc, &mut self.machine);
            if !self.debugger.is_running() {
                break;
            }

            if self.pause.take() {
                self.debugger.stop(StopReason::Manual, Some(pc));
                break;
            }

            if let Err(fault) = cpu.step(&mut self.machine, &mut self.debugger) {
                error!(%fault, "CPU fault");
                self.debugger.stop(StopReason::Error, None);
                return Err(fault);
            }

            // A watchpoint may have fired during the instruction
            if !self.debugger.is_running() {
                break;
            }
        }

        Ok(self.debugger.run_state())
    }

    /// Hands a stopped session to a front end.
    pub fn interact(&mut self, frontend: &mut DebuggerFrontend) -> io::Result<Control> {
        frontend.interact(&mut self.debugger, &mut self.machine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nops;

    impl Cpu<FlatMachine> for Nops {
        fn step(&mut self, machine: &mut FlatMachine, _debugger: &mut Debugger) -> Result<(), EmulationError> {
            machine.registers.pc = machine.registers.pc.wrapping_add(1);
            machine.tstates += 4;
            Ok(())
        }
    }

    #[test]
    fn run_stops_at_instruction_limit() {
        let mut session = Session::new(FlatMachine::new(), DebuggerConfig::default());

        assert_eq!(session.run(&mut Nops, 10), Ok(RunState::Running));
        assert_eq!(session.machine.registers.pc, 10);
        assert_eq!(session.machine.tstates, 40);
    }

    #[test]
    fn pause_request_stops_at_the_next_boundary() {
        let mut session = Session::new(FlatMachine::new(), DebuggerConfig::default());
        let pause = session.pause_handle();

        std::thread::spawn(move || pause.request()).join().unwrap();

        assert_eq!(
            session.run(&mut Nops, 10),
            Ok(RunState::Stopped(StopReason::Manual))
        );
        assert_eq!(session.machine.registers.pc, 0);
        assert!(!session.pause_handle().is_requested());
    }

    #[test]
    fn startup_commands_stop_at_first_failure() {
        let config = DebuggerConfig {
            startup_commands: vec![
                "break 0x8000".to_string(),
                "delete 5".to_string(),
                "break 0x9000".to_string(),
            ],
            ..DebuggerConfig::default()
        };
        let mut session = Session::new(FlatMachine::new(), config);

        assert_eq!(
            session.run_startup_commands(),
            Err(RegistryError::UnknownId(debugger::breakpoint::BreakpointId(5)).into())
        );
        assert_eq!(session.debugger.registry().len(), 1);
    }
}
