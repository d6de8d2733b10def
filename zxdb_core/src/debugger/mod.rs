use crate::config::{DebuggerConfig, OutputBase};
use crate::errors::{DebuggerError, EvalError, RegistryError};
use crate::machine::{Machine, Register, Word};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info, warn};

pub mod breakpoint;
pub mod command;
pub mod expression;
pub mod frontends;
pub mod lexer;
pub mod parser;

use self::breakpoint::{
    Breakpoint, BreakpointId, BreakpointKind, BreakpointLife, Location, Registry,
};
use self::command::{BreakpointTarget, Command};
use self::expression::{BinaryOperator, Expression};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Breakpoint(BreakpointId),
    Manual,
    Step,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Idle,
    Checking,
    Halted(BreakpointId),
    SteppingOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRequest {
    Single,
    /// Stop on reaching `return_pc`, or once the stack is back at `sp`.
    Over { return_pc: u16, sp: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    Continue,
    Step,
    Next,
    Finish,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassembledLine {
    pub address: u16,
    pub text: String,
}

impl fmt::Display for DisassembledLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:04X}  {}", self.address, self.text)
    }
}

/// What a successfully dispatched command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    BreakpointAdded(Breakpoint),
    BreakpointsRemoved(usize),
    ConditionSet(BreakpointId, Option<Expression>),
    IgnoreCountSet(BreakpointId, u32),
    BaseSet(OutputBase),
    Disassembly(Vec<DisassembledLine>),
    Value(Word, OutputBase),
    RegisterSet(Register, Word),
    MemorySet { address: u16, byte: u8 },
    PortWritten { port: u16, byte: u8 },
    Resumed(ResumeMode),
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Effect::BreakpointAdded(breakpoint) => write!(
                f,
                "Breakpoint {}: {} {}",
                breakpoint.id, breakpoint.kind, breakpoint.location
            ),
            Effect::BreakpointsRemoved(1) => f.write_str("Deleted 1 breakpoint"),
            Effect::BreakpointsRemoved(count) => write!(f, "Deleted {} breakpoints", count),
            Effect::ConditionSet(id, Some(condition)) => {
                write!(f, "Breakpoint {} now stops if {}", id, condition)
            }
            Effect::ConditionSet(id, None) => write!(f, "Breakpoint {} is now unconditional", id),
            Effect::IgnoreCountSet(id, count) => {
                write!(f, "Will ignore next {} crossings of breakpoint {}", count, id)
            }
            Effect::BaseSet(base) => write!(f, "Output base set to {}", base),
            Effect::Disassembly(lines) => {
                for (index, line) in lines.iter().enumerate() {
                    if index > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", line)?;
                }
                Ok(())
            }
            Effect::Value(value, base) => f.write_str(&base.format(*value)),
            Effect::RegisterSet(register, value) => write!(f, "{} = 0x{:X}", register, value),
            Effect::MemorySet { address, byte } => write!(f, "[0x{:04X}] = 0x{:02X}", address, byte),
            Effect::PortWritten { port, byte } => write!(f, "port[0x{:04X}] <- 0x{:02X}", port, byte),
            Effect::Resumed(mode) => write!(f, "Resuming ({:?})", mode),
        }
    }
}

/// A condition that could not be evaluated while the hook was checking it.
/// The breakpoint was treated as triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionError {
    pub id: BreakpointId,
    pub error: EvalError,
}

impl fmt::Display for ConditionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "breakpoint {}: condition failed ({}), stopping anyway",
            self.id, self.error
        )
    }
}

/// Breakpoints, run-state and the checks the instruction loop calls into.
#[derive(Debug)]
pub struct Debugger {
    registry: Registry,
    run_state: RunState,
    hook: HookState,
    step: Option<StepRequest>,

    output_base: OutputBase,
    disassemble_lines: usize,

    // Reused for candidate ids so the hook does not allocate per check
    candidates: Vec<BreakpointId>,
    condition_errors: Vec<ConditionError>,

    // Cycle count at the previous boundary; none before the first one
    last_cycles: Option<u64>,
    // PC the debugger last stopped at, if it stopped on an instruction boundary
    stopped_boundary: Option<u16>,
    // Set on resume, cleared by the first boundary check after it
    resume_pending: bool,
}

impl Default for Debugger {
    fn default() -> Debugger {
        Debugger::new(&DebuggerConfig::default())
    }
}

impl Debugger {
    pub fn new(config: &DebuggerConfig) -> Debugger {
        Debugger {
            registry: Registry::new(),
            run_state: RunState::Running,
            hook: HookState::Idle,
            step: None,
            output_base: config.output_base,
            disassemble_lines: config.disassemble_lines,
            candidates: Vec::with_capacity(8),
            condition_errors: Vec::new(),
            last_cycles: None,
            stopped_boundary: None,
            resume_pending: false,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    pub fn hook_state(&self) -> HookState {
        self.hook
    }

    pub fn step_request(&self) -> Option<StepRequest> {
        self.step
    }

    pub fn output_base(&self) -> OutputBase {
        self.output_base
    }

    /// Hands over the condition failures seen by the hook since the last call.
    pub fn take_condition_errors(&mut self) -> Vec<ConditionError> {
        std::mem::take(&mut self.condition_errors)
    }

    /// Parses and executes one command. On error nothing has been changed.
    pub fn dispatch<M: Machine + ?Sized>(
        &mut self,
        input: &str,
        machine: &mut M,
    ) -> Result<Effect, DebuggerError> {
        let command = Command::parse(input)?;
        debug!(?command, "dispatching");
        self.execute(command, machine)
    }

    pub fn execute<M: Machine + ?Sized>(
        &mut self,
        command: Command,
        machine: &mut M,
    ) -> Result<Effect, DebuggerError> {
        let effect = match command {
            Command::Base(radix) => {
                self.output_base = OutputBase::from_radix(radix.evaluate(machine)?)?;
                Effect::BaseSet(self.output_base)
            }
            Command::Breakpoint {
                life,
                target,
                condition,
            } => self.add_breakpoint(life, target, condition, machine)?,
            Command::Clear(address) => {
                let address = match address {
                    Some(address) => evaluate_address(&address, machine)?,
                    None => machine.program_counter(),
                };
                match self.registry.clear_address(address) {
                    0 => return Err(RegistryError::NothingAtAddress(address).into()),
                    count => Effect::BreakpointsRemoved(count),
                }
            }
            Command::Condition(id, condition) => {
                if !self.registry.set_condition(id, condition.clone()) {
                    return Err(RegistryError::UnknownId(id).into());
                }
                Effect::ConditionSet(id, condition)
            }
            Command::Continue => self.resume(ResumeMode::Continue, None, machine),
            Command::Delete(Some(id)) => {
                if !self.registry.remove(id) {
                    return Err(RegistryError::UnknownId(id).into());
                }
                Effect::BreakpointsRemoved(1)
            }
            Command::Delete(None) => Effect::BreakpointsRemoved(self.registry.remove_all()),
            Command::Disassemble(address) => {
                let address = match address {
                    Some(address) => evaluate_address(&address, machine)?,
                    None => machine.program_counter(),
                };
                Effect::Disassembly(self.disassemble(address, machine))
            }
            Command::Finish => self.finish(machine)?,
            Command::Ignore(id, count) => {
                let count = count.evaluate(machine)?;
                if !self.registry.set_ignore_count(id, count) {
                    return Err(RegistryError::UnknownId(id).into());
                }
                Effect::IgnoreCountSet(id, count)
            }
            Command::Next => self.next(machine),
            Command::Out(port, value) => {
                let port = evaluate_port(&port, machine)?;
                let byte = value.evaluate(machine)? as u8;
                machine.write_port(port, byte);
                Effect::PortWritten { port, byte }
            }
            Command::Print(expression) => Effect::Value(expression.evaluate(machine)?, self.output_base),
            Command::SetRegister(register, value) => {
                let value = value.evaluate(machine)?;
                if !machine.write_register(register, value) {
                    return Err(EvalError::UnknownRegister(register).into());
                }
                Effect::RegisterSet(register, value)
            }
            Command::SetMemory(address, value) => {
                let address = evaluate_address(&address, machine)?;
                let byte = value.evaluate(machine)? as u8;
                machine.write_memory(address, byte);
                Effect::MemorySet { address, byte }
            }
            Command::Step => self.resume(ResumeMode::Step, Some(StepRequest::Single), machine),
        };

        Ok(effect)
    }

    fn add_breakpoint<M: Machine + ?Sized>(
        &mut self,
        life: BreakpointLife,
        target: BreakpointTarget,
        condition: Option<Expression>,
        machine: &mut M,
    ) -> Result<Effect, DebuggerError> {
        let (kind, location) = match target {
            BreakpointTarget::Address {
                kind,
                page,
                start,
                end,
            } => {
                let page = match page {
                    Some(page) => {
                        let value = page.evaluate(machine)?;
                        let page = u8::try_from(value).map_err(|_| RegistryError::InvalidPage(value))?;
                        Some(page)
                    }
                    None => None,
                };
                let start = match start {
                    Some(start) => evaluate_address(&start, machine)?,
                    None => machine.program_counter(),
                };
                let location = match end {
                    Some(end) => Location::AddressRange {
                        start,
                        end: evaluate_address(&end, machine)?,
                    },
                    None => Location::Address {
                        address: start,
                        page,
                    },
                };
                (kind, location)
            }
            BreakpointTarget::Port { write, port } => (
                BreakpointKind::port(write),
                Location::Port(evaluate_port(&port, machine)?),
            ),
            BreakpointTarget::Time(tstates) => (
                BreakpointKind::Time,
                Location::Time(tstates.evaluate(machine)? as u64),
            ),
        };

        let id = self.registry.add(kind, location, life)?;
        self.registry.set_condition(id, condition);

        let breakpoint = self
            .registry
            .get(id)
            .cloned()
            .ok_or(RegistryError::UnknownId(id))?;
        Ok(Effect::BreakpointAdded(breakpoint))
    }

    fn disassemble<M: Machine + ?Sized>(&self, start: u16, machine: &mut M) -> Vec<DisassembledLine> {
        let mut address = start;
        let mut lines = Vec::with_capacity(self.disassemble_lines);

        for _ in 0..self.disassemble_lines {
            let disassembly = machine.disassemble(address);
            lines.push(DisassembledLine {
                address,
                text: disassembly.text,
            });
            address = address.wrapping_add(disassembly.length.max(1));
        }

        lines
    }

    fn next<M: Machine + ?Sized>(&mut self, machine: &mut M) -> Effect {
        let sp = match machine.read_register(Register::Sp) {
            Some(sp) => sp as u16,
            None => return self.resume(ResumeMode::Step, Some(StepRequest::Single), machine),
        };

        let pc = machine.program_counter();
        let length = machine.disassemble(pc).length.max(1);
        let request = StepRequest::Over {
            return_pc: pc.wrapping_add(length),
            sp,
        };

        self.resume(ResumeMode::Next, Some(request), machine)
    }

    /// Run until the current routine returns: a one-shot breakpoint on the
    /// return address, only taken once the stack has unwound past it.
    fn finish<M: Machine + ?Sized>(&mut self, machine: &mut M) -> Result<Effect, DebuggerError> {
        let sp = machine
            .read_register(Register::Sp)
            .ok_or(EvalError::UnknownRegister(Register::Sp))? as u16;
        let return_address = machine.read_memory_word(sp);

        let id = self.registry.add(
            BreakpointKind::Execute,
            Location::Address {
                address: return_address,
                page: None,
            },
            BreakpointLife::Temporary,
        )?;
        let unwound = Expression::binary(
            BinaryOperator::Equal,
            Expression::Register(Register::Sp),
            Expression::Number(sp.wrapping_add(2) as Word),
        );
        self.registry.set_condition(id, Some(unwound));

        Ok(self.resume(ResumeMode::Finish, None, machine))
    }

    fn resume<M: Machine + ?Sized>(
        &mut self,
        mode: ResumeMode,
        step: Option<StepRequest>,
        machine: &mut M,
    ) -> Effect {
        self.run_state = RunState::Running;
        self.step = step;
        self.hook = match step {
            Some(StepRequest::Over { .. }) => HookState::SteppingOver,
            _ => HookState::Idle,
        };
        self.last_cycles = Some(machine.current_cycle_count());
        self.resume_pending = true;

        debug!(?mode, "resuming");
        Effect::Resumed(mode)
    }

    /// Stops the run from outside the hook, e.g. on a pause request or a
    /// CPU fault. `boundary` is the PC if the machine sits between instructions.
    pub fn stop(&mut self, reason: StopReason, boundary: Option<u16>) {
        self.run_state = RunState::Stopped(reason);
        self.hook = HookState::Idle;
        self.step = None;
        self.stopped_boundary = boundary;
        self.resume_pending = false;

        info!(?reason, "stopped");
    }

    /// Called before the instruction at `pc` executes. Returns the breakpoint
    /// that stopped the run, if any.
    pub fn check_execute<M: Machine + ?Sized>(
        &mut self,
        pc: u16,
        machine: &mut M,
    ) -> Option<BreakpointId> {
        if !self.is_running() || self.hook == HookState::Checking {
            return None;
        }

        let now = machine.current_cycle_count();
        let since = self.last_cycles.replace(now);
        let resumed = std::mem::take(&mut self.resume_pending);
        let skip_execute = resumed && self.stopped_boundary == Some(pc);
        self.stopped_boundary = None;

        self.candidates.clear();
        if !skip_execute {
            let page = machine.memory_page(pc);
            self.registry
                .matching_address_into(BreakpointKind::Execute, pc, page, &mut self.candidates);
        }
        if let Some(since) = since {
            self.registry
                .time_crossings_into(since, now, &mut self.candidates);
        }

        if let Some(id) = self.fire_first(machine) {
            self.halt(id, Some(pc));
            return Some(id);
        }

        // The resume boundary is the instruction about to be stepped
        if resumed {
            return None;
        }

        let step_done = match self.step {
            Some(StepRequest::Single) => true,
            Some(StepRequest::Over { return_pc, sp }) => {
                pc == return_pc
                    || machine
                        .read_register(Register::Sp)
                        .map_or(true, |current| current as u16 >= sp)
            }
            None => false,
        };

        if step_done {
            self.stop(StopReason::Step, Some(pc));
        }

        None
    }

    /// Called on every memory access. May stop the run mid-instruction.
    pub fn check_memory_access<M: Machine + ?Sized>(
        &mut self,
        address: u16,
        is_write: bool,
        machine: &mut M,
    ) -> Option<BreakpointId> {
        if !self.is_running() || self.hook == HookState::Checking {
            return None;
        }

        self.candidates.clear();
        let page = machine.memory_page(address);
        self.registry.matching_address_into(
            BreakpointKind::memory(is_write),
            address,
            page,
            &mut self.candidates,
        );

        let fired = self.fire_first(machine);
        if let Some(id) = fired {
            self.halt(id, None);
        }
        fired
    }

    pub fn check_port_access<M: Machine + ?Sized>(
        &mut self,
        port: u16,
        is_write: bool,
        machine: &mut M,
    ) -> Option<BreakpointId> {
        if !self.is_running() || self.hook == HookState::Checking {
            return None;
        }

        self.candidates.clear();
        self.registry
            .matching_port_into(BreakpointKind::port(is_write), port, &mut self.candidates);

        let fired = self.fire_first(machine);
        if let Some(id) = fired {
            self.halt(id, None);
        }
        fired
    }

    // Walks `candidates` in id order: ignore counts first, then conditions.
    // The first breakpoint that triggers gets the hit.
    fn fire_first<M: Machine + ?Sized>(&mut self, machine: &mut M) -> Option<BreakpointId> {
        if self.candidates.is_empty() {
            return None;
        }
        self.candidates.sort_unstable();

        let previous = std::mem::replace(&mut self.hook, HookState::Checking);
        let mut fired = None;

        for index in 0..self.candidates.len() {
            let id = self.candidates[index];
            let breakpoint = match self.registry.get_mut(id) {
                Some(breakpoint) => breakpoint,
                None => continue,
            };

            if breakpoint.ignore_count > 0 {
                breakpoint.ignore_count -= 1;
                continue;
            }

            let triggered = match &breakpoint.condition {
                None => true,
                Some(condition) => match condition.evaluate(machine) {
                    Ok(value) => value != 0,
                    Err(error) => {
                        warn!(%id, %error, "breakpoint condition failed, treating as true");
                        self.condition_errors.push(ConditionError { id, error });
                        true
                    }
                },
            };

            if triggered {
                fired = Some(id);
                break;
            }
        }

        self.hook = previous;

        let id = fired?;
        self.registry.record_hit(id);
        Some(id)
    }

    fn halt(&mut self, id: BreakpointId, boundary: Option<u16>) {
        self.run_state = RunState::Stopped(StopReason::Breakpoint(id));
        self.hook = HookState::Halted(id);
        self.step = None;
        self.stopped_boundary = boundary;
        self.resume_pending = false;

        info!(%id, "breakpoint hit");
    }
}

fn evaluate_address<M: Machine + ?Sized>(
    expression: &Expression,
    machine: &mut M,
) -> Result<u16, DebuggerError> {
    let value = expression.evaluate(machine)?;
    u16::try_from(value).map_err(|_| RegistryError::InvalidAddress(value).into())
}

fn evaluate_port<M: Machine + ?Sized>(
    expression: &Expression,
    machine: &mut M,
) -> Result<u16, DebuggerError> {
    let value = expression.evaluate(machine)?;
    u16::try_from(value).map_err(|_| RegistryError::InvalidPort(value).into())
}

/// Shared handle for CPU cores that call back into the debugger from their
/// memory and port accessors. A check made while another one is still
/// running (a condition reading memory through the same core) returns `None`.
#[derive(Debug, Clone, Default)]
pub struct SharedDebugger(Rc<RefCell<Debugger>>);

impl SharedDebugger {
    pub fn new(debugger: Debugger) -> SharedDebugger {
        SharedDebugger(Rc::new(RefCell::new(debugger)))
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Debugger) -> R) -> Option<R> {
        let mut debugger = self.0.try_borrow_mut().ok()?;
        Some(f(&mut debugger))
    }

    pub fn check_execute<M: Machine + ?Sized>(&self, pc: u16, machine: &mut M) -> Option<BreakpointId> {
        self.with(|debugger| debugger.check_execute(pc, machine))
            .flatten()
    }

    pub fn check_memory_access<M: Machine + ?Sized>(
        &self,
        address: u16,
        is_write: bool,
        machine: &mut M,
    ) -> Option<BreakpointId> {
        self.with(|debugger| debugger.check_memory_access(address, is_write, machine))
            .flatten()
    }

    pub fn check_port_access<M: Machine + ?Sized>(
        &self,
        port: u16,
        is_write: bool,
        machine: &mut M,
    ) -> Option<BreakpointId> {
        self.with(|debugger| debugger.check_port_access(port, is_write, machine))
            .flatten()
    }
}
