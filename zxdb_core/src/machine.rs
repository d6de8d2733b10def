//! The view of the emulated machine that the debugger works through.
//!
//! The CPU core, banked memory and I/O bus live outside this crate; all the
//! debugger needs from them is the [`Machine`] trait. [`FlatMachine`] is a
//! plain memory image with a Z80 register file, enough to inspect and patch
//! a snapshot or to drive the debugger from tests.

use crate::memory::{MemMapped, PageMap, Ports, Ram};
use std::fmt;

/// The debugger's integer type. Every expression evaluates to one.
pub type Word = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    A,
    F,
    B,
    C,
    D,
    E,
    H,
    L,
    AltA,
    AltF,
    AltB,
    AltC,
    AltD,
    AltE,
    AltH,
    AltL,
    I,
    R,
    Ixh,
    Ixl,
    Iyh,
    Iyl,
    Af,
    Bc,
    De,
    Hl,
    AltAf,
    AltBc,
    AltDe,
    AltHl,
    Ix,
    Iy,
    Sp,
    Pc,
    Im,
    Iff1,
    Iff2,
    // Elapsed T-states, read through Machine::current_cycle_count
    Tstates,
}

const REGISTER_NAMES: &[(&str, Register)] = &[
    ("a", Register::A),
    ("f", Register::F),
    ("b", Register::B),
    ("c", Register::C),
    ("d", Register::D),
    ("e", Register::E),
    ("h", Register::H),
    ("l", Register::L),
    ("a'", Register::AltA),
    ("f'", Register::AltF),
    ("b'", Register::AltB),
    ("c'", Register::AltC),
    ("d'", Register::AltD),
    ("e'", Register::AltE),
    ("h'", Register::AltH),
    ("l'", Register::AltL),
    ("i", Register::I),
    ("r", Register::R),
    ("ixh", Register::Ixh),
    ("ixl", Register::Ixl),
    ("iyh", Register::Iyh),
    ("iyl", Register::Iyl),
    ("af", Register::Af),
    ("bc", Register::Bc),
    ("de", Register::De),
    ("hl", Register::Hl),
    ("af'", Register::AltAf),
    ("bc'", Register::AltBc),
    ("de'", Register::AltDe),
    ("hl'", Register::AltHl),
    ("ix", Register::Ix),
    ("iy", Register::Iy),
    ("sp", Register::Sp),
    ("pc", Register::Pc),
    ("im", Register::Im),
    ("iff1", Register::Iff1),
    ("iff2", Register::Iff2),
    ("tstates", Register::Tstates),
];

impl Register {
    /// Looks a register up by its debugger name, ignoring case.
    pub fn from_name(name: &str) -> Option<Register> {
        REGISTER_NAMES
            .iter()
            .find(|(register_name, _)| register_name.eq_ignore_ascii_case(name))
            .map(|&(_, register)| register)
    }

    pub fn name(self) -> &'static str {
        REGISTER_NAMES
            .iter()
            .find(|&&(_, register)| register == self)
            .map(|&(name, _)| name)
            .unwrap_or("?")
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembly {
    pub text: String,
    pub length: u16,
}

/// Accessors into the emulated machine.
///
/// Reads of memory and ports take `&mut self` because on real hardware they
/// can change peripheral state; the debugger only performs them when an
/// expression asks for them.
pub trait Machine {
    /// `None` if this machine has no such register.
    fn read_register(&self, register: Register) -> Option<Word>;
    /// Returns `false` if this machine has no such register.
    fn write_register(&mut self, register: Register, value: Word) -> bool;

    fn read_memory(&mut self, address: u16) -> u8;
    fn write_memory(&mut self, address: u16, byte: u8);

    fn read_port(&mut self, port: u16) -> u8;
    fn write_port(&mut self, port: u16, byte: u8);

    fn current_cycle_count(&self) -> u64;

    /// The memory page currently mapped at `address`, on machines with banked memory.
    fn memory_page(&self, _address: u16) -> Option<u8> {
        None
    }

    /// Decodes the instruction at `address`. Without a CPU decoder every
    /// byte is shown as data.
    fn disassemble(&mut self, address: u16) -> Disassembly {
        let byte = self.read_memory(address);
        Disassembly {
            text: format!("defb ${:02X}", byte),
            length: 1,
        }
    }

    fn program_counter(&self) -> u16 {
        self.read_register(Register::Pc).unwrap_or(0) as u16
    }

    fn read_memory_word(&mut self, address: u16) -> u16 {
        // little-endian!
        let byte_low = self.read_memory(address);
        let byte_high = self.read_memory(address.wrapping_add(1));

        ((byte_high as u16) << 8) | byte_low as u16
    }
}

/// Z80 register file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,

    pub a_alt: u8,
    pub f_alt: u8,
    pub b_alt: u8,
    pub c_alt: u8,
    pub d_alt: u8,
    pub e_alt: u8,
    pub h_alt: u8,
    pub l_alt: u8,

    pub i: u8,
    pub r: u8,
    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,

    pub im: u8,
    pub iff1: bool,
    pub iff2: bool,
}

#[inline]
fn pair(high: u8, low: u8) -> Word {
    ((high as Word) << 8) | low as Word
}

#[inline]
fn split(value: Word) -> (u8, u8) {
    ((value >> 8) as u8, value as u8)
}

impl Registers {
    pub fn get(&self, register: Register) -> Option<Word> {
        use self::Register::*;

        let value = match register {
            A => self.a as Word,
            F => self.f as Word,
            B => self.b as Word,
            C => self.c as Word,
            D => self.d as Word,
            E => self.e as Word,
            H => self.h as Word,
            L => self.l as Word,
            AltA => self.a_alt as Word,
            AltF => self.f_alt as Word,
            AltB => self.b_alt as Word,
            AltC => self.c_alt as Word,
            AltD => self.d_alt as Word,
            AltE => self.e_alt as Word,
            AltH => self.h_alt as Word,
            AltL => self.l_alt as Word,
            I => self.i as Word,
            R => self.r as Word,
            Ixh => (self.ix >> 8) as Word,
            Ixl => (self.ix & 0xFF) as Word,
            Iyh => (self.iy >> 8) as Word,
            Iyl => (self.iy & 0xFF) as Word,
            Af => pair(self.a, self.f),
            Bc => pair(self.b, self.c),
            De => pair(self.d, self.e),
            Hl => pair(self.h, self.l),
            AltAf => pair(self.a_alt, self.f_alt),
            AltBc => pair(self.b_alt, self.c_alt),
            AltDe => pair(self.d_alt, self.e_alt),
            AltHl => pair(self.h_alt, self.l_alt),
            Ix => self.ix as Word,
            Iy => self.iy as Word,
            Sp => self.sp as Word,
            Pc => self.pc as Word,
            Im => self.im as Word,
            Iff1 => self.iff1 as Word,
            Iff2 => self.iff2 as Word,
            Tstates => return None,
        };

        Some(value)
    }

    /// Stores `value` truncated to the register's width.
    pub fn set(&mut self, register: Register, value: Word) -> bool {
        use self::Register::*;

        match register {
            A => self.a = value as u8,
            F => self.f = value as u8,
            B => self.b = value as u8,
            C => self.c = value as u8,
            D => self.d = value as u8,
            E => self.e = value as u8,
            H => self.h = value as u8,
            L => self.l = value as u8,
            AltA => self.a_alt = value as u8,
            AltF => self.f_alt = value as u8,
            AltB => self.b_alt = value as u8,
            AltC => self.c_alt = value as u8,
            AltD => self.d_alt = value as u8,
            AltE => self.e_alt = value as u8,
            AltH => self.h_alt = value as u8,
            AltL => self.l_alt = value as u8,
            I => self.i = value as u8,
            R => self.r = value as u8,
            Ixh => self.ix = (self.ix & 0x00FF) | ((value as u16 & 0xFF) << 8),
            Ixl => self.ix = (self.ix & 0xFF00) | (value as u16 & 0xFF),
            Iyh => self.iy = (self.iy & 0x00FF) | ((value as u16 & 0xFF) << 8),
            Iyl => self.iy = (self.iy & 0xFF00) | (value as u16 & 0xFF),
            Af => (self.a, self.f) = split(value),
            Bc => (self.b, self.c) = split(value),
            De => (self.d, self.e) = split(value),
            Hl => (self.h, self.l) = split(value),
            AltAf => (self.a_alt, self.f_alt) = split(value),
            AltBc => (self.b_alt, self.c_alt) = split(value),
            AltDe => (self.d_alt, self.e_alt) = split(value),
            AltHl => (self.h_alt, self.l_alt) = split(value),
            Ix => self.ix = value as u16,
            Iy => self.iy = value as u16,
            Sp => self.sp = value as u16,
            Pc => self.pc = value as u16,
            Im => self.im = (value & 0x3) as u8,
            Iff1 => self.iff1 = value != 0,
            Iff2 => self.iff2 = value != 0,
            Tstates => return false,
        }

        true
    }
}

/// A 64K memory image plus registers, ports and a page map. Executes nothing.
#[derive(Clone, Default)]
pub struct FlatMachine {
    pub registers: Registers,
    pub memory: Ram,
    pub ports: Ports,
    pub pages: PageMap,
    pub tstates: u64,
}

impl FlatMachine {
    pub fn new() -> FlatMachine {
        FlatMachine::default()
    }

    pub fn with_image(load_address: u16, image: &[u8]) -> FlatMachine {
        let mut machine = FlatMachine::new();
        machine.memory.load(load_address, image);
        machine
    }
}

impl Machine for FlatMachine {
    fn read_register(&self, register: Register) -> Option<Word> {
        match register {
            Register::Tstates => Some(self.tstates as Word),
            _ => self.registers.get(register),
        }
    }

    fn write_register(&mut self, register: Register, value: Word) -> bool {
        match register {
            Register::Tstates => {
                self.tstates = value as u64;
                true
            }
            _ => self.registers.set(register, value),
        }
    }

    fn read_memory(&mut self, address: u16) -> u8 {
        self.memory.read(address)
    }

    fn write_memory(&mut self, address: u16, byte: u8) {
        self.memory.write(address, byte);
    }

    fn read_port(&mut self, port: u16) -> u8 {
        self.ports.read(port)
    }

    fn write_port(&mut self, port: u16, byte: u8) {
        self.ports.write(port, byte);
    }

    fn current_cycle_count(&self) -> u64 {
        self.tstates
    }

    fn memory_page(&self, address: u16) -> Option<u8> {
        Some(self.pages.page_at(address))
    }
}

/// Test double counting every memory and port read that reaches the machine.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct CountingMachine {
    pub inner: FlatMachine,
    pub memory_reads: usize,
    pub port_reads: usize,
}

#[cfg(test)]
impl Machine for CountingMachine {
    fn read_register(&self, register: Register) -> Option<Word> {
        self.inner.read_register(register)
    }

    fn write_register(&mut self, register: Register, value: Word) -> bool {
        self.inner.write_register(register, value)
    }

    fn read_memory(&mut self, address: u16) -> u8 {
        self.memory_reads += 1;
        self.inner.read_memory(address)
    }

    fn write_memory(&mut self, address: u16, byte: u8) {
        self.inner.write_memory(address, byte)
    }

    fn read_port(&mut self, port: u16) -> u8 {
        self.port_reads += 1;
        self.inner.read_port(port)
    }

    fn write_port(&mut self, port: u16, byte: u8) {
        self.inner.write_port(port, byte)
    }

    fn current_cycle_count(&self) -> u64 {
        self.inner.current_cycle_count()
    }

    fn memory_page(&self, address: u16) -> Option<u8> {
        self.inner.memory_page(address)
    }
}
