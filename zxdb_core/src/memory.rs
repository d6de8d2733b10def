use std::collections::HashMap;
use std::default::Default;

const RAM_SIZE: usize = 0x10000;
const PAGE_SIZE: usize = 0x4000;

// Value seen on an unconnected Z80 data bus
const FLOATING_BUS: u8 = 0xFF;

pub trait MemMapped {
    fn read(&mut self, index: u16) -> u8;
    fn write(&mut self, index: u16, byte: u8);

    fn read_word(&mut self, index: u16) -> u16 {
        // little-endian!
        let byte_low = self.read(index);
        let byte_high = self.read(index.wrapping_add(1));

        ((byte_high as u16) << 8) | byte_low as u16
    }
}

#[derive(Clone)]
pub struct Ram {
    pub ram: Vec<u8>,
}

impl Default for Ram {
    fn default() -> Ram {
        Ram::new()
    }
}

impl Ram {
    pub fn new() -> Ram {
        Ram {
            ram: vec![0; RAM_SIZE],
        }
    }

    /// Copies `bytes` in starting at `offset`, stopping at the top of memory.
    /// Returns the number of bytes copied.
    pub fn load(&mut self, offset: u16, bytes: &[u8]) -> usize {
        let start = offset as usize;
        let len = bytes.len().min(RAM_SIZE - start);
        self.ram[start..start + len].copy_from_slice(&bytes[..len]);
        len
    }
}

impl MemMapped for Ram {
    fn read(&mut self, index: u16) -> u8 {
        self.ram[index as usize]
    }

    fn write(&mut self, index: u16, byte: u8) {
        self.ram[index as usize] = byte;
    }
}

/// Port latches. A port that was never written reads back the floating bus.
#[derive(Clone, Default)]
pub struct Ports {
    latches: HashMap<u16, u8>,
}

impl Ports {
    pub fn new() -> Ports {
        Ports::default()
    }
}

impl MemMapped for Ports {
    fn read(&mut self, index: u16) -> u8 {
        self.latches.get(&index).copied().unwrap_or(FLOATING_BUS)
    }

    fn write(&mut self, index: u16, byte: u8) {
        self.latches.insert(index, byte);
    }
}

/// Which memory page is mapped into each of the four 16K slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageMap {
    pub slots: [u8; 4],
}

impl Default for PageMap {
    fn default() -> PageMap {
        // 128K power-on layout: ROM 0, then RAM banks 5, 2 and 0
        PageMap {
            slots: [0, 5, 2, 0],
        }
    }
}

impl PageMap {
    #[inline]
    pub fn page_at(&self, index: u16) -> u8 {
        self.slots[index as usize / PAGE_SIZE]
    }
}
