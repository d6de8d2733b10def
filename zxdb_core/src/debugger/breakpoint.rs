use crate::debugger::expression::Expression;
use crate::errors::RegistryError;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BreakpointId(pub u32);

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakpointKind {
    Execute,
    MemoryRead,
    MemoryWrite,
    PortRead,
    PortWrite,
    Time,
}

impl BreakpointKind {
    pub fn memory(is_write: bool) -> BreakpointKind {
        if is_write {
            BreakpointKind::MemoryWrite
        } else {
            BreakpointKind::MemoryRead
        }
    }

    pub fn port(is_write: bool) -> BreakpointKind {
        if is_write {
            BreakpointKind::PortWrite
        } else {
            BreakpointKind::PortRead
        }
    }

    fn accepts(self, location: &Location) -> bool {
        use self::BreakpointKind::*;

        match location {
            Location::Address { .. } | Location::AddressRange { .. } => {
                matches!(self, Execute | MemoryRead | MemoryWrite)
            }
            Location::Port(_) => matches!(self, PortRead | PortWrite),
            Location::Time(_) => self == Time,
        }
    }
}

impl fmt::Display for BreakpointKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            BreakpointKind::Execute => "execute",
            BreakpointKind::MemoryRead => "read",
            BreakpointKind::MemoryWrite => "write",
            BreakpointKind::PortRead => "port read",
            BreakpointKind::PortWrite => "port write",
            BreakpointKind::Time => "time",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// A single address, optionally only while `page` is mapped there.
    Address { address: u16, page: Option<u8> },
    /// Inclusive at both ends.
    AddressRange { start: u16, end: u16 },
    Port(u16),
    Time(u64),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Location::Address {
                address,
                page: None,
            } => write!(f, "0x{:04X}", address),
            Location::Address {
                address,
                page: Some(page),
            } => write!(f, "{}:0x{:04X}", page, address),
            Location::AddressRange { start, end } => write!(f, "0x{:04X}-0x{:04X}", start, end),
            Location::Port(port) => write!(f, "0x{:04X}", port),
            Location::Time(tstates) => write!(f, "{}", tstates),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointLife {
    Permanent,
    Temporary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub kind: BreakpointKind,
    pub location: Location,
    pub life: BreakpointLife,
    pub condition: Option<Expression>,
    pub ignore_count: u32,
    pub hit_count: u32,
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let life = match self.life {
            BreakpointLife::Permanent => "keep",
            BreakpointLife::Temporary => "once",
        };

        write!(
            f,
            "{:>3}  {:<10} {:<13} {:<4}  hits {:<5} ignore {}",
            self.id.to_string(),
            self.kind.to_string(),
            self.location.to_string(),
            life,
            self.hit_count,
            self.ignore_count
        )?;

        if let Some(condition) = &self.condition {
            write!(f, "  if {}", condition)?;
        }

        Ok(())
    }
}

/// Owns every breakpoint and watchpoint.
///
/// Single-address Execute/MemoryRead/MemoryWrite breakpoints are indexed by
/// kind and address. Address ranges, ports and time breakpoints are few and
/// kept in a list that is scanned on each query.
#[derive(Debug)]
pub struct Registry {
    next_id: u32,
    breakpoints: BTreeMap<BreakpointId, Breakpoint>,
    by_address: HashMap<(BreakpointKind, u16), Vec<BreakpointId>>,
    scanned: Vec<BreakpointId>,
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new()
    }
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            next_id: 1,
            breakpoints: BTreeMap::new(),
            by_address: HashMap::new(),
            scanned: Vec::new(),
        }
    }

    pub fn add(
        &mut self,
        kind: BreakpointKind,
        location: Location,
        life: BreakpointLife,
    ) -> Result<BreakpointId, RegistryError> {
        if !kind.accepts(&location) {
            return Err(RegistryError::LocationMismatch { kind, location });
        }
        if let Location::AddressRange { start, end } = location {
            if start > end {
                return Err(RegistryError::InvalidRange { start, end });
            }
        }

        let id = BreakpointId(self.next_id);
        self.next_id += 1;

        match location {
            Location::Address { address, .. } => {
                self.by_address.entry((kind, address)).or_default().push(id)
            }
            _ => self.scanned.push(id),
        }

        self.breakpoints.insert(
            id,
            Breakpoint {
                id,
                kind,
                location,
                life,
                condition: None,
                ignore_count: 0,
                hit_count: 0,
            },
        );

        debug!(%id, %kind, %location, ?life, "breakpoint added");
        Ok(id)
    }

    pub fn remove(&mut self, id: BreakpointId) -> bool {
        let breakpoint = match self.breakpoints.remove(&id) {
            Some(breakpoint) => breakpoint,
            None => return false,
        };

        match breakpoint.location {
            Location::Address { address, .. } => {
                let key = (breakpoint.kind, address);
                if let Some(ids) = self.by_address.get_mut(&key) {
                    ids.retain(|&other| other != id);
                    if ids.is_empty() {
                        self.by_address.remove(&key);
                    }
                }
            }
            _ => self.scanned.retain(|&other| other != id),
        }

        debug!(%id, "breakpoint removed");
        true
    }

    pub fn remove_all(&mut self) -> usize {
        let count = self.breakpoints.len();

        self.breakpoints.clear();
        self.by_address.clear();
        self.scanned.clear();

        debug!(count, "all breakpoints removed");
        count
    }

    /// Removes the single-address Execute breakpoints at `address`, whatever
    /// page they are scoped to.
    pub fn clear_address(&mut self, address: u16) -> usize {
        let ids = self
            .by_address
            .get(&(BreakpointKind::Execute, address))
            .cloned()
            .unwrap_or_default();

        for &id in &ids {
            self.remove(id);
        }

        ids.len()
    }

    pub fn set_condition(&mut self, id: BreakpointId, condition: Option<Expression>) -> bool {
        match self.breakpoints.get_mut(&id) {
            Some(breakpoint) => {
                debug!(%id, has_condition = condition.is_some(), "condition changed");
                breakpoint.condition = condition;
                true
            }
            None => false,
        }
    }

    pub fn set_ignore_count(&mut self, id: BreakpointId, count: u32) -> bool {
        match self.breakpoints.get_mut(&id) {
            Some(breakpoint) => {
                debug!(%id, count, "ignore count changed");
                breakpoint.ignore_count = count;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.breakpoints.get(&id)
    }

    pub fn get_mut(&mut self, id: BreakpointId) -> Option<&mut Breakpoint> {
        self.breakpoints.get_mut(&id)
    }

    /// Counts a hit on a breakpoint that fired. Temporary breakpoints are
    /// removed; their life is returned either way.
    pub fn record_hit(&mut self, id: BreakpointId) -> Option<BreakpointLife> {
        let breakpoint = self.breakpoints.get_mut(&id)?;
        breakpoint.hit_count = breakpoint.hit_count.saturating_add(1);
        let life = breakpoint.life;

        if life == BreakpointLife::Temporary {
            self.remove(id);
        }

        Some(life)
    }

    /// Ids of the breakpoints of `kind` that match `value`, in ascending
    /// order. Page restrictions are not applied.
    pub fn find_matching(&self, kind: BreakpointKind, value: u64) -> Vec<BreakpointId> {
        let mut ids = Vec::new();

        match kind {
            BreakpointKind::Execute | BreakpointKind::MemoryRead | BreakpointKind::MemoryWrite => {
                if let Ok(address) = u16::try_from(value) {
                    self.address_matches_into(kind, address, |_| true, &mut ids);
                }
            }
            BreakpointKind::PortRead | BreakpointKind::PortWrite => {
                if let Ok(port) = u16::try_from(value) {
                    self.matching_port_into(kind, port, &mut ids);
                }
            }
            BreakpointKind::Time => {
                self.scan_into(&mut ids, |breakpoint| breakpoint.location == Location::Time(value));
            }
        }

        ids.sort_unstable();
        ids
    }

    /// Appends the Execute/MemoryRead/MemoryWrite breakpoints that match an
    /// access to `address` while `page` is mapped there. Output is unsorted.
    pub fn matching_address_into(
        &self,
        kind: BreakpointKind,
        address: u16,
        page: Option<u8>,
        out: &mut Vec<BreakpointId>,
    ) {
        self.address_matches_into(
            kind,
            address,
            |wanted| wanted.is_none() || wanted == page,
            out,
        );
    }

    // Single addresses come from the index, ranges from the scanned list
    fn address_matches_into<P>(
        &self,
        kind: BreakpointKind,
        address: u16,
        page_matches: P,
        out: &mut Vec<BreakpointId>,
    ) where
        P: Fn(Option<u8>) -> bool,
    {
        if let Some(ids) = self.by_address.get(&(kind, address)) {
            for &id in ids {
                let wanted_page = match self.breakpoints.get(&id) {
                    Some(Breakpoint {
                        location: Location::Address { page, .. },
                        ..
                    }) => *page,
                    _ => continue,
                };

                if page_matches(wanted_page) {
                    out.push(id);
                }
            }
        }

        self.scan_into(out, |breakpoint| {
            breakpoint.kind == kind
                && matches!(breakpoint.location,
                    Location::AddressRange { start, end } if start <= address && address <= end)
        });
    }

    pub fn matching_port_into(&self, kind: BreakpointKind, port: u16, out: &mut Vec<BreakpointId>) {
        self.scan_into(out, |breakpoint| {
            breakpoint.kind == kind && breakpoint.location == Location::Port(port)
        });
    }

    /// Appends the time breakpoints whose value lies in `(since, now]`.
    pub fn time_crossings_into(&self, since: u64, now: u64, out: &mut Vec<BreakpointId>) {
        if now <= since {
            return;
        }

        self.scan_into(out, |breakpoint| {
            matches!(breakpoint.location, Location::Time(tstates) if since < tstates && tstates <= now)
        });
    }

    fn scan_into<F>(&self, out: &mut Vec<BreakpointId>, predicate: F)
    where
        F: Fn(&Breakpoint) -> bool,
    {
        for id in &self.scanned {
            if let Some(breakpoint) = self.breakpoints.get(id) {
                if predicate(breakpoint) {
                    out.push(*id);
                }
            }
        }
    }

    /// Every breakpoint, by ascending id.
    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}
