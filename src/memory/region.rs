// Thu Oct 15 2026 - Alex

use crate::memory::{Address, MemoryRange, Protection};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Commit state of a span of the target's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionState {
    Committed,
    Reserved,
    Free,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRegion {
    range: MemoryRange,
    protection: Protection,
    state: RegionState,
    guard: bool,
    name: String,
}

impl MemoryRegion {
    pub fn new(range: MemoryRange, protection: Protection, name: String) -> Self {
        Self {
            range,
            protection,
            state: RegionState::Committed,
            guard: false,
            name,
        }
    }

    pub fn with_state(mut self, state: RegionState) -> Self {
        self.state = state;
        self
    }

    pub fn with_guard(mut self, guard: bool) -> Self {
        self.guard = guard;
        self
    }

    pub fn range(&self) -> &MemoryRange {
        &self.range
    }

    pub fn protection(&self) -> Protection {
        self.protection
    }

    pub fn state(&self) -> RegionState {
        self.state
    }

    pub fn is_guard(&self) -> bool {
        self.guard
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> Address {
        self.range.start()
    }

    pub fn end(&self) -> Address {
        self.range.end()
    }

    pub fn size(&self) -> u64 {
        self.range.size()
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.range.contains(addr)
    }

    pub fn is_executable(&self) -> bool {
        self.protection.can_execute()
    }

    pub fn is_writable(&self) -> bool {
        self.protection.can_write()
    }

    /// Committed, not a guard page, and carrying read permission.
    pub fn is_readable(&self) -> bool {
        self.state == RegionState::Committed && !self.guard && self.protection.can_read()
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = if self.guard { " guard" } else { "" };
        write!(f, "{} {}{} {:?} {}", self.range, self.protection, guard, self.state, self.name)
    }
}
