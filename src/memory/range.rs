// Thu Oct 15 2026 - Alex

use crate::memory::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open span `[start, end)` of target memory. Caller-owned; the engine
/// never frees or retains what it describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryRange {
    start: Address,
    end: Address,
}

impl MemoryRange {
    pub fn new(start: Address, end: Address) -> Self {
        let end = if end.as_u64() < start.as_u64() { start } else { end };
        Self { start, end }
    }

    pub fn from_start_size(start: Address, size: u64) -> Self {
        Self::new(start, Address::new(start.as_u64().saturating_add(size)))
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn end(&self) -> Address {
        self.end
    }

    pub fn size(&self) -> u64 {
        self.end.as_u64() - self.start.as_u64()
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr.as_u64() >= self.start.as_u64() && addr.as_u64() < self.end.as_u64()
    }

    /// True when the whole span `[addr, addr + len)` lies inside this range.
    pub fn contains_span(&self, addr: Address, len: u64) -> bool {
        match addr.as_u64().checked_add(len) {
            Some(span_end) => self.contains(addr) && span_end <= self.end.as_u64(),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start.as_u64() >= self.end.as_u64()
    }
}

impl fmt::Display for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_span_rejects_overflow() {
        let range = MemoryRange::from_start_size(Address::new(0x1000), 0x1000);
        assert!(range.contains_span(Address::new(0x1000), 0x1000));
        assert!(!range.contains_span(Address::new(0x1800), 0x1000));
        assert!(!range.contains_span(Address::new(0x1800), u64::MAX));
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let range = MemoryRange::new(Address::new(0x2000), Address::new(0x1000));
        assert!(range.is_empty());
        assert_eq!(range.size(), 0);
    }
}
