// Thu Oct 15 2026 - Alex

use crate::memory::{Address, Primitive};

/// Immutable copy of target bytes taken by a single read.
///
/// Every inference step works on snapshots, so results do not change if the
/// target mutates the original memory after the copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteSnapshot {
    base: Address,
    bytes: Vec<u8>,
}

impl ByteSnapshot {
    pub fn new(base: Address, bytes: Vec<u8>) -> Self {
        Self { base, bytes }
    }

    pub fn base(&self) -> Address {
        self.base
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Sub-slice clamped to the snapshot; empty when `offset` is past the end.
    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        let start = offset.min(self.bytes.len());
        let end = offset.saturating_add(len).min(self.bytes.len());
        &self.bytes[start..end]
    }

    pub fn read<T: Primitive>(&self, offset: usize) -> Option<T> {
        let end = offset.checked_add(T::SIZE)?;
        if end > self.bytes.len() {
            return None;
        }
        Some(T::from_le_slice(&self.bytes[offset..end]))
    }

    pub fn address_of(&self, offset: usize) -> Address {
        self.base + offset as u64
    }
}
