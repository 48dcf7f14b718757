// Thu Oct 15 2026 - Alex

use crate::memory::{Address, AddressSpace, ByteSnapshot, MemoryError, Primitive};
use std::sync::Arc;

/// Largest single copy the reader will perform.
pub const MAX_BULK_READ: usize = 1024 * 1024;

/// Fault-free read primitive gated on page-protection metadata.
///
/// The readability check and the copy are two separate calls into the target.
/// A page that changes protection between them surfaces as a read error, never
/// as a fault, so the race is tolerated rather than eliminated.
#[derive(Clone)]
pub struct SafeMemoryReader {
    space: Arc<dyn AddressSpace>,
    bulk_cap: usize,
}

impl SafeMemoryReader {
    pub fn new(space: Arc<dyn AddressSpace>) -> Self {
        Self {
            space,
            bulk_cap: MAX_BULK_READ,
        }
    }

    /// Lowers the bulk cap. Values above [`MAX_BULK_READ`] are clamped.
    pub fn with_bulk_cap(mut self, cap: usize) -> Self {
        self.bulk_cap = cap.min(MAX_BULK_READ);
        self
    }

    pub fn bulk_cap(&self) -> usize {
        self.bulk_cap
    }

    /// True only if the whole span sits in one committed, readable,
    /// non-guard region as observed by a single protection query.
    pub fn is_readable(&self, addr: Address, size: usize) -> bool {
        if addr.is_null() || size == 0 {
            return false;
        }
        match self.space.query_region(addr) {
            Ok(region) => region.is_readable() && region.range().contains_span(addr, size as u64),
            Err(_) => false,
        }
    }

    /// Copies exactly `size` bytes into a fresh snapshot, or fails without
    /// returning any partial data.
    pub fn try_read_bytes(&self, addr: Address, size: usize) -> Result<ByteSnapshot, MemoryError> {
        if addr.is_null() {
            return Err(MemoryError::NullAddress);
        }
        if size == 0 {
            return Err(MemoryError::InvalidSize(size));
        }
        if size > self.bulk_cap {
            return Err(MemoryError::ExceedsBulkCap {
                requested: size,
                cap: self.bulk_cap,
            });
        }
        if !self.is_readable(addr, size) {
            return Err(MemoryError::Unreadable(addr.as_u64(), size));
        }

        let bytes = self.space.read(addr, size)?;
        if bytes.len() != size {
            return Err(MemoryError::PartialRead {
                address: addr.as_u64(),
                wanted: size,
                got: bytes.len(),
            });
        }
        Ok(ByteSnapshot::new(addr, bytes))
    }

    pub fn try_read<T: Primitive>(&self, addr: Address) -> Result<T, MemoryError> {
        let snapshot = self.try_read_bytes(addr, T::SIZE)?;
        Ok(T::from_le_slice(snapshot.bytes()))
    }

    pub fn space(&self) -> &Arc<dyn AddressSpace> {
        &self.space
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ImageMemory, Protection};

    fn reader() -> SafeMemoryReader {
        let mut image = ImageMemory::new();
        image.map(Address::new(0x10000), vec![0xAB; 0x1000], Protection::ReadWrite, "heap");
        image.map(Address::new(0x11000), vec![0xCD; 0x1000], Protection::ReadWrite, "heap2");
        image.reserve(Address::new(0x20000), 0x1000, "reserved");
        image.guard(Address::new(0x30000), 0x1000, "guard");
        image.map(Address::new(0x40000), vec![0; 0x1000], Protection::None, "noaccess");
        SafeMemoryReader::new(Arc::new(image))
    }

    #[test]
    fn test_null_zero_and_oversized_fail() {
        let reader = reader();
        assert!(matches!(reader.try_read_bytes(Address::zero(), 16), Err(MemoryError::NullAddress)));
        assert!(matches!(reader.try_read_bytes(Address::new(0x10000), 0), Err(MemoryError::InvalidSize(0))));
        assert!(matches!(
            reader.try_read_bytes(Address::new(0x10000), MAX_BULK_READ + 1),
            Err(MemoryError::ExceedsBulkCap { .. })
        ));
    }

    #[test]
    fn test_protection_gate() {
        let reader = reader();
        assert!(reader.is_readable(Address::new(0x10000), 0x1000));
        assert!(!reader.is_readable(Address::new(0x20000), 8));
        assert!(!reader.is_readable(Address::new(0x30000), 8));
        assert!(!reader.is_readable(Address::new(0x40000), 8));
        assert!(!reader.is_readable(Address::new(0x50000), 8));
    }

    #[test]
    fn test_span_must_stay_in_one_region() {
        let reader = reader();
        // Both halves are readable but belong to different regions.
        assert!(!reader.is_readable(Address::new(0x10ff8), 16));
        assert!(reader.try_read_bytes(Address::new(0x10ff8), 16).is_err());
    }

    #[test]
    fn test_typed_read() {
        let reader = reader();
        assert_eq!(reader.try_read::<u32>(Address::new(0x10010)).ok(), Some(0xABABABAB));
        assert!(reader.try_read::<u64>(Address::new(0x20000)).is_err());
    }
}
