// Thu Oct 15 2026 - Alex

use crate::memory::{Address, MemoryError, MemoryRegion};

/// The single seam through which the engine touches foreign memory.
///
/// Implementations must never fault: an unmapped, guarded or otherwise
/// inaccessible address is reported as an `Err`, not a crash. Everything above
/// this trait works on owned byte buffers only.
pub trait AddressSpace: Send + Sync {
    /// Page-protection metadata for the region containing `addr`.
    fn query_region(&self, addr: Address) -> Result<MemoryRegion, MemoryError>;

    /// Copies `len` bytes starting at `addr`.
    fn read(&self, addr: Address, len: usize) -> Result<Vec<u8>, MemoryError>;
}

/// Fixed-width little-endian values that can be decoded from a byte slice.
pub trait Primitive: Copy {
    const SIZE: usize;

    /// Decodes from the first `SIZE` bytes. Callers guarantee the length.
    fn from_le_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_primitive {
    ($($t:ty),*) => {
        $(
            impl Primitive for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                    <$t>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_primitive!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);
