// Thu Oct 15 2026 - Alex

pub mod address;
pub mod error;
pub mod image;
pub mod process;
pub mod protection;
pub mod range;
pub mod region;
pub mod safe;
pub mod snapshot;
pub mod traits;

pub use address::Address;
pub use error::MemoryError;
pub use image::ImageMemory;
pub use process::ProcessMemory;
pub use protection::Protection;
pub use range::MemoryRange;
pub use region::{MemoryRegion, RegionState};
pub use safe::{SafeMemoryReader, MAX_BULK_READ};
pub use snapshot::ByteSnapshot;
pub use traits::{AddressSpace, Primitive};
