// Thu Oct 15 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Null address")]
    NullAddress,
    #[error("Invalid read size: {0}")]
    InvalidSize(usize),
    #[error("Read of {requested} bytes exceeds bulk cap of {cap} bytes")]
    ExceedsBulkCap { requested: usize, cap: usize },
    #[error("Span of {1} bytes at 0x{0:x} is not readable")]
    Unreadable(u64, usize),
    #[error("Region not found at 0x{0:x}")]
    RegionNotFound(u64),
    #[error("Read failed at address 0x{0:x}")]
    ReadFailed(u64),
    #[error("Partial read at 0x{address:x}: wanted {wanted} bytes, got {got}")]
    PartialRead { address: u64, wanted: usize, got: usize },
    #[error("Process not found: {0}")]
    ProcessNotFound(String),
    #[error("Not supported: {0}")]
    NotSupported(String),
}
