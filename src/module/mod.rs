// Thu Oct 15 2026 - Alex

pub mod map;

pub use map::{ModuleInfo, ModuleMap, SectionFlags, SectionInfo};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse PE image: {0}")]
    Parse(String),
    #[error("Image {0} has no mapped size")]
    EmptyImage(String),
}
