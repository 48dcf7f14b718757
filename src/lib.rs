// Thu Oct 15 2026 - Alex

pub mod config;
pub mod context;
pub mod memory;
pub mod module;
pub mod structure;
pub mod utils;
pub mod validation;

pub use config::AnalysisConfig;
pub use context::AnalysisContext;
pub use memory::{Address, AddressSpace, ByteSnapshot, ImageMemory, MemoryError, ProcessMemory, SafeMemoryReader};
pub use module::{ModuleError, ModuleInfo, ModuleMap};
pub use structure::{
    DiscoveredLayout, LayoutComparator, MemoryAnalyzer, PatternRecognizer, SchemaLibrary, TypeInference,
    VTableDetector,
};
pub use validation::{PointerClassification, PointerKind, PointerValidator};
