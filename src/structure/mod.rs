// Thu Oct 15 2026 - Alex

pub mod analyzer;
pub mod comparison;
pub mod error;
pub mod field;
pub mod inference;
pub mod interpretation;
pub mod layout;
pub mod patterns;
pub mod schema;
pub mod vtable;

pub use analyzer::MemoryAnalyzer;
pub use comparison::{ComparisonResult, FieldComparison, FieldStatus, LayoutComparator};
pub use error::StructureError;
pub use field::DiscoveredField;
pub use inference::{FieldKind, TypeGuess, TypeInference};
pub use interpretation::{ByteInterpretations, PointerReading, StringReading};
pub use layout::{DiscoveredLayout, LayoutSummary};
pub use patterns::{ArrayPattern, PaddingRegion, PatternRecognizer, PatternReport};
pub use schema::{DeclaredCategory, DeclaredField, DeclaredStruct, SchemaLibrary};
pub use vtable::{VTableDetector, VTableInfo};
