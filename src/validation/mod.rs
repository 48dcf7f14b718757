// Thu Oct 15 2026 - Alex

pub mod pointer_validation;

pub use pointer_validation::{PointerClassification, PointerKind, PointerValidator};
