// Thu Oct 15 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StructureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Schema parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown struct: {0}")]
    UnknownStruct(String),
    #[error("Cyclic base chain through {0}")]
    CyclicBase(String),
}
