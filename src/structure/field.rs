// Thu Oct 15 2026 - Alex

use crate::memory::Address;
use crate::structure::inference::{FieldKind, TypeGuess};
use serde::Serialize;
use std::fmt;

/// One span of a discovered layout. Offsets are relative to the struct base.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredField {
    pub offset: usize,
    pub size: usize,
    pub kind: FieldKind,
    pub confidence: f64,
    pub display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer_target: Option<Address>,
    /// Schema type the nested fields were expanded as.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nested_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nested: Option<Vec<DiscoveredField>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
}

impl DiscoveredField {
    pub fn new(offset: usize, size: usize, kind: FieldKind, confidence: f64) -> Self {
        Self {
            offset,
            size,
            kind,
            confidence,
            display: String::new(),
            notes: None,
            raw: None,
            pointer_target: None,
            nested_type: None,
            nested: None,
            declared_name: None,
            declared_type: None,
        }
    }

    pub fn from_guess(offset: usize, size: usize, guess: TypeGuess) -> Self {
        Self {
            display: guess.display,
            notes: guess.notes,
            pointer_target: guess.pointer_target,
            ..Self::new(offset, size, guess.kind, guess.confidence)
        }
    }

    pub fn padding(offset: usize, size: usize, byte: u8, note: &str) -> Self {
        Self {
            display: format!("{} x 0x{:02x}", size, byte),
            notes: Some(note.to_string()),
            ..Self::new(offset, size, FieldKind::Padding, 0.6)
        }
    }

    pub fn with_raw(mut self, raw: &[u8]) -> Self {
        self.raw = Some(raw.to_vec());
        self
    }

    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    pub fn is_pointer(&self) -> bool {
        self.kind.is_pointer()
    }

    pub fn is_padding(&self) -> bool {
        self.kind == FieldKind::Padding
    }
}

impl fmt::Display for DiscoveredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+0x{:04x} {:>3} {:<8} {:.2}  {}", self.offset, self.size, self.kind.to_string(), self.confidence, self.display)?;
        if let Some(name) = &self.declared_name {
            write!(f, "  [{}: {}]", name, self.declared_type.as_deref().unwrap_or("?"))?;
        }
        if let Some(notes) = &self.notes {
            write!(f, "  ; {}", notes)?;
        }
        Ok(())
    }
}
