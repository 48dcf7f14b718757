// Thu Oct 15 2026 - Alex

use crate::memory::Address;
use crate::structure::field::DiscoveredField;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LayoutSummary {
    pub total_fields: usize,
    pub high_confidence: usize,
    pub pointer_fields: usize,
    pub padding_bytes: usize,
    /// Filled in by the comparator.
    pub matched: usize,
    pub undocumented: usize,
}

/// Per-call analysis output. Built fresh on every analysis and never cached,
/// since the memory it describes keeps changing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredLayout {
    pub base: Address,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// False when the range could not be snapshotted; the fields then hold a
    /// single zero-confidence span.
    pub readable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vtable: Option<Address>,
    pub vtable_slots: usize,
    pub fields: Vec<DiscoveredField>,
    pub summary: LayoutSummary,
}

impl DiscoveredLayout {
    pub fn new(base: Address, size: usize) -> Self {
        Self {
            base,
            size,
            type_name: None,
            readable: true,
            vtable: None,
            vtable_slots: 0,
            fields: Vec::new(),
            summary: LayoutSummary::default(),
        }
    }

    pub fn field_at(&self, offset: usize) -> Option<&DiscoveredField> {
        self.fields.iter().find(|f| f.offset == offset)
    }

    /// Fields sorted by offset tile `[0, size)` exactly, with no overlap.
    pub fn is_gapless(&self) -> bool {
        let mut cursor = 0;
        for field in &self.fields {
            if field.offset != cursor || field.size == 0 {
                return false;
            }
            cursor = field.end();
        }
        cursor == self.size
    }

    /// Recounts everything except the comparison counters.
    pub fn update_summary(&mut self, high_confidence_threshold: f64) {
        let summary = &mut self.summary;
        summary.total_fields = self.fields.len();
        summary.high_confidence = self
            .fields
            .iter()
            .filter(|f| f.confidence > high_confidence_threshold)
            .count();
        summary.pointer_fields = self.fields.iter().filter(|f| f.is_pointer()).count();
        summary.padding_bytes = self.fields.iter().filter(|f| f.is_padding()).map(|f| f.size).sum();
    }
}

impl fmt::Display for DiscoveredLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.type_name.as_deref().unwrap_or("<unnamed>");
        writeln!(f, "{} @ {} (0x{:x} bytes)", name, self.base, self.size)?;
        if let Some(vtable) = self.vtable {
            writeln!(f, "  vtable {} ({} slots)", vtable, self.vtable_slots)?;
        }
        for field in &self.fields {
            writeln!(f, "  {}", field)?;
            if let Some(nested) = &field.nested {
                for child in nested {
                    writeln!(f, "      {}", child)?;
                }
            }
        }
        let s = &self.summary;
        writeln!(
            f,
            "  {} fields, {} high confidence, {} pointers, {} padding bytes",
            s.total_fields, s.high_confidence, s.pointer_fields, s.padding_bytes
        )
    }
}
