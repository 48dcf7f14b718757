// Fri Oct 16 2026 - Alex

use crate::structure::error::StructureError;
use crate::structure::field::DiscoveredField;
use crate::structure::inference::FieldKind;
use crate::structure::layout::DiscoveredLayout;
use crate::structure::schema::{DeclaredCategory, DeclaredField, DeclaredStruct, SchemaLibrary};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FieldStatus {
    Match,
    TypeMismatch,
    MissingInMemory,
    Undocumented,
}

impl fmt::Display for FieldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldStatus::Match => "match",
            FieldStatus::TypeMismatch => "type mismatch",
            FieldStatus::MissingInMemory => "missing in memory",
            FieldStatus::Undocumented => "undocumented",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldComparison {
    pub offset: usize,
    pub status: FieldStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovered_kind: Option<FieldKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovered_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_size: Option<u64>,
}

impl FieldComparison {
    fn new(offset: usize, status: FieldStatus, discovered: Option<&DiscoveredField>, declared: Option<&DeclaredField>) -> Self {
        Self {
            offset,
            status,
            discovered_kind: discovered.map(|d| d.kind),
            discovered_size: discovered.map(|d| d.size),
            declared_name: declared.map(|d| d.name.clone()),
            declared_type: declared.map(|d| d.type_name.clone()),
            declared_size: declared.map(|d| d.size),
        }
    }
}

impl fmt::Display for FieldComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+0x{:04x} {:<18}", self.offset, self.status.to_string())?;
        if let Some(kind) = self.discovered_kind {
            write!(f, " found {}", kind)?;
        }
        if let (Some(name), Some(ty)) = (&self.declared_name, &self.declared_type) {
            write!(f, " declared {}: {}", name, ty)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub struct_name: String,
    pub fields: Vec<FieldComparison>,
    pub matched: usize,
    pub type_mismatches: usize,
    pub missing_in_memory: usize,
    pub undocumented: usize,
    pub declared_size: Option<u64>,
    pub analyzed_size: usize,
    pub size_mismatch: bool,
}

impl ComparisonResult {
    /// Undocumented offsets, padding included, never fail a comparison.
    pub fn passed(&self) -> bool {
        self.type_mismatches == 0 && self.missing_in_memory == 0 && !self.size_mismatch
    }

    pub fn with_status(&self, status: FieldStatus) -> impl Iterator<Item = &FieldComparison> {
        self.fields.iter().filter(move |f| f.status == status)
    }
}

impl fmt::Display for ComparisonResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {} matched, {} mismatched, {} missing, {} undocumented",
            self.struct_name, self.matched, self.type_mismatches, self.missing_in_memory, self.undocumented)?;
        if self.size_mismatch {
            writeln!(f, "  size: declared 0x{:x}, analyzed 0x{:x}", self.declared_size.unwrap_or(0), self.analyzed_size)?;
        }
        for field in self.fields.iter().filter(|f| f.status != FieldStatus::Match) {
            writeln!(f, "  {}", field)?;
        }
        Ok(())
    }
}

/// Reconciles a discovered layout against its declared schema.
pub struct LayoutComparator;

impl LayoutComparator {
    /// Looks `name` up in `library`, flattening its base chain first.
    pub fn compare_named(layout: &mut DiscoveredLayout, library: &SchemaLibrary, name: &str) -> Result<ComparisonResult, StructureError> {
        let declared = library.resolve(name)?;
        Ok(Self::compare(layout, &declared))
    }

    /// Classifies every offset that either side has a field at, back-fills
    /// declared names onto discovered fields, and updates the layout's
    /// matched/undocumented counters.
    pub fn compare(layout: &mut DiscoveredLayout, declared: &DeclaredStruct) -> ComparisonResult {
        let mut by_offset: BTreeMap<usize, (Option<usize>, Option<&DeclaredField>)> = BTreeMap::new();
        for (index, field) in layout.fields.iter().enumerate() {
            by_offset.entry(field.offset).or_default().0 = Some(index);
        }
        for field in &declared.fields {
            by_offset.entry(field.offset as usize).or_default().1 = Some(field);
        }

        let mut fields = Vec::new();
        for (offset, (index, decl)) in by_offset {
            let status = match (index, decl) {
                (Some(i), Some(d)) => {
                    let discovered = &mut layout.fields[i];
                    discovered.declared_name = Some(d.name.clone());
                    discovered.declared_type = Some(d.type_name.clone());
                    if is_compatible(discovered, d) {
                        FieldStatus::Match
                    } else {
                        FieldStatus::TypeMismatch
                    }
                }
                (Some(_), None) => FieldStatus::Undocumented,
                (None, Some(_)) => FieldStatus::MissingInMemory,
                (None, None) => continue,
            };
            let discovered = index.map(|i| &layout.fields[i]);
            fields.push(FieldComparison::new(offset, status, discovered, decl));
        }

        let count = |status: FieldStatus| fields.iter().filter(|f| f.status == status).count();
        let declared_size = declared.size;
        let result = ComparisonResult {
            struct_name: declared.name.clone(),
            matched: count(FieldStatus::Match),
            type_mismatches: count(FieldStatus::TypeMismatch),
            missing_in_memory: count(FieldStatus::MissingInMemory),
            undocumented: count(FieldStatus::Undocumented),
            declared_size,
            analyzed_size: layout.size,
            size_mismatch: declared_size.map(|s| s != layout.size as u64).unwrap_or(false),
            fields,
        };

        layout.summary.matched = result.matched;
        layout.summary.undocumented = result.undocumented;
        if layout.type_name.is_none() {
            layout.type_name = Some(declared.name.clone());
        }
        result
    }
}

/// Whether a discovered reading can hold a value of the declared type.
pub fn is_compatible(discovered: &DiscoveredField, declared: &DeclaredField) -> bool {
    let kind = discovered.kind;
    if matches!(kind, FieldKind::Padding | FieldKind::Unknown) {
        return true;
    }

    match declared.category() {
        DeclaredCategory::Named(_) | DeclaredCategory::Array(_, _) => true,
        DeclaredCategory::Pointer(_) => kind.is_pointer(),
        DeclaredCategory::Float => kind == FieldKind::Float,
        // Inference never reads a double; only padding or unknown bytes can hold one.
        DeclaredCategory::Double => false,
        DeclaredCategory::Int64 if kind.is_pointer() => declared.size == 8 || declared.size == 0,
        category if category.is_integer() => {
            kind.is_integer() && (declared.size == 0 || discovered.size as u64 <= declared.size)
        }
        _ => false,
    }
}
