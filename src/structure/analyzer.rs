// Fri Oct 16 2026 - Alex

use crate::context::AnalysisContext;
use crate::memory::{Address, ByteSnapshot};
use crate::structure::field::DiscoveredField;
use crate::structure::inference::{is_alignment_fill, FieldKind, TypeInference};
use crate::structure::layout::DiscoveredLayout;
use crate::structure::schema::{DeclaredCategory, DeclaredStruct};
use crate::structure::vtable::VTableDetector;
use crate::utils::hex_string_spaced;
use crate::utils::logging::ScopedTimer;
use crate::validation::{PointerKind, PointerValidator};
use ahash::AHashSet;

/// Guesses at or below this confidence are folded into unknown spans.
const EMIT_THRESHOLD: f64 = 0.2;
const ALIGNMENT: usize = 4;

/// Expansions already performed during one analysis, keyed by absolute
/// address and schema type. Entries are never removed, so a cyclic object
/// graph stops at the first revisit.
type Visited = AHashSet<(u64, String)>;

/// Scans a struct-sized range into a gapless field list.
pub struct MemoryAnalyzer<'a> {
    ctx: &'a AnalysisContext,
    validator: PointerValidator,
}

impl<'a> MemoryAnalyzer<'a> {
    pub fn new(ctx: &'a AnalysisContext) -> Self {
        Self {
            ctx,
            validator: PointerValidator::from_context(ctx),
        }
    }

    pub fn validator(&self) -> &PointerValidator {
        &self.validator
    }

    /// Analyzes `[base, base + size)`. `hint` names the schema struct the
    /// range is believed to hold; nested expansion needs it (or a registered
    /// vtable type) to know which fields are structs.
    pub fn analyze(&self, base: Address, size: usize, hint: Option<&str>) -> DiscoveredLayout {
        let _timer = ScopedTimer::new(&format!("analyze {}", base));
        let mut visited = Visited::new();
        self.analyze_at(base, size, hint, 0, &mut visited)
    }

    fn analyze_at(
        &self,
        base: Address,
        size: usize,
        hint: Option<&str>,
        depth: usize,
        visited: &mut Visited,
    ) -> DiscoveredLayout {
        let config = self.ctx.config();
        let mut layout = DiscoveredLayout::new(base, size);
        layout.type_name = hint.map(str::to_string);
        if size == 0 {
            return layout;
        }

        let snapshot = match self.ctx.reader().try_read_bytes(base, size) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::debug!("cannot snapshot {} (+0x{:x}): {}", base, size, e);
                let mut field = DiscoveredField::new(0, size, FieldKind::Unknown, 0.0);
                field.notes = Some(e.to_string());
                layout.readable = false;
                layout.fields.push(field);
                layout.update_summary(config.high_confidence_threshold);
                return layout;
            }
        };

        let inference = TypeInference::new(&self.validator, config);
        let detector = VTableDetector::new(&self.validator, config);

        let mut start = 0;
        if let Some(first) = snapshot.read::<u64>(0) {
            let info = detector.analyze_table(base, Address::new(first));
            if let (true, Some(table)) = (info.is_vtable, info.address) {
                let mut field = DiscoveredField::new(0, 8, FieldKind::VTablePointer, info.confidence)
                    .with_raw(snapshot.slice(0, 8));
                field.display = table.to_string();
                field.notes = Some(format!("{} slots", info.slot_count));
                field.pointer_target = Some(table);
                layout.fields.push(field);
                layout.vtable = Some(table);
                layout.vtable_slots = info.slot_count;
                start = 8;

                match hint {
                    Some(name) => self.ctx.register_vtable_type(table, name),
                    None => layout.type_name = self.ctx.vtable_type(table),
                }
            }
        }

        let walked = walk(&inference, &snapshot, start);
        layout.fields.extend(walked);

        if let Some(name) = layout.type_name.clone() {
            visited.insert((base.as_u64(), name.clone()));
            if config.nested && depth < config.max_nested_depth {
                if let Ok(declared) = self.ctx.schema().resolve(&name) {
                    self.expand_nested(&mut layout, &declared, depth, visited);
                }
            }
        }

        layout.update_summary(config.high_confidence_threshold);
        layout
    }

    fn expand_nested(&self, layout: &mut DiscoveredLayout, declared: &DeclaredStruct, depth: usize, visited: &mut Visited) {
        let schema = self.ctx.schema();
        let max_size = self.ctx.config().max_nested_size;
        let base = layout.base;

        for field in layout.fields.iter_mut() {
            let Some(decl) = declared.field_at(field.offset as u64) else {
                continue;
            };

            let (target, type_name) = match decl.category() {
                DeclaredCategory::Named(name) if schema.contains(&name) => (base + field.offset as u64, name),
                DeclaredCategory::Pointer(Some(name)) if schema.contains(&name) => {
                    let Some(target) = field.pointer_target else {
                        continue;
                    };
                    let kind = self.validator.validate(target).kind;
                    if !matches!(kind, PointerKind::ValidHeap | PointerKind::ValidData) {
                        continue;
                    }
                    (target, name)
                }
                _ => continue,
            };

            let nested_size = match decl.category() {
                DeclaredCategory::Named(_) if decl.size > 0 => decl.size,
                _ => schema.declared_size(&type_name).unwrap_or(0),
            };
            if nested_size == 0 || nested_size > max_size {
                continue;
            }

            if !visited.insert((target.as_u64(), type_name.clone())) {
                log::trace!("{} @ {} already expanded", type_name, target);
                field.notes = Some(format!("{} @ {} already expanded", type_name, target));
                continue;
            }

            log::trace!("expanding {} @ {} at depth {}", type_name, target, depth + 1);
            let child = self.analyze_at(target, nested_size as usize, Some(&type_name), depth + 1, visited);
            field.nested = Some(child.fields);
            field.nested_type = Some(type_name);
        }
    }
}

/// Steps through `snapshot` from `start`, emitting fields until the end.
///
/// Offsets only grow and every emitted span starts where the previous one
/// ended, so the result tiles `[start, len)`.
fn walk(inference: &TypeInference<'_>, snapshot: &ByteSnapshot, start: usize) -> Vec<DiscoveredField> {
    let size = snapshot.len();
    let mut fields = Vec::new();
    let mut pending_unknown: Option<usize> = None;
    let mut offset = start;

    while offset < size {
        let guess = inference.infer(snapshot, offset);
        let width = if guess.size > 0 { guess.size } else { guess.kind.default_size() };
        let step = width.clamp(1, size - offset);

        if guess.kind != FieldKind::Unknown || guess.confidence > EMIT_THRESHOLD {
            flush_unknown(&mut fields, snapshot, &mut pending_unknown, offset);
            let mut field = DiscoveredField::from_guess(offset, step, guess);
            if !field.is_padding() {
                field = field.with_raw(snapshot.slice(offset, step));
            }
            fields.push(field);
        } else if pending_unknown.is_none() {
            pending_unknown = Some(offset);
        }
        offset += step;

        if offset % ALIGNMENT != 0 && size - offset >= ALIGNMENT {
            let boundary = offset.next_multiple_of(ALIGNMENT);
            let gap = snapshot.slice(offset, boundary - offset);
            if is_alignment_fill(gap) {
                flush_unknown(&mut fields, snapshot, &mut pending_unknown, offset);
                fields.push(DiscoveredField::padding(offset, gap.len(), gap[0], "alignment"));
                offset = boundary;
            }
        }
    }

    flush_unknown(&mut fields, snapshot, &mut pending_unknown, size);
    fields
}

fn flush_unknown(fields: &mut Vec<DiscoveredField>, snapshot: &ByteSnapshot, pending: &mut Option<usize>, end: usize) {
    let Some(start) = pending.take() else {
        return;
    };
    let raw = snapshot.slice(start, end - start);
    let mut field = DiscoveredField::new(start, end - start, FieldKind::Unknown, 0.1).with_raw(raw);
    field.display = hex_string_spaced(&raw[..raw.len().min(8)]);
    fields.push(field);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::memory::{ImageMemory, Protection};
    use crate::module::ModuleMap;
    use crate::structure::schema::SchemaLibrary;
    use std::sync::Arc;

    const HEAP: u64 = 0x2000_0000;

    fn context(bytes: Vec<u8>, schema: SchemaLibrary, nested: bool) -> AnalysisContext {
        let mut image = ImageMemory::new();
        image.map(Address::new(HEAP), bytes, Protection::ReadWrite, "heap");
        AnalysisContext::new(Arc::new(image), AnalysisConfig::default().with_nested(nested))
            .with_schema(schema)
            .with_modules(ModuleMap::new())
    }

    #[test]
    fn test_mixed_struct_is_gapless() {
        let mut bytes = Vec::new();
        bytes.extend([1u8, 0, 0, 0]);
        bytes.extend(2.5f32.to_le_bytes());
        bytes.extend((HEAP + 0x100).to_le_bytes());
        bytes.extend(123_456i32.to_le_bytes());
        bytes.extend([0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xEE]);
        bytes.resize(0x200, 0);

        let ctx = context(bytes, SchemaLibrary::new(), false);
        let layout = MemoryAnalyzer::new(&ctx).analyze(Address::new(HEAP), 0x40, None);
        assert!(layout.readable);
        assert!(layout.is_gapless());

        assert_eq!(layout.field_at(0).unwrap().kind, FieldKind::Bool);
        assert_eq!(layout.field_at(1).unwrap().notes.as_deref(), Some("alignment"));
        assert_eq!(layout.field_at(4).unwrap().kind, FieldKind::Float);
        let pointer = layout.field_at(8).unwrap();
        assert_eq!(pointer.kind, FieldKind::Pointer);
        assert_eq!(pointer.pointer_target, Some(Address::new(HEAP + 0x100)));
        assert_eq!(layout.field_at(16).unwrap().kind, FieldKind::Int32);
        assert!(layout.fields.last().unwrap().is_padding());
        assert_eq!(layout.summary.pointer_fields, 1);
    }

    #[test]
    fn test_unreadable_range_still_covers_size() {
        let ctx = context(vec![0; 16], SchemaLibrary::new(), false);
        let layout = MemoryAnalyzer::new(&ctx).analyze(Address::new(0x5000_0000), 24, None);
        assert!(!layout.readable);
        assert!(layout.is_gapless());
        assert_eq!(layout.fields[0].confidence, 0.0);
    }

    #[test]
    fn test_weak_bytes_coalesce_into_one_unknown() {
        // An odd-address byte followed by a lone trailing byte: neither can
        // be read as anything wider.
        let mut bytes = vec![0xAB, 0x12, 0x34, 0x56];
        bytes.resize(0x100, 0);
        let ctx = context(bytes, SchemaLibrary::new(), false);
        let layout = MemoryAnalyzer::new(&ctx).analyze(Address::new(HEAP + 1), 2, None);
        assert!(layout.is_gapless());
        assert_eq!(layout.fields.len(), 1);
        assert_eq!(layout.fields[0].kind, FieldKind::Unknown);
        assert_eq!(layout.fields[0].size, 2);
        assert_eq!(layout.fields[0].display, "12 34");
    }

    #[test]
    fn test_self_referencing_pointer_expands_once() {
        let schema = SchemaLibrary::from_json_str(
            r#"{"structs":[{"name":"Node","size":16,"fields":[
                {"name":"next","offset":0,"type":"Node*","size":8},
                {"name":"value","offset":8,"type":"int32","size":4}]}]}"#,
        )
        .unwrap();
        let mut bytes = HEAP.to_le_bytes().to_vec();
        bytes.extend(77i32.to_le_bytes());
        bytes.resize(0x100, 0);

        let ctx = context(bytes, schema, true);
        let layout = MemoryAnalyzer::new(&ctx).analyze(Address::new(HEAP), 16, Some("Node"));
        let next = layout.field_at(0).unwrap();
        assert!(next.nested.is_none());
        assert!(next.notes.as_deref().unwrap().contains("already expanded"));
    }

    #[test]
    fn test_mutual_references_terminate() {
        let schema = SchemaLibrary::from_json_str(
            r#"{"structs":[
                {"name":"A","size":16,"fields":[{"name":"b","offset":0,"type":"B*","size":8}]},
                {"name":"B","size":16,"fields":[{"name":"a","offset":0,"type":"A*","size":8}]}]}"#,
        )
        .unwrap();
        let mut bytes = (HEAP + 0x40).to_le_bytes().to_vec();
        bytes.resize(0x40, 0xAA);
        bytes.extend(HEAP.to_le_bytes());
        bytes.resize(0x100, 0xAA);

        let ctx = context(bytes, schema, true);
        let layout = MemoryAnalyzer::new(&ctx).analyze(Address::new(HEAP), 16, Some("A"));
        let b = layout.field_at(0).unwrap();
        assert_eq!(b.nested_type.as_deref(), Some("B"));
        let a = &b.nested.as_ref().unwrap()[0];
        assert_eq!(a.pointer_target, Some(Address::new(HEAP)));
        assert!(a.nested.is_none());
    }

    #[test]
    fn test_nested_disabled_by_default() {
        let schema = SchemaLibrary::from_json_str(
            r#"{"structs":[{"name":"Node","size":16,"fields":[{"name":"next","offset":0,"type":"Node*","size":8}]}]}"#,
        )
        .unwrap();
        let mut bytes = (HEAP + 0x40).to_le_bytes().to_vec();
        bytes.resize(0x100, 0);
        let ctx = context(bytes, schema, false);
        let layout = MemoryAnalyzer::new(&ctx).analyze(Address::new(HEAP), 16, Some("Node"));
        assert!(layout.field_at(0).unwrap().nested.is_none());
    }
}
