// Thu Oct 15 2026 - Alex

use crate::config::AnalysisConfig;
use crate::memory::{Address, AddressSpace, SafeMemoryReader};
use crate::module::ModuleMap;
use crate::structure::schema::SchemaLibrary;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Default)]
struct ContextCaches {
    modules: Arc<ModuleMap>,
    vtable_types: AHashMap<u64, String>,
}

/// Host-owned state shared by every analysis call against one target.
///
/// The module map and vtable→type lookup live for the target's lifetime and
/// are rebuilt explicitly after a binary update or restart. Both sit behind
/// one lock; analyses only take the read side.
pub struct AnalysisContext {
    reader: SafeMemoryReader,
    config: AnalysisConfig,
    schema: Arc<SchemaLibrary>,
    caches: RwLock<ContextCaches>,
}

impl AnalysisContext {
    pub fn new(space: Arc<dyn AddressSpace>, config: AnalysisConfig) -> Self {
        let reader = SafeMemoryReader::new(space).with_bulk_cap(config.max_bulk_read);
        Self {
            reader,
            config,
            schema: Arc::new(SchemaLibrary::new()),
            caches: RwLock::new(ContextCaches::default()),
        }
    }

    pub fn with_schema(mut self, schema: SchemaLibrary) -> Self {
        self.schema = Arc::new(schema);
        self.seed_vtable_types();
        self
    }

    pub fn with_modules(self, modules: ModuleMap) -> Self {
        self.rebuild_modules(modules);
        self
    }

    pub fn reader(&self) -> &SafeMemoryReader {
        &self.reader
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn schema(&self) -> &SchemaLibrary {
        &self.schema
    }

    pub fn modules(&self) -> Arc<ModuleMap> {
        self.caches.read().modules.clone()
    }

    /// Replaces the module map and re-derives the vtable→type lookup from it.
    pub fn rebuild_modules(&self, modules: ModuleMap) {
        log::debug!("rebuilding module map with {} modules", modules.len());
        {
            let mut caches = self.caches.write();
            caches.modules = Arc::new(modules);
            caches.vtable_types.clear();
        }
        self.seed_vtable_types();
    }

    /// Drops both caches. Analyses keep working but classify nothing as
    /// module-backed until [`rebuild_modules`](Self::rebuild_modules) runs.
    pub fn invalidate(&self) {
        let mut caches = self.caches.write();
        caches.modules = Arc::new(ModuleMap::new());
        caches.vtable_types.clear();
    }

    pub fn register_vtable_type(&self, vtable: Address, type_name: &str) {
        self.caches
            .write()
            .vtable_types
            .entry(vtable.as_u64())
            .or_insert_with(|| type_name.to_string());
    }

    pub fn vtable_type(&self, vtable: Address) -> Option<String> {
        self.caches.read().vtable_types.get(&vtable.as_u64()).cloned()
    }

    fn seed_vtable_types(&self) {
        let mut caches = self.caches.write();
        let base = match caches.modules.primary() {
            Some(module) => module.base,
            None => return,
        };
        for declared in self.schema.iter() {
            if let Some(rva) = declared.vtable_rva {
                caches
                    .vtable_types
                    .entry(base.as_u64().wrapping_add(rva))
                    .or_insert_with(|| declared.name.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ImageMemory;
    use crate::module::ModuleInfo;
    use crate::structure::schema::DeclaredStruct;

    fn context() -> AnalysisContext {
        let mut schema = SchemaLibrary::new();
        let mut declared = DeclaredStruct::new("Actor");
        declared.vtable_rva = Some(0x5000);
        schema.insert(declared);

        AnalysisContext::new(Arc::new(ImageMemory::new()), AnalysisConfig::default())
            .with_schema(schema)
            .with_modules(ModuleMap::new().with_module(ModuleInfo::new("game.exe", Address::new(0x1_4000_0000), 0x10000)))
    }

    #[test]
    fn test_vtable_types_seeded_from_schema() {
        let ctx = context();
        assert_eq!(ctx.vtable_type(Address::new(0x1_4000_5000)).as_deref(), Some("Actor"));
        assert!(ctx.vtable_type(Address::new(0x1_4000_6000)).is_none());
    }

    #[test]
    fn test_register_is_append_only() {
        let ctx = context();
        ctx.register_vtable_type(Address::new(0x1_4000_5000), "Other");
        ctx.register_vtable_type(Address::new(0x1_4000_7000), "Widget");
        assert_eq!(ctx.vtable_type(Address::new(0x1_4000_5000)).as_deref(), Some("Actor"));
        assert_eq!(ctx.vtable_type(Address::new(0x1_4000_7000)).as_deref(), Some("Widget"));
    }

    #[test]
    fn test_invalidate_and_rebuild() {
        let ctx = context();
        ctx.invalidate();
        assert!(ctx.modules().is_empty());
        assert!(ctx.vtable_type(Address::new(0x1_4000_5000)).is_none());

        ctx.rebuild_modules(ModuleMap::new().with_module(ModuleInfo::new("game.exe", Address::new(0x1_5000_0000), 0x10000)));
        assert_eq!(ctx.modules().len(), 1);
        assert_eq!(ctx.vtable_type(Address::new(0x1_5000_5000)).as_deref(), Some("Actor"));
    }
}
