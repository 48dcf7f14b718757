// Thu Oct 15 2026 - Alex

use crate::config::AnalysisConfig;
use crate::context::AnalysisContext;
use crate::memory::{Address, SafeMemoryReader};
use crate::module::ModuleMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Where a pointer value lands in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PointerKind {
    Invalid,
    ValidHeap,
    ValidData,
    ValidCode,
}

impl PointerKind {
    pub fn is_valid(self) -> bool {
        !matches!(self, PointerKind::Invalid)
    }
}

impl fmt::Display for PointerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PointerKind::Invalid => "invalid",
            PointerKind::ValidHeap => "heap",
            PointerKind::ValidData => "data",
            PointerKind::ValidCode => "code",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointerClassification {
    pub address: Address,
    pub kind: PointerKind,
    pub confidence: f64,
    /// Short description of the owning region, e.g. `game.exe!.text`.
    pub region: String,
}

impl PointerClassification {
    fn invalid(address: Address, reason: &str) -> Self {
        Self {
            address,
            kind: PointerKind::Invalid,
            confidence: 0.0,
            region: reason.to_string(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.kind.is_valid()
    }
}

impl fmt::Display for PointerClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({}, {:.2})", self.address, self.kind, self.region, self.confidence)
    }
}

/// Classifies addresses against the module map and the readability gate.
///
/// Holds a snapshot of the module map taken at construction, so a concurrent
/// rebuild does not change classifications mid-analysis.
pub struct PointerValidator {
    reader: SafeMemoryReader,
    modules: Arc<ModuleMap>,
    min_address: u64,
    max_address: u64,
}

impl PointerValidator {
    pub fn new(reader: SafeMemoryReader, modules: Arc<ModuleMap>, config: &AnalysisConfig) -> Self {
        Self {
            reader,
            modules,
            min_address: config.min_user_address,
            max_address: config.max_user_address,
        }
    }

    pub fn from_context(ctx: &AnalysisContext) -> Self {
        Self::new(ctx.reader().clone(), ctx.modules(), ctx.config())
    }

    pub fn validate(&self, addr: Address) -> PointerClassification {
        if addr.is_null() {
            return PointerClassification::invalid(addr, "null");
        }
        let value = addr.as_u64();
        if value < self.min_address || value > self.max_address {
            return PointerClassification::invalid(addr, "outside user address range");
        }
        if !self.reader.is_readable(addr, 1) {
            return PointerClassification::invalid(addr, "unreadable");
        }

        if let Some(module) = self.modules.find(addr) {
            return match module.section_for(addr) {
                Some(section) if section.is_code() => PointerClassification {
                    address: addr,
                    kind: PointerKind::ValidCode,
                    confidence: 0.95,
                    region: format!("{}!{}", module.name, section.name),
                },
                Some(section) => PointerClassification {
                    address: addr,
                    kind: PointerKind::ValidData,
                    confidence: 0.9,
                    region: format!("{}!{}", module.name, section.name),
                },
                None => PointerClassification {
                    address: addr,
                    kind: PointerKind::ValidData,
                    confidence: 0.7,
                    region: module.name.clone(),
                },
            };
        }

        let region = match self.reader.space().query_region(addr) {
            Ok(region) if !region.name().is_empty() => region.name().to_string(),
            _ => "heap".to_string(),
        };
        PointerClassification {
            address: addr,
            kind: PointerKind::ValidHeap,
            confidence: 0.6,
            region,
        }
    }

    /// Module-map lookup only; performs no reads.
    pub fn is_in_code_section(&self, addr: Address) -> bool {
        self.modules
            .find(addr)
            .and_then(|m| m.section_for(addr))
            .map(|s| s.is_code())
            .unwrap_or(false)
    }

    /// Code or read-only data of a module: where compilers place vtables.
    pub fn is_vtable_home(&self, addr: Address) -> bool {
        self.modules
            .find(addr)
            .and_then(|m| m.section_for(addr))
            .map(|s| s.is_code() || s.is_read_only_data())
            .unwrap_or(false)
    }

    pub fn reader(&self) -> &SafeMemoryReader {
        &self.reader
    }

    pub fn modules(&self) -> &ModuleMap {
        &self.modules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ImageMemory, Protection};
    use crate::module::{ModuleInfo, SectionFlags, SectionInfo};

    const BASE: u64 = 0x1_4000_0000;

    fn validator() -> PointerValidator {
        let mut image = ImageMemory::new();
        image.map(Address::new(BASE), vec![0x90; 0x8000], Protection::ReadExecute, "game.exe");
        image.map(Address::new(0x2000_0000), vec![0; 0x1000], Protection::ReadWrite, "heap");
        image.reserve(Address::new(0x3000_0000), 0x1000, "reserved");

        let module = ModuleInfo::new("game.exe", Address::new(BASE), 0x8000)
            .with_section(SectionInfo::new(".text", 0x1000, 0x4000, SectionFlags::CNT_CODE | SectionFlags::MEM_EXECUTE))
            .with_section(SectionInfo::new(".rdata", 0x5000, 0x2000, SectionFlags::CNT_INITIALIZED_DATA | SectionFlags::MEM_READ));
        let modules = Arc::new(ModuleMap::new().with_module(module));

        PointerValidator::new(
            SafeMemoryReader::new(Arc::new(image)),
            modules,
            &AnalysisConfig::default(),
        )
    }

    #[test]
    fn test_classification_bands() {
        let v = validator();

        let code = v.validate(Address::new(BASE + 0x1200));
        assert_eq!(code.kind, PointerKind::ValidCode);
        assert_eq!(code.confidence, 0.95);
        assert_eq!(code.region, "game.exe!.text");

        let rdata = v.validate(Address::new(BASE + 0x5010));
        assert_eq!(rdata.kind, PointerKind::ValidData);
        assert_eq!(rdata.confidence, 0.9);

        let header = v.validate(Address::new(BASE + 0x10));
        assert_eq!(header.kind, PointerKind::ValidData);
        assert_eq!(header.confidence, 0.7);

        let heap = v.validate(Address::new(0x2000_0100));
        assert_eq!(heap.kind, PointerKind::ValidHeap);
        assert_eq!(heap.region, "heap");
    }

    #[test]
    fn test_invalid_addresses() {
        let v = validator();
        assert_eq!(v.validate(Address::zero()).kind, PointerKind::Invalid);
        assert_eq!(v.validate(Address::new(0x1000)).kind, PointerKind::Invalid);
        assert_eq!(v.validate(Address::new(0xFFFF_8000_0000_0000)).kind, PointerKind::Invalid);
        assert_eq!(v.validate(Address::new(0x3000_0000)).kind, PointerKind::Invalid);
        assert_eq!(v.validate(Address::new(0x5000_0000)).kind, PointerKind::Invalid);
    }

    #[test]
    fn test_code_section_checks() {
        let v = validator();
        assert!(v.is_in_code_section(Address::new(BASE + 0x1000)));
        assert!(!v.is_in_code_section(Address::new(BASE + 0x5000)));
        assert!(v.is_vtable_home(Address::new(BASE + 0x5000)));
        assert!(!v.is_vtable_home(Address::new(0x2000_0000)));
    }
}
