// Thu Oct 15 2026 - Alex

use crate::memory::{Address, MemoryRegion};
use crate::module::ModuleError;
use bitflags::bitflags;
use goblin::pe::PE;
use itertools::Itertools;
use std::fmt;

bitflags! {
    /// PE section characteristic bits the pointer classifier cares about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SectionFlags: u32 {
        const CNT_CODE = 0x0000_0020;
        const CNT_INITIALIZED_DATA = 0x0000_0040;
        const CNT_UNINITIALIZED_DATA = 0x0000_0080;
        const MEM_EXECUTE = 0x2000_0000;
        const MEM_READ = 0x4000_0000;
        const MEM_WRITE = 0x8000_0000;
    }
}

#[derive(Debug, Clone)]
pub struct SectionInfo {
    pub name: String,
    /// Offset from the module base.
    pub virtual_address: u64,
    pub virtual_size: u64,
    pub characteristics: SectionFlags,
}

impl SectionInfo {
    pub fn new(name: &str, virtual_address: u64, virtual_size: u64, characteristics: SectionFlags) -> Self {
        Self {
            name: name.to_string(),
            virtual_address,
            virtual_size,
            characteristics,
        }
    }

    pub fn is_code(&self) -> bool {
        self.characteristics
            .intersects(SectionFlags::CNT_CODE | SectionFlags::MEM_EXECUTE)
    }

    pub fn is_writable(&self) -> bool {
        self.characteristics.contains(SectionFlags::MEM_WRITE)
    }

    /// Initialized, non-executable and non-writable: `.rdata` and friends.
    pub fn is_read_only_data(&self) -> bool {
        !self.is_code() && !self.is_writable()
    }

    fn contains_rva(&self, rva: u64) -> bool {
        rva >= self.virtual_address && rva < self.virtual_address.saturating_add(self.virtual_size.max(1))
    }
}

#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub base: Address,
    pub size: u64,
    pub sections: Vec<SectionInfo>,
}

impl ModuleInfo {
    pub fn new(name: &str, base: Address, size: u64) -> Self {
        Self {
            name: name.to_string(),
            base,
            size,
            sections: Vec::new(),
        }
    }

    pub fn with_section(mut self, section: SectionInfo) -> Self {
        self.sections.push(section);
        self
    }

    /// Builds module metadata from an on-disk PE image loaded at `base`.
    pub fn from_pe(name: &str, base: Address, bytes: &[u8]) -> Result<Self, ModuleError> {
        let pe = PE::parse(bytes).map_err(|e| ModuleError::Parse(e.to_string()))?;

        let sections: Vec<SectionInfo> = pe
            .sections
            .iter()
            .map(|s| {
                SectionInfo::new(
                    s.name().unwrap_or(""),
                    s.virtual_address as u64,
                    s.virtual_size as u64,
                    SectionFlags::from_bits_retain(s.characteristics),
                )
            })
            .collect();

        let size = match pe.header.optional_header.as_ref() {
            Some(optional) => optional.windows_fields.size_of_image as u64,
            None => sections
                .iter()
                .map(|s| s.virtual_address + s.virtual_size)
                .max()
                .unwrap_or(0),
        };
        if size == 0 {
            return Err(ModuleError::EmptyImage(name.to_string()));
        }

        log::debug!("{}: {} sections, image size 0x{:x}", name, sections.len(), size);
        Ok(Self {
            name: name.to_string(),
            base,
            size,
            sections,
        })
    }

    pub fn end(&self) -> Address {
        self.base + self.size
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr.is_within_range(self.base, self.end())
    }

    pub fn section_for(&self, addr: Address) -> Option<&SectionInfo> {
        if !self.contains(addr) {
            return None;
        }
        let rva = addr.as_u64() - self.base.as_u64();
        self.sections.iter().find(|s| s.contains_rva(rva))
    }
}

impl fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} (0x{:x} bytes, {} sections)", self.name, self.base, self.size, self.sections.len())
    }
}

/// Loaded modules of the target. Stable until the target restarts.
#[derive(Debug, Clone, Default)]
pub struct ModuleMap {
    modules: Vec<ModuleInfo>,
}

impl ModuleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module: ModuleInfo) -> Self {
        self.add(module);
        self
    }

    pub fn add(&mut self, module: ModuleInfo) {
        self.modules.push(module);
    }

    /// Groups named, file-backed regions into modules. Executable regions
    /// become code sections, the rest data sections.
    pub fn from_regions(regions: &[MemoryRegion]) -> Self {
        let mut map = Self::new();
        let named = regions
            .iter()
            .filter(|r| !r.name().is_empty() && !r.name().starts_with('['))
            .sorted_by_key(|r| (r.name().to_string(), r.start()));
        let groups = named.chunk_by(|r| r.name().to_string());

        for (name, group) in &groups {
            let group: Vec<&MemoryRegion> = group.collect();
            let base = group.iter().map(|r| r.start()).min().unwrap_or_default();
            let end = group.iter().map(|r| r.end()).max().unwrap_or_default();
            let mut module = ModuleInfo::new(&name, base, end.as_u64() - base.as_u64());

            for region in group {
                let mut flags = SectionFlags::empty();
                if region.protection().can_read() {
                    flags |= SectionFlags::MEM_READ;
                }
                if region.is_executable() {
                    flags |= SectionFlags::CNT_CODE | SectionFlags::MEM_EXECUTE;
                } else {
                    flags |= SectionFlags::CNT_INITIALIZED_DATA;
                }
                if region.is_writable() {
                    flags |= SectionFlags::MEM_WRITE;
                }
                module.sections.push(SectionInfo::new(
                    &region.protection().to_string(),
                    region.start().as_u64() - base.as_u64(),
                    region.size(),
                    flags,
                ));
            }
            map.add(module);
        }
        map
    }

    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    /// The first module registered, conventionally the main executable.
    pub fn primary(&self) -> Option<&ModuleInfo> {
        self.modules.first()
    }

    pub fn find(&self, addr: Address) -> Option<&ModuleInfo> {
        self.modules.iter().find(|m| m.contains(addr))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ModuleInfo> {
        self.modules.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }
}
