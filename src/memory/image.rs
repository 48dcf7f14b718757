// Thu Oct 15 2026 - Alex

use crate::memory::{Address, AddressSpace, MemoryError, MemoryRange, MemoryRegion, Protection, RegionState};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

enum Backing {
    Owned(Vec<u8>),
    Mapped(Mmap),
    Empty,
}

impl Backing {
    fn as_slice(&self) -> &[u8] {
        match self {
            Backing::Owned(bytes) => bytes,
            Backing::Mapped(mmap) => mmap.as_ref(),
            Backing::Empty => &[],
        }
    }
}

struct ImageEntry {
    region: MemoryRegion,
    backing: Backing,
}

/// Address space assembled from local buffers: raw dumps, captured regions,
/// or synthetic layouts. Regions are not merged; a span crossing two
/// entries is treated as crossing two regions.
#[derive(Default)]
pub struct ImageMemory {
    entries: Vec<ImageEntry>,
}

impl ImageMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `bytes` as a committed region at `base`.
    pub fn map(&mut self, base: Address, bytes: Vec<u8>, protection: Protection, name: &str) -> &mut Self {
        let range = MemoryRange::from_start_size(base, bytes.len() as u64);
        let region = MemoryRegion::new(range, protection, name.to_string());
        self.insert(ImageEntry {
            region,
            backing: Backing::Owned(bytes),
        })
    }

    /// Maps a raw dump file read-only at `base` without copying it.
    pub fn map_file<P: AsRef<Path>>(&mut self, path: P, base: Address, protection: Protection) -> Result<&mut Self, MemoryError> {
        let name = path.as_ref().display().to_string();
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file) }?;
        let range = MemoryRange::from_start_size(base, mmap.len() as u64);
        let region = MemoryRegion::new(range, protection, name);
        log::debug!("mapped dump {} at {}", region.name(), base);
        Ok(self.insert(ImageEntry {
            region,
            backing: Backing::Mapped(mmap),
        }))
    }

    /// Address-space reservation without committed pages.
    pub fn reserve(&mut self, base: Address, size: u64, name: &str) -> &mut Self {
        let range = MemoryRange::from_start_size(base, size);
        let region = MemoryRegion::new(range, Protection::None, name.to_string())
            .with_state(RegionState::Reserved);
        self.insert(ImageEntry {
            region,
            backing: Backing::Empty,
        })
    }

    /// Committed read-write span flagged as a guard page.
    pub fn guard(&mut self, base: Address, size: u64, name: &str) -> &mut Self {
        let range = MemoryRange::from_start_size(base, size);
        let region = MemoryRegion::new(range, Protection::ReadWrite, name.to_string()).with_guard(true);
        self.insert(ImageEntry {
            region,
            backing: Backing::Empty,
        })
    }

    pub fn regions(&self) -> Vec<MemoryRegion> {
        self.entries.iter().map(|e| e.region.clone()).collect()
    }

    fn insert(&mut self, entry: ImageEntry) -> &mut Self {
        let pos = self
            .entries
            .partition_point(|e| e.region.start() <= entry.region.start());
        self.entries.insert(pos, entry);
        self
    }

    fn entry_for(&self, addr: Address) -> Option<&ImageEntry> {
        self.entries.iter().find(|e| e.region.contains(addr))
    }
}

impl AddressSpace for ImageMemory {
    fn query_region(&self, addr: Address) -> Result<MemoryRegion, MemoryError> {
        self.entry_for(addr)
            .map(|e| e.region.clone())
            .ok_or(MemoryError::RegionNotFound(addr.as_u64()))
    }

    fn read(&self, addr: Address, len: usize) -> Result<Vec<u8>, MemoryError> {
        let entry = self
            .entry_for(addr)
            .ok_or(MemoryError::RegionNotFound(addr.as_u64()))?;
        if !entry.region.is_readable() || !entry.region.range().contains_span(addr, len as u64) {
            return Err(MemoryError::ReadFailed(addr.as_u64()));
        }
        let data = entry.backing.as_slice();
        let start = (addr.as_u64() - entry.region.start().as_u64()) as usize;
        let end = start + len;
        if end > data.len() {
            return Err(MemoryError::ReadFailed(addr.as_u64()));
        }
        Ok(data[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_within_mapping() {
        let mut image = ImageMemory::new();
        image.map(Address::new(0x1000), (0u8..16).collect(), Protection::Read, "a");
        assert_eq!(image.read(Address::new(0x1004), 4).unwrap(), vec![4, 5, 6, 7]);
        assert!(image.read(Address::new(0x100c), 8).is_err());
        assert!(image.read(Address::new(0x2000), 1).is_err());
    }

    #[test]
    fn test_regions_are_sorted() {
        let mut image = ImageMemory::new();
        image.map(Address::new(0x3000), vec![0; 16], Protection::Read, "b");
        image.map(Address::new(0x1000), vec![0; 16], Protection::Read, "a");
        let names: Vec<_> = image.regions().iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_map_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let mut image = ImageMemory::new();
        image.map_file(file.path(), Address::new(0x5000), Protection::Read).unwrap();
        assert_eq!(image.read(Address::new(0x5002), 2).unwrap(), vec![3, 4]);
        assert!(image.query_region(Address::new(0x5007)).unwrap().is_readable());
    }
}
