// Thu Oct 15 2026 - Alex

use crate::memory::{Address, AddressSpace, MemoryError, MemoryRange, MemoryRegion, Protection};
use ahash::AHashSet;
use parking_lot::{Mutex, RwLock};

const PAGE_SHIFT: u32 = 12;

/// Read-only view of a live process. Never writes to the target.
pub struct ProcessMemory {
    pid: i32,
    regions: RwLock<Vec<MemoryRegion>>,
    /// Pages that stayed unmapped after a reload; cleared by `refresh_regions`.
    unmapped_pages: Mutex<AHashSet<u64>>,
    #[cfg(target_os = "macos")]
    task: macos::MachPort,
}

impl ProcessMemory {
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Last observed region list.
    pub fn regions(&self) -> Vec<MemoryRegion> {
        self.regions.read().clone()
    }

    /// Re-reads the target's mappings and forgets every remembered miss.
    pub fn refresh_regions(&self) -> Result<(), MemoryError> {
        self.reload_regions()?;
        self.unmapped_pages.lock().clear();
        Ok(())
    }

    fn cached_region(&self, addr: Address) -> Option<MemoryRegion> {
        self.regions.read().iter().find(|r| r.contains(addr)).cloned()
    }
}

impl AddressSpace for ProcessMemory {
    fn query_region(&self, addr: Address) -> Result<MemoryRegion, MemoryError> {
        if let Some(region) = self.cached_region(addr) {
            return Ok(region);
        }
        let page = addr.as_u64() >> PAGE_SHIFT;
        if self.unmapped_pages.lock().contains(&page) {
            return Err(MemoryError::RegionNotFound(addr.as_u64()));
        }
        // Mappings change while the target runs; reload once per unseen page.
        self.reload_regions()?;
        match self.cached_region(addr) {
            Some(region) => Ok(region),
            None => {
                self.unmapped_pages.lock().insert(page);
                Err(MemoryError::RegionNotFound(addr.as_u64()))
            }
        }
    }

    fn read(&self, addr: Address, len: usize) -> Result<Vec<u8>, MemoryError> {
        self.read_memory(addr.as_u64(), len)
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    impl ProcessMemory {
        pub fn attach(pid: i32) -> Result<Self, MemoryError> {
            let regions = parse_maps(pid)?;
            log::debug!("attached to pid {} with {} regions", pid, regions.len());
            Ok(Self {
                pid,
                regions: RwLock::new(regions),
                unmapped_pages: Mutex::new(AHashSet::new()),
            })
        }

        pub(super) fn reload_regions(&self) -> Result<(), MemoryError> {
            let regions = parse_maps(self.pid)?;
            *self.regions.write() = regions;
            Ok(())
        }

        pub(super) fn read_memory(&self, address: u64, size: usize) -> Result<Vec<u8>, MemoryError> {
            let mut buffer = vec![0u8; size];
            let local = libc::iovec {
                iov_base: buffer.as_mut_ptr() as *mut libc::c_void,
                iov_len: size,
            };
            let remote = libc::iovec {
                iov_base: address as *mut libc::c_void,
                iov_len: size,
            };

            let copied = unsafe { libc::process_vm_readv(self.pid, &local, 1, &remote, 1, 0) };
            if copied < 0 {
                return Err(MemoryError::ReadFailed(address));
            }
            if copied as usize != size {
                return Err(MemoryError::PartialRead {
                    address,
                    wanted: size,
                    got: copied as usize,
                });
            }
            Ok(buffer)
        }
    }

    /// Parses `/proc/<pid>/maps`: `START-END perms offset dev inode [path]`.
    fn parse_maps(pid: i32) -> Result<Vec<MemoryRegion>, MemoryError> {
        let path = format!("/proc/{}/maps", pid);
        let file = File::open(&path)
            .map_err(|e| MemoryError::ProcessNotFound(format!("{}: {}", path, e)))?;

        let mut regions = Vec::new();
        for line in BufReader::new(file).lines() {
            if let Some(region) = parse_maps_line(&line?) {
                regions.push(region);
            }
        }
        Ok(regions)
    }

    pub(super) fn parse_maps_line(line: &str) -> Option<MemoryRegion> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let (start, end) = parts.first()?.split_once('-')?;
        let start = u64::from_str_radix(start, 16).ok()?;
        let end = u64::from_str_radix(end, 16).ok()?;
        let protection = Protection::from_perms(parts.get(1).copied().unwrap_or(""));
        let name = if parts.len() > 5 { parts[5..].join(" ") } else { String::new() };

        let range = MemoryRange::new(Address::new(start), Address::new(end));
        Some(MemoryRegion::new(range, protection, name))
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use super::*;
    use libc::{c_int, c_uint};

    pub type MachPort = c_uint;
    type KernReturn = c_int;

    const KERN_SUCCESS: KernReturn = 0;
    const VM_REGION_BASIC_INFO_64: c_int = 9;
    const VM_REGION_BASIC_INFO_COUNT_64: u32 = 9;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    struct VmRegionBasicInfo64 {
        protection: c_int,
        max_protection: c_int,
        inheritance: c_uint,
        shared: c_uint,
        reserved: c_uint,
        offset: u64,
        behavior: c_int,
        user_wired_count: u16,
    }

    extern "C" {
        fn mach_task_self() -> MachPort;
        fn task_for_pid(target_task: MachPort, pid: c_int, task: *mut MachPort) -> KernReturn;
        fn vm_read_overwrite(
            target_task: MachPort,
            address: u64,
            size: u64,
            data: u64,
            out_size: *mut u64,
        ) -> KernReturn;
        fn mach_vm_region(
            target_task: MachPort,
            address: *mut u64,
            size: *mut u64,
            flavor: c_int,
            info: *mut c_int,
            info_count: *mut u32,
            object_name: *mut MachPort,
        ) -> KernReturn;
    }

    impl ProcessMemory {
        pub fn attach(pid: i32) -> Result<Self, MemoryError> {
            let mut task: MachPort = 0;
            let result = unsafe { task_for_pid(mach_task_self(), pid, &mut task) };
            if result != KERN_SUCCESS {
                return Err(MemoryError::ProcessNotFound(format!(
                    "Failed to attach to process {} (error {}). Root privileges may be required.",
                    pid, result
                )));
            }
            let memory = Self {
                pid,
                regions: RwLock::new(Vec::new()),
                unmapped_pages: Mutex::new(AHashSet::new()),
                task,
            };
            memory.reload_regions()?;
            Ok(memory)
        }

        pub(super) fn reload_regions(&self) -> Result<(), MemoryError> {
            let mut regions = Vec::new();
            let mut address: u64 = 0;

            loop {
                let mut size: u64 = 0;
                let mut info = VmRegionBasicInfo64::default();
                let mut info_count = VM_REGION_BASIC_INFO_COUNT_64;
                let mut object_name: MachPort = 0;

                let result = unsafe {
                    mach_vm_region(
                        self.task,
                        &mut address,
                        &mut size,
                        VM_REGION_BASIC_INFO_64,
                        &mut info as *mut _ as *mut c_int,
                        &mut info_count,
                        &mut object_name,
                    )
                };
                if result != KERN_SUCCESS || size == 0 {
                    break;
                }

                let protection = Protection::from_flags(info.protection as u32);
                let range = MemoryRange::from_start_size(Address::new(address), size);
                regions.push(MemoryRegion::new(range, protection, format!("region_{:016x}", address)));

                address = match address.checked_add(size) {
                    Some(next) => next,
                    None => break,
                };
            }

            *self.regions.write() = regions;
            Ok(())
        }

        pub(super) fn read_memory(&self, address: u64, size: usize) -> Result<Vec<u8>, MemoryError> {
            let mut buffer = vec![0u8; size];
            let mut out_size: u64 = 0;
            let result = unsafe {
                vm_read_overwrite(
                    self.task,
                    address,
                    size as u64,
                    buffer.as_mut_ptr() as u64,
                    &mut out_size,
                )
            };
            if result != KERN_SUCCESS {
                return Err(MemoryError::ReadFailed(address));
            }
            if out_size as usize != size {
                return Err(MemoryError::PartialRead {
                    address,
                    wanted: size,
                    got: out_size as usize,
                });
            }
            Ok(buffer)
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
impl ProcessMemory {
    pub fn attach(_pid: i32) -> Result<Self, MemoryError> {
        Err(MemoryError::NotSupported("live process access on this platform".to_string()))
    }

    fn reload_regions(&self) -> Result<(), MemoryError> {
        Err(MemoryError::NotSupported("live process access on this platform".to_string()))
    }

    fn read_memory(&self, address: u64, _size: usize) -> Result<Vec<u8>, MemoryError> {
        Err(MemoryError::ReadFailed(address))
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::linux::parse_maps_line;
    use super::*;

    #[test]
    fn test_parse_maps_line() {
        let region = parse_maps_line("7f1234000000-7f1234001000 r-xp 00000000 08:01 1234 /usr/lib/libfoo.so").unwrap();
        assert_eq!(region.start(), Address::new(0x7f1234000000));
        assert_eq!(region.size(), 0x1000);
        assert_eq!(region.protection(), Protection::ReadExecute);
        assert_eq!(region.name(), "/usr/lib/libfoo.so");

        let anon = parse_maps_line("00400000-00401000 rw-p 00000000 00:00 0").unwrap();
        assert_eq!(anon.name(), "");
        assert!(parse_maps_line("garbage").is_none());
    }

    #[test]
    fn test_attach_self_and_read() {
        let memory = ProcessMemory::attach(std::process::id() as i32).unwrap();
        let value: u64 = 0x1122334455667788;
        let addr = Address::new(&value as *const u64 as u64);
        let region = memory.query_region(addr).unwrap();
        assert!(region.is_readable());
        // Sandboxes may deny process_vm_readv even on ourselves.
        if let Ok(bytes) = memory.read(addr, 8) {
            assert_eq!(bytes, value.to_le_bytes().to_vec());
        }
    }

    #[test]
    fn test_unmapped_page_is_remembered_until_refresh() {
        let memory = ProcessMemory::attach(std::process::id() as i32).unwrap();
        let null_page = Address::new(0x10);

        assert!(matches!(memory.query_region(null_page), Err(MemoryError::RegionNotFound(0x10))));
        assert!(memory.unmapped_pages.lock().contains(&0));

        // Second miss on the same page is answered without reloading.
        assert!(matches!(memory.query_region(Address::new(0x800)), Err(MemoryError::RegionNotFound(0x800))));
        assert_eq!(memory.unmapped_pages.lock().len(), 1);

        memory.refresh_regions().unwrap();
        assert!(memory.unmapped_pages.lock().is_empty());
    }
}
