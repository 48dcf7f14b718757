// Thu Oct 15 2026 - Alex

use crate::config::AnalysisConfig;
use crate::memory::Address;
use crate::validation::PointerValidator;
use serde::Serialize;
use std::fmt;

/// Slots fetched per bulk read while walking a table.
const SLOT_CHUNK: usize = 64;

/// Outcome of validating the first word of an object as a vtable pointer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VTableInfo {
    pub object: Address,
    /// The candidate table address, when the object's first word was readable.
    pub address: Option<Address>,
    pub is_vtable: bool,
    pub slot_count: usize,
    pub confidence: f64,
    /// Accepted slot targets, in table order.
    pub slots: Vec<Address>,
}

impl VTableInfo {
    fn rejected(object: Address, address: Option<Address>, confidence: f64) -> Self {
        Self {
            object,
            address,
            is_vtable: false,
            slot_count: 0,
            confidence,
            slots: Vec::new(),
        }
    }
}

impl fmt::Display for VTableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            Some(address) if self.is_vtable => {
                writeln!(f, "VTable for object {} @ {}", self.object, address)?;
                writeln!(f, "  Slots: {} (confidence {:.2})", self.slot_count, self.confidence)?;
                for (index, slot) in self.slots.iter().enumerate() {
                    writeln!(f, "  [{}] {}", index, slot)?;
                }
                Ok(())
            }
            _ => writeln!(f, "No vtable at object {} (confidence {:.2})", self.object, self.confidence),
        }
    }
}

pub struct VTableDetector<'a> {
    validator: &'a PointerValidator,
    min_slots: usize,
    max_slots: usize,
}

impl<'a> VTableDetector<'a> {
    pub fn new(validator: &'a PointerValidator, config: &AnalysisConfig) -> Self {
        Self {
            validator,
            min_slots: config.min_vtable_slots,
            max_slots: config.max_vtable_slots,
        }
    }

    /// Reads the object's first word and validates it as a vtable pointer.
    pub fn analyze_vtable(&self, object: Address) -> VTableInfo {
        match self.validator.reader().try_read::<u64>(object) {
            Ok(first) => self.analyze_table(object, Address::new(first)),
            Err(e) => {
                log::trace!("vtable probe at {} failed: {}", object, e);
                VTableInfo::rejected(object, None, 0.0)
            }
        }
    }

    /// Validates `table` as the vtable of `object` without re-reading the
    /// object. Slots are accepted while non-null and inside a code section,
    /// up to the slot cap.
    pub fn analyze_table(&self, object: Address, table: Address) -> VTableInfo {
        if table.is_null() || !self.validator.is_in_code_section(table) {
            return VTableInfo::rejected(object, Some(table), 0.1);
        }

        let slots = self.walk_slots(table);
        let slot_count = slots.len();
        if slot_count < self.min_slots {
            return VTableInfo {
                slot_count,
                slots,
                ..VTableInfo::rejected(object, Some(table), 0.2)
            };
        }

        log::debug!("vtable {} for object {}: {} slots", table, object, slot_count);
        VTableInfo {
            object,
            address: Some(table),
            is_vtable: true,
            slot_count,
            confidence: slot_confidence(slot_count),
            slots,
        }
    }

    fn walk_slots(&self, table: Address) -> Vec<Address> {
        let mut slots = Vec::new();

        while slots.len() < self.max_slots {
            let want = SLOT_CHUNK.min(self.max_slots - slots.len());
            let Some(cursor) = table.checked_add((slots.len() * 8) as u64) else {
                break;
            };
            let words = self.read_words(cursor, want);
            let fetched = words.len();

            for value in words {
                let target = Address::new(value);
                if value == 0 || !self.validator.is_in_code_section(target) {
                    return slots;
                }
                slots.push(target);
            }
            if fetched < want {
                break;
            }
        }
        slots
    }

    /// Up to `count` words from `addr`. Falls back to word-by-word reads when
    /// the chunk spans an unreadable page, stopping at the first failure.
    fn read_words(&self, addr: Address, count: usize) -> Vec<u64> {
        let reader = self.validator.reader();
        if let Ok(snapshot) = reader.try_read_bytes(addr, count * 8) {
            return (0..count).filter_map(|i| snapshot.read::<u64>(i * 8)).collect();
        }

        let mut words = Vec::new();
        for i in 0..count {
            match reader.try_read::<u64>(addr + (i * 8) as u64) {
                Ok(word) => words.push(word),
                Err(_) => break,
            }
        }
        words
    }
}

/// Confidence bands for an accepted table, by slot count.
pub fn slot_confidence(slot_count: usize) -> f64 {
    match slot_count {
        n if n >= 100 => 0.95,
        n if n >= 50 => 0.9,
        n if n >= 20 => 0.85,
        n if n >= 10 => 0.8,
        n if n >= 5 => 0.75,
        _ => 0.70,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ImageMemory, Protection, SafeMemoryReader};
    use crate::module::{ModuleInfo, ModuleMap, SectionFlags, SectionInfo};
    use std::sync::Arc;

    const MODULE: u64 = 0x1_4000_0000;
    const TEXT: u64 = MODULE + 0x1000;
    const TEXT_TABLE: u64 = TEXT + 0x2000;
    const RDATA: u64 = MODULE + 0x5000;
    const OBJECT: u64 = 0x2000_0000;

    /// Places `table` at `home` (inside `.text` or `.rdata`) and an object
    /// whose first word points at it.
    fn validator_at(home: u64, table: &[u64]) -> PointerValidator {
        let words: Vec<u8> = table.iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut text = vec![0xCC; 0x5000];
        let mut rdata = vec![0u8; 0x1000];
        let (bytes, at) = if home >= RDATA {
            (&mut rdata, (home - RDATA) as usize)
        } else {
            (&mut text, (home - MODULE) as usize)
        };
        bytes[at..at + words.len()].copy_from_slice(&words);

        let mut image = ImageMemory::new();
        image.map(Address::new(MODULE), text, Protection::ReadExecute, "game.exe");
        image.map(Address::new(RDATA), rdata, Protection::Read, "game.exe");
        image.map(Address::new(OBJECT), home.to_le_bytes().to_vec(), Protection::ReadWrite, "heap");

        let module = ModuleInfo::new("game.exe", Address::new(MODULE), 0x6000)
            .with_section(SectionInfo::new(".text", 0x1000, 0x4000, SectionFlags::CNT_CODE | SectionFlags::MEM_EXECUTE))
            .with_section(SectionInfo::new(".rdata", 0x5000, 0x1000, SectionFlags::CNT_INITIALIZED_DATA | SectionFlags::MEM_READ));
        PointerValidator::new(
            SafeMemoryReader::new(Arc::new(image)),
            Arc::new(ModuleMap::new().with_module(module)),
            &AnalysisConfig::default(),
        )
    }

    fn validator(table: &[u64]) -> PointerValidator {
        validator_at(TEXT_TABLE, table)
    }

    #[test]
    fn test_counts_until_first_rejection() {
        let mut table: Vec<u64> = (0..12).map(|i| TEXT + i * 0x10).collect();
        table.push(0);
        table.push(TEXT);
        let v = validator(&table);
        let info = VTableDetector::new(&v, &AnalysisConfig::default()).analyze_vtable(Address::new(OBJECT));
        assert!(info.is_vtable);
        assert_eq!(info.slot_count, 12);
        assert_eq!(info.confidence, 0.8);
        assert_eq!(info.address, Some(Address::new(TEXT_TABLE)));
    }

    #[test]
    fn test_too_few_slots() {
        let v = validator(&[TEXT, TEXT + 8, OBJECT]);
        let info = VTableDetector::new(&v, &AnalysisConfig::default()).analyze_vtable(Address::new(OBJECT));
        assert!(!info.is_vtable);
        assert_eq!(info.slot_count, 2);
        assert_eq!(info.confidence, 0.2);
    }

    #[test]
    fn test_non_code_table_pointer() {
        let v = validator(&[TEXT; 8]);
        let detector = VTableDetector::new(&v, &AnalysisConfig::default());
        let info = detector.analyze_table(Address::new(OBJECT), Address::new(OBJECT));
        assert!(!info.is_vtable);
        assert_eq!(info.confidence, 0.1);
        assert_eq!(detector.analyze_vtable(Address::new(0x5000_0000)).confidence, 0.0);
    }

    #[test]
    fn test_table_in_read_only_data_is_rejected() {
        let v = validator_at(RDATA, &[TEXT, TEXT + 0x10, TEXT + 0x20, TEXT + 0x30, TEXT + 0x40, TEXT + 0x50]);
        assert!(v.is_vtable_home(Address::new(RDATA)));
        let info = VTableDetector::new(&v, &AnalysisConfig::default()).analyze_vtable(Address::new(OBJECT));
        assert!(!info.is_vtable);
        assert_eq!(info.slot_count, 0);
        assert_eq!(info.confidence, 0.1);
        assert_eq!(info.address, Some(Address::new(RDATA)));
    }

    #[test]
    fn test_slot_cap() {
        let table = vec![TEXT; 0x1000 / 8];
        let v = validator(&table);
        let mut config = AnalysisConfig::default();
        config.max_vtable_slots = 100;
        let info = VTableDetector::new(&v, &config).analyze_vtable(Address::new(OBJECT));
        assert_eq!(info.slot_count, 100);
        assert_eq!(info.confidence, 0.95);
    }

    #[test]
    fn test_table_running_into_fill() {
        // Every table slot is valid; the int3 fill after it is not.
        let v = validator(&vec![TEXT; 300]);
        let info = VTableDetector::new(&v, &AnalysisConfig::default()).analyze_vtable(Address::new(OBJECT));
        assert_eq!(info.slot_count, 300);
    }

    #[test]
    fn test_confidence_bands() {
        assert_eq!(slot_confidence(3), 0.70);
        assert_eq!(slot_confidence(5), 0.75);
        assert_eq!(slot_confidence(20), 0.85);
        assert_eq!(slot_confidence(50), 0.9);
        assert_eq!(slot_confidence(500), 0.95);
    }
}
