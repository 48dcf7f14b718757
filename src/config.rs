// Thu Oct 15 2026 - Alex

use crate::memory::MAX_BULK_READ;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MAX_VTABLE_SLOTS: usize = 500;
pub const MAX_STRING_PROBE: usize = 512;
pub const MAX_NESTED_DEPTH: usize = 3;
pub const MAX_NESTED_SIZE: u64 = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub max_bulk_read: usize,
    pub max_vtable_slots: usize,
    pub min_vtable_slots: usize,
    pub max_string_length: usize,
    pub nested: bool,
    pub max_nested_depth: usize,
    pub max_nested_size: u64,
    /// Bytes of a region searched for array candidates.
    pub max_array_scan: usize,
    pub min_user_address: u64,
    pub max_user_address: u64,
    pub high_confidence_threshold: f64,
    pub pattern_retention_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_bulk_read: MAX_BULK_READ,
            max_vtable_slots: MAX_VTABLE_SLOTS,
            min_vtable_slots: 3,
            max_string_length: MAX_STRING_PROBE,
            nested: false,
            max_nested_depth: MAX_NESTED_DEPTH,
            max_nested_size: MAX_NESTED_SIZE,
            max_array_scan: 4096,
            min_user_address: 0x10000,
            max_user_address: 0x7FFF_FFFF_FFFF,
            high_confidence_threshold: 0.7,
            pattern_retention_threshold: 0.5,
        }
    }
}

impl AnalysisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nested(mut self, nested: bool) -> Self {
        self.nested = nested;
        self
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read {}: {}", path.as_ref().display(), e))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| format!("Failed to parse {}: {}", path.as_ref().display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_bulk_read == 0 || self.max_bulk_read > MAX_BULK_READ {
            return Err(format!("max_bulk_read must be in 1..={}", MAX_BULK_READ));
        }
        if self.max_vtable_slots == 0 || self.max_vtable_slots > MAX_VTABLE_SLOTS {
            return Err(format!("max_vtable_slots must be in 1..={}", MAX_VTABLE_SLOTS));
        }
        if self.min_vtable_slots < 3 {
            return Err("min_vtable_slots must be at least 3".to_string());
        }
        if self.max_string_length == 0 || self.max_string_length > MAX_STRING_PROBE {
            return Err(format!("max_string_length must be in 1..={}", MAX_STRING_PROBE));
        }
        if self.max_nested_depth > MAX_NESTED_DEPTH {
            return Err(format!("max_nested_depth must be at most {}", MAX_NESTED_DEPTH));
        }
        if self.max_nested_size > MAX_NESTED_SIZE {
            return Err(format!("max_nested_size must be at most {}", MAX_NESTED_SIZE));
        }
        if self.max_array_scan > self.max_bulk_read {
            return Err("max_array_scan must not exceed max_bulk_read".to_string());
        }
        if self.min_user_address >= self.max_user_address {
            return Err("min_user_address must be below max_user_address".to_string());
        }
        for (name, value) in [
            ("high_confidence_threshold", self.high_confidence_threshold),
            ("pattern_retention_threshold", self.pattern_retention_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be between 0.0 and 1.0", name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn test_hard_caps_enforced() {
        let mut config = AnalysisConfig::default();
        config.max_vtable_slots = 501;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.max_nested_depth = 4;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.max_bulk_read = MAX_BULK_READ + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "nested": true, "max_nested_depth": 2 }}"#).unwrap();
        let config = AnalysisConfig::load(file.path()).unwrap();
        assert!(config.nested);
        assert_eq!(config.max_nested_depth, 2);
        assert_eq!(config.max_vtable_slots, MAX_VTABLE_SLOTS);
    }
}
