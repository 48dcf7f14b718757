// Fri Oct 16 2026 - Alex

use crate::config::AnalysisConfig;
use crate::context::AnalysisContext;
use crate::memory::{Address, ByteSnapshot, SafeMemoryReader};
use crate::structure::inference::{fill_run, MIN_PADDING_RUN};
use crate::structure::interpretation::DEBUG_FILL_BYTES;
use serde::Serialize;

/// Element widths tried when looking for arrays.
pub const ARRAY_STRIDES: [usize; 8] = [4, 8, 16, 24, 32, 48, 64, 128];
pub const MIN_ARRAY_REPEATS: usize = 3;
const TRIAL_OFFSET_STEP: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaddingRegion {
    pub offset: usize,
    pub size: usize,
    pub byte: u8,
    pub is_zero_padding: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayPattern {
    pub offset: usize,
    pub stride: usize,
    pub count: usize,
    pub confidence: f64,
}

impl ArrayPattern {
    pub fn end(&self) -> usize {
        self.offset + self.stride * self.count
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatternReport {
    pub base: Address,
    pub size: usize,
    pub padding: Vec<PaddingRegion>,
    pub arrays: Vec<ArrayPattern>,
}

impl PatternReport {
    pub fn padding_bytes(&self) -> usize {
        self.padding.iter().map(|p| p.size).sum()
    }
}

pub struct PatternRecognizer {
    reader: SafeMemoryReader,
    max_array_scan: usize,
    retention_threshold: f64,
}

impl PatternRecognizer {
    pub fn new(reader: SafeMemoryReader, config: &AnalysisConfig) -> Self {
        Self {
            reader,
            max_array_scan: config.max_array_scan,
            retention_threshold: config.pattern_retention_threshold,
        }
    }

    pub fn from_context(ctx: &AnalysisContext) -> Self {
        Self::new(ctx.reader().clone(), ctx.config())
    }

    /// Snapshots `[base, base + size)` and scans it. An unreadable range
    /// yields an empty report.
    pub fn detect_patterns(&self, base: Address, size: usize) -> PatternReport {
        match self.reader.try_read_bytes(base, size) {
            Ok(snapshot) => self.detect_in(&snapshot),
            Err(e) => {
                log::debug!("pattern scan skipped at {}: {}", base, e);
                PatternReport {
                    base,
                    size,
                    ..PatternReport::default()
                }
            }
        }
    }

    pub fn detect_in(&self, snapshot: &ByteSnapshot) -> PatternReport {
        let bytes = snapshot.bytes();
        let window = &bytes[..bytes.len().min(self.max_array_scan)];
        PatternReport {
            base: snapshot.base(),
            size: bytes.len(),
            padding: find_padding(bytes),
            arrays: self.find_arrays(window),
        }
    }

    fn find_arrays(&self, bytes: &[u8]) -> Vec<ArrayPattern> {
        let mut found: Vec<ArrayPattern> = Vec::new();

        for stride in ARRAY_STRIDES {
            let mut offset = 0;
            while offset + MIN_ARRAY_REPEATS * stride <= bytes.len() {
                let count = count_similar(bytes, offset, stride);
                if count < MIN_ARRAY_REPEATS {
                    offset += TRIAL_OFFSET_STEP;
                    continue;
                }

                let confidence = array_confidence(count, stride, bytes.len());
                if confidence > self.retention_threshold {
                    log::trace!("array at +0x{:x}: {} x {} bytes ({:.2})", offset, count, stride, confidence);
                    found.push(ArrayPattern {
                        offset,
                        stride,
                        count,
                        confidence,
                    });
                }
                let end = offset + count * stride;
                offset = end.div_ceil(TRIAL_OFFSET_STEP) * TRIAL_OFFSET_STEP;
            }
        }

        found.sort_by_key(|a| (a.offset, a.stride));
        found
    }
}

/// Maximal runs of one padding byte value, at least [`MIN_PADDING_RUN`] long.
pub fn find_padding(bytes: &[u8]) -> Vec<PaddingRegion> {
    let mut regions = Vec::new();
    let mut start = 0;

    while start < bytes.len() {
        let byte = bytes[start];
        let len = bytes[start..].iter().take_while(|&&b| b == byte).count();
        if len >= MIN_PADDING_RUN && (byte == 0 || DEBUG_FILL_BYTES.contains(&byte)) {
            regions.push(PaddingRegion {
                offset: start,
                size: len,
                byte,
                is_zero_padding: byte == 0,
            });
        }
        start += len;
    }
    regions
}

/// Consecutive elements at `offset` structurally similar to the first one.
/// A first element that is pure padding fill never starts an array.
fn count_similar(bytes: &[u8], offset: usize, stride: usize) -> usize {
    let reference = &bytes[offset..offset + stride];
    if fill_run(reference) == reference.len() {
        return 0;
    }
    let reference_sig = signature(reference);

    let mut count = 1;
    loop {
        let start = offset + count * stride;
        let Some(element) = bytes.get(start..start + stride) else {
            break;
        };
        if !similar(&reference_sig, &signature(element)) {
            break;
        }
        count += 1;
    }
    count
}

/// Zero/non-zero class of each sub-word. Sub-words are 8 bytes, or the whole
/// element when it is narrower.
fn signature(element: &[u8]) -> Vec<bool> {
    let word = element.len().min(8);
    element.chunks(word).map(|w| w.iter().any(|&b| b != 0)).collect()
}

fn similar(a: &[bool], b: &[bool]) -> bool {
    let mismatches = a.iter().zip(b).filter(|(x, y)| x != y).count();
    mismatches * 4 <= a.len()
}

/// Repeat band times coverage band times stride bonus, capped at 0.95.
/// Non-decreasing in `count` for a fixed stride and region size.
pub fn array_confidence(count: usize, stride: usize, region_len: usize) -> f64 {
    let repeats: f64 = match count {
        c if c >= 20 => 0.9,
        c if c >= 10 => 0.8,
        c if c >= 5 => 0.7,
        c if c >= 3 => 0.6,
        _ => 0.0,
    };

    let coverage = if region_len == 0 {
        0.0
    } else {
        (count * stride) as f64 / region_len as f64
    };
    let coverage_factor: f64 = match coverage {
        c if c >= 0.75 => 1.0,
        c if c >= 0.5 => 0.95,
        c if c >= 0.25 => 0.9,
        _ => 0.8,
    };

    let stride_bonus: f64 = if matches!(stride, 8 | 16 | 32 | 64) { 1.1 } else { 1.0 };

    (repeats * coverage_factor * stride_bonus).min(0.95)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ImageMemory, Protection};
    use std::sync::Arc;

    fn recognizer() -> PatternRecognizer {
        PatternRecognizer::new(SafeMemoryReader::new(Arc::new(ImageMemory::new())), &AnalysisConfig::default())
    }

    fn snapshot(bytes: Vec<u8>) -> ByteSnapshot {
        ByteSnapshot::new(Address::new(0x10000), bytes)
    }

    #[test]
    fn test_padding_runs() {
        let mut bytes = vec![1u8, 0, 0, 0, 0, 0, 2];
        bytes.extend([0xCD; 6]);
        bytes.extend([0xFD, 0xFD, 3, 0xAA, 0xAA, 0xAA, 0xAA]);
        let regions = find_padding(&bytes);
        assert_eq!(
            regions,
            vec![
                PaddingRegion { offset: 1, size: 5, byte: 0, is_zero_padding: true },
                PaddingRegion { offset: 7, size: 6, byte: 0xCD, is_zero_padding: false },
            ]
        );
    }

    #[test]
    fn test_strided_pointer_array() {
        let mut bytes = Vec::new();
        for i in 0..12u64 {
            bytes.extend((0x2000_0000 + i * 0x40).to_le_bytes());
            bytes.extend([0u8; 8]);
        }
        let report = recognizer().detect_in(&snapshot(bytes));
        let array = report.arrays.iter().find(|a| a.stride == 16).unwrap();
        assert_eq!(array.offset, 0);
        assert_eq!(array.count, 12);
        assert!((array.confidence - 0.88).abs() < 1e-9);
        assert!(report.arrays.iter().all(|a| a.stride >= 16));
    }

    #[test]
    fn test_zero_region_has_no_arrays() {
        let report = recognizer().detect_in(&snapshot(vec![0; 256]));
        assert!(report.arrays.is_empty());
        assert_eq!(report.padding.len(), 1);
        assert_eq!(report.padding_bytes(), 256);
    }

    #[test]
    fn test_short_runs_discarded() {
        let mut bytes = Vec::new();
        for _ in 0..2 {
            bytes.extend([1u8; 8]);
            bytes.extend([0u8; 8]);
        }
        bytes.extend([0u8; 64]);
        let report = recognizer().detect_in(&snapshot(bytes));
        assert!(report.arrays.iter().all(|a| a.stride != 16));
    }

    #[test]
    fn test_confidence_bands() {
        assert_eq!(array_confidence(20, 16, 320), 0.95);
        assert!((array_confidence(5, 24, 120) - 0.7).abs() < 1e-9);
        assert!((array_confidence(3, 24, 1000) - 0.48).abs() < 1e-9);
    }

    #[test]
    fn test_unreadable_range_gives_empty_report() {
        let report = recognizer().detect_patterns(Address::new(0x10000), 64);
        assert!(report.padding.is_empty() && report.arrays.is_empty());
    }

    #[test]
    fn test_detect_patterns_reads_range() {
        let mut image = ImageMemory::new();
        image.map(Address::new(0x10000), vec![0xDD; 64], Protection::ReadWrite, "heap");
        let recognizer = PatternRecognizer::new(SafeMemoryReader::new(Arc::new(image)), &AnalysisConfig::default());
        let report = recognizer.detect_patterns(Address::new(0x10000), 64);
        assert_eq!(report.padding, vec![PaddingRegion { offset: 0, size: 64, byte: 0xDD, is_zero_padding: false }]);
        assert!(report.arrays.is_empty());
    }
}
