// Thu Oct 15 2026 - Alex

use crate::config::AnalysisConfig;
use crate::memory::{Address, ByteSnapshot};
use crate::structure::interpretation::{
    is_debug_fill, pointer_reading, read_c_string, ByteInterpretations, StringReading, DEBUG_FILL_BYTES,
};
use crate::validation::{PointerKind, PointerValidator};
use serde::Serialize;
use std::fmt;

/// Minimum identical-fill run reported as padding.
pub const MIN_PADDING_RUN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FieldKind {
    Unknown,
    Padding,
    VTablePointer,
    CodePointer,
    StringPointer,
    Pointer,
    Float,
    Int32,
    Int16,
    Bool,
    Enum,
}

impl FieldKind {
    pub fn is_pointer(self) -> bool {
        matches!(
            self,
            FieldKind::VTablePointer | FieldKind::CodePointer | FieldKind::StringPointer | FieldKind::Pointer
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            FieldKind::Int32 | FieldKind::Int16 | FieldKind::Bool | FieldKind::Enum
        )
    }

    /// Step used when a guess carries no width of its own.
    pub fn default_size(self) -> usize {
        match self {
            FieldKind::VTablePointer
            | FieldKind::CodePointer
            | FieldKind::StringPointer
            | FieldKind::Pointer => 8,
            FieldKind::Float | FieldKind::Int32 | FieldKind::Enum => 4,
            FieldKind::Int16 => 2,
            FieldKind::Bool | FieldKind::Padding | FieldKind::Unknown => 1,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Unknown => "unknown",
            FieldKind::Padding => "padding",
            FieldKind::VTablePointer => "vtable*",
            FieldKind::CodePointer => "code*",
            FieldKind::StringPointer => "char*",
            FieldKind::Pointer => "void*",
            FieldKind::Float => "float",
            FieldKind::Int32 => "int32",
            FieldKind::Int16 => "int16",
            FieldKind::Bool => "bool",
            FieldKind::Enum => "enum",
        };
        write!(f, "{}", name)
    }
}

/// Result of the single-guess ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeGuess {
    pub kind: FieldKind,
    pub size: usize,
    pub confidence: f64,
    pub display: String,
    pub notes: Option<String>,
    pub pointer_target: Option<Address>,
}

impl TypeGuess {
    fn new(kind: FieldKind, size: usize, confidence: f64, display: String) -> Self {
        Self {
            kind,
            size,
            confidence,
            display,
            notes: None,
            pointer_target: None,
        }
    }

    fn with_notes(mut self, notes: String) -> Self {
        self.notes = Some(notes);
        self
    }

    fn unknown(byte: Option<u8>) -> Self {
        let display = byte.map(|b| format!("0x{:02x}", b)).unwrap_or_default();
        Self::new(FieldKind::Unknown, 1, 0.1, display)
    }
}

/// Derives readings of target bytes.
///
/// [`get_interpretations`](Self::get_interpretations) is the primary path: it
/// reports every reading the bytes support. [`infer`](Self::infer) collapses
/// that into one ranked guess for stepping through a struct; it is lossy and
/// its confidences are fixed heuristics.
pub struct TypeInference<'a> {
    validator: &'a PointerValidator,
    max_string_length: usize,
}

impl<'a> TypeInference<'a> {
    pub fn new(validator: &'a PointerValidator, config: &AnalysisConfig) -> Self {
        Self {
            validator,
            max_string_length: config.max_string_length,
        }
    }

    /// Takes one snapshot of up to `max_size` (1..=8) bytes and fills every
    /// reading the width supports. Narrows the window when the full width is
    /// unreadable; returns an empty set when nothing is.
    pub fn get_interpretations(&self, addr: Address, max_size: usize) -> ByteInterpretations {
        let max_size = max_size.clamp(1, 8);
        let snapshot = [8usize, 4, 2, 1]
            .into_iter()
            .filter(|&width| width <= max_size)
            .find_map(|width| self.validator.reader().try_read_bytes(addr, width).ok());

        match snapshot {
            Some(snapshot) => self.interpret(&snapshot, 0, max_size),
            None => ByteInterpretations {
                address: addr,
                ..ByteInterpretations::default()
            },
        }
    }

    /// Interpretations of a window inside an existing snapshot.
    pub fn interpret(&self, snapshot: &ByteSnapshot, offset: usize, max_size: usize) -> ByteInterpretations {
        let window = snapshot.slice(offset, max_size.clamp(1, 8));
        let mut interp = ByteInterpretations::from_bytes(snapshot.address_of(offset), window);

        if let Some(value) = interp.uint64 {
            let reading = pointer_reading(self.validator, value);
            if reading.is_valid && reading.kind != PointerKind::ValidCode {
                interp.string = self.probe_string(reading.value);
            }
            interp.pointer = Some(reading);
        }
        interp
    }

    /// Single best guess for the bytes at `offset` of `snapshot`.
    pub fn infer(&self, snapshot: &ByteSnapshot, offset: usize) -> TypeGuess {
        let rest = snapshot.slice(offset, usize::MAX);
        if rest.is_empty() {
            return TypeGuess::unknown(None);
        }
        let window = &rest[..rest.len().min(8)];
        let addr = snapshot.address_of(offset);

        let run = fill_run(rest);
        if run >= MIN_PADDING_RUN {
            let byte = rest[0];
            let (confidence, what) = if byte == 0 { (0.6, "zero fill") } else { (0.85, "debug fill") };
            return TypeGuess::new(FieldKind::Padding, run, confidence, format!("{} x 0x{:02x}", run, byte))
                .with_notes(what.to_string());
        }

        if window.len() == 8 && addr.is_aligned(8) {
            if let Some(guess) = self.infer_pointer(window) {
                return guess;
            }
        }

        if window.len() >= 4 && addr.is_aligned(4) {
            let bits = u32::from_le_bytes([window[0], window[1], window[2], window[3]]);
            let value = f32::from_bits(bits);
            if is_plausible_float(value) {
                return TypeGuess::new(FieldKind::Float, 4, 0.6, format!("{}", value));
            }
        }

        if run >= 2 && rest[0] != 0 {
            return TypeGuess::new(FieldKind::Padding, run, 0.4, format!("{} x 0x{:02x}", run, rest[0]))
                .with_notes("short debug fill".to_string());
        }

        if window.len() >= 4 {
            let value = u32::from_le_bytes([window[0], window[1], window[2], window[3]]);
            if value <= 1 {
                return TypeGuess::new(FieldKind::Bool, 1, 0.5, (value == 1).to_string());
            }
            if value < 0x100 {
                return TypeGuess::new(FieldKind::Enum, 4, 0.5, value.to_string()).with_notes("small value".to_string());
            }
            let signed = value as i32;
            if signed.unsigned_abs() < 0x0100_0000 {
                return TypeGuess::new(FieldKind::Int32, 4, 0.45, signed.to_string());
            }
            if addr.is_aligned(4) {
                return TypeGuess::new(FieldKind::Int32, 4, 0.3, format!("0x{:08x}", value));
            }
        }

        if window.len() >= 2 && addr.is_aligned(2) {
            let value = i16::from_le_bytes([window[0], window[1]]);
            return TypeGuess::new(FieldKind::Int16, 2, 0.25, value.to_string());
        }

        TypeGuess::unknown(Some(window[0]))
    }

    /// Reads up to 8 bytes at `addr` and ranks them.
    pub fn infer_at(&self, addr: Address) -> TypeGuess {
        let snapshot = [8usize, 4, 2, 1]
            .into_iter()
            .find_map(|width| self.validator.reader().try_read_bytes(addr, width).ok());
        match snapshot {
            Some(snapshot) => self.infer(&snapshot, 0),
            None => TypeGuess {
                confidence: 0.0,
                ..TypeGuess::unknown(None)
            },
        }
    }

    fn infer_pointer(&self, window: &[u8]) -> Option<TypeGuess> {
        let mut word = [0u8; 8];
        word.copy_from_slice(window);
        let value = u64::from_le_bytes(word);
        let reading = pointer_reading(self.validator, value);
        if !reading.is_valid {
            return None;
        }
        let target = reading.value;

        let mut guess = match reading.kind {
            PointerKind::ValidCode => TypeGuess::new(FieldKind::CodePointer, 8, 0.9, target.to_string()),
            _ if self.points_to_code_pointer(target) => {
                TypeGuess::new(FieldKind::VTablePointer, 8, 0.85, target.to_string())
            }
            _ => match self.probe_string(target) {
                Some(text) => TypeGuess::new(FieldKind::StringPointer, 8, 0.8, target.to_string())
                    .with_notes(format!("\"{}\"", text.value)),
                None => TypeGuess::new(FieldKind::Pointer, 8, reading.confidence, target.to_string()),
            },
        };
        if guess.notes.is_none() {
            guess.notes = Some(reading.target);
        }
        guess.pointer_target = Some(target);
        Some(guess)
    }

    fn points_to_code_pointer(&self, target: Address) -> bool {
        if !self.validator.is_vtable_home(target) {
            return false;
        }
        match self.validator.reader().try_read::<u64>(target) {
            Ok(first) => first != 0 && self.validator.is_in_code_section(Address::new(first)),
            Err(_) => false,
        }
    }

    fn probe_string(&self, target: Address) -> Option<StringReading> {
        read_c_string(self.validator.reader(), target, self.max_string_length).map(|value| StringReading {
            length: value.len(),
            value,
        })
    }
}

/// Length of the leading run of one padding byte value (0x00 or debug fill).
pub fn fill_run(bytes: &[u8]) -> usize {
    match bytes.first() {
        Some(&first) if first == 0 || DEBUG_FILL_BYTES.contains(&first) => {
            bytes.iter().take_while(|&&b| b == first).count()
        }
        _ => 0,
    }
}

/// Uniform 0x00 / 0xCD / 0xDD fill, the only bytes accepted as alignment gaps.
pub fn is_alignment_fill(bytes: &[u8]) -> bool {
    match bytes.first() {
        Some(0) => bytes.iter().all(|&b| b == 0),
        Some(0xCD) | Some(0xDD) => is_debug_fill(bytes),
        _ => false,
    }
}

fn is_plausible_float(value: f32) -> bool {
    if !value.is_finite() || value == 0.0 {
        return false;
    }
    let magnitude = value.abs();
    (1e-4..=1e7).contains(&magnitude)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ImageMemory, Protection, SafeMemoryReader};
    use crate::module::{ModuleInfo, ModuleMap, SectionFlags, SectionInfo};
    use std::sync::Arc;

    const CODE: u64 = 0x1_4000_1000;
    const RDATA: u64 = 0x1_4000_5000;
    const HEAP: u64 = 0x2000_0000;

    fn validator() -> PointerValidator {
        let mut image = ImageMemory::new();
        image.map(Address::new(0x1_4000_0000), vec![0x90; 0x5000], Protection::ReadExecute, "game.exe");
        let mut rdata = CODE.to_le_bytes().to_vec();
        rdata.resize(0x1000, 0);
        image.map(Address::new(RDATA), rdata, Protection::Read, "game.exe");
        let mut heap = vec![0u8; 0x1000];
        heap[0x100..0x105].copy_from_slice(b"Lobby");
        image.map(Address::new(HEAP), heap, Protection::ReadWrite, "heap");

        let module = ModuleInfo::new("game.exe", Address::new(0x1_4000_0000), 0x6000)
            .with_section(SectionInfo::new(".text", 0x1000, 0x4000, SectionFlags::CNT_CODE | SectionFlags::MEM_EXECUTE))
            .with_section(SectionInfo::new(".rdata", 0x5000, 0x1000, SectionFlags::CNT_INITIALIZED_DATA | SectionFlags::MEM_READ));
        PointerValidator::new(
            SafeMemoryReader::new(Arc::new(image)),
            Arc::new(ModuleMap::new().with_module(module)),
            &AnalysisConfig::default(),
        )
    }

    fn guess(validator: &PointerValidator, bytes: &[u8]) -> TypeGuess {
        let inference = TypeInference::new(validator, &AnalysisConfig::default());
        inference.infer(&ByteSnapshot::new(Address::new(0x3000_0000), bytes.to_vec()), 0)
    }

    #[test]
    fn test_padding_swallows_whole_run() {
        let v = validator();
        let g = guess(&v, &[0u8; 32]);
        assert_eq!(g.kind, FieldKind::Padding);
        assert_eq!(g.size, 32);

        let g = guess(&v, &[0xCD, 0xCD, 0xCD, 0xCD, 0xCD, 1, 2, 3]);
        assert_eq!(g.kind, FieldKind::Padding);
        assert_eq!(g.size, 5);
        assert!(g.confidence > 0.8);
    }

    #[test]
    fn test_pointer_kinds() {
        let v = validator();
        assert_eq!(guess(&v, &(CODE + 0x10).to_le_bytes()).kind, FieldKind::CodePointer);
        assert_eq!(guess(&v, &RDATA.to_le_bytes()).kind, FieldKind::VTablePointer);

        let s = guess(&v, &(HEAP + 0x100).to_le_bytes());
        assert_eq!(s.kind, FieldKind::StringPointer);
        assert_eq!(s.notes.as_deref(), Some("\"Lobby\""));

        let p = guess(&v, &(HEAP + 0x200).to_le_bytes());
        assert_eq!(p.kind, FieldKind::Pointer);
        assert_eq!(p.pointer_target, Some(Address::new(HEAP + 0x200)));
        assert_eq!(p.size, 8);
    }

    #[test]
    fn test_scalar_priority() {
        let v = validator();
        assert_eq!(guess(&v, &1.5f32.to_le_bytes()).kind, FieldKind::Float);
        assert_eq!(guess(&v, &[1, 0, 0, 0, 7, 7, 7, 7]).kind, FieldKind::Bool);
        assert_eq!(guess(&v, &[7, 0, 0, 0]).kind, FieldKind::Enum);
        assert_eq!(guess(&v, &1000i32.to_le_bytes()).kind, FieldKind::Int32);
        assert_eq!(guess(&v, &[0x34, 0x12]).kind, FieldKind::Int16);
        assert_eq!(guess(&v, &[0x34]).kind, FieldKind::Unknown);
    }

    #[test]
    fn test_interpretations_keep_invalid_pointer() {
        let v = validator();
        let inference = TypeInference::new(&v, &AnalysisConfig::default());
        let interp = inference.get_interpretations(Address::new(HEAP + 0x100), 8);
        assert_eq!(interp.size(), 8);
        let pointer = interp.pointer.expect("pointer reading is always present for 8 bytes");
        assert!(!pointer.is_valid);
        assert_eq!(pointer.kind, PointerKind::Invalid);

        let interp = inference.get_interpretations(Address::new(HEAP + 0xFFC), 8);
        assert_eq!(interp.size(), 4);
        assert!(interp.pointer.is_none());
        assert!(interp.is_all_zeros);
    }

    #[test]
    fn test_interpretations_resolve_string_target() {
        let mut image = ImageMemory::new();
        let mut heap = (HEAP + 0x40).to_le_bytes().to_vec();
        heap.resize(0x40, 0);
        heap.extend_from_slice(b"Workspace\0");
        image.map(Address::new(HEAP), heap, Protection::ReadWrite, "heap");
        let v = PointerValidator::new(
            SafeMemoryReader::new(Arc::new(image)),
            Arc::new(ModuleMap::new()),
            &AnalysisConfig::default(),
        );
        let inference = TypeInference::new(&v, &AnalysisConfig::default());
        let interp = inference.get_interpretations(Address::new(HEAP), 8);
        assert!(interp.has_valid_pointer());
        assert_eq!(interp.string.map(|s| s.value).as_deref(), Some("Workspace"));
    }

    #[test]
    fn test_alignment_fill() {
        assert!(is_alignment_fill(&[0, 0, 0]));
        assert!(is_alignment_fill(&[0xDD, 0xDD]));
        assert!(!is_alignment_fill(&[0xFD, 0xFD]));
        assert!(!is_alignment_fill(&[0, 1]));
        assert!(!is_alignment_fill(&[]));
    }
}
