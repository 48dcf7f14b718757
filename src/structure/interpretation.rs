// Thu Oct 15 2026 - Alex

use crate::memory::{Address, SafeMemoryReader};
use crate::validation::{PointerKind, PointerValidator};
use serde::Serialize;

const PAGE_SIZE: u64 = 0x1000;
pub const DEBUG_FILL_BYTES: [u8; 3] = [0xCD, 0xDD, 0xFD];

/// The 8-byte reading taken as an address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointerReading {
    pub value: Address,
    pub is_valid: bool,
    pub kind: PointerKind,
    pub confidence: f64,
    /// Owning region of the target, or the reason it was rejected.
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringReading {
    pub value: String,
    /// Bytes before the terminating NUL.
    pub length: usize,
}

/// Every plausible reading of one byte window.
///
/// Each reading is present when the window was wide enough for it. Nothing
/// here picks a winner; the flags are facts about the bytes, not verdicts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ByteInterpretations {
    pub address: Address,
    pub raw: Vec<u8>,

    pub int8: Option<i8>,
    pub uint8: Option<u8>,
    pub int16: Option<i16>,
    pub uint16: Option<u16>,
    pub int32: Option<i32>,
    pub uint32: Option<u32>,
    pub int64: Option<i64>,
    pub uint64: Option<u64>,
    pub float: Option<f32>,
    pub double: Option<f64>,
    pub boolean: Option<bool>,

    pub pointer: Option<PointerReading>,
    pub string: Option<StringReading>,

    pub is_all_zeros: bool,
    pub is_debug_pattern: bool,
    pub float_is_invalid: bool,
    pub double_is_invalid: bool,
}

impl ByteInterpretations {
    /// Numeric readings and flags only. Pointer and string readings need the
    /// target and are filled in by [`TypeInference`](super::TypeInference).
    pub fn from_bytes(address: Address, bytes: &[u8]) -> Self {
        let mut interp = Self {
            address,
            raw: bytes.to_vec(),
            ..Self::default()
        };

        if let Some(s) = bytes.get(..1) {
            interp.uint8 = Some(s[0]);
            interp.int8 = Some(s[0] as i8);
            interp.boolean = Some(s[0] <= 1);
        }
        if let Some(s) = bytes.get(..2) {
            interp.uint16 = Some(u16::from_le_bytes([s[0], s[1]]));
            interp.int16 = interp.uint16.map(|v| v as i16);
        }
        if let Some(s) = bytes.get(..4) {
            let v = u32::from_le_bytes([s[0], s[1], s[2], s[3]]);
            interp.uint32 = Some(v);
            interp.int32 = Some(v as i32);
            let f = f32::from_bits(v);
            interp.float = Some(f);
            interp.float_is_invalid = !f.is_finite();
        }
        if let Some(s) = bytes.get(..8) {
            let mut word = [0u8; 8];
            word.copy_from_slice(s);
            let v = u64::from_le_bytes(word);
            interp.uint64 = Some(v);
            interp.int64 = Some(v as i64);
            let d = f64::from_bits(v);
            interp.double = Some(d);
            interp.double_is_invalid = !d.is_finite();
        }

        interp.is_all_zeros = !bytes.is_empty() && bytes.iter().all(|&x| x == 0);
        interp.is_debug_pattern = is_debug_fill(bytes);
        interp
    }

    pub fn size(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn has_valid_pointer(&self) -> bool {
        self.pointer.as_ref().map(|p| p.is_valid).unwrap_or(false)
    }
}

/// Repeating 0xCD / 0xDD / 0xFD, as left by debug allocators.
pub fn is_debug_fill(bytes: &[u8]) -> bool {
    match bytes.first() {
        Some(first) => DEBUG_FILL_BYTES.contains(first) && bytes.iter().all(|b| b == first),
        None => false,
    }
}

pub(crate) fn pointer_reading(validator: &PointerValidator, value: u64) -> PointerReading {
    let classification = validator.validate(Address::new(value));
    PointerReading {
        value: Address::new(value),
        is_valid: classification.is_valid(),
        kind: classification.kind,
        confidence: classification.confidence,
        target: classification.region,
    }
}

/// Reads a NUL-terminated UTF-8 string of at most `max_len` bytes.
///
/// Reads page by page, never past the owning region, so a string ending just
/// before an unmapped page is still found. Rejects control characters and
/// undecodable input.
pub fn read_c_string(reader: &SafeMemoryReader, addr: Address, max_len: usize) -> Option<String> {
    let mut collected: Vec<u8> = Vec::new();
    let mut cursor = addr;

    while collected.len() < max_len {
        let region = reader.space().query_region(cursor).ok()?;
        let to_region_end = region.end().as_u64().saturating_sub(cursor.as_u64()) as usize;
        let to_page_end = (PAGE_SIZE - cursor.as_u64() % PAGE_SIZE) as usize;
        let chunk_len = to_page_end.min(to_region_end).min(max_len - collected.len());
        if chunk_len == 0 {
            return None;
        }
        let chunk = reader.try_read_bytes(cursor, chunk_len).ok()?;

        if let Some(nul) = chunk.bytes().iter().position(|&b| b == 0) {
            collected.extend_from_slice(&chunk.bytes()[..nul]);
            return decode_printable(&collected);
        }
        collected.extend_from_slice(chunk.bytes());
        cursor = cursor.checked_add(chunk_len as u64)?;
    }
    None
}

fn decode_printable(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let text = std::str::from_utf8(bytes).ok()?;
    let printable = text
        .chars()
        .all(|c| c != '\u{FFFD}' && (!c.is_control() || matches!(c, '\t' | '\n' | '\r')));
    if printable {
        Some(text.to_string())
    } else {
        None
    }
}
