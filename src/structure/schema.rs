// Thu Oct 15 2026 - Alex

//! Curated, hand-written struct definitions the discovered layouts are checked
//! against. Loaded once and treated as read-only afterwards.

use crate::structure::StructureError;
use ahash::AHashSet;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

const MAX_BASE_CHAIN: usize = 16;

static POINTER_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:Pointer<\s*(?P<generic>[\w:]+)\s*>|(?:const\s+)?(?P<star>[\w:]+)\s*\*+)$").expect("pointer type regex")
});

static FIXED_ARRAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<elem>[\w:<>\*\s]+?)\s*\[\s*(?P<count>\d+)\s*\]$").expect("array type regex")
});

/// Coarse family of a declared type name, used for compatibility checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum DeclaredCategory {
    Pointer(Option<String>),
    Float,
    Double,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Array(String, u64),
    Named(String),
}

impl DeclaredCategory {
    pub fn of(type_name: &str) -> Self {
        let trimmed = type_name.trim();
        if let Some(caps) = POINTER_TYPE.captures(trimmed) {
            let pointee = caps
                .name("generic")
                .or_else(|| caps.name("star"))
                .map(|m| m.as_str().to_string())
                .filter(|t| t != "void" && t != "char" && t != "byte");
            return Self::Pointer(pointee);
        }
        if let Some(caps) = FIXED_ARRAY.captures(trimmed) {
            let count = caps["count"].parse().unwrap_or(0);
            return Self::Array(caps["elem"].trim().to_string(), count);
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "void*" | "nint" | "nuint" | "intptr" | "uintptr" | "ptr" | "pointer" | "uintptr_t" => Self::Pointer(None),
            "float" | "f32" | "float32" | "single" => Self::Float,
            "double" | "f64" | "float64" => Self::Double,
            "bool" | "boolean" => Self::Bool,
            "byte" | "sbyte" | "char" | "u8" | "i8" | "int8" | "uint8" | "int8_t" | "uint8_t" | "unsigned char" => Self::Int8,
            "short" | "ushort" | "u16" | "i16" | "int16" | "uint16" | "int16_t" | "uint16_t" | "wchar_t" => Self::Int16,
            "int" | "uint" | "u32" | "i32" | "int32" | "uint32" | "int32_t" | "uint32_t" | "dword" | "unsigned int" => Self::Int32,
            "long" | "ulong" | "u64" | "i64" | "int64" | "uint64" | "int64_t" | "uint64_t" | "__int64" | "qword" | "size_t" => Self::Int64,
            _ => Self::Named(trimmed.to_string()),
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Self::Pointer(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Bool | Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredField {
    pub name: String,
    #[serde(deserialize_with = "de_u64")]
    pub offset: u64,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(deserialize_with = "de_u64")]
    pub size: u64,
}

impl DeclaredField {
    pub fn new(name: &str, offset: u64, type_name: &str, size: u64) -> Self {
        Self {
            name: name.to_string(),
            offset,
            type_name: type_name.to_string(),
            size,
        }
    }

    pub fn category(&self) -> DeclaredCategory {
        DeclaredCategory::of(&self.type_name)
    }

    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredStruct {
    pub name: String,
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub size: Option<u64>,
    #[serde(default)]
    pub base: Option<String>,
    /// Vtable location relative to the primary module base.
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub vtable_rva: Option<u64>,
    #[serde(default)]
    pub fields: Vec<DeclaredField>,
}

impl DeclaredStruct {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            size: None,
            base: None,
            vtable_rva: None,
            fields: Vec::new(),
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_base(mut self, base: &str) -> Self {
        self.base = Some(base.to_string());
        self
    }

    pub fn with_field(mut self, name: &str, offset: u64, type_name: &str, size: u64) -> Self {
        self.fields.push(DeclaredField::new(name, offset, type_name, size));
        self
    }

    pub fn field_at(&self, offset: u64) -> Option<&DeclaredField> {
        self.fields.iter().find(|f| f.offset == offset)
    }

    /// Declared size, or the end of the last field when no size is given.
    pub fn effective_size(&self) -> u64 {
        self.size
            .unwrap_or_else(|| self.fields.iter().map(|f| f.end()).max().unwrap_or(0))
    }
}

#[derive(Deserialize)]
struct SchemaFile {
    structs: Vec<DeclaredStruct>,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaLibrary {
    structs: IndexMap<String, DeclaredStruct>,
}

impl SchemaLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(text: &str) -> Result<Self, StructureError> {
        let file: SchemaFile = serde_json::from_str(text)?;
        let mut library = Self::new();
        for declared in file.structs {
            library.insert(declared);
        }
        Ok(library)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StructureError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let library = Self::from_json_str(&text)?;
        log::info!("loaded {} struct definitions from {}", library.len(), path.as_ref().display());
        Ok(library)
    }

    pub fn insert(&mut self, declared: DeclaredStruct) {
        self.structs.insert(declared.name.clone(), declared);
    }

    pub fn get(&self, name: &str) -> Option<&DeclaredStruct> {
        self.structs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeclaredStruct> {
        self.structs.values()
    }

    pub fn len(&self) -> usize {
        self.structs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }

    /// Flattened copy of `name`: base-type fields first, then its own, sorted
    /// by offset. The declared size falls back to the largest in the chain.
    pub fn resolve(&self, name: &str) -> Result<DeclaredStruct, StructureError> {
        let mut chain = Vec::new();
        let mut seen = AHashSet::new();
        let mut current = Some(name.to_string());

        while let Some(type_name) = current {
            if !seen.insert(type_name.clone()) || chain.len() >= MAX_BASE_CHAIN {
                return Err(StructureError::CyclicBase(type_name));
            }
            let declared = self
                .get(&type_name)
                .ok_or_else(|| StructureError::UnknownStruct(type_name.clone()))?;
            current = declared.base.clone();
            chain.push(declared);
        }

        let mut resolved = chain[0].clone();
        let mut fields: Vec<DeclaredField> = chain
            .iter()
            .rev()
            .flat_map(|s| s.fields.iter().cloned())
            .collect();
        fields.sort_by_key(|f| f.offset);
        resolved.fields = fields;
        if resolved.size.is_none() {
            resolved.size = chain.iter().filter_map(|s| s.size).max();
        }
        Ok(resolved)
    }

    pub fn declared_size(&self, name: &str) -> Option<u64> {
        self.resolve(name).ok().map(|s| s.effective_size())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HexOrInt {
    Int(u64),
    Text(String),
}

fn parse_u64(text: &str) -> Result<u64, String> {
    let trimmed = text.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|e| format!("invalid number {:?}: {}", text, e))
}

fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(value) => Ok(value),
        HexOrInt::Text(text) => parse_u64(&text).map_err(D::Error::custom),
    }
}

fn de_opt_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<HexOrInt>::deserialize(deserializer)? {
        None => Ok(None),
        Some(HexOrInt::Int(value)) => Ok(Some(value)),
        Some(HexOrInt::Text(text)) => parse_u64(&text).map(Some).map_err(D::Error::custom),
    }
}
