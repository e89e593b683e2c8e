//! Atom type codes, decoded field values and the immutable parse tree.

use std::ops::Range;

#[cfg(feature = "serialize")]
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Four-character atom type code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const WIDE: Self = Self(*b"wide");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MOOV: Self = Self(*b"moov");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const TAPT: Self = Self(*b"tapt");
    pub const CLEF: Self = Self(*b"clef");
    pub const PROF: Self = Self(*b"prof");
    pub const ENOF: Self = Self(*b"enof");
    pub const EDTS: Self = Self(*b"edts");
    pub const ELST: Self = Self(*b"elst");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const VMHD: Self = Self(*b"vmhd");
    pub const SMHD: Self = Self(*b"smhd");
    pub const DINF: Self = Self(*b"dinf");
    pub const DREF: Self = Self(*b"dref");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const CTTS: Self = Self(*b"ctts");
    pub const CSLG: Self = Self(*b"cslg");
    pub const STSS: Self = Self(*b"stss");
    pub const SDTP: Self = Self(*b"sdtp");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const SBGP: Self = Self(*b"sbgp");
    pub const SGPD: Self = Self(*b"sgpd");
    pub const CSGM: Self = Self(*b"csgm");
    pub const META: Self = Self(*b"meta");
    pub const UDTA: Self = Self(*b"udta");

    /// Temporal-level sample group.
    pub const TSCL: Self = Self(*b"tscl");
    /// Temporal sub-layer access sample group.
    pub const TSAS: Self = Self(*b"tsas");
    /// Roll-recovery sample group.
    pub const ROLL: Self = Self(*b"roll");

    /// Handler subtypes rewritten by the wallpaper transform.
    pub const URL: Self = Self(*b"url ");
    pub const ALIS: Self = Self(*b"alis");
    pub const VIDE: Self = Self(*b"vide");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::fmt::Debug for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FourCC({:?})", self.as_str())
    }
}

#[cfg(feature = "serialize")]
impl Serialize for FourCC {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serialize")]
fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "serialize", serde(untagged))]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I16(i16),
    I32(i32),
    I64(i64),
    Bool(bool),
    /// Fixed-point number (16.16, 8.8 or 2.30 on disk).
    Fixed(f64),
    Str(String),
    Code(FourCC),
    Bytes(#[cfg_attr(feature = "serialize", serde(serialize_with = "serialize_hex"))] Vec<u8>),
    /// 3x3 transformation matrix in `a b u c d v tx ty w` order.
    Matrix(Box<[f64; 9]>),
    U16s(Vec<u16>),
    U32s(Vec<u32>),
    U64s(Vec<u64>),
    Codes(Vec<FourCC>),
    /// Table entries, one field map per entry.
    Records(Vec<FieldMap>),
}

impl FieldValue {
    /// Unsigned view of any non-negative integer value.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            FieldValue::U8(v) => Some(v as u64),
            FieldValue::U16(v) => Some(v as u64),
            FieldValue::U32(v) => Some(v as u64),
            FieldValue::U64(v) => Some(v),
            FieldValue::I16(v) => u64::try_from(v).ok(),
            FieldValue::I32(v) => u64::try_from(v).ok(),
            FieldValue::I64(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_u64().and_then(|v| u32::try_from(v).ok())
    }

    /// Signed view of any integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            FieldValue::I16(v) => Some(v as i64),
            FieldValue::I32(v) => Some(v as i64),
            FieldValue::I64(v) => Some(v),
            FieldValue::U64(v) => i64::try_from(v).ok(),
            _ => self.as_u64().map(|v| v as i64),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            FieldValue::Fixed(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_code(&self) -> Option<FourCC> {
        match self {
            FieldValue::Code(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&[f64; 9]> {
        match self {
            FieldValue::Matrix(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&[FieldMap]> {
        match self {
            FieldValue::Records(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_records_mut(&mut self) -> Option<&mut Vec<FieldMap>> {
        match self {
            FieldValue::Records(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_u16s(&self) -> Option<&[u16]> {
        match self {
            FieldValue::U16s(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u32s(&self) -> Option<&[u32]> {
        match self {
            FieldValue::U32s(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u64s(&self) -> Option<&[u64]> {
        match self {
            FieldValue::U64s(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_codes(&self) -> Option<&[FourCC]> {
        match self {
            FieldValue::Codes(v) => Some(v),
            _ => None,
        }
    }
}

/// Ordered name → value map, used both for atom fields and table entries.
///
/// Insertion order is kept so that dumps read in on-disk order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: Vec<(&'static str, FieldValue)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldValue> {
        self.entries
            .iter_mut()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    /// Insert or replace a value, keeping the original position on replace.
    pub fn set(&mut self, name: &'static str, value: FieldValue) {
        match self.get_mut(name) {
            Some(slot) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder form of [`FieldMap::set`].
    pub fn with(mut self, name: &'static str, value: FieldValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        let index = self.entries.iter().position(|(key, _)| *key == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.entries.iter().map(|(key, value)| (*key, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(FieldValue::as_u64)
    }

    pub fn u32(&self, name: &str) -> Option<u32> {
        self.get(name).and_then(FieldValue::as_u32)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(FieldValue::as_i64)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FieldValue::as_f64)
    }

    pub fn code(&self, name: &str) -> Option<FourCC> {
        self.get(name).and_then(FieldValue::as_code)
    }

    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        self.get(name).and_then(FieldValue::as_bytes)
    }

    pub fn records(&self, name: &str) -> Option<&[FieldMap]> {
        self.get(name).and_then(FieldValue::as_records)
    }
}

#[cfg(feature = "serialize")]
impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// A node of the immutable parse tree.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct ParsedAtom {
    /// Atom type code.
    pub atom_type: FourCC,
    /// Absolute offset of the atom header.
    pub offset: u64,
    /// Atom size including header.
    pub size: u64,
    /// Size of the header (8 or 16 bytes).
    pub header_size: u8,
    /// Header bytes exactly as found in the source.
    #[cfg_attr(feature = "serialize", serde(serialize_with = "serialize_hex"))]
    pub raw_header: Vec<u8>,
    pub is_container: bool,
    pub is_full_atom: bool,
    #[cfg_attr(feature = "serialize", serde(skip_serializing_if = "Option::is_none"))]
    pub version: Option<u8>,
    #[cfg_attr(feature = "serialize", serde(skip_serializing_if = "Option::is_none"))]
    pub flags: Option<u32>,
    #[cfg_attr(feature = "serialize", serde(skip_serializing_if = "FieldMap::is_empty"))]
    pub fields: FieldMap,
    #[cfg_attr(feature = "serialize", serde(skip_serializing_if = "Vec::is_empty"))]
    pub children: Vec<ParsedAtom>,
    /// Container bytes after the last parsed child.
    #[cfg_attr(feature = "serialize", serde(skip_serializing_if = "Option::is_none"))]
    pub gap: Option<Range<u64>>,
}

impl ParsedAtom {
    /// Absolute end offset (exclusive).
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Absolute offset where the payload starts.
    pub fn data_offset(&self) -> u64 {
        self.offset + self.header_size as u64
    }

    /// Source byte range covered by this atom.
    pub fn range(&self) -> Range<u64> {
        self.offset..self.end()
    }

    /// First direct child of the given type.
    pub fn child(&self, atom_type: FourCC) -> Option<&ParsedAtom> {
        self.children.iter().find(|c| c.atom_type == atom_type)
    }

    /// First descendant (pre-order) of the given type, including self.
    pub fn find(&self, atom_type: FourCC) -> Option<&ParsedAtom> {
        if self.atom_type == atom_type {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(atom_type))
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Bytes of a container explained by its header, version/flags prefix,
    /// children and recorded gap. Equals `size` for a well-formed container.
    pub fn accounted_size(&self) -> u64 {
        let prefix = if self.is_full_atom { 4 } else { 0 };
        let children: u64 = self.children.iter().map(|c| c.size).sum();
        let gap = self.gap.as_ref().map(|g| g.end - g.start).unwrap_or(0);
        self.header_size as u64 + prefix + children + gap
    }
}

/// A place where the parser stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct ParseIssue {
    /// Offset of the atom header that could not be accepted.
    pub offset: u64,
    /// Container being parsed, `None` at top level.
    pub container: Option<FourCC>,
    /// Size the header declared.
    pub declared: u64,
    /// Bytes left in the enclosing range.
    pub available: u64,
}

/// Result of parsing a whole buffer.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct AtomTree {
    pub atoms: Vec<ParsedAtom>,
    #[cfg_attr(feature = "serialize", serde(skip_serializing_if = "Vec::is_empty"))]
    pub issues: Vec<ParseIssue>,
}

impl AtomTree {
    /// First top-level atom of the given type.
    pub fn top(&self, atom_type: FourCC) -> Option<&ParsedAtom> {
        self.atoms.iter().find(|a| a.atom_type == atom_type)
    }

    /// First atom of the given type anywhere in the tree.
    pub fn find(&self, atom_type: FourCC) -> Option<&ParsedAtom> {
        self.atoms.iter().find_map(|a| a.find(atom_type))
    }

    /// True when the parser accepted every byte it was given.
    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_display() {
        assert_eq!(FourCC::STBL.to_string(), "stbl");
        assert_eq!(FourCC::URL.as_str(), "url ");
        assert_eq!(FourCC([0xff, 0, 0, 0]).as_str(), "????");
    }

    #[test]
    fn test_field_map_set_keeps_position() {
        let mut fields = FieldMap::new()
            .with("version", FieldValue::U8(0))
            .with("flags", FieldValue::U32(1))
            .with("graphics_mode", FieldValue::U16(0));

        fields.set("flags", FieldValue::U32(3));
        let names: Vec<_> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["version", "flags", "graphics_mode"]);
        assert_eq!(fields.u32("flags"), Some(3));
    }

    #[test]
    fn test_integer_views() {
        assert_eq!(FieldValue::I32(-1).as_u64(), None);
        assert_eq!(FieldValue::I32(-1).as_i64(), Some(-1));
        assert_eq!(FieldValue::U16(7).as_i64(), Some(7));
        assert_eq!(FieldValue::U64(u64::MAX).as_u32(), None);
        assert_eq!(FieldValue::Fixed(1.5).as_f64(), Some(1.5));
    }
}
