//! Atom type registry: which types are containers, which carry a
//! version/flags prefix, and how leaf payloads are decoded and encoded.

use crate::atom::{FieldMap, FourCC};
use crate::codec;
use crate::cursor::ByteCursor;
use bytes::BytesMut;
use std::collections::HashMap;

/// Decodes a leaf payload into fields. Receives the atom version (0 for
/// atoms without a version/flags prefix).
pub type DecodeFn = fn(&mut ByteCursor<'_>, u8, &mut FieldMap);

/// Encodes a leaf payload from fields. The version/flags prefix of full
/// atoms is written by the caller.
pub type EncodeFn = fn(&FieldMap, &mut BytesMut);

/// Types without a registration that are still parsed as containers.
const FALLBACK_CONTAINERS: [FourCC; 18] = [
    FourCC(*b"moov"),
    FourCC(*b"trak"),
    FourCC(*b"mdia"),
    FourCC(*b"minf"),
    FourCC(*b"stbl"),
    FourCC(*b"dinf"),
    FourCC(*b"edts"),
    FourCC(*b"udta"),
    FourCC(*b"meta"),
    FourCC(*b"ilst"),
    FourCC(*b"sinf"),
    FourCC(*b"schi"),
    FourCC(*b"mvex"),
    FourCC(*b"moof"),
    FourCC(*b"traf"),
    FourCC(*b"skip"),
    FourCC(*b"wide"),
    FourCC(*b"tapt"),
];

/// How one atom type is handled.
#[derive(Debug, Clone, Copy)]
pub struct AtomCodec {
    pub decode: Option<DecodeFn>,
    pub encode: Option<EncodeFn>,
    pub container: bool,
    pub full_atom: bool,
}

impl AtomCodec {
    /// A leaf with a decoder and an encoder.
    pub fn leaf(full_atom: bool, decode: DecodeFn, encode: EncodeFn) -> Self {
        Self {
            decode: Some(decode),
            encode: Some(encode),
            container: false,
            full_atom,
        }
    }

    /// A container, optionally preceded by version/flags.
    pub fn container(full_atom: bool) -> Self {
        Self {
            decode: None,
            encode: None,
            container: true,
            full_atom,
        }
    }

    /// Handling for types nobody registered: opaque bytes both ways.
    pub fn raw() -> Self {
        Self::leaf(false, codec::decode_raw, codec::encode_raw)
    }
}

/// Lookup table from type code to [`AtomCodec`].
#[derive(Debug, Clone, Default)]
pub struct Registry {
    codecs: HashMap<FourCC, AtomCodec>,
}

impl Registry {
    /// A registry with nothing registered; every leaf decodes as raw bytes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The registry with every built-in decoder and encoder.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        codec::register_standard(&mut registry);
        registry
    }

    pub fn register(&mut self, atom_type: FourCC, codec: AtomCodec) -> &mut Self {
        self.codecs.insert(atom_type, codec);
        self
    }

    pub fn get(&self, atom_type: FourCC) -> Option<&AtomCodec> {
        self.codecs.get(&atom_type)
    }

    /// Codec for a type, falling back to a container or raw leaf.
    pub fn resolve(&self, atom_type: FourCC) -> AtomCodec {
        match self.codecs.get(&atom_type) {
            Some(codec) => *codec,
            None if FALLBACK_CONTAINERS.contains(&atom_type) => {
                AtomCodec::container(atom_type == FourCC::META)
            }
            None => AtomCodec::raw(),
        }
    }

    pub fn is_container(&self, atom_type: FourCC) -> bool {
        self.resolve(atom_type).container
    }

    pub fn is_full_atom(&self, atom_type: FourCC) -> bool {
        self.resolve(atom_type).full_atom
    }
}
