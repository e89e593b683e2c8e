//! Payload decoders and encoders for the registered atom types.
//!
//! Every decoder has an encoder partner that writes the same layout back,
//! so a decoded atom re-encodes to its original payload. Encoders fill in a
//! neutral default for any field that is missing, which lets freshly built
//! field maps be encoded without listing every reserved byte.

mod movie;
mod sample_table;
mod wallpaper;

pub use movie::{
    graphics_mode_name, handler_description, language_code, TRACK_ENABLED, TRACK_IN_MOVIE,
    TRACK_IN_POSTER, TRACK_IN_PREVIEW,
};
pub use sample_table::{chunk_offsets, sample_sizes};

use crate::atom::{FieldMap, FieldValue, FourCC};
use crate::cursor::{AtomWriteExt, ByteCursor};
use crate::registry::{AtomCodec, Registry};
use bytes::{BufMut, BytesMut};

/// Register every built-in codec.
pub(crate) fn register_standard(registry: &mut Registry) {
    use movie::*;
    use sample_table::*;
    use wallpaper::*;

    registry
        .register(FourCC::FTYP, AtomCodec::leaf(false, decode_ftyp, encode_ftyp))
        .register(FourCC::MVHD, AtomCodec::leaf(true, decode_mvhd, encode_mvhd))
        .register(FourCC::TKHD, AtomCodec::leaf(true, decode_tkhd, encode_tkhd))
        .register(FourCC::MDHD, AtomCodec::leaf(true, decode_mdhd, encode_mdhd))
        .register(FourCC::HDLR, AtomCodec::leaf(true, decode_hdlr, encode_hdlr))
        .register(FourCC::VMHD, AtomCodec::leaf(true, decode_vmhd, encode_vmhd))
        .register(FourCC::SMHD, AtomCodec::leaf(true, decode_smhd, encode_smhd))
        .register(FourCC::DREF, AtomCodec::leaf(true, decode_dref, encode_dref))
        .register(FourCC::ELST, AtomCodec::leaf(true, decode_elst, encode_elst))
        .register(FourCC::STTS, AtomCodec::leaf(true, decode_stts, encode_stts))
        .register(FourCC::STSC, AtomCodec::leaf(true, decode_stsc, encode_stsc))
        .register(FourCC::STSZ, AtomCodec::leaf(true, decode_stsz, encode_stsz))
        .register(FourCC::STCO, AtomCodec::leaf(true, decode_stco, encode_stco))
        .register(FourCC::CO64, AtomCodec::leaf(true, decode_co64, encode_co64))
        .register(FourCC::CTTS, AtomCodec::leaf(true, decode_ctts, encode_ctts))
        .register(FourCC::STSS, AtomCodec::leaf(true, decode_stss, encode_stss))
        .register(FourCC::CSLG, AtomCodec::leaf(true, decode_cslg, encode_cslg))
        .register(FourCC::SDTP, AtomCodec::leaf(true, decode_sdtp, encode_sdtp))
        .register(FourCC::SBGP, AtomCodec::leaf(true, decode_sbgp, encode_sbgp))
        .register(FourCC::SGPD, AtomCodec::leaf(true, decode_sgpd, encode_sgpd))
        .register(FourCC::STSD, AtomCodec::leaf(true, decode_stsd, encode_stsd))
        .register(FourCC::CLEF, AtomCodec::leaf(true, decode_dimensions, encode_dimensions))
        .register(FourCC::PROF, AtomCodec::leaf(true, decode_dimensions, encode_dimensions))
        .register(FourCC::ENOF, AtomCodec::leaf(true, decode_dimensions, encode_dimensions))
        .register(FourCC::CSGM, AtomCodec::leaf(true, decode_csgm, encode_csgm))
        .register(FourCC::META, AtomCodec::container(true));
}

pub(crate) fn decode_raw(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    fields.set("raw_data", FieldValue::Bytes(cursor.read_rest().to_vec()));
}

pub(crate) fn encode_raw(fields: &FieldMap, out: &mut BytesMut) {
    if let Some(data) = fields.bytes("raw_data") {
        out.put_slice(data);
    }
}

fn version(fields: &FieldMap) -> u8 {
    fields.u64("version").unwrap_or(0) as u8
}

fn u16_or(fields: &FieldMap, name: &str, default: u16) -> u16 {
    fields.u64(name).map_or(default, |v| v as u16)
}

fn u32_or(fields: &FieldMap, name: &str, default: u32) -> u32 {
    fields.u64(name).map_or(default, |v| v as u32)
}

fn u64_or(fields: &FieldMap, name: &str, default: u64) -> u64 {
    fields.u64(name).unwrap_or(default)
}

fn i64_or(fields: &FieldMap, name: &str, default: i64) -> i64 {
    fields.i64(name).unwrap_or(default)
}

fn f64_or(fields: &FieldMap, name: &str, default: f64) -> f64 {
    fields.f64(name).unwrap_or(default)
}

fn code_or(fields: &FieldMap, name: &str, default: FourCC) -> FourCC {
    fields.code(name).unwrap_or(default)
}

fn records<'f>(fields: &'f FieldMap, name: &str) -> &'f [FieldMap] {
    fields.records(name).unwrap_or(&[])
}

/// 32-bit in version 0, 64-bit otherwise.
fn read_versioned(cursor: &mut ByteCursor<'_>, version: u8) -> FieldValue {
    if version == 1 {
        FieldValue::U64(cursor.read_u64())
    } else {
        FieldValue::U32(cursor.read_u32())
    }
}

fn put_versioned(out: &mut BytesMut, version: u8, value: u64) {
    if version == 1 {
        out.put_u64(value);
    } else {
        out.put_u32(value as u32);
    }
}

/// Write a reserved/opaque field at its fixed width.
fn put_padded(out: &mut BytesMut, value: Option<&[u8]>, len: usize) {
    let value = value.unwrap_or(&[]);
    let take = value.len().min(len);
    out.put_slice(&value[..take]);
    out.put_zeros(len - take);
}

/// Decode then encode a payload, for codec tests.
#[cfg(test)]
pub(crate) fn reencode(atom_type: FourCC, version: u8, payload: &[u8]) -> (FieldMap, Vec<u8>) {
    let registry = Registry::standard();
    let codec = registry.resolve(atom_type);
    let mut fields = FieldMap::new();
    fields.set("version", FieldValue::U8(version));
    let mut cursor = ByteCursor::new(payload);
    if let Some(decode) = codec.decode {
        decode(&mut cursor, version, &mut fields);
    }
    assert!(cursor.is_empty(), "{atom_type} decoder left bytes behind");

    let mut out = BytesMut::new();
    if let Some(encode) = codec.encode {
        encode(&fields, &mut out);
    }
    (fields, out.to_vec())
}
