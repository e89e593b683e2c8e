//! Sample table atoms (`stbl` children).

use super::{code_or, i64_or, put_padded, records, u16_or, u32_or, u64_or, version};
use crate::atom::{FieldMap, FieldValue, FourCC};
use crate::cursor::{AtomWriteExt, ByteCursor};
use bytes::{BufMut, BytesMut};

/// Read a table of fixed-size entries, each a list of named u32 columns.
fn decode_u32_table(cursor: &mut ByteCursor<'_>, fields: &mut FieldMap, columns: &[&'static str]) {
    let declared = cursor.read_u32();
    fields.set("entry_count", FieldValue::U32(declared));
    let entries = (0..cursor.bounded_count(declared, 4 * columns.len()))
        .map(|_| {
            columns.iter().fold(FieldMap::new(), |entry, &name| {
                entry.with(name, FieldValue::U32(cursor.read_u32()))
            })
        })
        .collect();
    fields.set("entries", FieldValue::Records(entries));
}

fn encode_u32_table(fields: &FieldMap, out: &mut BytesMut, columns: &[&str]) {
    let entries = records(fields, "entries");
    out.put_u32(entries.len() as u32);
    for entry in entries {
        for name in columns {
            out.put_u32(u32_or(entry, name, 0));
        }
    }
}

const STTS_COLUMNS: [&str; 2] = ["sample_count", "sample_duration"];
const STSC_COLUMNS: [&str; 3] = ["first_chunk", "samples_per_chunk", "sample_description_id"];
const SBGP_COLUMNS: [&str; 2] = ["sample_count", "group_description_index"];

pub(super) fn decode_stts(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    decode_u32_table(cursor, fields, &STTS_COLUMNS);
}

pub(super) fn encode_stts(fields: &FieldMap, out: &mut BytesMut) {
    encode_u32_table(fields, out, &STTS_COLUMNS);
}

pub(super) fn decode_stsc(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    decode_u32_table(cursor, fields, &STSC_COLUMNS);
}

pub(super) fn encode_stsc(fields: &FieldMap, out: &mut BytesMut) {
    encode_u32_table(fields, out, &STSC_COLUMNS);
}

pub(super) fn decode_stsz(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    let sample_size = cursor.read_u32();
    let count = cursor.read_u32();
    fields.set("sample_size", FieldValue::U32(sample_size));
    fields.set("entry_count", FieldValue::U32(count));
    if sample_size == 0 {
        let sizes = (0..cursor.bounded_count(count, 4))
            .map(|_| cursor.read_u32())
            .collect();
        fields.set("sample_sizes", FieldValue::U32s(sizes));
    }
}

pub(super) fn encode_stsz(fields: &FieldMap, out: &mut BytesMut) {
    let sample_size = u32_or(fields, "sample_size", 0);
    out.put_u32(sample_size);
    if sample_size != 0 {
        out.put_u32(u32_or(fields, "entry_count", 0));
        return;
    }
    let sizes = fields
        .get("sample_sizes")
        .and_then(FieldValue::as_u32s)
        .unwrap_or(&[]);
    out.put_u32(sizes.len() as u32);
    for size in sizes {
        out.put_u32(*size);
    }
}

pub(super) fn decode_stco(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    let declared = cursor.read_u32();
    fields.set("entry_count", FieldValue::U32(declared));
    let offsets = (0..cursor.bounded_count(declared, 4))
        .map(|_| cursor.read_u32())
        .collect();
    fields.set("chunk_offsets", FieldValue::U32s(offsets));
}

pub(super) fn encode_stco(fields: &FieldMap, out: &mut BytesMut) {
    let offsets = fields
        .get("chunk_offsets")
        .and_then(FieldValue::as_u32s)
        .unwrap_or(&[]);
    out.put_u32(offsets.len() as u32);
    for offset in offsets {
        out.put_u32(*offset);
    }
}

pub(super) fn decode_co64(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    let declared = cursor.read_u32();
    fields.set("entry_count", FieldValue::U32(declared));
    let offsets = (0..cursor.bounded_count(declared, 8))
        .map(|_| cursor.read_u64())
        .collect();
    fields.set("chunk_offsets", FieldValue::U64s(offsets));
}

pub(super) fn encode_co64(fields: &FieldMap, out: &mut BytesMut) {
    let offsets = fields
        .get("chunk_offsets")
        .and_then(FieldValue::as_u64s)
        .unwrap_or(&[]);
    out.put_u32(offsets.len() as u32);
    for offset in offsets {
        out.put_u64(*offset);
    }
}

pub(super) fn decode_ctts(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    let declared = cursor.read_u32();
    fields.set("entry_count", FieldValue::U32(declared));
    let entries = (0..cursor.bounded_count(declared, 8))
        .map(|_| {
            let sample_count = cursor.read_u32();
            // Version 0 declares the offset unsigned; large values are
            // negative offsets written by encoders that ignore that.
            let offset = cursor.read_i32();
            FieldMap::new()
                .with("sample_count", FieldValue::U32(sample_count))
                .with("composition_offset", FieldValue::I32(offset))
        })
        .collect();
    fields.set("entries", FieldValue::Records(entries));
}

pub(super) fn encode_ctts(fields: &FieldMap, out: &mut BytesMut) {
    let entries = records(fields, "entries");
    out.put_u32(entries.len() as u32);
    for entry in entries {
        out.put_u32(u32_or(entry, "sample_count", 0));
        out.put_i32(i64_or(entry, "composition_offset", 0) as i32);
    }
}

pub(super) fn decode_stss(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    let declared = cursor.read_u32();
    fields.set("entry_count", FieldValue::U32(declared));
    let keyframes = (0..cursor.bounded_count(declared, 4))
        .map(|_| cursor.read_u32())
        .collect();
    fields.set("keyframes", FieldValue::U32s(keyframes));
}

pub(super) fn encode_stss(fields: &FieldMap, out: &mut BytesMut) {
    let keyframes = fields
        .get("keyframes")
        .and_then(FieldValue::as_u32s)
        .unwrap_or(&[]);
    out.put_u32(keyframes.len() as u32);
    for keyframe in keyframes {
        out.put_u32(*keyframe);
    }
}

const CSLG_FIELDS: [&str; 5] = [
    "composition_offset_shift",
    "least_display_offset",
    "greatest_display_offset",
    "display_start_time",
    "display_end_time",
];

pub(super) fn decode_cslg(cursor: &mut ByteCursor<'_>, version: u8, fields: &mut FieldMap) {
    for name in CSLG_FIELDS {
        let value = if version == 1 {
            FieldValue::I64(cursor.read_i64())
        } else {
            FieldValue::I32(cursor.read_i32())
        };
        fields.set(name, value);
    }
}

pub(super) fn encode_cslg(fields: &FieldMap, out: &mut BytesMut) {
    let v = version(fields);
    for name in CSLG_FIELDS {
        let value = i64_or(fields, name, 0);
        if v == 1 {
            out.put_i64(value);
        } else {
            out.put_i32(value as i32);
        }
    }
}

pub(super) fn decode_sdtp(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    fields.set("samples", FieldValue::Bytes(cursor.read_rest().to_vec()));
}

pub(super) fn encode_sdtp(fields: &FieldMap, out: &mut BytesMut) {
    out.put_slice(fields.bytes("samples").unwrap_or(&[]));
}

pub(super) fn decode_sbgp(cursor: &mut ByteCursor<'_>, version: u8, fields: &mut FieldMap) {
    fields.set("grouping_type", FieldValue::Code(cursor.read_fourcc()));
    if version >= 1 {
        fields.set("default_length", FieldValue::U32(cursor.read_u32()));
    }
    decode_u32_table(cursor, fields, &SBGP_COLUMNS);
}

pub(super) fn encode_sbgp(fields: &FieldMap, out: &mut BytesMut) {
    out.put_fourcc(code_or(fields, "grouping_type", FourCC::TSCL));
    if version(fields) >= 1 {
        out.put_u32(u32_or(fields, "default_length", 0));
    }
    encode_u32_table(fields, out, &SBGP_COLUMNS);
}

/// Group types whose descriptions are length-delimited opaque payloads.
fn has_sized_entries(grouping_type: FourCC) -> bool {
    grouping_type == FourCC::TSCL || grouping_type == FourCC::TSAS
}

pub(super) fn decode_sgpd(cursor: &mut ByteCursor<'_>, version: u8, fields: &mut FieldMap) {
    let grouping_type = cursor.read_fourcc();
    fields.set("grouping_type", FieldValue::Code(grouping_type));
    let default_length = if version >= 1 { cursor.read_u32() } else { 0 };
    if version >= 1 {
        fields.set("default_length", FieldValue::U32(default_length));
    }
    if version >= 2 {
        fields.set(
            "default_sample_description_index",
            FieldValue::U32(cursor.read_u32()),
        );
    }
    let declared = cursor.read_u32();
    fields.set("entry_count", FieldValue::U32(declared));

    if grouping_type == FourCC::ROLL {
        let entries = (0..cursor.bounded_count(declared, 2))
            .map(|_| FieldMap::new().with("roll_distance", FieldValue::I16(cursor.read_i16())))
            .collect();
        fields.set("entries", FieldValue::Records(entries));
    } else if has_sized_entries(grouping_type) {
        let mut entries = Vec::new();
        for _ in 0..declared {
            let mut entry = FieldMap::new();
            let len = if default_length == 0 {
                if cursor.remaining() < 4 {
                    break;
                }
                let len = cursor.read_u32();
                entry.set("description_length", FieldValue::U32(len));
                len
            } else {
                default_length
            };
            if len as usize > cursor.remaining() {
                break;
            }
            entry.set("payload", FieldValue::Bytes(cursor.read_bytes(len as usize).to_vec()));
            entries.push(entry);
        }
        fields.set("entries", FieldValue::Records(entries));
    } else {
        fields.set("payload", FieldValue::Bytes(cursor.read_rest().to_vec()));
    }
}

pub(super) fn encode_sgpd(fields: &FieldMap, out: &mut BytesMut) {
    let v = version(fields);
    let grouping_type = code_or(fields, "grouping_type", FourCC::TSCL);
    let default_length = u32_or(fields, "default_length", 0);
    out.put_fourcc(grouping_type);
    if v >= 1 {
        out.put_u32(default_length);
    }
    if v >= 2 {
        out.put_u32(u32_or(fields, "default_sample_description_index", 0));
    }

    if grouping_type == FourCC::ROLL {
        let entries = records(fields, "entries");
        out.put_u32(entries.len() as u32);
        for entry in entries {
            out.put_i16(i64_or(entry, "roll_distance", 0) as i16);
        }
    } else if has_sized_entries(grouping_type) {
        let entries = records(fields, "entries");
        out.put_u32(entries.len() as u32);
        for entry in entries {
            let payload = entry.bytes("payload").unwrap_or(&[]);
            if default_length == 0 {
                out.put_u32(payload.len() as u32);
                out.put_slice(payload);
            } else {
                put_padded(out, Some(payload), default_length as usize);
            }
        }
    } else {
        out.put_u32(u32_or(fields, "entry_count", 0));
        out.put_slice(fields.bytes("payload").unwrap_or(&[]));
    }
}

pub(super) fn decode_stsd(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    let declared = cursor.read_u32();
    fields.set("entry_count", FieldValue::U32(declared));

    let mut descriptions = Vec::new();
    for _ in 0..cursor.bounded_count(declared, 16) {
        let size = cursor.read_u32();
        if size < 16 || (size - 4) as usize > cursor.remaining() {
            break;
        }
        let format = cursor.read_fourcc();
        let reserved = cursor.read_bytes(6);
        let data_ref_index = cursor.read_u16();
        let specific = cursor.read_bytes((size - 16) as usize);
        descriptions.push(
            FieldMap::new()
                .with("size", FieldValue::U32(size))
                .with("format", FieldValue::Code(format))
                .with("reserved", FieldValue::Bytes(reserved.to_vec()))
                .with("data_ref_index", FieldValue::U16(data_ref_index))
                .with("type_specific_data", FieldValue::Bytes(specific.to_vec())),
        );
    }
    fields.set("sample_descriptions", FieldValue::Records(descriptions));
}

pub(super) fn encode_stsd(fields: &FieldMap, out: &mut BytesMut) {
    let descriptions = records(fields, "sample_descriptions");
    out.put_u32(descriptions.len() as u32);
    for description in descriptions {
        let specific = description.bytes("type_specific_data").unwrap_or(&[]);
        out.put_u32(16 + specific.len() as u32);
        out.put_fourcc(code_or(description, "format", FourCC(*b"hvc1")));
        put_padded(out, description.bytes("reserved"), 6);
        out.put_u16(u16_or(description, "data_ref_index", 1));
        out.put_slice(specific);
    }
}

/// Chunk offsets as 64-bit values, whichever table holds them.
pub fn chunk_offsets(fields: &FieldMap) -> Vec<u64> {
    match fields.get("chunk_offsets") {
        Some(FieldValue::U32s(offsets)) => offsets.iter().map(|&o| o as u64).collect(),
        Some(FieldValue::U64s(offsets)) => offsets.clone(),
        _ => Vec::new(),
    }
}

/// Sample sizes, expanding a constant `sample_size`.
pub fn sample_sizes(fields: &FieldMap) -> Vec<u32> {
    match u64_or(fields, "sample_size", 0) {
        0 => fields
            .get("sample_sizes")
            .and_then(FieldValue::as_u32s)
            .map(<[u32]>::to_vec)
            .unwrap_or_default(),
        constant => vec![constant as u32; u32_or(fields, "entry_count", 0) as usize],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::reencode;
    use crate::test_util::be32;

    #[test]
    fn test_stsc_entries() {
        let payload = be32(&[2, 1, 3, 1, 4, 2, 1]);
        let (fields, out) = reencode(FourCC::STSC, 0, &payload);
        let entries = fields.records("entries").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].u32("first_chunk"), Some(4));
        assert_eq!(entries[1].u32("samples_per_chunk"), Some(2));
        assert_eq!(out, payload);
    }

    #[test]
    fn test_stsz_constant_and_table() {
        let (fields, out) = reencode(FourCC::STSZ, 0, &be32(&[512, 3]));
        assert!(!fields.contains("sample_sizes"));
        assert_eq!(sample_sizes(&fields), vec![512, 512, 512]);
        assert_eq!(out, be32(&[512, 3]));

        let payload = be32(&[0, 2, 100, 200]);
        let (fields, out) = reencode(FourCC::STSZ, 0, &payload);
        assert_eq!(sample_sizes(&fields), vec![100, 200]);
        assert_eq!(out, payload);
    }

    #[test]
    fn test_corrupt_count_is_capped() {
        let mut cursor = ByteCursor::new(&[0xff, 0xff, 0xff, 0xff, 0, 0, 0, 9]);
        let mut fields = FieldMap::new();
        decode_stco(&mut cursor, 0, &mut fields);
        assert_eq!(fields.u32("entry_count"), Some(u32::MAX));
        assert_eq!(chunk_offsets(&fields), vec![9]);
    }

    #[test]
    fn test_co64_offsets() {
        let mut payload = be32(&[1]);
        payload.extend_from_slice(&(5u64 << 32).to_be_bytes());
        let (fields, out) = reencode(FourCC::CO64, 0, &payload);
        assert_eq!(chunk_offsets(&fields), vec![5u64 << 32]);
        assert_eq!(out, payload);
    }

    #[test]
    fn test_ctts_v0_reinterprets_large_offsets() {
        let payload = be32(&[1, 0xffff_fc18, 2, 1000]);
        let (fields, out) = reencode(FourCC::CTTS, 0, &payload);
        let entries = fields.records("entries").unwrap();
        assert_eq!(entries[0].i64("composition_offset"), Some(-1000));
        assert_eq!(entries[1].i64("composition_offset"), Some(1000));
        assert_eq!(out, payload);
    }

    #[test]
    fn test_sgpd_roll_entries() {
        let mut payload = b"roll".to_vec();
        payload.extend(be32(&[2, 2]));
        payload.extend_from_slice(&(-1i16).to_be_bytes());
        payload.extend_from_slice(&3i16.to_be_bytes());

        let (fields, out) = reencode(FourCC::SGPD, 1, &payload);
        let entries = fields.records("entries").unwrap();
        assert_eq!(entries[0].i64("roll_distance"), Some(-1));
        assert_eq!(entries[1].i64("roll_distance"), Some(3));
        assert_eq!(out, payload);
    }

    #[test]
    fn test_sgpd_tscl_default_length() {
        let mut payload = b"tscl".to_vec();
        payload.extend(be32(&[20, 2]));
        for _ in 0..2 {
            payload.extend(be32(&[0, 1000, 1, 0, 128]));
        }
        let (fields, out) = reencode(FourCC::SGPD, 1, &payload);
        let entries = fields.records("entries").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].bytes("payload").unwrap().len(), 20);
        assert_eq!(out, payload);
    }

    #[test]
    fn test_sgpd_v0_explicit_lengths() {
        let mut payload = b"tsas".to_vec();
        payload.extend(be32(&[1, 4, 7]));
        let (fields, out) = reencode(FourCC::SGPD, 0, &payload);
        let entries = fields.records("entries").unwrap();
        assert_eq!(entries[0].u32("description_length"), Some(4));
        assert_eq!(out, payload);
    }

    #[test]
    fn test_sgpd_unknown_type_is_opaque() {
        let mut payload = b"rap ".to_vec();
        payload.extend(be32(&[1, 1]));
        payload.push(0x80);
        let (fields, out) = reencode(FourCC::SGPD, 1, &payload);
        assert_eq!(fields.bytes("payload"), Some(&[0x80][..]));
        assert_eq!(out, payload);
    }

    #[test]
    fn test_stsd_entries() {
        let mut payload = be32(&[1, 20]);
        payload.extend_from_slice(b"hvc1");
        payload.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);
        payload.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        let (fields, out) = reencode(FourCC::STSD, 0, &payload);
        let descriptions = fields.records("sample_descriptions").unwrap();
        assert_eq!(descriptions[0].code("format"), Some(FourCC(*b"hvc1")));
        assert_eq!(descriptions[0].u32("data_ref_index"), Some(1));
        assert_eq!(out, payload);
    }

    #[test]
    fn test_sbgp_and_cslg() {
        let mut payload = b"tscl".to_vec();
        payload.extend(be32(&[1, 10, 1]));
        let (_, out) = reencode(FourCC::SBGP, 0, &payload);
        assert_eq!(out, payload);

        let payload = be32(&[0, 0, 0xffff_ffff, 0, 0]);
        let (fields, out) = reencode(FourCC::CSLG, 0, &payload);
        assert_eq!(fields.i64("greatest_display_offset"), Some(-1));
        assert_eq!(out, payload);
    }
}
