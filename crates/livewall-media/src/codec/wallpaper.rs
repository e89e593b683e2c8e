//! Aperture dimension atoms and the custom segment map.

use super::{code_or, f64_or, u32_or};
use crate::atom::{FieldMap, FieldValue, FourCC};
use crate::cursor::{AtomWriteExt, ByteCursor};
use bytes::{BufMut, BytesMut};

const CSGM_CUSTOM_FIELDS: [&str; 6] = [
    "custom_field_1",
    "custom_field_2",
    "custom_field_3",
    "custom_field_4",
    "custom_field_5",
    "custom_field_6",
];

/// `clef`, `prof` and `enof` share one layout.
pub(super) fn decode_dimensions(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    fields.set("width", FieldValue::Fixed(cursor.read_fixed_16_16()));
    fields.set("height", FieldValue::Fixed(cursor.read_fixed_16_16()));
}

pub(super) fn encode_dimensions(fields: &FieldMap, out: &mut BytesMut) {
    out.put_fixed_16_16(f64_or(fields, "width", 0.0));
    out.put_fixed_16_16(f64_or(fields, "height", 0.0));
}

pub(super) fn decode_csgm(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    fields.set("sub_type", FieldValue::Code(cursor.read_fourcc()));
    for name in CSGM_CUSTOM_FIELDS {
        fields.set(name, FieldValue::U32(cursor.read_u32()));
    }
    if !cursor.is_empty() {
        fields.set("custom_data", FieldValue::Bytes(cursor.read_rest().to_vec()));
    }
}

pub(super) fn encode_csgm(fields: &FieldMap, out: &mut BytesMut) {
    out.put_fourcc(code_or(fields, "sub_type", FourCC::TSCL));
    for name in CSGM_CUSTOM_FIELDS {
        out.put_u32(u32_or(fields, name, 0));
    }
    out.put_slice(fields.bytes("custom_data").unwrap_or(&[]));
}
