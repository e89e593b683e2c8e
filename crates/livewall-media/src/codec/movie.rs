//! Movie, track and media level atoms.

use super::{
    code_or, f64_or, i64_or, put_padded, put_versioned, read_versioned, records, u16_or, u32_or,
    u64_or, version,
};
use crate::atom::{FieldMap, FieldValue, FourCC};
use crate::cursor::{AtomWriteExt, ByteCursor, IDENTITY_MATRIX};
use bytes::{BufMut, BytesMut};

/// Track header flag bits.
pub const TRACK_ENABLED: u32 = 0x1;
pub const TRACK_IN_MOVIE: u32 = 0x2;
pub const TRACK_IN_PREVIEW: u32 = 0x4;
pub const TRACK_IN_POSTER: u32 = 0x8;

/// Human readable name of a handler subtype.
pub fn handler_description(subtype: FourCC) -> Option<&'static str> {
    let name = match &subtype.0 {
        b"vide" => "Video",
        b"soun" => "Sound",
        b"text" => "Text",
        b"sbtl" | b"subt" => "Subtitle",
        b"meta" => "Metadata",
        b"tmcd" => "Timecode",
        b"hint" => "Hint",
        b"alis" => "Alias Data",
        b"url " => "URL Data",
        _ => return None,
    };
    Some(name)
}

/// Name of a video media graphics (transfer) mode.
pub fn graphics_mode_name(mode: u16) -> Option<&'static str> {
    let name = match mode {
        0x0000 => "Copy",
        0x0020 => "Blend",
        0x0024 => "Transparent",
        0x0040 => "Dither copy",
        0x0100 => "Straight alpha",
        0x0101 => "Premul white alpha",
        0x0102 => "Premul black alpha",
        0x0103 => "Composition (dither copy)",
        0x0104 => "Straight alpha blend",
        _ => return None,
    };
    Some(name)
}

/// Packed ISO-639-2 language of a media header; 0 reads as "und".
pub fn language_code(packed: u16) -> String {
    if packed == 0 {
        return "und".to_string();
    }
    [10u16, 5, 0]
        .iter()
        .map(|shift| (((packed >> shift) & 0x1f) as u8 + 0x60) as char)
        .collect()
}

pub(super) fn decode_ftyp(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    fields.set("major_brand", FieldValue::Code(cursor.read_fourcc()));
    fields.set("minor_version", FieldValue::U32(cursor.read_u32()));
    let mut brands = Vec::with_capacity(cursor.remaining() / 4);
    while cursor.remaining() >= 4 {
        brands.push(cursor.read_fourcc());
    }
    fields.set("compatible_brands", FieldValue::Codes(brands));
}

pub(super) fn encode_ftyp(fields: &FieldMap, out: &mut BytesMut) {
    out.put_fourcc(code_or(fields, "major_brand", FourCC(*b"qt  ")));
    out.put_u32(u32_or(fields, "minor_version", 0));
    for brand in fields
        .get("compatible_brands")
        .and_then(FieldValue::as_codes)
        .unwrap_or(&[])
    {
        out.put_fourcc(*brand);
    }
}

pub(super) fn decode_mvhd(cursor: &mut ByteCursor<'_>, version: u8, fields: &mut FieldMap) {
    fields.set("creation_time", read_versioned(cursor, version));
    fields.set("modification_time", read_versioned(cursor, version));
    fields.set("time_scale", FieldValue::U32(cursor.read_u32()));
    fields.set("duration", read_versioned(cursor, version));
    fields.set("preferred_rate", FieldValue::Fixed(cursor.read_fixed_16_16()));
    fields.set("preferred_volume", FieldValue::Fixed(cursor.read_fixed_8_8()));
    fields.set("reserved", FieldValue::Bytes(cursor.read_bytes(10).to_vec()));
    fields.set("matrix", FieldValue::Matrix(Box::new(cursor.read_matrix())));
    for name in [
        "preview_time",
        "preview_duration",
        "poster_time",
        "selection_time",
        "selection_duration",
        "current_time",
        "next_track_id",
    ] {
        fields.set(name, FieldValue::U32(cursor.read_u32()));
    }
}

pub(super) fn encode_mvhd(fields: &FieldMap, out: &mut BytesMut) {
    let v = version(fields);
    put_versioned(out, v, u64_or(fields, "creation_time", 0));
    put_versioned(out, v, u64_or(fields, "modification_time", 0));
    out.put_u32(u32_or(fields, "time_scale", 1000));
    put_versioned(out, v, u64_or(fields, "duration", 0));
    out.put_fixed_16_16(f64_or(fields, "preferred_rate", 1.0));
    out.put_fixed_8_8(f64_or(fields, "preferred_volume", 1.0));
    put_padded(out, fields.bytes("reserved"), 10);
    put_matrix_field(fields, out);
    for name in [
        "preview_time",
        "preview_duration",
        "poster_time",
        "selection_time",
        "selection_duration",
        "current_time",
    ] {
        out.put_u32(u32_or(fields, name, 0));
    }
    out.put_u32(u32_or(fields, "next_track_id", 2));
}

pub(super) fn decode_tkhd(cursor: &mut ByteCursor<'_>, version: u8, fields: &mut FieldMap) {
    fields.set("creation_time", read_versioned(cursor, version));
    fields.set("modification_time", read_versioned(cursor, version));
    fields.set("track_id", FieldValue::U32(cursor.read_u32()));
    fields.set("reserved_1", FieldValue::U32(cursor.read_u32()));
    fields.set("duration", read_versioned(cursor, version));
    fields.set("reserved_2", FieldValue::Bytes(cursor.read_bytes(8).to_vec()));
    fields.set("layer", FieldValue::I16(cursor.read_i16()));
    fields.set("alternate_group", FieldValue::I16(cursor.read_i16()));
    fields.set("volume", FieldValue::Fixed(cursor.read_fixed_8_8()));
    fields.set("reserved_3", FieldValue::Bytes(cursor.read_bytes(2).to_vec()));
    fields.set("matrix", FieldValue::Matrix(Box::new(cursor.read_matrix())));
    fields.set("track_width", FieldValue::Fixed(cursor.read_fixed_16_16()));
    fields.set("track_height", FieldValue::Fixed(cursor.read_fixed_16_16()));
}

pub(super) fn encode_tkhd(fields: &FieldMap, out: &mut BytesMut) {
    let v = version(fields);
    put_versioned(out, v, u64_or(fields, "creation_time", 0));
    put_versioned(out, v, u64_or(fields, "modification_time", 0));
    out.put_u32(u32_or(fields, "track_id", 1));
    out.put_u32(u32_or(fields, "reserved_1", 0));
    put_versioned(out, v, u64_or(fields, "duration", 0));
    put_padded(out, fields.bytes("reserved_2"), 8);
    out.put_i16(i64_or(fields, "layer", 0) as i16);
    out.put_i16(i64_or(fields, "alternate_group", 0) as i16);
    out.put_fixed_8_8(f64_or(fields, "volume", 0.0));
    put_padded(out, fields.bytes("reserved_3"), 2);
    put_matrix_field(fields, out);
    out.put_fixed_16_16(f64_or(fields, "track_width", 0.0));
    out.put_fixed_16_16(f64_or(fields, "track_height", 0.0));
}

pub(super) fn decode_mdhd(cursor: &mut ByteCursor<'_>, version: u8, fields: &mut FieldMap) {
    fields.set("creation_time", read_versioned(cursor, version));
    fields.set("modification_time", read_versioned(cursor, version));
    fields.set("time_scale", FieldValue::U32(cursor.read_u32()));
    fields.set("duration", read_versioned(cursor, version));
    fields.set("language", FieldValue::U16(cursor.read_u16()));
    fields.set("quality", FieldValue::U16(cursor.read_u16()));
}

pub(super) fn encode_mdhd(fields: &FieldMap, out: &mut BytesMut) {
    let v = version(fields);
    put_versioned(out, v, u64_or(fields, "creation_time", 0));
    put_versioned(out, v, u64_or(fields, "modification_time", 0));
    out.put_u32(u32_or(fields, "time_scale", 600));
    put_versioned(out, v, u64_or(fields, "duration", 0));
    out.put_u16(u16_or(fields, "language", 0));
    out.put_u16(u16_or(fields, "quality", 0));
}

/// Component name. A Pascal string counts only when its length byte covers
/// everything up to NUL padding; otherwise a NUL-terminated body is read as a
/// C string. Bodies without a terminator fall back to a loose Pascal read,
/// then to plain UTF-8.
fn handler_name(data: &[u8]) -> String {
    let pascal_len = data
        .first()
        .map(|&len| len as usize)
        .filter(|&len| len > 0 && len < data.len());

    let exact = pascal_len.filter(|&len| {
        !data[1..=len].contains(&0) && data[len + 1..].iter().all(|&b| b == 0)
    });
    if let Some(len) = exact {
        return String::from_utf8_lossy(&data[1..=len]).into_owned();
    }
    if let Some(nul) = data.iter().position(|&b| b == 0) {
        return String::from_utf8_lossy(&data[..nul]).into_owned();
    }
    match pascal_len {
        Some(len) => String::from_utf8_lossy(&data[1..=len]).into_owned(),
        None => String::from_utf8_lossy(data).into_owned(),
    }
}

pub(super) fn decode_hdlr(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    fields.set("component_type", FieldValue::Code(cursor.read_fourcc()));
    fields.set("component_subtype", FieldValue::Code(cursor.read_fourcc()));
    fields.set("component_manufacturer", FieldValue::Code(cursor.read_fourcc()));
    fields.set("component_flags", FieldValue::U32(cursor.read_u32()));
    fields.set("component_flags_mask", FieldValue::U32(cursor.read_u32()));
    let name = cursor.read_rest();
    fields.set("component_name", FieldValue::Str(handler_name(name)));
    fields.set("component_name_raw", FieldValue::Bytes(name.to_vec()));
}

pub(super) fn encode_hdlr(fields: &FieldMap, out: &mut BytesMut) {
    out.put_fourcc(code_or(fields, "component_type", FourCC(*b"mhlr")));
    out.put_fourcc(code_or(fields, "component_subtype", FourCC::VIDE));
    out.put_fourcc(code_or(fields, "component_manufacturer", FourCC([0; 4])));
    out.put_u32(u32_or(fields, "component_flags", 0));
    out.put_u32(u32_or(fields, "component_flags_mask", 0));

    let name = fields
        .get("component_name")
        .and_then(FieldValue::as_str)
        .unwrap_or("");
    match fields.bytes("component_name_raw") {
        // Keep the original encoding unless the name was changed
        Some(raw) if handler_name(raw) == name => out.put_slice(raw),
        _ => out.put_pascal_string(name),
    }
}

pub(super) fn decode_vmhd(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    fields.set("graphics_mode", FieldValue::U16(cursor.read_u16()));
    let opcolor = (0..3).map(|_| cursor.read_u16()).collect();
    fields.set("opcolor", FieldValue::U16s(opcolor));
}

pub(super) fn encode_vmhd(fields: &FieldMap, out: &mut BytesMut) {
    out.put_u16(u16_or(fields, "graphics_mode", 0));
    let opcolor = fields
        .get("opcolor")
        .and_then(FieldValue::as_u16s)
        .unwrap_or(&[]);
    for i in 0..3 {
        out.put_u16(opcolor.get(i).copied().unwrap_or(0));
    }
}

pub(super) fn decode_smhd(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    fields.set("balance", FieldValue::Fixed(cursor.read_signed_fixed_8_8()));
    fields.set("reserved", FieldValue::Bytes(cursor.read_bytes(2).to_vec()));
}

pub(super) fn encode_smhd(fields: &FieldMap, out: &mut BytesMut) {
    out.put_signed_fixed_8_8(f64_or(fields, "balance", 0.0));
    put_padded(out, fields.bytes("reserved"), 2);
}

pub(super) fn decode_dref(cursor: &mut ByteCursor<'_>, _version: u8, fields: &mut FieldMap) {
    let declared = cursor.read_u32();
    fields.set("entry_count", FieldValue::U32(declared));

    let mut references = Vec::new();
    for _ in 0..cursor.bounded_count(declared, 12) {
        let size = cursor.read_u32();
        if size < 12 || (size - 4) as usize > cursor.remaining() {
            break;
        }
        let ref_type = cursor.read_fourcc();
        let (ref_version, flags) = cursor.read_version_flags();
        let data = cursor.read_bytes((size - 12) as usize);
        references.push(
            FieldMap::new()
                .with("size", FieldValue::U32(size))
                .with("type", FieldValue::Code(ref_type))
                .with("version", FieldValue::U8(ref_version))
                .with("flags", FieldValue::U32(flags))
                .with("self_contained", FieldValue::Bool(flags & 1 != 0))
                .with("data", FieldValue::Bytes(data.to_vec())),
        );
    }
    fields.set("references", FieldValue::Records(references));
}

pub(super) fn encode_dref(fields: &FieldMap, out: &mut BytesMut) {
    let references = records(fields, "references");
    out.put_u32(references.len() as u32);
    for reference in references {
        let data = reference.bytes("data").unwrap_or(&[]);
        out.put_u32(12 + data.len() as u32);
        out.put_fourcc(code_or(reference, "type", FourCC::ALIS));
        out.put_version_flags(
            u32_or(reference, "version", 0) as u8,
            u32_or(reference, "flags", 1),
        );
        out.put_slice(data);
    }
}

pub(super) fn decode_elst(cursor: &mut ByteCursor<'_>, version: u8, fields: &mut FieldMap) {
    let declared = cursor.read_u32();
    fields.set("entry_count", FieldValue::U32(declared));

    let entry_size = if version == 1 { 20 } else { 12 };
    let entries = (0..cursor.bounded_count(declared, entry_size))
        .map(|_| {
            let (duration, media_time) = if version == 1 {
                (
                    FieldValue::U64(cursor.read_u64()),
                    FieldValue::I64(cursor.read_i64()),
                )
            } else {
                (
                    FieldValue::U32(cursor.read_u32()),
                    FieldValue::I32(cursor.read_i32()),
                )
            };
            FieldMap::new()
                .with("track_duration", duration)
                .with("media_time", media_time)
                .with("media_rate", FieldValue::Fixed(cursor.read_fixed_16_16()))
        })
        .collect();
    fields.set("entries", FieldValue::Records(entries));
}

pub(super) fn encode_elst(fields: &FieldMap, out: &mut BytesMut) {
    let v = version(fields);
    let entries = records(fields, "entries");
    out.put_u32(entries.len() as u32);
    for entry in entries {
        put_versioned(out, v, u64_or(entry, "track_duration", 0));
        let media_time = i64_or(entry, "media_time", 0);
        if v == 1 {
            out.put_i64(media_time);
        } else {
            out.put_i32(media_time as i32);
        }
        out.put_fixed_16_16(f64_or(entry, "media_rate", 1.0));
    }
}

fn put_matrix_field(fields: &FieldMap, out: &mut BytesMut) {
    let matrix = fields
        .get("matrix")
        .and_then(FieldValue::as_matrix)
        .unwrap_or(&IDENTITY_MATRIX);
    out.put_matrix(matrix);
}
