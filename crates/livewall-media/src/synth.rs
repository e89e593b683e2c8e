//! Builders for the atoms injected into a wallpaper track.
//!
//! Each function returns complete atoms (header included) ready to be
//! imported into an overlay.

use crate::atom::{FieldMap, FourCC};
use crate::cursor::AtomWriteExt;
use crate::temporal::segment_map_payload;
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Entries in the temporal-level sample group description.
pub const TEMPORAL_LEVEL_ENTRIES: u32 = 5;

/// Sample duration used when the track has no time-to-sample entry.
pub const DEFAULT_BASE_DURATION: u32 = 1000;

/// Fixed leading fields of a segment map after its grouping type.
const SEGMENT_MAP_FIELDS: [u32; 6] = [0, 4, 2, 1, 1, 16];

/// Write an atom whose size is patched in once `body` has run.
fn build_atom(atom_type: FourCC, body: impl FnOnce(&mut BytesMut)) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u32(0); // placeholder size
    buf.put_fourcc(atom_type);
    body(&mut buf);
    let size = buf.len() as u32;
    buf[0..4].copy_from_slice(&size.to_be_bytes());
    buf
}

fn dimension_atom(atom_type: FourCC, width: f64, height: f64) -> BytesMut {
    build_atom(atom_type, |buf| {
        buf.put_version_flags(0, 0);
        buf.put_fixed_16_16(width);
        buf.put_fixed_16_16(height);
    })
}

/// `tapt` holding clean, production and encoded aperture dimensions.
pub fn aperture_dimensions(width: f64, height: f64) -> Bytes {
    build_atom(FourCC::TAPT, |buf| {
        for atom_type in [FourCC::CLEF, FourCC::PROF, FourCC::ENOF] {
            buf.put_slice(&dimension_atom(atom_type, width, height));
        }
    })
    .freeze()
}

fn sample_group_description(
    grouping_type: FourCC,
    default_length: u32,
    entries: u32,
    entry: &[u32],
) -> Bytes {
    build_atom(FourCC::SGPD, |buf| {
        buf.put_version_flags(1, 0);
        buf.put_fourcc(grouping_type);
        buf.put_u32(default_length);
        buf.put_u32(entries);
        for _ in 0..entries {
            for &value in entry {
                buf.put_u32(value);
            }
        }
    })
    .freeze()
}

/// The temporal-level (`tscl`) and sub-layer access (`tsas`) descriptions.
pub fn sample_group_descriptions(base_duration: u32) -> [Bytes; 2] {
    [
        sample_group_description(
            FourCC::TSCL,
            20,
            TEMPORAL_LEVEL_ENTRIES,
            &[0, base_duration, 1, 0, 128],
        ),
        sample_group_description(FourCC::TSAS, 4, 1, &[0]),
    ]
}

fn segment_map(grouping_type: FourCC, last_sample: u32, payload: &[u8]) -> Bytes {
    build_atom(FourCC::CSGM, |buf| {
        buf.put_version_flags(0, 0);
        buf.put_fourcc(grouping_type);
        for value in SEGMENT_MAP_FIELDS {
            buf.put_u32(value);
        }
        buf.put_u32(last_sample);
        buf.put_slice(payload);
    })
    .freeze()
}

/// Custom segment maps for both groupings, carrying the packed temporal
/// pattern of the track.
pub fn segment_maps(temporal_ids: &[i32]) -> Result<[Bytes; 2]> {
    let last_sample = u32::try_from(temporal_ids.len().saturating_sub(1)).map_err(|_| {
        Error::synthesis(
            FourCC::CSGM,
            format!("{} samples exceed the sample index range", temporal_ids.len()),
        )
    })?;
    let payload = segment_map_payload(temporal_ids);
    Ok([
        segment_map(FourCC::TSCL, last_sample, &payload),
        segment_map(FourCC::TSAS, last_sample, &payload),
    ])
}

/// Composition shift (`cslg`) derived from the composition offsets, or
/// `None` when there are no offsets.
pub fn composition_shift(ctts_entries: &[FieldMap]) -> Result<Option<Bytes>> {
    let Some(greatest) = ctts_entries
        .iter()
        .filter_map(|entry| entry.i64("composition_offset"))
        .max()
    else {
        return Ok(None);
    };
    let greatest = i32::try_from(greatest).map_err(|_| {
        Error::synthesis(
            FourCC::CSLG,
            format!("composition offset {} exceeds the display offset range", greatest),
        )
    })?;

    Ok(Some(
        build_atom(FourCC::CSLG, |buf| {
            buf.put_version_flags(0, 0);
            buf.put_i32(0); // composition_offset_shift
            buf.put_i32(0); // least_display_offset
            buf.put_i32(greatest);
            buf.put_i32(0); // display_start_time
            buf.put_i32(0); // display_end_time
        })
        .freeze(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::FieldValue;
    use crate::parser::AtomParser;
    use crate::registry::Registry;

    #[test]
    fn test_aperture_dimensions_layout() {
        let tapt = aperture_dimensions(1920.0, 1080.0);
        assert_eq!(tapt.len(), 8 + 3 * 20);
        assert_eq!(&tapt[..8], &[0, 0, 0, 68, b't', b'a', b'p', b't']);
        assert_eq!(&tapt[8..16], &[0, 0, 0, 20, b'c', b'l', b'e', b'f']);
        assert_eq!(&tapt[20..24], &(1920u32 << 16).to_be_bytes());

        let tree = AtomParser::new(&Registry::standard()).parse(&tapt);
        let children: Vec<_> = tree.atoms[0].children.iter().map(|c| c.atom_type).collect();
        assert_eq!(children, vec![FourCC::CLEF, FourCC::PROF, FourCC::ENOF]);
        assert_eq!(tree.atoms[0].children[2].fields.f64("height"), Some(1080.0));
    }

    #[test]
    fn test_sample_group_descriptions() {
        let [tscl, tsas] = sample_group_descriptions(512);
        assert_eq!(tscl.len(), 8 + 16 + 5 * 20);
        assert_eq!(tsas.len(), 8 + 16 + 4);
        // version 1, flags 0
        assert_eq!(&tscl[8..12], &[1, 0, 0, 0]);
        assert_eq!(&tscl[12..16], b"tscl");
        assert_eq!(&tscl[16..20], &20u32.to_be_bytes());
        assert_eq!(&tscl[20..24], &5u32.to_be_bytes());
        assert_eq!(&tscl[28..32], &512u32.to_be_bytes());

        let tree = AtomParser::new(&Registry::standard()).parse(&tsas);
        let sgpd = &tree.atoms[0];
        assert_eq!(sgpd.fields.code("grouping_type"), Some(FourCC::TSAS));
        assert_eq!(sgpd.fields.records("entries").unwrap().len(), 1);
    }

    #[test]
    fn test_segment_maps() {
        let ids = [0, 1, 1, 1].repeat(3);
        let [tscl, tsas] = segment_maps(&ids).unwrap();
        assert_eq!(tscl.len(), 8 + 4 + 4 + 24 + 4 + 2);
        assert_eq!(&tscl[12..16], b"tscl");
        assert_eq!(&tsas[12..16], b"tsas");
        assert_eq!(&tscl[40..44], &11u32.to_be_bytes());
        assert_eq!(&tscl[44..], &[0x12, 0x22]);
    }

    #[test]
    fn test_segment_maps_without_samples() {
        let [tscl, _] = segment_maps(&[]).unwrap();
        assert_eq!(tscl.len(), 44);
        assert_eq!(&tscl[40..44], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_composition_shift_uses_greatest_offset() {
        let entries: Vec<FieldMap> = [200, -100, 700, 0]
            .iter()
            .map(|&o| FieldMap::new().with("composition_offset", FieldValue::I32(o)))
            .collect();
        let cslg = composition_shift(&entries).unwrap().unwrap();
        assert_eq!(cslg.len(), 32);
        assert_eq!(&cslg[20..24], &700u32.to_be_bytes());
        assert!(composition_shift(&[]).unwrap().is_none());
    }

    #[test]
    fn test_composition_shift_rejects_wide_offsets() {
        let entries = [FieldMap::new().with(
            "composition_offset",
            FieldValue::I64(i32::MAX as i64 + 1),
        )];
        let err = composition_shift(&entries).unwrap_err();
        assert!(matches!(err, Error::Synthesis { atom, .. } if atom == FourCC::CSLG));
        assert_eq!(err.stage(), crate::Stage::Synthesize);
    }
}
