//! Rewrites the video track of a movie so it plays as a live wallpaper.
//!
//! The transform works on an [`AtomOverlay`] in place: it adjusts a few
//! header fields, injects the aperture, sample group and segment map atoms,
//! and puts the sample table children into the order the player expects.

use crate::atom::{FieldValue, FourCC};
use crate::overlay::{AtomId, AtomOverlay, MutableAtom};
use crate::registry::Registry;
use crate::synth;
use crate::temporal::{self, AnalysisIncomplete, SampleTableSnapshot, TemporalAnalysis};
use crate::{Error, Result};
use tracing::{debug, info, warn};

/// Track header flags: enabled, in movie, in preview and in poster.
pub const WALLPAPER_TRACK_FLAGS: u32 = 0x0F;

/// Video media header graphics mode used for wallpapers (dither copy).
pub const WALLPAPER_GRAPHICS_MODE: u16 = 0x40;

/// Op color paired with [`WALLPAPER_GRAPHICS_MODE`].
pub const WALLPAPER_OPCOLOR: [u16; 3] = [0x8000; 3];

/// Order of the sample table children after the transform. Types not listed
/// keep their relative order after these.
pub const SAMPLE_TABLE_ORDER: [FourCC; 12] = [
    FourCC::STSD,
    FourCC::SGPD,
    FourCC::CSGM,
    FourCC::STTS,
    FourCC::CTTS,
    FourCC::CSLG,
    FourCC::STSS,
    FourCC::SDTP,
    FourCC::STSC,
    FourCC::STSZ,
    FourCC::STCO,
    FourCC::CO64,
];

/// Sort key of a sample table child.
pub fn sample_table_rank(atom_type: FourCC) -> usize {
    SAMPLE_TABLE_ORDER
        .iter()
        .position(|&t| t == atom_type)
        .unwrap_or(SAMPLE_TABLE_ORDER.len())
}

/// Summary of what a transform did.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct TransformReport {
    /// Id of the patched track, when its header carries one.
    pub track_id: Option<u32>,
    pub sample_count: usize,
    /// Length of the repeating temporal-id pattern written to the segment maps.
    pub pattern_len: usize,
    /// Packed segment map payload size in bytes.
    pub payload_len: usize,
    /// Atom types inserted, in insertion order.
    pub injected: Vec<FourCC>,
    /// Atoms from an earlier preparation that were replaced.
    pub replaced: usize,
    /// Why the temporal analysis is only partial, if it is.
    #[cfg_attr(feature = "serialize", serde(serialize_with = "serialize_issue"))]
    pub analysis_issue: Option<AnalysisIncomplete>,
}

#[cfg(feature = "serialize")]
fn serialize_issue<S: serde::Serializer>(
    issue: &Option<AnalysisIncomplete>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match issue {
        Some(issue) => serializer.serialize_some(&issue.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Atoms of the track being patched.
struct TrackAtoms {
    trak: AtomId,
    mdia: AtomId,
    minf: AtomId,
    stbl: AtomId,
}

/// The wallpaper transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallpaperTransform;

impl WallpaperTransform {
    pub fn new() -> Self {
        Self
    }

    /// Patch `overlay` in place. Sample data is read from the overlay's
    /// source bytes.
    pub fn apply(&self, overlay: &mut AtomOverlay, registry: &Registry) -> Result<TransformReport> {
        let track = locate_track(overlay)?;

        let table = sample_table(overlay, track.stbl)?;
        let analysis = temporal::extract_temporal_ids(overlay.source(), &table);
        if let Some(issue) = &analysis.issue {
            warn!("Temporal analysis incomplete: {}", issue);
        }
        let ids = analysis.temporal_ids;
        let pattern_len = temporal::detect_pattern(&ids).len();
        let payload_len = temporal::segment_map_payload(&ids).len();
        debug!(
            "Extracted {} temporal ids, pattern length {}",
            ids.len(),
            pattern_len
        );

        patch_headers(overlay, &track);
        let replaced = remove_injected(overlay, &track);
        if replaced > 0 {
            warn!("Replacing {} atoms from an earlier preparation", replaced);
        }

        let mut injected = Vec::new();
        let mut inject = |overlay: &mut AtomOverlay, parent: AtomId, at: Option<usize>, bytes: &[u8]| {
            for (i, id) in overlay.import(bytes, registry).into_iter().enumerate() {
                injected.push(overlay.atom_type(id));
                match at {
                    Some(index) => overlay.insert_child(parent, index + i, id),
                    None => overlay.append_child(parent, id),
                }
            }
        };

        let (width, height) = overlay
            .child(track.trak, FourCC::TKHD)
            .map(|tkhd| {
                let fields = overlay.fields(tkhd);
                (
                    fields.f64("track_width").unwrap_or(0.0),
                    fields.f64("track_height").unwrap_or(0.0),
                )
            })
            .unwrap_or((0.0, 0.0));
        let tapt_index = overlay
            .children(track.trak)
            .iter()
            .position(|&id| overlay.atom_type(id) == FourCC::TKHD)
            .map(|i| i + 1);
        inject(
            overlay,
            track.trak,
            tapt_index,
            &synth::aperture_dimensions(width, height)[..],
        );

        let base_duration = overlay
            .child(track.stbl, FourCC::STTS)
            .and_then(|stts| overlay.fields(stts).records("entries"))
            .and_then(|entries| entries.first())
            .and_then(|entry| entry.u32("sample_duration"))
            .unwrap_or(synth::DEFAULT_BASE_DURATION);
        for sgpd in synth::sample_group_descriptions(base_duration) {
            inject(overlay, track.stbl, None, &sgpd[..]);
        }
        for csgm in synth::segment_maps(&ids)? {
            inject(overlay, track.stbl, None, &csgm[..]);
        }

        let ctts_entries = overlay
            .child(track.stbl, FourCC::CTTS)
            .and_then(|ctts| overlay.fields(ctts).records("entries"))
            .unwrap_or(&[]);
        if let Some(cslg) = synth::composition_shift(ctts_entries)? {
            inject(overlay, track.stbl, None, &cslg[..]);
        }

        overlay.sort_children_by_key(track.stbl, sample_table_rank);

        let track_id = overlay
            .child(track.trak, FourCC::TKHD)
            .and_then(|tkhd| overlay.fields(tkhd).u32("track_id"));
        info!(
            "Prepared track {:?}: {} samples, injected {}",
            track_id,
            ids.len(),
            injected.len()
        );

        Ok(TransformReport {
            track_id,
            sample_count: ids.len(),
            pattern_len,
            payload_len,
            injected,
            replaced,
            analysis_issue: analysis.issue,
        })
    }
}

/// Temporal analysis of the track [`WallpaperTransform::apply`] would patch.
pub fn analyze_track(overlay: &AtomOverlay) -> Result<TemporalAnalysis> {
    let track = locate_track(overlay)?;
    let table = sample_table(overlay, track.stbl)?;
    Ok(temporal::extract_temporal_ids(overlay.source(), &table))
}

/// Find the track to patch: the first video track, else the first track.
fn locate_track(overlay: &AtomOverlay) -> Result<TrackAtoms> {
    let moov = overlay
        .root(FourCC::MOOV)
        .ok_or(Error::AtomNotFound(FourCC::MOOV))?;
    let traks = overlay.children_of_type(moov, FourCC::TRAK);

    let is_video = |trak: AtomId| {
        overlay
            .child(trak, FourCC::MDIA)
            .and_then(|mdia| overlay.child(mdia, FourCC::HDLR))
            .and_then(|hdlr| overlay.fields(hdlr).code("component_subtype"))
            == Some(FourCC::VIDE)
    };
    let trak = traks
        .iter()
        .copied()
        .find(|&trak| is_video(trak))
        .or_else(|| traks.first().copied())
        .ok_or(Error::AtomNotFound(FourCC::TRAK))?;

    let descend = |parent: AtomId, atom_type: FourCC| {
        overlay
            .child(parent, atom_type)
            .ok_or(Error::AtomNotFound(atom_type))
    };
    let mdia = descend(trak, FourCC::MDIA)?;
    let minf = descend(mdia, FourCC::MINF)?;
    let stbl = descend(minf, FourCC::STBL)?;
    Ok(TrackAtoms {
        trak,
        mdia,
        minf,
        stbl,
    })
}

fn sample_table(overlay: &AtomOverlay, stbl: AtomId) -> Result<SampleTableSnapshot> {
    let require = |atom_type: FourCC| {
        overlay
            .child(stbl, atom_type)
            .ok_or(Error::MissingSampleTable(atom_type))
    };
    let stsz = require(FourCC::STSZ)?;
    let stsc = require(FourCC::STSC)?;
    let offsets = overlay
        .child(stbl, FourCC::STCO)
        .or_else(|| overlay.child(stbl, FourCC::CO64))
        .ok_or(Error::MissingSampleTable(FourCC::STCO))?;

    Ok(SampleTableSnapshot::from_fields(
        overlay.fields(stsz),
        overlay.fields(stsc),
        overlay.fields(offsets),
    ))
}

fn patch_headers(overlay: &mut AtomOverlay, track: &TrackAtoms) {
    if let Some(tkhd) = overlay.child(track.trak, FourCC::TKHD) {
        overlay.set_field(tkhd, "flags", FieldValue::U32(WALLPAPER_TRACK_FLAGS));
    }

    if let Some(vmhd) = overlay.child(track.minf, FourCC::VMHD) {
        overlay.set_field(vmhd, "graphics_mode", FieldValue::U16(WALLPAPER_GRAPHICS_MODE));
        overlay.set_field(vmhd, "opcolor", FieldValue::U16s(WALLPAPER_OPCOLOR.to_vec()));
    }

    for parent in [track.mdia, track.minf] {
        let Some(hdlr) = overlay.child(parent, FourCC::HDLR) else {
            continue;
        };
        if overlay.fields(hdlr).code("component_subtype") == Some(FourCC::URL) {
            overlay.set_field(hdlr, "component_subtype", FieldValue::Code(FourCC::ALIS));
        }
    }

    let elst = overlay
        .child(track.trak, FourCC::EDTS)
        .and_then(|edts| overlay.child(edts, FourCC::ELST));
    if let Some(elst) = elst {
        let has_entries = overlay
            .fields(elst)
            .records("entries")
            .is_some_and(|entries| !entries.is_empty());
        if has_entries {
            let fields = overlay.fields_mut(elst);
            let zero = match fields.u64("version") {
                Some(1) => FieldValue::I64(0),
                _ => FieldValue::I32(0),
            };
            if let Some(first) = fields
                .get_mut("entries")
                .and_then(FieldValue::as_records_mut)
                .and_then(|entries| entries.first_mut())
            {
                first.set("media_time", zero);
            }
        }
    }
}

/// Whether a sample table child is one this transform injects.
fn is_injected(atom: &MutableAtom) -> bool {
    let grouping = match atom.atom_type {
        FourCC::CSGM => atom.fields().code("sub_type"),
        _ => atom.fields().code("grouping_type"),
    };
    match atom.atom_type {
        FourCC::SGPD | FourCC::CSGM => {
            matches!(grouping, Some(FourCC::TSCL) | Some(FourCC::TSAS))
        }
        FourCC::CSLG => true,
        _ => false,
    }
}

/// Drop atoms a previous preparation added. Returns how many were removed.
fn remove_injected(overlay: &mut AtomOverlay, track: &TrackAtoms) -> usize {
    overlay.retain_children(track.trak, |atom| atom.atom_type != FourCC::TAPT)
        + overlay.retain_children(track.stbl, |atom| !is_injected(atom))
}
