//! Writes the patched movie back out as a single file.
//!
//! The output layout is fixed: `ftyp`, an 8-byte `wide` atom, `mdat`, then
//! `moov`. Moving the media data changes where every chunk starts, so the
//! chunk offset tables are shifted by the distance the mdat payload moved.

use crate::atom::{FieldValue, FourCC};
use crate::cursor::AtomWriteExt;
use crate::overlay::{AtomId, AtomOverlay};
use crate::registry::Registry;
use crate::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::ops::Range;
use tracing::{debug, info};

/// Size of the `wide` atom written before the media data.
pub const WIDE_ATOM_LEN: u64 = 8;

/// What to do with 64-bit chunk offset tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LargeOffsetPolicy {
    /// Shift `co64` entries like `stco` entries.
    #[default]
    Patch,
    /// Refuse inputs that carry a `co64` table.
    Reject,
}

/// Location of the media data in the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MediaData {
    header: Vec<u8>,
    content: Range<u64>,
}

/// Lays out the final file and relocates the chunk offsets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerRebuilder {
    large_offsets: LargeOffsetPolicy,
}

impl ContainerRebuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_large_offsets(mut self, policy: LargeOffsetPolicy) -> Self {
        self.large_offsets = policy;
        self
    }

    /// Patch the chunk offsets in `overlay` and serialize the file.
    pub fn rebuild(&self, overlay: &mut AtomOverlay, registry: &Registry) -> Result<BytesMut> {
        let mdat = overlay
            .root(FourCC::MDAT)
            .ok_or(Error::MissingTopLevel(FourCC::MDAT))?;
        let moov = overlay
            .root(FourCC::MOOV)
            .ok_or(Error::MissingTopLevel(FourCC::MOOV))?;

        let large_tables = overlay.find_all(moov, FourCC::CO64);
        if !large_tables.is_empty() && self.large_offsets == LargeOffsetPolicy::Reject {
            return Err(Error::LargeOffsetsUnsupported);
        }

        let ftyp = match overlay.root(FourCC::FTYP) {
            Some(ftyp) => overlay.atom_bytes(ftyp, registry)?,
            None => BytesMut::new(),
        };
        let media = media_data(overlay, mdat)?;

        let new_start = ftyp.len() as u64 + WIDE_ATOM_LEN + media.header.len() as u64;
        let delta = new_start as i64 - media.content.start as i64;
        debug!(
            "Media data moves from {} to {} (delta {})",
            media.content.start, new_start, delta
        );

        if delta != 0 {
            for stco in overlay.find_all(moov, FourCC::STCO) {
                shift_stco(overlay, stco, delta)?;
            }
            for co64 in large_tables {
                shift_co64(overlay, co64, delta)?;
            }
        }

        let moov = overlay.atom_bytes(moov, registry)?;
        let content = &overlay.source()[media.content.start as usize..media.content.end as usize];

        let mut out = BytesMut::with_capacity(
            ftyp.len() + WIDE_ATOM_LEN as usize + media.header.len() + content.len() + moov.len(),
        );
        out.put_slice(&ftyp);
        out.put_u32(WIDE_ATOM_LEN as u32);
        out.put_fourcc(FourCC::WIDE);
        out.put_slice(&media.header);
        out.put_slice(content);
        out.put_slice(&moov);

        info!(
            "Rebuilt movie: {} bytes of media data, {} bytes total",
            content.len(),
            out.len()
        );
        Ok(out)
    }
}

/// Header and payload range of the source `mdat`.
///
/// The header is kept as written unless it declared size 0, which only works
/// for the last atom of a file; that one gets an explicit size.
fn media_data(overlay: &AtomOverlay, mdat: AtomId) -> Result<MediaData> {
    let origin = overlay
        .get(mdat)
        .origin()
        .cloned()
        .ok_or(Error::MissingTopLevel(FourCC::MDAT))?;
    let source = overlay.source();
    let start = origin.start as usize;

    let declared = u32::from_be_bytes([
        source[start],
        source[start + 1],
        source[start + 2],
        source[start + 3],
    ]);
    let header_len = if declared == 1 { 16 } else { 8 };
    let content = origin.start + header_len..origin.end;

    let header = if declared == 0 {
        explicit_header(content.end - content.start)
    } else {
        source[start..start + header_len as usize].to_vec()
    };
    Ok(MediaData { header, content })
}

fn explicit_header(content_len: u64) -> Vec<u8> {
    let mut header = Vec::with_capacity(16);
    match u32::try_from(content_len + 8) {
        Ok(size) => {
            header.put_u32(size);
            header.put_fourcc(FourCC::MDAT);
        }
        Err(_) => {
            header.put_u32(1);
            header.put_fourcc(FourCC::MDAT);
            header.put_u64(content_len + 16);
        }
    }
    header
}

fn shift(offset: u64, delta: i64) -> Result<u64> {
    offset
        .checked_add_signed(delta)
        .ok_or(Error::OffsetOverflow { offset, delta })
}

fn shift_stco(overlay: &mut AtomOverlay, stco: AtomId, delta: i64) -> Result<()> {
    let offsets = overlay
        .field(stco, "chunk_offsets")
        .and_then(FieldValue::as_u32s)
        .unwrap_or(&[])
        .iter()
        .map(|&offset| {
            let shifted = shift(offset as u64, delta)?;
            u32::try_from(shifted).map_err(|_| Error::OffsetOverflow {
                offset: offset as u64,
                delta,
            })
        })
        .collect::<Result<Vec<u32>>>()?;
    debug!("Shifting {} stco entries by {}", offsets.len(), delta);
    overlay.set_field(stco, "chunk_offsets", FieldValue::U32s(offsets));
    Ok(())
}

fn shift_co64(overlay: &mut AtomOverlay, co64: AtomId, delta: i64) -> Result<()> {
    let offsets = overlay
        .field(co64, "chunk_offsets")
        .and_then(FieldValue::as_u64s)
        .unwrap_or(&[])
        .iter()
        .map(|&offset| shift(offset, delta))
        .collect::<Result<Vec<u64>>>()?;
    debug!("Shifting {} co64 entries by {}", offsets.len(), delta);
    overlay.set_field(co64, "chunk_offsets", FieldValue::U64s(offsets));
    Ok(())
}
