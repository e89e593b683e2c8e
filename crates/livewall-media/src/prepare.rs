//! One-call preparation of a movie, from bytes or from a file on disk.

use crate::atom::AtomTree;
use crate::overlay::AtomOverlay;
use crate::parser::AtomParser;
use crate::rebuild::{ContainerRebuilder, LargeOffsetPolicy};
use crate::registry::Registry;
use crate::transform::{TransformReport, WallpaperTransform};
use crate::{Error, Result};
use bytes::Bytes;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Options for [`prepare_wallpaper`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareOptions {
    /// Fail on the first truncated atom instead of working with what parsed.
    pub strict_parsing: bool,
    pub large_offsets: LargeOffsetPolicy,
}

/// A prepared movie and what was done to it.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub bytes: Bytes,
    pub report: TransformReport,
}

/// Parse `data` with `registry` without changing anything.
pub fn inspect(data: &[u8], registry: &Registry) -> AtomTree {
    AtomParser::new(registry).parse(data)
}

/// Prepare a movie held in memory.
pub fn prepare_wallpaper(data: Bytes, options: &PrepareOptions) -> Result<Prepared> {
    let registry = Registry::standard();
    let (tree, mut overlay) = AtomOverlay::parse(data, &registry);

    if let Some(issue) = tree.issues.first() {
        if options.strict_parsing {
            return Err(Error::TruncatedInput {
                offset: issue.offset,
                declared: issue.declared,
                available: issue.available,
            });
        }
        warn!(
            "Continuing past {} truncated atoms; the first is at offset {}",
            tree.issues.len(),
            issue.offset
        );
    }
    debug!("Parsed {} top-level atoms", tree.atoms.len());

    let report = WallpaperTransform::new().apply(&mut overlay, &registry)?;
    let bytes = ContainerRebuilder::new()
        .with_large_offsets(options.large_offsets)
        .rebuild(&mut overlay, &registry)?
        .freeze();

    Ok(Prepared { bytes, report })
}

/// Prepare the movie at `src` and write it to `dst`.
///
/// The output goes to a temporary file next to `dst` that is renamed into
/// place, so `dst` is either untouched or complete.
pub fn prepare_wallpaper_file(
    src: &Path,
    dst: &Path,
    options: &PrepareOptions,
) -> Result<TransformReport> {
    info!("Preparing {} -> {}", src.display(), dst.display());
    let data = std::fs::read(src)?;
    let prepared = prepare_wallpaper(Bytes::from(data), options)?;

    let dir = match dst.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&prepared.bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dst).map_err(|e| Error::Io(e.error))?;

    info!(
        "Wrote {} ({} bytes, {} atoms injected)",
        dst.display(),
        prepared.bytes.len(),
        prepared.report.injected.len()
    );
    Ok(prepared.report)
}
