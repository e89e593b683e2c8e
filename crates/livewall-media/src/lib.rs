//! Livewall-Media: QuickTime atom parsing, patching and wallpaper preparation
//!
//! This crate turns an H.265 QuickTime movie into one the system wallpaper
//! player accepts. It parses the atom tree, patches the video track in a
//! mutable overlay, and writes the file back with every untouched atom
//! copied byte for byte.
//!
//! # Modules
//!
//! - `cursor` - Big-endian reads and writes, fixed-point and string fields
//! - `atom` - Atom headers, the parse tree and decoded field values
//! - `registry` / `codec` - Per-type decoders and encoders
//! - `parser` - Recursive atom parser with truncation diagnostics
//! - `overlay` - Mutable arena over the parse tree, copy-or-rebuild writer
//! - `temporal` - HEVC temporal-id extraction and pattern packing
//! - `synth` - Builders for the injected wallpaper atoms
//! - `transform` - The wallpaper track transform
//! - `rebuild` - Final file layout and chunk offset relocation
//! - `prepare` - One-call pipeline over bytes or files
//!
//! # Architecture
//!
//! Preparing a movie runs these steps:
//!
//! 1. Parsing the file into an [`AtomTree`] with the standard [`Registry`]
//! 2. Building an [`AtomOverlay`] that shares the source bytes
//! 3. Reading the temporal id of every video sample from the media data
//! 4. Patching headers and injecting `tapt`, `sgpd`, `csgm` and `cslg`
//! 5. Laying out `ftyp`, `wide`, `mdat`, `moov` and shifting chunk offsets

pub mod atom;
pub mod codec;
pub mod cursor;
pub mod error;
pub mod overlay;
pub mod parser;
pub mod prepare;
pub mod rebuild;
pub mod registry;
pub mod synth;
pub mod temporal;
pub mod transform;

#[cfg(test)]
mod test_util;

pub use atom::{AtomTree, FieldMap, FieldValue, FourCC, ParseIssue, ParsedAtom};
pub use error::{Error, Result, Stage};
pub use overlay::{AtomId, AtomOverlay};
pub use parser::AtomParser;
pub use prepare::{inspect, prepare_wallpaper, prepare_wallpaper_file, PrepareOptions, Prepared};
pub use rebuild::{ContainerRebuilder, LargeOffsetPolicy};
pub use registry::Registry;
pub use temporal::{AnalysisIncomplete, TemporalAnalysis};
pub use transform::{analyze_track, TransformReport, WallpaperTransform};
