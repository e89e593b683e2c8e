//! Error types for livewall-media.

use crate::atom::FourCC;
use std::io;
use thiserror::Error;

/// Result type for livewall-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    LocateAncestor,
    Extract,
    Synthesize,
    Rebuild,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Parse => "parse",
            Stage::LocateAncestor => "locate-ancestor",
            Stage::Extract => "extract",
            Stage::Synthesize => "synthesize",
            Stage::Rebuild => "rebuild",
        };
        f.write_str(name)
    }
}

/// Error type for livewall-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A required atom is missing from the tree.
    #[error("Atom not found: {0}")]
    AtomNotFound(FourCC),

    /// The track lacks a sample table atom needed to locate its samples.
    #[error("Sample table has no {0} atom")]
    MissingSampleTable(FourCC),

    /// A required top-level atom is missing from the file.
    #[error("Missing top-level atom: {0}")]
    MissingTopLevel(FourCC),

    /// A modified leaf atom has no registered encoder.
    #[error("No encoder registered for modified atom: {0}")]
    MissingEncoder(FourCC),

    /// The parser stopped early and strict parsing was requested.
    #[error("Truncated input at offset {offset}: atom declares {declared} bytes, {available} available")]
    TruncatedInput {
        offset: u64,
        declared: u64,
        available: u64,
    },

    /// A chunk offset no longer fits its table after relocation.
    #[error("Chunk offset {offset} cannot be shifted by {delta}")]
    OffsetOverflow { offset: u64, delta: i64 },

    /// The file carries 64-bit chunk offsets and the caller refused them.
    #[error("64-bit chunk offset tables are not supported by this configuration")]
    LargeOffsetsUnsupported,

    /// Synthesized payload does not fit its on-disk field.
    #[error("Cannot synthesize {atom}: {reason}")]
    Synthesis { atom: FourCC, reason: String },
}

impl Error {
    /// Create a synthesis error.
    pub fn synthesis(atom: FourCC, reason: impl Into<String>) -> Self {
        Self::Synthesis {
            atom,
            reason: reason.into(),
        }
    }

    /// The stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Error::Io(_) | Error::TruncatedInput { .. } => Stage::Parse,
            Error::AtomNotFound(_) => Stage::LocateAncestor,
            Error::MissingSampleTable(_) => Stage::Extract,
            Error::Synthesis { .. } => Stage::Synthesize,
            Error::MissingTopLevel(_)
            | Error::MissingEncoder(_)
            | Error::OffsetOverflow { .. }
            | Error::LargeOffsetsUnsupported => Stage::Rebuild,
        }
    }

    /// Message suitable for end users; the structured kind belongs in logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::Io(_) => "The video file could not be read or written.",
            _ => "This video could not be prepared as a wallpaper.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_atom() {
        let err = Error::AtomNotFound(FourCC::STBL);
        assert_eq!(err.to_string(), "Atom not found: stbl");
        assert_eq!(err.stage(), Stage::LocateAncestor);
    }

    #[test]
    fn test_offset_overflow_display() {
        let err = Error::OffsetOverflow {
            offset: 12,
            delta: -100,
        };
        assert_eq!(err.to_string(), "Chunk offset 12 cannot be shifted by -100");
        assert_eq!(err.stage(), Stage::Rebuild);
        assert_eq!(err.stage().to_string(), "rebuild");
    }

    #[test]
    fn test_user_message_is_generic() {
        let err = Error::MissingEncoder(FourCC(*b"abcd"));
        assert!(!err.user_message().contains("abcd"));
    }
}
