//! Livewall - prepare H.265 QuickTime movies as live wallpapers
//!
//! This library crate exposes the host-side pieces of the CLI for
//! integration testing. The atom work itself lives in `livewall-media`.

pub mod config;
pub mod render;
