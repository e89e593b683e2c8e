use livewall_media::{LargeOffsetPolicy, PrepareOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub prepare: PrepareConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrepareConfig {
    /// Refuse files with truncated atoms instead of preparing what parsed
    #[serde(default)]
    pub strict_parsing: bool,

    /// What to do with 64-bit chunk offset tables
    #[serde(default)]
    pub large_offsets: LargeOffsets,

    /// Appended to the input file stem when no output path is given
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,

    /// Directory for prepared files (default: next to the input)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_output_suffix() -> String {
    "-wallpaper".to_string()
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            strict_parsing: false,
            large_offsets: LargeOffsets::default(),
            output_suffix: default_output_suffix(),
            output_dir: None,
        }
    }
}

impl PrepareConfig {
    pub fn options(&self) -> PrepareOptions {
        PrepareOptions {
            strict_parsing: self.strict_parsing,
            large_offsets: self.large_offsets.into(),
        }
    }

    /// Where `prepare` writes when no output path is given.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "wallpaper".to_string());
        let ext = input
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mov".to_string());
        let name = format!("{}{}.{}", stem, self.output_suffix, ext);

        match &self.output_dir {
            Some(dir) => dir.join(name),
            None => input.with_file_name(name),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LargeOffsets {
    #[default]
    Patch,
    Reject,
}

impl From<LargeOffsets> for LargeOffsetPolicy {
    fn from(value: LargeOffsets) -> Self {
        match value {
            LargeOffsets::Patch => LargeOffsetPolicy::Patch,
            LargeOffsets::Reject => LargeOffsetPolicy::Reject,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default level when neither RUST_LOG nor --verbose is given
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

pub const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
