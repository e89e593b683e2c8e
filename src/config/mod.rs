mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// First existing file among the default locations
pub fn find_default_config() -> Option<PathBuf> {
    let default_paths = ["./livewall.toml", "~/.config/livewall/config.toml"];

    default_paths.iter().find_map(|path_str| {
        let path = PathBuf::from(shellexpand::tilde(path_str).as_ref());
        path.exists().then_some(path)
    })
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    match find_default_config() {
        Some(path) => load_config(&path),
        None => Ok(Config::default()),
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.prepare.output_suffix.is_empty() {
        anyhow::bail!("prepare.output_suffix cannot be empty");
    }

    if let Some(dir) = &config.prepare.output_dir {
        if !dir.exists() {
            tracing::warn!("Output directory does not exist: {:?}", dir);
        }
    }

    let level = config.logging.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        anyhow::bail!(
            "Unknown logging.level '{}' (expected one of {})",
            config.logging.level,
            LOG_LEVELS.join(", ")
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use livewall_media::LargeOffsetPolicy;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(!config.prepare.strict_parsing);
        assert_eq!(config.prepare.output_suffix, "-wallpaper");
        assert_eq!(config.logging.level, "info");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_parse_sections() {
        let config: Config = toml::from_str(
            r#"
[prepare]
strict_parsing = true
large_offsets = "reject"
output_dir = "/tmp/walls"

[logging]
level = "debug"
"#,
        )
        .unwrap();
        let options = config.prepare.options();
        assert!(options.strict_parsing);
        assert_eq!(options.large_offsets, LargeOffsetPolicy::Reject);
        assert_eq!(config.prepare.output_dir, Some(PathBuf::from("/tmp/walls")));
    }

    #[test]
    fn test_output_path() {
        let mut prepare = PrepareConfig::default();
        assert_eq!(
            prepare.output_path(Path::new("/videos/beach.mov")),
            PathBuf::from("/videos/beach-wallpaper.mov")
        );
        assert_eq!(
            prepare.output_path(Path::new("clip")),
            PathBuf::from("clip-wallpaper.mov")
        );

        prepare.output_dir = Some(PathBuf::from("/walls"));
        prepare.output_suffix = ".live".to_string();
        assert_eq!(
            prepare.output_path(Path::new("/videos/beach.MOV")),
            PathBuf::from("/walls/beach.live.MOV")
        );
    }

    #[test]
    fn test_unknown_large_offset_policy_fails_to_parse() {
        let result: std::result::Result<Config, _> =
            toml::from_str("[prepare]\nlarge_offsets = \"split\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.prepare.output_suffix.clear();
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(validate_config(&config).is_err());
    }
}
