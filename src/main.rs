mod cli;

use livewall::{config, render};
use livewall_media::{analyze_track, inspect, prepare_wallpaper_file, AtomOverlay, Registry};

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Validate reports config errors itself, so it must not fail here
    let config_path = match &cli.command {
        Commands::Validate { config: Some(path) } => Some(path.clone()),
        _ => cli.config.clone(),
    };
    let loaded = config::load_config_or_default(config_path.as_deref());

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "livewall=trace,livewall_media=trace".to_string()
        } else {
            let level = loaded
                .as_ref()
                .map(|c| c.logging.level.to_ascii_lowercase())
                .unwrap_or_else(|_| "info".to_string());
            format!("livewall={level},livewall_media={level}")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Prepare { input, output } => prepare_file(&input, output.as_deref(), loaded?),
        Commands::Inspect { file, json, depth } => inspect_file(&file, json, depth),
        Commands::Temporal { file, json } => temporal_file(&file, json),
        Commands::Validate { config: _ } => validate_config(config_path.as_deref(), loaded),
    }
}

fn read_input(file: &Path) -> Result<Vec<u8>> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }
    std::fs::read(file).with_context(|| format!("Failed to read {:?}", file))
}

fn prepare_file(input: &Path, output: Option<&Path>, config: config::Config) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.prepare.output_path(input));
    if output == input {
        anyhow::bail!("Output would overwrite the input: {:?}", output);
    }

    tracing::info!("Processing file: {:?}", input);
    let report = match prepare_wallpaper_file(input, &output, &config.prepare.options()) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(stage = %e.stage(), "Preparation failed: {}", e);
            anyhow::bail!("{} ({})", e.user_message(), e);
        }
    };

    println!("Prepared: {}", output.display());
    if let Some(track_id) = report.track_id {
        println!("Track: {}", track_id);
    }
    println!("Samples: {}", report.sample_count);
    println!("Temporal pattern: {} samples", report.pattern_len);
    let injected: Vec<String> = report.injected.iter().map(|t| t.to_string()).collect();
    println!("Injected: {}", injected.join(", "));
    if report.replaced > 0 {
        println!("Replaced {} atoms from an earlier preparation", report.replaced);
    }
    if let Some(issue) = &report.analysis_issue {
        println!("Warning: temporal analysis incomplete: {}", issue);
    }

    Ok(())
}

fn inspect_file(file: &Path, json: bool, depth: Option<usize>) -> Result<()> {
    let data = read_input(file)?;
    let tree = render::prune(&inspect(&data, &Registry::standard()), depth);

    if json {
        let json_str = serde_json::to_string_pretty(&tree)?;
        println!("{}", json_str);
    } else {
        print!("{}", render::render_tree(&tree));
    }

    Ok(())
}

fn temporal_file(file: &Path, json: bool) -> Result<()> {
    let data = read_input(file)?;
    let (_, overlay) = AtomOverlay::parse(Bytes::from(data), &Registry::standard());
    let analysis = analyze_track(&overlay).context("No analyzable video track")?;
    let summary = render::TemporalSummary::new(&analysis);

    if json {
        let json_str = serde_json::to_string_pretty(&summary)?;
        println!("{}", json_str);
    } else {
        print!("{}", summary.render());
    }

    Ok(())
}

fn validate_config(path: Option<&Path>, loaded: Result<config::Config>) -> Result<()> {
    let config = loaded?;
    match path.map(Path::to_path_buf).or_else(config::find_default_config) {
        Some(p) => println!("Validating config: {:?}", p),
        None => println!("No config file specified, using defaults"),
    }

    println!("✓ Configuration is valid");
    println!("  Strict parsing: {}", config.prepare.strict_parsing);
    println!("  Large offsets: {:?}", config.prepare.large_offsets);
    println!("  Output suffix: {}", config.prepare.output_suffix);
    if let Some(dir) = &config.prepare.output_dir {
        println!("  Output dir: {}", dir.display());
    }
    println!("  Log level: {}", config.logging.level);

    Ok(())
}
