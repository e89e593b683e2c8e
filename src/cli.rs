use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "livewall")]
#[command(author, version, about = "Prepare H.265 QuickTime movies as live wallpapers")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Prepare a movie for use as a live wallpaper
    Prepare {
        /// Input movie
        #[arg(required = true)]
        input: PathBuf,

        /// Output path (default: input name plus the configured suffix)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the atom tree of a movie
    Inspect {
        /// File to inspect
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Maximum nesting depth to show
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Show the temporal layer pattern of the video track
    Temporal {
        /// File to analyze
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },
}
