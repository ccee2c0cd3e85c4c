//! CLI parse: clap types for Sculpt. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Sculpt CLI - image-to-3D generation task orchestration
#[derive(Parser)]
#[command(name = "sculpt")]
#[command(about = "Run image-to-3D generation tasks against local or remote backends")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Disable all logging
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long, global = true)]
    pub log_output: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one generation task and print its final status
    Generate {
        /// Input image
        #[arg(long)]
        image: PathBuf,

        /// Task id (generated when omitted)
        #[arg(long)]
        task_id: Option<String>,

        #[arg(long)]
        seed: Option<u64>,

        /// Sparse-structure guidance strength
        #[arg(long)]
        ss_guidance: Option<f64>,

        /// Sparse-structure sampling steps
        #[arg(long)]
        ss_steps: Option<u32>,

        /// Structured-latent guidance strength
        #[arg(long)]
        slat_guidance: Option<f64>,

        /// Structured-latent sampling steps
        #[arg(long)]
        slat_steps: Option<u32>,

        /// How long to wait for the task to finish
        #[arg(long, default_value = "600")]
        wait_secs: u64,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Configuration commands (show, validate)
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Validate the effective configuration
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
