//! CLI argument definitions for the Scrivo binary.
//!
//! Uses `clap` with derive macros. Priority resolution for paths and the
//! log level: CLI args > env vars > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Scrivo - background dictation with per-application scenario profiles.
#[derive(Parser, Debug)]
#[command(name = "scrivo", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the dictation service (default).
    Run,
    /// Resolve and print the effective configuration for an application.
    Resolve {
        #[arg(long)]
        process_name: Option<String>,
        #[arg(long)]
        exe_path: Option<String>,
        #[arg(long)]
        window_title: Option<String>,
    },
    /// Show or clear the dictation history.
    History {
        /// Delete all entries instead of listing them.
        #[arg(long)]
        clear: bool,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SCRIVO_CONFIG env var > ~/.scrivo/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref path) = self.config {
            return path.clone();
        }
        if let Ok(path) = std::env::var("SCRIVO_CONFIG") {
            return PathBuf::from(path);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > SCRIVO_LOG env var > "info".
    pub fn resolve_log_level(&self) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        std::env::var("SCRIVO_LOG").unwrap_or_else(|_| "info".to_string())
    }
}

fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".scrivo").join("config.toml")
}
