//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// gameforge - LLM pipeline for small browser arcade games
#[derive(Parser)]
#[command(
    name = "gf",
    about = "Design, build and validate small browser arcade games with an LLM pipeline",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the full pipeline and write the resulting game
    Generate {
        /// Theme or idea to steer the design
        #[arg(short, long)]
        seed: Option<String>,

        /// Output directory for generated games
        #[arg(short, long, default_value = "games")]
        out: PathBuf,

        /// Print raw JSON events instead of a progress display
        #[arg(short, long)]
        events: bool,

        /// Number of independent games to generate concurrently
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },

    /// Run the static validator over a JavaScript file
    Validate {
        /// File to validate
        file: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Check a JavaScript file against the platform rule policy
    Check {
        /// File to check
        file: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Merge a code fragment into an accumulated program and print the result
    Merge {
        /// The program built so far
        accumulated: PathBuf,

        /// The fragment to fold in
        fragment: PathBuf,
    },
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gameforge")
        .join("logs")
        .join("gameforge.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Generate the after_help text with the log location
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let log_path = get_log_path();
    let config_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gameforge")
        .join("gameforge.yml");

    let mut help = String::new();
    help.push_str(&format!("Config is read from: ./.gameforge.yml or {}\n", config_path.display()));
    help.push_str(&format!("Logs are written to: {}\n", log_path.display()));
    help
}

/// Output format for report commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
