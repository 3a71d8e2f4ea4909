//! Command-line interface definitions for chunkdupe.
//!
//! Global options (verbosity, color, error format) come before the
//! subcommand. Every scan option left unset falls back to the configuration
//! file and environment, see [`crate::config`].
//!
//! # Example
//!
//! ```bash
//! # Find duplicates across two shares
//! chunkdupe scan /mnt/nas/movies /mnt/nas/incoming
//!
//! # Check an import folder against an archive, JSON for scripting
//! chunkdupe scan /mnt/import --target /mnt/archive --output json
//!
//! # Smaller memory footprint on a small NAS box
//! chunkdupe -v scan /volume1/video --memory-budget 2GiB --parallelism 4
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::scanner::MediaType;

/// Chunked duplicate finder for very large media files.
///
/// chunkdupe groups media files by size, then hashes same-sized files one
/// chunk at a time and stops reading a file as soon as it is proven unique.
#[derive(Debug, Parser)]
#[command(name = "chunkdupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Report fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan directories for duplicate media files
    Scan(ScanArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directories to scan; all of them go into one registry
    #[arg(value_name = "SOURCE", required = true)]
    pub sources: Vec<PathBuf>,

    /// Directory to compare the sources against
    ///
    /// Only files whose size also occurs in the sources are considered,
    /// unless --no-size-limit is given.
    #[arg(long, value_name = "DIR")]
    pub target: Option<PathBuf>,

    /// Import every target file, not only those matching a source size
    #[arg(long, requires = "target")]
    pub no_size_limit: bool,

    /// Upper bound on chunk bytes held in memory at once (e.g., 8GiB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub memory_budget: Option<u64>,

    /// Maximum number of files hashed concurrently within a size group
    #[arg(long, value_name = "N")]
    pub parallelism: Option<usize>,

    /// Smallest chunk size the scheduler may choose (e.g., 128MiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_chunk: Option<u64>,

    /// Abort on the first unreadable file instead of marking it errored
    #[arg(long)]
    pub strict: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Minimum file size to consider (e.g., 1MB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Media categories to include, comma separated
    #[arg(long, value_name = "TYPES", value_delimiter = ',')]
    pub media: Vec<MediaType>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(long, value_name = "PATH")]
    pub output_file: Option<PathBuf>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Output format for scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary and clusters
    Text,
    /// JSON for scripting
    Json,
    /// CSV, one row per file
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use chunkdupe::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// assert_eq!(parse_size("32GiB").unwrap(), 34_359_738_368);
/// ```
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// a negative number, or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }
    if s.starts_with('-') {
        return Err("Size cannot be negative".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
