//! chunkdupe - chunked duplicate detection for very large media files
//!
//! Files are first partitioned by size. Within each size group the engine
//! hashes one fixed-size chunk per file per round and retires a file as soon
//! as its cumulative signature is unique, so a distinct file costs only the
//! bytes up to its first differing chunk. The chunk size and the number of
//! files read concurrently are derived from a memory budget.
//!
//! ```no_run
//! use chunkdupe::duplicates::{DuplicateFinder, FinderConfig};
//! use std::path::PathBuf;
//!
//! let config = FinderConfig::default()
//!     .with_memory_budget(4 * 1024 * 1024 * 1024)
//!     .with_parallelism_ceiling(8);
//! let report = DuplicateFinder::new(config)
//!     .find_duplicates_in_paths(&[PathBuf::from("/mnt/nas/video")], None)
//!     .unwrap();
//!
//! for cluster in &report.clusters {
//!     println!("{} copies of {} bytes", cluster.len(), cluster.size);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use cli::{Cli, Commands, OutputFormat, ScanArgs};
use config::Config;
use duplicates::{DedupeReport, DuplicateFinder};
use error::ExitCode;
use output::{CsvOutput, JsonOutput, TextOutput};
use progress::Progress;

/// Run the command described by `cli`.
///
/// Returns the exit code of a completed run. Cancellation completes the run
/// with [`ExitCode::Interrupted`].
///
/// # Errors
///
/// Returns an error if configuration is invalid, a root cannot be scanned,
/// strict mode hits an unreadable file, an engine invariant breaks, or the
/// report cannot be written.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    match cli.command {
        Commands::Scan(ref args) => run_scan(&cli, args),
    }
}

fn run_scan(cli: &Cli, args: &ScanArgs) -> Result<ExitCode> {
    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.merge_scan_args(args);
    config.validate().context("Invalid configuration")?;
    config.clamp_to_physical_memory();
    log::debug!("Effective configuration: {config:?}");

    let handler = signal::install_handler().context("Failed to set up Ctrl+C handling")?;
    let progress = Progress::new(cli.quiet).with_shutdown_flag(handler.get_flag());
    let finder_config = config
        .finder_config()
        .with_shutdown_flag(handler.get_flag())
        .with_progress_callback(Arc::new(progress));

    let finder = DuplicateFinder::new(finder_config);
    let report = finder
        .find_duplicates_in_paths(&args.sources, args.target.as_deref())
        .context("Scan failed")?;

    let stats = finder.hasher().stats();
    log::info!(
        "Hashed {} chunks ({}), {} read failures",
        stats.chunks_hashed(),
        duplicates::format_size(stats.bytes_read()),
        stats.failures()
    );

    let exit_code = ExitCode::for_report(&report);
    let color = !cli.no_color && args.output_file.is_none() && io::stdout().is_terminal();
    write_report(&report, exit_code, args.output, args.output_file.as_deref(), color)?;

    Ok(exit_code)
}

/// Write `report` in `format` to `path`, or to stdout.
///
/// # Errors
///
/// Returns an error if the file cannot be created or writing fails.
pub fn write_report(
    report: &DedupeReport,
    exit_code: ExitCode,
    format: OutputFormat,
    path: Option<&Path>,
    color: bool,
) -> Result<()> {
    let mut writer: Box<dyn Write> = match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    match format {
        OutputFormat::Text => TextOutput::new(report)
            .with_color(color)
            .write_to(&mut writer)
            .context("Failed to write report")?,
        OutputFormat::Json => JsonOutput::new(report, exit_code)
            .write_to(&mut writer, true)
            .context("Failed to write JSON report")?,
        OutputFormat::Csv => CsvOutput::new(report)
            .write_to(&mut writer)
            .context("Failed to write CSV report")?,
    }
    writer.flush().context("Failed to flush report")?;
    Ok(())
}
