//! CSV output formatter for scan results.
//!
//! One row per registered file, ordered by path.
//!
//! # Columns
//!
//! - `path`: Path as scanned
//! - `size`: File size in bytes
//! - `verdict`: `unique`, `duplicate`, `errored` or `cancelled`
//! - `bytes_read`: Bytes read to reach the verdict (empty if unresolved)
//! - `cluster_id`: Duplicate cluster id (empty unless duplicate)
//! - `detail`: Other cluster members separated by `;`, or the error reason
//!
//! # Example
//!
//! ```
//! use chunkdupe::duplicates::DedupeReport;
//! use chunkdupe::output::csv::CsvOutput;
//!
//! let report = DedupeReport::default();
//! let csv = CsvOutput::new(&report).to_string().unwrap();
//! assert_eq!(csv.trim_end(), "path,size,verdict,bytes_read,cluster_id,detail");
//! ```

use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::duplicates::{DedupeReport, Verdict};

/// Errors that can occur during CSV output generation.
#[derive(Debug, Error)]
pub enum CsvOutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    path: String,
    size: u64,
    verdict: &'a str,
    bytes_read: Option<u64>,
    cluster_id: Option<usize>,
    detail: String,
}

/// CSV output formatter.
pub struct CsvOutput<'a> {
    report: &'a DedupeReport,
}

impl<'a> CsvOutput<'a> {
    /// Create a new CSV output formatter.
    #[must_use]
    pub fn new(report: &'a DedupeReport) -> Self {
        Self { report }
    }

    /// Write the CSV output to the given writer.
    ///
    /// The header is written even when the report is empty.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), CsvOutputError> {
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        csv_writer.write_record(["path", "size", "verdict", "bytes_read", "cluster_id", "detail"])?;

        for entry in self.report.verdicts.values() {
            let (cluster_id, detail) = match &entry.verdict {
                Verdict::Duplicate {
                    cluster, others, ..
                } => (
                    Some(*cluster),
                    others
                        .iter()
                        .map(|p| p.to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join(";"),
                ),
                Verdict::Errored { reason } => (None, reason.clone()),
                Verdict::Unique { .. } | Verdict::Cancelled => (None, String::new()),
            };

            csv_writer.serialize(CsvRow {
                path: entry.record.path.to_string_lossy().into_owned(),
                size: entry.record.size,
                verdict: entry.verdict.label(),
                bytes_read: entry.verdict.bytes_read(),
                cluster_id,
                detail,
            })?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Generate CSV output as a string.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if serialization fails.
    pub fn to_string(&self) -> Result<String, CsvOutputError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}
