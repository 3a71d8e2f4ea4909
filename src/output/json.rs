//! JSON output formatter for scan results.
//!
//! Provides machine-readable JSON output for scripting and automation.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "verdicts": [
//!     { "path": "/mnt/a/x.mkv", "size": 5000, "media_type": "video",
//!       "verdict": "duplicate", "bytes_read": 5000, "cluster": 0,
//!       "others": ["/mnt/b/x.mkv"] },
//!     { "path": "/mnt/a/y.mkv", "size": 5000, "media_type": "video",
//!       "verdict": "unique", "bytes_read": 2000 },
//!     { "path": "/mnt/a/z.mkv", "size": 5000, "media_type": "video",
//!       "verdict": "errored", "reason": "Permission denied: /mnt/a/z.mkv" }
//!   ],
//!   "clusters": [
//!     { "id": 0, "digest": "ab12...", "size": 5000,
//!       "files": ["/mnt/a/x.mkv", "/mnt/b/x.mkv"] }
//!   ],
//!   "bytes_needed_by_size": { "5000": 5000 },
//!   "summary": { "total_files": 3, "bytes_read": 7000, "interrupted": false, ... }
//! }
//! ```
//!
//! # Example
//!
//! ```
//! use chunkdupe::duplicates::DedupeReport;
//! use chunkdupe::error::ExitCode;
//! use chunkdupe::output::json::JsonOutput;
//!
//! let report = DedupeReport::default();
//! let output = JsonOutput::new(&report, ExitCode::NoDuplicates);
//! let json = output.to_json().unwrap();
//! assert!(json.contains("\"exit_code\":2"));
//! ```

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;

use crate::duplicates::{DedupeReport, DuplicateCluster, FileVerdict, ScanSummary, Verdict};
use crate::error::ExitCode;
use crate::scanner::MediaType;

/// One file's verdict in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonVerdict {
    /// Path as scanned
    pub path: String,
    /// File size in bytes
    pub size: u64,
    /// Media category
    pub media_type: MediaType,
    /// `unique`, `duplicate`, `errored` or `cancelled`
    pub verdict: &'static str,
    /// Bytes read to reach the verdict (resolved files only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_read: Option<u64>,
    /// Cluster id (duplicates only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<usize>,
    /// Other members of the cluster (duplicates only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub others: Option<Vec<String>>,
    /// Failure description (errored files only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl JsonVerdict {
    /// Convert a [`FileVerdict`].
    #[must_use]
    pub fn from_file_verdict(entry: &FileVerdict) -> Self {
        let (cluster, others, reason) = match &entry.verdict {
            Verdict::Duplicate {
                cluster, others, ..
            } => (
                Some(*cluster),
                Some(others.iter().map(|p| p.to_string_lossy().into_owned()).collect()),
                None,
            ),
            Verdict::Errored { reason } => (None, None, Some(reason.clone())),
            Verdict::Unique { .. } | Verdict::Cancelled => (None, None, None),
        };
        Self {
            path: entry.record.path.to_string_lossy().into_owned(),
            size: entry.record.size,
            media_type: entry.record.media_type,
            verdict: entry.verdict.label(),
            bytes_read: entry.verdict.bytes_read(),
            cluster,
            others,
            reason,
        }
    }
}

/// A duplicate cluster in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonCluster {
    /// Cluster id, referenced from verdicts
    pub id: usize,
    /// Cumulative chunk signature as hexadecimal (64 characters)
    pub digest: String,
    /// File size in bytes
    pub size: u64,
    /// Paths of all members
    pub files: Vec<String>,
}

impl JsonCluster {
    /// Convert a [`DuplicateCluster`].
    #[must_use]
    pub fn from_cluster(cluster: &DuplicateCluster) -> Self {
        Self {
            id: cluster.id,
            digest: cluster.signature_hex(),
            size: cluster.size,
            files: cluster
                .files
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
        }
    }
}

/// Summary statistics with the exit status of the run.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Statistics of the run
    #[serde(flatten)]
    pub stats: ScanSummary,
    /// Share of a whole-file comparison that was not read (%)
    pub read_savings_percentage: f64,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "CD000")
    pub exit_code_name: String,
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// One entry per file, ordered by path
    pub verdicts: Vec<JsonVerdict>,
    /// Confirmed duplicate clusters
    pub clusters: Vec<JsonCluster>,
    /// Bytes that had to be read per file size
    pub bytes_needed_by_size: BTreeMap<u64, u64>,
    /// Summary statistics
    pub summary: JsonSummary,
}

impl JsonOutput {
    /// Build the JSON document for a report.
    #[must_use]
    pub fn new(report: &DedupeReport, exit_code: ExitCode) -> Self {
        Self {
            verdicts: report
                .verdicts
                .values()
                .map(JsonVerdict::from_file_verdict)
                .collect(),
            clusters: report.clusters.iter().map(JsonCluster::from_cluster).collect(),
            bytes_needed_by_size: report.bytes_needed_by_size(),
            summary: JsonSummary {
                stats: report.summary.clone(),
                read_savings_percentage: report.summary.read_savings_percentage(),
                exit_code: exit_code.as_i32(),
                exit_code_name: exit_code.code_prefix().to_string(),
            },
        }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON to a writer, followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
