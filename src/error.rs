//! Structured error handling and exit codes.

use serde::Serialize;

use crate::duplicates::DedupeReport;

/// Exit codes of the chunkdupe binary.
///
/// - 0: Success (completed normally, duplicates found)
/// - 1: General error (the run was aborted)
/// - 2: No duplicates found (completed normally, no duplicates)
/// - 3: Partial success (completed, but some files could not be read)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: Scan completed and duplicates were found.
    Success = 0,
    /// General error: The run was aborted.
    GeneralError = 1,
    /// No duplicates: Scan completed but no duplicates were found.
    NoDuplicates = 2,
    /// Partial success: Scan completed with errored files or scan errors.
    PartialSuccess = 3,
    /// Interrupted: The run was cancelled.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "CD000",
            Self::GeneralError => "CD001",
            Self::NoDuplicates => "CD002",
            Self::PartialSuccess => "CD003",
            Self::Interrupted => "CD130",
        }
    }

    /// Exit code for a completed run.
    ///
    /// Cancellation wins over errored files, which win over the
    /// duplicates/no-duplicates distinction.
    #[must_use]
    pub fn for_report(report: &DedupeReport) -> Self {
        let summary = &report.summary;
        if summary.interrupted {
            Self::Interrupted
        } else if summary.errored_files > 0 || summary.scan_errors > 0 {
            Self::PartialSuccess
        } else if report.has_duplicates() {
            Self::Success
        } else {
            Self::NoDuplicates
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "CD001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
