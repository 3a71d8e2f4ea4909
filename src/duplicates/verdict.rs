//! Terminal verdicts and the report of a run.
//!
//! Every registered file receives exactly one [`Verdict`]. The
//! [`DedupeReport`] collects them together with the duplicate clusters, a
//! per-group diagnostic trail and a [`ScanSummary`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

use super::groups::{DuplicateCluster, GroupState};
use super::scheduler::GroupSchedule;
use super::FinderError;
use crate::scanner::FileRecord;

/// Terminal classification of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// No other file has the same content. `bytes_read` is the offset at
    /// which that was proven (zero for a file alone at its size).
    Unique {
        /// Bytes read from this file
        bytes_read: u64,
    },
    /// Byte-for-byte identical to every file in `others`.
    Duplicate {
        /// Cluster number in [`DedupeReport::clusters`]
        cluster: usize,
        /// The other members of the cluster
        others: Vec<PathBuf>,
        /// Bytes read from this file, always its full size
        bytes_read: u64,
    },
    /// Reading the file failed; no content claim is made.
    Errored {
        /// Description of the failure
        reason: String,
    },
    /// The run was cancelled before this file was resolved.
    Cancelled,
}

impl Verdict {
    /// Bytes read to reach this verdict, for resolved files.
    #[must_use]
    pub fn bytes_read(&self) -> Option<u64> {
        match self {
            Self::Unique { bytes_read } | Self::Duplicate { bytes_read, .. } => Some(*bytes_read),
            Self::Errored { .. } | Self::Cancelled => None,
        }
    }

    /// Short lowercase label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unique { .. } => "unique",
            Self::Duplicate { .. } => "duplicate",
            Self::Errored { .. } => "errored",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this is a [`Verdict::Unique`].
    #[must_use]
    pub fn is_unique(&self) -> bool {
        matches!(self, Self::Unique { .. })
    }

    /// Whether this is a [`Verdict::Duplicate`].
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// A verdict together with the file it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVerdict {
    /// The scanner record of the file
    pub record: FileRecord,
    /// Its verdict
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Diagnostic trail of one size group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupReport {
    /// Byte size shared by the group
    pub size: u64,
    /// Number of members at the start
    pub files: usize,
    /// Schedule the group ran with
    pub schedule: GroupSchedule,
    /// Chunks in the plan
    pub chunks_planned: usize,
    /// Rounds actually executed
    pub rounds: usize,
    /// Terminal state
    pub state: GroupState,
    /// Highest offset read from any member
    pub bytes_needed: u64,
}

/// Summary statistics of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Total number of files registered
    pub total_files: usize,
    /// Total size of all registered files in bytes
    pub total_size: u64,
    /// Files resolved unique by size alone
    pub eliminated_by_size: usize,
    /// Files resolved unique (including by size)
    pub unique_files: usize,
    /// Number of duplicate clusters
    pub duplicate_clusters: usize,
    /// Redundant copies across all clusters (members minus one each)
    pub duplicate_files: usize,
    /// Files that could not be read
    pub errored_files: usize,
    /// Files left unresolved by cancellation
    pub cancelled_files: usize,
    /// Directory entries the scanner could not read
    pub scan_errors: usize,
    /// Bytes read by files that reached a unique or duplicate verdict
    pub bytes_read: u64,
    /// Bytes a whole-file comparison of every size-matched file would read
    pub full_read_bytes: u64,
    /// Space held by redundant copies
    pub reclaimable_space: u64,
    /// Highest number of chunk bytes held in memory at once
    pub peak_in_flight: u64,
    /// Wall-clock duration of the run
    #[serde(with = "duration_secs")]
    pub scan_duration: Duration,
    /// Whether cancellation was requested
    pub interrupted: bool,
}

impl ScanSummary {
    /// Percentage of registered bytes held by redundant copies.
    #[must_use]
    pub fn wasted_percentage(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            (self.reclaimable_space as f64 / self.total_size as f64) * 100.0
        }
    }

    /// Percentage of a whole-file comparison that chunking avoided reading.
    #[must_use]
    pub fn read_savings_percentage(&self) -> f64 {
        if self.full_read_bytes == 0 {
            0.0
        } else {
            let saved = self.full_read_bytes.saturating_sub(self.bytes_read);
            (saved as f64 / self.full_read_bytes as f64) * 100.0
        }
    }

    /// Reclaimable space as a human-readable string.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        format_size(self.reclaimable_space)
    }

    /// Total size as a human-readable string.
    #[must_use]
    pub fn total_size_display(&self) -> String {
        format_size(self.total_size)
    }

    /// Bytes read as a human-readable string.
    #[must_use]
    pub fn bytes_read_display(&self) -> String {
        format_size(self.bytes_read)
    }
}

/// Format a byte count for people.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    ByteSize::b(bytes).to_string()
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedupeReport {
    /// One verdict per registered file, ordered by path
    pub verdicts: BTreeMap<PathBuf, FileVerdict>,
    /// Confirmed duplicate clusters, largest size first
    pub clusters: Vec<DuplicateCluster>,
    /// One entry per multi-member size group, in processing order
    pub groups: Vec<GroupReport>,
    /// Summary statistics
    pub summary: ScanSummary,
}

impl DedupeReport {
    /// Verdict of the file at `path`.
    #[must_use]
    pub fn verdict(&self, path: &Path) -> Option<&Verdict> {
        self.verdicts.get(path).map(|v| &v.verdict)
    }

    /// Files resolved unique.
    pub fn unique(&self) -> impl Iterator<Item = &FileVerdict> + '_ {
        self.verdicts.values().filter(|v| v.verdict.is_unique())
    }

    /// Files that belong to a duplicate cluster.
    pub fn duplicates(&self) -> impl Iterator<Item = &FileVerdict> + '_ {
        self.verdicts.values().filter(|v| v.verdict.is_duplicate())
    }

    /// Files that could not be read.
    pub fn errored(&self) -> impl Iterator<Item = &FileVerdict> + '_ {
        self.verdicts
            .values()
            .filter(|v| matches!(v.verdict, Verdict::Errored { .. }))
    }

    /// Files left unresolved by cancellation.
    pub fn cancelled(&self) -> impl Iterator<Item = &FileVerdict> + '_ {
        self.verdicts
            .values()
            .filter(|v| matches!(v.verdict, Verdict::Cancelled))
    }

    /// Bytes that had to be read to resolve each size, keyed by size.
    ///
    /// For every size the value is the largest `bytes_read` of any resolved
    /// file of that size: zero for sizes with a single file, the full size
    /// when a duplicate cluster exists.
    #[must_use]
    pub fn bytes_needed_by_size(&self) -> BTreeMap<u64, u64> {
        let mut needed = BTreeMap::new();
        for entry in self.verdicts.values() {
            if let Some(bytes) = entry.verdict.bytes_read() {
                let slot = needed.entry(entry.record.size).or_insert(0);
                *slot = (*slot).max(bytes);
            }
        }
        needed
    }

    /// Whether any duplicate cluster was found.
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        !self.clusters.is_empty()
    }
}

/// Collects verdicts and enforces that each file gets exactly one.
#[derive(Debug, Default)]
pub(crate) struct ReportBuilder {
    verdicts: BTreeMap<PathBuf, FileVerdict>,
    clusters: Vec<DuplicateCluster>,
    groups: Vec<GroupReport>,
}

impl ReportBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn assign(&mut self, record: FileRecord, verdict: Verdict) -> Result<(), FinderError> {
        if self.verdicts.contains_key(&record.path) {
            return Err(FinderError::InternalConsistency(format!(
                "second verdict for {}",
                record.path.display()
            )));
        }
        log::trace!("{} -> {}", record.path.display(), verdict.label());
        self.verdicts
            .insert(record.path.clone(), FileVerdict { record, verdict });
        Ok(())
    }

    /// Register a cluster of at least two records and assign their verdicts.
    pub(crate) fn add_cluster(
        &mut self,
        size: u64,
        signature: crate::scanner::Digest,
        mut records: Vec<FileRecord>,
    ) -> Result<usize, FinderError> {
        if records.len() < 2 {
            return Err(FinderError::InternalConsistency(format!(
                "cluster of {} file(s) at size {}",
                records.len(),
                size
            )));
        }
        records.sort_by(|a, b| a.path.cmp(&b.path));

        let id = self.clusters.len();
        let cluster = DuplicateCluster {
            id,
            size,
            signature,
            files: records.iter().map(|r| r.path.clone()).collect(),
        };
        for record in records {
            let others = cluster.others(&record.path);
            self.assign(
                record,
                Verdict::Duplicate {
                    cluster: id,
                    others,
                    bytes_read: size,
                },
            )?;
        }
        self.clusters.push(cluster);
        Ok(id)
    }

    pub(crate) fn add_group(&mut self, report: GroupReport) {
        self.groups.push(report);
    }

    pub(crate) fn finish(self, mut summary: ScanSummary) -> DedupeReport {
        for entry in self.verdicts.values() {
            match &entry.verdict {
                Verdict::Unique { bytes_read } => {
                    summary.unique_files += 1;
                    summary.bytes_read += bytes_read;
                }
                Verdict::Duplicate { bytes_read, .. } => summary.bytes_read += bytes_read,
                Verdict::Errored { .. } => summary.errored_files += 1,
                Verdict::Cancelled => summary.cancelled_files += 1,
            }
        }
        summary.duplicate_clusters = self.clusters.len();
        summary.duplicate_files = self.clusters.iter().map(DuplicateCluster::duplicate_count).sum();
        summary.reclaimable_space = self.clusters.iter().map(DuplicateCluster::wasted_space).sum();

        DedupeReport {
            verdicts: self.verdicts,
            clusters: self.clusters,
            groups: self.groups,
            summary,
        }
    }
}
