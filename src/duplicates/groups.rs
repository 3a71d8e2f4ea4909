//! Per-file and per-group state of the incremental grouping algorithm.
//!
//! # Overview
//!
//! A [`SizeGroup`] holds every candidate of one exact byte size. Each
//! candidate is tracked by a [`FileHandle`]: its path, its immutable size and
//! the ordered sequence of chunk digests computed so far. Two handles whose
//! sequences are equal so far are still indistinguishable; the running
//! [`FileHandle::signature`] condenses the sequence into one digest so that
//! partitioning a round is a single hash-map pass.
//!
//! A group moves `Pending -> InRound(k) -> Resolved | Exhausted`, or to
//! `Cancelled` when a cancellation request is observed before it finishes.
//!
//! # Example
//!
//! ```
//! use chunkdupe::duplicates::{FileHandle, SizeGroup};
//! use chunkdupe::scanner::{FileRecord, MediaType};
//! use std::path::PathBuf;
//!
//! let group = SizeGroup::from_records(
//!     4096,
//!     vec![
//!         FileRecord::new(PathBuf::from("/a.mkv"), 4096, MediaType::Video),
//!         FileRecord::new(PathBuf::from("/b.mkv"), 4096, MediaType::Video),
//!     ],
//! );
//!
//! assert_eq!(group.len(), 2);
//! assert_eq!(group.potential_savings(), 4096);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::scanner::{hash_to_hex, Digest, FileRecord, HashError};

/// Resolution state of a single candidate file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleState {
    /// Still indistinguishable from at least one sibling.
    Unknown,
    /// Its digest sequence diverged from every sibling.
    Unique,
    /// Every chunk matched at least one sibling through end of file.
    DuplicateCandidate,
    /// Reading the file failed; it takes no further part in its group.
    Errored,
}

/// A candidate file and the chunk digests computed for it so far.
#[derive(Debug, Clone)]
pub struct FileHandle {
    record: FileRecord,
    digests: Vec<Digest>,
    signature: Digest,
    bytes_hashed: u64,
    state: HandleState,
}

impl FileHandle {
    /// Create a handle with an empty digest sequence.
    #[must_use]
    pub fn new(record: FileRecord) -> Self {
        Self {
            record,
            digests: Vec::new(),
            signature: [0u8; 32],
            bytes_hashed: 0,
            state: HandleState::Unknown,
        }
    }

    /// Path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.record.path
    }

    /// Size recorded at discovery time.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.record.size
    }

    /// The scanner record this handle was built from.
    #[must_use]
    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    /// Consume the handle, returning its scanner record.
    #[must_use]
    pub fn into_record(self) -> FileRecord {
        self.record
    }

    /// Digests computed so far, in chunk order.
    #[must_use]
    pub fn digests(&self) -> &[Digest] {
        &self.digests
    }

    /// Number of chunks hashed so far. Also the index of the next chunk.
    #[must_use]
    pub fn digest_count(&self) -> usize {
        self.digests.len()
    }

    /// Running digest over the whole sequence.
    ///
    /// Two handles in the same group have equal signatures exactly when their
    /// digest sequences are equal (up to BLAKE3 collisions).
    #[must_use]
    pub fn signature(&self) -> Digest {
        self.signature
    }

    /// Bytes of this file read so far.
    #[must_use]
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes_hashed
    }

    /// Current resolution state.
    #[must_use]
    pub fn state(&self) -> HandleState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: HandleState) {
        self.state = state;
    }

    /// Append the digest of chunk `index`, which covered `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::ChunkOutOfOrder`] when `index` is not the next
    /// chunk in the sequence. The handle is left unchanged.
    pub fn record_digest(&mut self, index: usize, digest: Digest, len: u64) -> Result<(), HashError> {
        if index != self.digests.len() {
            return Err(HashError::ChunkOutOfOrder {
                path: self.record.path.clone(),
                expected: self.digests.len(),
                requested: index,
            });
        }

        let mut chained = blake3::Hasher::new();
        chained.update(&self.signature);
        chained.update(&digest);
        self.signature = *chained.finalize().as_bytes();

        self.digests.push(digest);
        self.bytes_hashed += len;
        Ok(())
    }
}

/// All candidates sharing one exact byte size.
#[derive(Debug, Clone)]
pub struct SizeGroup {
    /// File size in bytes, shared by every member.
    pub size: u64,
    /// Candidate files of this size.
    pub files: Vec<FileHandle>,
}

impl SizeGroup {
    /// Build a group from scanner records, which must all have `size` bytes.
    #[must_use]
    pub fn from_records(size: u64, records: Vec<FileRecord>) -> Self {
        debug_assert!(records.iter().all(|r| r.size == size));
        Self {
            size,
            files: records.into_iter().map(FileHandle::new).collect(),
        }
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Bytes a whole-file comparison of this group would read.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.size * self.files.len() as u64
    }

    /// Space reclaimable if every member turned out to be a copy of one file.
    #[must_use]
    pub fn potential_savings(&self) -> u64 {
        self.size * (self.files.len() as u64).saturating_sub(1)
    }
}

/// Lifecycle of a size group inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "round", rename_all = "snake_case")]
pub enum GroupState {
    /// Waiting for its turn.
    Pending,
    /// Hashing chunk `k` of every surviving member.
    InRound(usize),
    /// Every member diverged; no duplicates.
    Resolved,
    /// The last chunk was hashed and duplicate clusters remained.
    Exhausted,
    /// Abandoned because cancellation was requested.
    Cancelled,
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InRound(k) => write!(f, "round {k}"),
            Self::Resolved => write!(f, "resolved"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A set of at least two files with identical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateCluster {
    /// Cluster number, stable within one report.
    pub id: usize,
    /// Size of every member in bytes.
    pub size: u64,
    /// Running digest over all chunks, identical for every member.
    #[serde(serialize_with = "serialize_digest", deserialize_with = "deserialize_digest")]
    pub signature: Digest,
    /// Member paths, sorted.
    pub files: Vec<PathBuf>,
}

impl DuplicateCluster {
    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the cluster has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of redundant copies (members minus one).
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.files.len().saturating_sub(1)
    }

    /// Space held by the redundant copies.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size * self.duplicate_count() as u64
    }

    /// Signature as lowercase hexadecimal.
    #[must_use]
    pub fn signature_hex(&self) -> String {
        hash_to_hex(&self.signature)
    }

    /// The other members of the cluster, relative to `path`.
    #[must_use]
    pub fn others(&self, path: &Path) -> Vec<PathBuf> {
        self.files.iter().filter(|p| *p != path).cloned().collect()
    }
}

fn serialize_digest<S: serde::Serializer>(digest: &Digest, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hash_to_hex(digest))
}

fn deserialize_digest<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Digest, D::Error> {
    let hex = String::deserialize(deserializer)?;
    blake3::Hash::from_hex(&hex)
        .map(|h| *h.as_bytes())
        .map_err(serde::de::Error::custom)
}

/// Statistics from partitioning candidates by size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingStats {
    /// Total number of files registered
    pub total_files: usize,
    /// Total size of all files in bytes
    pub total_size: u64,
    /// Number of distinct sizes
    pub unique_sizes: usize,
    /// Files sharing their size with at least one other file
    pub potential_duplicates: usize,
    /// Files whose size is unique, resolved without reading
    pub eliminated_unique: usize,
    /// Empty files among the potential duplicates
    pub empty_files: usize,
    /// Number of sizes with two or more files
    pub duplicate_groups: usize,
}

impl GroupingStats {
    /// Percentage of files resolved by size alone.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.eliminated_unique as f64 / self.total_files as f64) * 100.0
        }
    }
}
