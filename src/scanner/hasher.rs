//! BLAKE3 chunk hasher.
//!
//! # Overview
//!
//! [`ChunkHasher`] computes the digest of one fixed-size byte range of one
//! file and appends it to that file's digest sequence. Chunk `k` of a file of
//! size `n` hashed with chunk size `c` covers `[k*c, min((k+1)*c, n))`.
//!
//! The file is opened, read and closed inside a single call; no descriptor
//! outlives the chunk it was opened for. The whole range is read into a
//! buffer accounted against the group's [`MemoryGauge`] before hashing starts,
//! so the bytes in flight for a group are bounded by its schedule.
//!
//! # Example
//!
//! ```no_run
//! use chunkdupe::duplicates::{FileHandle, MemoryGauge};
//! use chunkdupe::scanner::{ChunkHasher, FileRecord, MediaType};
//! use std::path::PathBuf;
//!
//! let record = FileRecord::new(PathBuf::from("/nas/a.mkv"), 5_000_000_000, MediaType::Video);
//! let mut handle = FileHandle::new(record);
//! let gauge = MemoryGauge::new(2_000_000_000);
//!
//! let hasher = ChunkHasher::new();
//! let first = hasher.digest(&mut handle, 0, 2_000_000_000, &gauge).unwrap();
//! println!("chunk 0: {}", chunkdupe::scanner::hash_to_hex(&first));
//! ```

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::HashError;
use crate::duplicates::{FileHandle, MemoryGauge};

/// A 256-bit BLAKE3 digest.
pub type Digest = [u8; 32];

/// Byte range covered by chunk `index` of a file of `file_size` bytes.
///
/// The range is clamped to the end of the file, so the last chunk of a plan
/// may be shorter than `chunk_size`.
///
/// # Example
///
/// ```
/// use chunkdupe::scanner::hasher::chunk_range;
///
/// assert_eq!(chunk_range(5_000, 0, 2_000), 0..2_000);
/// assert_eq!(chunk_range(5_000, 2, 2_000), 4_000..5_000);
/// ```
#[must_use]
pub fn chunk_range(file_size: u64, index: usize, chunk_size: u64) -> Range<u64> {
    let start = (index as u64).saturating_mul(chunk_size).min(file_size);
    let end = start.saturating_add(chunk_size).min(file_size);
    start..end
}

/// Hash a buffer that has been fully read.
///
/// Runs on the calling thread only, so a pool worker never holds more than
/// one chunk buffer.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> Digest {
    *blake3::hash(bytes).as_bytes()
}

/// Format a digest as lowercase hexadecimal.
#[must_use]
pub fn hash_to_hex(hash: &Digest) -> String {
    blake3::Hash::from_bytes(*hash).to_hex().to_string()
}

/// Counters describing the work a [`ChunkHasher`] has done.
#[derive(Debug, Default)]
pub struct HasherStats {
    chunks: AtomicU64,
    bytes: AtomicU64,
    failures: AtomicU64,
}

impl HasherStats {
    /// Number of chunks successfully hashed.
    #[must_use]
    pub fn chunks_hashed(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }

    /// Number of bytes read from disk for successful chunks.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Number of chunk reads that failed.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Computes per-chunk digests and records them on the owning [`FileHandle`].
#[derive(Debug, Default, Clone)]
pub struct ChunkHasher {
    stats: Arc<HasherStats>,
}

impl ChunkHasher {
    /// Create a new hasher with zeroed statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics shared by all clones of this hasher.
    #[must_use]
    pub fn stats(&self) -> &HasherStats {
        &self.stats
    }

    /// Hash chunk `chunk_index` of `handle` and append the digest to it.
    ///
    /// The caller must request chunks in order: `chunk_index` has to equal the
    /// number of digests already recorded on the handle. The check happens
    /// before any I/O, so a chunk is never read twice.
    ///
    /// # Errors
    ///
    /// - [`HashError::ChunkOutOfOrder`] if the sequence precondition is violated
    /// - [`HashError::SizeChanged`] if the file no longer has its recorded size
    /// - [`HashError::NotFound`], [`HashError::PermissionDenied`] or
    ///   [`HashError::Io`] if opening, seeking or reading fails
    pub fn digest(
        &self,
        handle: &mut FileHandle,
        chunk_index: usize,
        chunk_size: u64,
        gauge: &MemoryGauge,
    ) -> Result<Digest, HashError> {
        let expected = handle.digest_count();
        if chunk_index != expected {
            return Err(HashError::ChunkOutOfOrder {
                path: handle.path().to_path_buf(),
                expected,
                requested: chunk_index,
            });
        }

        let range = chunk_range(handle.size(), chunk_index, chunk_size);
        let len = range.end - range.start;

        // Held until the digest is computed and the buffer dropped.
        let _reservation = gauge.reserve(len);

        let digest = match read_range(handle.path(), handle.size(), range.clone()) {
            Ok(buffer) => hash_bytes(&buffer),
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        handle.record_digest(chunk_index, digest, len)?;

        self.stats.chunks.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes.fetch_add(len, Ordering::Relaxed);

        log::trace!(
            "Hashed chunk {} [{}..{}) of {}",
            chunk_index,
            range.start,
            range.end,
            handle.path().display()
        );

        Ok(digest)
    }
}

/// Read exactly `range` from the file at `path`.
///
/// The file handle lives only for the duration of this call.
fn read_range(path: &Path, expected_size: u64, range: Range<u64>) -> Result<Vec<u8>, HashError> {
    let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;

    let actual = file
        .metadata()
        .map_err(|e| HashError::from_io(path, e))?
        .len();
    if actual != expected_size {
        return Err(HashError::SizeChanged {
            path: path.to_path_buf(),
            expected: expected_size,
            actual,
        });
    }

    let len = usize::try_from(range.end - range.start).map_err(|_| {
        HashError::from_io(
            path,
            std::io::Error::other("chunk does not fit in the address space"),
        )
    })?;
    let mut buffer = vec![0u8; len];

    file.seek(SeekFrom::Start(range.start))
        .map_err(|e| HashError::from_io(path, e))?;
    file.read_exact(&mut buffer).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            // Truncated between the metadata check and the read
            HashError::SizeChanged {
                path: path.to_path_buf(),
                expected: expected_size,
                actual: range.start,
            }
        } else {
            HashError::from_io(path, e)
        }
    })?;

    Ok(buffer)
}
