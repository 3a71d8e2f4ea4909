//! Scanner module: candidate file records and chunk hashing.
//!
//! This module provides functionality for:
//! - Describing candidate files handed to the engine ([`FileRecord`])
//! - Chunk-level content hashing with BLAKE3 ([`hasher`])
//! - A reference media scanner built on jwalk ([`walker`])
//!
//! # Example
//!
//! ```no_run
//! use chunkdupe::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/mnt/nas/media"), WalkerConfig::default());
//! for record in walker.walk() {
//!     match record {
//!         Ok(file) => println!("{}: {} bytes ({})", file.path.display(), file.size, file.media_type),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod hasher;
pub mod walker;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use hasher::{hash_to_hex, ChunkHasher, Digest, HasherStats};
pub use walker::Walker;

/// Media category of a candidate file, as classified by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Music, recordings, podcasts
    Audio,
    /// Still images, including camera raw formats
    Photo,
    /// Movies and clips
    Video,
}

impl MediaType {
    /// All media categories, in display order.
    pub const ALL: [MediaType; 3] = [MediaType::Audio, MediaType::Photo, MediaType::Video];

    /// Lowercase file extensions belonging to this category.
    #[must_use]
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Audio => &[
                "aac", "aif", "aiff", "alac", "ape", "dsf", "flac", "m4a", "mp3", "ogg", "opus",
                "wav", "wma",
            ],
            Self::Photo => &[
                "arw", "bmp", "cr2", "cr3", "dng", "gif", "heic", "heif", "jpeg", "jpg", "nef",
                "orf", "png", "raf", "rw2", "tif", "tiff", "webp",
            ],
            Self::Video => &[
                "avi", "flv", "m2ts", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg", "mts", "ts",
                "vob", "webm", "wmv",
            ],
        }
    }

    /// Classify a path by its extension (case-insensitive).
    ///
    /// # Example
    ///
    /// ```
    /// use chunkdupe::scanner::MediaType;
    /// use std::path::Path;
    ///
    /// assert_eq!(MediaType::from_path(Path::new("/films/Heat.MKV")), Some(MediaType::Video));
    /// assert_eq!(MediaType::from_path(Path::new("/notes.txt")), None);
    /// ```
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|media| media.extensions().contains(&extension.as_str()))
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Photo => write!(f, "photo"),
            Self::Video => write!(f, "video"),
        }
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "audio" | "music" => Ok(Self::Audio),
            "photo" | "image" | "photos" | "images" => Ok(Self::Photo),
            "video" | "videos" | "movie" | "movies" => Ok(Self::Video),
            other => Err(format!("Unknown media type: '{other}'")),
        }
    }
}

/// A candidate file as delivered by the scanner.
///
/// The engine trusts these records: symlink and mount-point filtering and
/// media classification have already happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path to the file
    pub path: PathBuf,
    /// File size in bytes at discovery time
    pub size: u64,
    /// Creation date, when the platform reports one
    pub created: Option<DateTime<Utc>>,
    /// Media category
    pub media_type: MediaType,
}

impl FileRecord {
    /// Create a new record without a creation date.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, media_type: MediaType) -> Self {
        Self {
            path,
            size,
            created: None,
            media_type,
        }
    }

    /// Attach a creation date.
    #[must_use]
    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }
}

/// Configuration for the reference scanner.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Minimum file size to include (in bytes).
    pub min_size: Option<u64>,

    /// Media categories to include. Files of other types are not reported.
    pub media_types: Vec<MediaType>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            skip_hidden: false,
            min_size: None,
            media_types: MediaType::ALL.to_vec(),
        }
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: Arc<std::io::Error>,
    },
}

/// Errors that can occur while hashing a chunk.
///
/// All variants except [`HashError::ChunkOutOfOrder`] are per-file failures:
/// the file is excluded from its size group and its siblings carry on.
#[derive(thiserror::Error, Debug, Clone)]
pub enum HashError {
    /// The file disappeared (moved or deleted mid-scan).
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The file no longer has the size it was discovered with.
    #[error("Size of {path} changed during scan: expected {expected} bytes, found {actual}")]
    SizeChanged {
        /// Path of the file
        path: PathBuf,
        /// Size recorded by the scanner
        expected: u64,
        /// Size observed when reading
        actual: u64,
    },

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A chunk was requested out of sequence. This is an engine bug, never a file problem.
    #[error("Chunk {requested} of {path} requested, but chunk {expected} is next")]
    ChunkOutOfOrder {
        /// Path of the file
        path: PathBuf,
        /// The chunk index the digest sequence expects next
        expected: usize,
        /// The chunk index that was requested
        requested: usize,
    },
}

impl HashError {
    /// Map an I/O error to the matching per-file variant.
    #[must_use]
    pub fn from_io(path: &Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: Arc::new(error),
            },
        }
    }

    /// Whether this error signals a broken engine invariant rather than a bad file.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ChunkOutOfOrder { .. })
    }
}
