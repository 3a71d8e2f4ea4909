//! Reference media scanner built on jwalk.
//!
//! # Overview
//!
//! [`Walker`] traverses one source root in parallel and yields a
//! [`FileRecord`] for every regular media file below it. The rules are the
//! ones the duplicate engine relies on:
//!
//! - symbolic links are never followed and never reported
//! - directories on another device than the root (mount points) are not entered
//! - only files whose extension belongs to a configured [`MediaType`] are kept
//! - a shutdown flag stops the traversal between entries
//!
//! Errors on individual entries are yielded as [`ScanError`] values and do not
//! stop the walk.
//!
//! # Example
//!
//! ```no_run
//! use chunkdupe::scanner::{MediaType, Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig {
//!     media_types: vec![MediaType::Video],
//!     skip_hidden: true,
//!     ..Default::default()
//! };
//!
//! let walker = Walker::new(Path::new("/mnt/nas/movies"), config);
//! let films: Vec<_> = walker.walk().filter_map(Result::ok).collect();
//! println!("Found {} films", films.len());
//! ```

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jwalk::WalkDir;

use super::{FileRecord, MediaType, ScanError, WalkerConfig};

/// Parallel directory walker producing media [`FileRecord`]s.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given root.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag. When it becomes `true` the walk ends early.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn passes_size_filter(&self, size: u64) -> bool {
        self.config.min_size.is_none_or(|min| size >= min)
    }

    fn classify(&self, path: &Path) -> Option<MediaType> {
        MediaType::from_path(path).filter(|media| self.config.media_types.contains(media))
    }

    /// Walk the tree, yielding media file records in a deterministic order.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use chunkdupe::scanner::{Walker, WalkerConfig};
    /// use std::path::Path;
    ///
    /// let walker = Walker::new(Path::new("."), WalkerConfig::default());
    /// let total: u64 = walker.walk().filter_map(Result::ok).map(|f| f.size).sum();
    /// println!("{} bytes of media", total);
    /// ```
    pub fn walk(&self) -> impl Iterator<Item = Result<FileRecord, ScanError>> + '_ {
        let root_device = device_of(&self.root);

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(false)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(move |_depth, _path, _read_dir_state, children| {
                // Keep same-device directories only, and sort for stable output
                children.retain(|child| match (child, root_device) {
                    (Ok(entry), Some(device)) if entry.file_type().is_dir() => {
                        let same = device_of(&entry.path()) == Some(device);
                        if !same {
                            log::debug!("Not crossing mount point: {}", entry.path().display());
                        }
                        same
                    }
                    _ => true,
                });
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        walk_dir.into_iter().filter_map(move |entry_result| {
            if self.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                return None;
            }

            match entry_result {
                Ok(entry) => {
                    let file_type = entry.file_type();
                    if file_type.is_dir() {
                        return None;
                    }
                    let path = entry.path();
                    if file_type.is_symlink() {
                        log::trace!("Skipping symlink: {}", path.display());
                        return None;
                    }

                    let media_type = self.classify(&path)?;

                    match std::fs::symlink_metadata(&path) {
                        Ok(metadata) if metadata.is_file() => {
                            self.make_record(path, &metadata, media_type)
                        }
                        Ok(_) => None,
                        Err(e) => Some(Err(self.handle_io_error(&path, e))),
                    }
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), std::borrow::ToOwned::to_owned);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    Some(Err(ScanError::Io {
                        path,
                        source: Arc::new(std::io::Error::other(e.to_string())),
                    }))
                }
            }
        })
    }

    fn make_record(
        &self,
        path: PathBuf,
        metadata: &Metadata,
        media_type: MediaType,
    ) -> Option<Result<FileRecord, ScanError>> {
        let size = metadata.len();
        if !self.passes_size_filter(size) {
            log::trace!("Skipping file below minimum size ({}): {}", size, path.display());
            return None;
        }

        let mut record = FileRecord::new(path, size, media_type);
        if let Ok(created) = metadata.created() {
            record = record.with_created(DateTime::<Utc>::from(created));
        }
        Some(Ok(record))
    }

    fn handle_io_error(&self, path: &Path, error: std::io::Error) -> ScanError {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                log::warn!("Permission denied: {}", path.display());
                ScanError::PermissionDenied(path.to_path_buf())
            }
            std::io::ErrorKind::NotFound => {
                log::debug!("File vanished during scan: {}", path.display());
                ScanError::NotFound(path.to_path_buf())
            }
            _ => {
                log::warn!("I/O error for {}: {}", path.display(), error);
                ScanError::Io {
                    path: path.to_path_buf(),
                    source: Arc::new(error),
                }
            }
        }
    }
}

#[cfg(unix)]
fn device_of(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    std::fs::symlink_metadata(path).ok().map(|m| m.dev())
}

#[cfg(not(unix))]
fn device_of(_path: &Path) -> Option<u64> {
    None
}
