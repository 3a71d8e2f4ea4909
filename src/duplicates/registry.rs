//! Size-partitioned registry of candidate files.
//!
//! # Overview
//!
//! Files of different sizes can never be duplicates, so the registry is the
//! first and cheapest filter: it maps every byte size to the candidates of
//! that size. Sizes with a single member are resolved as unique without any
//! I/O; only sizes with two or more members reach the grouping algorithm.
//!
//! Paths are de-duplicated at insertion by their exact bytes, so a file
//! reported twice by overlapping scans is registered once. Names that differ
//! only in Unicode normalization are distinct files on Linux and stay
//! distinct here.
//!
//! # Example
//!
//! ```
//! use chunkdupe::duplicates::SizeRegistry;
//! use chunkdupe::scanner::{FileRecord, MediaType};
//! use std::path::PathBuf;
//!
//! let mut registry = SizeRegistry::new();
//! registry.insert(FileRecord::new(PathBuf::from("/a.mkv"), 100, MediaType::Video));
//! registry.insert(FileRecord::new(PathBuf::from("/b.mkv"), 100, MediaType::Video));
//! registry.insert(FileRecord::new(PathBuf::from("/c.mkv"), 250, MediaType::Video));
//!
//! assert_eq!(registry.sizes_with_multiple_members(), vec![100]);
//! assert_eq!(registry.singletons().count(), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::groups::{GroupingStats, SizeGroup};
use crate::scanner::FileRecord;

/// Candidate files keyed by exact byte size.
#[derive(Debug, Clone)]
pub struct SizeRegistry {
    by_size: HashMap<u64, Vec<FileRecord>>,
    known_paths: HashSet<PathBuf>,
    rejected_paths: usize,
    last_modified: DateTime<Utc>,
}

impl Default for SizeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SizeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_size: HashMap::new(),
            known_paths: HashSet::new(),
            rejected_paths: 0,
            last_modified: Utc::now(),
        }
    }

    /// Register a file under its size.
    ///
    /// Returns `false` and leaves the registry unchanged if the same path
    /// is already registered.
    pub fn insert(&mut self, record: FileRecord) -> bool {
        if !self.known_paths.insert(record.path.clone()) {
            log::warn!(
                "Ignoring path enumerated twice: {}",
                record.path.display()
            );
            self.rejected_paths += 1;
            return false;
        }

        self.by_size.entry(record.size).or_default().push(record);
        self.last_modified = Utc::now();
        true
    }

    /// Sizes with two or more members, largest first.
    ///
    /// Only these sizes need any reading.
    #[must_use]
    pub fn sizes_with_multiple_members(&self) -> Vec<u64> {
        let mut sizes: Vec<u64> = self
            .by_size
            .iter()
            .filter(|(_, files)| files.len() >= 2)
            .map(|(&size, _)| size)
            .collect();
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        sizes
    }

    /// Files that are alone at their size, resolved unique without reading.
    pub fn singletons(&self) -> impl Iterator<Item = &FileRecord> + '_ {
        self.by_size
            .values()
            .filter(|files| files.len() == 1)
            .flat_map(|files| files.iter())
    }

    /// Members registered under `size`.
    #[must_use]
    pub fn members(&self, size: u64) -> &[FileRecord] {
        self.by_size.get(&size).map_or(&[], Vec::as_slice)
    }

    /// Whether any file of `size` is registered.
    #[must_use]
    pub fn contains_size(&self, size: u64) -> bool {
        self.by_size.contains_key(&size)
    }

    /// Import files from `other`.
    ///
    /// With `size_limited` set, only files whose size is already present in
    /// this registry are taken, so an unrelated target tree cannot grow the
    /// registry without bound. Returns the number of files imported.
    pub fn merge(&mut self, other: SizeRegistry, size_limited: bool) -> usize {
        let mut imported = 0;
        let mut skipped = 0;

        for (size, files) in other.by_size {
            if size_limited && !self.by_size.contains_key(&size) {
                skipped += files.len();
                continue;
            }
            for record in files {
                if self.insert(record) {
                    imported += 1;
                }
            }
        }

        log::debug!(
            "Merged registry: {} imported, {} skipped by size limit",
            imported,
            skipped
        );
        self.last_modified = Utc::now();
        imported
    }

    /// When the registry last changed. Merging always bumps it.
    #[must_use]
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Total number of registered files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_size.values().map(Vec::len).sum()
    }

    /// Whether no file is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_size.is_empty()
    }

    /// Number of distinct sizes.
    #[must_use]
    pub fn size_count(&self) -> usize {
        self.by_size.len()
    }

    /// Total bytes across all registered files.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.by_size
            .iter()
            .map(|(&size, files)| size * files.len() as u64)
            .sum()
    }

    /// Number of insertions refused because the path was already present.
    #[must_use]
    pub fn rejected_paths(&self) -> usize {
        self.rejected_paths
    }

    /// Split into multi-member groups (largest size first) and singletons.
    #[must_use]
    pub fn into_partitions(self) -> (Vec<SizeGroup>, Vec<FileRecord>, GroupingStats) {
        let mut stats = GroupingStats {
            unique_sizes: self.by_size.len(),
            ..Default::default()
        };
        let mut groups = Vec::new();
        let mut singletons = Vec::new();

        for (size, mut files) in self.by_size {
            stats.total_files += files.len();
            stats.total_size += size * files.len() as u64;

            if files.len() == 1 {
                stats.eliminated_unique += 1;
                singletons.append(&mut files);
            } else {
                stats.potential_duplicates += files.len();
                stats.duplicate_groups += 1;
                if size == 0 {
                    stats.empty_files += files.len();
                }
                files.sort_by(|a, b| a.path.cmp(&b.path));
                groups.push(SizeGroup::from_records(size, files));
            }
        }

        groups.sort_by(|a, b| b.size.cmp(&a.size));
        singletons.sort_by(|a, b| a.path.cmp(&b.path));

        log::info!(
            "Size grouping complete: {} files → {} potential duplicates in {} groups ({:.1}% eliminated)",
            stats.total_files,
            stats.potential_duplicates,
            stats.duplicate_groups,
            stats.elimination_rate()
        );

        (groups, singletons, stats)
    }
}

impl Extend<FileRecord> for SizeRegistry {
    fn extend<I: IntoIterator<Item = FileRecord>>(&mut self, iter: I) {
        for record in iter {
            self.insert(record);
        }
    }
}

impl FromIterator<FileRecord> for SizeRegistry {
    fn from_iter<I: IntoIterator<Item = FileRecord>>(iter: I) -> Self {
        let mut registry = Self::new();
        registry.extend(iter);
        registry
    }
}
