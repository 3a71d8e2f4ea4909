//! Incremental grouping: the duplicate engine.
//!
//! # Overview
//!
//! [`DuplicateFinder`] resolves a [`SizeRegistry`] into one verdict per file:
//!
//! 1. **Size** - files alone at their size are unique without any read
//! 2. **Rounds** - for every size with two or more files, chunk `k` of every
//!    surviving file is hashed in parallel, survivors are partitioned by
//!    signature, and singletons retire as unique at the end offset of chunk `k`
//! 3. **Exhaustion** - subgroups still together after the final chunk, which
//!    always ends at end of file, are duplicate clusters
//!
//! Groups are processed one at a time, largest size first. Within a group the
//! round is the only synchronization point: workers own the handle they hash,
//! and only the coordinating thread partitions survivors after every worker of
//! the round has reported.
//!
//! # Example
//!
//! ```no_run
//! use chunkdupe::duplicates::{DuplicateFinder, FinderConfig};
//! use std::path::PathBuf;
//!
//! let config = FinderConfig::default()
//!     .with_memory_budget(8 * 1024 * 1024 * 1024)
//!     .with_parallelism_ceiling(8);
//! let finder = DuplicateFinder::new(config);
//!
//! let report = finder
//!     .find_duplicates_in_paths(&[PathBuf::from("/mnt/nas/media")], None)
//!     .unwrap();
//! println!("{} clusters, {} reclaimable", report.clusters.len(), report.summary.reclaimable_display());
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use super::groups::{FileHandle, GroupState, HandleState, SizeGroup};
use super::registry::SizeRegistry;
use super::scheduler::{ChunkPlan, MemoryGauge, SchedulerConfig, WorkerPools};
use super::verdict::{format_size, DedupeReport, GroupReport, ReportBuilder, ScanSummary, Verdict};
use crate::progress::ProgressCallback;
use crate::scanner::{ChunkHasher, Digest, FileRecord, HashError, ScanError, Walker, WalkerConfig};

/// Configuration for the duplicate finder.
#[derive(Clone)]
pub struct FinderConfig {
    /// Memory budget, parallelism ceiling and chunk floor.
    pub scheduler: SchedulerConfig,
    /// Abort on the first per-file error instead of marking the file errored.
    pub strict: bool,
    /// Walker configuration used by [`DuplicateFinder::find_duplicates_in_paths`].
    pub walker_config: WalkerConfig,
    /// Import only already-known sizes from the target tree.
    pub size_limited_merge: bool,
    /// Optional shutdown flag for cooperative cancellation.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderConfig")
            .field("scheduler", &self.scheduler)
            .field("strict", &self.strict)
            .field("walker_config", &self.walker_config)
            .field("size_limited_merge", &self.size_limited_merge)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            strict: false,
            walker_config: WalkerConfig::default(),
            size_limited_merge: true,
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl FinderConfig {
    /// Replace the whole scheduler configuration.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Set the memory budget in bytes.
    #[must_use]
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.scheduler.memory_budget = bytes;
        self
    }

    /// Set the maximum number of files hashed concurrently per group.
    #[must_use]
    pub fn with_parallelism_ceiling(mut self, threads: usize) -> Self {
        self.scheduler.parallelism_ceiling = threads;
        self
    }

    /// Set the minimum chunk size in bytes.
    #[must_use]
    pub fn with_min_chunk_floor(mut self, bytes: u64) -> Self {
        self.scheduler.min_chunk_floor = bytes;
        self
    }

    /// Set fail-fast on any per-file error.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
        self
    }

    /// Set whether target-tree merges are limited to known sizes.
    #[must_use]
    pub fn with_size_limited_merge(mut self, limited: bool) -> Self {
        self.size_limited_merge = limited;
        self
    }

    /// Set the shutdown flag for cooperative cancellation.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Reject settings the scheduler cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::InvalidConfig`] for a zero memory budget,
    /// parallelism ceiling or chunk floor.
    pub fn validate(&self) -> Result<(), FinderError> {
        if self.scheduler.memory_budget == 0 {
            return Err(FinderError::InvalidConfig(
                "memory budget must be greater than 0".to_string(),
            ));
        }
        if self.scheduler.parallelism_ceiling == 0 {
            return Err(FinderError::InvalidConfig(
                "parallelism ceiling must be greater than 0".to_string(),
            ));
        }
        if self.scheduler.min_chunk_floor == 0 {
            return Err(FinderError::InvalidConfig(
                "minimum chunk size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn is_cancel_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
            || self
                .progress_callback
                .as_ref()
                .is_some_and(|cb| cb.should_cancel())
    }

    fn status(&self, message: &str) {
        if let Some(ref callback) = self.progress_callback {
            callback.on_status(message);
        }
    }
}

/// Errors that abort a run.
///
/// Per-file read failures are not errors of the run: they become
/// [`Verdict::Errored`] unless strict mode is on.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// A source or target path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// A source or target path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The scanner failed on an entry (strict mode).
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Reading a file failed (strict mode).
    #[error(transparent)]
    Hash(#[from] HashError),

    /// The configuration cannot be scheduled.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// More chunk bytes were in flight than the budget allows.
    #[error("Memory budget exceeded: peak {peak} bytes in flight, budget {budget}")]
    MemoryBudgetExceeded {
        /// Highest number of bytes in flight
        peak: u64,
        /// The configured budget
        budget: u64,
    },

    /// An engine invariant was violated. Results of the run cannot be trusted.
    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),

    /// A worker pool could not be created.
    #[error("Failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// An I/O error outside of chunk reads.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Duplicate engine over a size registry.
///
/// # Example
///
/// ```
/// use chunkdupe::duplicates::DuplicateFinder;
/// use chunkdupe::scanner::{FileRecord, MediaType};
/// use std::path::PathBuf;
///
/// // Two files of distinct sizes resolve without touching the disk.
/// let finder = DuplicateFinder::with_defaults();
/// let report = finder
///     .find_duplicates_from_files(vec![
///         FileRecord::new(PathBuf::from("/nowhere/a.mkv"), 10, MediaType::Video),
///         FileRecord::new(PathBuf::from("/nowhere/b.mkv"), 20, MediaType::Video),
///     ])
///     .unwrap();
///
/// assert_eq!(report.unique().count(), 2);
/// assert_eq!(report.summary.bytes_read, 0);
/// ```
pub struct DuplicateFinder {
    config: FinderConfig,
    hasher: ChunkHasher,
}

impl std::fmt::Debug for DuplicateFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplicateFinder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DuplicateFinder {
    /// Create a new duplicate finder.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        Self {
            config,
            hasher: ChunkHasher::new(),
        }
    }

    /// Create a duplicate finder with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(FinderConfig::default())
    }

    /// The finder's configuration.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// The hasher, for its statistics.
    #[must_use]
    pub fn hasher(&self) -> &ChunkHasher {
        &self.hasher
    }

    /// Resolve every file in `registry` to a verdict.
    ///
    /// Cancellation is not an error: the report marks every unresolved file
    /// [`Verdict::Cancelled`] and sets `summary.interrupted`.
    ///
    /// # Errors
    ///
    /// - [`FinderError::InvalidConfig`] before any work if the scheduler
    ///   settings are unusable
    /// - [`FinderError::Hash`] on the first per-file error in strict mode
    /// - [`FinderError::InternalConsistency`] or
    ///   [`FinderError::MemoryBudgetExceeded`] when an engine invariant breaks
    pub fn find_duplicates(&self, registry: SizeRegistry) -> Result<DedupeReport, FinderError> {
        self.config.validate()?;
        let start_time = Instant::now();

        let (groups, singletons, stats) = registry.into_partitions();
        let mut summary = ScanSummary {
            total_files: stats.total_files,
            total_size: stats.total_size,
            eliminated_by_size: stats.eliminated_unique,
            full_read_bytes: groups.iter().map(SizeGroup::total_size).sum(),
            ..Default::default()
        };

        let mut builder = ReportBuilder::new();
        for record in singletons {
            builder.assign(record, Verdict::Unique { bytes_read: 0 })?;
        }

        let total_groups = groups.len();
        log::info!(
            "Resolving {} size groups ({} to compare)",
            total_groups,
            format_size(summary.full_read_bytes)
        );
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_run_start(total_groups, summary.full_read_bytes);
        }

        let gauge = MemoryGauge::new(self.config.scheduler.memory_budget);
        let mut pools = WorkerPools::new();
        let mut cancelled = false;

        for (group_index, group) in groups.into_iter().enumerate() {
            if !cancelled && self.config.is_cancel_requested() {
                log::info!(
                    "Cancellation requested, abandoning {} remaining groups",
                    total_groups - group_index
                );
                cancelled = true;
            }

            let report = if cancelled {
                self.abandon_group(group, &mut builder)?
            } else {
                self.resolve_group(
                    group_index,
                    total_groups,
                    group,
                    &gauge,
                    &mut pools,
                    &mut builder,
                )?
            };

            if report.state == GroupState::Cancelled {
                cancelled = true;
            }
            if let Some(ref callback) = self.config.progress_callback {
                callback.on_group_complete(group_index, report.state);
            }
            builder.add_group(report);
        }

        if gauge.exceeded() {
            return Err(FinderError::MemoryBudgetExceeded {
                peak: gauge.peak(),
                budget: gauge.budget(),
            });
        }

        summary.peak_in_flight = gauge.peak();
        summary.interrupted = cancelled;
        summary.scan_duration = start_time.elapsed();

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_run_end();
        }

        let report = builder.finish(summary);
        if report.verdicts.len() != stats.total_files {
            return Err(FinderError::InternalConsistency(format!(
                "{} verdicts for {} registered files",
                report.verdicts.len(),
                stats.total_files
            )));
        }

        log::info!(
            "Scan complete: {} clusters, {} duplicate files, {} reclaimable, {} read ({:.1}% less than full hashing)",
            report.summary.duplicate_clusters,
            report.summary.duplicate_files,
            report.summary.reclaimable_display(),
            report.summary.bytes_read_display(),
            report.summary.read_savings_percentage()
        );
        log::debug!(
            "Hasher: {} chunks, {} read, {} failed reads",
            self.hasher.stats().chunks_hashed(),
            format_size(self.hasher.stats().bytes_read()),
            self.hasher.stats().failures()
        );

        Ok(report)
    }

    /// Resolve a pre-collected list of files.
    ///
    /// # Errors
    ///
    /// See [`find_duplicates`](Self::find_duplicates).
    pub fn find_duplicates_from_files(
        &self,
        files: Vec<FileRecord>,
    ) -> Result<DedupeReport, FinderError> {
        self.find_duplicates(files.into_iter().collect())
    }

    /// Scan `sources` (and optionally `target`) and resolve the result.
    ///
    /// All sources go into one registry. The target tree is scanned into a
    /// second registry and merged, limited to known sizes unless
    /// `size_limited_merge` is off.
    ///
    /// # Errors
    ///
    /// - [`FinderError::PathNotFound`] / [`FinderError::NotADirectory`] for a bad root
    /// - [`FinderError::Scan`] on the first scanner error in strict mode
    /// - everything [`find_duplicates`](Self::find_duplicates) returns
    pub fn find_duplicates_in_paths(
        &self,
        sources: &[PathBuf],
        target: Option<&Path>,
    ) -> Result<DedupeReport, FinderError> {
        self.config.validate()?;
        let roots = sources.iter().map(PathBuf::as_path).chain(target);
        for root in roots {
            if !root.exists() {
                return Err(FinderError::PathNotFound(root.to_path_buf()));
            }
            if !root.is_dir() {
                return Err(FinderError::NotADirectory(root.to_path_buf()));
            }
        }

        let mut scan_errors = 0;
        let mut registry = SizeRegistry::new();
        for source in sources {
            scan_errors += self.scan_into(source, &mut registry)?;
        }

        if let Some(target) = target {
            let mut target_registry = SizeRegistry::new();
            scan_errors += self.scan_into(target, &mut target_registry)?;
            let imported = registry.merge(target_registry, self.config.size_limited_merge);
            log::info!(
                "Merged {} files from target {} ({})",
                imported,
                target.display(),
                if self.config.size_limited_merge {
                    "size-limited"
                } else {
                    "unlimited"
                }
            );
        }

        log::info!(
            "Found {} media files ({})",
            registry.len(),
            format_size(registry.total_size())
        );

        let mut report = self.find_duplicates(registry)?;
        report.summary.scan_errors = scan_errors;
        Ok(report)
    }

    fn scan_into(&self, root: &Path, registry: &mut SizeRegistry) -> Result<usize, FinderError> {
        log::info!("Scanning {}", root.display());
        self.config.status(&format!("Scanning {}", root.display()));

        let mut walker = Walker::new(root, self.config.walker_config.clone());
        if let Some(ref flag) = self.config.shutdown_flag {
            walker = walker.with_shutdown_flag(flag.clone());
        }

        let mut errors = 0;
        for result in walker.walk() {
            match result {
                Ok(record) => {
                    registry.insert(record);
                }
                Err(e) if self.config.strict => return Err(FinderError::Scan(e)),
                Err(_) => errors += 1,
            }
        }
        Ok(errors)
    }

    /// Mark every member of a group cancelled without reading anything.
    fn abandon_group(
        &self,
        group: SizeGroup,
        builder: &mut ReportBuilder,
    ) -> Result<GroupReport, FinderError> {
        let schedule = self.config.scheduler.plan_group(group.len());
        let report = GroupReport {
            size: group.size,
            files: group.len(),
            schedule,
            chunks_planned: ChunkPlan::new(group.size, schedule.chunk_size).len(),
            rounds: 0,
            state: GroupState::Cancelled,
            bytes_needed: 0,
        };
        for handle in group.files {
            builder.assign(handle.into_record(), Verdict::Cancelled)?;
        }
        Ok(report)
    }

    /// Run rounds over one size group until every member has a verdict.
    fn resolve_group(
        &self,
        group_index: usize,
        total_groups: usize,
        group: SizeGroup,
        gauge: &MemoryGauge,
        pools: &mut WorkerPools,
        builder: &mut ReportBuilder,
    ) -> Result<GroupReport, FinderError> {
        let size = group.size;
        let schedule = self.config.scheduler.plan_group(group.len());
        let plan = ChunkPlan::new(size, schedule.chunk_size);

        if plan.boundaries().last() != Some(&size) {
            return Err(FinderError::InternalConsistency(format!(
                "chunk plan for size {} does not end at end of file",
                size
            )));
        }

        let mut report = GroupReport {
            size,
            files: group.len(),
            schedule,
            chunks_planned: plan.len(),
            rounds: 0,
            state: GroupState::Pending,
            bytes_needed: 0,
        };

        log::debug!(
            "Group {}/{}: {} files of {}, {} threads × {} chunks, {} rounds at most",
            group_index + 1,
            total_groups,
            group.len(),
            format_size(size),
            schedule.threads,
            format_size(schedule.chunk_size),
            plan.len()
        );

        let pool = pools.get(schedule.threads)?;
        let mut survivors = group.files;
        let mut clusters_formed = false;

        for k in 0..plan.len() {
            if self.config.is_cancel_requested() {
                log::info!(
                    "Cancellation requested in round {} of size group {}",
                    k,
                    size
                );
                for handle in survivors {
                    builder.assign(handle.into_record(), Verdict::Cancelled)?;
                }
                report.state = GroupState::Cancelled;
                return Ok(report);
            }

            report.state = GroupState::InRound(k);
            if let Some(ref callback) = self.config.progress_callback {
                callback.on_round_start(group_index, total_groups);
            }
            self.config.status(&format!(
                "{}: round {}/{}, {} candidates",
                format_size(size),
                k + 1,
                plan.len(),
                survivors.len()
            ));

            let chunk_size = schedule.chunk_size;
            let hasher = &self.hasher;
            let results: Vec<Result<Digest, HashError>> = pool.install(|| {
                survivors
                    .par_iter_mut()
                    .map(|handle| hasher.digest(handle, k, chunk_size, gauge))
                    .collect()
            });
            report.rounds += 1;

            let end = plan.end_of(k).unwrap_or(size);
            let chunk_len = plan.range(k).map_or(0, |r| r.end - r.start);
            let mut round_bytes = 0;
            let mut cohorts: HashMap<Digest, Vec<FileHandle>> = HashMap::new();

            for (mut handle, result) in survivors.drain(..).zip(results) {
                match result {
                    Ok(_) => {
                        round_bytes += chunk_len;
                        cohorts.entry(handle.signature()).or_default().push(handle);
                    }
                    Err(e) if e.is_fatal() => {
                        log::error!("{}", e);
                        return Err(FinderError::InternalConsistency(e.to_string()));
                    }
                    Err(e) => {
                        if self.config.strict {
                            return Err(FinderError::Hash(e));
                        }
                        log::warn!("Excluding {}: {}", handle.path().display(), e);
                        handle.set_state(HandleState::Errored);
                        builder.assign(
                            handle.into_record(),
                            Verdict::Errored {
                                reason: e.to_string(),
                            },
                        )?;
                    }
                }
            }

            if let Some(ref callback) = self.config.progress_callback {
                callback.on_bytes_hashed(round_bytes);
            }

            let mut cohorts: Vec<(Digest, Vec<FileHandle>)> = cohorts.into_iter().collect();
            cohorts.sort_by(|a, b| a.1[0].path().cmp(b.1[0].path()));

            let is_final = plan.is_final(k);
            for (signature, mut members) in cohorts {
                if let Some(stray) = members.iter().find(|h| h.bytes_hashed() != end) {
                    return Err(FinderError::InternalConsistency(format!(
                        "{} read {} bytes, expected {} after round {}",
                        stray.path().display(),
                        stray.bytes_hashed(),
                        end,
                        k
                    )));
                }

                if members.len() == 1 {
                    if let Some(mut handle) = members.pop() {
                        handle.set_state(HandleState::Unique);
                        report.bytes_needed = report.bytes_needed.max(end);
                        log::trace!(
                            "{} unique after {} bytes",
                            handle.path().display(),
                            end
                        );
                        builder.assign(handle.into_record(), Verdict::Unique { bytes_read: end })?;
                    }
                } else if is_final {
                    let records: Vec<FileRecord> = members
                        .into_iter()
                        .map(|mut h| {
                            h.set_state(HandleState::DuplicateCandidate);
                            h.into_record()
                        })
                        .collect();
                    log::debug!(
                        "Duplicate cluster of {} files, {} each",
                        records.len(),
                        format_size(size)
                    );
                    builder.add_cluster(size, signature, records)?;
                    report.bytes_needed = size;
                    clusters_formed = true;
                } else {
                    survivors.extend(members);
                }
            }

            if survivors.is_empty() {
                report.state = if clusters_formed {
                    GroupState::Exhausted
                } else {
                    GroupState::Resolved
                };
                log::debug!(
                    "Size group {} {} after {} of {} rounds",
                    size,
                    report.state,
                    report.rounds,
                    plan.len()
                );
                return Ok(report);
            }
        }

        Err(FinderError::InternalConsistency(format!(
            "{} files of size {} unresolved after the final chunk",
            survivors.len(),
            size
        )))
    }
}
