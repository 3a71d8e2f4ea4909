//! Adaptive per-group scheduling under a memory budget.
//!
//! # Overview
//!
//! Before a size group is processed the scheduler fixes two numbers for it:
//!
//! - `threads = min(file_count, parallelism_ceiling)`
//! - `chunk_size = max(memory_budget / threads, min_chunk_floor)`
//!
//! The floor is clamped to the budget first. If the floor pushes
//! `threads * chunk_size` over the budget, the thread count is lowered until
//! it fits, so at most `memory_budget` bytes of chunk data are ever in flight.
//! Chunk size is deliberately not capped at the file size: a file smaller
//! than one chunk is resolved in a single round.
//!
//! [`ChunkPlan`] turns a chunk size into the boundaries of one file size,
//! [`MemoryGauge`] accounts the buffers actually in flight, and
//! [`WorkerPools`] keeps one rayon pool per distinct thread count.
//!
//! # Example
//!
//! ```
//! use chunkdupe::duplicates::SchedulerConfig;
//!
//! let scheduler = SchedulerConfig::default()
//!     .with_memory_budget(4_000)
//!     .with_parallelism_ceiling(2)
//!     .with_min_chunk_floor(1_000);
//!
//! let schedule = scheduler.plan_group(5);
//! assert_eq!(schedule.threads, 2);
//! assert_eq!(schedule.chunk_size, 2_000);
//! ```

use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// 32 GiB, the default memory budget.
pub const DEFAULT_MEMORY_BUDGET: u64 = 32 * 1024 * 1024 * 1024;
/// Default upper bound on worker threads per group.
pub const DEFAULT_PARALLELISM_CEILING: usize = 16;
/// 128 MiB, the default minimum chunk size.
pub const DEFAULT_MIN_CHUNK_FLOOR: u64 = 128 * 1024 * 1024;

/// Tunables of the adaptive scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on chunk bytes in flight at once.
    pub memory_budget: u64,
    /// Upper bound on worker threads for one group.
    pub parallelism_ceiling: usize,
    /// Minimum chunk size, so tiny reads do not dominate on network storage.
    pub min_chunk_floor: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            memory_budget: DEFAULT_MEMORY_BUDGET,
            parallelism_ceiling: DEFAULT_PARALLELISM_CEILING,
            min_chunk_floor: DEFAULT_MIN_CHUNK_FLOOR,
        }
    }
}

impl SchedulerConfig {
    /// Set the memory budget in bytes.
    #[must_use]
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Set the parallelism ceiling.
    #[must_use]
    pub fn with_parallelism_ceiling(mut self, threads: usize) -> Self {
        self.parallelism_ceiling = threads;
        self
    }

    /// Set the minimum chunk size in bytes.
    #[must_use]
    pub fn with_min_chunk_floor(mut self, bytes: u64) -> Self {
        self.min_chunk_floor = bytes;
        self
    }

    /// Floor actually used for planning: never above the budget.
    #[must_use]
    pub fn effective_floor(&self) -> u64 {
        self.min_chunk_floor.min(self.memory_budget).max(1)
    }

    /// Compute the schedule for a group of `file_count` files.
    #[must_use]
    pub fn plan_group(&self, file_count: usize) -> GroupSchedule {
        let budget = self.memory_budget.max(1);
        let floor = self.effective_floor();

        let mut threads = file_count.min(self.parallelism_ceiling).max(1);
        let chunk_size = (budget / threads as u64).max(floor).max(1);

        if chunk_size.saturating_mul(threads as u64) > budget {
            let fitting = (budget / chunk_size).max(1);
            log::debug!(
                "Chunk floor {} limits {} threads to {}",
                floor,
                threads,
                fitting
            );
            threads = usize::try_from(fitting).unwrap_or(usize::MAX).min(threads);
        }

        GroupSchedule {
            threads,
            chunk_size,
        }
    }
}

/// Thread count and chunk size fixed for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSchedule {
    /// Worker threads hashing this group.
    pub threads: usize,
    /// Bytes per chunk.
    pub chunk_size: u64,
}

impl GroupSchedule {
    /// Most chunk bytes this schedule can hold in memory at once.
    #[must_use]
    pub fn peak_memory(&self) -> u64 {
        self.chunk_size.saturating_mul(self.threads as u64)
    }
}

/// Chunk boundaries for one file size.
///
/// `boundaries[k]` is the end offset of chunk `k`. Boundaries are strictly
/// increasing and the last one equals the file size. An empty file has a
/// single zero-length chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: u64,
    boundaries: Vec<u64>,
}

// Every plan has at least one chunk, so there is no `is_empty`.
#[allow(clippy::len_without_is_empty)]
impl ChunkPlan {
    /// Plan chunks of `chunk_size` bytes over a file of `file_size` bytes.
    #[must_use]
    pub fn new(file_size: u64, chunk_size: u64) -> Self {
        let chunk_size = chunk_size.max(1);
        let count = file_size.div_ceil(chunk_size).max(1);
        let boundaries = (1..=count)
            .map(|i| i.saturating_mul(chunk_size).min(file_size))
            .collect();
        Self {
            file_size,
            chunk_size,
            boundaries,
        }
    }

    /// Number of chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    /// Bytes per chunk.
    #[must_use]
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// File size this plan covers.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// End offsets of every chunk.
    #[must_use]
    pub fn boundaries(&self) -> &[u64] {
        &self.boundaries
    }

    /// End offset of chunk `k`, or `None` past the last chunk.
    #[must_use]
    pub fn end_of(&self, k: usize) -> Option<u64> {
        self.boundaries.get(k).copied()
    }

    /// Byte range of chunk `k`, or `None` past the last chunk.
    #[must_use]
    pub fn range(&self, k: usize) -> Option<Range<u64>> {
        let end = self.end_of(k)?;
        let start = if k == 0 { 0 } else { self.boundaries[k - 1] };
        Some(start..end)
    }

    /// Whether chunk `k` ends at end of file.
    #[must_use]
    pub fn is_final(&self, k: usize) -> bool {
        k + 1 == self.boundaries.len()
    }
}

/// Accounts chunk buffers in flight against a byte budget.
///
/// Reservations never block; the engine sizes its schedule so that the budget
/// holds, and the gauge records whether it ever did not.
#[derive(Debug)]
pub struct MemoryGauge {
    budget: u64,
    in_flight: AtomicU64,
    peak: AtomicU64,
    exceeded: AtomicBool,
}

impl MemoryGauge {
    /// Create a gauge for `budget` bytes.
    #[must_use]
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            in_flight: AtomicU64::new(0),
            peak: AtomicU64::new(0),
            exceeded: AtomicBool::new(false),
        }
    }

    /// Account `bytes` until the returned guard is dropped.
    #[must_use = "the reservation is released when dropped"]
    pub fn reserve(&self, bytes: u64) -> Reservation<'_> {
        let now = self.in_flight.fetch_add(bytes, Ordering::AcqRel) + bytes;
        self.peak.fetch_max(now, Ordering::AcqRel);
        if now > self.budget {
            log::error!(
                "Memory budget exceeded: {} bytes in flight, budget {}",
                now,
                self.budget
            );
            self.exceeded.store(true, Ordering::Release);
        }
        Reservation { gauge: self, bytes }
    }

    /// The configured budget.
    #[must_use]
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Bytes currently reserved.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of bytes ever reserved at once.
    #[must_use]
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Acquire)
    }

    /// Whether the budget was ever exceeded.
    #[must_use]
    pub fn exceeded(&self) -> bool {
        self.exceeded.load(Ordering::Acquire)
    }
}

/// RAII guard for bytes reserved on a [`MemoryGauge`].
#[derive(Debug)]
pub struct Reservation<'a> {
    gauge: &'a MemoryGauge,
    bytes: u64,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.gauge.in_flight.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}

/// Rayon pools keyed by thread count, built on first use.
#[derive(Default)]
pub struct WorkerPools {
    pools: HashMap<usize, rayon::ThreadPool>,
}

impl std::fmt::Debug for WorkerPools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sizes: Vec<_> = self.pools.keys().copied().collect();
        sizes.sort_unstable();
        f.debug_struct("WorkerPools").field("sizes", &sizes).finish()
    }
}

impl WorkerPools {
    /// Create an empty pool cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the pool with exactly `threads` workers, building it if needed.
    ///
    /// # Errors
    ///
    /// Returns the rayon build error if the pool cannot be created.
    pub fn get(&mut self, threads: usize) -> Result<&rayon::ThreadPool, rayon::ThreadPoolBuildError> {
        let threads = threads.max(1);
        if !self.pools.contains_key(&threads) {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(move |i| format!("chunkdupe-{threads}-{i}"))
                .build()?;
            log::debug!("Built worker pool with {} threads", threads);
            self.pools.insert(threads, pool);
        }
        Ok(&self.pools[&threads])
    }

    /// Number of distinct pools built so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether no pool has been built yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}
