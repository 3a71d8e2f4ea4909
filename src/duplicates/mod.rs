//! Duplicate detection engine.
//!
//! This module provides functionality for:
//! - Partitioning candidates by size ([`registry`])
//! - Per-file digest state and group lifecycle ([`groups`])
//! - Memory-bounded scheduling of chunk reads ([`scheduler`])
//! - Incremental round-based grouping ([`finder`])
//! - Terminal verdicts and run reports ([`verdict`])

pub mod finder;
pub mod groups;
pub mod registry;
pub mod scheduler;
pub mod verdict;

pub use finder::{DuplicateFinder, FinderConfig, FinderError};
pub use groups::{
    DuplicateCluster, FileHandle, GroupState, GroupingStats, HandleState, SizeGroup,
};
pub use registry::SizeRegistry;
pub use scheduler::{ChunkPlan, GroupSchedule, MemoryGauge, SchedulerConfig, WorkerPools};
pub use verdict::{format_size, DedupeReport, FileVerdict, GroupReport, ScanSummary, Verdict};
