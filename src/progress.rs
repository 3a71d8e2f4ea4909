//! Progress reporting and cooperative cancellation.
//!
//! The engine talks to its caller through [`ProgressCallback`]: it announces
//! every round of every size group, pushes short status lines, and polls
//! [`ProgressCallback::should_cancel`] before each group and before each
//! round. [`Progress`] is the terminal implementation built on indicatif.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::duplicates::GroupState;

/// Receiver of progress events from the duplicate engine.
///
/// Only [`on_round_start`](Self::on_round_start) and
/// [`on_status`](Self::on_status) are required. Calls arrive from the
/// coordinating thread, never from hashing workers.
pub trait ProgressCallback: Send + Sync {
    /// Called once before the first group with the number of multi-member
    /// groups and the bytes a whole-file comparison would read.
    fn on_run_start(&self, _total_groups: usize, _candidate_bytes: u64) {}

    /// Called before each round of a group. `group_index` is 0-based.
    fn on_round_start(&self, group_index: usize, total_groups: usize);

    /// Called with a human-readable status line.
    fn on_status(&self, message: &str);

    /// Called after each round with the bytes read in that round.
    fn on_bytes_hashed(&self, _bytes: u64) {}

    /// Called when a group reaches its terminal state.
    fn on_group_complete(&self, _group_index: usize, _state: GroupState) {}

    /// Called once after the last group.
    fn on_run_end(&self) {}

    /// Polled at group and round boundaries. Returning `true` stops the run.
    fn should_cancel(&self) -> bool {
        false
    }
}

/// Terminal progress display.
///
/// Shows one bar for size groups and one byte counter for data read. When a
/// shutdown flag is attached, [`should_cancel`](ProgressCallback::should_cancel)
/// reports it.
pub struct Progress {
    multi: MultiProgress,
    groups: Mutex<Option<ProgressBar>>,
    bytes: Mutex<Option<ProgressBar>>,
    shutdown_flag: Option<Arc<AtomicBool>>,
    quiet: bool,
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("quiet", &self.quiet)
            .field("shutdown_flag", &self.shutdown_flag)
            .finish_non_exhaustive()
    }
}

impl Progress {
    /// Create a new progress display. With `quiet` set nothing is drawn.
    ///
    /// ```
    /// use chunkdupe::progress::Progress;
    ///
    /// let progress = Progress::new(true);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            groups: Mutex::new(None),
            bytes: Mutex::new(None),
            shutdown_flag: None,
            quiet,
        }
    }

    /// Report cancellation whenever `flag` is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn groups_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} groups {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn bytes_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.green/blue}] {bytes}/{total_bytes} read {bytes_per_sec}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn with_bar(slot: &Mutex<Option<ProgressBar>>, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = slot.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }
}

impl ProgressCallback for Progress {
    fn on_run_start(&self, total_groups: usize, candidate_bytes: u64) {
        if self.quiet {
            return;
        }

        let groups = self.multi.add(ProgressBar::new(total_groups as u64));
        groups.set_style(Self::groups_style());
        let bytes = self.multi.add(ProgressBar::new(candidate_bytes));
        bytes.set_style(Self::bytes_style());

        if let Ok(mut slot) = self.groups.lock() {
            *slot = Some(groups);
        }
        if let Ok(mut slot) = self.bytes.lock() {
            *slot = Some(bytes);
        }
    }

    fn on_round_start(&self, group_index: usize, _total_groups: usize) {
        if self.quiet {
            return;
        }
        Self::with_bar(&self.groups, |pb| pb.set_position(group_index as u64));
    }

    fn on_status(&self, message: &str) {
        if self.quiet {
            return;
        }
        Self::with_bar(&self.groups, |pb| pb.set_message(message.to_string()));
    }

    fn on_bytes_hashed(&self, bytes: u64) {
        if self.quiet {
            return;
        }
        Self::with_bar(&self.bytes, |pb| pb.inc(bytes));
    }

    fn on_group_complete(&self, group_index: usize, _state: GroupState) {
        if self.quiet {
            return;
        }
        Self::with_bar(&self.groups, |pb| pb.set_position(group_index as u64 + 1));
    }

    fn on_run_end(&self) {
        if self.quiet {
            return;
        }
        if let Ok(mut slot) = self.groups.lock() {
            if let Some(pb) = slot.take() {
                pb.finish_with_message("done");
            }
        }
        if let Ok(mut slot) = self.bytes.lock() {
            if let Some(pb) = slot.take() {
                pb.finish();
            }
        }
    }

    fn should_cancel(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}
