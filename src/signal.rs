//! Ctrl+C as a cooperative cancellation request.
//!
//! The first interrupt sets a shared flag. The engine notices it at the next
//! group or round boundary, marks every unresolved file cancelled and returns
//! a normal report. Reads already in flight are allowed to finish, which on a
//! slow share can take a while, so a second interrupt exits immediately with
//! [`EXIT_CODE_INTERRUPTED`].
//!
//! ```rust,no_run
//! use chunkdupe::duplicates::FinderConfig;
//! use chunkdupe::signal::install_handler;
//!
//! let handler = install_handler().expect("Failed to install signal handler");
//! let config = FinderConfig::default().with_shutdown_flag(handler.get_flag());
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit code for an interrupted run: 128 + SIGINT.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with no cancellation requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request cancellation.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// The flag to hand to [`FinderConfig`](crate::duplicates::FinderConfig)
    /// and [`Progress`](crate::progress::Progress).
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear the flag so the handler can be reused.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();
static INTERRUPTS: AtomicUsize = AtomicUsize::new(0);

/// Install the process-wide Ctrl+C handler.
///
/// Calling this again returns the installed handler with its flag cleared,
/// so repeated runs in one process (tests) do not conflict.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if another handler owns the signal.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        INTERRUPTS.store(0, Ordering::SeqCst);
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();

    ctrlc::set_handler(move || {
        let count = INTERRUPTS.fetch_add(1, Ordering::SeqCst) + 1;
        flag.store(true, Ordering::SeqCst);

        let mut stderr = std::io::stderr();
        if count == 1 {
            let _ = writeln!(
                stderr,
                "\nInterrupted. Finishing reads in flight; press Ctrl+C again to exit now."
            );
            let _ = stderr.flush();
            log::info!("Cancellation requested");
        } else {
            let _ = writeln!(stderr, "\nAborted.");
            let _ = stderr.flush();
            std::process::exit(EXIT_CODE_INTERRUPTED);
        }
    })?;

    let _ = GLOBAL_HANDLER.set(handler.clone());
    Ok(handler)
}
