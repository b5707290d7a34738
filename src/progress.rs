//! Progress reporting, session events and cancellation.
//!
//! [`SnapshotListener`] observes a run: it is told when acquisition begins,
//! after each shot lands, when the run ends, and about noteworthy
//! [`SessionEvent`]s such as skipped files or partial results.
//! [`CancellationToken`] lets another thread (or a Ctrl-C handler) stop a
//! run cooperatively.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use snapsheet::{ProgressInfo, SessionEvent, SnapOptions, SnapshotListener};
//!
//! struct PrintProgress;
//!
//! impl SnapshotListener for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("{pct:.1}% complete");
//!         }
//!     }
//!
//!     fn on_event(&self, event: &SessionEvent) {
//!         eprintln!("{event:?}");
//!     }
//! }
//!
//! let options = SnapOptions::new().with_listener(Arc::new(PrintProgress));
//! ```

use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use crate::duration::DurationMethod;
use crate::probe::Seekability;
use crate::strategy::Strategy;

/// A snapshot of acquisition progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Shots taken so far.
    pub current: u64,
    /// Shots planned, if known ahead of time.
    pub total: Option<u64>,
    /// Completion percentage (0.0 - 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Media time of the most recent shot in milliseconds.
    pub last_timestamp_ms: Option<i64>,
    /// Wall-clock time elapsed since acquisition started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
}

/// Something a listener may want to know about that is not progress.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SessionEvent {
    /// A file was skipped because of a fatal-per-file error.
    FileSkipped {
        /// The file's label or path.
        path: PathBuf,
        /// Rendered error message.
        error: String,
    },
    /// Acquisition ended with fewer shots than planned.
    PartialResult {
        /// Shots placed.
        taken: usize,
        /// Shots planned.
        planned: usize,
    },
    /// The seek-based strategy gave up on seeking.
    StrategyDemoted {
        /// Strategy that was running.
        from: Strategy,
        /// Strategy that took over.
        to: Strategy,
    },
    /// The duration was resolved.
    DurationResolved {
        /// Duration in milliseconds.
        millis: i64,
        /// How it was obtained.
        method: DurationMethod,
    },
    /// Seekability was probed.
    SeekabilityDetected(Seekability),
}

/// Trait for observing a snapshot run.
///
/// Implementations must be [`Send`] and [`Sync`] so one listener can be
/// shared across files of a queue and with signal handlers.
///
/// Listeners are **infallible**: they observe but cannot halt the run. Use
/// [`CancellationToken`] for cooperative cancellation.
pub trait SnapshotListener: Send + Sync {
    /// Acquisition of `label` is about to start with `planned` shots.
    fn on_begin(&self, _label: &str, _planned: Option<u64>) {}

    /// A shot was placed.
    fn on_progress(&self, _info: &ProgressInfo) {}

    /// Acquisition of `label` finished with `taken` shots.
    fn on_end(&self, _label: &str, _taken: u64) {}

    /// A [`SessionEvent`] occurred.
    fn on_event(&self, _event: &SessionEvent) {}
}

/// A listener that discards everything.
///
/// This is the default when no listener is configured.
pub(crate) struct NoOpListener;

impl SnapshotListener for NoOpListener {}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it between threads; call
/// [`cancel`](CancellationToken::cancel) from any thread to stop the run.
/// Acquisition checks [`is_cancelled`](CancellationToken::is_cancelled)
/// before every packet read and then finalizes normally.
///
/// # Example
///
/// ```
/// use snapsheet::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token will observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks shot timing and emits listener callbacks.
pub(crate) struct ProgressTracker {
    listener: Arc<dyn SnapshotListener>,
    total: Option<u64>,
    current: u64,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(listener: Arc<dyn SnapshotListener>, total: Option<u64>) -> Self {
        Self {
            listener,
            total,
            current: 0,
            start_time: Instant::now(),
        }
    }

    /// Record one placed shot and report it.
    pub(crate) fn advance(&mut self, timestamp_ms: Option<i64>) {
        self.current += 1;
        self.report(timestamp_ms);
    }

    pub(crate) fn event(&self, event: SessionEvent) {
        self.listener.on_event(&event);
    }

    fn report(&self, last_timestamp_ms: Option<i64>) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&t| t > 0)
            .map(|t| (self.current as f32 / t as f32) * 100.0);

        let estimated_remaining = if self.current > 0 {
            self.total.map(|t| {
                let remaining = t.saturating_sub(self.current);
                let per_item = elapsed / self.current as u32;
                per_item * remaining as u32
            })
        } else {
            None
        };

        let info = ProgressInfo {
            current: self.current,
            total: self.total,
            percentage,
            last_timestamp_ms,
            elapsed,
            estimated_remaining,
        };

        self.listener.on_progress(&info);
    }
}
