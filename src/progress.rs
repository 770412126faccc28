//! Progress reporting for frame pulls.
//!
//! A [`ProgressCallback`] attached through
//! [`ExtractOptions::with_progress`](crate::ExtractOptions::with_progress)
//! observes every frame the sequencer hands to its caller. The reported
//! total is the advisory estimate while extraction is running and switches
//! to the authoritative count once the extraction process has exited.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framepull::{ExtractOptions, FrameSequencer, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("{pct:.1}% ({} frames)", info.current);
//!         }
//!     }
//! }
//!
//! let options = ExtractOptions::new().with_progress(Arc::new(PrintProgress));
//! let frames = FrameSequencer::open("input.mp4", options)?;
//! for frame in frames {
//!     let _ = frame?;
//! }
//! # Ok::<(), framepull::FramePullError>(())
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

/// A snapshot of pull progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// How many frames have been delivered so far.
    pub current: u64,
    /// Total frames expected, if known or estimated.
    pub total: Option<u64>,
    /// `true` once `total` comes from the finished extraction process rather
    /// than the pre-run estimate.
    pub total_is_exact: bool,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the first pull.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// Index of the frame that was just delivered.
    pub frame_index: Option<usize>,
}

/// Trait for receiving progress updates.
///
/// Callbacks are infallible: they observe the sequence but cannot stop it.
/// Implementations must be [`Send`] and [`Sync`] because the async frame
/// stream drives the sequencer from a blocking worker thread.
pub trait ProgressCallback: Send + Sync {
    /// Called after every delivered frame (or batch of frames).
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all notifications. Used when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Tracks timing for one sequencer and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    total: Option<u64>,
    total_is_exact: bool,
    current: u64,
    batch_size: u64,
    start_time: Option<Instant>,
    items_since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, batch_size: u64) -> Self {
        Self {
            callback,
            total: None,
            total_is_exact: false,
            current: 0,
            batch_size: batch_size.max(1),
            start_time: None,
            items_since_last_report: 0,
        }
    }

    /// Record the advisory estimate. Ignored once the exact count is known.
    pub(crate) fn set_estimate(&mut self, estimate: Option<u64>) {
        if !self.total_is_exact {
            self.total = estimate;
        }
    }

    pub(crate) fn set_exact_total(&mut self, total: u64) {
        self.total = Some(total);
        self.total_is_exact = true;
    }

    /// Record one delivered frame and fire the callback if the batch
    /// threshold is reached.
    pub(crate) fn advance(&mut self, frame_index: usize) {
        let start = *self.start_time.get_or_insert_with(Instant::now);
        self.current += 1;
        self.items_since_last_report += 1;

        if self.items_since_last_report >= self.batch_size {
            self.report(start, Some(frame_index));
            self.items_since_last_report = 0;
        }
    }

    /// Emit a final report if anything was delivered since the last one.
    pub(crate) fn finish(&mut self) {
        if self.items_since_last_report == 0 {
            return;
        }
        if let Some(start) = self.start_time {
            self.report(start, None);
        }
        self.items_since_last_report = 0;
    }

    fn report(&self, start: Instant, frame_index: Option<usize>) {
        let elapsed = start.elapsed();

        let percentage = self
            .total
            .filter(|&t| t > 0)
            .map(|t| ((self.current as f32 / t as f32) * 100.0).min(100.0));

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
            total_is_exact: self.total_is_exact,
            percentage,
            elapsed,
            estimated_remaining,
            frame_index,
        };

        self.callback.on_progress(&info);
    }
}
