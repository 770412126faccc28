//! Extraction configuration.
//!
//! [`ExtractOptions`] is a builder that carries the sampling rate, the
//! post-processing filter chain, the scratch directory, tool locations and
//! progress reporting into a [`FrameSequencer`](crate::FrameSequencer)
//! without growing every constructor signature.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use framepull::ExtractOptions;
//!
//! let options = ExtractOptions::new()
//!     .with_fps(2)
//!     .with_filter("scale", "320:-1")
//!     .with_scratch_dir("/var/tmp/frames")
//!     .with_poll_interval(Duration::from_millis(250));
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::progress::{NoOpProgress, ProgressCallback};

/// Default bounded wait between process-status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default ffmpeg worker thread count. Extraction does not get faster
/// beyond this.
pub const DEFAULT_THREADS: u32 = 4;

/// Name of the scratch directory created under the system temp dir.
const DEFAULT_SCRATCH_DIR_NAME: &str = "framepull-frames";

/// Configuration for a frame extraction run.
///
/// All fields have defaults; `ExtractOptions::new()` extracts every frame at
/// the source's native rate into a shared scratch directory under the system
/// temp dir.
#[derive(Clone)]
pub struct ExtractOptions {
    /// Target sampling rate in frames per second. `0` keeps the native rate.
    pub(crate) fps: u32,
    /// Ordered post-processing filters as `(name, parameter)` pairs.
    pub(crate) filters: Vec<(String, String)>,
    /// Directory shared by all runs for frame output.
    pub(crate) scratch_dir: PathBuf,
    /// Bounded wait on the notification channel between status polls.
    pub(crate) poll_interval: Duration,
    pub(crate) ffmpeg_path: PathBuf,
    pub(crate) ffprobe_path: PathBuf,
    pub(crate) threads: u32,
    /// Whether to probe the source for an advisory frame count.
    pub(crate) estimate: bool,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// How often to fire the progress callback (every N frames).
    pub(crate) batch_size: u64,
}

impl Debug for ExtractOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExtractOptions")
            .field("fps", &self.fps)
            .field("filters", &self.filters)
            .field("scratch_dir", &self.scratch_dir)
            .field("poll_interval", &self.poll_interval)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("ffprobe_path", &self.ffprobe_path)
            .field("threads", &self.threads)
            .field("estimate", &self.estimate)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractOptions {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self {
            fps: 0,
            filters: Vec::new(),
            scratch_dir: std::env::temp_dir().join(DEFAULT_SCRATCH_DIR_NAME),
            poll_interval: DEFAULT_POLL_INTERVAL,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            threads: DEFAULT_THREADS,
            estimate: true,
            progress: Arc::new(NoOpProgress),
            batch_size: 1,
        }
    }

    /// Sample the source at `fps` frames per second. `0` keeps every frame.
    #[must_use]
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Append a post-processing filter, applied after rate sampling and
    /// before frames are numbered.
    ///
    /// Any filter disables the pre-run frame-count estimate.
    #[must_use]
    pub fn with_filter(mut self, name: impl Into<String>, parameter: impl Into<String>) -> Self {
        self.filters.push((name.into(), parameter.into()));
        self
    }

    /// Replace the whole filter chain.
    #[must_use]
    pub fn with_filters<I, K, V>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.filters = filters
            .into_iter()
            .map(|(name, parameter)| (name.into(), parameter.into()))
            .collect();
        self
    }

    /// Set the directory frames are written to. Several runs may share it.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.scratch_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the bounded wait between extraction-process status polls.
    ///
    /// Clamped to at least one millisecond.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Use a specific `ffmpeg` binary.
    #[must_use]
    pub fn with_ffmpeg_path(mut self, path: impl AsRef<Path>) -> Self {
        self.ffmpeg_path = path.as_ref().to_path_buf();
        self
    }

    /// Use a specific `ffprobe` binary for the pre-run estimate.
    #[must_use]
    pub fn with_ffprobe_path(mut self, path: impl AsRef<Path>) -> Self {
        self.ffprobe_path = path.as_ref().to_path_buf();
        self
    }

    /// Set the ffmpeg worker thread count. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Enable or disable the pre-run frame-count estimate.
    #[must_use]
    pub fn with_estimate(mut self, enabled: bool) -> Self {
        self.estimate = enabled;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Set how often the progress callback fires. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Target sampling rate (`0` = native).
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// The configured filter chain, in application order.
    pub fn filters(&self) -> &[(String, String)] {
        &self.filters
    }

    /// Directory frames are written to.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Bounded wait between status polls.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    pub fn ffprobe_path(&self) -> &Path {
        &self.ffprobe_path
    }

    /// The ffmpeg video filter graph, or `None` when no filtering is needed.
    ///
    /// The rate filter always comes first so that the user filters see the
    /// sampled stream.
    pub(crate) fn filter_graph(&self) -> Option<String> {
        let mut stages = Vec::with_capacity(self.filters.len() + 1);
        if self.fps > 0 {
            stages.push(format!("fps={}", self.fps));
        }
        for (name, parameter) in &self.filters {
            if parameter.is_empty() {
                stages.push(name.clone());
            } else {
                stages.push(format!("{name}={parameter}"));
            }
        }
        if stages.is_empty() { None } else { Some(stages.join(",")) }
    }
}
