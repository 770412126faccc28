//! Lazy, strictly ordered frame sequencer.
//!
//! [`FrameSequencer`] turns an asynchronous extraction run into an ordered,
//! forward-seekable sequence of frame files. The extraction process and the
//! scratch watcher are started on the first pull or seek. Completion
//! notifications arrive in any order; the sequencer parks early arrivals in
//! a sparse path table and hands frames to the caller strictly by index.
//!
//! Two facts decide when the sequence ends: the process has exited (its log
//! then carries the authoritative frame count), and every frame up to that
//! count has been delivered. The process may exit before the notification
//! for its last file comes in, so the pull loop alternates a non-blocking
//! status poll with a bounded wait on the notification channel. Waiting on
//! either one alone can hang.
//!
//! Each delivered file is deleted on the following pull. Callers that need
//! a frame beyond that point must copy or decode it first.
//!
//! # Example
//!
//! ```no_run
//! use framepull::{ExtractOptions, FrameSequencer};
//!
//! let mut frames = FrameSequencer::open("input.mp4", ExtractOptions::new().with_fps(1))?;
//! frames.seek(10)?;
//! while let Some(frame) = frames.next_frame()? {
//!     println!("frame {} at {}", frame.index, frame.path.display());
//! }
//! # Ok::<(), framepull::FramePullError>(())
//! ```

use std::iter::FusedIterator;
use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::configuration::ExtractOptions;
use crate::error::FramePullError;
use crate::estimate::{FfprobeEstimator, FrameCountEstimator, FrameEstimate, advisory_estimate};
use crate::launch::{ExtractionPlan, FfmpegLauncher, LaunchedRun, Launcher};
use crate::process::{ExtractionProcess, ProcessExit, log_tail, parse_frame_count};
use crate::progress::ProgressTracker;
use crate::run::{FramePattern, RunId};
use crate::utilities::reclaim_frame_file;
use crate::watcher::CompletionWatcher;

/// Upper bound on the path table capacity reserved from an estimate.
const MAX_PRESIZED_SLOTS: usize = 1 << 16;

/// A frame handed out by the sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Zero-based frame index.
    pub index: usize,
    /// Location of the JPEG file. Valid until the next pull.
    pub path: PathBuf,
}

/// Observable lifecycle of a sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// Nothing has been started yet.
    NotStarted,
    /// The process is running; the total frame count is not known.
    Extracting,
    /// The process has exited and reported its frame count; frames are
    /// still pending.
    Draining,
    /// Every frame has been delivered and all run resources are released.
    Exhausted,
    /// The run was aborted by an error; all run resources are released.
    Failed,
}

/// What the sequencer knows about the number of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCount {
    Unknown,
    /// Advisory pre-run estimate. Never used as a bound.
    Estimated(u64),
    /// Reported by the exited process. Immutable once set.
    Exact(usize),
}

impl FrameCount {
    pub fn exact(self) -> Option<usize> {
        match self {
            FrameCount::Exact(count) => Some(count),
            _ => None,
        }
    }
}

/// Live resources of a started run.
struct ActiveRun {
    process: Box<dyn ExtractionProcess>,
    watcher: Box<dyn CompletionWatcher>,
    notifications: Receiver<PathBuf>,
    process_exited: bool,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.watcher.stop();
        self.process.reap();
    }
}

enum Phase {
    NotStarted,
    Running(ActiveRun),
    Exhausted,
    Failed,
}

/// Builder for a [`FrameSequencer`] with non-default collaborators.
///
/// [`FrameSequencer::open`] covers the common case.
pub struct SequencerBuilder {
    source: PathBuf,
    options: ExtractOptions,
    launcher: Box<dyn Launcher>,
    estimator: Option<Box<dyn FrameCountEstimator>>,
    run_id: Option<RunId>,
}

impl SequencerBuilder {
    #[must_use]
    pub fn options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the launcher that starts the process and watcher.
    #[must_use]
    pub fn launcher(mut self, launcher: impl Launcher + 'static) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    /// Replace the pre-run estimator. Defaults to `ffprobe`.
    #[must_use]
    pub fn estimator(mut self, estimator: impl FrameCountEstimator + 'static) -> Self {
        self.estimator = Some(Box::new(estimator));
        self
    }

    /// Use a fixed run id instead of a random one.
    #[must_use]
    pub fn run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Validate the source, run the advisory estimate and build the
    /// sequencer. Nothing is started yet.
    ///
    /// # Errors
    ///
    /// [`FramePullError::SourceNotFound`] or [`FramePullError::NotAFile`]
    /// when the source is not a readable regular file.
    pub fn build(self) -> Result<FrameSequencer, FramePullError> {
        check_source(&self.source)?;

        let estimator: Box<dyn FrameCountEstimator> = match self.estimator {
            Some(estimator) => estimator,
            None => Box::new(FfprobeEstimator::new(&self.options.ffprobe_path)),
        };
        let estimate = advisory_estimate(estimator.as_ref(), &self.source, &self.options);

        let mut progress =
            ProgressTracker::new(self.options.progress.clone(), self.options.batch_size);
        progress.set_estimate(estimate.map(|estimate| estimate.frames));

        let slots = estimate
            .map(|estimate| (estimate.frames as usize).min(MAX_PRESIZED_SLOTS))
            .unwrap_or(0);

        let pattern = FramePattern::new(self.run_id.unwrap_or_else(RunId::generate));
        log::debug!(
            "Prepared run {} for {}",
            pattern.run_id(),
            self.source.display()
        );

        Ok(FrameSequencer {
            plan: ExtractionPlan {
                source: self.source,
                pattern,
                options: self.options,
            },
            launcher: self.launcher,
            phase: Phase::NotStarted,
            next_index: 0,
            frame_paths: Vec::with_capacity(slots),
            last_delivered: None,
            frame_count: estimate.map_or(FrameCount::Unknown, |estimate| {
                FrameCount::Estimated(estimate.frames)
            }),
            estimate,
            progress,
        })
    }
}

/// Pull-based, forward-only sequence of extracted frames.
///
/// Created via [`FrameSequencer::open`] or [`FrameSequencer::builder`].
/// Implements [`Iterator`]; after exhaustion or an error it yields `None`.
///
/// Dropping a started sequencer runs [`close`](FrameSequencer::close), which
/// drains the remaining frames so that the process is reaped and the watcher
/// stopped even when the caller stops early.
pub struct FrameSequencer {
    plan: ExtractionPlan,
    launcher: Box<dyn Launcher>,
    phase: Phase,
    /// Index of the next frame to deliver. Meaningful once started.
    next_index: usize,
    /// Sparse table of arrived but undelivered frames.
    frame_paths: Vec<Option<PathBuf>>,
    /// The file handed out by the previous pull, deleted on the next one.
    last_delivered: Option<PathBuf>,
    frame_count: FrameCount,
    estimate: Option<FrameEstimate>,
    progress: ProgressTracker,
}

impl FrameSequencer {
    /// Prepare a sequencer over `source` that extracts with `ffmpeg`.
    ///
    /// The source is validated and, unless disabled or a filter is set,
    /// probed for an advisory frame count. Extraction starts on the first
    /// pull or seek.
    ///
    /// # Errors
    ///
    /// [`FramePullError::SourceNotFound`] or [`FramePullError::NotAFile`].
    pub fn open<P: AsRef<Path>>(source: P, options: ExtractOptions) -> Result<Self, FramePullError> {
        Self::builder(source).options(options).build()
    }

    /// Start building a sequencer with custom collaborators.
    pub fn builder<P: AsRef<Path>>(source: P) -> SequencerBuilder {
        SequencerBuilder {
            source: source.as_ref().to_path_buf(),
            options: ExtractOptions::new(),
            launcher: Box::new(FfmpegLauncher),
            estimator: None,
            run_id: None,
        }
    }

    /// The source video.
    pub fn source(&self) -> &Path {
        &self.plan.source
    }

    pub fn run_id(&self) -> &RunId {
        self.plan.pattern.run_id()
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.plan.options
    }

    /// Index of the next frame to be returned, or `None` before the first
    /// pull or seek.
    pub fn cursor(&self) -> Option<usize> {
        match self.phase {
            Phase::NotStarted => None,
            _ => Some(self.next_index),
        }
    }

    /// Best current knowledge of the frame count.
    pub fn frame_count(&self) -> FrameCount {
        self.frame_count
    }

    /// The advisory estimate taken when the sequencer was built.
    pub fn estimate(&self) -> Option<FrameEstimate> {
        self.estimate
    }

    pub fn state(&self) -> SequencerState {
        match self.phase {
            Phase::NotStarted => SequencerState::NotStarted,
            Phase::Running(_) => match self.frame_count {
                FrameCount::Exact(_) => SequencerState::Draining,
                _ => SequencerState::Extracting,
            },
            Phase::Exhausted => SequencerState::Exhausted,
            Phase::Failed => SequencerState::Failed,
        }
    }

    /// Return the next frame in index order, or `None` at the end.
    ///
    /// Blocks until the frame has been written. The file returned by the
    /// previous call is deleted first.
    ///
    /// # Errors
    ///
    /// Protocol violations, process spawn or exit failures and watcher
    /// errors. Any error ends the run: the watcher is stopped, the process
    /// reaped, and later calls return `Ok(None)`.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FramePullError> {
        match self.phase {
            Phase::Exhausted | Phase::Failed => return Ok(None),
            Phase::NotStarted | Phase::Running(_) => {}
        }
        self.pull().inspect_err(|error| self.abort(error))
    }

    /// Advance so that the next pull returns frame `target`.
    ///
    /// Frames in between are pulled and discarded (and their files deleted).
    /// Starts extraction if it has not started yet.
    ///
    /// # Errors
    ///
    /// [`FramePullError::InvalidSeek`] when `target` is behind the cursor,
    /// [`FramePullError::SeekPastEnd`] when the video ends first,
    /// [`FramePullError::RunFailed`] when an earlier error ended the run, or
    /// any error from [`next_frame`](FrameSequencer::next_frame).
    pub fn seek(&mut self, target: usize) -> Result<(), FramePullError> {
        let cursor = self.cursor().unwrap_or(0);
        if target < cursor {
            return Err(FramePullError::InvalidSeek { target, cursor });
        }
        if target > cursor && matches!(self.phase, Phase::Failed) {
            return Err(FramePullError::RunFailed { target, cursor });
        }

        if matches!(self.phase, Phase::NotStarted) {
            self.start().inspect_err(|error| self.abort(error))?;
        }

        while self.next_index < target {
            if self.next_frame()?.is_none() {
                return Err(FramePullError::SeekPastEnd {
                    target,
                    frame_count: self.frame_count.exact().unwrap_or(self.next_index),
                });
            }
        }
        Ok(())
    }

    /// Drain the remaining frames and release all run resources.
    ///
    /// A no-op when nothing was started. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<(), FramePullError> {
        if matches!(self.phase, Phase::NotStarted) {
            return Ok(());
        }
        while self.next_frame()?.is_some() {}
        Ok(())
    }

    fn start(&mut self) -> Result<(), FramePullError> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let LaunchedRun { process, watcher } = self.launcher.launch(&self.plan, sender)?;
        self.phase = Phase::Running(ActiveRun {
            process,
            watcher,
            notifications: receiver,
            process_exited: false,
        });
        self.next_index = 0;
        Ok(())
    }

    fn pull(&mut self) -> Result<Option<Frame>, FramePullError> {
        if matches!(self.phase, Phase::NotStarted) {
            self.start()?;
        }
        let cursor = self.next_index;

        if let Some(previous) = self.last_delivered.take() {
            reclaim_frame_file(&previous);
        }

        if self.bound_reached(cursor) {
            self.finish();
            return Ok(None);
        }

        if self.frame_paths.len() <= cursor {
            self.frame_paths.resize(cursor + 1, None);
        }

        let path = loop {
            if let Some(path) = self.frame_paths[cursor].take() {
                break path;
            }

            if self.poll_process()? && self.bound_reached(cursor) {
                self.finish();
                return Ok(None);
            }

            if let Some(path) = self.wait_for_notification(cursor)? {
                self.record_path(path)?;
            }
        };

        self.last_delivered = Some(path.clone());
        self.next_index = cursor + 1;
        self.progress.advance(cursor);
        Ok(Some(Frame {
            index: cursor,
            path,
        }))
    }

    fn bound_reached(&self, cursor: usize) -> bool {
        self.frame_count.exact().is_some_and(|count| cursor >= count)
    }

    /// Poll the process once. Returns `true` when this call observed its
    /// exit and recorded the authoritative frame count.
    fn poll_process(&mut self) -> Result<bool, FramePullError> {
        let Phase::Running(run) = &mut self.phase else {
            return Ok(false);
        };
        if run.process_exited {
            return Ok(false);
        }
        let Some(exit) = run.process.try_exit()? else {
            return Ok(false);
        };
        run.process_exited = true;
        self.record_exit(exit)?;
        Ok(true)
    }

    fn record_exit(&mut self, exit: ProcessExit) -> Result<(), FramePullError> {
        if !exit.success {
            return Err(FramePullError::ExtractionFailed {
                status: exit.status,
                tail: log_tail(&exit.log),
            });
        }
        let count = parse_frame_count(&exit.log).ok_or_else(|| FramePullError::MissingFrameCount {
            tail: log_tail(&exit.log),
        })?;

        log::debug!(
            "Run {} finished with {count} frames (estimate: {:?})",
            self.plan.pattern.run_id(),
            self.estimate.map(|estimate| estimate.frames)
        );
        self.frame_count = FrameCount::Exact(count);
        self.progress.set_exact_total(count as u64);
        Ok(())
    }

    /// Wait up to one poll interval for a notification.
    fn wait_for_notification(&self, cursor: usize) -> Result<Option<PathBuf>, FramePullError> {
        let Phase::Running(run) = &self.phase else {
            return Ok(None);
        };
        match run.notifications.recv_timeout(self.plan.options.poll_interval) {
            Ok(path) => Ok(Some(path)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(FramePullError::Watcher(format!(
                "notification channel closed while waiting for frame {cursor}"
            ))),
        }
    }

    /// File an arrived frame under its index.
    fn record_path(&mut self, path: PathBuf) -> Result<(), FramePullError> {
        let Some(index) = self.plan.pattern.frame_index(&path) else {
            return Err(FramePullError::UnexpectedFramePath {
                path,
                run_id: self.plan.pattern.run_id().to_string(),
            });
        };

        // No file can lie beyond the count the process reported.
        if self.frame_count.exact().is_some_and(|count| index >= count) {
            return Err(FramePullError::UnexpectedFramePath {
                path,
                run_id: self.plan.pattern.run_id().to_string(),
            });
        }

        if index < self.next_index
            || self.frame_paths.get(index).is_some_and(Option::is_some)
        {
            log::warn!("Ignoring repeated notification for frame {index}: {}", path.display());
            return Ok(());
        }

        if index >= self.frame_paths.len() {
            self.frame_paths.resize(index + 1, None);
        }
        log::trace!("Frame {index} arrived: {}", path.display());
        self.frame_paths[index] = Some(path);
        Ok(())
    }

    fn finish(&mut self) {
        if let Phase::Running(run) = std::mem::replace(&mut self.phase, Phase::Exhausted) {
            // Stops the watcher and reaps the process.
            drop(run);
            log::debug!(
                "Run {} exhausted after {} frames",
                self.plan.pattern.run_id(),
                self.next_index
            );
        }
        self.progress.finish();
    }

    fn abort(&mut self, error: &FramePullError) {
        log::debug!("Run {} aborted: {error}", self.plan.pattern.run_id());
        if let Phase::Running(run) = std::mem::replace(&mut self.phase, Phase::Failed) {
            drop(run);
        }
    }
}

impl Iterator for FrameSequencer {
    type Item = Result<Frame, FramePullError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

impl FusedIterator for FrameSequencer {}

impl Drop for FrameSequencer {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::warn!(
                "Run {} failed while closing: {error}",
                self.plan.pattern.run_id()
            );
        }
    }
}

fn check_source(source: &Path) -> Result<(), FramePullError> {
    if !source.exists() {
        return Err(FramePullError::SourceNotFound {
            path: source.to_path_buf(),
        });
    }
    if !source.is_file() {
        return Err(FramePullError::NotAFile {
            path: source.to_path_buf(),
        });
    }
    Ok(())
}
