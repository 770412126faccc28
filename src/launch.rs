//! Starting a run: watcher first, then the extraction process.
//!
//! A [`Launcher`] turns an [`ExtractionPlan`] into a [`LaunchedRun`]. The
//! sequencer calls it exactly once, on the first pull or seek. The default
//! [`FfmpegLauncher`] registers a [`ScratchWatcher`] on the scratch
//! directory and then spawns `ffmpeg`; other launchers (for example a
//! scripted one in tests) can stand in for either side.

use std::path::PathBuf;

use crossbeam_channel::Sender;

use crate::configuration::ExtractOptions;
use crate::error::FramePullError;
use crate::process::{ExtractionProcess, FfmpegProcess, ffmpeg_arguments};
use crate::run::FramePattern;
use crate::utilities::ensure_scratch_dir;
use crate::watcher::{CompletionWatcher, ScratchWatcher};

/// Everything needed to start one run.
#[derive(Debug, Clone)]
pub struct ExtractionPlan {
    /// The source video.
    pub source: PathBuf,
    /// Naming scheme of this run's frame files.
    pub pattern: FramePattern,
    /// Run options.
    pub options: ExtractOptions,
}

/// The live resources of a started run.
pub struct LaunchedRun {
    pub process: Box<dyn ExtractionProcess>,
    pub watcher: Box<dyn CompletionWatcher>,
}

/// Starts the process and watcher for a run.
pub trait Launcher: Send {
    /// Start the run. Completion notifications must go to `notifications`.
    ///
    /// On error nothing may be left running.
    fn launch(
        &self,
        plan: &ExtractionPlan,
        notifications: Sender<PathBuf>,
    ) -> Result<LaunchedRun, FramePullError>;
}

/// Launches `ffmpeg` watched by a [`ScratchWatcher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegLauncher;

impl Launcher for FfmpegLauncher {
    fn launch(
        &self,
        plan: &ExtractionPlan,
        notifications: Sender<PathBuf>,
    ) -> Result<LaunchedRun, FramePullError> {
        let scratch_dir = &plan.options.scratch_dir;
        ensure_scratch_dir(scratch_dir)?;

        // Watch before spawning so the first frame cannot slip past.
        let watcher = ScratchWatcher::start(scratch_dir, plan.pattern.clone(), notifications)?;

        let args = ffmpeg_arguments(&plan.source, &plan.options, &plan.pattern);
        // On failure `watcher` is dropped here, which stops it.
        let process = FfmpegProcess::spawn(&plan.options.ffmpeg_path, &args)?;

        log::debug!(
            "Started run {} (pid {}) for {}",
            plan.pattern.run_id(),
            process.id(),
            plan.source.display()
        );

        Ok(LaunchedRun {
            process: Box::new(process),
            watcher: Box::new(watcher),
        })
    }
}
