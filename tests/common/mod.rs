//! Scripted extraction runs for driving the sequencer without ffmpeg.
//!
//! A [`ScriptedLauncher`] writes real JPEG files into a temp scratch
//! directory and pushes completion notifications in a chosen order, while a
//! [`ScriptedProcess`] reports its exit after a given number of polls.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use framepull::{
    CompletionWatcher, ExtractOptions, ExtractionPlan, ExtractionProcess, FrameCountEstimator,
    FrameEstimate, FramePullError, FrameSequencer, LaunchedRun, Launcher, ProcessExit, RunId,
};
use image::{Rgb, RgbImage};

pub const FRAME_SIZE: u32 = 4;

/// What a scripted run does.
#[derive(Debug, Clone)]
pub struct Script {
    /// Frame files written at launch, numbered from 1.
    pub frames: usize,
    /// One-based frame numbers notified at launch, in this order.
    pub order: Vec<usize>,
    /// One-based frame numbers written and notified from a helper thread
    /// after `late_delay`.
    pub late: Vec<usize>,
    pub late_delay: Duration,
    /// Raw file names notified at launch after `order`.
    pub foreign: Vec<String>,
    /// Polls answered with "still running" before the exit is reported.
    pub exit_after_polls: usize,
    pub success: bool,
    pub log: String,
}

impl Script {
    /// `frames` files notified in `order`; the process exits on the first
    /// poll reporting `frame=<frames>`.
    pub fn in_order(frames: usize, order: &[usize]) -> Self {
        Self {
            frames,
            order: order.to_vec(),
            late: Vec::new(),
            late_delay: Duration::ZERO,
            foreign: Vec::new(),
            exit_after_polls: 0,
            success: true,
            log: format!("frame={frames}\nfps=0.0\nprogress=end"),
        }
    }

    pub fn sequential(frames: usize) -> Self {
        let order: Vec<usize> = (1..=frames).collect();
        Self::in_order(frames, &order)
    }
}

/// Counters shared between a test and the scripted run.
#[derive(Debug, Default)]
pub struct RunProbe {
    pub launches: AtomicUsize,
    pub watcher_stops: AtomicUsize,
    pub reaps: AtomicUsize,
    pub polls: AtomicUsize,
}

impl RunProbe {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn watcher_stops(&self) -> usize {
        self.watcher_stops.load(Ordering::SeqCst)
    }

    pub fn reaps(&self) -> usize {
        self.reaps.load(Ordering::SeqCst)
    }
}

pub struct ScriptedLauncher {
    script: Script,
    probe: Arc<RunProbe>,
}

impl ScriptedLauncher {
    pub fn new(script: Script, probe: Arc<RunProbe>) -> Self {
        Self { script, probe }
    }
}

impl Launcher for ScriptedLauncher {
    fn launch(
        &self,
        plan: &ExtractionPlan,
        notifications: Sender<PathBuf>,
    ) -> Result<LaunchedRun, FramePullError> {
        self.probe.launches.fetch_add(1, Ordering::SeqCst);
        let dir = plan.options.scratch_dir().to_path_buf();
        fs::create_dir_all(&dir)?;

        for number in (1..=self.script.frames).filter(|number| !self.script.late.contains(number)) {
            write_frame(&plan.pattern.frame_path(&dir, number - 1), number)?;
        }
        for &number in &self.script.order {
            let _ = notifications.send(plan.pattern.frame_path(&dir, number - 1));
        }
        for name in &self.script.foreign {
            let _ = notifications.send(dir.join(name));
        }

        let late_sender = notifications.clone();
        let late = self.script.late.clone();
        let delay = self.script.late_delay;
        let pattern = plan.pattern.clone();
        let late_dir = dir.clone();
        let delivery = thread::spawn(move || {
            if late.is_empty() {
                return;
            }
            thread::sleep(delay);
            for number in late {
                let path = pattern.frame_path(&late_dir, number - 1);
                if write_frame(&path, number).is_ok() {
                    let _ = late_sender.send(path);
                }
            }
        });

        Ok(LaunchedRun {
            process: Box::new(ScriptedProcess {
                exit_after_polls: self.script.exit_after_polls,
                success: self.script.success,
                log: self.script.log.clone(),
                exited: false,
                probe: self.probe.clone(),
            }),
            watcher: Box::new(ScriptedWatcher {
                notifications: Some(notifications),
                delivery: Some(delivery),
                probe: self.probe.clone(),
            }),
        })
    }
}

pub struct ScriptedProcess {
    exit_after_polls: usize,
    success: bool,
    log: String,
    exited: bool,
    probe: Arc<RunProbe>,
}

impl ExtractionProcess for ScriptedProcess {
    fn try_exit(&mut self) -> Result<Option<ProcessExit>, FramePullError> {
        if self.exited {
            return Ok(None);
        }
        let polls = self.probe.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if polls <= self.exit_after_polls {
            return Ok(None);
        }
        self.exited = true;
        Ok(Some(ProcessExit {
            success: self.success,
            status: if self.success {
                "exit status: 0".to_string()
            } else {
                "exit status: 1".to_string()
            },
            log: self.log.clone(),
        }))
    }

    fn reap(&mut self) {
        self.exited = true;
        self.probe.reaps.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ScriptedWatcher {
    notifications: Option<Sender<PathBuf>>,
    delivery: Option<JoinHandle<()>>,
    probe: Arc<RunProbe>,
}

impl CompletionWatcher for ScriptedWatcher {
    fn stop(&mut self) {
        if let Some(delivery) = self.delivery.take() {
            let _ = delivery.join();
        }
        if self.notifications.take().is_some() {
            self.probe.watcher_stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Always answers with the same estimate and counts calls.
#[derive(Debug, Default)]
pub struct FixedEstimator {
    pub frames: Option<u64>,
    pub calls: Arc<AtomicUsize>,
}

impl FrameCountEstimator for FixedEstimator {
    fn estimate(&self, _source: &Path, _fps: u32) -> Result<FrameEstimate, FramePullError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.frames
            .map(|frames| FrameEstimate {
                frames,
                duration: None,
            })
            .ok_or_else(|| FramePullError::Probe("no estimate".to_string()))
    }
}

/// Write a small JPEG whose pixels encode `number`.
pub fn write_frame(path: &Path, number: usize) -> Result<(), FramePullError> {
    let shade = (number * 40 % 256) as u8;
    RgbImage::from_pixel(FRAME_SIZE, FRAME_SIZE, Rgb([shade, shade, shade])).save(path)?;
    Ok(())
}

/// A placeholder source file; the scripted launcher never reads it.
pub fn source_file(dir: &Path) -> PathBuf {
    let path = dir.join("source.mp4");
    fs::write(&path, b"not really a video").expect("Failed to write source");
    path
}

pub fn scratch_dir(dir: &Path) -> PathBuf {
    dir.join("scratch")
}

pub fn test_options(dir: &Path) -> ExtractOptions {
    ExtractOptions::new()
        .with_scratch_dir(scratch_dir(dir))
        .with_poll_interval(Duration::from_millis(10))
        .with_estimate(false)
}

/// A sequencer over `script` with run id `run`.
pub fn scripted_sequencer(dir: &Path, script: Script) -> (FrameSequencer, Arc<RunProbe>) {
    scripted_sequencer_with(dir, script, "run", test_options(dir))
}

pub fn scripted_sequencer_with(
    dir: &Path,
    script: Script,
    run_id: &str,
    options: ExtractOptions,
) -> (FrameSequencer, Arc<RunProbe>) {
    let probe = Arc::new(RunProbe::default());
    let sequencer = FrameSequencer::builder(source_file(dir))
        .options(options)
        .launcher(ScriptedLauncher::new(script, probe.clone()))
        .run_id(RunId::from_token(run_id))
        .build()
        .expect("Failed to build sequencer");
    (sequencer, probe)
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string()
}
