//! Scratch-directory watcher.
//!
//! [`ScratchWatcher`] observes the shared scratch directory for frame files
//! that have been fully written (closed after writing) and posts their paths
//! onto the sequencer's notification channel. Only names starting with the
//! run's `{run_id}_` prefix are forwarded; everything else in the directory
//! belongs to other runs.
//!
//! The watcher is the sole producer on the channel and never touches
//! sequencing state. Events arrive in no particular order relative to the
//! frame numbers in the file names.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, select};
use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{AccessKind, AccessMode},
};

use crate::error::FramePullError;
use crate::run::{FRAME_EXTENSION, FramePattern};

/// Something that delivers completion notifications until stopped.
///
/// `stop` must be idempotent and must not return before the background
/// thread of control has finished.
pub trait CompletionWatcher: Send {
    fn stop(&mut self);
}

/// Watches one directory for closed-after-write frame files of one run.
pub struct ScratchWatcher {
    dir: PathBuf,
    watcher: Option<RecommendedWatcher>,
    shutdown: Option<Sender<()>>,
    forwarder: Option<JoinHandle<()>>,
}

impl ScratchWatcher {
    /// Start watching `dir`, forwarding matching paths to `sink`.
    ///
    /// The watch is registered before this returns, so a process started
    /// afterwards cannot write a frame the watcher misses.
    pub fn start(
        dir: &Path,
        pattern: FramePattern,
        sink: Sender<PathBuf>,
    ) -> Result<Self, FramePullError> {
        let (raw_sender, raw_receiver) = crossbeam_channel::unbounded::<notify::Result<Event>>();
        let (shutdown_sender, shutdown_receiver) = crossbeam_channel::bounded::<()>(0);

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let _ = raw_sender.send(result);
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        let forwarder = thread::Builder::new()
            .name(format!("framepull-watch-{}", pattern.run_id()))
            .spawn(move || forward_events(raw_receiver, shutdown_receiver, pattern, sink))
            .map_err(|error| FramePullError::Watcher(error.to_string()))?;

        log::debug!("Watching {} for frame files", dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            watcher: Some(watcher),
            shutdown: Some(shutdown_sender),
            forwarder: Some(forwarder),
        })
    }

    /// Returns `true` until [`stop`](CompletionWatcher::stop) has been called.
    pub fn is_running(&self) -> bool {
        self.forwarder.is_some()
    }
}

impl CompletionWatcher for ScratchWatcher {
    fn stop(&mut self) {
        // Unregister first so no new events are produced.
        drop(self.watcher.take());
        drop(self.shutdown.take());
        if let Some(forwarder) = self.forwarder.take() {
            if forwarder.join().is_err() {
                log::warn!("Watcher thread for {} panicked", self.dir.display());
            }
            log::debug!("Stopped watching {}", self.dir.display());
        }
    }
}

impl Drop for ScratchWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn forward_events(
    events: Receiver<notify::Result<Event>>,
    shutdown: Receiver<()>,
    pattern: FramePattern,
    sink: Sender<PathBuf>,
) {
    loop {
        select! {
            recv(events) -> message => {
                let Ok(result) = message else { return };
                match result {
                    Ok(event) => {
                        if !is_closed_after_write(&event) {
                            continue;
                        }
                        for path in event.paths {
                            if !is_frame_file(&pattern, &path) {
                                continue;
                            }
                            log::trace!("Frame file closed: {}", path.display());
                            if sink.send(path).is_err() {
                                // Sequencer is gone.
                                return;
                            }
                        }
                    }
                    Err(error) => log::warn!("Watcher error: {error}"),
                }
            }
            recv(shutdown) -> _ => return,
        }
    }
}

fn is_closed_after_write(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Access(AccessKind::Close(AccessMode::Write))
    )
}

fn is_frame_file(pattern: &FramePattern, path: &Path) -> bool {
    pattern.belongs_to_run(path)
        && path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension == FRAME_EXTENSION)
}
