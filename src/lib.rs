//! # framepull
//!
//! Pull video frames in strict index order from an external `ffmpeg`
//! extraction run.
//!
//! `framepull` hands decoding to an `ffmpeg` process that writes one JPEG
//! per frame into a scratch directory, watches that directory for finished
//! files, and reassembles the out-of-order completion events into an
//! ordered, forward-seekable sequence. Each frame file is deleted as soon as
//! the caller moves past it, so disk usage stays at roughly one frame ahead
//! of the consumer.
//!
//! ## Quick Start
//!
//! ### Iterate Over Frames
//!
//! ```no_run
//! use framepull::{ExtractOptions, FrameSequencer};
//!
//! let frames = FrameSequencer::open("input.mp4", ExtractOptions::new()).unwrap();
//! for frame in frames {
//!     let frame = frame.unwrap();
//!     println!("{} -> {}", frame.index, frame.path.display());
//! }
//! ```
//!
//! ### Sample and Filter
//!
//! ```no_run
//! use framepull::{ExtractOptions, FrameSequencer};
//!
//! let options = ExtractOptions::new()
//!     .with_fps(2)
//!     .with_filter("scale", "320:-1");
//! let mut frames = FrameSequencer::open("input.mp4", options).unwrap();
//! frames.seek(20).unwrap();
//! let frame = frames.next_frame().unwrap().unwrap();
//! ```
//!
//! ### Serve an Aggregate
//!
//! ```no_run
//! use framepull::{FrameExtractor, WindowAggregator};
//!
//! let mut extractor =
//!     FrameExtractor::make_aggregator("input.mp4", 0, Vec::<(String, String)>::new()).unwrap();
//! extractor.update(4).unwrap();
//! let image = extractor.value().unwrap();
//! ```
//!
//! ## Features
//!
//! - **Strict ordering** regardless of the order files finish on disk
//! - **Forward seek** by pulling and discarding
//! - **Immediate reclamation** of each delivered frame file on the next pull
//! - **Run isolation**: concurrent runs can share one scratch directory
//! - **Authoritative frame count** parsed from the process log at exit
//! - **Advisory estimate** via `ffprobe` for progress reporting
//! - **Guaranteed cleanup**: dropping a sequencer drains it and reaps the
//!   process
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | `FrameStream` of decoded frames via Tokio |
//! | `ffmpeg` | `LibavEstimator`, an in-process estimate through `ffmpeg-next` |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! `ffmpeg` (and `ffprobe` for estimates) must be on `PATH` or configured
//! through [`ExtractOptions`]. Completion events rely on close-after-write
//! notifications, which `notify` reports on Linux.

pub mod aggregator;
pub mod binding;
pub mod configuration;
pub mod error;
pub mod estimate;
pub mod launch;
pub mod process;
pub mod progress;
pub mod run;
pub mod sequencer;
#[cfg(feature = "async")]
pub mod stream;
pub mod utilities;
pub mod watcher;

pub use aggregator::{FrameExtractor, WindowAggregator};
pub use binding::{ColumnId, FrameColumnBinding};
pub use configuration::{DEFAULT_POLL_INTERVAL, DEFAULT_THREADS, ExtractOptions};
pub use error::FramePullError;
#[cfg(feature = "ffmpeg")]
pub use estimate::LibavEstimator;
pub use estimate::{FfprobeEstimator, FrameCountEstimator, FrameEstimate, parse_ffprobe_report};
pub use launch::{ExtractionPlan, FfmpegLauncher, LaunchedRun, Launcher};
pub use process::{
    ExtractionProcess, FfmpegProcess, ProcessExit, ffmpeg_arguments, parse_frame_count,
};
pub use progress::{ProgressCallback, ProgressInfo};
pub use run::{FramePattern, RunId};
pub use sequencer::{Frame, FrameCount, FrameSequencer, SequencerBuilder, SequencerState};
#[cfg(feature = "async")]
pub use stream::FrameStream;
pub use utilities::{count_scratch_frames, decode_frame, ensure_scratch_dir};
pub use watcher::{CompletionWatcher, ScratchWatcher};
