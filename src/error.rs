//! Error types for the `framepull` crate.
//!
//! This module defines [`FramePullError`], the unified error type returned by
//! all fallible operations in the crate. Errors fall into three groups:
//!
//! - **resource errors**: the source video is missing or is not a regular
//!   file. These are raised before any process or thread is started.
//! - **protocol violations**: the external tooling broke an assumption the
//!   sequencer relies on (a notification for a foreign run, or an exit log
//!   without a `frame=<N>` marker). These are fatal and never retried.
//! - **caller errors**: precondition failures such as a backwards seek.
//!
//! A frame file that has already been deleted when the sequencer tries to
//! reclaim it is *not* an error and never surfaces here.

use std::{io::Error as IoError, path::PathBuf};

use image::ImageError;
use thiserror::Error;

/// The unified error type for all `framepull` operations.
///
/// Every public method that can fail returns `Result<T, FramePullError>`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FramePullError {
    /// The source video does not exist.
    #[error("File not found: {path}")]
    SourceNotFound {
        /// Path that was passed to the sequencer.
        path: PathBuf,
    },

    /// The source path exists but is not a regular file.
    #[error("Not a file: {path}")]
    NotAFile {
        /// Path that was passed to the sequencer.
        path: PathBuf,
    },

    /// A completion notification named a file outside the current run.
    #[error("Unexpected frame path {path} for run {run_id}")]
    UnexpectedFramePath {
        /// The path carried by the notification.
        path: PathBuf,
        /// The run the sequencer was expecting.
        run_id: String,
    },

    /// The extraction process exited without reporting its frame count.
    #[error("Could not extract frame count from ffmpeg output (tail: {tail:?})")]
    MissingFrameCount {
        /// The last lines of the process log.
        tail: String,
    },

    /// The extraction process could not be started.
    #[error("Failed to spawn {program}: {reason}")]
    ProcessSpawn {
        /// Program that was invoked.
        program: String,
        /// Underlying reason the spawn failed.
        reason: String,
    },

    /// The extraction process exited unsuccessfully.
    #[error("Extraction process failed with {status} (tail: {tail:?})")]
    ExtractionFailed {
        /// Exit status as reported by the operating system.
        status: String,
        /// The last lines of the process log.
        tail: String,
    },

    /// The scratch-directory watcher could not be set up.
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// A seek target lies behind the cursor.
    #[error("Cannot seek backwards to frame {target} (next frame is {cursor})")]
    InvalidSeek {
        /// Requested frame index.
        target: usize,
        /// Index of the next frame the sequencer would return.
        cursor: usize,
    },

    /// A seek target lies beyond the last frame of the video.
    #[error("Frame {target} is out of range (video has {frame_count} frames)")]
    SeekPastEnd {
        /// Requested frame index.
        target: usize,
        /// Authoritative frame count.
        frame_count: usize,
    },

    /// The run already failed; no further frames can be reached.
    #[error("Cannot seek to frame {target}: extraction failed before frame {cursor}")]
    RunFailed {
        /// Requested frame index.
        target: usize,
        /// Index of the frame that was never delivered.
        cursor: usize,
    },

    /// An aggregator update arrived with a smaller index than the previous one.
    #[error("Frame index {requested} requested after {last}; updates must not go backwards")]
    UpdateOutOfOrder {
        /// Index passed to `update`.
        requested: usize,
        /// Index passed to the previous `update`.
        last: usize,
    },

    /// `value()` was called before any `update()`.
    #[error("No frame has been requested yet")]
    NoCurrentFrame,

    /// The file backing the current frame is gone.
    #[error("Frame {index} is no longer available at {path}")]
    StaleFrame {
        /// Index of the frame.
        index: usize,
        /// Path that used to hold it.
        path: PathBuf,
    },

    /// Pre-run inspection of the source failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// A frame file could not be decoded.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),
}

impl FramePullError {
    /// Returns `true` for errors that signal broken assumptions about the
    /// external tooling.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            FramePullError::UnexpectedFramePath { .. } | FramePullError::MissingFrameCount { .. }
        )
    }

    /// Returns `true` when the source video could not be found.
    pub fn is_resource_not_found(&self) -> bool {
        matches!(
            self,
            FramePullError::SourceNotFound { .. } | FramePullError::NotAFile { .. }
        )
    }
}

impl From<notify::Error> for FramePullError {
    fn from(error: notify::Error) -> Self {
        FramePullError::Watcher(error.to_string())
    }
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for FramePullError {
    fn from(error: ffmpeg_next::Error) -> Self {
        FramePullError::Probe(error.to_string())
    }
}
