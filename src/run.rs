//! Run identifiers and frame file naming.
//!
//! Every extraction gets a fresh [`RunId`]. The extraction process writes
//! `{run_id}_{index:07}.jpg` into the shared scratch directory, numbering
//! frames from 1. [`FramePattern`] produces those names and maps them back
//! to zero-based frame indices, so that concurrent runs sharing one
//! directory never pick up each other's files.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};

use regex::Regex;
use uuid::Uuid;

/// Number of hex characters kept from the generated UUID.
const RUN_ID_LENGTH: usize = 16;

/// Zero padding of the frame number in output file names.
pub const FRAME_NUMBER_WIDTH: usize = 7;

/// File extension of extracted frames.
pub const FRAME_EXTENSION: &str = "jpg";

/// Opaque token unique to one extraction invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    /// Generate a new random run id.
    pub fn generate() -> Self {
        let mut hex = Uuid::new_v4().simple().to_string();
        hex.truncate(RUN_ID_LENGTH);
        Self(hex)
    }

    /// Wrap an existing token, e.g. to reattach to a known run in tests.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

/// Names and recognises the frame files of one run.
#[derive(Debug, Clone)]
pub struct FramePattern {
    run_id: RunId,
    /// Anchored `^{run}_(\d+)\.jpg$`.
    index_regex: Regex,
    /// `{run}_`, the prefix the watcher filters on.
    prefix: String,
}

impl FramePattern {
    pub fn new(run_id: RunId) -> Self {
        let index_regex = Regex::new(&format!(
            r"^{}_(\d+)\.{}$",
            regex::escape(run_id.as_str()),
            FRAME_EXTENSION
        ))
        .expect("escaped run id forms a valid pattern");
        let prefix = format!("{}_", run_id.as_str());
        Self {
            run_id,
            index_regex,
            prefix,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Output template handed to ffmpeg, e.g. `dir/abc_%07d.jpg`.
    pub fn output_template(&self, dir: &Path) -> PathBuf {
        dir.join(format!(
            "{}_%0{}d.{}",
            self.run_id, FRAME_NUMBER_WIDTH, FRAME_EXTENSION
        ))
    }

    /// File name of the frame with the given one-based number.
    pub fn file_name(&self, frame_number: usize) -> String {
        format!(
            "{}_{:0width$}.{}",
            self.run_id,
            frame_number,
            FRAME_EXTENSION,
            width = FRAME_NUMBER_WIDTH
        )
    }

    /// Path of the frame with the given zero-based index inside `dir`.
    pub fn frame_path(&self, dir: &Path, index: usize) -> PathBuf {
        dir.join(self.file_name(index + 1))
    }

    /// Cheap `{run}_*` filter used by the watcher. Does not validate the
    /// rest of the name.
    pub fn belongs_to_run(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(&self.prefix))
    }

    /// Zero-based frame index encoded in `path`, or `None` if the name does
    /// not follow this run's pattern.
    pub fn frame_index(&self, path: &Path) -> Option<usize> {
        let name = path.file_name()?.to_str()?;
        let captures = self.index_regex.captures(name)?;
        let number: usize = captures[1].parse().ok()?;
        // ffmpeg numbers from 1.
        number.checked_sub(1)
    }
}
