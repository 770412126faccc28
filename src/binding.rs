//! Column binding supplied by a table metadata layer.
//!
//! A table that materializes frames from a video column records which
//! columns hold the source video, the extracted frame and the frame index,
//! plus the extraction rate. The sequencer only ever consumes those values;
//! it never reads or writes table metadata itself.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;

use crate::aggregator::FrameExtractor;
use crate::configuration::ExtractOptions;
use crate::error::FramePullError;

/// Identifier of a column in the surrounding table schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnId(pub u32);

impl Display for ColumnId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "col#{}", self.0)
    }
}

/// Frame-extraction parameters of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameColumnBinding {
    /// Column holding the source video path.
    pub source_column: ColumnId,
    /// Column receiving the extracted frame image.
    pub frame_column: ColumnId,
    /// Column receiving the zero-based frame index.
    pub index_column: ColumnId,
    /// Sampling rate in frames per second (`0` = native).
    pub extraction_fps: u32,
}

impl FrameColumnBinding {
    pub fn new(
        source_column: ColumnId,
        frame_column: ColumnId,
        index_column: ColumnId,
        extraction_fps: u32,
    ) -> Self {
        Self {
            source_column,
            frame_column,
            index_column,
            extraction_fps,
        }
    }

    /// Options for extracting this table's frames, on top of `base`.
    #[must_use]
    pub fn extract_options(&self, base: ExtractOptions) -> ExtractOptions {
        base.with_fps(self.extraction_fps)
    }

    /// Create the aggregate state that fills [`frame_column`] for the video
    /// found in [`source_column`].
    ///
    /// [`frame_column`]: FrameColumnBinding::frame_column
    /// [`source_column`]: FrameColumnBinding::source_column
    pub fn make_extractor<P: AsRef<Path>>(&self, video: P) -> Result<FrameExtractor, FramePullError> {
        FrameExtractor::with_options(video, self.extract_options(ExtractOptions::new()))
    }
}
