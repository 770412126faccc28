//! Windowed-aggregator adapter.
//!
//! Row evaluation engines drive per-partition aggregates through an
//! `update` / `value` protocol: one `update` per row with a non-decreasing
//! frame index, then `value` for the row's output. [`FrameExtractor`] maps
//! that protocol onto a [`FrameSequencer`]: `update` seeks forward and pulls
//! one frame, `value` decodes it.
//!
//! `value` must run before the next `update`. The next pull deletes the
//! previous frame file, so a late `value` fails with
//! [`FramePullError::StaleFrame`].
//!
//! # Example
//!
//! ```no_run
//! use framepull::{FrameExtractor, WindowAggregator};
//!
//! let mut extractor = FrameExtractor::make_aggregator("input.mp4", 1, [("scale", "320:-1")])?;
//! for index in [0, 3, 7] {
//!     extractor.update(index)?;
//!     let image = extractor.value()?;
//!     println!("frame {index}: {}x{}", image.width(), image.height());
//! }
//! # Ok::<(), framepull::FramePullError>(())
//! ```

use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::configuration::ExtractOptions;
use crate::error::FramePullError;
use crate::sequencer::FrameSequencer;
use crate::utilities::decode_frame;

/// The calling convention of a per-row aggregate.
pub trait WindowAggregator {
    type Input;
    type Output;

    /// Feed one row.
    fn update(&mut self, input: Self::Input) -> Result<(), FramePullError>;

    /// Produce the value for the most recent row.
    fn value(&mut self) -> Result<Self::Output, FramePullError>;
}

/// Serves frames of one video to a windowed aggregate, by index.
pub struct FrameExtractor {
    sequencer: FrameSequencer,
    /// Index and file of the frame selected by the last `update`.
    current: Option<(usize, PathBuf)>,
}

impl FrameExtractor {
    /// Create the aggregate state for one partition.
    ///
    /// `fps` is the sampling rate (`0` = native) and `filters` an ordered
    /// chain of `(name, parameter)` post-processing filters.
    pub fn make_aggregator<P, I, K, V>(
        source: P,
        fps: u32,
        filters: I,
    ) -> Result<Self, FramePullError>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let options = ExtractOptions::new().with_fps(fps).with_filters(filters);
        Self::with_options(source, options)
    }

    /// Like [`make_aggregator`](FrameExtractor::make_aggregator) with full
    /// control over the options.
    pub fn with_options<P: AsRef<Path>>(
        source: P,
        options: ExtractOptions,
    ) -> Result<Self, FramePullError> {
        Ok(Self::from_sequencer(FrameSequencer::open(source, options)?))
    }

    /// Wrap an already configured sequencer. It must not have been pulled
    /// from yet.
    pub fn from_sequencer(sequencer: FrameSequencer) -> Self {
        Self {
            sequencer,
            current: None,
        }
    }

    /// Index of the frame selected by the last `update`.
    pub fn current_index(&self) -> Option<usize> {
        self.current.as_ref().map(|(index, _)| *index)
    }

    pub fn sequencer(&self) -> &FrameSequencer {
        &self.sequencer
    }

    /// Drain the underlying sequencer and release its resources.
    pub fn close(&mut self) -> Result<(), FramePullError> {
        self.current = None;
        self.sequencer.close()
    }
}

impl WindowAggregator for FrameExtractor {
    type Input = usize;
    type Output = DynamicImage;

    /// Select frame `index`.
    ///
    /// Repeating the previous index keeps the current frame.
    ///
    /// # Errors
    ///
    /// [`FramePullError::UpdateOutOfOrder`] when `index` is smaller than the
    /// previous one, [`FramePullError::SeekPastEnd`] when the video is
    /// shorter, or any sequencer error.
    fn update(&mut self, index: usize) -> Result<(), FramePullError> {
        if let Some((last, _)) = &self.current {
            if index < *last {
                return Err(FramePullError::UpdateOutOfOrder {
                    requested: index,
                    last: *last,
                });
            }
            if index == *last {
                return Ok(());
            }
        }

        self.sequencer.seek(index)?;
        let frame = self
            .sequencer
            .next_frame()?
            .ok_or(FramePullError::SeekPastEnd {
                target: index,
                frame_count: index,
            })?;
        self.current = Some((frame.index, frame.path));
        Ok(())
    }

    /// Decode the frame selected by the last `update`.
    ///
    /// # Errors
    ///
    /// [`FramePullError::NoCurrentFrame`] before the first `update`,
    /// [`FramePullError::StaleFrame`] when its file is already gone.
    fn value(&mut self) -> Result<DynamicImage, FramePullError> {
        let (index, path) = self.current.as_ref().ok_or(FramePullError::NoCurrentFrame)?;
        if !path.is_file() {
            return Err(FramePullError::StaleFrame {
                index: *index,
                path: path.clone(),
            });
        }
        decode_frame(path)
    }
}
