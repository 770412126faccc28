//! Async streaming of decoded frames.
//!
//! [`FrameStream`] drives a [`FrameSequencer`] on a blocking thread
//! (`tokio::task::spawn_blocking`) and sends decoded frames back through a
//! bounded channel. Each frame is decoded before the next pull, since that
//! pull deletes the previous file.
//!
//! # Example
//!
//! ```no_run
//! use tokio_stream::StreamExt;
//!
//! use framepull::{ExtractOptions, FramePullError, FrameSequencer};
//!
//! # async fn example() -> Result<(), FramePullError> {
//! let sequencer = FrameSequencer::open("input.mp4", ExtractOptions::new().with_fps(1))?;
//! let mut stream = sequencer.into_stream();
//!
//! while let Some(result) = stream.next().await {
//!     let (index, image) = result?;
//!     image.save(format!("frame_{index}.png"))?;
//! }
//! # Ok(())
//! # }
//! ```

use std::pin::Pin;
use std::task::{Context, Poll};

use image::DynamicImage;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;
use tokio_stream::Stream;

use crate::error::FramePullError;
use crate::sequencer::FrameSequencer;
use crate::utilities::decode_frame;

/// Kept small; decoded frames are large.
const DEFAULT_CHANNEL_CAPACITY: usize = 8;

type FrameItem = Result<(usize, DynamicImage), FramePullError>;

/// A stream of `(index, image)` pairs in strict index order.
///
/// Dropping the stream closes the channel. The background loop stops at
/// the next frame boundary and its sequencer is closed, which drains the
/// remaining frames and reaps the extraction process.
pub struct FrameStream {
    receiver: Receiver<FrameItem>,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

impl Stream for FrameStream {
    type Item = FrameItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl FrameStream {
    /// Spawn the background loop for `sequencer`.
    ///
    /// Must be called from within a Tokio runtime. `channel_capacity`
    /// defaults to 8.
    pub fn spawn(sequencer: FrameSequencer, channel_capacity: Option<usize>) -> Self {
        let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY).max(1);
        let (sender, receiver) = tokio::sync::mpsc::channel(capacity);

        let handle = tokio::task::spawn_blocking(move || {
            let mut sequencer = sequencer;
            if let Err(error) = pump_frames(&mut sequencer, &sender) {
                // The receiver may already be gone.
                let _ = sender.blocking_send(Err(error));
            }
        });

        Self { receiver, handle }
    }
}

impl FrameSequencer {
    /// Turn this sequencer into an async [`FrameStream`].
    pub fn into_stream(self) -> FrameStream {
        FrameStream::spawn(self, None)
    }
}

/// Background loop; runs on a blocking thread.
fn pump_frames(
    sequencer: &mut FrameSequencer,
    sender: &Sender<FrameItem>,
) -> Result<(), FramePullError> {
    while let Some(frame) = sequencer.next_frame()? {
        let image = decode_frame(&frame.path)?;
        if sender.blocking_send(Ok((frame.index, image))).is_err() {
            log::debug!(
                "Frame stream for run {} dropped at frame {}",
                sequencer.run_id(),
                frame.index
            );
            break;
        }
    }
    Ok(())
}
