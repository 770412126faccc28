//! Pre-run frame-count estimation.
//!
//! Before extraction starts the sequencer may ask a [`FrameCountEstimator`]
//! how many frames to expect. The answer is advisory only: it sizes the
//! frame path table and feeds progress reporting, but the iteration bound is
//! always the count reported by the extraction process when it exits.
//!
//! Estimation never blocks extraction. A failing probe is logged and the run
//! proceeds without an estimate, and no probe is attempted at all when a
//! post-processing filter is configured, since filtered output timing is not
//! a simple function of the input duration.
//!
//! # Example
//!
//! ```no_run
//! use framepull::{FfprobeEstimator, FrameCountEstimator};
//!
//! let estimate = FfprobeEstimator::default().estimate("input.mp4".as_ref(), 0)?;
//! println!("about {} frames", estimate.frames);
//! # Ok::<(), framepull::FramePullError>(())
//! ```

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use serde_json::Value;

use crate::configuration::ExtractOptions;
use crate::error::FramePullError;

/// An advisory frame count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameEstimate {
    /// Expected number of output frames.
    pub frames: u64,
    /// Source duration, when the probe reported one.
    pub duration: Option<Duration>,
}

/// Inspects a source without decoding it.
pub trait FrameCountEstimator: Send {
    /// Estimate the number of frames an extraction at `fps` (0 = native)
    /// would produce.
    fn estimate(&self, source: &Path, fps: u32) -> Result<FrameEstimate, FramePullError>;
}

/// Estimates by running `ffprobe` on the source.
#[derive(Debug, Clone)]
pub struct FfprobeEstimator {
    ffprobe_path: PathBuf,
}

impl Default for FfprobeEstimator {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl FfprobeEstimator {
    pub fn new(ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }
}

impl FrameCountEstimator for FfprobeEstimator {
    fn estimate(&self, source: &Path, fps: u32) -> Result<FrameEstimate, FramePullError> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=nb_frames,duration,r_frame_rate:format=duration",
                "-print_format",
                "json",
            ])
            .arg(source)
            .stdin(Stdio::null())
            .output()
            .map_err(|error| {
                FramePullError::Probe(format!(
                    "failed to run {}: {error}",
                    self.ffprobe_path.display()
                ))
            })?;

        if !output.status.success() {
            return Err(FramePullError::Probe(format!(
                "ffprobe failed for {} with {}: {}",
                source.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_ffprobe_report(&output.stdout, fps)
    }
}

/// Compute an estimate from ffprobe's JSON output.
///
/// At the native rate the stream's `nb_frames` is used; when it is missing
/// (common for Matroska) the duration times the stream's frame rate stands
/// in. With a target rate the estimate is `floor(fps × duration)`.
pub fn parse_ffprobe_report(json: &[u8], fps: u32) -> Result<FrameEstimate, FramePullError> {
    let report: Value = serde_json::from_slice(json)
        .map_err(|error| FramePullError::Probe(format!("invalid ffprobe output: {error}")))?;

    let stream = report
        .get("streams")
        .and_then(Value::as_array)
        .and_then(|streams| streams.first())
        .ok_or_else(|| FramePullError::Probe("no video stream reported".to_string()))?;

    let nb_frames = stream.get("nb_frames").and_then(number_field);
    let duration = stream
        .get("duration")
        .and_then(number_field)
        .or_else(|| {
            report
                .get("format")
                .and_then(|format| format.get("duration"))
                .and_then(number_field)
        });
    let native_rate = stream
        .get("r_frame_rate")
        .and_then(Value::as_str)
        .and_then(parse_rate);

    estimate_from(nb_frames.map(|n| n as u64), duration, native_rate, fps).ok_or_else(|| {
        FramePullError::Probe("ffprobe reported neither a frame count nor a duration".to_string())
    })
}

/// Combine whatever a probe found into an estimate.
pub(crate) fn estimate_from(
    nb_frames: Option<u64>,
    duration_seconds: Option<f64>,
    native_rate: Option<f64>,
    fps: u32,
) -> Option<FrameEstimate> {
    let (duration_seconds, duration) = duration_seconds
        .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
        .and_then(|seconds| Some((seconds, Duration::try_from_secs_f64(seconds).ok()?)))
        .unzip();
    let frames = if fps == 0 {
        nb_frames.filter(|&n| n > 0).or_else(|| {
            let seconds = duration_seconds?;
            let rate = native_rate.filter(|rate| *rate > 0.0)?;
            Some((seconds * rate) as u64)
        })?
    } else {
        (f64::from(fps) * duration_seconds?) as u64
    };
    Some(FrameEstimate { frames, duration })
}

/// Probe the source for `options`, swallowing failures.
///
/// Returns `None` when estimation is disabled, when a filter is configured,
/// or when the probe fails.
pub(crate) fn advisory_estimate(
    estimator: &dyn FrameCountEstimator,
    source: &Path,
    options: &ExtractOptions,
) -> Option<FrameEstimate> {
    if !options.estimate || !options.filters.is_empty() {
        return None;
    }
    match estimator.estimate(source, options.fps) {
        Ok(estimate) => {
            log::debug!(
                "Estimated {} frames for {}",
                estimate.frames,
                source.display()
            );
            Some(estimate)
        }
        Err(error) => {
            log::warn!(
                "Frame count estimate for {} failed, continuing without: {error}",
                source.display()
            );
            None
        }
    }
}

/// ffprobe prints numbers as strings; accept both.
fn number_field(value: &Value) -> Option<f64> {
    match value {
        Value::String(text) => text.trim().parse().ok(),
        Value::Number(number) => number.as_f64(),
        _ => None,
    }
}

/// Parse `"30000/1001"` or `"25"`.
fn parse_rate(text: &str) -> Option<f64> {
    match text.split_once('/') {
        Some((numerator, denominator)) => {
            let numerator: f64 = numerator.trim().parse().ok()?;
            let denominator: f64 = denominator.trim().parse().ok()?;
            (denominator != 0.0).then(|| numerator / denominator)
        }
        None => text.trim().parse().ok(),
    }
}

/// Estimates through libavformat, without spawning `ffprobe`.
#[cfg(feature = "ffmpeg")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LibavEstimator;

#[cfg(feature = "ffmpeg")]
impl FrameCountEstimator for LibavEstimator {
    fn estimate(&self, source: &Path, fps: u32) -> Result<FrameEstimate, FramePullError> {
        use ffmpeg_next::media::Type;

        ffmpeg_next::init()?;
        let input = ffmpeg_next::format::input(&source)?;
        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| FramePullError::Probe("no video stream found".to_string()))?;

        let nb_frames = u64::try_from(stream.frames()).ok();
        let stream_seconds = (stream.duration() > 0)
            .then(|| stream.duration() as f64 * f64::from(stream.time_base()));
        let container_seconds = (input.duration() > 0)
            .then(|| Duration::from_micros(input.duration() as u64).as_secs_f64());
        let rate = stream.avg_frame_rate();
        let native_rate = (rate.denominator() != 0)
            .then(|| f64::from(rate.numerator()) / f64::from(rate.denominator()));

        estimate_from(
            nb_frames,
            stream_seconds.or(container_seconds),
            native_rate,
            fps,
        )
        .ok_or_else(|| {
            FramePullError::Probe("stream reports neither a frame count nor a duration".to_string())
        })
    }
}
