//! Progress reporting and pre-run estimate integration tests.

mod common;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use framepull::{
    FrameCount, FrameCountEstimator, FrameEstimate, FramePullError, FrameSequencer,
    ProgressCallback, ProgressInfo, RunId, parse_ffprobe_report,
};

use common::{FixedEstimator, RunProbe, Script, ScriptedLauncher, source_file, test_options};

#[derive(Default)]
struct RecordingProgress {
    reports: Mutex<Vec<ProgressInfo>>,
}

impl ProgressCallback for RecordingProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.reports.lock().unwrap().push(info.clone());
    }
}

fn estimated_sequencer(
    dir: &std::path::Path,
    script: Script,
    estimate: Option<u64>,
    options: framepull::ExtractOptions,
) -> (FrameSequencer, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let sequencer = FrameSequencer::builder(source_file(dir))
        .options(options.with_estimate(true))
        .launcher(ScriptedLauncher::new(script, Arc::new(RunProbe::default())))
        .estimator(FixedEstimator {
            frames: estimate,
            calls: calls.clone(),
        })
        .run_id(RunId::from_token("run"))
        .build()
        .unwrap();
    (sequencer, calls)
}

// ── estimate ───────────────────────────────────────────────────────

#[test]
fn estimate_is_advisory() {
    let dir = tempfile::tempdir().unwrap();
    let (mut frames, calls) =
        estimated_sequencer(dir.path(), Script::sequential(3), Some(10), test_options(dir.path()));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(frames.frame_count(), FrameCount::Estimated(10));
    assert_eq!(frames.estimate().map(|estimate| estimate.frames), Some(10));

    let delivered = frames.by_ref().count();
    assert_eq!(delivered, 3);
    assert_eq!(frames.frame_count(), FrameCount::Exact(3));
}

#[test]
fn filters_skip_the_estimate() {
    let dir = tempfile::tempdir().unwrap();
    let options = test_options(dir.path()).with_filter("hflip", "");
    let (frames, calls) = estimated_sequencer(dir.path(), Script::sequential(2), Some(10), options);

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(frames.frame_count(), FrameCount::Unknown);
}

#[test]
fn failed_estimate_does_not_block_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let (frames, calls) =
        estimated_sequencer(dir.path(), Script::sequential(2), None, test_options(dir.path()));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(frames.estimate(), None);
    assert_eq!(frames.count(), 2);
}

/// Answers with a fixed ffprobe report.
struct ReportEstimator(&'static [u8]);

impl FrameCountEstimator for ReportEstimator {
    fn estimate(&self, _source: &Path, fps: u32) -> Result<FrameEstimate, FramePullError> {
        parse_ffprobe_report(self.0, fps)
    }
}

#[test]
fn absurd_reported_duration_does_not_block_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let frames = FrameSequencer::builder(source_file(dir.path()))
        .options(test_options(dir.path()).with_estimate(true).with_fps(1))
        .launcher(ScriptedLauncher::new(
            Script::sequential(2),
            Arc::new(RunProbe::default()),
        ))
        .estimator(ReportEstimator(
            br#"{"streams":[{"duration":"1e30","r_frame_rate":"25/1"}]}"#,
        ))
        .build()
        .expect("Failed to build sequencer");

    assert_eq!(frames.estimate(), None);
    assert_eq!(frames.frame_count(), FrameCount::Unknown);
    assert_eq!(frames.count(), 2);
}

// ── progress ───────────────────────────────────────────────────────

#[test]
fn progress_switches_to_the_exact_total() {
    let dir = tempfile::tempdir().unwrap();
    let progress = Arc::new(RecordingProgress::default());
    let mut script = Script::sequential(3);
    script.exit_after_polls = 2;
    let options = test_options(dir.path()).with_progress(progress.clone());
    let (frames, _calls) = estimated_sequencer(dir.path(), script, Some(10), options);

    assert_eq!(frames.count(), 3);

    let reports = progress.reports.lock().unwrap();
    assert_eq!(reports.len(), 3);

    let first = &reports[0];
    assert_eq!(first.current, 1);
    assert_eq!(first.total, Some(10));
    assert!(!first.total_is_exact);
    assert_eq!(first.frame_index, Some(0));

    let last = &reports[2];
    assert_eq!(last.current, 3);
    assert_eq!(last.total, Some(3));
    assert!(last.total_is_exact);
    assert_eq!(last.percentage, Some(100.0));
}

#[test]
fn progress_batches_reports() {
    let dir = tempfile::tempdir().unwrap();
    let progress = Arc::new(RecordingProgress::default());
    let options = test_options(dir.path())
        .with_progress(progress.clone())
        .with_batch_size(2);
    let (frames, _calls) = estimated_sequencer(dir.path(), Script::sequential(5), None, options);

    assert_eq!(frames.count(), 5);

    // Two full batches, then the remainder when the run ends.
    let reports = progress.reports.lock().unwrap();
    let counts: Vec<u64> = reports.iter().map(|info| info.current).collect();
    assert_eq!(counts, vec![2, 4, 5]);
    assert_eq!(reports[2].frame_index, None);
}
