//! FfmpegLauncher integration tests with a shell script standing in for
//! ffmpeg, so the real watcher and process plumbing run without ffmpeg
//! installed.

#![cfg(target_os = "linux")]

mod common;

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::thread;

use framepull::{
    FrameCount, FramePullError, FrameSequencer, SequencerState, count_scratch_frames,
};

use common::{file_name, scratch_dir, source_file, test_options};

/// Frames the stand-in writes per run.
const FAKE_FRAMES: usize = 5;

/// Treats its last argument as the output template, writes five frames out
/// of order and reports the count the way `-progress pipe:2` does.
const FAKE_FFMPEG: &str = r#"#!/bin/sh
for template; do :; done
for number in 3 5 1 4 2; do
    printf 'x' > "$(printf "$template" "$number")"
done
printf 'frame=5\nprogress=end\n' >&2
"#;

/// Written once, before any test spawns it.
fn fake_ffmpeg() -> &'static Path {
    static SCRIPT: OnceLock<(tempfile::TempDir, PathBuf)> = OnceLock::new();
    let (_dir, path) = SCRIPT.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ffmpeg");
        fs::write(&path, FAKE_FFMPEG).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        (dir, path)
    });
    path
}

fn fake_sequencer(dir: &Path) -> FrameSequencer {
    FrameSequencer::open(
        source_file(dir),
        test_options(dir).with_ffmpeg_path(fake_ffmpeg()),
    )
    .expect("Failed to open sequencer")
}

// ── ordering ───────────────────────────────────────────────────────

#[test]
fn out_of_order_writes_are_delivered_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut frames = fake_sequencer(dir.path());
    let run_id = frames.run_id().to_string();

    let mut indices = Vec::new();
    while let Some(frame) = frames.next_frame().expect("Extraction failed") {
        assert_eq!(
            file_name(&frame.path),
            format!("{run_id}_{:07}.jpg", frame.index + 1)
        );
        indices.push(frame.index);
    }

    assert_eq!(indices, (0..FAKE_FRAMES).collect::<Vec<_>>());
    assert_eq!(frames.frame_count(), FrameCount::Exact(FAKE_FRAMES));
    assert_eq!(frames.state(), SequencerState::Exhausted);
    assert_eq!(count_scratch_frames(&scratch_dir(dir.path())).unwrap(), 0);
}

#[test]
fn concurrent_runs_share_a_scratch_dir() {
    let dir = tempfile::tempdir().unwrap();
    let first = fake_sequencer(dir.path());
    let second = fake_sequencer(dir.path());
    assert_ne!(first.run_id(), second.run_id());

    let collect = |frames: FrameSequencer| {
        thread::spawn(move || {
            frames
                .map(|frame| frame.expect("Extraction failed").index)
                .collect::<Vec<_>>()
        })
    };
    let first = collect(first);
    let second = collect(second);

    let expected: Vec<usize> = (0..FAKE_FRAMES).collect();
    assert_eq!(first.join().unwrap(), expected);
    assert_eq!(second.join().unwrap(), expected);
    assert_eq!(count_scratch_frames(&scratch_dir(dir.path())).unwrap(), 0);
}

#[test]
fn close_drains_a_partly_read_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut frames = fake_sequencer(dir.path());

    assert_eq!(frames.next_frame().unwrap().unwrap().index, 0);
    frames.close().unwrap();

    assert_eq!(frames.state(), SequencerState::Exhausted);
    assert_eq!(count_scratch_frames(&scratch_dir(dir.path())).unwrap(), 0);
}

// ── errors ─────────────────────────────────────────────────────────

#[test]
fn missing_program_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut frames = FrameSequencer::open(
        source_file(dir.path()),
        test_options(dir.path()).with_ffmpeg_path("/nonexistent/ffmpeg"),
    )
    .unwrap();

    let error = frames.next_frame().unwrap_err();
    assert!(matches!(error, FramePullError::ProcessSpawn { .. }));
    assert_eq!(frames.state(), SequencerState::Failed);
    assert!(frames.next_frame().unwrap().is_none());

    // The watcher was registered first, so the directory exists, but
    // nothing was written into it.
    assert_eq!(count_scratch_frames(&scratch_dir(dir.path())).unwrap(), 0);
}
