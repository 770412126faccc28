//! The external extraction process.
//!
//! Decoding is delegated to an `ffmpeg` child process that writes one JPEG
//! per frame into the scratch directory. The process is started detached
//! and only ever observed through non-blocking status polls
//! ([`ExtractionProcess::try_exit`]).
//!
//! ffmpeg is run with `-progress pipe:2`, which makes it emit `key=value`
//! progress blocks on stderr. The final `frame=<N>` line is the
//! authoritative number of frames written; [`parse_frame_count`] extracts it
//! from the captured log once the process has exited.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::LazyLock;
use std::thread::{self, JoinHandle};

use regex::Regex;

use crate::configuration::ExtractOptions;
use crate::error::FramePullError;
use crate::run::FramePattern;

/// Lines of process output retained for frame-count parsing and error
/// messages.
const LOG_TAIL_LINES: usize = 64;

/// Lines quoted in error messages.
const ERROR_TAIL_LINES: usize = 5;

static REGEX_FRAME_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)frame=\s*(\d+)").unwrap());

/// What the sequencer learns when the process has exited.
#[derive(Debug, Clone)]
pub struct ProcessExit {
    /// Whether the process reported success.
    pub success: bool,
    /// Human-readable exit status.
    pub status: String,
    /// Trailing lines of the process log, oldest first.
    pub log: String,
}

impl ProcessExit {
    pub fn from_status(status: ExitStatus, log: String) -> Self {
        Self {
            success: status.success(),
            status: status.to_string(),
            log,
        }
    }
}

/// A running extraction process, owned by one sequencer.
pub trait ExtractionProcess: Send {
    /// Poll the process without blocking. Returns `Some` once it has exited.
    ///
    /// The sequencer stops polling after the first `Some`.
    fn try_exit(&mut self) -> Result<Option<ProcessExit>, FramePullError>;

    /// Make sure the process is gone: kill it if it is still running, then
    /// wait for it. Must be idempotent.
    fn reap(&mut self);
}

/// An `ffmpeg` child process whose stderr is drained on a helper thread.
pub struct FfmpegProcess {
    child: Child,
    log_reader: Option<JoinHandle<VecDeque<String>>>,
    exited: bool,
}

impl FfmpegProcess {
    /// Spawn `program` with `args`.
    ///
    /// stdin and stdout are detached; stderr is captured so the final
    /// frame count can be read after exit.
    pub fn spawn(program: &Path, args: &[OsString]) -> Result<Self, FramePullError> {
        log::debug!("Spawning {} {:?}", program.display(), args);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| FramePullError::ProcessSpawn {
                program: program.display().to_string(),
                reason: error.to_string(),
            })?;

        let Some(stderr) = child.stderr.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(FramePullError::ProcessSpawn {
                program: program.display().to_string(),
                reason: "stderr was not captured".to_string(),
            });
        };

        let spawned = thread::Builder::new()
            .name("framepull-ffmpeg-log".to_string())
            .spawn(move || {
                // The pipe must be drained continuously or ffmpeg blocks on
                // a full buffer.
                let mut tail = VecDeque::with_capacity(LOG_TAIL_LINES);
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    if tail.len() == LOG_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                tail
            });

        let log_reader = match spawned {
            Ok(handle) => handle,
            Err(error) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(FramePullError::ProcessSpawn {
                    program: program.display().to_string(),
                    reason: error.to_string(),
                });
            }
        };

        Ok(Self {
            child,
            log_reader: Some(log_reader),
            exited: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    fn collect_log(&mut self) -> String {
        match self.log_reader.take().map(JoinHandle::join) {
            Some(Ok(lines)) => lines.into_iter().collect::<Vec<_>>().join("\n"),
            Some(Err(_)) => {
                log::warn!("ffmpeg log reader panicked");
                String::new()
            }
            None => String::new(),
        }
    }
}

impl ExtractionProcess for FfmpegProcess {
    fn try_exit(&mut self) -> Result<Option<ProcessExit>, FramePullError> {
        if self.exited {
            return Ok(None);
        }
        match self.child.try_wait()? {
            Some(status) => {
                self.exited = true;
                let log = self.collect_log();
                log::debug!("ffmpeg (pid {}) exited with {status}", self.child.id());
                Ok(Some(ProcessExit::from_status(status, log)))
            }
            None => Ok(None),
        }
    }

    fn reap(&mut self) {
        if !self.exited {
            if let Ok(None) = self.child.try_wait() {
                log::debug!("Killing ffmpeg (pid {})", self.child.id());
                let _ = self.child.kill();
            }
            let _ = self.child.wait();
            self.exited = true;
        }
        // The reader ends once the pipe closes.
        let _ = self.collect_log();
    }
}

impl Drop for FfmpegProcess {
    fn drop(&mut self) {
        self.reap();
    }
}

/// Build the ffmpeg argument list for one run.
pub fn ffmpeg_arguments(
    source: &Path,
    options: &ExtractOptions,
    pattern: &FramePattern,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-nostdin", "-hide_banner", "-v", "error", "-nostats", "-progress", "pipe:2", "-i",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(source.as_os_str().to_os_string());

    if let Some(graph) = options.filter_graph() {
        args.push("-vf".into());
        args.push(graph.into());
    }

    // Without passthrough sync ffmpeg pads filtered output with duplicates.
    args.push("-vsync".into());
    args.push("0".into());
    args.push("-threads".into());
    args.push(options.threads.to_string().into());
    args.push(
        pattern
            .output_template(&options.scratch_dir)
            .into_os_string(),
    );
    args
}

/// Extract the authoritative frame count from the tail of the process log.
///
/// The last `frame=<N>` marker wins.
pub fn parse_frame_count(log: &str) -> Option<usize> {
    log.split(['\n', '\r'])
        .rev()
        .find_map(|line| REGEX_FRAME_COUNT.captures(line))
        .and_then(|captures| captures[1].parse().ok())
}

/// The last few lines of `log`, for error messages.
pub(crate) fn log_tail(log: &str) -> String {
    let lines: Vec<&str> = log.lines().filter(|line| !line.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::run::RunId;

    #[test]
    fn parse_progress_output() {
        let log = "frame=12\nfps=0.0\nprogress=continue\nframe=250\nfps=61.2\nprogress=end";
        assert_eq!(parse_frame_count(log), Some(250));
    }

    #[test]
    fn parse_classic_stats_line() {
        let log = "frame=  117 fps=0.0 q=2.0 Lsize=N/A time=00:00:04.68 bitrate=N/A speed=9.8x\r\n\
                   video:4520kB audio:0kB subtitle:0kB";
        assert_eq!(parse_frame_count(log), Some(117));
    }

    #[test]
    fn dup_and_drop_counters_are_not_markers() {
        assert_eq!(parse_frame_count("dup_frames=3\ndrop_frames=1"), None);
        assert_eq!(parse_frame_count(""), None);
        assert_eq!(parse_frame_count("Conversion failed!"), None);
    }

    #[test]
    fn arguments_include_filters_and_template() {
        let pattern = FramePattern::new(RunId::from_token("run"));
        let options = ExtractOptions::new()
            .with_fps(2)
            .with_filter("scale", "64:-1")
            .with_scratch_dir("/scratch");
        let args = ffmpeg_arguments(Path::new("/videos/clip.mp4"), &options, &pattern);
        let args: Vec<String> = args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();

        let vf = args.iter().position(|arg| arg == "-vf").unwrap();
        assert_eq!(args[vf + 1], "fps=2,scale=64:-1");
        assert!(args.contains(&"/videos/clip.mp4".to_string()));
        assert_eq!(
            PathBuf::from(args.last().unwrap()),
            PathBuf::from("/scratch/run_%07d.jpg")
        );
    }

    #[test]
    fn arguments_without_filters_skip_vf() {
        let pattern = FramePattern::new(RunId::from_token("run"));
        let args = ffmpeg_arguments(Path::new("in.mp4"), &ExtractOptions::new(), &pattern);
        assert!(!args.iter().any(|arg| arg == "-vf"));
    }

    #[test]
    fn log_tail_keeps_last_lines() {
        let log = (1..=10).map(|n| n.to_string()).collect::<Vec<_>>().join("\n");
        assert_eq!(log_tail(&log), "6\n7\n8\n9\n10");
    }
}
