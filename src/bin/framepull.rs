use std::{fs, path::PathBuf, time::Duration};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use framepull::{
    ExtractOptions, FfprobeEstimator, FrameCount, FrameCountEstimator, FrameSequencer,
    count_scratch_frames,
};

const CLI_AFTER_HELP: &str = "Examples:\n  framepull extract input.mp4 --out frames --fps 1 --progress\n  framepull extract input.mp4 --out frames --filter scale=320:-1 --filter hflip\n  framepull estimate input.mp4 --fps 2 --json\n  framepull scratch\n  framepull completions zsh > _framepull";

#[derive(Debug, Parser)]
#[command(
    name = "framepull",
    version,
    about = "Extract video frames in order through ffmpeg",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar where supported.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow writing into an existing output directory.
    #[arg(long, global = true)]
    overwrite: bool,

    /// Path of the ffmpeg binary.
    #[arg(long, global = true)]
    ffmpeg: Option<PathBuf>,

    /// Path of the ffprobe binary.
    #[arg(long, global = true)]
    ffprobe: Option<PathBuf>,

    /// Scratch directory for in-flight frame files.
    #[arg(long, global = true)]
    scratch_dir: Option<PathBuf>,

    /// Bounded wait between process status polls, in milliseconds.
    #[arg(long, global = true)]
    poll_ms: Option<u64>,

    /// ffmpeg worker thread count.
    #[arg(long, global = true)]
    threads: Option<u32>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract frames, in order, to an output directory.
    #[command(
        about = "Extract video frames",
        after_help = "Examples:\n  framepull extract input.mp4 --out frames\n  framepull extract input.mp4 --out frames --fps 2 --start 10 --limit 5"
    )]
    Extract {
        /// Input video path.
        input: PathBuf,
        /// Output directory for the frames.
        #[arg(long)]
        out: PathBuf,
        /// Sampling rate in frames per second (0 = native).
        #[arg(long, default_value_t = 0)]
        fps: u32,
        /// Post-processing filter as name=value (repeatable, applied in order).
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// First frame index to keep.
        #[arg(long, default_value_t = 0)]
        start: usize,
        /// Keep at most this many frames.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Estimate the number of frames an extraction would produce.
    #[command(
        about = "Estimate frame count",
        after_help = "Examples:\n  framepull estimate input.mp4\n  framepull estimate input.mp4 --fps 1 --json"
    )]
    Estimate {
        /// Input video path.
        input: PathBuf,
        /// Sampling rate in frames per second (0 = native).
        #[arg(long, default_value_t = 0)]
        fps: u32,
        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Count frame files left in the scratch directory.
    #[command(about = "Inspect the scratch directory")]
    Scratch {
        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// Frames the extract loop will copy out of `total`.
fn bar_length(total: u64, start: usize, limit: Option<usize>) -> u64 {
    let remaining = total.saturating_sub(start as u64);
    limit.map_or(remaining, |limit| remaining.min(limit as u64))
}

fn parse_filter(value: &str) -> Result<(String, String), Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    let (name, parameter) = trimmed.split_once('=').unwrap_or((trimmed, ""));
    if name.is_empty() {
        return Err(format!("invalid --filter: {value:?} (expected name=value)").into());
    }
    Ok((name.to_string(), parameter.to_string()))
}

fn base_extract_options(global: &GlobalOptions) -> ExtractOptions {
    let mut options = ExtractOptions::new();
    if let Some(path) = &global.ffmpeg {
        options = options.with_ffmpeg_path(path);
    }
    if let Some(path) = &global.ffprobe {
        options = options.with_ffprobe_path(path);
    }
    if let Some(dir) = &global.scratch_dir {
        options = options.with_scratch_dir(dir);
    }
    if let Some(millis) = global.poll_ms {
        options = options.with_poll_interval(Duration::from_millis(millis));
    }
    if let Some(threads) = global.threads {
        options = options.with_threads(threads);
    }
    options
}

fn init_logging(global: &GlobalOptions) {
    let default_filter = if global.verbose { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .try_init();
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.global);

    match cli.command {
        Commands::Extract {
            input,
            out,
            fps,
            filters,
            start,
            limit,
        } => {
            if out.exists() {
                if !cli.global.overwrite {
                    return Err(format!(
                        "output directory already exists: {} (use --overwrite)",
                        out.display()
                    )
                    .into());
                }
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("writing into existing directory {}", out.display()).yellow()
                );
            }
            fs::create_dir_all(&out)?;

            let filters = filters
                .iter()
                .map(|filter| parse_filter(filter))
                .collect::<Result<Vec<_>, _>>()?;
            let options = base_extract_options(&cli.global)
                .with_fps(fps)
                .with_filters(filters);

            let mut frames = FrameSequencer::open(&input, options)?;
            if cli.global.verbose {
                eprintln!("run {} for {}", frames.run_id(), input.display());
            }

            let progress_bar = if cli.global.progress {
                let pb = match frames.estimate() {
                    Some(estimate) => ProgressBar::new(bar_length(estimate.frames, start, limit)),
                    None => ProgressBar::new_spinner(),
                };
                let style = ProgressStyle::with_template(
                    "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}",
                )?;
                pb.set_style(style.progress_chars("##-"));
                Some(pb)
            } else {
                None
            };

            if start > 0 {
                frames.seek(start)?;
            }

            let mut extracted = 0_usize;
            while limit.is_none_or(|limit| extracted < limit) {
                let Some(frame) = frames.next_frame()? else {
                    break;
                };
                let output_path = out.join(format!("frame_{:06}.jpg", frame.index));
                // The scratch file is reclaimed on the next pull.
                fs::copy(&frame.path, &output_path)?;
                extracted += 1;

                if let Some(pb) = &progress_bar {
                    if let FrameCount::Exact(total) = frames.frame_count() {
                        pb.set_length(bar_length(total as u64, start, limit));
                    }
                    pb.inc(1);
                }

                if cli.global.verbose {
                    eprintln!("saved frame {} -> {}", frame.index, output_path.display());
                }
            }
            frames.close()?;

            if let Some(pb) = progress_bar {
                pb.finish_with_message("done");
            }

            println!(
                "{} {}",
                "success:".green().bold(),
                format!("Extracted {extracted} frame(s) to {}", out.display()).green()
            );
        }
        Commands::Estimate { input, fps, json } => {
            let options = base_extract_options(&cli.global);
            let estimator = FfprobeEstimator::new(options.ffprobe_path());
            let estimate = estimator.estimate(&input, fps)?;
            if json {
                let payload = json!({
                    "input": input.display().to_string(),
                    "fps": fps,
                    "frames": estimate.frames,
                    "duration_seconds": estimate.duration.map(|duration| duration.as_secs_f64()),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Frames: ~{}", estimate.frames);
                if let Some(duration) = estimate.duration {
                    println!("Duration: {:.3}s", duration.as_secs_f64());
                }
            }
        }
        Commands::Scratch { json } => {
            let options = base_extract_options(&cli.global);
            let dir = options.scratch_dir();
            let count = count_scratch_frames(dir)?;
            if json {
                let payload = json!({
                    "scratch_dir": dir.display().to_string(),
                    "frames": count,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Scratch: {}", dir.display());
                println!("Frames: {count}");
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framepull", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
