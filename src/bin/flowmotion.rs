use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use flowmotion::{
    BlockMatching, ErrorPolicy, FfmpegLogLevel, FramePixelFormat,
    MotionEstimator, Orientation, OrientationProvider, OrientationTrack, Pipeline,
    PipelineOptions, PipelineStage, ProgressCallback, ProgressInfo, SinkContent, SinkOptions,
    VideoCodec, VideoHandle, validate_run,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing_subscriber::EnvFilter;

const CLI_AFTER_HELP: &str = "Examples:\n  flowmotion process input.mp4 --orientation up --demo\n  flowmotion process input.mov --orientation right --fps 24 --hold 0.5 --progress\n  flowmotion process input.mov --orientation-csv orientation.csv --on-error skip\n  flowmotion probe input.mp4 --json\n  flowmotion completions zsh > _flowmotion";

#[derive(Debug, Parser)]
#[command(
    name = "flowmotion",
    version,
    about = "Estimate dense motion between video frames and re-encode it as paced video",
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
    /// Show debug logging (overridden by RUST_LOG).
    #[arg(long, global = true)]
    verbose: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the motion pipeline over a video.
    #[command(
        about = "Process a video",
        after_help = "Examples:\n  flowmotion process input.mp4 --orientation up --demo\n  flowmotion process input.mp4 --orientation 6 --no-video --max-frames 100"
    )]
    Process {
        /// Input video path.
        input: PathBuf,

        /// Directory that receives out/output.mov and flow_debug.jpg.
        #[arg(long, default_value = "flowmotion-output")]
        output_root: PathBuf,

        /// Fixed orientation (up, right, down, left, *-mirrored, or EXIF 1-8).
        /// Required unless --orientation-csv is given.
        #[arg(long, required_unless_present = "orientation_csv", conflicts_with = "orientation_csv")]
        orientation: Option<String>,

        /// Per-frame orientation CSV with `frame_index,orientation` rows.
        #[arg(long)]
        orientation_csv: Option<PathBuf>,

        /// Stop after the first two frames (one flow field).
        #[arg(long, conflicts_with = "max_frames")]
        demo: bool,

        /// Read at most this many frames.
        #[arg(long)]
        max_frames: Option<u64>,

        /// Output frame rate.
        #[arg(long, default_value_t = 30)]
        fps: u32,

        /// Seconds each processed frame is held in the output.
        #[arg(long, default_value_t = 1.0)]
        hold: f64,

        /// Output resolution as WIDTHxHEIGHT.
        #[arg(long, default_value = "1920x1080")]
        resolution: String,

        /// Output codec (h264, h265, mpeg4).
        #[arg(long, default_value = "h264")]
        codec: String,

        /// Constant Rate Factor (0-51).
        #[arg(long)]
        crf: Option<u32>,

        /// Target bitrate in bits per second (overrides CRF).
        #[arg(long)]
        bitrate: Option<usize>,

        /// Failure policy for flow and append errors (abort, skip).
        #[arg(long, default_value = "abort")]
        on_error: String,

        /// Consecutive append failures tolerated with --on-error skip.
        #[arg(long, default_value_t = 3)]
        max_append_failures: u32,

        /// Decode pixel format (yuva444p16, yuv420p, rgb24, rgba, gray8).
        #[arg(long, default_value = "yuva444p16")]
        decode_format: String,

        /// Retries for empty decoded frames.
        #[arg(long, default_value_t = 3)]
        retries: u32,

        /// Encode the source frames instead of the flow visualisation.
        #[arg(long)]
        source_frames: bool,

        /// Do not write a video.
        #[arg(long)]
        no_video: bool,

        /// Do not write the debug image.
        #[arg(long)]
        no_debug_image: bool,

        /// Block size for block matching.
        #[arg(long, default_value_t = 8)]
        block_size: u32,

        /// Search range for block matching, in pixels.
        #[arg(long, default_value_t = 4)]
        search_range: u32,

        /// Show a progress bar.
        #[arg(long)]
        progress: bool,
    },

    /// Print the video track of a file.
    #[command(
        about = "Print video track metadata",
        visible_alias = "info",
        after_help = "Examples:\n  flowmotion probe input.mp4\n  flowmotion probe input.mp4 --json"
    )]
    Probe {
        /// Input video path.
        input: PathBuf,

        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_resolution(value: &str) -> Result<(u32, u32), Box<dyn std::error::Error>> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid resolution: {value} (expected WIDTHxHEIGHT)"))?;
    Ok((width.trim().parse()?, height.trim().parse()?))
}

fn parse_decode_format(value: &str) -> Option<FramePixelFormat> {
    match value.to_ascii_lowercase().as_str() {
        "yuva444p16" | "yuva444p16le" => Some(FramePixelFormat::Yuva444p16),
        "yuv420p" => Some(FramePixelFormat::Yuv420p),
        "rgb24" | "rgb" => Some(FramePixelFormat::Rgb24),
        "rgba" => Some(FramePixelFormat::Rgba),
        "gray8" | "gray" | "grayscale" => Some(FramePixelFormat::Gray8),
        _ => None,
    }
}

fn parse_hold(seconds: f64) -> Result<Duration, Box<dyn std::error::Error>> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("--hold must be a non-negative number of seconds, got {seconds}").into());
    }
    Ok(Duration::from_secs_f64(seconds))
}

fn init_logging(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let default_directive = if global.verbose { "flowmotion=debug" } else { "flowmotion=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();

    if let Some(level) = &global.log_level {
        let parsed: FfmpegLogLevel = level
            .parse()
            .map_err(|error: String| format!("unsupported --log-level: {error}"))?;
        flowmotion::set_ffmpeg_log_level(parsed);
    }
    Ok(())
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} frames {msg}",
        )?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        if let Some(remaining) = info.estimated_remaining {
            self.bar.set_message(format!("~{}s left", remaining.as_secs()));
        }
        if info.stage == PipelineStage::Finalizing {
            self.bar.finish_with_message("finalizing");
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.global)?;

    match cli.command {
        Commands::Process {
            input,
            output_root,
            orientation,
            orientation_csv,
            demo,
            max_frames,
            fps,
            hold,
            resolution,
            codec,
            crf,
            bitrate,
            on_error,
            max_append_failures,
            decode_format,
            retries,
            source_frames,
            no_video,
            no_debug_image,
            block_size,
            search_range,
            progress,
        } => {
            let (width, height) = parse_resolution(&resolution)?;
            let codec: VideoCodec = codec.parse()?;
            let error_policy: ErrorPolicy = on_error.parse()?;
            let decode_format = parse_decode_format(&decode_format)
                .ok_or(format!("unsupported --decode-format: {decode_format}"))?;

            let mut sink = SinkOptions::new()
                .with_frame_rate(fps)
                .with_hold_duration(parse_hold(hold)?)
                .with_resolution(width, height)
                .with_codec(codec)
                .with_max_consecutive_append_failures(max_append_failures);
            if crf.is_some() {
                sink = sink.with_crf(crf);
            }
            if let Some(bitrate) = bitrate {
                sink = sink.with_bitrate(bitrate);
            }

            let base = if demo { PipelineOptions::demo() } else { PipelineOptions::new() };
            let mut options = base
                .with_output_root(&output_root)
                .with_sink(sink)
                .with_sink_content(if source_frames {
                    SinkContent::SourceFrame
                } else {
                    SinkContent::FlowVisualization
                })
                .with_decode_pixel_format(decode_format)
                .with_error_policy(error_policy)
                .with_empty_frame_retries(retries)
                .with_video_output(!no_video)
                .with_debug_image(!no_debug_image);
            if !demo {
                options = options.with_max_frames(max_frames);
            }

            if progress {
                options = options.with_progress(Arc::new(TerminalProgress::new()?));
            }

            let orientation: Arc<dyn OrientationProvider> = match (orientation_csv, orientation) {
                (Some(path), _) => Arc::new(OrientationTrack::from_csv_path(path)?),
                (None, Some(fixed)) => Arc::new(fixed.parse::<Orientation>()?),
                (None, None) => return Err("either --orientation or --orientation-csv is required".into()),
            };

            let estimator = MotionEstimator::new(
                BlockMatching::new()
                    .with_block_size(block_size)
                    .with_search_range(search_range),
            );
            let pipeline =
                Pipeline::with_shared_orientation(options, orientation).with_estimator(estimator);

            let report = pipeline.run(&input)?;

            println!(
                "{} {}",
                "success:".green().bold(),
                format!(
                    "{} frames read, {} flow fields, {} skipped pairs",
                    report.frames_read, report.flow_fields, report.skipped_pairs
                )
                .green()
            );
            if let Some(video) = &report.output_video {
                println!(
                    "{} {} ({} samples)",
                    "saved".green().bold(),
                    video.display(),
                    report.samples_written
                );
            }
            if let Some(image) = &report.debug_image {
                println!("{} {}", "saved".green().bold(), image.display());
            }
            if report.failed_appends > 0 {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("{} samples failed to append", report.failed_appends).yellow()
                );
            }
        }
        Commands::Probe { input, json } => {
            let handle = VideoHandle::open(&input)?;
            let track = handle.descriptor();
            if json {
                let payload = json!({
                    "path": input.display().to_string(),
                    "video": track.to_json(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!(
                    "Video: {}x{} @ {:.2} fps [{}]",
                    track.width, track.height, track.frames_per_second, track.codec,
                );
                println!("Duration: {:?}", track.duration);
                println!("Frames: ~{}", track.frame_count);
                if let Some(pixel_format) = &track.pixel_format_name {
                    println!("Pixel format: {pixel_format}");
                }
                let report = validate_run(track, &PipelineOptions::new());
                for warning in &report.warnings {
                    eprintln!("{} {}", "warning:".yellow().bold(), warning.yellow());
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "flowmotion", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands, parse_decode_format, parse_hold, parse_resolution};

    #[test]
    fn parse_resolution_forms() {
        assert_eq!(parse_resolution("1920x1080").unwrap(), (1920, 1080));
        assert_eq!(parse_resolution(" 640X480 ").unwrap(), (640, 480));
        assert!(parse_resolution("640").is_err());
        assert!(parse_resolution("axb").is_err());
    }

    #[test]
    fn parse_decode_format_aliases() {
        assert!(parse_decode_format("yuva444p16").is_some());
        assert!(parse_decode_format("GRAY").is_some());
        assert!(parse_decode_format("nv12").is_none());
    }

    #[test]
    fn parse_hold_rejects_negative() {
        assert_eq!(parse_hold(0.5).unwrap(), std::time::Duration::from_millis(500));
        assert!(parse_hold(-1.0).is_err());
    }

    #[test]
    fn process_requires_an_orientation_source() {
        assert!(Cli::try_parse_from(["flowmotion", "process", "in.mp4"]).is_err());
    }

    #[test]
    fn process_accepts_either_orientation_source() {
        let cli = Cli::try_parse_from(["flowmotion", "process", "in.mp4", "--orientation", "right"]).unwrap();
        match cli.command {
            Commands::Process { orientation, orientation_csv, .. } => {
                assert_eq!(orientation.as_deref(), Some("right"));
                assert!(orientation_csv.is_none());
            }
            _ => panic!("expected the process subcommand"),
        }

        let cli = Cli::try_parse_from(["flowmotion", "process", "in.mp4", "--orientation-csv", "track.csv"]).unwrap();
        match cli.command {
            Commands::Process { orientation, orientation_csv, .. } => {
                assert!(orientation.is_none());
                assert_eq!(orientation_csv, Some("track.csv".into()));
            }
            _ => panic!("expected the process subcommand"),
        }
    }

    #[test]
    fn process_rejects_both_orientation_sources() {
        let result = Cli::try_parse_from([
            "flowmotion",
            "process",
            "in.mp4",
            "--orientation",
            "up",
            "--orientation-csv",
            "track.csv",
        ]);
        assert!(result.is_err());
    }
}
