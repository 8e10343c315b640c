//! Pipeline configuration.
//!
//! [`PipelineOptions`] is a builder that threads output locations, encoder
//! settings, failure policy, progress callbacks and cancellation tokens
//! through a run without polluting every function signature.
//! [`SinkOptions`] groups the encoder-facing settings.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use flowmotion::{
//!     CancellationToken, ErrorPolicy, PipelineOptions, ProgressCallback, ProgressInfo,
//!     SinkOptions, VideoCodec,
//! };
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{:?}: {} frames", info.stage, info.current);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = PipelineOptions::new()
//!     .with_output_root("runs/today")
//!     .with_sink(
//!         SinkOptions::new()
//!             .with_frame_rate(24)
//!             .with_hold_duration(Duration::from_millis(500))
//!             .with_codec(VideoCodec::Mpeg4),
//!     )
//!     .with_error_policy(ErrorPolicy::SkipAndContinue)
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::frame::FramePixelFormat;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Subdirectory of the output root that holds the encoded video.
pub const OUTPUT_SUBDIRECTORY: &str = "out";
/// File name of the encoded video.
pub const OUTPUT_FILE_NAME: &str = "output.mov";
/// File name of the debug still written next to the output directory.
pub const DEBUG_IMAGE_FILE_NAME: &str = "flow_debug.jpg";

/// What to do when a single frame pair or sample fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop the run at the first failure. This is the default.
    #[default]
    Abort,
    /// Log the failure, count it, and move on to the next pair.
    SkipAndContinue,
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "abort" => Ok(ErrorPolicy::Abort),
            "skip" | "skip-and-continue" => Ok(ErrorPolicy::SkipAndContinue),
            other => Err(format!("unknown error policy: {other}")),
        }
    }
}

/// Supported output video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoCodec {
    /// H.264 / AVC. This is the default.
    #[default]
    H264,
    /// H.265 / HEVC.
    H265,
    /// MPEG-4 Part 2.
    Mpeg4,
}

impl FromStr for VideoCodec {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "h264" | "avc" => Ok(VideoCodec::H264),
            "h265" | "hevc" => Ok(VideoCodec::H265),
            "mpeg4" => Ok(VideoCodec::Mpeg4),
            other => Err(format!("unknown codec: {other}")),
        }
    }
}

/// What the sink receives for each processed pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkContent {
    /// The colour-wheel rendering of the flow field. This is the default.
    #[default]
    FlowVisualization,
    /// The current source frame, unchanged.
    SourceFrame,
}

/// Encoder and pacing settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkOptions {
    /// Output frames per second (default: 30).
    pub frame_rate: u32,
    /// How long each written frame is held on screen (default: 1 s).
    pub hold_duration: Duration,
    /// Output width (default: 1920).
    pub width: u32,
    /// Output height (default: 1080).
    pub height: u32,
    /// Codec to use. Default is H.264.
    pub codec: VideoCodec,
    /// Constant Rate Factor (0-51, lower is better). Default: 23.
    pub crf: Option<u32>,
    /// Bitrate in bits per second. If set, overrides CRF.
    pub bitrate: Option<usize>,
    /// Consecutive append failures tolerated under
    /// [`ErrorPolicy::SkipAndContinue`] before the run aborts (default: 3).
    pub max_consecutive_append_failures: u32,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            hold_duration: Duration::from_secs(1),
            width: 1920,
            height: 1080,
            codec: VideoCodec::H264,
            crf: Some(23),
            bitrate: None,
            max_consecutive_append_failures: 3,
        }
    }
}

impl SinkOptions {
    /// Create sink options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output frame rate. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate.max(1);
        self
    }

    /// Set how long each written frame is held.
    ///
    /// A frame always occupies at least one sample, so holds shorter than
    /// half a frame interval (including zero) still write one sample.
    #[must_use]
    pub fn with_hold_duration(mut self, hold: Duration) -> Self {
        self.hold_duration = hold;
        self
    }

    /// Set the output resolution.
    #[must_use]
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the codec.
    #[must_use]
    pub fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the CRF quality value. `None` leaves the encoder default.
    #[must_use]
    pub fn with_crf(mut self, crf: Option<u32>) -> Self {
        self.crf = crf;
        self
    }

    /// Set the target bitrate in bits per second.
    #[must_use]
    pub fn with_bitrate(mut self, bitrate: usize) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    /// Set how many back-to-back append failures are tolerated.
    #[must_use]
    pub fn with_max_consecutive_append_failures(mut self, limit: u32) -> Self {
        self.max_consecutive_append_failures = limit.max(1);
        self
    }

    /// Samples emitted per written frame: `round(hold × frame_rate)`, at
    /// least 1.
    pub fn slots_per_write(&self) -> u64 {
        let slots = (self.hold_duration.as_secs_f64() * self.frame_rate as f64).round();
        (slots as u64).max(1)
    }

    /// `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Configuration for a pipeline run.
///
/// All fields have defaults; a default-constructed value runs the full loop
/// with video output and a debug image under `flowmotion-output/`.
#[derive(Clone)]
pub struct PipelineOptions {
    /// Directory that receives `out/output.mov` and `flow_debug.jpg`.
    pub(crate) output_root: PathBuf,
    /// Encode a video from the processed frames.
    pub(crate) write_video: bool,
    /// Save the first flow field as a JPEG.
    pub(crate) write_debug_image: bool,
    pub(crate) sink: SinkOptions,
    pub(crate) sink_content: SinkContent,
    /// Pixel format frames are decoded to.
    pub(crate) decode_pixel_format: FramePixelFormat,
    /// Upper bound on frames read. `None` processes the whole video.
    pub(crate) max_frames_to_process: Option<u64>,
    pub(crate) error_policy: ErrorPolicy,
    /// Retries for empty decoded buffers and transient packet-read errors.
    pub(crate) empty_frame_retries: u32,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    /// How often to fire the progress callback (every N frames read).
    pub(crate) batch_size: u64,
}

impl Debug for PipelineOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PipelineOptions")
            .field("output_root", &self.output_root)
            .field("write_video", &self.write_video)
            .field("write_debug_image", &self.write_debug_image)
            .field("sink", &self.sink)
            .field("sink_content", &self.sink_content)
            .field("decode_pixel_format", &self.decode_pixel_format)
            .field("max_frames_to_process", &self.max_frames_to_process)
            .field("error_policy", &self.error_policy)
            .field("empty_frame_retries", &self.empty_frame_retries)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            output_root: PathBuf::from("flowmotion-output"),
            write_video: true,
            write_debug_image: true,
            sink: SinkOptions::default(),
            sink_content: SinkContent::default(),
            decode_pixel_format: FramePixelFormat::default(),
            max_frames_to_process: None,
            error_policy: ErrorPolicy::default(),
            empty_frame_retries: 3,
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
        }
    }

    /// Restricted demo mode: stop after the first two frames, which yields
    /// exactly one flow field.
    pub fn demo() -> Self {
        Self::new().with_max_frames(Some(2))
    }

    /// Set the directory that receives all outputs.
    #[must_use]
    pub fn with_output_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.output_root = root.as_ref().to_path_buf();
        self
    }

    /// Enable or disable video output.
    #[must_use]
    pub fn with_video_output(mut self, enabled: bool) -> Self {
        self.write_video = enabled;
        self
    }

    /// Enable or disable the debug still.
    #[must_use]
    pub fn with_debug_image(mut self, enabled: bool) -> Self {
        self.write_debug_image = enabled;
        self
    }

    /// Set the encoder settings.
    #[must_use]
    pub fn with_sink(mut self, sink: SinkOptions) -> Self {
        self.sink = sink;
        self
    }

    /// Choose what the sink receives for each pair.
    #[must_use]
    pub fn with_sink_content(mut self, content: SinkContent) -> Self {
        self.sink_content = content;
        self
    }

    /// Set the pixel format frames are decoded to.
    #[must_use]
    pub fn with_decode_pixel_format(mut self, format: FramePixelFormat) -> Self {
        self.decode_pixel_format = format;
        self
    }

    /// Limit the number of frames read. `None` processes every frame.
    #[must_use]
    pub fn with_max_frames(mut self, limit: Option<u64>) -> Self {
        self.max_frames_to_process = limit;
        self
    }

    /// Set the failure policy for flow and append errors.
    #[must_use]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Set how many times an empty decoded buffer is retried.
    #[must_use]
    pub fn with_empty_frame_retries(mut self, retries: u32) -> Self {
        self.empty_frame_retries = retries;
        self
    }

    /// Attach a progress callback.
    ///
    /// The callback is invoked every
    /// [`batch_size`](PipelineOptions::with_batch_size) frames read from the
    /// source, whether or not they produce a flow field.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled the loop stops before the next pair and
    /// the run returns [`FlowMotionError::Cancelled`](crate::FlowMotionError::Cancelled).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set how often the progress callback fires. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Directory that receives all outputs.
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// `<output_root>/out`, recreated on every run that writes video.
    pub fn output_directory(&self) -> PathBuf {
        self.output_root.join(OUTPUT_SUBDIRECTORY)
    }

    /// `<output_root>/out/output.mov`.
    pub fn output_video_path(&self) -> PathBuf {
        self.output_directory().join(OUTPUT_FILE_NAME)
    }

    /// `<output_root>/flow_debug.jpg`.
    pub fn debug_image_path(&self) -> PathBuf {
        self.output_root.join(DEBUG_IMAGE_FILE_NAME)
    }

    /// Encoder settings.
    pub fn sink(&self) -> &SinkOptions {
        &self.sink
    }

    /// Frame limit, if any.
    pub fn max_frames_to_process(&self) -> Option<u64> {
        self.max_frames_to_process
    }

    /// Failure policy.
    pub fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    /// Decode pixel format.
    pub fn decode_pixel_format(&self) -> FramePixelFormat {
        self.decode_pixel_format
    }

    /// Returns `true` if cancellation has been requested.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_round_to_nearest() {
        let sink = SinkOptions::new()
            .with_frame_rate(30)
            .with_hold_duration(Duration::from_millis(1010));
        assert_eq!(sink.slots_per_write(), 30);
        let sink = sink.with_hold_duration(Duration::from_millis(1020));
        assert_eq!(sink.slots_per_write(), 31);
    }

    #[test]
    fn zero_hold_still_writes_one_sample() {
        let sink = SinkOptions::new().with_hold_duration(Duration::ZERO);
        assert_eq!(sink.slots_per_write(), 1);
    }

    #[test]
    fn policy_and_codec_parse() {
        assert_eq!("skip".parse::<ErrorPolicy>(), Ok(ErrorPolicy::SkipAndContinue));
        assert_eq!("HEVC".parse::<VideoCodec>(), Ok(VideoCodec::H265));
        assert!("vp9".parse::<VideoCodec>().is_err());
    }
}
