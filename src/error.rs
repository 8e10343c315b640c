//! Error types for the `flowmotion` crate.
//!
//! [`FlowMotionError`] is the unified error returned by every fallible
//! pipeline operation. Motion estimation has its own narrower
//! [`FlowError`], which the pipeline wraps together with the frame pair it
//! failed on.
//!
//! Errors fall into two groups. Open, track, decode-start, encoder-setup and
//! finalize errors are fatal to a run. Flow and append errors are local to
//! one frame pair and are handled according to the configured
//! [`ErrorPolicy`](crate::ErrorPolicy).

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

use crate::frame::FramePixelFormat;

/// The unified error type for all `flowmotion` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FlowMotionError {
    /// The video container could not be opened.
    #[error("Failed to open video file at {path}: {reason}")]
    FileOpen {
        /// Path passed to [`VideoHandle::open`](crate::VideoHandle::open).
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The container holds zero video tracks.
    #[error("No video track found in file")]
    NoVideoTrack,

    /// The video track's metadata could not be resolved.
    #[error("Failed to load video track: {0}")]
    TrackLoad(String),

    /// The decoder rejected the requested output pixel format.
    #[error("Cannot attach decoder output: {0}")]
    CannotAttachOutput(String),

    /// The decoder could not begin reading.
    #[error("Cannot start reading: {0}")]
    StartReading(String),

    /// Motion estimation failed for a specific frame pair.
    #[error("Flow estimation failed between frames {previous} and {current}: {source}")]
    FlowEstimation {
        /// Index of the earlier frame of the pair.
        previous: u64,
        /// Index of the later frame of the pair.
        current: u64,
        /// What went wrong inside the estimator.
        #[source]
        source: FlowError,
    },

    /// The output container could not be created.
    #[error("Cannot create video writer: {0}")]
    CannotCreateWriter(String),

    /// The encoder rejected the requested video settings.
    #[error("Cannot attach encoder input: {0}")]
    CannotAttachInput(String),

    /// Appending a sample to the encoder failed and the failure policy
    /// stopped the run.
    #[error("Failed to append sample at pts {pts} ({consecutive_failures} consecutive failures): {reason}")]
    AppendFailed {
        /// Presentation timestamp (in frame-rate ticks) of the failed sample.
        pts: i64,
        /// Number of back-to-back failures including this one.
        consecutive_failures: u32,
        /// Underlying reason reported by the writer.
        reason: String,
    },

    /// The output container could not be finalised.
    #[error("Failed to finalize output: {0}")]
    Finalize(String),

    /// A write was attempted on a session that is not accepting samples.
    #[error("Encode session is {0}, cannot accept samples")]
    SessionClosed(&'static str),

    /// Another run is already active on this pipeline.
    #[error("Pipeline is busy with another run")]
    Busy,

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// The requested configuration cannot work with the input.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The orientation source could not supply a value.
    #[error("Orientation unavailable: {0}")]
    Orientation(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while writing the debug still.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),
}

impl From<FfmpegError> for FlowMotionError {
    fn from(error: FfmpegError) -> Self {
        FlowMotionError::FfmpegError(error.to_string())
    }
}

/// Errors raised while computing a flow field for one frame pair.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum FlowError {
    /// The two frames were decoded to different pixel formats.
    #[error("pixel formats differ ({previous:?} vs {current:?})")]
    FormatMismatch {
        /// Format of the previous frame.
        previous: FramePixelFormat,
        /// Format of the current frame.
        current: FramePixelFormat,
    },

    /// The two frames (or the computed field) have different dimensions.
    #[error("dimensions differ ({expected_width}x{expected_height} vs {actual_width}x{actual_height})")]
    DimensionMismatch {
        /// Width that was expected.
        expected_width: u32,
        /// Height that was expected.
        expected_height: u32,
        /// Width that was found.
        actual_width: u32,
        /// Height that was found.
        actual_height: u32,
    },

    /// A frame buffer is empty or shorter than its declared layout.
    #[error("malformed frame buffer: {0}")]
    MalformedBuffer(String),

    /// The flow algorithm itself failed. Reported by custom
    /// [`FlowAlgorithm`](crate::FlowAlgorithm) implementations; block
    /// matching never returns it.
    #[error("flow algorithm failed: {0}")]
    Algorithm(String),
}
