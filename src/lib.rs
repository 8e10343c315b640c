//! # flowmotion
//!
//! Stream a video through dense motion estimation and re-encode the result.
//!
//! `flowmotion` decodes the frames of a video one at a time, computes a
//! dense optical-flow field between every consecutive pair, and can encode
//! a new video from the processed frames at a fixed pace, powered by FFmpeg
//! via the [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! ## Quick Start
//!
//! ### Process a Video
//!
//! ```no_run
//! use flowmotion::{Orientation, Pipeline, PipelineOptions};
//!
//! let pipeline = Pipeline::new(PipelineOptions::new(), Orientation::Up);
//! let report = pipeline.run("input.mp4").unwrap();
//! println!("wrote {:?}", report.output_video);
//! ```
//!
//! ### Pull Frames and Estimate Flow Yourself
//!
//! ```no_run
//! use flowmotion::{FrameReader, MotionEstimator, Orientation, ReaderOptions, VideoHandle};
//!
//! let handle = VideoHandle::open("input.mp4").unwrap();
//! let mut reader = FrameReader::start(handle, &ReaderOptions::default()).unwrap();
//! let estimator = MotionEstimator::default();
//!
//! let mut previous = reader.next_frame();
//! while let (Some(before), Some(now)) = (previous.as_ref(), reader.next_frame()) {
//!     let field = estimator.estimate(before, &now, Orientation::Up).unwrap();
//!     println!("frame {}: max motion {:.2}px", now.time().index, field.max_magnitude());
//!     previous = Some(now);
//! }
//! ```
//!
//! ### Per-Frame Orientation
//!
//! ```no_run
//! use flowmotion::{OrientationTrack, Pipeline, PipelineOptions};
//!
//! let track = OrientationTrack::from_csv_path("orientation.csv").unwrap();
//! let report = Pipeline::new(PipelineOptions::demo(), track).run("input.mov").unwrap();
//! ```
//!
//! ## Features
//!
//! - **Sequential decoding**: owned frames in 16-bit 4:4:4 with alpha by
//!   default, or 8-bit YUV, RGB, RGBA and grayscale
//! - **Pluggable motion estimation**: any [`FlowAlgorithm`]; dense SAD block
//!   matching ships as the default
//! - **Orientation hints**: EXIF-style rotations and mirrors applied before
//!   estimation, fixed or per frame
//! - **Paced encoding**: every processed frame is held for a fixed duration
//!   at a fixed frame rate, with gap-free timestamps
//! - **Failure policy**: abort on the first failure or skip and count
//! - **Progress & cancellation**: cooperative callbacks and
//!   [`CancellationToken`]
//! - **Validation**: pre-flight checks of the track and the options
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | `probe_track`, `Pipeline::process_video` and `Pipeline::flow_stream` via Tokio (default) |
//! | `rayon` | Block matching distributes rows across rayon threads |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod block_matching;
pub mod configuration;
mod conversion;
pub mod debug_image;
pub mod encode;
pub mod error;
pub mod ffmpeg;
pub mod flow;
pub mod frame;
pub mod metadata;
pub mod motion;
pub mod orientation;
pub mod pipeline;
pub mod progress;
pub mod sink;
pub mod source;
#[cfg(feature = "async")]
pub mod stream;
pub mod validation;

pub use block_matching::BlockMatching;
pub use configuration::{
    DEBUG_IMAGE_FILE_NAME, ErrorPolicy, OUTPUT_FILE_NAME, OUTPUT_SUBDIRECTORY, PipelineOptions,
    SinkContent, SinkOptions, VideoCodec,
};
pub use debug_image::{DEBUG_IMAGE_QUALITY, write_debug_image};
pub use encode::FfmpegWriter;
pub use error::{FlowError, FlowMotionError};
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use flow::FlowField;
pub use frame::{Frame, FramePixelFormat, LumaPlane, PlaneLayout, PresentationTime};
pub use metadata::TrackDescriptor;
pub use motion::{FlowAlgorithm, MotionEstimator};
pub use orientation::{Orientation, OrientationProvider, OrientationTrack};
pub use pipeline::{Pipeline, PipelineReport, PipelineState};
pub use progress::{CancellationToken, PipelineStage, ProgressCallback, ProgressInfo};
pub use sink::{FrameSink, SampleWriter, SessionStatus, WriteReport, prepare_output_directory};
pub use source::{FrameProducer, FrameReader, ReaderOptions, VideoHandle};
#[cfg(feature = "async")]
pub use stream::{FlowStream, ProcessFuture, probe_track};
pub use validation::{ValidationReport, validate_run};
