//! Sequential frame decoding.
//!
//! [`VideoHandle::open`] opens a container and resolves its first video
//! track. [`FrameReader::start`] consumes the handle, so a handle can begin
//! reading exactly once, and then yields owned [`Frame`]s one at a time.
//!
//! # Example
//!
//! ```no_run
//! use flowmotion::{FrameReader, ReaderOptions, VideoHandle};
//!
//! let handle = VideoHandle::open("input.mp4")?;
//! let mut reader = FrameReader::start(handle, &ReaderOptions::default())?;
//!
//! while let Some(frame) = reader.next_frame() {
//!     println!("frame {} at {:.3}s", frame.time().index, frame.time().as_secs_f64());
//! }
//! # Ok::<(), flowmotion::FlowMotionError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next::{
    Error as FfmpegError, Packet,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::context::Input,
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::error::EAGAIN,
};

use crate::conversion::{to_ffmpeg_pixel, video_frame_to_frame};
use crate::error::FlowMotionError;
use crate::frame::{Frame, FramePixelFormat, PresentationTime};
use crate::metadata::TrackDescriptor;

/// Anything that can drive a pipeline run with decoded frames.
///
/// Implementations yield frames in presentation order with indices starting
/// at zero and increasing by one. `None` ends the run.
pub trait FrameProducer {
    /// Metadata of the track being read.
    fn descriptor(&self) -> &TrackDescriptor;

    /// Pull the next frame, or `None` when the stream is exhausted or broken.
    fn next_frame(&mut self) -> Option<Frame>;
}

/// An opened container and its resolved video track.
///
/// Created via [`VideoHandle::open`]; consumed by [`FrameReader::start`].
pub struct VideoHandle {
    input: Input,
    descriptor: TrackDescriptor,
    path: PathBuf,
}

impl Debug for VideoHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoHandle")
            .field("descriptor", &self.descriptor)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl VideoHandle {
    /// Open a video file and resolve its first video track.
    ///
    /// Initializes FFmpeg (idempotent) before opening.
    ///
    /// # Errors
    ///
    /// - [`FlowMotionError::FileOpen`] if the container cannot be opened.
    /// - [`FlowMotionError::NoVideoTrack`] if it holds no video track.
    /// - [`FlowMotionError::TrackLoad`] if the track's decoder parameters
    ///   cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FlowMotionError> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening video file: {}", path.display());

        ffmpeg_next::init().map_err(|error| FlowMotionError::FileOpen {
            path: path.clone(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let input = ffmpeg_next::format::input(&path).map_err(|error| FlowMotionError::FileOpen {
            path: path.clone(),
            reason: error.to_string(),
        })?;

        let descriptor = resolve_track(&input)?;
        log::info!(
            "Opened {}: {} {}x{} @ {:.2} fps, ~{} frames",
            path.display(),
            descriptor.codec,
            descriptor.width,
            descriptor.height,
            descriptor.frames_per_second,
            descriptor.frame_count,
        );

        Ok(Self {
            input,
            descriptor,
            path,
        })
    }

    /// Metadata of the selected track.
    pub fn descriptor(&self) -> &TrackDescriptor {
        &self.descriptor
    }

    /// Path the handle was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Pick the first video track and read its metadata.
fn resolve_track(input: &Input) -> Result<TrackDescriptor, FlowMotionError> {
    let stream = input
        .streams()
        .find(|stream| stream.parameters().medium() == Type::Video)
        .ok_or(FlowMotionError::NoVideoTrack)?;
    let stream_index = stream.index();

    let decoder = CodecContext::from_parameters(stream.parameters())
        .and_then(|context| context.decoder().video())
        .map_err(|error| {
            FlowMotionError::TrackLoad(format!(
                "cannot read decoder parameters for stream {stream_index}: {error}"
            ))
        })?;

    let frame_rate = stream.avg_frame_rate();
    let frames_per_second = if frame_rate.denominator() != 0 && frame_rate.numerator() > 0 {
        frame_rate.numerator() as f64 / frame_rate.denominator() as f64
    } else {
        let rate = stream.rate();
        if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        }
    };

    let time_base = stream.time_base();
    let duration = if stream.duration() > 0 && time_base.denominator() != 0 {
        Duration::from_secs_f64(
            stream.duration() as f64 * time_base.numerator() as f64
                / time_base.denominator() as f64,
        )
    } else if input.duration() > 0 {
        Duration::from_micros(input.duration() as u64)
    } else {
        Duration::ZERO
    };

    let frame_count = match stream.frames() {
        count if count > 0 => count as u64,
        _ if frames_per_second > 0.0 => (duration.as_secs_f64() * frames_per_second).round() as u64,
        _ => 0,
    };

    let codec = decoder
        .codec()
        .map(|codec| codec.name().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let pixel_format_name = {
        let name = format!("{:?}", decoder.format());
        if name == "None" { None } else { Some(name.to_lowercase()) }
    };

    Ok(TrackDescriptor {
        width: decoder.width(),
        height: decoder.height(),
        frames_per_second,
        duration,
        frame_count,
        codec,
        pixel_format_name,
        stream_index,
    })
}

/// Settings for [`FrameReader::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Pixel format frames are converted to. Default:
    /// [`FramePixelFormat::Yuva444p16`].
    pub pixel_format: FramePixelFormat,
    /// How many times an empty decoded buffer or a non-fatal packet-read
    /// error is retried before the stream is treated as finished.
    pub empty_frame_retries: u32,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            pixel_format: FramePixelFormat::default(),
            empty_frame_retries: 3,
        }
    }
}

impl ReaderOptions {
    /// Set the output pixel format.
    #[must_use]
    pub fn with_pixel_format(mut self, format: FramePixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    /// Set the retry budget for empty buffers.
    #[must_use]
    pub fn with_empty_frame_retries(mut self, retries: u32) -> Self {
        self.empty_frame_retries = retries;
        self
    }
}

/// A start-once, strictly sequential stream of decoded frames.
///
/// Every frame is copied out of the decoder, so returned [`Frame`]s can be
/// held for as long as needed. Decode faults end the stream: they are
/// logged and [`next_frame`](FrameReader::next_frame) returns `None`.
pub struct FrameReader {
    input: Input,
    descriptor: TrackDescriptor,
    path: PathBuf,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    options: ReaderOptions,
    decoded_frame: VideoFrame,
    converted_frame: VideoFrame,
    next_index: u64,
    eof_sent: bool,
    done: bool,
}

impl Debug for FrameReader {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FrameReader")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("next_index", &self.next_index)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl FrameReader {
    /// Create the decoder and pixel conversion for `handle`'s track.
    ///
    /// # Errors
    ///
    /// - [`FlowMotionError::StartReading`] if the decoder cannot be created.
    /// - [`FlowMotionError::CannotAttachOutput`] if the conversion to the
    ///   requested pixel format is rejected.
    pub fn start(handle: VideoHandle, options: &ReaderOptions) -> Result<Self, FlowMotionError> {
        let VideoHandle {
            input,
            descriptor,
            path,
        } = handle;

        let stream = input
            .stream(descriptor.stream_index)
            .ok_or(FlowMotionError::NoVideoTrack)?;
        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|error| FlowMotionError::StartReading(error.to_string()))?;

        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            to_ffmpeg_pixel(options.pixel_format),
            decoder.width(),
            decoder.height(),
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| {
            FlowMotionError::CannotAttachOutput(format!(
                "{:?} -> {}: {error}",
                decoder.format(),
                options.pixel_format.name()
            ))
        })?;

        log::debug!(
            "Started reading {} as {}",
            path.display(),
            options.pixel_format.name()
        );

        Ok(Self {
            input,
            descriptor,
            path,
            decoder,
            scaler,
            options: *options,
            decoded_frame: VideoFrame::empty(),
            converted_frame: VideoFrame::empty(),
            next_index: 0,
            eof_sent: false,
            done: false,
        })
    }

    /// Number of frames returned so far.
    pub fn frames_read(&self) -> u64 {
        self.next_index
    }

    /// Pull the next decoded frame.
    ///
    /// Returns `None` at end of stream and on any decode fault. Once `None`
    /// has been returned every later call returns `None` too.
    pub fn next_frame(&mut self) -> Option<Frame> {
        if self.done {
            return None;
        }
        match self.decode_next() {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => {
                log::debug!("End of stream after {} frames", self.next_index);
                self.done = true;
                None
            }
            Err(error) => {
                log::error!("Decoding {} stopped: {error}", self.path.display());
                self.done = true;
                None
            }
        }
    }

    fn decode_next(&mut self) -> Result<Option<Frame>, FlowMotionError> {
        let mut empty_frames = 0u32;
        let mut read_failures = 0u32;

        loop {
            match self.decoder.receive_frame(&mut self.decoded_frame) {
                Ok(()) => {
                    if self.decoded_frame.width() == 0 || self.decoded_frame.height() == 0 {
                        empty_frames += 1;
                        if empty_frames > self.options.empty_frame_retries {
                            return Err(FlowMotionError::FfmpegError(format!(
                                "{empty_frames} empty frames in a row"
                            )));
                        }
                        log::warn!("Decoder returned an empty frame, retrying");
                        continue;
                    }
                    return self.convert_current_frame().map(Some);
                }
                Err(FfmpegError::Eof) => return Ok(None),
                Err(FfmpegError::Other { errno }) if errno == EAGAIN => {}
                Err(error) => return Err(error.into()),
            }

            if self.eof_sent {
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    read_failures = 0;
                    if packet.stream() == self.descriptor.stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(error) => {
                    read_failures += 1;
                    if read_failures > self.options.empty_frame_retries {
                        return Err(error.into());
                    }
                    log::warn!("Packet read failed ({error}), retrying");
                }
            }
        }
    }

    fn convert_current_frame(&mut self) -> Result<Frame, FlowMotionError> {
        self.scaler
            .run(&self.decoded_frame, &mut self.converted_frame)?;

        let time = PresentationTime::new(self.next_index, self.descriptor.frames_per_second);
        let frame = video_frame_to_frame(&self.converted_frame, self.options.pixel_format, time)
            .map_err(|error| FlowMotionError::FfmpegError(error.to_string()))?;

        self.next_index += 1;
        Ok(frame)
    }
}

impl FrameProducer for FrameReader {
    fn descriptor(&self) -> &TrackDescriptor {
        &self.descriptor
    }

    fn next_frame(&mut self) -> Option<Frame> {
        FrameReader::next_frame(self)
    }
}

impl Iterator for FrameReader {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame()
    }
}
