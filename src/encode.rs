//! FFmpeg-backed [`SampleWriter`].
//!
//! [`FfmpegWriter`] owns an output container with one video stream. Frames
//! are converted to the encoder's pixel format and resolution once per
//! [`prepare`](SampleWriter::prepare) call, then appended any number of
//! times at increasing presentation timestamps.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};

use ffmpeg_next::codec::Id;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::encoder::Video as VideoEncoder;
use ffmpeg_next::format::context::Output;
use ffmpeg_next::format::{Flags as FormatFlags, Pixel};
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::{Dictionary, Error as FfmpegError, Packet, Rational};

use crate::configuration::{SinkOptions, VideoCodec};
use crate::conversion::{frame_to_video_frame, to_ffmpeg_pixel};
use crate::error::FlowMotionError;
use crate::frame::{Frame, FramePixelFormat};
use crate::sink::SampleWriter;

impl VideoCodec {
    fn to_codec_id(self) -> Id {
        match self {
            VideoCodec::H264 => Id::H264,
            VideoCodec::H265 => Id::HEVC,
            VideoCodec::Mpeg4 => Id::MPEG4,
        }
    }

    /// Whether the encoder understands the `crf` private option.
    fn accepts_crf(self) -> bool {
        matches!(self, VideoCodec::H264 | VideoCodec::H265)
    }
}

/// Pixel format every codec here is fed with.
const ENCODER_PIXEL: Pixel = Pixel::YUV420P;

/// Writes paced samples into a video container through FFmpeg.
pub struct FfmpegWriter {
    output: Output,
    encoder: VideoEncoder,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    width: u32,
    height: u32,
    scaler: Option<(FramePixelFormat, u32, u32, ScalingContext)>,
    path: PathBuf,
    finished: bool,
}

impl Debug for FfmpegWriter {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FfmpegWriter")
            .field("path", &self.path)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl FfmpegWriter {
    /// Open `path` for writing and negotiate the encoder.
    ///
    /// The container format is inferred from the file extension.
    ///
    /// # Errors
    ///
    /// - [`FlowMotionError::CannotCreateWriter`] if the container cannot be
    ///   created or its header cannot be written.
    /// - [`FlowMotionError::CannotAttachInput`] if the codec is unavailable
    ///   or rejects the resolution, frame rate or quality settings.
    pub fn create<P: AsRef<Path>>(path: P, options: &SinkOptions) -> Result<Self, FlowMotionError> {
        let path = path.as_ref().to_path_buf();
        let (width, height) = options.dimensions();
        let frame_rate = options.frame_rate.max(1) as i32;

        log::info!(
            "Creating writer {} (codec={:?}, {}x{}, fps={})",
            path.display(),
            options.codec,
            width,
            height,
            frame_rate,
        );

        ffmpeg_next::init().map_err(|e| FlowMotionError::CannotCreateWriter(e.to_string()))?;

        if width == 0 || height == 0 {
            return Err(FlowMotionError::CannotAttachInput(format!(
                "invalid resolution {width}x{height}"
            )));
        }

        let mut output = ffmpeg_next::format::output(&path)
            .map_err(|e| FlowMotionError::CannotCreateWriter(format!("cannot open output: {e}")))?;

        let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

        let codec_id = options.codec.to_codec_id();
        let encoder_codec = ffmpeg_next::encoder::find(codec_id).ok_or_else(|| {
            FlowMotionError::CannotAttachInput(format!("codec {codec_id:?} not available"))
        })?;

        let mut stream = output
            .add_stream(encoder_codec)
            .map_err(|e| FlowMotionError::CannotCreateWriter(format!("cannot add stream: {e}")))?;
        let stream_index = stream.index();

        let mut encoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.encoder().video())
            .map_err(|e| {
                FlowMotionError::CannotAttachInput(format!("cannot create codec context: {e}"))
            })?;

        let encoder_time_base = Rational::new(1, frame_rate);
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(ENCODER_PIXEL);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(Rational::new(frame_rate, 1)));

        if let Some(bitrate) = options.bitrate {
            encoder.set_bit_rate(bitrate);
        }

        if needs_global_header {
            unsafe {
                (*encoder.as_mut_ptr()).flags |=
                    ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let mut codec_options = Dictionary::new();
        if options.bitrate.is_none()
            && options.codec.accepts_crf()
            && let Some(crf) = options.crf
        {
            codec_options.set("crf", &crf.to_string());
        }

        let encoder = encoder
            .open_as_with(encoder_codec, codec_options)
            .map_err(|e| FlowMotionError::CannotAttachInput(format!("cannot open encoder: {e}")))?;

        stream.set_parameters(&encoder);
        stream.set_time_base(encoder_time_base);

        output
            .write_header()
            .map_err(|e| FlowMotionError::CannotCreateWriter(format!("cannot write header: {e}")))?;

        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| FlowMotionError::CannotCreateWriter("output stream vanished".to_string()))?;

        Ok(Self {
            output,
            encoder,
            stream_index,
            encoder_time_base,
            stream_time_base,
            width,
            height,
            scaler: None,
            path,
            finished: false,
        })
    }

    /// Path being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scaler from `format` at `width`x`height` to the encoder input,
    /// rebuilt only when the source layout changes.
    fn scaler_for(
        &mut self,
        format: FramePixelFormat,
        width: u32,
        height: u32,
    ) -> Result<&mut ScalingContext, FlowMotionError> {
        let stale = !matches!(
            &self.scaler,
            Some((cached_format, cached_width, cached_height, _))
                if *cached_format == format && *cached_width == width && *cached_height == height
        );
        if stale {
            let scaler = ScalingContext::get(
                to_ffmpeg_pixel(format),
                width,
                height,
                ENCODER_PIXEL,
                self.width,
                self.height,
                ScalingFlags::BILINEAR,
            )
            .map_err(|e| FlowMotionError::CannotAttachInput(format!("cannot create scaler: {e}")))?;
            self.scaler = Some((format, width, height, scaler));
        }
        match &mut self.scaler {
            Some((_, _, _, scaler)) => Ok(scaler),
            None => Err(FlowMotionError::CannotAttachInput("scaler unavailable".to_string())),
        }
    }

    /// Move every packet the encoder has ready into the container.
    ///
    /// Returns once the encoder asks for more input or reports end of
    /// stream.
    fn drain_packets(&mut self) -> Result<(), FfmpegError> {
        let mut packet = Packet::empty();
        loop {
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    packet.set_stream(self.stream_index);
                    packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
                    packet.write_interleaved(&mut self.output)?;
                }
                Err(FfmpegError::Other { errno }) if errno == EAGAIN => return Ok(()),
                Err(FfmpegError::Eof) => return Ok(()),
                Err(error) => return Err(error),
            }
        }
    }
}

impl SampleWriter for FfmpegWriter {
    type Sample = VideoFrame;

    fn prepare(&mut self, frame: &Frame) -> Result<VideoFrame, FlowMotionError> {
        let source = frame_to_video_frame(frame);
        let scaler = self.scaler_for(frame.format(), frame.width(), frame.height())?;
        let mut converted = VideoFrame::empty();
        scaler
            .run(&source, &mut converted)
            .map_err(|e| FlowMotionError::CannotAttachInput(format!("scaling failed: {e}")))?;
        Ok(converted)
    }

    fn wait_ready(&mut self) -> Result<(), FlowMotionError> {
        self.drain_packets()
            .map_err(|e| FlowMotionError::FfmpegError(format!("write packet failed: {e}")))
    }

    fn append(&mut self, sample: &mut VideoFrame, pts: i64) -> Result<(), FlowMotionError> {
        sample.set_pts(Some(pts));
        match self.encoder.send_frame(sample) {
            Err(FfmpegError::Other { errno }) if errno == EAGAIN => {
                self.drain_packets()?;
                self.encoder.send_frame(sample)?;
            }
            result => result?,
        }
        self.drain_packets()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), FlowMotionError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.encoder
            .send_eof()
            .map_err(|e| FlowMotionError::Finalize(format!("send_eof failed: {e}")))?;
        self.drain_packets()
            .map_err(|e| FlowMotionError::Finalize(format!("write flush packet failed: {e}")))?;
        self.output
            .write_trailer()
            .map_err(|e| FlowMotionError::Finalize(format!("cannot write trailer: {e}")))?;

        log::info!("Finalized {}", self.path.display());
        Ok(())
    }

    fn discard(&mut self) {
        // Nothing more is written; the sink removes the partial file.
        self.finished = true;
        log::debug!("Discarded writer for {}", self.path.display());
    }
}
