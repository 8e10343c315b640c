//! Helpers shared by the integration tests.
//!
//! Video fixtures are generated on the fly with the crate's own encoder
//! (MPEG-4 Part 2, which every FFmpeg build ships). Tests that need one
//! return early when the encoder is unavailable.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use flowmotion::{
    ErrorPolicy, FlowMotionError, Frame, FramePixelFormat, FrameProducer, FrameSink,
    PresentationTime,
    SampleWriter, SinkOptions, TrackDescriptor, VideoCodec,
};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;
pub const FPS: f64 = 10.0;

/// Deterministic 8-bit noise.
pub fn noise(width: u32, height: u32, seed: u32) -> Vec<u8> {
    (0..width * height)
        .map(|i| {
            let mut v = i.wrapping_mul(2_654_435_761) ^ seed.wrapping_mul(0x9e37_79b9);
            v ^= v >> 15;
            v = v.wrapping_mul(0x2c1b_3c6d);
            v ^= v >> 12;
            (v >> 24) as u8
        })
        .collect()
}

/// Move the content of `data` by `(dx, dy)`. Uncovered pixels wrap around.
pub fn shifted(data: &[u8], width: u32, height: u32, dx: i32, dy: i32) -> Vec<u8> {
    let (w, h) = (width as i32, height as i32);
    let mut out = vec![0; data.len()];
    for y in 0..h {
        for x in 0..w {
            let sx = (x - dx).rem_euclid(w);
            let sy = (y - dy).rem_euclid(h);
            out[(y * w + x) as usize] = data[(sy * w + sx) as usize];
        }
    }
    out
}

pub fn gray_frame(data: Vec<u8>, index: u64) -> Frame {
    Frame::from_gray(WIDTH, HEIGHT, data, PresentationTime::new(index, FPS))
        .expect("valid gray frame")
}

/// `count` frames of noise drifting right by one pixel per frame.
pub fn drifting_frames(count: u64) -> Vec<Frame> {
    let base = noise(WIDTH, HEIGHT, 7);
    (0..count)
        .map(|index| gray_frame(shifted(&base, WIDTH, HEIGHT, index as i32, 0), index))
        .collect()
}

pub fn descriptor(frame_count: u64) -> TrackDescriptor {
    TrackDescriptor {
        width: WIDTH,
        height: HEIGHT,
        frames_per_second: FPS,
        duration: Duration::from_secs_f64(frame_count as f64 / FPS),
        frame_count,
        codec: "rawvideo".to_string(),
        pixel_format_name: Some("gray".to_string()),
        stream_index: 0,
    }
}

/// An in-memory frame source.
pub struct VecProducer {
    descriptor: TrackDescriptor,
    frames: VecDeque<Frame>,
    pub pulled: u64,
}

impl VecProducer {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            descriptor: descriptor(frames.len() as u64),
            frames: frames.into(),
            pulled: 0,
        }
    }
}

impl FrameProducer for VecProducer {
    fn descriptor(&self) -> &TrackDescriptor {
        &self.descriptor
    }

    fn next_frame(&mut self) -> Option<Frame> {
        let frame = self.frames.pop_front()?;
        self.pulled += 1;
        Some(frame)
    }
}

/// A writer that records what it is given and fails on request.
#[derive(Debug, Default)]
pub struct RecordingWriter {
    pub prepared: Vec<u64>,
    pub formats: Vec<FramePixelFormat>,
    pub appended: Vec<i64>,
    pub attempts: u64,
    /// Attempt numbers (zero-based) that fail.
    pub failing_attempts: HashSet<u64>,
    pub fail_prepare: bool,
    pub fail_finish: bool,
    pub finished: bool,
    pub discarded: bool,
}

impl RecordingWriter {
    pub fn failing_on(attempts: impl IntoIterator<Item = u64>) -> Self {
        Self {
            failing_attempts: attempts.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl SampleWriter for RecordingWriter {
    type Sample = u64;

    fn prepare(&mut self, frame: &Frame) -> Result<u64, FlowMotionError> {
        if self.fail_prepare {
            return Err(FlowMotionError::CannotAttachInput("prepare refused".to_string()));
        }
        self.prepared.push(frame.time().index);
        self.formats.push(frame.format());
        Ok(frame.time().index)
    }

    fn wait_ready(&mut self) -> Result<(), FlowMotionError> {
        Ok(())
    }

    fn append(&mut self, _sample: &mut u64, pts: i64) -> Result<(), FlowMotionError> {
        let attempt = self.attempts;
        self.attempts += 1;
        if self.failing_attempts.contains(&attempt) {
            return Err(FlowMotionError::FfmpegError(format!("append {attempt} refused")));
        }
        self.appended.push(pts);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), FlowMotionError> {
        if self.fail_finish {
            return Err(FlowMotionError::FfmpegError("trailer refused".to_string()));
        }
        self.finished = true;
        Ok(())
    }

    fn discard(&mut self) {
        self.discarded = true;
    }
}

/// Sink options that put exactly `slots` samples per written frame.
pub fn sink_options(slots: u32) -> SinkOptions {
    SinkOptions::new()
        .with_frame_rate(10)
        .with_hold_duration(Duration::from_millis(100 * slots as u64))
        .with_resolution(WIDTH, HEIGHT)
}

/// Encode `count` drifting noise frames into `directory/input.mp4`.
///
/// Returns `None` when the MPEG-4 encoder is not available.
pub fn write_fixture_video(directory: &Path, count: u64) -> Option<PathBuf> {
    let path = directory.join("input.mp4");
    let options = sink_options(1).with_codec(VideoCodec::Mpeg4).with_crf(None);

    let mut sink = match FrameSink::start(&path, &options, ErrorPolicy::Abort) {
        Ok(sink) => sink,
        Err(error) => {
            eprintln!("Skipping: MPEG-4 encoder not available ({error})");
            return None;
        }
    };
    for frame in drifting_frames(count) {
        sink.write(&frame).expect("write fixture frame");
    }
    sink.finish().expect("finish fixture");
    Some(path)
}
