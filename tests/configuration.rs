//! Configuration integration tests.

use std::path::Path;
use std::time::Duration;

use flowmotion::{
    DEBUG_IMAGE_FILE_NAME, ErrorPolicy, FramePixelFormat, OUTPUT_FILE_NAME, OUTPUT_SUBDIRECTORY,
    PipelineOptions, SinkOptions, VideoCodec,
};

// ── SinkOptions ────────────────────────────────────────────────────

#[test]
fn sink_defaults() {
    let options = SinkOptions::default();
    assert_eq!(options.frame_rate, 30);
    assert_eq!(options.hold_duration, Duration::from_secs(1));
    assert_eq!(options.dimensions(), (1920, 1080));
    assert_eq!(options.codec, VideoCodec::H264);
    assert_eq!(options.crf, Some(23));
    assert_eq!(options.bitrate, None);
    assert_eq!(options.slots_per_write(), 30);
}

#[test]
fn slots_round_to_nearest() {
    let options = SinkOptions::new()
        .with_frame_rate(24)
        .with_hold_duration(Duration::from_millis(510));
    // 0.51 s × 24 fps = 12.24
    assert_eq!(options.slots_per_write(), 12);

    // 12.72
    let options = options.with_hold_duration(Duration::from_millis(530));
    assert_eq!(options.slots_per_write(), 13);
}

#[test]
fn short_holds_still_write_one_sample() {
    let options = SinkOptions::new().with_hold_duration(Duration::ZERO);
    assert_eq!(options.hold_duration, Duration::ZERO);
    assert_eq!(options.slots_per_write(), 1);

    // 0.01 s × 30 fps = 0.3
    let options = options.with_hold_duration(Duration::from_millis(10));
    assert_eq!(options.slots_per_write(), 1);
}

#[test]
fn zero_frame_rate_is_clamped() {
    let options = SinkOptions::new().with_frame_rate(0);
    assert_eq!(options.frame_rate, 1);
    assert_eq!(options.slots_per_write(), 1);
}

#[test]
fn sink_builders_chain() {
    let options = SinkOptions::new()
        .with_resolution(640, 480)
        .with_codec(VideoCodec::Mpeg4)
        .with_crf(None)
        .with_bitrate(2_000_000)
        .with_max_consecutive_append_failures(5);
    assert_eq!(options.dimensions(), (640, 480));
    assert_eq!(options.codec, VideoCodec::Mpeg4);
    assert_eq!(options.crf, None);
    assert_eq!(options.bitrate, Some(2_000_000));
    assert_eq!(options.max_consecutive_append_failures, 5);
}

// ── PipelineOptions ────────────────────────────────────────────────

#[test]
fn output_paths_derive_from_root() {
    let options = PipelineOptions::new().with_output_root("/tmp/flow-run");
    assert_eq!(options.output_root(), Path::new("/tmp/flow-run"));
    assert_eq!(
        options.output_directory(),
        Path::new("/tmp/flow-run").join(OUTPUT_SUBDIRECTORY)
    );
    assert_eq!(
        options.output_video_path(),
        Path::new("/tmp/flow-run")
            .join(OUTPUT_SUBDIRECTORY)
            .join(OUTPUT_FILE_NAME)
    );
    assert_eq!(
        options.debug_image_path(),
        Path::new("/tmp/flow-run").join(DEBUG_IMAGE_FILE_NAME)
    );
}

#[test]
fn demo_stops_after_two_frames() {
    assert_eq!(PipelineOptions::demo().max_frames_to_process(), Some(2));
    assert_eq!(PipelineOptions::new().max_frames_to_process(), None);
}

#[test]
fn pipeline_defaults() {
    let options = PipelineOptions::default();
    assert_eq!(options.error_policy(), ErrorPolicy::Abort);
    assert_eq!(options.decode_pixel_format(), FramePixelFormat::Yuva444p16);
    assert_eq!(options.sink().frame_rate, 30);
}

#[test]
fn pipeline_builders_chain() {
    let options = PipelineOptions::new()
        .with_error_policy(ErrorPolicy::SkipAndContinue)
        .with_decode_pixel_format(FramePixelFormat::Gray8)
        .with_max_frames(Some(10))
        .with_sink(SinkOptions::new().with_frame_rate(12));
    assert_eq!(options.error_policy(), ErrorPolicy::SkipAndContinue);
    assert_eq!(options.decode_pixel_format(), FramePixelFormat::Gray8);
    assert_eq!(options.max_frames_to_process(), Some(10));
    assert_eq!(options.sink().frame_rate, 12);
}

// ── Parsing ────────────────────────────────────────────────────────

#[test]
fn parse_error_policy() {
    assert_eq!("abort".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::Abort);
    assert_eq!("Skip".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::SkipAndContinue);
    assert_eq!(
        "skip-and-continue".parse::<ErrorPolicy>().unwrap(),
        ErrorPolicy::SkipAndContinue
    );
    assert!("retry".parse::<ErrorPolicy>().is_err());
}

#[test]
fn parse_video_codec() {
    assert_eq!("h264".parse::<VideoCodec>().unwrap(), VideoCodec::H264);
    assert_eq!("HEVC".parse::<VideoCodec>().unwrap(), VideoCodec::H265);
    assert_eq!("mpeg4".parse::<VideoCodec>().unwrap(), VideoCodec::Mpeg4);
    assert!("vp9".parse::<VideoCodec>().is_err());
}
