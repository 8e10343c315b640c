//! Error handling integration tests.
//!
//! These tests verify that meaningful errors are returned for various
//! failure conditions.

use flowmotion::{FlowError, FlowMotionError, FramePixelFormat, VideoHandle};

#[test]
fn open_nonexistent_file() {
    let result = VideoHandle::open("this_file_does_not_exist.mp4");

    let error_message = result.unwrap_err().to_string();
    assert!(
        error_message.contains("Failed to open video file"),
        "Error message should mention file open failure: {error_message}",
    );
    assert!(error_message.contains("this_file_does_not_exist.mp4"));
}

#[test]
fn open_invalid_file() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let invalid_file_path = temporary_directory.path().join("invalid.mp4");
    std::fs::write(&invalid_file_path, b"this is not a media file")
        .expect("Failed to write invalid file");

    let result = VideoHandle::open(&invalid_file_path);
    assert!(result.is_err(), "Expected error for invalid media file");
}

#[test]
fn flow_errors_name_the_pair() {
    let error = FlowMotionError::FlowEstimation {
        previous: 4,
        current: 5,
        source: FlowError::FormatMismatch {
            previous: FramePixelFormat::Gray8,
            current: FramePixelFormat::Rgb24,
        },
    };
    let message = error.to_string();
    assert!(message.contains("frames 4 and 5"), "{message}");
    assert!(message.contains("Gray8"), "{message}");

    let source = std::error::Error::source(&error).expect("source");
    assert!(source.to_string().contains("pixel formats differ"));
}

#[test]
fn append_failures_carry_the_timestamp() {
    let error = FlowMotionError::AppendFailed {
        pts: 42,
        consecutive_failures: 3,
        reason: "encoder full".to_string(),
    };
    let message = error.to_string();
    assert!(message.contains("pts 42"), "{message}");
    assert!(message.contains("3 consecutive"), "{message}");
    assert!(message.contains("encoder full"), "{message}");
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read only");
    let error: FlowMotionError = io.into();
    assert!(matches!(error, FlowMotionError::IoError(_)));
    assert!(error.to_string().starts_with("I/O error"));
}
