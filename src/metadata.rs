//! Video track metadata.
//!
//! [`TrackDescriptor`] is resolved once when a [`VideoHandle`](crate::VideoHandle)
//! is opened and stays fixed for the lifetime of the handle and any reader
//! started from it.

use std::time::Duration;

/// Metadata for the selected video track.
///
/// # Example
///
/// ```no_run
/// use flowmotion::VideoHandle;
///
/// let handle = VideoHandle::open("input.mp4")?;
/// let track = handle.descriptor();
/// println!("{}x{} @ {:.2} fps", track.width, track.height, track.frames_per_second);
/// # Ok::<(), flowmotion::FlowMotionError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct TrackDescriptor {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Nominal frames per second (may be approximate for variable-frame-rate content).
    pub frames_per_second: f64,
    /// Track duration. Zero when the container does not report one.
    pub duration: Duration,
    /// Estimated total number of frames, computed from duration and frame rate.
    pub frame_count: u64,
    /// Codec name (e.g. `"h264"`, `"hevc"`).
    pub codec: String,
    /// Source pixel format as reported by the decoder, if known.
    pub pixel_format_name: Option<String>,
    /// Index of the track inside the container.
    pub stream_index: usize,
}

impl TrackDescriptor {
    /// Render as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "width": self.width,
            "height": self.height,
            "frames_per_second": self.frames_per_second,
            "duration_seconds": self.duration.as_secs_f64(),
            "frame_count": self.frame_count,
            "codec": self.codec,
            "pixel_format": self.pixel_format_name,
            "stream_index": self.stream_index,
        })
    }
}
