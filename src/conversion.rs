//! Internal conversion helpers between FFmpeg frames and owned [`Frame`]s.
//!
//! FFmpeg planes carry per-row padding (stride); [`Frame`] planes are
//! tightly packed. These helpers strip or restore that padding.

use ffmpeg_next::{format::Pixel, frame::Video as VideoFrame};

use crate::error::FlowError;
use crate::frame::{Frame, FramePixelFormat, PresentationTime};

/// Map to the corresponding FFmpeg pixel format constant.
pub(crate) fn to_ffmpeg_pixel(format: FramePixelFormat) -> Pixel {
    match format {
        FramePixelFormat::Yuva444p16 => Pixel::YUVA444P16LE,
        FramePixelFormat::Yuv420p => Pixel::YUV420P,
        FramePixelFormat::Rgb24 => Pixel::RGB24,
        FramePixelFormat::Rgba => Pixel::RGBA,
        FramePixelFormat::Gray8 => Pixel::GRAY8,
    }
}

/// Map an FFmpeg pixel format back, if it is one a [`Frame`] can hold.
pub(crate) fn from_ffmpeg_pixel(pixel: Pixel) -> Option<FramePixelFormat> {
    match pixel {
        Pixel::YUVA444P16LE => Some(FramePixelFormat::Yuva444p16),
        Pixel::YUV420P => Some(FramePixelFormat::Yuv420p),
        Pixel::RGB24 => Some(FramePixelFormat::Rgb24),
        Pixel::RGBA => Some(FramePixelFormat::Rgba),
        Pixel::GRAY8 => Some(FramePixelFormat::Gray8),
        _ => None,
    }
}

/// Copy a converted FFmpeg frame into an owned [`Frame`].
///
/// `video_frame` must already be in `format`.
pub(crate) fn video_frame_to_frame(
    video_frame: &VideoFrame,
    format: FramePixelFormat,
    time: PresentationTime,
) -> Result<Frame, FlowError> {
    let width = video_frame.width();
    let height = video_frame.height();
    if width == 0 || height == 0 || video_frame.planes() == 0 {
        return Err(FlowError::MalformedBuffer("decoder produced an empty frame".to_string()));
    }
    if from_ffmpeg_pixel(video_frame.format()) != Some(format) {
        return Err(FlowError::MalformedBuffer(format!(
            "converted frame is {:?}, expected {}",
            video_frame.format(),
            format.name()
        )));
    }

    let layout = format.plane_layout(width, height);
    if video_frame.planes() < layout.len() {
        return Err(FlowError::MalformedBuffer(format!(
            "{} planes, {} expected",
            video_frame.planes(),
            layout.len()
        )));
    }
    let mut planes = Vec::with_capacity(layout.len());

    for (index, plane) in layout.iter().enumerate() {
        let stride = video_frame.stride(index);
        let data = video_frame.data(index);
        if stride < plane.row_bytes || data.len() < stride * (plane.rows - 1) + plane.row_bytes {
            return Err(FlowError::MalformedBuffer(format!(
                "plane {index} is shorter than {} rows of {} bytes",
                plane.rows, plane.row_bytes
            )));
        }

        if stride == plane.row_bytes {
            planes.push(data[..plane.row_bytes * plane.rows].to_vec());
        } else {
            let mut buffer = Vec::with_capacity(plane.row_bytes * plane.rows);
            for row in 0..plane.rows {
                let row_start = row * stride;
                buffer.extend_from_slice(&data[row_start..row_start + plane.row_bytes]);
            }
            planes.push(buffer);
        }
    }

    Frame::new(width, height, format, planes, time)
}

/// Copy an owned [`Frame`] into a freshly allocated FFmpeg frame of the
/// same format, honouring FFmpeg's stride.
pub(crate) fn frame_to_video_frame(frame: &Frame) -> VideoFrame {
    let format = frame.format();
    let (width, height) = frame.dimensions();
    let mut video_frame = VideoFrame::new(to_ffmpeg_pixel(format), width, height);

    for (index, plane) in format.plane_layout(width, height).iter().enumerate() {
        let Some(source) = frame.plane(index) else {
            break;
        };
        let stride = video_frame.stride(index);
        let destination = video_frame.data_mut(index);
        for row in 0..plane.rows {
            let source_start = row * plane.row_bytes;
            let destination_start = row * stride;
            destination[destination_start..destination_start + plane.row_bytes]
                .copy_from_slice(&source[source_start..source_start + plane.row_bytes]);
        }
    }

    video_frame
}
