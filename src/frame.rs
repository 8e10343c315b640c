//! Decoded frames and the buffers derived from them.
//!
//! A [`Frame`] owns tightly packed pixel planes copied out of the decoder, so
//! it never aliases decoder memory and can be held across any number of
//! further pulls from the source. [`LumaPlane`] is the single-channel
//! intensity view that flow algorithms consume.

use std::time::Duration;

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};

use crate::error::FlowError;

/// Pixel layout of a decoded [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FramePixelFormat {
    /// Planar 4:4:4 Y, Cb, Cr, A at 16 bits per sample, little endian.
    /// This is the default decode format.
    #[default]
    Yuva444p16,
    /// Planar 4:2:0 Y, Cb, Cr at 8 bits per sample.
    Yuv420p,
    /// Packed 8-bit RGB.
    Rgb24,
    /// Packed 8-bit RGBA.
    Rgba,
    /// 8-bit grayscale.
    Gray8,
}

/// Byte layout of one plane: `rows` rows of exactly `row_bytes` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Bytes per row, without padding.
    pub row_bytes: usize,
    /// Number of rows.
    pub rows: usize,
}

impl FramePixelFormat {
    /// Plane layouts for a frame of the given size.
    pub fn plane_layout(self, width: u32, height: u32) -> Vec<PlaneLayout> {
        let width = width as usize;
        let height = height as usize;
        match self {
            FramePixelFormat::Yuva444p16 => vec![
                PlaneLayout {
                    row_bytes: width * 2,
                    rows: height,
                };
                4
            ],
            FramePixelFormat::Yuv420p => {
                let chroma = PlaneLayout {
                    row_bytes: width.div_ceil(2),
                    rows: height.div_ceil(2),
                };
                vec![
                    PlaneLayout {
                        row_bytes: width,
                        rows: height,
                    },
                    chroma,
                    chroma,
                ]
            }
            FramePixelFormat::Rgb24 => vec![PlaneLayout {
                row_bytes: width * 3,
                rows: height,
            }],
            FramePixelFormat::Rgba => vec![PlaneLayout {
                row_bytes: width * 4,
                rows: height,
            }],
            FramePixelFormat::Gray8 => vec![PlaneLayout {
                row_bytes: width,
                rows: height,
            }],
        }
    }

    /// Short lowercase name, as accepted by the CLI.
    pub fn name(self) -> &'static str {
        match self {
            FramePixelFormat::Yuva444p16 => "yuva444p16",
            FramePixelFormat::Yuv420p => "yuv420p",
            FramePixelFormat::Rgb24 => "rgb24",
            FramePixelFormat::Rgba => "rgba",
            FramePixelFormat::Gray8 => "gray8",
        }
    }
}

/// Rational presentation timestamp: frame index over frame rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresentationTime {
    /// Zero-based frame index.
    pub index: u64,
    /// Frames per second of the timeline the index belongs to.
    pub frames_per_second: f64,
}

impl PresentationTime {
    /// Create a timestamp for frame `index` at `frames_per_second`.
    pub fn new(index: u64, frames_per_second: f64) -> Self {
        Self {
            index,
            frames_per_second,
        }
    }

    /// Timestamp in seconds. Zero when the frame rate is unknown.
    pub fn as_secs_f64(&self) -> f64 {
        if self.frames_per_second > 0.0 {
            self.index as f64 / self.frames_per_second
        } else {
            0.0
        }
    }

    /// Timestamp as a [`Duration`].
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs_f64(self.as_secs_f64())
    }
}

/// One decoded image sample with its presentation time.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    format: FramePixelFormat,
    planes: Vec<Vec<u8>>,
    time: PresentationTime,
}

impl Frame {
    /// Build a frame from tightly packed planes.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::MalformedBuffer`] if the planes do not match the
    /// layout [`FramePixelFormat::plane_layout`] prescribes.
    pub fn new(
        width: u32,
        height: u32,
        format: FramePixelFormat,
        planes: Vec<Vec<u8>>,
        time: PresentationTime,
    ) -> Result<Self, FlowError> {
        let frame = Self {
            width,
            height,
            format,
            planes,
            time,
        };
        frame.check_layout()?;
        Ok(frame)
    }

    /// Build an 8-bit grayscale frame.
    pub fn from_gray(
        width: u32,
        height: u32,
        data: Vec<u8>,
        time: PresentationTime,
    ) -> Result<Self, FlowError> {
        Self::new(width, height, FramePixelFormat::Gray8, vec![data], time)
    }

    /// Build a packed RGB frame from an [`RgbImage`].
    pub fn from_rgb_image(image: RgbImage, time: PresentationTime) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            format: FramePixelFormat::Rgb24,
            planes: vec![image.into_raw()],
            time,
        }
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Pixel layout of the planes.
    pub fn format(&self) -> FramePixelFormat {
        self.format
    }

    /// Presentation time of this frame.
    pub fn time(&self) -> PresentationTime {
        self.time
    }

    /// Raw bytes of plane `index`, if present.
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        self.planes.get(index).map(Vec::as_slice)
    }

    /// Number of planes.
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Verify that every plane matches its expected size.
    pub fn check_layout(&self) -> Result<(), FlowError> {
        if self.width == 0 || self.height == 0 {
            return Err(FlowError::MalformedBuffer(format!(
                "frame {} has zero size",
                self.time.index
            )));
        }
        let layout = self.format.plane_layout(self.width, self.height);
        if layout.len() != self.planes.len() {
            return Err(FlowError::MalformedBuffer(format!(
                "{} expects {} planes, got {}",
                self.format.name(),
                layout.len(),
                self.planes.len()
            )));
        }
        for (index, (plane, expected)) in self.planes.iter().zip(&layout).enumerate() {
            let expected_len = expected.row_bytes * expected.rows;
            if plane.len() != expected_len {
                return Err(FlowError::MalformedBuffer(format!(
                    "plane {index} holds {} bytes, expected {expected_len}",
                    plane.len()
                )));
            }
        }
        Ok(())
    }

    /// Intensity of every pixel, normalised to `[0, 1]`.
    pub fn luma(&self) -> LumaPlane {
        let pixel_count = self.width as usize * self.height as usize;
        let data = match self.format {
            FramePixelFormat::Yuva444p16 => self.planes[0]
                .chunks_exact(2)
                .map(|sample| u16::from_le_bytes([sample[0], sample[1]]) as f32 / 65535.0)
                .collect(),
            FramePixelFormat::Yuv420p | FramePixelFormat::Gray8 => self.planes[0]
                [..pixel_count]
                .iter()
                .map(|&value| value as f32 / 255.0)
                .collect(),
            FramePixelFormat::Rgb24 => self.planes[0]
                .chunks_exact(3)
                .map(|rgb| rgb_to_luma(rgb[0], rgb[1], rgb[2]))
                .collect(),
            FramePixelFormat::Rgba => self.planes[0]
                .chunks_exact(4)
                .map(|rgba| rgb_to_luma(rgba[0], rgba[1], rgba[2]))
                .collect(),
        };
        LumaPlane {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Convert to an [`image::DynamicImage`] for saving or inspection.
    ///
    /// YUV formats are converted with BT.601 limited-range coefficients and
    /// their alpha plane is dropped.
    pub fn to_image(&self) -> DynamicImage {
        let (width, height) = (self.width, self.height);
        let image = match self.format {
            FramePixelFormat::Rgb24 => RgbImage::from_raw(width, height, self.planes[0].clone())
                .map(DynamicImage::ImageRgb8),
            FramePixelFormat::Rgba => RgbaImage::from_raw(width, height, self.planes[0].clone())
                .map(DynamicImage::ImageRgba8),
            FramePixelFormat::Gray8 => GrayImage::from_raw(width, height, self.planes[0].clone())
                .map(DynamicImage::ImageLuma8),
            FramePixelFormat::Yuv420p => {
                let chroma_width = (width as usize).div_ceil(2);
                Some(DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
                    let luma_index = y as usize * width as usize + x as usize;
                    let chroma_index = (y as usize / 2) * chroma_width + x as usize / 2;
                    image::Rgb(yuv_to_rgb(
                        self.planes[0][luma_index],
                        self.planes[1][chroma_index],
                        self.planes[2][chroma_index],
                    ))
                })))
            }
            FramePixelFormat::Yuva444p16 => {
                // The high byte of each little-endian sample is enough for 8-bit output.
                let high_byte = |plane: usize, index: usize| self.planes[plane][index * 2 + 1];
                Some(DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
                    let index = y as usize * width as usize + x as usize;
                    image::Rgb(yuv_to_rgb(
                        high_byte(0, index),
                        high_byte(1, index),
                        high_byte(2, index),
                    ))
                })))
            }
        };
        image.unwrap_or_else(|| DynamicImage::new_rgb8(width, height))
    }
}

fn rgb_to_luma(r: u8, g: u8, b: u8) -> f32 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) / 255.0
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = (y as f32 - 16.0) * 1.164;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let clamp = |value: f32| value.round().clamp(0.0, 255.0) as u8;
    [
        clamp(y + 1.596 * v),
        clamp(y - 0.392 * u - 0.813 * v),
        clamp(y + 2.017 * u),
    ]
}

/// Single-channel intensity grid in `[0, 1]`, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct LumaPlane {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl LumaPlane {
    /// Wrap row-major intensity samples.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::MalformedBuffer`] if `data` does not hold exactly
    /// `width * height` samples.
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self, FlowError> {
        if data.len() != width as usize * height as usize {
            return Err(FlowError::MalformedBuffer(format!(
                "luma plane {width}x{height} needs {} samples, got {}",
                width as usize * height as usize,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Caller guarantees `data.len() == width * height`.
    pub(crate) fn from_samples(width: u32, height: u32, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self {
            width,
            height,
            data,
        }
    }

    /// Width in samples.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in samples.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Row-major samples.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Sample at `(x, y)`. Callers must stay in bounds.
    #[inline]
    pub fn at(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }
}
