//! Dense motion fields.
//!
//! A [`FlowField`] stores one `(dx, dy)` displacement per pixel of the
//! `current` frame: the content at `(x, y)` in `current` came from
//! `(x - dx, y - dy)` in `previous`. Fields are immutable once built.

use image::{Rgb, RgbImage};

use crate::error::FlowError;
use crate::frame::{Frame, PresentationTime};

/// Per-pixel 2-D displacement vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    width: u32,
    height: u32,
    vectors: Vec<[f32; 2]>,
}

impl FlowField {
    /// Wrap row-major `(dx, dy)` vectors.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::MalformedBuffer`] if `vectors` does not hold
    /// exactly `width * height` entries.
    pub fn new(width: u32, height: u32, vectors: Vec<[f32; 2]>) -> Result<Self, FlowError> {
        let expected = width as usize * height as usize;
        if vectors.len() != expected {
            return Err(FlowError::MalformedBuffer(format!(
                "flow field {width}x{height} needs {expected} vectors, got {}",
                vectors.len()
            )));
        }
        Ok(Self {
            width,
            height,
            vectors,
        })
    }

    /// A field with no motion anywhere.
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            vectors: vec![[0.0, 0.0]; width as usize * height as usize],
        }
    }

    /// Field width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Field height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Row-major vectors.
    pub fn vectors(&self) -> &[[f32; 2]] {
        &self.vectors
    }

    /// Displacement at `(x, y)`, or `None` when out of bounds.
    pub fn get(&self, x: u32, y: u32) -> Option<(f32, f32)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let [dx, dy] = self.vectors[y as usize * self.width as usize + x as usize];
        Some((dx, dy))
    }

    /// Length of the displacement at `(x, y)`.
    pub fn magnitude_at(&self, x: u32, y: u32) -> Option<f32> {
        self.get(x, y).map(|(dx, dy)| dx.hypot(dy))
    }

    /// Average displacement over the whole field.
    pub fn mean_motion(&self) -> (f32, f32) {
        if self.vectors.is_empty() {
            return (0.0, 0.0);
        }
        let (sum_x, sum_y) = self
            .vectors
            .iter()
            .fold((0.0f64, 0.0f64), |(sx, sy), [dx, dy]| {
                (sx + *dx as f64, sy + *dy as f64)
            });
        let count = self.vectors.len() as f64;
        ((sum_x / count) as f32, (sum_y / count) as f32)
    }

    /// Largest displacement length in the field.
    pub fn max_magnitude(&self) -> f32 {
        self.vectors
            .iter()
            .map(|[dx, dy]| dx.hypot(*dy))
            .fold(0.0, f32::max)
    }

    /// Returns `true` if no vector is longer than `threshold`.
    pub fn is_static(&self, threshold: f32) -> bool {
        self.max_magnitude() <= threshold
    }

    /// Colour-wheel rendering: hue encodes direction, brightness encodes
    /// length relative to the longest vector. Still pixels are black.
    pub fn to_rgb_image(&self) -> RgbImage {
        let max = self.max_magnitude();
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let [dx, dy] = self.vectors[y as usize * self.width as usize + x as usize];
            if max <= f32::EPSILON {
                return Rgb([0, 0, 0]);
            }
            let hue = (dy.atan2(dx).to_degrees() + 360.0) % 360.0;
            let value = (dx.hypot(dy) / max).clamp(0.0, 1.0);
            Rgb(hsv_to_rgb(hue, 1.0, value))
        })
    }

    /// The colour-wheel rendering as an RGB [`Frame`] stamped with `time`,
    /// ready to hand to a [`FrameSink`](crate::FrameSink).
    pub fn to_frame(&self, time: PresentationTime) -> Frame {
        Frame::from_rgb_image(self.to_rgb_image(), time)
    }
}

fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> [u8; 3] {
    let chroma = value * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = value - chroma;
    let to_byte = |channel: f32| ((channel + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_byte(r), to_byte(g), to_byte(b)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_checks_vector_count() {
        assert!(FlowField::new(2, 2, vec![[0.0, 0.0]; 3]).is_err());
        assert!(FlowField::new(2, 2, vec![[0.0, 0.0]; 4]).is_ok());
    }

    #[test]
    fn statistics() {
        let field = FlowField::new(2, 1, vec![[3.0, 4.0], [1.0, 0.0]]).unwrap();
        assert_eq!(field.max_magnitude(), 5.0);
        assert_eq!(field.mean_motion(), (2.0, 2.0));
        assert_eq!(field.magnitude_at(0, 0), Some(5.0));
        assert_eq!(field.get(2, 0), None);
        assert!(!field.is_static(1.0));
        assert!(FlowField::zeros(4, 4).is_static(0.0));
    }

    #[test]
    fn still_field_renders_black() {
        let image = FlowField::zeros(3, 2).to_rgb_image();
        assert!(image.pixels().all(|pixel| pixel.0 == [0, 0, 0]));
    }

    #[test]
    fn rightward_motion_renders_red() {
        let field = FlowField::new(1, 1, vec![[2.0, 0.0]]).unwrap();
        assert_eq!(field.to_rgb_image().get_pixel(0, 0).0, [255, 0, 0]);
    }
}
