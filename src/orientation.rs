//! Orientation hints for motion estimation.
//!
//! Frames are rotated or mirrored to their upright presentation before flow
//! is computed, so that "up" means the same thing for every pair. The
//! orientation for a frame comes from an [`OrientationProvider`]. The
//! pipeline requires one explicitly and never falls back to a default
//! transform.
//!
//! [`Orientation`] follows the EXIF orientation codes 1–8.
//!
//! # Example
//!
//! ```no_run
//! use flowmotion::{Orientation, OrientationTrack};
//!
//! // Every frame is upright.
//! let fixed = Orientation::Up;
//!
//! // Per-frame values recorded alongside the video.
//! let track = OrientationTrack::from_csv_path("orientation.csv")?;
//! # Ok::<(), flowmotion::FlowMotionError>(())
//! ```

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;
use std::str::FromStr;

use crate::error::FlowMotionError;
use crate::frame::{LumaPlane, PresentationTime};

/// Transform that brings a stored image to its upright presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// EXIF 1: already upright.
    Up,
    /// EXIF 2: mirrored horizontally.
    UpMirrored,
    /// EXIF 3: rotated 180°.
    Down,
    /// EXIF 4: mirrored vertically.
    DownMirrored,
    /// EXIF 5: mirrored across the main diagonal.
    LeftMirrored,
    /// EXIF 6: needs a 90° clockwise rotation.
    Right,
    /// EXIF 7: mirrored across the anti-diagonal.
    RightMirrored,
    /// EXIF 8: needs a 90° counter-clockwise rotation.
    Left,
}

impl Orientation {
    /// All orientations in EXIF order.
    pub const ALL: [Orientation; 8] = [
        Orientation::Up,
        Orientation::UpMirrored,
        Orientation::Down,
        Orientation::DownMirrored,
        Orientation::LeftMirrored,
        Orientation::Right,
        Orientation::RightMirrored,
        Orientation::Left,
    ];

    /// Map an EXIF orientation code (1–8).
    pub fn from_exif(code: u8) -> Option<Self> {
        code.checked_sub(1)
            .and_then(|index| Self::ALL.get(index as usize).copied())
    }

    /// EXIF orientation code (1–8).
    pub fn exif_code(self) -> u8 {
        match self {
            Orientation::Up => 1,
            Orientation::UpMirrored => 2,
            Orientation::Down => 3,
            Orientation::DownMirrored => 4,
            Orientation::LeftMirrored => 5,
            Orientation::Right => 6,
            Orientation::RightMirrored => 7,
            Orientation::Left => 8,
        }
    }

    /// Whether applying this orientation swaps width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Orientation::LeftMirrored
                | Orientation::Right
                | Orientation::RightMirrored
                | Orientation::Left
        )
    }

    /// Dimensions of a `width` x `height` image after this orientation.
    pub fn oriented_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Return the upright version of `plane`.
    pub fn apply(self, plane: &LumaPlane) -> LumaPlane {
        if self == Orientation::Up {
            return plane.clone();
        }

        let (width, height) = plane.dimensions();
        let (out_width, out_height) = self.oriented_dimensions(width, height);
        let mut data = Vec::with_capacity(plane.data().len());

        for oy in 0..out_height {
            for ox in 0..out_width {
                let (sx, sy) = match self {
                    Orientation::Up => (ox, oy),
                    Orientation::UpMirrored => (width - 1 - ox, oy),
                    Orientation::Down => (width - 1 - ox, height - 1 - oy),
                    Orientation::DownMirrored => (ox, height - 1 - oy),
                    Orientation::LeftMirrored => (oy, ox),
                    Orientation::Right => (oy, height - 1 - ox),
                    Orientation::RightMirrored => (width - 1 - oy, height - 1 - ox),
                    Orientation::Left => (width - 1 - oy, ox),
                };
                data.push(plane.at(sx, sy));
            }
        }

        LumaPlane::from_samples(out_width, out_height, data)
    }
}

impl Display for Orientation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Orientation::Up => "up",
            Orientation::UpMirrored => "up-mirrored",
            Orientation::Down => "down",
            Orientation::DownMirrored => "down-mirrored",
            Orientation::LeftMirrored => "left-mirrored",
            Orientation::Right => "right",
            Orientation::RightMirrored => "right-mirrored",
            Orientation::Left => "left",
        };
        f.write_str(name)
    }
}

impl FromStr for Orientation {
    type Err = FlowMotionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        if let Ok(code) = normalized.parse::<u8>() {
            return Orientation::from_exif(code).ok_or_else(|| {
                FlowMotionError::Orientation(format!("EXIF code {code} is outside 1-8"))
            });
        }
        Orientation::ALL
            .into_iter()
            .find(|orientation| orientation.to_string() == normalized)
            .ok_or_else(|| FlowMotionError::Orientation(format!("unknown orientation: {value}")))
    }
}

/// Source of per-frame orientation.
///
/// Implementations must be [`Send`] and [`Sync`] because a pipeline may run
/// on a blocking worker thread.
pub trait OrientationProvider: Send + Sync {
    /// Orientation of the frame presented at `time`.
    fn orientation_at(&self, time: &PresentationTime) -> Result<Orientation, FlowMotionError>;
}

/// A fixed orientation applies to every frame.
impl OrientationProvider for Orientation {
    fn orientation_at(&self, _time: &PresentationTime) -> Result<Orientation, FlowMotionError> {
        Ok(*self)
    }
}

/// Per-frame orientations indexed by frame number.
///
/// Loaded from a CSV file with `frame_index,orientation` rows. The
/// orientation column accepts names (`up`, `right-mirrored`, ...) or EXIF
/// codes. Blank lines, `#` comments and a non-numeric header row are
/// ignored. Frame indices may be sparse; later rows override earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrientationTrack {
    entries: BTreeMap<u64, Orientation>,
}

impl OrientationTrack {
    /// Build a track where entry `i` is the orientation of frame `i`.
    pub fn new(orientations: Vec<Orientation>) -> Self {
        Self {
            entries: (0u64..).zip(orientations).collect(),
        }
    }

    /// Read and parse a CSV orientation file.
    ///
    /// # Errors
    ///
    /// Returns [`FlowMotionError::IoError`] if the file cannot be read, or
    /// [`FlowMotionError::Orientation`] for malformed rows.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, FlowMotionError> {
        let path = path.as_ref();
        log::debug!("Loading orientation track from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::parse_csv(&contents)
    }

    /// Parse CSV text with `frame_index,orientation` rows.
    pub fn parse_csv(contents: &str) -> Result<Self, FlowMotionError> {
        let mut entries = BTreeMap::new();
        let mut first_row = true;

        for (line_number, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let is_first_row = std::mem::replace(&mut first_row, false);
            let mut fields = line.split(',').map(str::trim);
            let (Some(index_field), Some(orientation_field)) = (fields.next(), fields.next())
            else {
                return Err(FlowMotionError::Orientation(format!(
                    "line {}: expected `frame_index,orientation`",
                    line_number + 1
                )));
            };

            let Ok(frame_index) = index_field.parse::<u64>() else {
                if is_first_row {
                    continue;
                }
                return Err(FlowMotionError::Orientation(format!(
                    "line {}: invalid frame index `{index_field}`",
                    line_number + 1
                )));
            };

            let orientation = orientation_field.parse::<Orientation>().map_err(|error| {
                FlowMotionError::Orientation(format!("line {}: {error}", line_number + 1))
            })?;

            entries.insert(frame_index, orientation);
        }

        log::debug!("Parsed orientation track with {} entries", entries.len());
        Ok(Self { entries })
    }

    /// Number of frames with a recorded orientation.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the track holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Orientation recorded for frame `index`.
    pub fn get(&self, index: u64) -> Option<Orientation> {
        self.entries.get(&index).copied()
    }
}

impl OrientationProvider for OrientationTrack {
    fn orientation_at(&self, time: &PresentationTime) -> Result<Orientation, FlowMotionError> {
        self.get(time.index).ok_or_else(|| {
            FlowMotionError::Orientation(format!("no orientation recorded for frame {}", time.index))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_plane(width: u32, height: u32) -> LumaPlane {
        let data = (0..width * height).map(|value| value as f32).collect();
        LumaPlane::new(width, height, data).unwrap()
    }

    #[test]
    fn right_rotates_clockwise() {
        // 0 1 2
        // 3 4 5
        let plane = numbered_plane(3, 2);
        let rotated = Orientation::Right.apply(&plane);
        assert_eq!(rotated.dimensions(), (2, 3));
        // 3 0
        // 4 1
        // 5 2
        assert_eq!(rotated.data(), &[3.0, 0.0, 4.0, 1.0, 5.0, 2.0]);
    }

    #[test]
    fn left_undoes_right() {
        let plane = numbered_plane(4, 3);
        let round_trip = Orientation::Left.apply(&Orientation::Right.apply(&plane));
        assert_eq!(round_trip, plane);
    }

    #[test]
    fn mirrors_are_involutions() {
        let plane = numbered_plane(5, 2);
        for orientation in [
            Orientation::UpMirrored,
            Orientation::Down,
            Orientation::DownMirrored,
            Orientation::LeftMirrored,
            Orientation::RightMirrored,
        ] {
            assert_eq!(orientation.apply(&orientation.apply(&plane)), plane, "{orientation}");
        }
    }
}
