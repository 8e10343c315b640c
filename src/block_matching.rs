//! Dense block-matching flow.
//!
//! The reference [`FlowAlgorithm`]: the current frame is tiled into square
//! blocks, each block is searched for within a window of the previous frame
//! by mean absolute difference, and every pixel of the block receives the
//! winning displacement. A small penalty on vector length makes flat or
//! unchanged regions settle on zero motion instead of an arbitrary match.

use crate::error::FlowError;
use crate::flow::FlowField;
use crate::frame::LumaPlane;
use crate::motion::FlowAlgorithm;

const MIN_BLOCK_SIZE: u32 = 2;

/// Exhaustive SAD block matching.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockMatching {
    block_size: u32,
    search_range: u32,
    motion_penalty: f32,
}

impl Default for BlockMatching {
    fn default() -> Self {
        Self {
            block_size: 8,
            search_range: 4,
            motion_penalty: 0.01,
        }
    }
}

impl BlockMatching {
    /// Create a matcher with default settings (8 px blocks, ±4 px search).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block edge length in pixels (minimum 2).
    #[must_use]
    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size.max(MIN_BLOCK_SIZE);
        self
    }

    /// Set the maximum displacement searched in each direction.
    #[must_use]
    pub fn with_search_range(mut self, search_range: u32) -> Self {
        self.search_range = search_range;
        self
    }

    /// Set the per-pixel-of-distance cost added to each candidate.
    #[must_use]
    pub fn with_motion_penalty(mut self, motion_penalty: f32) -> Self {
        self.motion_penalty = motion_penalty.max(0.0);
        self
    }

    /// Block edge length in pixels.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Maximum displacement searched in each direction.
    pub fn search_range(&self) -> u32 {
        self.search_range
    }

    /// Best displacement for the block whose top-left corner is `(block_x, block_y)`.
    fn search_block(
        &self,
        previous: &LumaPlane,
        current: &LumaPlane,
        block_x: u32,
        block_y: u32,
    ) -> [f32; 2] {
        let (width, height) = current.dimensions();
        let block_width = self.block_size.min(width - block_x);
        let block_height = self.block_size.min(height - block_y);
        let pixel_count = (block_width * block_height) as f32;
        let range = self.search_range as i64;

        let mut best_cost = f32::MAX;
        let mut best = [0.0, 0.0];

        for dy in -range..=range {
            for dx in -range..=range {
                // Content now at (block_x, block_y) came from (block_x - dx, block_y - dy).
                let source_x = block_x as i64 - dx;
                let source_y = block_y as i64 - dy;
                if source_x < 0
                    || source_y < 0
                    || source_x + block_width as i64 > width as i64
                    || source_y + block_height as i64 > height as i64
                {
                    continue;
                }

                let mut sad = 0.0f32;
                for row in 0..block_height {
                    for column in 0..block_width {
                        let now = current.at(block_x + column, block_y + row);
                        let before =
                            previous.at(source_x as u32 + column, source_y as u32 + row);
                        sad += (now - before).abs();
                    }
                }

                let distance = ((dx * dx + dy * dy) as f32).sqrt();
                let cost = sad / pixel_count + distance * self.motion_penalty;
                if cost < best_cost {
                    best_cost = cost;
                    best = [dx as f32, dy as f32];
                }
            }
        }

        best
    }

    fn block_row(&self, previous: &LumaPlane, current: &LumaPlane, block_row: u32) -> Vec<[f32; 2]> {
        let width = current.width();
        (0..width.div_ceil(self.block_size))
            .map(|block_column| {
                self.search_block(
                    previous,
                    current,
                    block_column * self.block_size,
                    block_row * self.block_size,
                )
            })
            .collect()
    }
}

impl FlowAlgorithm for BlockMatching {
    fn name(&self) -> &str {
        "block-matching"
    }

    fn compute(&self, previous: &LumaPlane, current: &LumaPlane) -> Result<FlowField, FlowError> {
        let (width, height) = current.dimensions();
        if previous.dimensions() != (width, height) {
            return Err(FlowError::DimensionMismatch {
                expected_width: width,
                expected_height: height,
                actual_width: previous.width(),
                actual_height: previous.height(),
            });
        }
        if width == 0 || height == 0 {
            return Err(FlowError::MalformedBuffer("empty luma plane".to_string()));
        }

        let block_rows = height.div_ceil(self.block_size);

        #[cfg(feature = "rayon")]
        let blocks: Vec<Vec<[f32; 2]>> = {
            use rayon::prelude::*;
            (0..block_rows)
                .into_par_iter()
                .map(|row| self.block_row(previous, current, row))
                .collect()
        };

        #[cfg(not(feature = "rayon"))]
        let blocks: Vec<Vec<[f32; 2]>> = (0..block_rows)
            .map(|row| self.block_row(previous, current, row))
            .collect();

        let mut vectors = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            let row = &blocks[(y / self.block_size) as usize];
            for x in 0..width {
                vectors.push(row[(x / self.block_size) as usize]);
            }
        }

        FlowField::new(width, height, vectors)
    }
}
