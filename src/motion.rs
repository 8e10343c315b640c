//! Motion estimation between consecutive frames.
//!
//! [`MotionEstimator`] validates a frame pair, brings both frames upright
//! with the supplied [`Orientation`], and hands their luma planes to a
//! pluggable [`FlowAlgorithm`]. The algorithm is treated as a black box; the
//! crate ships [`BlockMatching`](crate::BlockMatching) as the default.
//!
//! # Example
//!
//! ```no_run
//! use flowmotion::{BlockMatching, Frame, MotionEstimator, Orientation, PresentationTime};
//!
//! # fn frames() -> (Frame, Frame) { unimplemented!() }
//! let (previous, current) = frames();
//! let estimator = MotionEstimator::new(BlockMatching::new().with_search_range(8));
//! let field = estimator.estimate(&previous, &current, Orientation::Up)?;
//! println!("mean motion: {:?}", field.mean_motion());
//! # Ok::<(), flowmotion::FlowError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::block_matching::BlockMatching;
use crate::error::FlowError;
use crate::flow::FlowField;
use crate::frame::{Frame, LumaPlane};
use crate::orientation::Orientation;

/// A dense optical-flow algorithm.
///
/// `compute` must return a field with the dimensions of `current`.
/// Implementations are shared across threads and must not expose mutable
/// state between calls.
pub trait FlowAlgorithm: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Displacement of every pixel of `current` relative to `previous`.
    fn compute(&self, previous: &LumaPlane, current: &LumaPlane) -> Result<FlowField, FlowError>;
}

/// Computes a [`FlowField`] for each frame pair.
///
/// Cloning is cheap: clones share the same algorithm instance.
#[derive(Clone)]
pub struct MotionEstimator {
    algorithm: Arc<dyn FlowAlgorithm>,
}

impl Debug for MotionEstimator {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MotionEstimator")
            .field("algorithm", &self.algorithm.name())
            .finish()
    }
}

impl Default for MotionEstimator {
    fn default() -> Self {
        Self::new(BlockMatching::default())
    }
}

impl MotionEstimator {
    /// Wrap a flow algorithm.
    pub fn new<A: FlowAlgorithm + 'static>(algorithm: A) -> Self {
        Self {
            algorithm: Arc::new(algorithm),
        }
    }

    /// Wrap an already shared flow algorithm.
    pub fn from_shared(algorithm: Arc<dyn FlowAlgorithm>) -> Self {
        Self { algorithm }
    }

    /// Name of the wrapped algorithm.
    pub fn algorithm_name(&self) -> &str {
        self.algorithm.name()
    }

    /// Compute the motion from `previous` (the image at t−1) into `current`
    /// (the image at t).
    ///
    /// `orientation` is applied to both frames before the algorithm runs, so
    /// the returned field has the dimensions of `current` as presented
    /// upright.
    ///
    /// # Errors
    ///
    /// - [`FlowError::FormatMismatch`] if the frames use different pixel formats.
    /// - [`FlowError::DimensionMismatch`] if their sizes differ, or the
    ///   algorithm returns a field of the wrong size.
    /// - [`FlowError::MalformedBuffer`] if either buffer is inconsistent.
    /// - Whatever the algorithm itself reports.
    pub fn estimate(
        &self,
        previous: &Frame,
        current: &Frame,
        orientation: Orientation,
    ) -> Result<FlowField, FlowError> {
        if previous.format() != current.format() {
            return Err(FlowError::FormatMismatch {
                previous: previous.format(),
                current: current.format(),
            });
        }
        if previous.dimensions() != current.dimensions() {
            return Err(FlowError::DimensionMismatch {
                expected_width: current.width(),
                expected_height: current.height(),
                actual_width: previous.width(),
                actual_height: previous.height(),
            });
        }
        previous.check_layout()?;
        current.check_layout()?;

        let previous_luma = orientation.apply(&previous.luma());
        let current_luma = orientation.apply(&current.luma());

        log::debug!(
            "Estimating flow {} -> {} with {} ({orientation})",
            previous.time().index,
            current.time().index,
            self.algorithm.name(),
        );

        let field = self.algorithm.compute(&previous_luma, &current_luma)?;

        let (expected_width, expected_height) = current_luma.dimensions();
        if field.dimensions() != (expected_width, expected_height) {
            return Err(FlowError::DimensionMismatch {
                expected_width,
                expected_height,
                actual_width: field.width(),
                actual_height: field.height(),
            });
        }

        Ok(field)
    }
}
