//! Pre-flight validation.
//!
//! [`validate_run`] inspects a track descriptor together with the pipeline
//! options and returns a [`ValidationReport`] describing anything that
//! would make the run fail or produce poor output.
//!
//! # Example
//!
//! ```no_run
//! use flowmotion::{PipelineOptions, VideoHandle, validate_run};
//!
//! let handle = VideoHandle::open("input.mp4")?;
//! let report = validate_run(handle.descriptor(), &PipelineOptions::new());
//! if !report.is_valid() {
//!     eprintln!("{report}");
//! }
//! # Ok::<(), flowmotion::FlowMotionError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

use crate::configuration::PipelineOptions;
use crate::metadata::TrackDescriptor;

/// Summary of pre-flight checks.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Informational notices (not problems).
    pub info: Vec<String>,
    /// Non-fatal issues that may affect the output.
    pub warnings: Vec<String>,
    /// Fatal issues that will prevent the run.
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Returns `true` if no errors were found. Warnings do not count.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Total number of issues (info + warnings + errors).
    pub fn issue_count(&self) -> usize {
        self.info.len() + self.warnings.len() + self.errors.len()
    }
}

impl Display for ValidationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for item in &self.info {
            writeln!(f, "[INFO] {item}")?;
        }
        for item in &self.warnings {
            writeln!(f, "[WARN] {item}")?;
        }
        for item in &self.errors {
            writeln!(f, "[ERROR] {item}")?;
        }
        if self.issue_count() == 0 {
            writeln!(f, "No issues found.")?;
        }
        Ok(())
    }
}

/// Check a track and the options a run would use on it.
pub fn validate_run(track: &TrackDescriptor, options: &PipelineOptions) -> ValidationReport {
    let mut report = ValidationReport::default();

    if track.width == 0 || track.height == 0 {
        report.errors.push(format!(
            "Invalid video dimensions: {}×{}",
            track.width, track.height,
        ));
    }

    if track.frames_per_second <= 0.0 {
        report.warnings.push(
            "Video frame rate is zero or negative, presentation times will all be zero".to_string(),
        );
    } else if track.frames_per_second > 240.0 {
        report.warnings.push(format!(
            "Unusually high frame rate ({:.1} fps), flow estimation may be slow",
            track.frames_per_second,
        ));
    }

    if track.duration == Duration::ZERO {
        report
            .warnings
            .push("Track duration is unknown, progress cannot be estimated".to_string());
    }

    if track.frame_count == 1 {
        report
            .info
            .push("Track holds a single frame, no flow will be computed".to_string());
    }

    report.info.push(format!(
        "Video: {} {}×{} @ {:.2} fps, ~{} frames",
        track.codec, track.width, track.height, track.frames_per_second, track.frame_count,
    ));

    if let Some(limit) = options.max_frames_to_process {
        if limit < 2 {
            report.warnings.push(format!(
                "Frame limit {limit} allows no frame pairs, no flow will be computed"
            ));
        } else {
            report.info.push(format!("Processing at most {limit} frames"));
        }
    }

    if options.write_video {
        let sink = &options.sink;
        if sink.width == 0 || sink.height == 0 {
            report.errors.push(format!(
                "Invalid output resolution: {}×{}",
                sink.width, sink.height,
            ));
        } else if sink.width % 2 != 0 || sink.height % 2 != 0 {
            report.warnings.push(format!(
                "Output resolution {}×{} is odd, 4:2:0 encoders may reject it",
                sink.width, sink.height,
            ));
        }

        if let Some(crf) = sink.crf
            && crf > 51
        {
            report
                .errors
                .push(format!("CRF {crf} is outside the valid range 0-51"));
        }

        report.info.push(format!(
            "Output: {:?} {}×{} @ {} fps, {} samples per frame",
            sink.codec,
            sink.width,
            sink.height,
            sink.frame_rate,
            sink.slots_per_write(),
        ));
    }

    report
}
