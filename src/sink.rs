//! Paced encoding of processed frames.
//!
//! A [`FrameSink`] holds one encode session. Each [`write`](FrameSink::write)
//! emits the same frame into `round(hold × frame_rate)` consecutive sample
//! slots, continuing a session-wide counter so presentation timestamps rise
//! by exactly one tick per successfully appended sample across all calls.
//!
//! The sink is generic over a [`SampleWriter`]; [`FfmpegWriter`] is the
//! production backend.
//!
//! # Example
//!
//! ```no_run
//! use flowmotion::{ErrorPolicy, FrameSink, SinkOptions};
//!
//! # fn frames() -> Vec<flowmotion::Frame> { Vec::new() }
//! let mut sink = FrameSink::start("out/output.mov", &SinkOptions::default(), ErrorPolicy::Abort)?;
//! for frame in frames() {
//!     sink.write(&frame)?;
//! }
//! sink.finish()?;
//! # Ok::<(), flowmotion::FlowMotionError>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::configuration::{ErrorPolicy, SinkOptions};
use crate::encode::FfmpegWriter;
use crate::error::FlowMotionError;
use crate::frame::Frame;

/// Backend that turns prepared samples into encoded output.
///
/// The sink calls [`prepare`](SampleWriter::prepare) once per written frame,
/// then [`wait_ready`](SampleWriter::wait_ready) followed by
/// [`append`](SampleWriter::append) once per slot. `wait_ready` must block
/// until the backend can accept a sample rather than report "not ready".
pub trait SampleWriter {
    /// A frame converted into whatever the backend consumes.
    type Sample;

    /// Convert `frame` for appending.
    fn prepare(&mut self, frame: &Frame) -> Result<Self::Sample, FlowMotionError>;

    /// Block until the backend can accept another sample.
    fn wait_ready(&mut self) -> Result<(), FlowMotionError>;

    /// Append `sample` at presentation time `pts` (in frame-rate ticks).
    fn append(&mut self, sample: &mut Self::Sample, pts: i64) -> Result<(), FlowMotionError>;

    /// Flush everything and close the output.
    fn finish(&mut self) -> Result<(), FlowMotionError>;

    /// Abandon the output without finalising it.
    fn discard(&mut self);
}

/// Lifecycle of an encode session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Started, nothing written yet.
    Idle,
    /// At least one write has been attempted.
    Writing,
    /// Finalised successfully.
    Finished,
    /// Aborted, discarded, or failed to finalise.
    Failed,
}

impl SessionStatus {
    fn name(self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Writing => "writing",
            SessionStatus::Finished => "finished",
            SessionStatus::Failed => "failed",
        }
    }
}

/// Outcome of one [`FrameSink::write`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    /// Samples appended by this call.
    pub appended: u64,
    /// Slots whose append failed and was skipped.
    pub failed: u64,
    /// PTS of the first sample appended by this call, if any.
    pub first_pts: Option<i64>,
    /// PTS of the last sample appended by this call, if any.
    pub last_pts: Option<i64>,
}

/// An encode session with fixed-rate pacing.
#[derive(Debug)]
pub struct FrameSink<W: SampleWriter = FfmpegWriter> {
    writer: Option<W>,
    output_path: Option<PathBuf>,
    frame_rate: u32,
    slots_per_write: u64,
    error_policy: ErrorPolicy,
    max_consecutive_failures: u32,
    appended: u64,
    failed: u64,
    consecutive_failures: u32,
    status: SessionStatus,
}

impl FrameSink<FfmpegWriter> {
    /// Reset the output directory and open an FFmpeg writer at
    /// `output_path`.
    ///
    /// The parent directory of `output_path` is removed and recreated, so
    /// every session starts from an empty directory.
    ///
    /// # Errors
    ///
    /// - [`FlowMotionError::IoError`] if the directory cannot be reset.
    /// - [`FlowMotionError::CannotCreateWriter`] or
    ///   [`FlowMotionError::CannotAttachInput`] if the writer cannot be
    ///   created. No output file is left behind in that case.
    pub fn start<P: AsRef<Path>>(
        output_path: P,
        options: &SinkOptions,
        error_policy: ErrorPolicy,
    ) -> Result<Self, FlowMotionError> {
        let output_path = output_path.as_ref().to_path_buf();
        if let Some(directory) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            prepare_output_directory(directory)?;
        }

        let writer = match FfmpegWriter::create(&output_path, options) {
            Ok(writer) => writer,
            Err(error) => {
                if output_path.exists() {
                    let _ = fs::remove_file(&output_path);
                }
                log::error!("Cannot start encode session: {error}");
                return Err(error);
            }
        };

        let mut sink = Self::with_writer(writer, options, error_policy);
        sink.output_path = Some(output_path);
        Ok(sink)
    }
}

impl<W: SampleWriter> FrameSink<W> {
    /// Wrap an already created writer.
    pub fn with_writer(writer: W, options: &SinkOptions, error_policy: ErrorPolicy) -> Self {
        Self {
            writer: Some(writer),
            output_path: None,
            frame_rate: options.frame_rate.max(1),
            slots_per_write: options.slots_per_write(),
            error_policy,
            max_consecutive_failures: options.max_consecutive_append_failures.max(1),
            appended: 0,
            failed: 0,
            consecutive_failures: 0,
            status: SessionStatus::Idle,
        }
    }

    /// Emit `frame` into the next `slots_per_write` sample slots.
    ///
    /// # Errors
    ///
    /// - [`FlowMotionError::SessionClosed`] if the session is finished or
    ///   failed.
    /// - Whatever [`SampleWriter::prepare`] reports; the session fails.
    /// - [`FlowMotionError::AppendFailed`] when the error policy stops the
    ///   session: on the first failure under [`ErrorPolicy::Abort`], or after
    ///   `max_consecutive_append_failures` in a row otherwise.
    pub fn write(&mut self, frame: &Frame) -> Result<WriteReport, FlowMotionError> {
        let status = self.status;
        let writer = match (&mut self.writer, status) {
            (Some(writer), SessionStatus::Idle | SessionStatus::Writing) => writer,
            _ => return Err(FlowMotionError::SessionClosed(status.name())),
        };
        self.status = SessionStatus::Writing;

        let mut sample = match writer.prepare(frame) {
            Ok(sample) => sample,
            Err(error) => {
                self.status = SessionStatus::Failed;
                return Err(error);
            }
        };

        let mut report = WriteReport {
            appended: 0,
            failed: 0,
            first_pts: None,
            last_pts: None,
        };

        for _ in 0..self.slots_per_write {
            let pts = self.appended as i64;
            let result = writer
                .wait_ready()
                .and_then(|()| writer.append(&mut sample, pts));

            match result {
                Ok(()) => {
                    self.appended += 1;
                    self.consecutive_failures = 0;
                    report.appended += 1;
                    report.first_pts.get_or_insert(pts);
                    report.last_pts = Some(pts);
                }
                Err(error) => {
                    self.failed += 1;
                    self.consecutive_failures += 1;
                    report.failed += 1;

                    let abort = self.error_policy == ErrorPolicy::Abort
                        || self.consecutive_failures >= self.max_consecutive_failures;
                    if abort {
                        self.status = SessionStatus::Failed;
                        return Err(FlowMotionError::AppendFailed {
                            pts,
                            consecutive_failures: self.consecutive_failures,
                            reason: error.to_string(),
                        });
                    }
                    log::warn!(
                        "Append at pts {pts} failed ({} in a row), skipping: {error}",
                        self.consecutive_failures
                    );
                }
            }
        }

        log::debug!(
            "Wrote frame {} into {} slots (total {})",
            frame.time().index,
            report.appended,
            self.appended
        );
        Ok(report)
    }

    /// Flush the encoder and close the output.
    ///
    /// # Errors
    ///
    /// - [`FlowMotionError::SessionClosed`] if the session already ended.
    /// - [`FlowMotionError::Finalize`] (or the writer's own error) if the
    ///   output cannot be finalised; the session is marked failed.
    pub fn finish(&mut self) -> Result<(), FlowMotionError> {
        let status = self.status;
        let writer = match (&mut self.writer, status) {
            (Some(writer), SessionStatus::Idle | SessionStatus::Writing) => writer,
            _ => return Err(FlowMotionError::SessionClosed(status.name())),
        };

        match writer.finish() {
            Ok(()) => {
                self.status = SessionStatus::Finished;
                log::info!(
                    "Encode session finished: {} samples, {} failed appends",
                    self.appended,
                    self.failed
                );
                Ok(())
            }
            Err(error) => {
                self.status = SessionStatus::Failed;
                Err(match error {
                    FlowMotionError::Finalize(_) => error,
                    other => FlowMotionError::Finalize(other.to_string()),
                })
            }
        }
    }

    /// Abandon the session and delete any partial output.
    pub fn discard(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            writer.discard();
        }
        if let Some(path) = &self.output_path
            && path.exists()
        {
            if let Err(error) = fs::remove_file(path) {
                log::warn!("Cannot remove partial output {}: {error}", path.display());
            }
        }
        if self.status != SessionStatus::Finished {
            self.status = SessionStatus::Failed;
        }
    }

    /// Current session status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Samples appended so far. Never decreases.
    pub fn samples_appended(&self) -> u64 {
        self.appended
    }

    /// Appends that failed and were skipped.
    pub fn failed_appends(&self) -> u64 {
        self.failed
    }

    /// Output file, when the sink was started on a path.
    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    /// Samples per written frame.
    pub fn slots_per_write(&self) -> u64 {
        self.slots_per_write
    }

    /// Output frame rate.
    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    /// The backend, unless the session was discarded.
    pub fn writer(&self) -> Option<&W> {
        self.writer.as_ref()
    }
}

/// Remove `directory` if it exists and create it again, empty.
pub fn prepare_output_directory<P: AsRef<Path>>(directory: P) -> Result<(), FlowMotionError> {
    let directory = directory.as_ref();
    if directory.exists() {
        log::debug!("Removing previous output directory {}", directory.display());
        fs::remove_dir_all(directory)?;
    }
    fs::create_dir_all(directory)?;
    Ok(())
}
