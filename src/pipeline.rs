//! Pipeline controller: source → motion estimator → sink.
//!
//! A [`Pipeline`] is an explicit value, cheap to clone, whose clones share
//! one run guard and one observable [`PipelineState`]. Only one run may be
//! active per pipeline; a second concurrent run fails with
//! [`FlowMotionError::Busy`].
//!
//! # Example
//!
//! ```no_run
//! use flowmotion::{Orientation, Pipeline, PipelineOptions, PipelineState};
//!
//! let pipeline = Pipeline::new(PipelineOptions::demo(), Orientation::Up);
//! let report = pipeline.run("input.mp4")?;
//! assert_eq!(report.state, PipelineState::Completed);
//! println!("{} flow fields, {} samples", report.flow_fields, report.samples_written);
//! # Ok::<(), flowmotion::FlowMotionError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::configuration::{ErrorPolicy, PipelineOptions, SinkContent};
use crate::debug_image::write_debug_image;
use crate::error::FlowMotionError;
use crate::flow::FlowField;
use crate::frame::{Frame, PresentationTime};
use crate::motion::MotionEstimator;
use crate::orientation::OrientationProvider;
use crate::progress::{PipelineStage, ProgressTracker};
use crate::sink::{FrameSink, SampleWriter, SessionStatus};
use crate::source::{FrameProducer, FrameReader, ReaderOptions, VideoHandle};
use crate::validation::validate_run;

/// Observable lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No run has started, or a new one is about to.
    Idle,
    /// The container is open and its track resolved.
    Opened,
    /// The decoder is ready.
    Started,
    /// Frames are being processed.
    Running,
    /// The source was exhausted or the frame limit reached.
    Completed,
    /// The run stopped on an error or was cancelled.
    Failed,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    /// Final state; [`PipelineState::Completed`] for returned reports.
    pub state: PipelineState,
    /// Frames pulled from the source.
    pub frames_read: u64,
    /// Flow fields computed.
    pub flow_fields: u64,
    /// Pairs skipped under [`ErrorPolicy::SkipAndContinue`].
    pub skipped_pairs: u64,
    /// Samples appended to the output video.
    pub samples_written: u64,
    /// Appends that failed and were skipped.
    pub failed_appends: u64,
    /// The finalised output video, if one was written.
    pub output_video: Option<PathBuf>,
    /// The debug still, if one was written.
    pub debug_image: Option<PathBuf>,
}

impl PipelineReport {
    fn new() -> Self {
        Self {
            state: PipelineState::Running,
            frames_read: 0,
            flow_fields: 0,
            skipped_pairs: 0,
            samples_written: 0,
            failed_appends: 0,
            output_video: None,
            debug_image: None,
        }
    }
}

/// Orchestrates one video through decoding, motion estimation and paced
/// encoding.
#[derive(Clone)]
pub struct Pipeline {
    options: PipelineOptions,
    estimator: MotionEstimator,
    orientation: Arc<dyn OrientationProvider>,
    busy: Arc<AtomicBool>,
    state: Arc<Mutex<PipelineState>>,
}

impl Debug for Pipeline {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Pipeline")
            .field("options", &self.options)
            .field("estimator", &self.estimator)
            .field("busy", &self.is_busy())
            .field("state", &self.state())
            .finish()
    }
}

/// Holds the run flag for as long as a run is active.
struct RunGuard<'a> {
    busy: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(busy: &'a AtomicBool) -> Result<Self, FlowMotionError> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| FlowMotionError::Busy)?;
        Ok(Self { busy })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

impl Pipeline {
    /// Create a pipeline. The orientation source has no default and must be
    /// supplied; pass [`Orientation::Up`](crate::Orientation::Up) for
    /// upright footage.
    pub fn new<O: OrientationProvider + 'static>(options: PipelineOptions, orientation: O) -> Self {
        Self::with_shared_orientation(options, Arc::new(orientation))
    }

    /// Create a pipeline around an already shared orientation source.
    pub fn with_shared_orientation(
        options: PipelineOptions,
        orientation: Arc<dyn OrientationProvider>,
    ) -> Self {
        Self {
            options,
            estimator: MotionEstimator::default(),
            orientation,
            busy: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(PipelineState::Idle)),
        }
    }

    /// Replace the motion estimator.
    #[must_use]
    pub fn with_estimator(mut self, estimator: MotionEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Options this pipeline runs with.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// State of the current or most recent run.
    pub fn state(&self) -> PipelineState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Returns `true` while a run is active.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn set_state(&self, next: PipelineState) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        log::debug!("Pipeline state {:?} -> {next:?}", *state);
        *state = next;
    }

    /// Process the video at `path` end to end.
    ///
    /// Opens and validates the input, starts the decoder, starts the sink
    /// when video output is enabled, then loops over frame pairs until the
    /// source is exhausted or the frame limit is reached.
    ///
    /// # Errors
    ///
    /// - [`FlowMotionError::Busy`] if another run is active on this pipeline.
    /// - Open, track, decode-start and encoder-setup errors.
    /// - [`FlowMotionError::FlowEstimation`] or
    ///   [`FlowMotionError::AppendFailed`] when the error policy stops the run.
    /// - [`FlowMotionError::Cancelled`] if the cancellation token fired.
    /// - [`FlowMotionError::Finalize`] if the output cannot be closed.
    pub fn run<P: AsRef<Path>>(&self, path: P) -> Result<PipelineReport, FlowMotionError> {
        self.run_observed(path, |_, _| Ok(()))
    }

    /// Like [`run`](Pipeline::run), calling `observer` with every computed
    /// flow field. An error from the observer stops the run.
    pub fn run_observed<P, F>(&self, path: P, mut observer: F) -> Result<PipelineReport, FlowMotionError>
    where
        P: AsRef<Path>,
        F: FnMut(PresentationTime, &FlowField) -> Result<(), FlowMotionError>,
    {
        let _guard = RunGuard::acquire(&self.busy)?;
        self.set_state(PipelineState::Idle);

        let result = self.run_path(path.as_ref(), &mut observer);
        self.settle(result)
    }

    /// Run the loop over an already started producer and an optional sink.
    ///
    /// The sink is closed when the loop ends: finalised if it holds at
    /// least one sample, discarded otherwise.
    pub fn run_source<P, W>(
        &self,
        producer: &mut P,
        sink: Option<&mut FrameSink<W>>,
    ) -> Result<PipelineReport, FlowMotionError>
    where
        P: FrameProducer + ?Sized,
        W: SampleWriter,
    {
        let _guard = RunGuard::acquire(&self.busy)?;
        self.set_state(PipelineState::Started);

        let result = self.drive(producer, sink, &mut |_, _| Ok(()));
        self.settle(result)
    }

    fn settle(&self, result: Result<PipelineReport, FlowMotionError>) -> Result<PipelineReport, FlowMotionError> {
        match result {
            Ok(mut report) => {
                report.state = PipelineState::Completed;
                self.set_state(PipelineState::Completed);
                log::info!(
                    "Run completed: {} frames, {} flow fields, {} samples",
                    report.frames_read,
                    report.flow_fields,
                    report.samples_written
                );
                Ok(report)
            }
            Err(error) => {
                self.set_state(PipelineState::Failed);
                log::error!("Run failed: {error}");
                Err(error)
            }
        }
    }

    fn run_path<F>(&self, path: &Path, observer: &mut F) -> Result<PipelineReport, FlowMotionError>
    where
        F: FnMut(PresentationTime, &FlowField) -> Result<(), FlowMotionError>,
    {
        let handle = VideoHandle::open(path)?;
        self.set_state(PipelineState::Opened);

        let validation = validate_run(handle.descriptor(), &self.options);
        for warning in &validation.warnings {
            log::warn!("{warning}");
        }
        if !validation.is_valid() {
            return Err(FlowMotionError::InvalidConfiguration(validation.errors.join("; ")));
        }

        let reader_options = ReaderOptions::default()
            .with_pixel_format(self.options.decode_pixel_format)
            .with_empty_frame_retries(self.options.empty_frame_retries);
        let mut reader = FrameReader::start(handle, &reader_options)?;
        self.set_state(PipelineState::Started);

        if self.options.write_video {
            let mut sink = FrameSink::start(
                self.options.output_video_path(),
                &self.options.sink,
                self.options.error_policy,
            )?;
            self.drive(&mut reader, Some(&mut sink), observer)
        } else {
            self.drive::<_, crate::encode::FfmpegWriter, _>(&mut reader, None, observer)
        }
    }

    /// The frame loop. Closes the sink on every exit path.
    fn drive<P, W, F>(
        &self,
        producer: &mut P,
        mut sink: Option<&mut FrameSink<W>>,
        observer: &mut F,
    ) -> Result<PipelineReport, FlowMotionError>
    where
        P: FrameProducer + ?Sized,
        W: SampleWriter,
        F: FnMut(PresentationTime, &FlowField) -> Result<(), FlowMotionError>,
    {
        let limit = self.options.max_frames_to_process;
        let expected = producer.descriptor().frame_count;
        let total = match (limit, expected) {
            (Some(limit), 0) => Some(limit),
            (Some(limit), expected) => Some(limit.min(expected)),
            (None, 0) => None,
            (None, expected) => Some(expected),
        };
        let mut tracker = ProgressTracker::new(
            Arc::clone(&self.options.progress),
            total,
            self.options.batch_size,
        );

        let mut report = PipelineReport::new();
        let mut previous: Option<Frame> = None;

        let outcome = loop {
            if self.options.is_cancelled() {
                log::info!("Run cancelled after {} frames", report.frames_read);
                break Err(FlowMotionError::Cancelled);
            }
            if limit.is_some_and(|limit| report.frames_read >= limit) {
                log::debug!("Frame limit reached");
                break Ok(());
            }
            let Some(current) = producer.next_frame() else {
                break Ok(());
            };
            report.frames_read += 1;
            if report.frames_read == 1 {
                self.set_state(PipelineState::Running);
            }
            tracker.advance(current.time().index, current.time().as_duration());

            if let Some(previous) = &previous
                && let Err(error) =
                    self.process_pair(previous, &current, sink.as_deref_mut(), observer, &mut report)
            {
                break Err(error);
            }
            previous = Some(current);
        };

        tracker.finish(PipelineStage::Finalizing);

        let closed = match sink {
            Some(sink) => {
                let closed = close_sink(sink, outcome.is_ok());
                report.samples_written = sink.samples_appended();
                report.failed_appends = sink.failed_appends();
                closed
            }
            None => Ok(None),
        };

        outcome?;
        report.output_video = closed?;
        Ok(report)
    }

    fn process_pair<W, F>(
        &self,
        previous: &Frame,
        current: &Frame,
        sink: Option<&mut FrameSink<W>>,
        observer: &mut F,
        report: &mut PipelineReport,
    ) -> Result<(), FlowMotionError>
    where
        W: SampleWriter,
        F: FnMut(PresentationTime, &FlowField) -> Result<(), FlowMotionError>,
    {
        let (previous_index, current_index) = (previous.time().index, current.time().index);

        let field = self
            .orientation
            .orientation_at(&current.time())
            .and_then(|orientation| {
                self.estimator
                    .estimate(previous, current, orientation)
                    .map_err(|source| FlowMotionError::FlowEstimation {
                        previous: previous_index,
                        current: current_index,
                        source,
                    })
            });

        let field = match (field, self.options.error_policy) {
            (Ok(field), _) => field,
            (Err(error), ErrorPolicy::Abort) => return Err(error),
            (Err(error), ErrorPolicy::SkipAndContinue) => {
                log::warn!("Skipping pair {previous_index} -> {current_index}: {error}");
                report.skipped_pairs += 1;
                return Ok(());
            }
        };
        report.flow_fields += 1;

        if self.options.write_debug_image && report.debug_image.is_none() {
            let path = self.options.debug_image_path();
            write_debug_image(&field, &path)?;
            report.debug_image = Some(path);
        }

        observer(current.time(), &field)?;

        if let Some(sink) = sink {
            match self.options.sink_content {
                SinkContent::FlowVisualization => sink.write(&field.to_frame(current.time()))?,
                SinkContent::SourceFrame => sink.write(current)?,
            };
        }
        Ok(())
    }
}

/// Finalise a sink that holds samples, discard it otherwise. A sink that
/// already failed is always discarded.
fn close_sink<W: SampleWriter>(
    sink: &mut FrameSink<W>,
    loop_succeeded: bool,
) -> Result<Option<PathBuf>, FlowMotionError> {
    match sink.status() {
        SessionStatus::Finished => Ok(sink.output_path().map(Path::to_path_buf)),
        SessionStatus::Failed => {
            sink.discard();
            Ok(None)
        }
        SessionStatus::Idle | SessionStatus::Writing if sink.samples_appended() == 0 => {
            log::debug!("No samples written, discarding output");
            sink.discard();
            Ok(None)
        }
        SessionStatus::Idle | SessionStatus::Writing => match sink.finish() {
            Ok(()) => Ok(sink.output_path().map(Path::to_path_buf)),
            Err(error) if loop_succeeded => Err(error),
            Err(error) => {
                log::warn!("Cannot finalize output after a failed run: {error}");
                Ok(None)
            }
        },
    }
}
