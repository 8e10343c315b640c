//! Pipeline loop tests over in-memory sources.

mod common;

use std::sync::{Arc, Mutex};

use common::{RecordingWriter, VecProducer, drifting_frames, sink_options};
use flowmotion::{
    CancellationToken, ErrorPolicy, FlowAlgorithm, FlowError, FlowField, FlowMotionError, Frame,
    FramePixelFormat, FrameProducer, FrameSink, LumaPlane, MotionEstimator, Orientation,
    OrientationTrack, Pipeline, PipelineOptions, PipelineStage,
    PipelineState, ProgressCallback, ProgressInfo, SessionStatus, SinkContent, TrackDescriptor,
};

fn quiet_options() -> PipelineOptions {
    PipelineOptions::new()
        .with_debug_image(false)
        .with_video_output(false)
}

fn recording_sink(slots: u32, policy: ErrorPolicy) -> FrameSink<RecordingWriter> {
    FrameSink::with_writer(RecordingWriter::default(), &sink_options(slots), policy)
}

// ── Scenarios ──────────────────────────────────────────────────────

#[test]
fn single_frame_completes_without_flow() {
    let pipeline = Pipeline::new(quiet_options(), Orientation::Up);
    let mut producer = VecProducer::new(drifting_frames(1));
    let mut sink = recording_sink(2, ErrorPolicy::Abort);

    let report = pipeline
        .run_source(&mut producer, Some(&mut sink))
        .expect("run");

    assert_eq!(report.state, PipelineState::Completed);
    assert_eq!(report.frames_read, 1);
    assert_eq!(report.flow_fields, 0);
    assert_eq!(report.samples_written, 0);
    assert_eq!(report.output_video, None);
    assert_eq!(pipeline.state(), PipelineState::Completed);
    // Nothing was written, so the session is thrown away.
    assert_eq!(sink.status(), SessionStatus::Failed);
}

#[test]
fn missing_input_fails_to_open() {
    let root = tempfile::tempdir().expect("tempdir");
    let output_root = root.path().join("run");
    let pipeline = Pipeline::new(PipelineOptions::new().with_output_root(&output_root), Orientation::Up);

    let result = pipeline.run(root.path().join("missing.mp4"));

    assert!(matches!(result, Err(FlowMotionError::FileOpen { .. })));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(!output_root.exists());
    assert!(!pipeline.is_busy());
}

#[test]
fn demo_mode_computes_one_field_and_a_debug_image() {
    let root = tempfile::tempdir().expect("tempdir");
    let options = PipelineOptions::demo()
        .with_output_root(root.path())
        .with_video_output(false);
    let pipeline = Pipeline::new(options, Orientation::Up);
    let mut producer = VecProducer::new(drifting_frames(6));

    let report = pipeline
        .run_source::<_, RecordingWriter>(&mut producer, None)
        .expect("run");

    assert_eq!(producer.pulled, 2);
    assert_eq!(report.flow_fields, 1);
    let debug_image = report.debug_image.expect("debug image");
    assert_eq!(debug_image, root.path().join(flowmotion::DEBUG_IMAGE_FILE_NAME));

    let decoded = image::open(&debug_image).expect("decode debug image");
    assert_eq!((decoded.width(), decoded.height()), (common::WIDTH, common::HEIGHT));
}

#[test]
fn every_pair_reaches_the_sink() {
    let pipeline = Pipeline::new(quiet_options(), Orientation::Up);
    let mut producer = VecProducer::new(drifting_frames(5));
    let mut sink = recording_sink(2, ErrorPolicy::Abort);

    let report = pipeline
        .run_source(&mut producer, Some(&mut sink))
        .expect("run");

    assert_eq!(report.frames_read, 5);
    assert_eq!(report.flow_fields, 4);
    assert_eq!(report.samples_written, 8);
    assert_eq!(report.failed_appends, 0);
    assert_eq!(sink.status(), SessionStatus::Finished);

    let writer = sink.writer().expect("writer");
    assert!(writer.finished);
    assert_eq!(writer.prepared, vec![1, 2, 3, 4]);
    assert!(writer.formats.iter().all(|&format| format == FramePixelFormat::Rgb24));
    assert_eq!(writer.appended, (0..8).collect::<Vec<i64>>());
}

#[test]
fn source_frames_can_be_encoded_instead() {
    let options = quiet_options().with_sink_content(SinkContent::SourceFrame);
    let pipeline = Pipeline::new(options, Orientation::Up);
    let mut producer = VecProducer::new(drifting_frames(3));
    let mut sink = recording_sink(1, ErrorPolicy::Abort);

    pipeline
        .run_source(&mut producer, Some(&mut sink))
        .expect("run");

    let writer = sink.writer().expect("writer");
    assert_eq!(writer.prepared, vec![1, 2]);
    assert!(writer.formats.iter().all(|&format| format == FramePixelFormat::Gray8));
}

#[test]
fn frame_limit_stops_reading() {
    let pipeline = Pipeline::new(quiet_options().with_max_frames(Some(3)), Orientation::Up);
    let mut producer = VecProducer::new(drifting_frames(10));

    let report = pipeline
        .run_source::<_, RecordingWriter>(&mut producer, None)
        .expect("run");

    assert_eq!(producer.pulled, 3);
    assert_eq!(report.frames_read, 3);
    assert_eq!(report.flow_fields, 2);
}

// ── Failure policy ─────────────────────────────────────────────────

fn track_missing_frame_two() -> OrientationTrack {
    OrientationTrack::parse_csv("0,up\n1,up\n3,up\n4,up\n").expect("track")
}

#[test]
fn abort_policy_stops_at_a_bad_pair() {
    let pipeline = Pipeline::new(quiet_options(), track_missing_frame_two());
    let mut producer = VecProducer::new(drifting_frames(5));

    let result = pipeline.run_source::<_, RecordingWriter>(&mut producer, None);

    assert!(matches!(result, Err(FlowMotionError::Orientation(_))));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(producer.pulled, 3);
}

#[test]
fn skip_policy_counts_bad_pairs() {
    let options = quiet_options().with_error_policy(ErrorPolicy::SkipAndContinue);
    let pipeline = Pipeline::new(options, track_missing_frame_two());
    let mut producer = VecProducer::new(drifting_frames(5));
    let mut sink = recording_sink(1, ErrorPolicy::SkipAndContinue);

    let report = pipeline
        .run_source(&mut producer, Some(&mut sink))
        .expect("run");

    assert_eq!(report.flow_fields, 3);
    assert_eq!(report.skipped_pairs, 1);
    assert_eq!(sink.writer().expect("writer").prepared, vec![1, 3, 4]);
}

#[test]
fn mismatched_frames_are_skipped_when_asked() {
    let mut frames = drifting_frames(3);
    frames[1] = Frame::from_gray(8, 8, vec![0; 64], frames[1].time()).expect("small frame");

    let options = quiet_options().with_error_policy(ErrorPolicy::SkipAndContinue);
    let pipeline = Pipeline::new(options, Orientation::Up);
    let report = pipeline
        .run_source::<_, RecordingWriter>(&mut VecProducer::new(frames), None)
        .expect("run");
    assert_eq!(report.skipped_pairs, 2);
    assert_eq!(report.flow_fields, 0);
}

/// An algorithm that rejects every pair.
struct Diverging;

impl FlowAlgorithm for Diverging {
    fn name(&self) -> &str {
        "diverging"
    }

    fn compute(&self, _previous: &LumaPlane, _current: &LumaPlane) -> Result<FlowField, FlowError> {
        Err(FlowError::Algorithm("iteration did not converge".into()))
    }
}

#[test]
fn algorithm_failure_aborts_by_default() {
    let pipeline = Pipeline::new(quiet_options(), Orientation::Up).with_estimator(MotionEstimator::new(Diverging));
    let mut producer = VecProducer::new(drifting_frames(3));

    let result = pipeline.run_source::<_, RecordingWriter>(&mut producer, None);

    assert!(matches!(
        result,
        Err(FlowMotionError::FlowEstimation {
            previous: 0,
            current: 1,
            source: FlowError::Algorithm(_),
        })
    ));
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[test]
fn algorithm_failures_are_skipped_when_asked() {
    let options = quiet_options().with_error_policy(ErrorPolicy::SkipAndContinue);
    let pipeline = Pipeline::new(options, Orientation::Up).with_estimator(MotionEstimator::new(Diverging));
    let report = pipeline
        .run_source::<_, RecordingWriter>(&mut VecProducer::new(drifting_frames(4)), None)
        .expect("run");
    assert_eq!(report.skipped_pairs, 3);
    assert_eq!(report.flow_fields, 0);
}

#[test]
fn sink_failure_aborts_the_run() {
    let pipeline = Pipeline::new(quiet_options(), Orientation::Up);
    let mut producer = VecProducer::new(drifting_frames(4));
    let writer = RecordingWriter::failing_on([2]);
    let mut sink = FrameSink::with_writer(writer, &sink_options(2), ErrorPolicy::Abort);

    let result = pipeline.run_source(&mut producer, Some(&mut sink));

    assert!(matches!(result, Err(FlowMotionError::AppendFailed { pts: 2, .. })));
    assert_eq!(sink.status(), SessionStatus::Failed);
    assert!(sink.writer().is_none());
}

// ── Cancellation and progress ──────────────────────────────────────

#[test]
fn cancelled_before_start_reads_nothing() {
    let token = CancellationToken::new();
    token.cancel();
    let pipeline = Pipeline::new(quiet_options().with_cancellation(token), Orientation::Up);
    let mut producer = VecProducer::new(drifting_frames(4));

    let result = pipeline.run_source::<_, RecordingWriter>(&mut producer, None);

    assert!(matches!(result, Err(FlowMotionError::Cancelled)));
    assert_eq!(producer.pulled, 0);
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

struct CancelAfter {
    frames: u64,
    token: CancellationToken,
    seen: Mutex<Vec<(PipelineStage, u64)>>,
}

impl ProgressCallback for CancelAfter {
    fn on_progress(&self, info: &ProgressInfo) {
        self.seen.lock().unwrap().push((info.stage, info.current));
        if info.current >= self.frames {
            self.token.cancel();
        }
    }
}

#[test]
fn cancellation_mid_run_keeps_written_samples() {
    let token = CancellationToken::new();
    let progress = Arc::new(CancelAfter {
        frames: 3,
        token: token.clone(),
        seen: Mutex::new(Vec::new()),
    });
    let options = quiet_options()
        .with_cancellation(token)
        .with_progress(progress.clone());
    let pipeline = Pipeline::new(options, Orientation::Up);
    let mut producer = VecProducer::new(drifting_frames(10));
    let mut sink = recording_sink(1, ErrorPolicy::Abort);

    let result = pipeline.run_source(&mut producer, Some(&mut sink));

    assert!(matches!(result, Err(FlowMotionError::Cancelled)));
    assert_eq!(producer.pulled, 3);
    assert_eq!(sink.samples_appended(), 2);
    assert_eq!(sink.status(), SessionStatus::Finished);

    let seen = progress.seen.lock().unwrap();
    assert_eq!(
        seen.as_slice(),
        &[
            (PipelineStage::Processing, 1),
            (PipelineStage::Processing, 2),
            (PipelineStage::Processing, 3),
            (PipelineStage::Finalizing, 3),
        ]
    );
}

// ── Re-entrancy ────────────────────────────────────────────────────

/// A producer that tries to start a second run on the same pipeline.
struct ReentrantProducer {
    inner: VecProducer,
    pipeline: Pipeline,
    nested: Option<Result<(), FlowMotionError>>,
}

impl FrameProducer for ReentrantProducer {
    fn descriptor(&self) -> &TrackDescriptor {
        self.inner.descriptor()
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.nested.is_none() {
            let mut other = VecProducer::new(drifting_frames(2));
            let result = self
                .pipeline
                .run_source::<_, RecordingWriter>(&mut other, None)
                .map(|_| ());
            self.nested = Some(result);
        }
        self.inner.next_frame()
    }
}

#[test]
fn concurrent_runs_are_rejected() {
    let pipeline = Pipeline::new(quiet_options(), Orientation::Up);
    let mut producer = ReentrantProducer {
        inner: VecProducer::new(drifting_frames(3)),
        pipeline: pipeline.clone(),
        nested: None,
    };

    let report = pipeline
        .run_source::<_, RecordingWriter>(&mut producer, None)
        .expect("outer run");

    assert!(matches!(producer.nested, Some(Err(FlowMotionError::Busy))));
    assert_eq!(report.flow_fields, 2);
    assert_eq!(pipeline.state(), PipelineState::Completed);
    assert!(!pipeline.is_busy());
}

// ── Lifecycle ──────────────────────────────────────────────────────

/// A producer that records the pipeline state seen at every pull.
struct StateRecorder {
    inner: VecProducer,
    pipeline: Pipeline,
    seen: Vec<PipelineState>,
}

impl FrameProducer for StateRecorder {
    fn descriptor(&self) -> &TrackDescriptor {
        self.inner.descriptor()
    }

    fn next_frame(&mut self) -> Option<Frame> {
        self.seen.push(self.pipeline.state());
        self.inner.next_frame()
    }
}

#[test]
fn running_starts_after_the_first_frame() {
    let pipeline = Pipeline::new(quiet_options(), Orientation::Up);
    let mut producer = StateRecorder {
        inner: VecProducer::new(drifting_frames(3)),
        pipeline: pipeline.clone(),
        seen: Vec::new(),
    };

    pipeline
        .run_source::<_, RecordingWriter>(&mut producer, None)
        .expect("run");

    assert_eq!(
        producer.seen,
        vec![
            PipelineState::Started,
            PipelineState::Running,
            PipelineState::Running,
            PipelineState::Running,
        ]
    );
    assert_eq!(pipeline.state(), PipelineState::Completed);
}

#[test]
fn empty_source_never_enters_running() {
    let pipeline = Pipeline::new(quiet_options(), Orientation::Up);
    let mut producer = StateRecorder {
        inner: VecProducer::new(Vec::new()),
        pipeline: pipeline.clone(),
        seen: Vec::new(),
    };

    let report = pipeline
        .run_source::<_, RecordingWriter>(&mut producer, None)
        .expect("run");

    assert_eq!(producer.seen, vec![PipelineState::Started]);
    assert_eq!(report.frames_read, 0);
    assert_eq!(pipeline.state(), PipelineState::Completed);
}
