//! Async entry points.
//!
//! FFmpeg contexts are not `Send`, so nothing decoded ever crosses a thread
//! boundary here: every entry point moves the *path* onto a
//! `tokio::task::spawn_blocking` thread, opens the file there, and hands
//! results back through a channel or a join handle.
//!
//! # Example
//!
//! ```no_run
//! use tokio_stream::StreamExt;
//!
//! use flowmotion::{FlowMotionError, Orientation, Pipeline, PipelineOptions, probe_track};
//!
//! # async fn example() -> Result<(), FlowMotionError> {
//! let track = probe_track("input.mp4").await?;
//! println!("{}x{}", track.width, track.height);
//!
//! let pipeline = Pipeline::new(PipelineOptions::new().with_video_output(false), Orientation::Up);
//! let mut fields = pipeline.flow_stream("input.mp4", 4);
//! while let Some(result) = fields.next().await {
//!     let (time, field) = result?;
//!     println!("{:.3}s: mean motion {:?}", time.as_secs_f64(), field.mean_motion());
//! }
//!
//! let report = pipeline.process_video("input.mp4").await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::mpsc::Receiver;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::Stream;

use crate::error::FlowMotionError;
use crate::flow::FlowField;
use crate::frame::PresentationTime;
use crate::metadata::TrackDescriptor;
use crate::pipeline::{Pipeline, PipelineReport};
use crate::source::VideoHandle;

/// Default bounded-channel capacity for [`FlowStream`].
///
/// Kept small so full-resolution flow fields do not pile up in memory.
const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// Resolve the video track of `path` without blocking the runtime.
///
/// The open runs on a blocking thread, which resumes the caller exactly
/// once with either the descriptor or the error.
pub async fn probe_track<P: AsRef<Path>>(path: P) -> Result<TrackDescriptor, FlowMotionError> {
    let path = path.as_ref().to_path_buf();
    let (sender, receiver) = oneshot::channel();

    tokio::task::spawn_blocking(move || {
        let result = VideoHandle::open(&path).map(|handle| handle.descriptor().clone());
        // The caller may have stopped waiting.
        let _ = sender.send(result);
    });

    receiver.await.unwrap_or(Err(FlowMotionError::Cancelled))
}

/// A future resolving to the report of a pipeline run on a blocking thread.
pub struct ProcessFuture {
    handle: JoinHandle<Result<PipelineReport, FlowMotionError>>,
}

impl Future for ProcessFuture {
    type Output = Result<PipelineReport, FlowMotionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(FlowMotionError::Cancelled)))
    }
}

/// A stream of flow fields produced by a pipeline run on a blocking thread.
///
/// Implements [`tokio_stream::Stream`]. The channel is bounded, so the run
/// pauses while the consumer falls behind. Dropping the stream closes the
/// channel and the run stops with [`FlowMotionError::Cancelled`] at the next
/// field.
pub struct FlowStream {
    receiver: Receiver<Result<(PresentationTime, FlowField), FlowMotionError>>,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

impl Stream for FlowStream {
    type Item = Result<(PresentationTime, FlowField), FlowMotionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Pipeline {
    /// Run [`Pipeline::run`] on a blocking thread and await its single
    /// result.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn process_video<P: AsRef<Path>>(&self, path: P) -> ProcessFuture {
        let pipeline = self.clone();
        let path = path.as_ref().to_path_buf();
        let handle = tokio::task::spawn_blocking(move || pipeline.run(&path));
        ProcessFuture { handle }
    }

    /// Run the pipeline on a blocking thread and stream every flow field
    /// with the presentation time of its `current` frame.
    ///
    /// A failed run yields its error as the final item. `capacity` of zero
    /// uses the default.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn flow_stream<P: AsRef<Path>>(&self, path: P, capacity: usize) -> FlowStream {
        let capacity = if capacity == 0 {
            DEFAULT_CHANNEL_CAPACITY
        } else {
            capacity
        };
        let (sender, receiver) = tokio::sync::mpsc::channel(capacity);
        let pipeline = self.clone();
        let path = path.as_ref().to_path_buf();

        let handle = tokio::task::spawn_blocking(move || {
            let result = pipeline.run_observed(&path, |time, field| {
                sender
                    .blocking_send(Ok((time, field.clone())))
                    .map_err(|_| FlowMotionError::Cancelled)
            });
            if let Err(error) = result {
                // The receiver may have been dropped.
                let _ = sender.blocking_send(Err(error));
            }
        });

        FlowStream { receiver, handle }
    }
}
