//! Frame Capture Layer
//!
//! Feeds camera frames to a single analysis thread. Backpressure policy is
//! "drop newest": a frame arriving while the previous one is still being
//! analyzed is closed immediately instead of queued.

pub mod frame;
pub mod workflow;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info};

use crate::vision::{Detection, TextAnalyzer};
use frame::Frame;

pub use workflow::{BeginSave, CaptureWorkflow, FrameOutcome, SaveResult, WorkflowState};

/// Receiver of per-frame analysis results
pub trait DetectionSink: Send + Sync {
    /// False while the consumer is frozen and frames would be ignored anyway
    fn accepts_frames(&self) -> bool;
    /// Result of analyzing one live frame
    fn on_frame_result(&self, result: Result<Option<Detection>>);
}

/// What happened to a submitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Queued for analysis
    Accepted,
    /// Previous frame still in analysis; closed without analysis
    Dropped,
    /// Consumer is frozen; closed without analysis
    Skipped,
}

/// Owns a frame for the duration of its analysis
///
/// Dropping the guard closes the frame and, when it holds the busy flag,
/// releases it, on every exit path including panics.
struct FrameGuard {
    frame: Box<dyn Frame>,
    busy: Option<Arc<AtomicBool>>,
}

impl FrameGuard {
    fn new(frame: Box<dyn Frame>) -> Self {
        Self { frame, busy: None }
    }

    fn holding(mut self, busy: Arc<AtomicBool>) -> Self {
        self.busy = Some(busy);
        self
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        self.frame.close();
        if let Some(busy) = self.busy.take() {
            busy.store(false, Ordering::Release);
        }
    }
}

/// Single-threaded frame analysis with drop-newest backpressure
pub struct AnalysisWorker {
    sender: Option<Sender<FrameGuard>>,
    busy: Arc<AtomicBool>,
    sink: Arc<dyn DetectionSink>,
    handle: Option<JoinHandle<()>>,
}

impl AnalysisWorker {
    /// Start the analysis thread
    pub fn spawn(analyzer: Arc<TextAnalyzer>, sink: Arc<dyn DetectionSink>) -> Result<Self> {
        // The busy flag guarantees at most one frame in the channel
        let (sender, receiver) = bounded::<FrameGuard>(1);
        let worker_sink = sink.clone();

        let handle = std::thread::Builder::new()
            .name("frame-analysis".into())
            .spawn(move || {
                info!("Frame analysis thread starting...");
                for guard in receiver {
                    let result = catch_unwind(AssertUnwindSafe(|| analyzer.analyze(guard.frame.as_ref())))
                        .unwrap_or_else(|_| Err(anyhow!("text recognizer panicked")));
                    worker_sink.on_frame_result(result);
                    drop(guard);
                }
                info!("Frame analysis thread exiting...");
            })
            .context("failed to spawn frame analysis thread")?;

        Ok(Self {
            sender: Some(sender),
            busy: Arc::new(AtomicBool::new(false)),
            sink,
            handle: Some(handle),
        })
    }

    /// Hand a frame to the worker, or close it if the worker cannot take it now
    pub fn submit(&self, frame: Box<dyn Frame>) -> Submission {
        let guard = FrameGuard::new(frame);

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Analysis busy, dropping frame");
            return Submission::Dropped;
        }

        let guard = guard.holding(self.busy.clone());

        if !self.sink.accepts_frames() {
            return Submission::Skipped;
        }

        let Some(sender) = &self.sender else {
            return Submission::Dropped;
        };

        match sender.send(guard) {
            Ok(()) => Submission::Accepted,
            Err(_) => {
                error!("Frame analysis thread is gone, dropping frame");
                Submission::Dropped
            }
        }
    }

    /// Whether a frame is currently being analyzed
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Frame analysis thread panicked");
            }
        }
    }
}
