//! Scanner Coordinator
//!
//! Owns the capture workflow of one scanning surface and connects it to the
//! capture store, the current SKU selection and the status channel.

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analysis::{partition, SessionGrouping};
use crate::capture::{BeginSave, CaptureWorkflow, DetectionSink, FrameOutcome, SaveResult, WorkflowState};
use crate::shared::StatusMessage;
use crate::storage::{now_millis, CaptureStore, NewCapture, SkuContext};
use crate::vision::Detection;

/// Status updates beyond this many unread are dropped
const STATUS_CHANNEL_CAPACITY: usize = 16;

/// Operator-entered details stored with a capture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureDetails {
    pub label: Option<String>,
    pub source: Option<String>,
    pub note: Option<String>,
}

/// Result of a save request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Stored as a new capture
    Saved { payload: String, capture_id: i64 },
    /// Payload was already stored
    Duplicate { payload: String, existing_id: i64 },
    /// Another save is running; request ignored
    InProgress,
    /// No confirmed detection to save
    NothingToSave,
}

/// Main scanner coordinator
pub struct ScannerApp {
    workflow: Mutex<CaptureWorkflow>,
    store: Arc<dyn CaptureStore>,
    sku_context: Arc<dyn SkuContext>,
    status_tx: Sender<StatusMessage>,
    status_rx: Receiver<StatusMessage>,
}

impl ScannerApp {
    /// Create a coordinator over a store and SKU selection
    pub fn new(store: Arc<dyn CaptureStore>, sku_context: Arc<dyn SkuContext>) -> Self {
        let (status_tx, status_rx) = bounded(STATUS_CHANNEL_CAPACITY);
        Self {
            workflow: Mutex::new(CaptureWorkflow::new()),
            store,
            sku_context,
            status_tx,
            status_rx,
        }
    }

    /// Receiver for status updates
    pub fn status_receiver(&self) -> Receiver<StatusMessage> {
        self.status_rx.clone()
    }

    /// Snapshot of the workflow state
    pub fn state(&self) -> WorkflowState {
        self.workflow.lock().state().clone()
    }

    /// Apply the analysis result of one live frame
    ///
    /// A recognition failure counts as "nothing detected" for the workflow.
    pub fn handle_frame_result(&self, result: Result<Option<Detection>>) -> FrameOutcome {
        let detection = self.unwrap_scan(result);
        let payload = detection.as_ref().map(|d| d.payload.clone());
        let outcome = self.workflow.lock().on_frame(detection);
        self.report_frame(outcome, payload);
        outcome
    }

    /// Apply the analysis result of a still image; a detection confirms at once
    pub fn handle_still_image(&self, result: Result<Option<Detection>>) -> FrameOutcome {
        let detection = self.unwrap_scan(result);
        let payload = detection.as_ref().map(|d| d.payload.clone());
        let outcome = self.workflow.lock().on_still_image(detection);
        self.report_frame(outcome, payload);
        outcome
    }

    /// Save the confirmed detection, linking it to the current SKU
    ///
    /// A store failure returns the workflow to `Confirmed` and is propagated.
    pub fn save(&self, details: CaptureDetails) -> Result<SaveOutcome> {
        let detection = match self.workflow.lock().begin_save() {
            BeginSave::Start(detection) => detection,
            BeginSave::InProgress => {
                debug!("Save already in progress, ignoring request");
                return Ok(SaveOutcome::InProgress);
            }
            BeginSave::NothingToSave => return Ok(SaveOutcome::NothingToSave),
        };

        // The workflow stays in `Saving` while the store runs, keeping saves exclusive
        self.emit(StatusMessage::Saving(detection.payload.clone()));
        let payload = detection.payload;

        match self.store_capture(&payload, details) {
            Ok(result) => {
                self.workflow.lock().complete_save(result);
                let outcome = match result {
                    SaveResult::Saved(capture_id) => {
                        info!("Saved capture {} as #{}", payload, capture_id);
                        self.emit(StatusMessage::Saved { payload: payload.clone(), capture_id });
                        SaveOutcome::Saved { payload, capture_id }
                    }
                    SaveResult::Duplicate(existing_id) => {
                        info!("Capture {} already stored as #{}", payload, existing_id);
                        self.emit(StatusMessage::Duplicate { payload: payload.clone(), existing_id });
                        SaveOutcome::Duplicate { payload, existing_id }
                    }
                };
                Ok(outcome)
            }
            Err(e) => {
                warn!("Failed to save capture {}: {:#}", payload, e);
                self.workflow.lock().fail_save();
                self.emit(StatusMessage::SaveFailed(format!("{e:#}")));
                Err(e)
            }
        }
    }

    /// Clear the workflow for the next code; refused while saving
    pub fn retry(&self) -> bool {
        let reset = self.workflow.lock().reset();
        if reset {
            self.emit(StatusMessage::Ready);
        }
        reset
    }

    /// Group every stored capture into SKU sessions
    pub fn session_grouping(&self) -> Result<SessionGrouping> {
        let events = self.store.list_sku_events()?;
        let captures = self.store.list_text_captures()?;
        Ok(partition(&events, &captures))
    }

    fn store_capture(&self, payload: &str, details: CaptureDetails) -> Result<SaveResult> {
        if let Some(existing) = self.store.find_capture_by_payload(payload)? {
            return Ok(SaveResult::Duplicate(existing.id));
        }

        let capture = NewCapture {
            payload: payload.to_string(),
            label: clean_detail(details.label),
            source: clean_detail(details.source),
            note: clean_detail(details.note),
            captured_at: now_millis(),
            sku_event_id: self.sku_context.current_sku_event_id()?,
        };
        match self.store.save_capture(&capture) {
            Ok(id) => Ok(SaveResult::Saved(id)),
            Err(e) => {
                // Another writer may have stored the payload after our lookup
                if let Ok(Some(existing)) = self.store.find_capture_by_payload(payload) {
                    debug!("Payload {} stored concurrently as capture {}", payload, existing.id);
                    return Ok(SaveResult::Duplicate(existing.id));
                }
                Err(e)
            }
        }
    }

    fn unwrap_scan(&self, result: Result<Option<Detection>>) -> Option<Detection> {
        match result {
            Ok(detection) => detection,
            Err(e) => {
                warn!("Text recognition failed: {:#}", e);
                self.emit(StatusMessage::ScanFailed(format!("{e:#}")));
                None
            }
        }
    }

    fn report_frame(&self, outcome: FrameOutcome, payload: Option<String>) {
        let Some(payload) = payload else {
            return;
        };
        match outcome {
            FrameOutcome::Pending { changed: true } => {
                self.emit(StatusMessage::TextDetected(payload));
            }
            FrameOutcome::Confirmed { changed } => {
                if changed {
                    self.emit(StatusMessage::TextDetected(payload.clone()));
                }
                self.emit(StatusMessage::Confirmed(payload));
            }
            _ => {}
        }
    }

    /// Non-blocking send; a full channel drops the update
    fn emit(&self, message: StatusMessage) {
        match self.status_tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => debug!("Status channel full, dropping: {}", message),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl DetectionSink for ScannerApp {
    fn accepts_frames(&self) -> bool {
        !self.workflow.lock().is_frozen()
    }

    fn on_frame_result(&self, result: Result<Option<Detection>>) {
        self.handle_frame_result(result);
    }
}

/// Trimmed detail text; blank entries are not stored
fn clean_detail(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
