//! Capture workflow state machine
//!
//! Debounces per-frame detections into a confirmed one (the same payload on two
//! consecutive frames), freezes once confirmed, and gates a single in-flight save.

use serde::Serialize;
use tracing::debug;

use crate::vision::Detection;

/// Current step of a live scanning surface
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowState {
    /// Nothing detected
    Idle,
    /// A payload was seen once and awaits a matching frame
    Detecting { pending: Detection },
    /// Stable detection; frames are ignored until reset
    Confirmed { detection: Detection },
    /// Save in flight
    Saving { detection: Detection },
    /// Stored as a new capture
    Saved { detection: Detection, capture_id: i64 },
    /// Payload already stored under another capture
    Duplicate { detection: Detection, existing_id: i64 },
}

impl WorkflowState {
    /// Short name for status displays
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Detecting { .. } => "detecting",
            WorkflowState::Confirmed { .. } => "confirmed",
            WorkflowState::Saving { .. } => "saving",
            WorkflowState::Saved { .. } => "saved",
            WorkflowState::Duplicate { .. } => "duplicate",
        }
    }

    /// Detection carried by the state, if any
    pub fn detection(&self) -> Option<&Detection> {
        match self {
            WorkflowState::Idle => None,
            WorkflowState::Detecting { pending } => Some(pending),
            WorkflowState::Confirmed { detection }
            | WorkflowState::Saving { detection }
            | WorkflowState::Saved { detection, .. }
            | WorkflowState::Duplicate { detection, .. } => Some(detection),
        }
    }
}

/// Effect of feeding one frame result to the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Workflow is frozen; the frame had no effect
    Ignored,
    /// No detection; back to idle
    Cleared,
    /// Detection pending confirmation; `changed` when the payload differs from the last one seen
    Pending { changed: bool },
    /// Detection confirmed
    Confirmed { changed: bool },
}

/// Result of asking to start a save
#[derive(Debug, Clone, PartialEq)]
pub enum BeginSave {
    /// Save may proceed with this detection
    Start(Detection),
    /// Another save is in flight
    InProgress,
    /// No confirmed detection
    NothingToSave,
}

/// Store outcome of a save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// New capture stored under this id
    Saved(i64),
    /// Payload already stored under this id
    Duplicate(i64),
}

/// Per-surface workflow; all mutation goes through one owner
#[derive(Debug, Clone)]
pub struct CaptureWorkflow {
    state: WorkflowState,
    last_payload: Option<String>,
}

impl Default for CaptureWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureWorkflow {
    pub fn new() -> Self {
        Self {
            state: WorkflowState::Idle,
            last_payload: None,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Frozen states ignore incoming frames
    pub fn is_frozen(&self) -> bool {
        !matches!(
            self.state,
            WorkflowState::Idle | WorkflowState::Detecting { .. }
        )
    }

    /// Feed the result of one live frame
    pub fn on_frame(&mut self, detection: Option<Detection>) -> FrameOutcome {
        if self.is_frozen() {
            return FrameOutcome::Ignored;
        }

        let Some(detection) = detection else {
            self.state = WorkflowState::Idle;
            return FrameOutcome::Cleared;
        };

        let changed = self.remember(&detection.payload);
        let confirmed = matches!(
            &self.state,
            WorkflowState::Detecting { pending } if pending.payload == detection.payload
        );

        if confirmed {
            debug!("Detection confirmed: {}", detection.payload);
            self.state = WorkflowState::Confirmed { detection };
            FrameOutcome::Confirmed { changed }
        } else {
            self.state = WorkflowState::Detecting { pending: detection };
            FrameOutcome::Pending { changed }
        }
    }

    /// Feed the result of a still image; a detection confirms immediately
    pub fn on_still_image(&mut self, detection: Option<Detection>) -> FrameOutcome {
        if matches!(self.state, WorkflowState::Saving { .. }) {
            return FrameOutcome::Ignored;
        }

        match detection {
            Some(detection) => {
                let changed = self.remember(&detection.payload);
                self.state = WorkflowState::Confirmed { detection };
                FrameOutcome::Confirmed { changed }
            }
            None => {
                self.state = WorkflowState::Idle;
                self.last_payload = None;
                FrameOutcome::Cleared
            }
        }
    }

    /// Move to `Saving` if a confirmed detection exists and no save is running
    pub fn begin_save(&mut self) -> BeginSave {
        let detection = match &self.state {
            WorkflowState::Saving { .. } => return BeginSave::InProgress,
            WorkflowState::Idle | WorkflowState::Detecting { .. } => return BeginSave::NothingToSave,
            WorkflowState::Confirmed { detection }
            | WorkflowState::Saved { detection, .. }
            | WorkflowState::Duplicate { detection, .. } => detection.clone(),
        };
        self.state = WorkflowState::Saving {
            detection: detection.clone(),
        };
        BeginSave::Start(detection)
    }

    /// Record the store outcome of the in-flight save
    ///
    /// Returns false when no save was in flight.
    pub fn complete_save(&mut self, result: SaveResult) -> bool {
        let WorkflowState::Saving { detection } = &self.state else {
            return false;
        };
        let detection = detection.clone();
        self.state = match result {
            SaveResult::Saved(capture_id) => WorkflowState::Saved {
                detection,
                capture_id,
            },
            SaveResult::Duplicate(existing_id) => WorkflowState::Duplicate {
                detection,
                existing_id,
            },
        };
        true
    }

    /// Return a failed save to `Confirmed` so it can be retried
    pub fn fail_save(&mut self) -> bool {
        let WorkflowState::Saving { detection } = &self.state else {
            return false;
        };
        self.state = WorkflowState::Confirmed {
            detection: detection.clone(),
        };
        true
    }

    /// Clear pending and confirmed state; refused while a save is in flight
    pub fn reset(&mut self) -> bool {
        if matches!(self.state, WorkflowState::Saving { .. }) {
            return false;
        }
        self.state = WorkflowState::Idle;
        self.last_payload = None;
        true
    }

    /// Track the last payload seen, returning whether it changed
    fn remember(&mut self, payload: &str) -> bool {
        if self.last_payload.as_deref() == Some(payload) {
            return false;
        }
        self.last_payload = Some(payload.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(payload: &str) -> Detection {
        Detection::new(payload.to_string(), None)
    }

    fn confirmed(payload: &str) -> CaptureWorkflow {
        let mut workflow = CaptureWorkflow::new();
        workflow.on_frame(Some(detection(payload)));
        workflow.on_frame(Some(detection(payload)));
        workflow
    }

    #[test]
    fn test_two_matching_frames_confirm() {
        let mut workflow = CaptureWorkflow::new();

        assert_eq!(
            workflow.on_frame(Some(detection("TAB1234567"))),
            FrameOutcome::Pending { changed: true }
        );
        assert_eq!(workflow.state().name(), "detecting");

        assert_eq!(
            workflow.on_frame(Some(detection("TAB1234567"))),
            FrameOutcome::Confirmed { changed: false }
        );
        assert_eq!(
            workflow.state(),
            &WorkflowState::Confirmed { detection: detection("TAB1234567") }
        );
    }

    #[test]
    fn test_differing_payload_restarts_detection() {
        let mut workflow = CaptureWorkflow::new();
        workflow.on_frame(Some(detection("TAB1111111")));

        assert_eq!(
            workflow.on_frame(Some(detection("TAB2222222"))),
            FrameOutcome::Pending { changed: true }
        );
        assert_eq!(
            workflow.state(),
            &WorkflowState::Detecting { pending: detection("TAB2222222") }
        );
    }

    #[test]
    fn test_missing_detection_returns_to_idle() {
        let mut workflow = CaptureWorkflow::new();
        workflow.on_frame(Some(detection("TAB1234567")));

        assert_eq!(workflow.on_frame(None), FrameOutcome::Cleared);
        assert_eq!(workflow.state(), &WorkflowState::Idle);

        // The pending payload is gone, so one more frame does not confirm
        assert!(matches!(
            workflow.on_frame(Some(detection("TAB1234567"))),
            FrameOutcome::Pending { changed: false }
        ));
    }

    #[test]
    fn test_confirmed_freezes_until_reset() {
        let mut workflow = confirmed("TAB1234567");

        assert_eq!(workflow.on_frame(None), FrameOutcome::Ignored);
        assert_eq!(workflow.on_frame(Some(detection("TXX0000000"))), FrameOutcome::Ignored);
        assert_eq!(workflow.state().name(), "confirmed");

        assert!(workflow.reset());
        assert_eq!(workflow.state(), &WorkflowState::Idle);
        assert!(!workflow.is_frozen());
    }

    #[test]
    fn test_save_is_exclusive() {
        let mut workflow = confirmed("TAB1234567");

        assert_eq!(workflow.begin_save(), BeginSave::Start(detection("TAB1234567")));
        assert_eq!(workflow.begin_save(), BeginSave::InProgress);
        assert!(!workflow.reset());
        assert_eq!(workflow.on_frame(None), FrameOutcome::Ignored);

        assert!(workflow.complete_save(SaveResult::Saved(7)));
        assert_eq!(
            workflow.state(),
            &WorkflowState::Saved { detection: detection("TAB1234567"), capture_id: 7 }
        );
    }

    #[test]
    fn test_second_save_becomes_duplicate() {
        let mut workflow = confirmed("TAB1234567");
        workflow.begin_save();
        workflow.complete_save(SaveResult::Saved(7));

        assert!(matches!(workflow.begin_save(), BeginSave::Start(_)));
        workflow.complete_save(SaveResult::Duplicate(7));
        assert_eq!(
            workflow.state(),
            &WorkflowState::Duplicate { detection: detection("TAB1234567"), existing_id: 7 }
        );
    }

    #[test]
    fn test_nothing_to_save() {
        let mut workflow = CaptureWorkflow::new();
        assert_eq!(workflow.begin_save(), BeginSave::NothingToSave);

        workflow.on_frame(Some(detection("TAB1234567")));
        assert_eq!(workflow.begin_save(), BeginSave::NothingToSave);
        assert!(!workflow.complete_save(SaveResult::Saved(1)));
    }

    #[test]
    fn test_failed_save_returns_to_confirmed() {
        let mut workflow = confirmed("TAB1234567");
        workflow.begin_save();

        assert!(workflow.fail_save());
        assert_eq!(workflow.state().name(), "confirmed");
        assert!(!workflow.fail_save());
    }

    #[test]
    fn test_still_image_confirms_immediately() {
        let mut workflow = CaptureWorkflow::new();

        assert_eq!(
            workflow.on_still_image(Some(detection("TAB1234567"))),
            FrameOutcome::Confirmed { changed: true }
        );
        assert_eq!(workflow.state().name(), "confirmed");

        assert_eq!(workflow.on_still_image(None), FrameOutcome::Cleared);
        assert_eq!(workflow.state(), &WorkflowState::Idle);
    }

    #[test]
    fn test_still_image_ignored_while_saving() {
        let mut workflow = confirmed("TAB1234567");
        workflow.begin_save();

        assert_eq!(
            workflow.on_still_image(Some(detection("TXY1111111"))),
            FrameOutcome::Ignored
        );
        assert_eq!(workflow.state().name(), "saving");
    }

    #[test]
    fn test_state_detection_accessor() {
        let workflow = confirmed("TAB1234567");
        assert_eq!(workflow.state().detection().unwrap().payload, "TAB1234567");
        assert!(CaptureWorkflow::new().state().detection().is_none());
    }
}
