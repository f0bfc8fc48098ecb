//! Deterministic doubles for the capture service and output sink.
//!
//! Test-only: nothing in the node or the binary uses these. They are public
//! so the integration tests under `tests/` can drive the orchestrator
//! without a capture service.
//!
//! `RecordingActionClient` records every outbound action instead of sending
//! it; tests synthesize the service's active/feedback/done callbacks by
//! calling the orchestrator directly.

use crate::action::{ActionClient, ActionRequest, CaptureGoal, GoalHandle, StitchedImage};
use crate::error::{PanoError, Result};
use crate::orchestrator::{CaptureOutcome, PanoSink};
use crate::rotation::Velocity2D;

/// Records outbound actions in call order
#[derive(Debug, Default)]
pub struct RecordingActionClient {
    pub requests: Vec<ActionRequest>,
    /// Make `send_goal` fail as if the service were unreachable
    pub fail_sends: bool,
    next_id: u64,
}

impl RecordingActionClient {
    pub fn goals_sent(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| matches!(r, ActionRequest::SendGoal { .. }))
            .count()
    }

    pub fn snapshots_for(&self, goal: GoalHandle) -> usize {
        self.count(|r| *r == ActionRequest::Snapshot(goal))
    }

    pub fn stops_for(&self, goal: GoalHandle) -> usize {
        self.count(|r| *r == ActionRequest::Stop(goal))
    }

    pub fn cancels_for(&self, goal: GoalHandle) -> usize {
        self.count(|r| *r == ActionRequest::Cancel(goal))
    }

    /// Stop triggers across all goals
    pub fn total_stops(&self) -> usize {
        self.count(|r| matches!(r, ActionRequest::Stop(_)))
    }

    fn count(&self, pred: impl Fn(&ActionRequest) -> bool) -> usize {
        self.requests.iter().filter(|r| pred(r)).count()
    }
}

impl ActionClient for RecordingActionClient {
    fn send_goal(&mut self, goal: CaptureGoal) -> Result<GoalHandle> {
        if self.fail_sends {
            return Err(PanoError::Action("capture service unreachable".into()));
        }
        self.next_id += 1;
        let handle = GoalHandle::new(self.next_id);
        self.requests.push(ActionRequest::SendGoal {
            goal: handle,
            request: goal,
        });
        Ok(handle)
    }

    fn cancel_goal(&mut self, goal: GoalHandle) -> Result<()> {
        self.requests.push(ActionRequest::Cancel(goal));
        Ok(())
    }

    fn trigger_snapshot(&mut self, goal: GoalHandle) -> Result<()> {
        self.requests.push(ActionRequest::Snapshot(goal));
        Ok(())
    }

    fn trigger_stop(&mut self, goal: GoalHandle) -> Result<()> {
        self.requests.push(ActionRequest::Stop(goal));
        Ok(())
    }
}

/// Collects everything the orchestrator publishes
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub velocities: Vec<Velocity2D>,
    pub logs: Vec<String>,
    pub outcomes: Vec<CaptureOutcome>,
}

impl RecordingSink {
    /// Number of log lines containing `pattern`, e.g. "-> Stopping"
    pub fn phase_logs(&self, pattern: &str) -> usize {
        self.logs.iter().filter(|l| l.contains(pattern)).count()
    }

    pub fn clear(&mut self) {
        self.velocities.clear();
        self.logs.clear();
        self.outcomes.clear();
    }
}

impl PanoSink for RecordingSink {
    fn publish_velocity(&mut self, velocity: Velocity2D) {
        self.velocities.push(velocity);
    }

    fn publish_log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn publish_outcome(&mut self, outcome: CaptureOutcome) {
        self.outcomes.push(outcome);
    }
}

/// Small grayscale strip, one 8-pixel tile per snapshot
pub fn synthetic_image(snapshots: u32) -> StitchedImage {
    let width = 8 * snapshots.max(1);
    let height = 4;
    let data = (0..width * height).map(|i| (i % 256) as u8).collect();
    StitchedImage {
        width,
        height,
        encoding: "mono8".to_string(),
        data,
    }
}
