//! Capture/stitch action protocol
//!
//! The capture service is an external collaborator with an asynchronous goal
//! lifecycle: goal accepted (active), feedback while snapshots accumulate,
//! and a terminal done result. The orchestrator talks to it only through
//! [`ActionClient`]; replies come back as [`ActionEvent`]s on the node's
//! event queue.

use crossbeam_channel::Sender;
use std::fmt;

use crate::error::{PanoError, Result};

/// Correlation token for one action goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GoalHandle(u64);

impl GoalHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for GoalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "goal#{}", self.0)
    }
}

/// Goal payload sent to the capture service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureGoal {
    /// Camera image topic the service should capture from
    pub camera_topic: String,
    /// Where the service records the captured snapshots
    pub bag_location: String,
}

/// Feedback published while the goal is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFeedback {
    /// Snapshots captured so far
    pub snapshot_count: u32,
}

/// Terminal state of a finished goal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Succeeded,
    /// The service gave up (e.g. stitching with no snapshots)
    Aborted,
    /// Cancelled on request
    Preempted,
    /// The service refused the goal
    Rejected,
    /// The service went away
    Lost,
}

impl TerminalState {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Aborted => "ABORTED",
            Self::Preempted => "PREEMPTED",
            Self::Rejected => "REJECTED",
            Self::Lost => "LOST",
        };
        f.write_str(name)
    }
}

/// Stitched panorama. The pixel payload is opaque to the orchestrator.
#[derive(Clone, PartialEq, Eq)]
pub struct StitchedImage {
    pub width: u32,
    pub height: u32,
    /// Pixel encoding, e.g. "mono8" or "rgb8"
    pub encoding: String,
    pub data: Vec<u8>,
}

impl fmt::Debug for StitchedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StitchedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("encoding", &self.encoding)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Result attached to the done callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub state: TerminalState,
    /// Present when the service delivers the image with the result rather
    /// than on its separate stitched-image stream
    pub image: Option<StitchedImage>,
}

impl CaptureResult {
    pub fn new(state: TerminalState) -> Self {
        Self { state, image: None }
    }

    pub fn with_image(mut self, image: StitchedImage) -> Self {
        self.image = Some(image);
        self
    }
}

/// Inbound callbacks from the capture service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionEvent {
    Active(GoalHandle),
    Feedback(GoalHandle, CaptureFeedback),
    Done(GoalHandle, CaptureResult),
}

impl ActionEvent {
    pub fn goal(&self) -> GoalHandle {
        match self {
            Self::Active(goal) | Self::Feedback(goal, _) | Self::Done(goal, _) => *goal,
        }
    }
}

/// Outbound capability of the capture service.
///
/// Every call is a fire-and-forget send; outcomes arrive later as
/// [`ActionEvent`]s.
pub trait ActionClient {
    /// Start a capture goal
    fn send_goal(&mut self, goal: CaptureGoal) -> Result<GoalHandle>;

    /// Abandon a goal without stitching
    fn cancel_goal(&mut self, goal: GoalHandle) -> Result<()>;

    /// Ask the service to take one snapshot now
    fn trigger_snapshot(&mut self, goal: GoalHandle) -> Result<()>;

    /// Stop capturing and stitch what was gathered
    fn trigger_stop(&mut self, goal: GoalHandle) -> Result<()>;
}

/// Wire-level request to the capture service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    SendGoal { goal: GoalHandle, request: CaptureGoal },
    Snapshot(GoalHandle),
    Stop(GoalHandle),
    Cancel(GoalHandle),
}

/// [`ActionClient`] that writes requests to a channel read by the service
pub struct ChannelActionClient {
    tx: Sender<ActionRequest>,
    next_id: u64,
}

impl ChannelActionClient {
    pub fn new(tx: Sender<ActionRequest>) -> Self {
        Self { tx, next_id: 1 }
    }

    fn send(&self, request: ActionRequest) -> Result<()> {
        self.tx
            .send(request)
            .map_err(|e| PanoError::Action(format!("capture service unreachable: {}", e)))
    }
}

impl ActionClient for ChannelActionClient {
    fn send_goal(&mut self, goal: CaptureGoal) -> Result<GoalHandle> {
        let handle = GoalHandle::new(self.next_id);
        self.next_id += 1;
        self.send(ActionRequest::SendGoal {
            goal: handle,
            request: goal,
        })?;
        tracing::debug!("ActionClient: sent {}", handle);
        Ok(handle)
    }

    fn cancel_goal(&mut self, goal: GoalHandle) -> Result<()> {
        self.send(ActionRequest::Cancel(goal))
    }

    fn trigger_snapshot(&mut self, goal: GoalHandle) -> Result<()> {
        self.send(ActionRequest::Snapshot(goal))
    }

    fn trigger_stop(&mut self, goal: GoalHandle) -> Result<()> {
        self.send(ActionRequest::Stop(goal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn goal() -> CaptureGoal {
        CaptureGoal {
            camera_topic: "camera/rgb/image_raw".into(),
            bag_location: "/tmp/pano.bag".into(),
        }
    }

    #[test]
    fn test_channel_client_forwards_requests() {
        let (tx, rx) = unbounded();
        let mut client = ChannelActionClient::new(tx);

        let handle = client.send_goal(goal()).unwrap();
        client.trigger_snapshot(handle).unwrap();
        client.trigger_stop(handle).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            ActionRequest::SendGoal {
                goal: handle,
                request: goal()
            }
        );
        assert_eq!(rx.try_recv().unwrap(), ActionRequest::Snapshot(handle));
        assert_eq!(rx.try_recv().unwrap(), ActionRequest::Stop(handle));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_handles_are_unique() {
        let (tx, _rx) = unbounded();
        let mut client = ChannelActionClient::new(tx);

        let a = client.send_goal(goal()).unwrap();
        let b = client.send_goal(goal()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_disconnected_service_is_an_action_error() {
        let (tx, rx) = unbounded();
        drop(rx);
        let mut client = ChannelActionClient::new(tx);

        let err = client.send_goal(goal()).unwrap_err();
        assert!(matches!(err, PanoError::Action(_)));
    }

    #[test]
    fn test_terminal_state_success() {
        assert!(TerminalState::Succeeded.is_success());
        assert!(!TerminalState::Aborted.is_success());
        assert!(!TerminalState::Preempted.is_success());
    }
}
