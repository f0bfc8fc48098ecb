//! Capture session state owned by the orchestrator

use std::fmt;
use std::time::Instant;

use crate::action::GoalHandle;
use crate::request::PanoramaRequest;

/// Lifecycle phase of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapturePhase {
    /// No session; start requests are accepted
    #[default]
    Idle,
    /// Goal sent, waiting for the capture service to accept it
    Starting,
    /// Goal accepted; rotation begins on the next cycle
    Active,
    /// Rotating and triggering snapshots
    Capturing,
    /// Halting the base and asking the service to stitch
    Stopping,
    /// Waiting for the stitched image
    Stitching,
    /// Stitched image received and reported
    Done,
    /// Session failed; failure reported
    Error,
}

impl CapturePhase {
    /// Phases in which an external stop request has an effect
    pub fn accepts_stop(&self) -> bool {
        matches!(self, Self::Starting | Self::Active | Self::Capturing)
    }
}

impl fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Starting => "Starting",
            Self::Active => "Active",
            Self::Capturing => "Capturing",
            Self::Stopping => "Stopping",
            Self::Stitching => "Stitching",
            Self::Done => "Done",
            Self::Error => "Error",
        };
        f.write_str(name)
    }
}

/// One end-to-end panorama attempt.
///
/// Only `CaptureOrchestrator` mutates this; an idle session carries no
/// request and no goal.
#[derive(Debug, Clone, Default)]
pub struct CaptureSession {
    pub(crate) phase: CapturePhase,
    pub(crate) request: Option<PanoramaRequest>,
    pub(crate) goal: Option<GoalHandle>,
    /// Set by the active callback; the next cycle promotes Active to Capturing
    pub(crate) go_active: bool,
    /// Next stepwise snapshot boundary (accumulated radians)
    pub(crate) next_boundary: f32,
    pub(crate) snapshots_triggered: u32,
    /// Latest snapshot count reported by the capture service
    pub(crate) snapshots_reported: u32,
    pub(crate) stitching_since: Option<Instant>,
}

impl CaptureSession {
    /// Fresh session for `request`, still in Idle until the orchestrator
    /// transitions it
    pub(crate) fn for_request(request: PanoramaRequest) -> Self {
        Self {
            request: Some(request),
            next_boundary: request.snap_interval,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn request(&self) -> Option<&PanoramaRequest> {
        self.request.as_ref()
    }

    pub fn goal(&self) -> Option<GoalHandle> {
        self.goal
    }

    pub fn next_boundary(&self) -> f32 {
        self.next_boundary
    }

    pub fn snapshots_triggered(&self) -> u32 {
        self.snapshots_triggered
    }

    pub fn snapshots_reported(&self) -> u32 {
        self.snapshots_reported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_acceptance() {
        assert!(CapturePhase::Starting.accepts_stop());
        assert!(CapturePhase::Active.accepts_stop());
        assert!(CapturePhase::Capturing.accepts_stop());

        for phase in [
            CapturePhase::Idle,
            CapturePhase::Stopping,
            CapturePhase::Stitching,
            CapturePhase::Done,
            CapturePhase::Error,
        ] {
            assert!(!phase.accepts_stop(), "{phase}");
        }
    }

    #[test]
    fn test_new_session_starts_at_first_boundary() {
        let request = PanoramaRequest::stepwise(3.0, 0.5, 0.2);
        let session = CaptureSession::for_request(request);

        assert_eq!(session.phase(), CapturePhase::Idle);
        assert_eq!(session.next_boundary(), 0.5);
        assert_eq!(session.goal(), None);
    }
}
