//! Capture orchestrator: the panorama state machine.
//!
//! Owns the single [`CaptureSession`], feeds odometry into the tracker, asks
//! the [`RotationController`] for commands and drives the capture service
//! through an [`ActionClient`]. Every input is a method call made from one
//! dispatch loop, so no two run concurrently and none block.
//!
//! ```text
//! Idle ──start──▶ Starting ──active──▶ Active ──next cycle──▶ Capturing
//!   ▲                │                                           │
//!   │           stop (premature)                       target reached / stop
//!   │                ▼                                           ▼
//!   ├────────────── Idle                 Stitching ◀────────── Stopping
//!   │                                     │     │
//!   └──── Done ◀──── stitched image ──────┘     └── failure / timeout ──▶ Error ──▶ Idle
//! ```

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::action::{
    ActionClient, ActionEvent, CaptureFeedback, CaptureGoal, CaptureResult, GoalHandle,
    StitchedImage,
};
use crate::config::CaptureConfig;
use crate::error::{PanoError, Result};
use crate::odometry::{OdometrySample, OdometryTracker};
use crate::request::{PanoramaRequest, StartStatus, TakePanoRequest};
use crate::rotation::{RotationController, Velocity2D, boundaries_exhausted};
use crate::session::{CapturePhase, CaptureSession};

/// Final result of a session, reported to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Stitched(StitchedImage),
    Failed(String),
}

/// Outputs of the orchestrator: velocity, log channel, and results
pub trait PanoSink {
    /// Publish an angular velocity command to the base
    fn publish_velocity(&mut self, velocity: Velocity2D);

    /// Human-readable log line mirrored to the caller
    fn publish_log(&mut self, message: &str);

    /// Final outcome of a session
    fn publish_outcome(&mut self, outcome: CaptureOutcome);
}

/// Panorama capture state machine
pub struct CaptureOrchestrator<C: ActionClient, S: PanoSink> {
    client: C,
    sink: S,
    tracker: OdometryTracker,
    controller: RotationController,
    session: CaptureSession,
    goal_template: CaptureGoal,
    stitch_timeout: Option<Duration>,
}

impl<C: ActionClient, S: PanoSink> CaptureOrchestrator<C, S> {
    pub fn new(config: &CaptureConfig, client: C, sink: S) -> Self {
        Self {
            client,
            sink,
            tracker: OdometryTracker::new(config.angle_tolerance),
            controller: RotationController::new(config.settle_velocity),
            session: CaptureSession::default(),
            goal_template: CaptureGoal {
                camera_topic: config.camera_topic.clone(),
                bag_location: config.bag_location.clone(),
            },
            stitch_timeout: config.stitch_timeout(),
        }
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Start a panorama.
    ///
    /// Validation happens before any state change: an invalid or busy
    /// request leaves the session untouched.
    pub fn start(&mut self, request: PanoramaRequest) -> Result<GoalHandle> {
        if self.session.phase != CapturePhase::Idle {
            let phase = self.session.phase;
            self.reject(&format!("start rejected, panorama in progress ({})", phase));
            return Err(PanoError::Busy(phase));
        }

        if let Err(e) = request.validate() {
            self.reject(&format!("start rejected: {}", e));
            return Err(e);
        }

        self.session = CaptureSession::for_request(request);
        self.tracker.reset();
        self.transition(CapturePhase::Starting, &format!("starting {}", request));

        match self.client.send_goal(self.goal_template.clone()) {
            Ok(goal) => {
                self.session.goal = Some(goal);
                debug!("CaptureOrchestrator: waiting for {} to go active", goal);
                Ok(goal)
            }
            Err(e) => {
                error!("CaptureOrchestrator: failed to send goal: {}", e);
                self.fail(&format!("could not send capture goal: {}", e));
                Err(e)
            }
        }
    }

    /// Service-style entry point: start, or stop when the request says so
    pub fn take_pano(&mut self, request: TakePanoRequest) -> StartStatus {
        match request.panorama() {
            Some(panorama) => StartStatus::from(&self.start(panorama)),
            None => {
                self.stop();
                StartStatus::Stopped
            }
        }
    }

    /// External stop request. Idempotent.
    pub fn stop(&mut self) {
        match self.session.phase {
            CapturePhase::Starting => {
                // The service errors on stitch without snapshots, so withdraw
                // the goal instead of sending a stop trigger
                info!("CaptureOrchestrator: stop before goal went active");
                if let Some(goal) = self.session.goal
                    && let Err(e) = self.client.cancel_goal(goal)
                {
                    warn!("CaptureOrchestrator: failed to cancel {}: {}", goal, e);
                }
                self.return_to_idle("stopped before capture began");
            }
            CapturePhase::Active | CapturePhase::Capturing => {
                self.begin_stop("stop requested");
            }
            phase => {
                debug!("CaptureOrchestrator: stop ignored in {}", phase);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Odometry
    // ------------------------------------------------------------------------

    /// Process one odometry sample
    pub fn on_odometry(&mut self, sample: OdometrySample) {
        if self.session.phase == CapturePhase::Active && self.session.go_active {
            self.begin_capturing();
        }
        if self.session.phase != CapturePhase::Capturing {
            return;
        }

        self.tracker.observe(sample.heading);

        let Some(request) = self.session.request else {
            return;
        };

        let step = self.controller.step(
            self.session.phase,
            &request,
            &self.tracker,
            self.session.next_boundary,
            sample.angular_velocity,
        );
        // A finished sweep is halted by begin_stop
        if !step.finished {
            self.sink.publish_velocity(step.velocity);
        }

        if step.settling {
            debug!(
                "CaptureOrchestrator: waiting for base to settle ({:.3}rad/s)",
                sample.angular_velocity
            );
        }

        let mut finished = step.finished;
        if step.snapshot_due {
            self.snap();
            self.advance_boundary(&request);
            finished = boundaries_exhausted(
                &request,
                self.session.next_boundary,
                self.tracker.tolerance(),
            );
        }

        if finished {
            self.begin_stop(&format!(
                "sweep complete ({:.1}°)",
                self.tracker.accumulated_angle().to_degrees()
            ));
        }
    }

    // ------------------------------------------------------------------------
    // Action callbacks
    // ------------------------------------------------------------------------

    /// Route an inbound action event to its callback
    pub fn handle_action_event(&mut self, event: ActionEvent) {
        match event {
            ActionEvent::Active(goal) => self.on_active(goal),
            ActionEvent::Feedback(goal, feedback) => self.on_feedback(goal, feedback),
            ActionEvent::Done(goal, result) => self.on_done(goal, result),
        }
    }

    /// The capture service accepted the goal
    pub fn on_active(&mut self, goal: GoalHandle) {
        if !self.is_current(goal) {
            debug!("CaptureOrchestrator: ignoring active for stale {}", goal);
            return;
        }
        if self.session.phase != CapturePhase::Starting {
            debug!(
                "CaptureOrchestrator: ignoring active for {} in {}",
                goal, self.session.phase
            );
            return;
        }

        self.session.go_active = true;
        self.transition(CapturePhase::Active, "capture goal accepted");
    }

    /// Snapshot progress from the capture service
    pub fn on_feedback(&mut self, goal: GoalHandle, feedback: CaptureFeedback) {
        if !self.is_current(goal) {
            debug!("CaptureOrchestrator: ignoring feedback for stale {}", goal);
            return;
        }

        self.session.snapshots_reported = feedback.snapshot_count;
        debug!(
            "CaptureOrchestrator: {} snapshots captured",
            feedback.snapshot_count
        );

        // First feedback means the camera has delivered a usable image
        if self.session.phase == CapturePhase::Active && self.session.go_active {
            self.begin_capturing();
        }
    }

    /// The capture goal reached a terminal state
    pub fn on_done(&mut self, goal: GoalHandle, result: CaptureResult) {
        if !self.is_current(goal) {
            debug!(
                "CaptureOrchestrator: ignoring done ({}) for stale {}",
                result.state, goal
            );
            return;
        }

        match self.session.phase {
            CapturePhase::Stitching => {
                if !result.state.is_success() {
                    self.fail(&format!("capture service finished with {}", result.state));
                } else if let Some(image) = result.image {
                    self.complete(image);
                } else {
                    // Image follows on the stitched-image stream
                    self.session.goal = None;
                    debug!("CaptureOrchestrator: goal succeeded, awaiting stitched image");
                }
            }
            CapturePhase::Starting | CapturePhase::Active | CapturePhase::Capturing => {
                // Service ended the goal before we asked it to stitch
                self.sink.publish_velocity(Velocity2D::ZERO);
                self.fail(&format!(
                    "capture service ended goal early with {}",
                    result.state
                ));
            }
            phase => {
                debug!("CaptureOrchestrator: ignoring done in {}", phase);
            }
        }
    }

    /// Stitched panorama delivered on the image stream
    pub fn on_stitched_image(&mut self, image: StitchedImage) {
        if self.session.phase != CapturePhase::Stitching {
            warn!(
                "CaptureOrchestrator: unexpected stitched image in {}",
                self.session.phase
            );
            return;
        }
        self.complete(image);
    }

    /// Housekeeping; enforces the stitching deadline
    pub fn tick(&mut self, now: Instant) {
        if self.session.phase != CapturePhase::Stitching {
            return;
        }
        let (Some(timeout), Some(since)) = (self.stitch_timeout, self.session.stitching_since)
        else {
            return;
        };

        if now.saturating_duration_since(since) >= timeout {
            warn!(
                "CaptureOrchestrator: no stitched image after {:.1}s",
                timeout.as_secs_f32()
            );
            if let Some(goal) = self.session.goal
                && let Err(e) = self.client.cancel_goal(goal)
            {
                warn!("CaptureOrchestrator: failed to cancel {}: {}", goal, e);
            }
            self.fail(&format!(
                "stitching timed out after {:.1}s",
                timeout.as_secs_f32()
            ));
        }
    }

    /// Halt the base and abandon any session, e.g. on shutdown
    pub fn abort(&mut self, reason: &str) {
        if self.session.phase == CapturePhase::Idle {
            return;
        }
        self.sink.publish_velocity(Velocity2D::ZERO);
        if let Some(goal) = self.session.goal
            && let Err(e) = self.client.cancel_goal(goal)
        {
            warn!("CaptureOrchestrator: failed to cancel {}: {}", goal, e);
        }
        self.fail(reason);
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn phase(&self) -> CapturePhase {
        self.session.phase
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn tracker(&self) -> &OdometryTracker {
        &self.tracker
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    fn is_current(&self, goal: GoalHandle) -> bool {
        self.session.goal == Some(goal)
    }

    fn transition(&mut self, next: CapturePhase, detail: &str) {
        let message = format!("{} -> {}: {}", self.session.phase, next, detail);
        info!("CaptureOrchestrator: {}", message);
        self.sink.publish_log(&message);
        self.session.phase = next;
    }

    fn reject(&mut self, message: &str) {
        warn!("CaptureOrchestrator: {}", message);
        self.sink.publish_log(message);
    }

    fn begin_capturing(&mut self) {
        self.session.go_active = false;
        self.transition(CapturePhase::Capturing, "rotating");
    }

    fn snap(&mut self) {
        let Some(goal) = self.session.goal else {
            return;
        };
        match self.client.trigger_snapshot(goal) {
            Ok(()) => {
                self.session.snapshots_triggered += 1;
                debug!(
                    "CaptureOrchestrator: snapshot {} at {:.1}°",
                    self.session.snapshots_triggered,
                    self.tracker.accumulated_angle().to_degrees()
                );
            }
            Err(e) => warn!("CaptureOrchestrator: snapshot trigger failed: {}", e),
        }
    }

    /// Move to the first boundary not yet reached. A sparse odometry jump
    /// past several boundaries yields one snapshot, not one per boundary.
    fn advance_boundary(&mut self, request: &PanoramaRequest) {
        let tolerance = self.tracker.tolerance();
        let mut skipped = 0u32;
        self.session.next_boundary += request.snap_interval;
        while self.tracker.has_reached(self.session.next_boundary)
            && !boundaries_exhausted(request, self.session.next_boundary, tolerance)
        {
            self.session.next_boundary += request.snap_interval;
            skipped += 1;
        }
        if skipped > 0 {
            warn!(
                "CaptureOrchestrator: odometry jumped past {} snapshot boundaries",
                skipped
            );
        }
    }

    /// Capturing/Active -> Stopping -> Stitching
    fn begin_stop(&mut self, detail: &str) {
        self.transition(CapturePhase::Stopping, detail);
        self.sink.publish_velocity(Velocity2D::ZERO);

        let Some(goal) = self.session.goal else {
            self.fail("no capture goal to stop");
            return;
        };
        if let Err(e) = self.client.trigger_stop(goal) {
            error!("CaptureOrchestrator: stop trigger failed: {}", e);
            if let Err(e) = self.client.cancel_goal(goal) {
                warn!("CaptureOrchestrator: failed to cancel {}: {}", goal, e);
            }
            self.fail(&format!("could not trigger stitching: {}", e));
            return;
        }

        self.session.stitching_since = Some(Instant::now());
        self.transition(
            CapturePhase::Stitching,
            &format!(
                "stitching {} snapshots",
                self.session
                    .snapshots_reported
                    .max(self.session.snapshots_triggered)
            ),
        );
    }

    /// Stitching -> Done -> Idle
    fn complete(&mut self, image: StitchedImage) {
        self.transition(
            CapturePhase::Done,
            &format!(
                "panorama stitched ({}x{} {})",
                image.width, image.height, image.encoding
            ),
        );
        self.sink.publish_outcome(CaptureOutcome::Stitched(image));
        self.return_to_idle("ready");
    }

    /// Any phase -> Error -> Idle
    fn fail(&mut self, reason: &str) {
        self.transition(CapturePhase::Error, reason);
        self.sink
            .publish_outcome(CaptureOutcome::Failed(reason.to_string()));
        self.return_to_idle("ready");
    }

    fn return_to_idle(&mut self, detail: &str) {
        self.transition(CapturePhase::Idle, detail);
        self.session = CaptureSession::default();
    }
}
