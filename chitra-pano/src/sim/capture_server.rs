//! Mock capture/stitch service.
//!
//! Behaves like the real service as seen from the action protocol:
//!
//! - accepts a goal after a warm-up delay and reports the first snapshot
//! - snapshots on trigger, and periodically when auto-capture is enabled
//! - stitches on stop; stitching with no snapshots aborts the goal
//! - answers cancel (or a newer goal) with a preempted result
//!
//! On success the done result carries no image; the panorama follows as a
//! separate stitched-image event, the way the real service publishes it on
//! its own image stream.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::action::{
    ActionEvent, ActionRequest, CaptureFeedback, CaptureResult, GoalHandle, StitchedImage,
    TerminalState,
};
use crate::config::SimulationConfig;
use crate::error::Result;
use crate::node::PanoEvent;

/// Request polling interval
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Pixel size of one snapshot tile in the stitched strip
const TILE_WIDTH: u32 = 64;
const TILE_HEIGHT: u32 = 48;

/// Goal currently held by the server
struct ServerGoal {
    handle: GoalHandle,
    received_at: Instant,
    active: bool,
    snapshots: u32,
    last_capture: Instant,
    stop_requested_at: Option<Instant>,
}

/// Mock capture service driven by [`ActionRequest`]s
pub struct MockCaptureServer {
    requests: Receiver<ActionRequest>,
    events: Sender<PanoEvent>,
    warmup: Duration,
    capture_period: Option<Duration>,
    stitch_delay: Duration,
    goal: Option<ServerGoal>,
}

impl MockCaptureServer {
    /// Create a server.
    ///
    /// # Arguments
    /// * `auto_capture` - Take snapshots every `capture_period_ms` on its own
    ///   (continuous panoramas) in addition to triggered ones
    pub fn new(
        config: &SimulationConfig,
        auto_capture: bool,
        requests: Receiver<ActionRequest>,
        events: Sender<PanoEvent>,
    ) -> Self {
        let capture_period = (auto_capture && config.capture_period_ms > 0)
            .then(|| Duration::from_millis(config.capture_period_ms));

        Self {
            requests,
            events,
            warmup: Duration::from_millis(config.warmup_ms),
            capture_period,
            stitch_delay: Duration::from_millis(config.stitch_delay_ms),
            goal: None,
        }
    }

    /// Serve until the request channel or the event queue closes
    pub fn run(&mut self) {
        tracing::info!("MockCaptureServer: ready");
        loop {
            match self.requests.recv_timeout(POLL_INTERVAL) {
                Ok(request) => {
                    if !self.handle_request(request) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if !self.advance(Instant::now()) {
                break;
            }
        }
        tracing::info!("MockCaptureServer: stopped");
    }

    /// Returns false once the event queue is closed
    fn handle_request(&mut self, request: ActionRequest) -> bool {
        let now = Instant::now();
        match request {
            ActionRequest::SendGoal { goal, request } => {
                if let Some(old) = self.goal.take() {
                    tracing::warn!("MockCaptureServer: {} preempted by {}", old.handle, goal);
                    if !self.emit(ActionEvent::Done(
                        old.handle,
                        CaptureResult::new(TerminalState::Preempted),
                    )) {
                        return false;
                    }
                }
                tracing::info!(
                    "MockCaptureServer: {} received (camera {}, bag {})",
                    goal,
                    request.camera_topic,
                    request.bag_location
                );
                self.goal = Some(ServerGoal {
                    handle: goal,
                    received_at: now,
                    active: false,
                    snapshots: 0,
                    last_capture: now,
                    stop_requested_at: None,
                });
                true
            }
            ActionRequest::Snapshot(handle) => {
                let capturing = self
                    .goal
                    .as_ref()
                    .is_some_and(|g| g.handle == handle && g.active && g.stop_requested_at.is_none());
                if capturing {
                    self.capture(now)
                } else {
                    tracing::warn!("MockCaptureServer: snapshot for {} ignored", handle);
                    true
                }
            }
            ActionRequest::Stop(handle) => {
                match self.goal.as_mut() {
                    Some(g) if g.handle == handle => {
                        tracing::info!(
                            "MockCaptureServer: stitching {} snapshots",
                            g.snapshots
                        );
                        g.stop_requested_at = Some(now);
                    }
                    _ => tracing::warn!("MockCaptureServer: stop for unknown {}", handle),
                }
                true
            }
            ActionRequest::Cancel(handle) => {
                if self.goal.as_ref().is_some_and(|g| g.handle == handle) {
                    self.goal = None;
                    tracing::info!("MockCaptureServer: {} cancelled", handle);
                    self.emit(ActionEvent::Done(
                        handle,
                        CaptureResult::new(TerminalState::Preempted),
                    ))
                } else {
                    true
                }
            }
        }
    }

    /// Time-driven behavior: warm-up, auto capture, stitching
    fn advance(&mut self, now: Instant) -> bool {
        let Some(goal) = self.goal.as_mut() else {
            return true;
        };

        if !goal.active {
            if now.duration_since(goal.received_at) < self.warmup {
                return true;
            }
            goal.active = true;
            let handle = goal.handle;
            tracing::debug!("MockCaptureServer: {} active", handle);
            if !self.emit(ActionEvent::Active(handle)) {
                return false;
            }
            // First image once the camera has warmed up
            return self.capture(now);
        }

        if let Some(stop_at) = goal.stop_requested_at {
            if now.duration_since(stop_at) < self.stitch_delay {
                return true;
            }
            let handle = goal.handle;
            let snapshots = goal.snapshots;
            self.goal = None;
            return self.finish(handle, snapshots);
        }

        if let Some(period) = self.capture_period
            && now.duration_since(goal.last_capture) >= period
        {
            return self.capture(now);
        }

        true
    }

    fn capture(&mut self, now: Instant) -> bool {
        let Some(goal) = self.goal.as_mut() else {
            return true;
        };
        goal.snapshots += 1;
        goal.last_capture = now;
        let event = ActionEvent::Feedback(
            goal.handle,
            CaptureFeedback {
                snapshot_count: goal.snapshots,
            },
        );
        self.emit(event)
    }

    fn finish(&mut self, handle: GoalHandle, snapshots: u32) -> bool {
        if snapshots == 0 {
            tracing::warn!("MockCaptureServer: nothing to stitch for {}", handle);
            return self.emit(ActionEvent::Done(
                handle,
                CaptureResult::new(TerminalState::Aborted),
            ));
        }

        if !self.emit(ActionEvent::Done(
            handle,
            CaptureResult::new(TerminalState::Succeeded),
        )) {
            return false;
        }
        self.events
            .send(PanoEvent::StitchedImage(render_strip(snapshots)))
            .is_ok()
    }

    fn emit(&self, event: ActionEvent) -> bool {
        self.events.send(PanoEvent::Action(event)).is_ok()
    }
}

/// Grayscale strip with one shaded tile per snapshot
pub fn render_strip(snapshots: u32) -> StitchedImage {
    let tiles = snapshots.max(1);
    let width = TILE_WIDTH * tiles;
    let height = TILE_HEIGHT;

    let mut data = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let tile = x / TILE_WIDTH;
            let base = (tile * 255 / tiles) as u8;
            let shade = base.saturating_add((y * 2) as u8 / 4);
            data.push(shade);
        }
    }

    StitchedImage {
        width,
        height,
        encoding: "mono8".to_string(),
        data,
    }
}

/// Spawn the server on its own thread
pub fn spawn_capture_server(
    config: &SimulationConfig,
    auto_capture: bool,
    requests: Receiver<ActionRequest>,
    events: Sender<PanoEvent>,
) -> Result<JoinHandle<()>> {
    let mut server = MockCaptureServer::new(config, auto_capture, requests, events);
    let handle = thread::Builder::new()
        .name("sim-capture".into())
        .spawn(move || server.run())?;
    Ok(handle)
}
