//! Single-threaded event loop.
//!
//! Odometry, capture-service callbacks, start/stop requests and stitched
//! images are all serialized onto one bounded channel and dispatched in
//! arrival order to the [`CaptureOrchestrator`]. Producers run on their own
//! threads and never touch the session directly.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::action::{ActionClient, ActionEvent, StitchedImage};
use crate::config::PanoConfig;
use crate::error::Result;
use crate::odometry::OdometrySample;
use crate::orchestrator::{CaptureOrchestrator, CaptureOutcome, PanoSink};
use crate::request::{PanoramaRequest, StartStatus, TakePanoRequest};
use crate::rotation::Velocity2D;
use crate::session::CapturePhase;

/// Input to the event loop
#[derive(Debug)]
pub enum PanoEvent {
    /// Service-style request; the status is sent on `reply` if present
    TakePano {
        request: TakePanoRequest,
        reply: Option<Sender<StartStatus>>,
    },
    /// Start with the configured default request
    StartDefault,
    Stop,
    Odometry(OdometrySample),
    Action(ActionEvent),
    StitchedImage(StitchedImage),
    /// Halt the base and leave the loop
    Shutdown,
}

/// Create the node's event queue
pub fn event_queue(capacity: usize) -> (Sender<PanoEvent>, Receiver<PanoEvent>) {
    bounded(capacity.max(1))
}

/// Output of the node, as seen by whoever drives the robot
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutput {
    Velocity(Velocity2D),
    Log(String),
    Outcome(CaptureOutcome),
}

/// [`PanoSink`] that forwards everything to a channel
pub struct ChannelSink {
    tx: Sender<NodeOutput>,
}

impl ChannelSink {
    pub fn new(tx: Sender<NodeOutput>) -> Self {
        Self { tx }
    }

    fn forward(&self, output: NodeOutput) {
        if self.tx.send(output).is_err() {
            tracing::warn!("PanoNode: output channel closed, dropping output");
        }
    }
}

impl PanoSink for ChannelSink {
    fn publish_velocity(&mut self, velocity: Velocity2D) {
        self.forward(NodeOutput::Velocity(velocity));
    }

    fn publish_log(&mut self, message: &str) {
        self.forward(NodeOutput::Log(message.to_string()));
    }

    fn publish_outcome(&mut self, outcome: CaptureOutcome) {
        self.forward(NodeOutput::Outcome(outcome));
    }
}

/// Owns the orchestrator and runs the dispatch loop
pub struct PanoNode<C: ActionClient, S: PanoSink> {
    orchestrator: CaptureOrchestrator<C, S>,
    default_request: PanoramaRequest,
    tick_interval: Duration,
}

impl<C: ActionClient, S: PanoSink> PanoNode<C, S> {
    pub fn new(config: &PanoConfig, client: C, sink: S) -> Self {
        Self {
            orchestrator: CaptureOrchestrator::new(&config.capture, client, sink),
            default_request: config.defaults.request(),
            tick_interval: config.node.tick_interval(),
        }
    }

    /// Process events until shutdown or until every sender is dropped
    pub fn run(&mut self, events: &Receiver<PanoEvent>) -> Result<()> {
        tracing::info!(
            "PanoNode: event loop started (default request: {})",
            self.default_request
        );

        let mut last_tick = Instant::now();
        loop {
            match events.recv_timeout(self.tick_interval) {
                Ok(event) => {
                    if !self.dispatch(event) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::info!("PanoNode: all event sources closed");
                    self.orchestrator.abort("event sources closed");
                    break;
                }
            }

            let now = Instant::now();
            if now.duration_since(last_tick) >= self.tick_interval {
                self.orchestrator.tick(now);
                last_tick = now;
            }
        }

        tracing::info!("PanoNode: event loop exited");
        Ok(())
    }

    /// Handle one event. Returns false when the loop should exit.
    pub fn dispatch(&mut self, event: PanoEvent) -> bool {
        match event {
            PanoEvent::TakePano { request, reply } => {
                let status = self.orchestrator.take_pano(request);
                if let Some(reply) = reply
                    && reply.send(status).is_err()
                {
                    tracing::debug!("PanoNode: requester went away before reply");
                }
            }
            PanoEvent::StartDefault => {
                // Outcome is already logged by the orchestrator
                let _ = self.orchestrator.start(self.default_request);
            }
            PanoEvent::Stop => self.orchestrator.stop(),
            PanoEvent::Odometry(sample) => self.orchestrator.on_odometry(sample),
            PanoEvent::Action(event) => self.orchestrator.handle_action_event(event),
            PanoEvent::StitchedImage(image) => self.orchestrator.on_stitched_image(image),
            PanoEvent::Shutdown => {
                tracing::info!("PanoNode: shutdown requested");
                self.orchestrator.abort("node shutting down");
                return false;
            }
        }
        true
    }

    pub fn phase(&self) -> CapturePhase {
        self.orchestrator.phase()
    }

    pub fn orchestrator(&self) -> &CaptureOrchestrator<C, S> {
        &self.orchestrator
    }
}
