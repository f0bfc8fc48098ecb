//! ChitraPano - Panorama capture orchestration for VacuumTiger
//!
//! Rotates the robot in place while an external capture service takes
//! snapshots, then asks the service to stitch them into a panorama.
//!
//! ## Capture modes
//!
//! - **Continuous**: rotate at constant speed until the target angle is
//!   covered; the capture service snapshots on its own schedule
//! - **Stepwise**: rotate to each interval boundary, wait for the base to
//!   settle, trigger one snapshot, repeat
//!
//! ## Architecture
//!
//! All inputs (odometry, capture-service callbacks, start/stop requests)
//! are serialized onto one event queue and handled by [`PanoNode`], which
//! owns the single [`CaptureOrchestrator`]. The capture service is reached
//! through the [`ActionClient`] trait, outputs leave through [`PanoSink`].
//! The [`sim`] module provides a simulated base and capture service.

pub mod action;
pub mod config;
pub mod error;
pub mod node;
pub mod odometry;
pub mod orchestrator;
pub mod request;
pub mod rotation;
pub mod session;
pub mod sim;
/// Test doubles for the orchestrator (test-only, not used by the node)
pub mod testing;
pub mod utils;

// Re-export commonly used types
pub use action::{
    ActionClient, ActionEvent, ActionRequest, CaptureFeedback, CaptureGoal, CaptureResult,
    ChannelActionClient, GoalHandle, StitchedImage, TerminalState,
};
pub use config::PanoConfig;
pub use error::{PanoError, Result};
pub use node::{ChannelSink, NodeOutput, PanoEvent, PanoNode, event_queue};
pub use odometry::{OdometrySample, OdometryTracker};
pub use orchestrator::{CaptureOrchestrator, CaptureOutcome, PanoSink};
pub use request::{CaptureMode, PanoramaRequest, RequestMode, StartStatus, TakePanoRequest};
pub use rotation::{RotationController, Velocity2D};
pub use session::{CapturePhase, CaptureSession};
