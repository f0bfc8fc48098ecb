//! In-process simulation of the robot base and the capture service.
//!
//! Lets the node run end to end without hardware:
//!
//! - [`spawn_base`]: turns in place following the latest velocity command
//!   and publishes odometry samples onto the event queue
//! - [`spawn_capture_server`]: answers the action protocol, takes snapshots
//!   and produces a stitched strip image

mod base;
mod capture_server;

pub use base::{AtomicF32, BaseCommand, SimulatedBase, spawn_base};
pub use capture_server::{MockCaptureServer, render_strip, spawn_capture_server};
