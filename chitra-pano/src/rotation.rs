//! Rotation controller
//!
//! Decides the angular velocity to command on each odometry cycle and when a
//! stepwise snapshot is due. Reads the tracker, never mutates it.

use crate::odometry::OdometryTracker;
use crate::request::{CaptureMode, PanoramaRequest};
use crate::session::CapturePhase;

/// Measured angular velocity below which the base counts as stopped (rad/s)
pub const DEFAULT_SETTLE_VELOCITY: f32 = 0.01;

/// 2D velocity command. Linear is always zero for panorama capture.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Velocity2D {
    /// Linear velocity (m/s)
    pub linear: f32,
    /// Angular velocity (rad/s)
    pub angular: f32,
}

impl Velocity2D {
    pub const ZERO: Velocity2D = Velocity2D {
        linear: 0.0,
        angular: 0.0,
    };

    /// Pure in-place rotation
    pub fn rotation(angular: f32) -> Self {
        Self {
            linear: 0.0,
            angular,
        }
    }

    /// Check if velocity is near zero
    pub fn is_zero(&self) -> bool {
        self.linear.abs() < 0.001 && self.angular.abs() < 0.001
    }
}

/// Result of one controller evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RotationStep {
    /// Command to publish this cycle
    pub velocity: Velocity2D,
    /// Stepwise: the boundary was reached and the base has settled
    pub snapshot_due: bool,
    /// Stepwise: the boundary was reached but the base is still coasting
    pub settling: bool,
    /// The sweep is complete; the session should stop
    pub finished: bool,
}

impl RotationStep {
    fn rotate(angular: f32) -> Self {
        Self {
            velocity: Velocity2D::rotation(angular),
            ..Self::default()
        }
    }

    fn hold() -> Self {
        Self::default()
    }

    fn finished() -> Self {
        Self {
            finished: true,
            ..Self::default()
        }
    }
}

/// Stateless rotation policy for both capture modes
#[derive(Debug, Clone)]
pub struct RotationController {
    settle_velocity: f32,
}

impl RotationController {
    pub fn new(settle_velocity: f32) -> Self {
        Self {
            settle_velocity: settle_velocity.abs(),
        }
    }

    /// Evaluate one cycle.
    ///
    /// # Arguments
    /// * `phase` - Current session phase; anything but Capturing holds still
    /// * `request` - The running panorama request
    /// * `tracker` - Angle traveled so far
    /// * `next_boundary` - Next stepwise snapshot boundary (ignored in continuous mode)
    /// * `measured_angular` - Latest measured angular velocity of the base
    pub fn step(
        &self,
        phase: CapturePhase,
        request: &PanoramaRequest,
        tracker: &OdometryTracker,
        next_boundary: f32,
        measured_angular: f32,
    ) -> RotationStep {
        if phase != CapturePhase::Capturing {
            return RotationStep::hold();
        }

        match request.mode {
            CaptureMode::Continuous => {
                if tracker.has_reached(request.target_angle) {
                    RotationStep::finished()
                } else {
                    RotationStep::rotate(request.rotation_velocity)
                }
            }
            CaptureMode::Stepwise => {
                if boundaries_exhausted(request, next_boundary, tracker.tolerance()) {
                    RotationStep::finished()
                } else if tracker.has_reached(next_boundary) {
                    let settled = measured_angular.abs() <= self.settle_velocity;
                    RotationStep {
                        snapshot_due: settled,
                        settling: !settled,
                        ..RotationStep::hold()
                    }
                } else {
                    RotationStep::rotate(request.rotation_velocity)
                }
            }
        }
    }

    pub fn settle_velocity(&self) -> f32 {
        self.settle_velocity
    }
}

impl Default for RotationController {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_VELOCITY)
    }
}

/// True once the next stepwise boundary lies beyond the target angle
#[inline]
pub fn boundaries_exhausted(request: &PanoramaRequest, next_boundary: f32, tolerance: f32) -> bool {
    next_boundary > request.target_angle + tolerance
}
