//! Heading-based rotation tracker
//!
//! Converts a stream of absolute heading samples into the total angle
//! traveled since the capture session began.

use crate::utils::wrap_angle;

/// Completion tolerance used when no configuration is given (one degree).
pub const DEFAULT_ANGLE_TOLERANCE: f32 = 0.0174;

/// A single odometry reading
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OdometrySample {
    /// Absolute heading in radians, normalized to [0, 2π)
    pub heading: f32,
    /// Measured angular velocity in rad/s
    pub angular_velocity: f32,
}

impl OdometrySample {
    pub fn new(heading: f32, angular_velocity: f32) -> Self {
        Self {
            heading,
            angular_velocity,
        }
    }
}

/// Accumulates traveled angle from wrapping heading samples.
///
/// Only the magnitude of each step is accumulated: the robot is assumed to
/// turn in the commanded direction. If the base is pushed backwards the
/// accumulated angle still grows.
#[derive(Debug, Clone)]
pub struct OdometryTracker {
    /// Heading of the previous sample (None until seeded)
    last_heading: Option<f32>,
    /// Total angle traveled since the last reset (radians, never decreases)
    accumulated_angle: f32,
    /// Slack applied to `has_reached` so float noise cannot stall just short
    tolerance: f32,
}

impl OdometryTracker {
    /// Create a tracker with the given completion tolerance (radians)
    pub fn new(tolerance: f32) -> Self {
        Self {
            last_heading: None,
            accumulated_angle: 0.0,
            tolerance: tolerance.abs(),
        }
    }

    /// Feed a heading sample.
    ///
    /// The first sample after a reset only seeds the tracker.
    ///
    /// # Returns
    /// The shortest signed delta from the previous heading (0 when seeding)
    pub fn observe(&mut self, heading: f32) -> f32 {
        let delta = match self.last_heading {
            Some(last) => wrap_angle(heading - last),
            None => {
                tracing::trace!("OdometryTracker: seeded at {:.3}rad", heading);
                0.0
            }
        };

        self.accumulated_angle += delta.abs();
        self.last_heading = Some(heading);
        delta
    }

    /// Check whether the accumulated angle is within tolerance of `target`
    #[inline]
    pub fn has_reached(&self, target: f32) -> bool {
        self.accumulated_angle >= target - self.tolerance
    }

    /// Forget the seed heading and zero the accumulated angle
    pub fn reset(&mut self) {
        self.last_heading = None;
        self.accumulated_angle = 0.0;
    }

    pub fn accumulated_angle(&self) -> f32 {
        self.accumulated_angle
    }

    pub fn last_heading(&self) -> Option<f32> {
        self.last_heading
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }
}

impl Default for OdometryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ANGLE_TOLERANCE)
    }
}
