//! Panorama request types and validation

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PanoError, Result};

/// Smallest stepwise snapshot interval (radians, about one degree)
pub const MIN_SNAP_INTERVAL: f32 = 0.0174;

/// How the base turns while the capture service takes pictures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Rotate at constant velocity; the service captures on its own schedule
    Continuous,
    /// Rotate to each interval boundary, stop, snap, repeat
    Stepwise,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuous => write!(f, "continuous"),
            Self::Stepwise => write!(f, "stepwise"),
        }
    }
}

/// Parameters of a single panorama session. Immutable once started.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanoramaRequest {
    pub mode: CaptureMode,
    /// Total angle to sweep (radians, > 0)
    pub target_angle: f32,
    /// Angle between snapshots in stepwise mode (radians, > 0)
    pub snap_interval: f32,
    /// Commanded angular velocity (rad/s, non-zero; sign sets direction)
    pub rotation_velocity: f32,
}

impl PanoramaRequest {
    pub fn continuous(target_angle: f32, rotation_velocity: f32) -> Self {
        Self {
            mode: CaptureMode::Continuous,
            target_angle,
            snap_interval: 0.0,
            rotation_velocity,
        }
    }

    pub fn stepwise(target_angle: f32, snap_interval: f32, rotation_velocity: f32) -> Self {
        Self {
            mode: CaptureMode::Stepwise,
            target_angle,
            snap_interval,
            rotation_velocity,
        }
    }

    /// Reject requests the state machine cannot execute
    pub fn validate(&self) -> Result<()> {
        if !self.target_angle.is_finite() || self.target_angle <= 0.0 {
            return Err(PanoError::InvalidRequest(format!(
                "angle must be positive, got {}",
                self.target_angle
            )));
        }
        if self.mode == CaptureMode::Stepwise
            && (!self.snap_interval.is_finite() || self.snap_interval < MIN_SNAP_INTERVAL)
        {
            return Err(PanoError::InvalidRequest(format!(
                "snap interval must be at least {}rad in stepwise mode, got {}",
                MIN_SNAP_INTERVAL, self.snap_interval
            )));
        }
        if !self.rotation_velocity.is_finite() || self.rotation_velocity == 0.0 {
            return Err(PanoError::InvalidRequest(format!(
                "rotation velocity must be non-zero, got {}",
                self.rotation_velocity
            )));
        }
        Ok(())
    }
}

impl fmt::Display for PanoramaRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            CaptureMode::Continuous => write!(
                f,
                "continuous {:.1}° at {:.2}rad/s",
                self.target_angle.to_degrees(),
                self.rotation_velocity
            ),
            CaptureMode::Stepwise => write!(
                f,
                "stepwise {:.1}° every {:.1}° at {:.2}rad/s",
                self.target_angle.to_degrees(),
                self.snap_interval.to_degrees(),
                self.rotation_velocity
            ),
        }
    }
}

/// Mode field of a service-style request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    Continuous,
    Stepwise,
    /// Stop the running panorama instead of starting one
    Stop,
}

/// Service-style take-panorama request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TakePanoRequest {
    pub mode: RequestMode,
    pub angle: f32,
    pub snap_interval: f32,
    pub rotation_velocity: f32,
}

impl TakePanoRequest {
    pub fn stop() -> Self {
        Self {
            mode: RequestMode::Stop,
            angle: 0.0,
            snap_interval: 0.0,
            rotation_velocity: 0.0,
        }
    }

    /// The panorama to start, or None for a stop request
    pub fn panorama(&self) -> Option<PanoramaRequest> {
        let mode = match self.mode {
            RequestMode::Continuous => CaptureMode::Continuous,
            RequestMode::Stepwise => CaptureMode::Stepwise,
            RequestMode::Stop => return None,
        };
        Some(PanoramaRequest {
            mode,
            target_angle: self.angle,
            snap_interval: self.snap_interval,
            rotation_velocity: self.rotation_velocity,
        })
    }
}

impl From<PanoramaRequest> for TakePanoRequest {
    fn from(request: PanoramaRequest) -> Self {
        Self {
            mode: match request.mode {
                CaptureMode::Continuous => RequestMode::Continuous,
                CaptureMode::Stepwise => RequestMode::Stepwise,
            },
            angle: request.target_angle,
            snap_interval: request.snap_interval,
            rotation_velocity: request.rotation_velocity,
        }
    }
}

/// Answer to a take-panorama request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStatus {
    /// Goal sent, session is Starting
    Started,
    /// Parameters invalid or the goal could not be sent; nothing changed
    Rejected,
    /// Another session is in progress
    Busy,
    /// A stop request was accepted
    Stopped,
}

impl<T> From<&Result<T>> for StartStatus {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Started,
            Err(PanoError::Busy(_)) => Self::Busy,
            Err(_) => Self::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_6, PI, TAU};

    #[test]
    fn test_valid_requests() {
        assert!(PanoramaRequest::continuous(TAU, 0.5).validate().is_ok());
        assert!(PanoramaRequest::stepwise(PI, FRAC_PI_6, -0.3).validate().is_ok());
        // Interval is ignored outside stepwise mode
        assert!(PanoramaRequest::continuous(PI, 0.5).validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_angle() {
        for angle in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let err = PanoramaRequest::continuous(angle, 0.5).validate().unwrap_err();
            assert!(matches!(err, PanoError::InvalidRequest(_)), "angle {angle}");
        }
    }

    #[test]
    fn test_rejects_bad_interval_in_stepwise() {
        let err = PanoramaRequest::stepwise(PI, 0.0, 0.5)
            .validate()
            .unwrap_err();
        assert!(matches!(err, PanoError::InvalidRequest(_)));

        let err = PanoramaRequest::stepwise(PI, -0.1, 0.5)
            .validate()
            .unwrap_err();
        assert!(matches!(err, PanoError::InvalidRequest(_)));

        let err = PanoramaRequest::stepwise(2.0, 1e-8, 0.3)
            .validate()
            .unwrap_err();
        assert!(matches!(err, PanoError::InvalidRequest(_)));
        assert!(
            PanoramaRequest::stepwise(PI, MIN_SNAP_INTERVAL, 0.3)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_rejects_zero_velocity() {
        let err = PanoramaRequest::continuous(PI, 0.0).validate().unwrap_err();
        assert!(matches!(err, PanoError::InvalidRequest(_)));
    }

    #[test]
    fn test_take_pano_request_modes() {
        let stop = TakePanoRequest::stop();
        assert_eq!(stop.panorama(), None);

        let original = PanoramaRequest::stepwise(PI, FRAC_PI_6, 0.4);
        let service: TakePanoRequest = original.into();
        assert_eq!(service.mode, RequestMode::Stepwise);
        assert_eq!(service.panorama(), Some(original));
    }

    #[test]
    fn test_status_from_result() {
        let ok: Result<()> = Ok(());
        assert_eq!(StartStatus::from(&ok), StartStatus::Started);

        let invalid: Result<()> = Err(PanoError::InvalidRequest("angle".into()));
        assert_eq!(StartStatus::from(&invalid), StartStatus::Rejected);

        let busy: Result<()> = Err(PanoError::Busy(crate::session::CapturePhase::Capturing));
        assert_eq!(StartStatus::from(&busy), StartStatus::Busy);
    }

    #[test]
    fn test_mode_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: CaptureMode,
        }
        let w: Wrapper = toml::from_str("mode = \"stepwise\"").unwrap();
        assert_eq!(w.mode, CaptureMode::Stepwise);
    }
}
