//! Configuration loading for ChitraPano

use crate::error::{PanoError, Result};
use crate::odometry::DEFAULT_ANGLE_TOLERANCE;
use crate::request::{CaptureMode, PanoramaRequest};
use crate::rotation::DEFAULT_SETTLE_VELOCITY;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Longest accepted stitching deadline (one day)
pub const MAX_STITCH_TIMEOUT_SECS: f32 = 86_400.0;

/// Accepted simulated odometry rates
pub const MIN_ODOMETRY_RATE_HZ: f32 = 0.1;
pub const MAX_ODOMETRY_RATE_HZ: f32 = 1000.0;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PanoConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Request used by the parameterless start signal
#[derive(Clone, Debug, Deserialize)]
pub struct DefaultsConfig {
    /// Capture mode (default: continuous)
    #[serde(default = "default_mode")]
    pub mode: CaptureMode,

    /// Sweep angle in degrees (default: 360)
    #[serde(default = "default_angle_deg")]
    pub angle_deg: f32,

    /// Stepwise snapshot interval in degrees (default: 30)
    #[serde(default = "default_snap_interval_deg")]
    pub snap_interval_deg: f32,

    /// Angular velocity in rad/s (default: 0.3)
    #[serde(default = "default_rotation_velocity")]
    pub rotation_velocity: f32,
}

/// Orchestration and capture-service parameters
#[derive(Clone, Debug, Deserialize)]
pub struct CaptureConfig {
    /// Completion tolerance in radians (default: 0.0174, one degree)
    #[serde(default = "default_angle_tolerance")]
    pub angle_tolerance: f32,

    /// Angular velocity below which the base counts as stopped (rad/s)
    #[serde(default = "default_settle_velocity")]
    pub settle_velocity: f32,

    /// Give up waiting for the stitched image after this long (0 = wait forever)
    #[serde(default = "default_stitch_timeout_secs")]
    pub stitch_timeout_secs: f32,

    /// Camera topic passed to the capture service
    #[serde(default = "default_camera_topic")]
    pub camera_topic: String,

    /// Snapshot recording location passed to the capture service
    #[serde(default = "default_bag_location")]
    pub bag_location: String,
}

/// Event loop parameters
#[derive(Clone, Debug, Deserialize)]
pub struct NodeConfig {
    /// Housekeeping tick period in milliseconds (default: 100)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Bounded event queue capacity (default: 256)
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

/// Simulated base and capture service
#[derive(Clone, Debug, Deserialize)]
pub struct SimulationConfig {
    /// Odometry publish rate in Hz (default: 50)
    #[serde(default = "default_odometry_rate_hz")]
    pub odometry_rate_hz: f32,

    /// Heading noise standard deviation in radians (default: 0.002)
    #[serde(default = "default_heading_noise_stddev")]
    pub heading_noise_stddev: f32,

    /// Angular acceleration limit of the base in rad/s² (default: 2.0)
    #[serde(default = "default_max_angular_accel")]
    pub max_angular_accel: f32,

    /// Starting heading in radians (default: 5.5, close to the 0/2π seam)
    #[serde(default = "default_initial_heading")]
    pub initial_heading: f32,

    /// Delay before the capture service accepts a goal (default: 300ms)
    #[serde(default = "default_warmup_ms")]
    pub warmup_ms: u64,

    /// Continuous-mode capture period (default: 500ms)
    #[serde(default = "default_capture_period_ms")]
    pub capture_period_ms: u64,

    /// Time the service takes to stitch (default: 200ms)
    #[serde(default = "default_stitch_delay_ms")]
    pub stitch_delay_ms: u64,

    /// Noise seed (0 = random each run)
    #[serde(default)]
    pub seed: u64,
}

/// Output configuration
#[derive(Clone, Debug, Deserialize)]
pub struct OutputConfig {
    /// Path to save the stitched panorama (PGM)
    #[serde(default = "default_image_path")]
    pub image_path: String,
}

// Default value functions
fn default_mode() -> CaptureMode {
    CaptureMode::Continuous
}
fn default_angle_deg() -> f32 {
    360.0
}
fn default_snap_interval_deg() -> f32 {
    30.0
}
fn default_rotation_velocity() -> f32 {
    0.3
}
fn default_angle_tolerance() -> f32 {
    DEFAULT_ANGLE_TOLERANCE
}
fn default_settle_velocity() -> f32 {
    DEFAULT_SETTLE_VELOCITY
}
fn default_stitch_timeout_secs() -> f32 {
    60.0
}
fn default_camera_topic() -> String {
    "camera/rgb".to_string()
}
fn default_bag_location() -> String {
    "/tmp/pano.bag".to_string()
}
fn default_tick_interval_ms() -> u64 {
    100
}
fn default_event_queue_capacity() -> usize {
    256
}
fn default_odometry_rate_hz() -> f32 {
    50.0
}
fn default_heading_noise_stddev() -> f32 {
    0.002
}
fn default_max_angular_accel() -> f32 {
    2.0
}
fn default_initial_heading() -> f32 {
    5.5
}
fn default_warmup_ms() -> u64 {
    300
}
fn default_capture_period_ms() -> u64 {
    500
}
fn default_stitch_delay_ms() -> u64 {
    200
}
fn default_image_path() -> String {
    "output/panorama.pgm".to_string()
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            angle_deg: default_angle_deg(),
            snap_interval_deg: default_snap_interval_deg(),
            rotation_velocity: default_rotation_velocity(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            angle_tolerance: default_angle_tolerance(),
            settle_velocity: default_settle_velocity(),
            stitch_timeout_secs: default_stitch_timeout_secs(),
            camera_topic: default_camera_topic(),
            bag_location: default_bag_location(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            odometry_rate_hz: default_odometry_rate_hz(),
            heading_noise_stddev: default_heading_noise_stddev(),
            max_angular_accel: default_max_angular_accel(),
            initial_heading: default_initial_heading(),
            warmup_ms: default_warmup_ms(),
            capture_period_ms: default_capture_period_ms(),
            stitch_delay_ms: default_stitch_delay_ms(),
            seed: 0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            image_path: default_image_path(),
        }
    }
}

impl DefaultsConfig {
    /// The default panorama request in radians
    pub fn request(&self) -> PanoramaRequest {
        PanoramaRequest {
            mode: self.mode,
            target_angle: self.angle_deg.to_radians(),
            snap_interval: self.snap_interval_deg.to_radians(),
            rotation_velocity: self.rotation_velocity,
        }
    }
}

impl CaptureConfig {
    /// Stitching deadline, or None when disabled
    pub fn stitch_timeout(&self) -> Option<Duration> {
        if self.stitch_timeout_secs > 0.0 {
            Duration::try_from_secs_f32(self.stitch_timeout_secs).ok()
        } else {
            None
        }
    }
}

impl NodeConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl PanoConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PanoError::Config(format!("Failed to read config file: {}", e)))?;
        let config: PanoConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the node cannot run with
    pub fn validate(&self) -> Result<()> {
        self.defaults.request().validate().map_err(|e| {
            PanoError::Config(format!("Invalid [defaults] panorama request: {}", e))
        })?;
        if self.capture.angle_tolerance < 0.0 {
            return Err(PanoError::Config(
                "capture.angle_tolerance must not be negative".into(),
            ));
        }
        if self.node.event_queue_capacity == 0 {
            return Err(PanoError::Config(
                "node.event_queue_capacity must be at least 1".into(),
            ));
        }
        let timeout = self.capture.stitch_timeout_secs;
        if !timeout.is_finite() || timeout > MAX_STITCH_TIMEOUT_SECS {
            return Err(PanoError::Config(format!(
                "capture.stitch_timeout_secs must be at most {}, got {}",
                MAX_STITCH_TIMEOUT_SECS, timeout
            )));
        }
        let rate = self.simulation.odometry_rate_hz;
        if !(MIN_ODOMETRY_RATE_HZ..=MAX_ODOMETRY_RATE_HZ).contains(&rate) {
            return Err(PanoError::Config(format!(
                "simulation.odometry_rate_hz must be in [{}, {}], got {}",
                MIN_ODOMETRY_RATE_HZ, MAX_ODOMETRY_RATE_HZ, rate
            )));
        }
        Ok(())
    }
}
