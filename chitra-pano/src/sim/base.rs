//! Simulated rotating base.
//!
//! Integrates the commanded angular velocity under an acceleration limit and
//! publishes wrapped, noisy heading samples at a fixed rate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::StandardNormal;

use crate::config::SimulationConfig;
use crate::error::{PanoError, Result};
use crate::node::PanoEvent;
use crate::odometry::OdometrySample;
use crate::utils::normalize_heading;

/// Atomic wrapper for f32 values.
/// Uses AtomicU32 with bit reinterpretation.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(val: f32) -> Self {
        Self(AtomicU32::new(val.to_bits()))
    }

    pub fn load(&self, order: Ordering) -> f32 {
        f32::from_bits(self.0.load(order))
    }

    pub fn store(&self, val: f32, order: Ordering) {
        self.0.store(val.to_bits(), order);
    }
}

/// Command channel into the base thread
#[derive(Debug)]
pub struct BaseCommand {
    angular: AtomicF32,
    shutdown: AtomicBool,
}

impl BaseCommand {
    pub fn new() -> Self {
        Self {
            angular: AtomicF32::new(0.0),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Set commanded angular velocity (rad/s)
    pub fn set_angular(&self, angular: f32) {
        self.angular.store(angular, Ordering::Release);
    }

    pub fn angular(&self) -> f32 {
        self.angular.load(Ordering::Acquire)
    }

    pub fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl Default for BaseCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// Gaussian heading noise with optional deterministic seed
struct HeadingNoise {
    rng: SmallRng,
    stddev: f32,
}

impl HeadingNoise {
    /// Seed 0 draws from entropy
    fn new(seed: u64, stddev: f32) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self { rng, stddev }
    }

    fn sample(&mut self) -> f32 {
        if self.stddev == 0.0 {
            return 0.0;
        }
        let n: f32 = self.rng.sample(StandardNormal);
        n * self.stddev
    }
}

/// Kinematic model of a base turning in place
pub struct SimulatedBase {
    /// True heading (unwrapped)
    heading: f32,
    /// Current angular velocity (rad/s)
    angular_velocity: f32,
    max_angular_accel: f32,
    noise: HeadingNoise,
}

impl SimulatedBase {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            heading: config.initial_heading,
            angular_velocity: 0.0,
            max_angular_accel: config.max_angular_accel.abs(),
            noise: HeadingNoise::new(config.seed, config.heading_noise_stddev),
        }
    }

    /// Advance by `dt` seconds towards `commanded` and read the sensors
    pub fn step(&mut self, dt: f32, commanded: f32) -> OdometrySample {
        let max_change = self.max_angular_accel * dt;
        let diff = commanded - self.angular_velocity;
        if diff.abs() <= max_change {
            self.angular_velocity = commanded;
        } else {
            self.angular_velocity += max_change * diff.signum();
        }

        self.heading += self.angular_velocity * dt;

        OdometrySample {
            heading: normalize_heading(self.heading + self.noise.sample()),
            angular_velocity: self.angular_velocity,
        }
    }

    /// Noise-free heading in [0, 2π)
    pub fn true_heading(&self) -> f32 {
        normalize_heading(self.heading)
    }

    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }
}

/// Spawn the base thread. It publishes odometry until shutdown or until the
/// event queue closes.
pub fn spawn_base(
    config: SimulationConfig,
    command: Arc<BaseCommand>,
    events: Sender<PanoEvent>,
) -> Result<JoinHandle<()>> {
    let period = Duration::try_from_secs_f32(1.0 / config.odometry_rate_hz).map_err(|e| {
        PanoError::Config(format!(
            "Invalid odometry rate {}Hz: {}",
            config.odometry_rate_hz, e
        ))
    })?;

    let handle = thread::Builder::new()
        .name("sim-base".into())
        .spawn(move || {
            let dt = period.as_secs_f32();
            let mut base = SimulatedBase::new(&config);

            tracing::info!(
                "SimulatedBase: publishing odometry at {:.0}Hz from heading {:.2}rad",
                config.odometry_rate_hz,
                base.true_heading()
            );

            while !command.should_shutdown() {
                let sample = base.step(dt, command.angular());
                if events.send(PanoEvent::Odometry(sample)).is_err() {
                    tracing::debug!("SimulatedBase: event queue closed");
                    break;
                }
                thread::sleep(period);
            }

            tracing::info!("SimulatedBase: stopped");
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quiet_config() -> SimulationConfig {
        SimulationConfig {
            heading_noise_stddev: 0.0,
            max_angular_accel: 1.0,
            initial_heading: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_acceleration_limit() {
        let mut base = SimulatedBase::new(&quiet_config());

        base.step(0.1, 1.0);
        assert_relative_eq!(base.angular_velocity(), 0.1, epsilon = 1e-6);

        for _ in 0..20 {
            base.step(0.1, 1.0);
        }
        assert_eq!(base.angular_velocity(), 1.0);
    }

    #[test]
    fn test_decelerates_to_exact_stop() {
        let mut base = SimulatedBase::new(&quiet_config());
        for _ in 0..20 {
            base.step(0.1, 0.5);
        }
        for _ in 0..10 {
            base.step(0.1, 0.0);
        }

        assert_eq!(base.angular_velocity(), 0.0);
        let sample = base.step(0.1, 0.0);
        assert_eq!(sample.angular_velocity, 0.0);
    }

    #[test]
    fn test_heading_wraps() {
        let config = SimulationConfig {
            initial_heading: 6.2,
            max_angular_accel: 100.0,
            ..quiet_config()
        };
        let mut base = SimulatedBase::new(&config);
        let sample = base.step(0.1, 1.0);

        assert!(sample.heading >= 0.0 && sample.heading < std::f32::consts::TAU);
        assert_relative_eq!(
            sample.heading,
            6.3 - std::f32::consts::TAU,
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let config = SimulationConfig {
            heading_noise_stddev: 0.01,
            seed: 7,
            ..quiet_config()
        };
        let mut a = SimulatedBase::new(&config);
        let mut b = SimulatedBase::new(&config);

        for _ in 0..50 {
            assert_eq!(a.step(0.02, 0.3), b.step(0.02, 0.3));
        }
    }

    #[test]
    fn test_spawn_rejects_bad_rate() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        for rate in [f32::NAN, 0.0, 1e-40] {
            let config = SimulationConfig {
                odometry_rate_hz: rate,
                ..quiet_config()
            };
            let result = spawn_base(config, Arc::new(BaseCommand::new()), tx.clone());
            assert!(matches!(result, Err(PanoError::Config(_))), "{}", rate);
        }
    }

    #[test]
    fn test_base_command() {
        let command = BaseCommand::new();
        command.set_angular(-0.4);
        assert_eq!(command.angular(), -0.4);

        assert!(!command.should_shutdown());
        command.signal_shutdown();
        assert!(command.should_shutdown());
    }
}
