//! Session scenarios driven through the public orchestrator API.
//!
//! The capture service is replaced by `RecordingActionClient`; its
//! callbacks are synthesized by calling the orchestrator directly.

use approx::assert_relative_eq;
use chitra_pano::config::CaptureConfig;
use chitra_pano::testing::{RecordingActionClient, RecordingSink, synthetic_image};
use chitra_pano::utils::normalize_heading;
use chitra_pano::{
    CaptureFeedback, CaptureOrchestrator, CaptureOutcome, CapturePhase, CaptureResult, GoalHandle,
    OdometrySample, PanoError, PanoramaRequest, RequestMode, StartStatus, TakePanoRequest,
    TerminalState, Velocity2D,
};
use std::f32::consts::{FRAC_PI_6, PI, TAU};
use std::time::{Duration, Instant};

type Orchestrator = CaptureOrchestrator<RecordingActionClient, RecordingSink>;

fn orchestrator() -> Orchestrator {
    CaptureOrchestrator::new(
        &CaptureConfig::default(),
        RecordingActionClient::default(),
        RecordingSink::default(),
    )
}

/// Start a request and walk it into Capturing
fn capturing(orch: &mut Orchestrator, request: PanoramaRequest, start_heading: f32) -> GoalHandle {
    let goal = orch.start(request).unwrap();
    orch.on_active(goal);
    orch.on_odometry(OdometrySample::new(start_heading, 0.0));
    assert_eq!(orch.phase(), CapturePhase::Capturing);
    goal
}

/// Feed a constant-rate turn of `step` radians per sample
fn turn(orch: &mut Orchestrator, heading: &mut f32, step: f32, samples: usize, rate: f32) {
    for _ in 0..samples {
        *heading += step;
        orch.on_odometry(OdometrySample::new(normalize_heading(*heading), rate));
    }
}

#[test]
fn test_full_sweep_across_heading_seam() {
    let mut orch = orchestrator();
    let mut heading = 5.5;
    let goal = capturing(&mut orch, PanoramaRequest::continuous(TAU, 0.5), heading);

    // 0.05 rad per sample; 2π needs ~126 samples, feed plenty more
    turn(&mut orch, &mut heading, 0.05, 200, 0.5);

    assert_eq!(orch.phase(), CapturePhase::Stitching);
    assert_eq!(orch.client().stops_for(goal), 1);
    assert_eq!(orch.sink().phase_logs("-> Stopping"), 1);

    // Rotation commands until the target, then a single halt
    let velocities = &orch.sink().velocities;
    assert_eq!(velocities.last(), Some(&Velocity2D::ZERO));
    assert!(
        velocities[..velocities.len() - 1]
            .iter()
            .all(|v| *v == Velocity2D::rotation(0.5))
    );

    let swept = orch.tracker().accumulated_angle();
    assert!(swept >= TAU - orch.tracker().tolerance());
    assert!(swept < TAU + 0.1);
}

#[test]
fn test_reverse_sweep() {
    let mut orch = orchestrator();
    let mut heading = 0.3;
    let goal = capturing(&mut orch, PanoramaRequest::continuous(PI, -0.5), heading);

    turn(&mut orch, &mut heading, -0.05, 100, -0.5);

    assert_eq!(orch.phase(), CapturePhase::Stitching);
    assert_eq!(orch.client().stops_for(goal), 1);
    assert!(orch.sink().velocities.contains(&Velocity2D::rotation(-0.5)));
}

#[test]
fn test_stepwise_half_turn_takes_six_snapshots() {
    let mut orch = orchestrator();
    let mut heading = 1.0;
    let goal = capturing(
        &mut orch,
        PanoramaRequest::stepwise(PI, FRAC_PI_6, 0.3),
        heading,
    );

    // Base reports zero angular velocity, so every boundary is settled
    turn(&mut orch, &mut heading, 0.01, 400, 0.0);

    assert_eq!(orch.client().snapshots_for(goal), 6);
    assert_eq!(orch.session().snapshots_triggered(), 6);
    assert_eq!(orch.client().stops_for(goal), 1);
    assert_eq!(orch.phase(), CapturePhase::Stitching);
}

#[test]
fn test_stepwise_settles_before_each_snapshot() {
    let mut orch = orchestrator();
    let goal = capturing(&mut orch, PanoramaRequest::stepwise(PI, FRAC_PI_6, 0.3), 0.0);

    // Reaches the first boundary still turning
    orch.on_odometry(OdometrySample::new(FRAC_PI_6 + 0.01, 0.3));
    assert_eq!(orch.client().snapshots_for(goal), 0);
    assert_eq!(orch.sink().velocities.last(), Some(&Velocity2D::ZERO));

    // Still coasting above the settle threshold
    orch.on_odometry(OdometrySample::new(FRAC_PI_6 + 0.02, 0.05));
    assert_eq!(orch.client().snapshots_for(goal), 0);

    orch.on_odometry(OdometrySample::new(FRAC_PI_6 + 0.02, 0.0));
    assert_eq!(orch.client().snapshots_for(goal), 1);
    assert_relative_eq!(orch.session().next_boundary(), 2.0 * FRAC_PI_6);

    // Resumes rotation towards the next boundary
    orch.on_odometry(OdometrySample::new(FRAC_PI_6 + 0.03, 0.0));
    assert_eq!(orch.sink().velocities.last(), Some(&Velocity2D::rotation(0.3)));
}

#[test]
fn test_stop_is_idempotent_in_every_phase() {
    // Idle
    let mut orch = orchestrator();
    orch.stop();
    orch.stop();
    assert_eq!(orch.phase(), CapturePhase::Idle);
    assert!(orch.client().requests.is_empty());
    assert!(orch.sink().logs.is_empty());

    // Capturing: first stop stitches, the rest are no-ops
    let goal = capturing(&mut orch, PanoramaRequest::continuous(TAU, 0.5), 0.0);
    orch.stop();
    orch.stop();
    orch.stop();
    assert_eq!(orch.phase(), CapturePhase::Stitching);
    assert_eq!(orch.client().stops_for(goal), 1);
    assert_eq!(orch.sink().phase_logs("-> Stopping"), 1);

    // Stopping is transient; Stitching ignores further stops
    orch.on_done(goal, CaptureResult::new(TerminalState::Succeeded));
    orch.stop();
    assert_eq!(orch.phase(), CapturePhase::Stitching);
    orch.on_stitched_image(synthetic_image(4));
    assert_eq!(orch.phase(), CapturePhase::Idle);

    // Active
    let goal = orch.start(PanoramaRequest::continuous(TAU, 0.5)).unwrap();
    orch.on_active(goal);
    assert_eq!(orch.phase(), CapturePhase::Active);
    orch.stop();
    orch.stop();
    assert_eq!(orch.phase(), CapturePhase::Stitching);
    assert_eq!(orch.client().stops_for(goal), 1);
}

#[test]
fn test_premature_stop_returns_to_idle() {
    let mut orch = orchestrator();
    let goal = orch.start(PanoramaRequest::continuous(TAU, 0.5)).unwrap();
    assert_eq!(orch.phase(), CapturePhase::Starting);
    orch.sink_mut().clear();

    orch.stop();

    assert_eq!(orch.phase(), CapturePhase::Idle);
    assert_eq!(orch.client().total_stops(), 0);
    assert_eq!(orch.client().cancels_for(goal), 1);
    assert_eq!(orch.sink().logs.len(), 1);
    assert!(orch.sink().logs[0].contains("Starting -> Idle"));
    assert!(orch.sink().outcomes.is_empty());

    // Callbacks from the withdrawn goal change nothing
    orch.on_active(goal);
    orch.on_done(goal, CaptureResult::new(TerminalState::Preempted));
    assert_eq!(orch.phase(), CapturePhase::Idle);
    assert_eq!(orch.sink().logs.len(), 1);
}

#[test]
fn test_invalid_requests_are_rejected() {
    let invalid = [
        PanoramaRequest::continuous(0.0, 0.5),
        PanoramaRequest::continuous(-PI, 0.5),
        PanoramaRequest::continuous(TAU, 0.0),
        PanoramaRequest::continuous(f32::NAN, 0.5),
        PanoramaRequest::stepwise(PI, 0.0, 0.3),
    ];

    for request in invalid {
        let mut orch = orchestrator();
        let err = orch.start(request).unwrap_err();
        assert!(matches!(err, PanoError::InvalidRequest(_)), "{:?}", request);
        assert_eq!(orch.phase(), CapturePhase::Idle);
        assert_eq!(orch.client().goals_sent(), 0);
        assert!(orch.sink().velocities.is_empty());
    }
}

#[test]
fn test_take_pano_statuses() {
    let mut orch = orchestrator();

    let rejected = TakePanoRequest {
        mode: RequestMode::Continuous,
        angle: 0.0,
        snap_interval: 0.0,
        rotation_velocity: 0.5,
    };
    assert_eq!(orch.take_pano(rejected), StartStatus::Rejected);
    assert_eq!(orch.phase(), CapturePhase::Idle);
    assert!(orch.sink().velocities.is_empty());

    let request = PanoramaRequest::stepwise(PI, FRAC_PI_6, 0.3);
    assert_eq!(orch.take_pano(request.into()), StartStatus::Started);
    assert_eq!(orch.take_pano(request.into()), StartStatus::Busy);
    assert_eq!(orch.client().goals_sent(), 1);

    // Stop before the goal goes active
    assert_eq!(orch.take_pano(TakePanoRequest::stop()), StartStatus::Stopped);
    assert_eq!(orch.phase(), CapturePhase::Idle);
}

#[test]
fn test_stitch_timeout_fails_session() {
    let mut orch = orchestrator();
    let goal = capturing(&mut orch, PanoramaRequest::continuous(TAU, 0.5), 0.0);
    orch.stop();
    let stopped_at = Instant::now();

    orch.tick(stopped_at + Duration::from_secs(30));
    assert_eq!(orch.phase(), CapturePhase::Stitching);

    orch.tick(stopped_at + Duration::from_secs(120));
    assert_eq!(orch.phase(), CapturePhase::Idle);
    assert_eq!(orch.client().cancels_for(goal), 1);
    assert_eq!(orch.sink().phase_logs("Stitching -> Error"), 1);
    assert!(matches!(
        orch.sink().outcomes.as_slice(),
        [CaptureOutcome::Failed(reason)] if reason.contains("timed out")
    ));

    // A late image is not attributed to anything
    orch.on_stitched_image(synthetic_image(2));
    assert_eq!(orch.sink().outcomes.len(), 1);
}

#[test]
fn test_stale_callbacks_ignored_in_new_session() {
    let mut orch = orchestrator();
    let old = orch.start(PanoramaRequest::continuous(TAU, 0.5)).unwrap();
    orch.stop();

    let new = capturing(&mut orch, PanoramaRequest::continuous(PI, 0.5), 0.0);
    assert_ne!(old, new);
    let logs_before = orch.sink().logs.len();

    orch.on_active(old);
    orch.on_feedback(old, CaptureFeedback { snapshot_count: 9 });
    orch.on_done(old, CaptureResult::new(TerminalState::Preempted));

    assert_eq!(orch.phase(), CapturePhase::Capturing);
    assert_eq!(orch.session().goal(), Some(new));
    assert_eq!(orch.session().snapshots_reported(), 0);
    assert_eq!(orch.sink().logs.len(), logs_before);
    assert!(orch.sink().outcomes.is_empty());
}

#[test]
fn test_service_abort_during_capture_halts_base() {
    let mut orch = orchestrator();
    let goal = capturing(&mut orch, PanoramaRequest::continuous(TAU, 0.5), 0.0);
    orch.on_odometry(OdometrySample::new(0.1, 0.5));

    orch.on_done(goal, CaptureResult::new(TerminalState::Lost));

    assert_eq!(orch.phase(), CapturePhase::Idle);
    assert_eq!(orch.sink().velocities.last(), Some(&Velocity2D::ZERO));
    assert_eq!(orch.sink().phase_logs("Capturing -> Error"), 1);
    assert_eq!(orch.client().total_stops(), 0);
}

#[test]
fn test_back_to_back_sessions() {
    let mut orch = orchestrator();

    for snapshots in 1..=3 {
        let mut heading = 0.0;
        let goal = capturing(&mut orch, PanoramaRequest::continuous(PI, 0.5), heading);
        orch.on_feedback(goal, CaptureFeedback { snapshot_count: snapshots });
        turn(&mut orch, &mut heading, 0.05, 80, 0.5);
        assert_eq!(orch.phase(), CapturePhase::Stitching);

        orch.on_done(
            goal,
            CaptureResult::new(TerminalState::Succeeded).with_image(synthetic_image(snapshots)),
        );
        assert_eq!(orch.phase(), CapturePhase::Idle);
    }

    assert_eq!(orch.client().goals_sent(), 3);
    assert_eq!(orch.client().total_stops(), 3);
    assert_eq!(orch.sink().outcomes.len(), 3);
    assert!(
        orch.sink()
            .outcomes
            .iter()
            .all(|o| matches!(o, CaptureOutcome::Stitched(_)))
    );
}
