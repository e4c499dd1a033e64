// cargo test -p robot_panel --test teaching_playback
mod common;

use std::time::{Duration, Instant};

use common::*;
use robot_panel::{
    parse_program, PanelError, PanelEvent, PlaybackOutcome, PlaybackState, ProgramError,
    StateConflict, TeachingAction, TeachingProgram, TeachingStep,
};
use sim::SimConfig;

fn write_program(dir: &tempfile::TempDir, json: &str) -> std::path::PathBuf {
    let path = dir.path().join("robot_teaching.json");
    std::fs::write(&path, json).unwrap();
    path
}

#[tokio::test]
async fn test_two_step_program_runs_on_schedule() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = connected_panel(&sim).await;
    let mut rx = panel.subscribe();
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(
        &dir,
        r#"{
            "name": "scenario",
            "totalDuration": 6,
            "steps": [
                {"stepNumber": 1, "name": "home", "time": 0, "duration": 2,
                 "action": {"type": "move_joint", "joints": [0, 0, 0, 0, 0, 0]}},
                {"stepNumber": 2, "name": "open", "time": 5, "duration": 1,
                 "action": {"type": "set_gripper", "position": 100}}
            ]
        }"#,
    );

    let started = Instant::now();
    let handle = panel.start_teaching_file(Some(path)).unwrap();
    assert!(panel.snapshot().teaching_running);

    let outcome = handle.join().await;
    assert!(matches!(outcome, PlaybackOutcome::Completed { .. }), "{:?}", outcome);

    let calls = sim.calls().await;
    let methods: Vec<&str> = calls.iter().map(|c| c.method.as_str()).collect();
    assert_eq!(methods, ["move_joint", "set_claw"]);
    assert!(calls[1].at.duration_since(started) >= Duration::from_secs(3));
    assert_eq!(calls[0].params[0]["param"]["t"], 2.0);
    assert_eq!(sim.claw().await.amplitude(), 100.0);
    assert_eq!(sim.claw().await.force(), 50.0);

    let snapshot = panel.snapshot();
    assert!(!snapshot.teaching_running);
    assert!(matches!(snapshot.playback, PlaybackState::Completed { .. }));
    assert_eq!(snapshot.gripper.amplitude(), 100.0);

    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&PanelEvent::TeachingMode(true)));
    assert_eq!(events.last(), Some(&PanelEvent::TeachingMode(false)));
    assert!(teaching_statuses(&events)
        .iter()
        .any(|s| s.starts_with("Completed!")));
}

#[tokio::test]
async fn test_steps_run_in_start_time_order() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = connected_panel(&sim).await;
    let parsed = parse_program(
        r#"{"name": "shuffled", "steps": [
            {"stepNumber": 3, "name": "light", "time": 0.3,
             "action": {"type": "set_do", "device": "flange", "pin": 1, "value": 1}},
            {"stepNumber": 1, "name": "reach", "startTime": 0,
             "action": {"type": "MoveJoint", "joints": [10, 0, 0, 0, 0, 0], "velocity": -1, "acceleration": 2}},
            {"stepNumber": 2, "name": "grip", "time": 0.1,
             "action": {"type": "SET_GRIPPER", "gripperPosition": 40, "gripperForce": -1}}
        ]}"#,
    )
    .unwrap();

    let handle = panel.start_teaching(parsed.program).unwrap();
    handle.join().await;

    let calls = sim.calls().await;
    let methods: Vec<&str> = calls.iter().map(|c| c.method.as_str()).collect();
    assert_eq!(methods, ["move_joint", "set_claw", "set_do"]);

    let param = &calls[0].params[0]["param"];
    assert_eq!(param["velocity"], 0.5);
    assert_eq!(param["acc"], 2.0);
    assert_pose_near(move_target_deg(&calls[0].params), [10.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    assert_pose_near(panel.snapshot().joints.degrees(), [10.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

    assert_eq!(sim.claw().await.amplitude(), 40.0);
    assert_eq!(sim.claw().await.force(), 50.0);
    assert_eq!(sim.output("FLANGE", 1).await, Some(1));
}

#[tokio::test]
async fn test_cancel_during_wait_stops_before_next_step() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = connected_panel(&sim).await;
    let mut rx = panel.subscribe();
    let parsed = parse_program(
        r#"{"name": "long", "steps": [
            {"time": 0, "action": {"type": "move_joint", "joints": [5, 5, 5, 0, 0, 0]}},
            {"time": 10, "action": {"type": "set_gripper", "position": 80}}
        ]}"#,
    )
    .unwrap();

    let handle = panel.start_teaching(parsed.program).unwrap();
    wait_for(&mut rx, Duration::from_secs(2), |e| {
        matches!(e, PanelEvent::TeachingStatus(s) if s.starts_with("Waiting"))
    })
    .await
    .expect("playback reached the inter-step wait");

    assert!(panel.stop_teaching().await);
    let outcome = tokio::time::timeout(Duration::from_secs(1), handle.join())
        .await
        .expect("playback ends promptly");
    assert_eq!(outcome, PlaybackOutcome::Cancelled);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(sim.methods().await, vec!["move_joint", "stop_move"]);

    let snapshot = panel.snapshot();
    assert!(!snapshot.teaching_running);
    assert_eq!(snapshot.playback, PlaybackState::Cancelled);

    let events = drain(&mut rx);
    assert!(teaching_statuses(&events).contains(&"Stopped by user".to_string()));
    assert_eq!(events.last(), Some(&PanelEvent::TeachingMode(false)));

    // Nothing left to stop.
    assert!(!panel.stop_teaching().await);
}

#[tokio::test]
async fn test_malformed_file_is_rejected_without_robot_traffic() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = connected_panel(&sim).await;
    let mut rx = panel.subscribe();
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(&dir, r#"{"name": "no steps here"}"#);

    let result = panel.start_teaching_file(Some(path));
    assert!(matches!(
        result,
        Err(PanelError::Program(ProgramError::MissingSteps))
    ));

    let missing = panel.start_teaching_file(Some(dir.path().join("absent.json")));
    assert!(matches!(missing, Err(PanelError::Program(ProgramError::Io { .. }))));

    settle().await;
    assert!(sim.methods().await.is_empty());
    assert!(!panel.snapshot().teaching_running);

    let statuses = teaching_statuses(&drain(&mut rx));
    assert!(statuses[0].starts_with("Invalid teaching file"), "{:?}", statuses);
    assert!(statuses[1].starts_with("Teaching file not found"), "{:?}", statuses);
}

#[tokio::test]
async fn test_program_without_executable_steps_is_rejected() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = connected_panel(&sim).await;
    let mut rx = panel.subscribe();
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(
        &dir,
        r#"{"steps": [
            {"time": 0, "action": {"type": "dance"}},
            {"time": 1, "action": {"type": "move_joint", "joints": [1, 2, 3]}}
        ]}"#,
    );

    assert!(matches!(
        panel.start_teaching_file(Some(path)),
        Err(PanelError::Program(ProgramError::Empty))
    ));
    assert!(matches!(
        panel.start_teaching(TeachingProgram::new("empty", Vec::new())),
        Err(PanelError::Program(ProgramError::Empty))
    ));

    assert!(!panel.snapshot().teaching_running);
    assert!(sim.methods().await.is_empty());
    let statuses = teaching_statuses(&drain(&mut rx));
    assert!(statuses.iter().all(|s| s.starts_with("Invalid teaching")), "{:?}", statuses);
}

#[tokio::test]
async fn test_manual_control_is_locked_while_teaching() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = connected_panel(&sim).await;
    let parsed = parse_program(
        r#"{"steps": [{"time": 3, "duration": 1, "action": {"type": "wait"}}]}"#,
    )
    .unwrap();

    let handle = panel.start_teaching(parsed.program.clone()).unwrap();

    assert!(matches!(
        panel.start_teaching(parsed.program),
        Err(PanelError::Conflict(StateConflict::TeachingRunning))
    ));
    assert!(matches!(
        panel.set_joint_angle(0, 20.0).await,
        Err(PanelError::Conflict(StateConflict::TeachingRunning))
    ));
    assert!(matches!(
        panel.jog_joint(1, 1.0).await,
        Err(PanelError::Conflict(StateConflict::TeachingRunning))
    ));
    assert!(matches!(
        panel.reset_sequential().await,
        Err(PanelError::Conflict(StateConflict::TeachingRunning))
    ));
    assert!(matches!(
        panel.set_gripper_amplitude(70.0),
        Err(PanelError::Conflict(StateConflict::TeachingRunning))
    ));
    assert!(matches!(
        panel.connect(&sim.host(), sim.port()).await,
        Err(PanelError::Conflict(StateConflict::TeachingRunning))
    ));

    // Stop is always allowed and does not end the run.
    panel.stop_motion().await.unwrap();
    assert!(panel.snapshot().teaching_running);

    assert!(panel.stop_teaching().await);
    assert_eq!(handle.join().await, PlaybackOutcome::Cancelled);
    assert_eq!(sim.methods().await, vec!["stop_move", "stop_move"]);
}

#[tokio::test]
async fn test_disconnect_cancels_teaching() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = connected_panel(&sim).await;
    let mut rx = panel.subscribe();
    let parsed = parse_program(
        r#"{"steps": [{"time": 3, "action": {"type": "set_gripper", "position": 60}}]}"#,
    )
    .unwrap();

    let handle = panel.start_teaching(parsed.program).unwrap();
    panel.disconnect().await;

    assert_eq!(handle.join().await, PlaybackOutcome::Cancelled);
    assert_eq!(sim.methods().await, vec!["stop_sys"]);
    assert!(!panel.snapshot().teaching_running);

    let events = drain(&mut rx);
    assert!(events.contains(&PanelEvent::TeachingMode(false)));
    assert!(teaching_statuses(&events).contains(&"Stopped: disconnected".to_string()));
}

#[tokio::test]
async fn test_teaching_needs_connection() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = robot_panel::RobotPanel::new(test_config(&sim)).unwrap();
    let parsed = parse_program(
        r#"{"steps": [{"time": 0, "action": {"type": "wait"}}]}"#,
    )
    .unwrap();

    assert!(matches!(
        panel.start_teaching(parsed.program),
        Err(PanelError::Conflict(StateConflict::NotConnected))
    ));
    assert!(!panel.snapshot().teaching_running);
}

#[tokio::test]
async fn test_unset_and_invalid_step_times_run_immediately() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = connected_panel(&sim).await;
    let program = TeachingProgram::new(
        "hand built",
        vec![
            TeachingStep {
                step_number: 1,
                name: "unset".to_string(),
                start_time: -1.0,
                duration: f64::NAN,
                action: TeachingAction::Wait,
            },
            TeachingStep {
                step_number: 2,
                name: "grip".to_string(),
                start_time: f64::NAN,
                duration: -1.0,
                action: TeachingAction::SetGripper {
                    position: Some(20.0),
                    force: None,
                },
            },
        ],
    );

    let handle = panel.start_teaching(program).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(2), handle.join())
        .await
        .expect("playback finishes");
    assert!(matches!(outcome, PlaybackOutcome::Completed { .. }), "{:?}", outcome);

    assert_eq!(sim.methods().await, vec!["set_claw"]);
    assert_eq!(sim.claw().await.amplitude(), 20.0);
    assert!(!panel.snapshot().teaching_running);
}

#[tokio::test]
async fn test_huge_step_duration_leaves_panel_usable() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = connected_panel(&sim).await;
    let parsed = parse_program(
        r#"{"steps": [{"time": 0, "duration": 1e20, "action": {"type": "wait"}}]}"#,
    )
    .unwrap();

    let handle = panel.start_teaching(parsed.program).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!handle.is_finished());
    assert!(panel.snapshot().teaching_running);

    assert!(panel.stop_teaching().await);
    assert!(!panel.snapshot().teaching_running);
    panel.set_joint_angle(0, 5.0).await.unwrap();
    assert_eq!(sim.methods().await, vec!["stop_move", "move_joint"]);
}
