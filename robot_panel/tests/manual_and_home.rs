// cargo test -p robot_panel --test manual_and_home
mod common;

use std::time::Duration;

use common::*;
use robot_panel::{HomeStrategy, JogSteps, PanelError, PanelEvent, StateConflict};
use sim::SimConfig;

#[tokio::test]
async fn test_gripper_burst_sends_first_and_latest_value() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = connected_panel(&sim).await;

    assert!(panel.set_gripper_amplitude(10.0).unwrap());
    assert!(!panel.set_gripper_amplitude(20.0).unwrap());
    assert!(!panel.set_gripper_amplitude(30.0).unwrap());
    assert!(!panel.set_gripper_force(70.0).unwrap());
    assert!(!panel.set_gripper_amplitude(40.0).unwrap());
    assert!(!panel.tick());
    assert!(panel.snapshot().gripper_pending);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(panel.tick());
    assert!(!panel.tick());
    settle().await;

    let calls = sim.calls().await;
    let sent: Vec<(f64, f64)> = calls
        .iter()
        .filter(|c| c.method == "set_claw")
        .map(|c| {
            let p = &c.params[0];
            (p["amplitude"].as_f64().unwrap(), p["force"].as_f64().unwrap())
        })
        .collect();
    assert_eq!(sent, vec![(10.0, 50.0), (40.0, 70.0)]);
    assert_eq!(sim.claw().await.amplitude(), 40.0);

    let snapshot = panel.snapshot();
    assert_eq!(snapshot.gripper.amplitude(), 40.0);
    assert_eq!(snapshot.gripper.force(), 70.0);
    assert!(!snapshot.gripper_pending);
}

#[test]
fn test_gripper_input_outside_runtime_is_refused() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (sim, panel) = runtime.block_on(async {
        let sim = start_sim(SimConfig::fast()).await;
        let panel = connected_panel(&sim).await;
        (sim, panel)
    });
    let before = panel.snapshot().gripper;

    assert!(matches!(
        panel.set_gripper_amplitude(30.0),
        Err(PanelError::NoRuntime)
    ));
    assert!(!panel.tick());
    assert_eq!(panel.snapshot().gripper, before);
    assert!(!panel.snapshot().gripper_pending);

    runtime.block_on(async {
        settle().await;
        assert!(sim.methods().await.is_empty());
    });
}

#[tokio::test]
async fn test_gripper_values_are_clamped_and_nudged() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = connected_panel(&sim).await;

    panel.set_gripper_amplitude(250.0).unwrap();
    assert_eq!(panel.snapshot().gripper.amplitude(), 100.0);

    panel.nudge_gripper_amplitude(-1.0).unwrap();
    assert_eq!(panel.snapshot().gripper.amplitude(), 95.0);

    panel.set_jog_steps(JogSteps::new(1.0, 0.1, 20.0));
    panel.nudge_gripper_force(1.0).unwrap();
    assert_eq!(panel.snapshot().gripper.force(), 70.0);
}

#[tokio::test]
async fn test_jog_and_direct_entry_always_send() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = connected_panel(&sim).await;

    panel.jog_joint(0, 1.0).await.unwrap();
    panel.set_jog_steps(JogSteps::new(5.0, 0.1, 5.0));
    panel.jog_joint(0, -1.0).await.unwrap();
    panel.set_joint_angle(2, 400.0).await.unwrap();

    let calls = sim.calls().await;
    assert_eq!(calls.len(), 3);
    assert_pose_near(move_target_deg(&calls[0].params), [0.1, 0.0, 0.0, 0.0, 0.0, 0.0]);
    assert_pose_near(move_target_deg(&calls[1].params), [-4.9, 0.0, 0.0, 0.0, 0.0, 0.0]);
    assert_pose_near(move_target_deg(&calls[2].params), [-4.9, 0.0, 175.0, 0.0, 0.0, 0.0]);
    assert!(calls.iter().all(|c| c.params[0]["param"].get("t").is_none()));

    assert!(matches!(
        panel.set_joint_angle(6, 0.0).await,
        Err(PanelError::InvalidJoint(6))
    ));
}

#[tokio::test]
async fn test_non_finite_joint_input_is_rejected() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = connected_panel(&sim).await;
    panel.set_joint_angle(0, 30.0).await.unwrap();
    sim.clear_calls().await;
    let mut rx = panel.subscribe();

    assert!(matches!(
        panel.set_joint_angle(0, f64::NAN).await,
        Err(PanelError::NotFinite(_))
    ));
    assert!(matches!(
        panel.drag_joint(1, f64::NAN).await,
        Err(PanelError::NotFinite(_))
    ));
    assert!(matches!(
        panel.jog_joint(0, f64::NAN).await,
        Err(PanelError::NotFinite(_))
    ));
    assert!(matches!(
        panel.set_joint_angle(2, f64::INFINITY).await,
        Err(PanelError::NotFinite(_))
    ));

    panel.jog_joint(0, 0.0).await.unwrap();

    assert!(sim.methods().await.is_empty());
    assert_pose_near(panel.snapshot().joints.degrees(), [30.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let statuses = statuses(&drain(&mut rx));
    assert_eq!(statuses.len(), 4);
    assert!(statuses.iter().all(|s| s == "Invalid value ignored"), "{:?}", statuses);
}

#[tokio::test]
async fn test_non_finite_gripper_and_motion_input_changes_nothing() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = connected_panel(&sim).await;
    let before = panel.snapshot();

    assert!(matches!(
        panel.set_gripper_amplitude(f64::NAN),
        Err(PanelError::NotFinite(_))
    ));
    assert!(matches!(
        panel.nudge_gripper_force(f64::NAN),
        Err(PanelError::NotFinite(_))
    ));
    assert!(!panel.nudge_gripper_amplitude(0.0).unwrap());
    assert_eq!(panel.nudge_velocity(f64::NAN), before.motion);
    assert_eq!(panel.nudge_acceleration(0.0), before.motion);

    let after = panel.snapshot();
    assert_eq!(after.gripper, before.gripper);
    assert_eq!(after.motion, before.motion);
    settle().await;
    assert!(sim.methods().await.is_empty());
}

#[tokio::test]
async fn test_slider_drag_is_rate_limited() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = connected_panel(&sim).await;

    assert!(panel.drag_joint(1, 10.0).await.unwrap());
    assert!(!panel.drag_joint(1, 11.0).await.unwrap());
    assert!(!panel.drag_joint(1, 12.0).await.unwrap());
    assert_eq!(panel.snapshot().joints.joint(1), Some(12.0));
    assert_eq!(sim.methods().await, vec!["move_joint"]);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(panel.drag_joint(1, 13.0).await.unwrap());
    let calls = sim.calls().await;
    assert_eq!(calls.len(), 2);
    assert_pose_near(move_target_deg(&calls[1].params), [0.0, 13.0, 0.0, 0.0, 0.0, 0.0]);
}

#[tokio::test]
async fn test_motion_parameters_are_clamped() {
    let sim = start_sim(SimConfig::fast()).await;
    let panel = connected_panel(&sim).await;
    let mut rx = panel.subscribe();

    assert_eq!(panel.set_velocity(9.0).velocity(), 3.0);
    assert_eq!(panel.set_acceleration(0.0).acceleration(), 0.1);
    let nudged = panel.nudge_acceleration(1.0);
    assert!((nudged.acceleration() - 0.2).abs() < 1e-9);

    panel.set_joint_angle(0, 1.0).await.unwrap();
    let calls = sim.calls().await;
    assert_eq!(calls[0].params[0]["param"]["velocity"], 3.0);

    let events = drain(&mut rx);
    assert!(matches!(events[0], PanelEvent::Motion(m) if m.velocity() == 3.0));
}

#[tokio::test]
async fn test_sequential_reset_skips_joints_within_tolerance() {
    let sim = start_sim(SimConfig {
        initial_joints_deg: [0.2, 25.0, 0.0, 0.0, 0.4, 12.0],
        ..SimConfig::fast()
    })
    .await;
    let panel = connected_panel(&sim).await;
    let mut rx = panel.subscribe();

    panel.reset_sequential().await.unwrap();

    let calls = sim.calls().await;
    assert_eq!(calls[0].method, "get_kin_data");
    let targets: Vec<[f64; 6]> = calls
        .iter()
        .filter(|c| c.method == "move_joint")
        .map(|c| move_target_deg(&c.params))
        .collect();
    assert_eq!(targets.len(), 4);
    assert_pose_near(targets[0], [0.2, 25.0, 0.0, 0.0, 0.4, 0.0]);
    assert_pose_near(targets[1], [0.2, 25.0, 90.0, 0.0, 0.4, 0.0]);
    assert_pose_near(targets[2], [0.2, 0.0, 90.0, 0.0, 0.4, 0.0]);
    assert_pose_near(targets[3], [0.2, 0.0, 0.0, 0.0, 0.4, 0.0]);

    let methods: Vec<&str> = calls.iter().map(|c| c.method.as_str()).collect();
    assert_eq!(&methods[methods.len() - 2..], ["set_claw", "get_kin_data"]);
    assert_pose_near(panel.snapshot().joints.degrees(), [0.2, 0.0, 0.0, 0.0, 0.4, 0.0]);

    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&PanelEvent::Busy(true)));
    assert_eq!(events.last(), Some(&PanelEvent::Busy(false)));
    let statuses = statuses(&events);
    assert_eq!(statuses.iter().filter(|s| s.starts_with("Reset ")).count(), 4);
    assert!(statuses.contains(&"Home position reached".to_string()));
}

#[tokio::test]
async fn test_direct_home_keeps_local_joints_when_position_unreadable() {
    let sim = start_sim(SimConfig {
        malformed_kin_data: true,
        ..SimConfig::fast()
    })
    .await;
    let mut config = test_config(&sim);
    config.home.strategy = HomeStrategy::Direct;
    config.home.move_time_s = 2.0;
    let panel = connect(&sim, config).await;
    assert!(!panel.snapshot().position_synced);

    panel.set_joint_angle(0, 30.0).await.unwrap();
    panel.move_home().await.unwrap();

    let calls = sim.calls().await;
    let home_move = calls
        .iter()
        .filter(|c| c.method == "move_joint")
        .last()
        .unwrap();
    assert_eq!(home_move.params[0]["param"]["t"], 2.0);
    assert_pose_near(move_target_deg(&home_move.params), [0.0; 6]);
    assert_eq!(calls.last().unwrap().method, "get_kin_data");

    assert_pose_near(sim.joints_deg().await, [0.0; 6]);
    assert_pose_near(panel.snapshot().joints.degrees(), [30.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    assert!(!panel.snapshot().busy);
}

#[tokio::test]
async fn test_home_move_survives_idle_timeout() {
    let sim = start_sim(SimConfig::fast()).await;
    let mut config = test_config(&sim);
    config.idle.max_wait_ms = 150;
    let panel = connect(&sim, config).await;
    sim.set_stuck_moving(true).await;

    let started = std::time::Instant::now();
    panel.move_home().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(!panel.snapshot().busy);

    let methods = sim.methods().await;
    assert!(methods.iter().filter(|m| *m == "get_robot_state").count() >= 2);
    assert_eq!(&methods[methods.len() - 2..], ["set_claw", "get_kin_data"]);
}

#[tokio::test]
async fn test_operations_during_home_move() {
    let sim = start_sim(SimConfig::fast()).await;
    let mut config = test_config(&sim);
    config.idle.max_wait_ms = 1_000;
    let panel = connect(&sim, config).await;
    sim.set_stuck_moving(true).await;
    let mut rx = panel.subscribe();

    let home = {
        let panel = panel.clone();
        tokio::spawn(async move { panel.move_home().await })
    };
    wait_for(&mut rx, Duration::from_secs(1), |e| *e == PanelEvent::Busy(true))
        .await
        .expect("home move started");

    let snapshot = panel.snapshot();
    assert!(snapshot.busy && snapshot.moving_home);
    assert!(matches!(
        panel.set_joint_angle(0, 5.0).await,
        Err(PanelError::Conflict(StateConflict::Busy))
    ));
    assert!(matches!(
        panel.set_gripper_amplitude(50.0),
        Err(PanelError::Conflict(StateConflict::Busy))
    ));
    assert!(matches!(
        panel.reset_sequential().await,
        Err(PanelError::Conflict(StateConflict::Busy))
    ));

    // The emergency stop path stays open.
    panel.stop_motion().await.unwrap();
    sim.set_stuck_moving(false).await;

    home.await.unwrap().unwrap();
    assert!(sim.methods().await.contains(&"stop_move".to_string()));
    assert!(!panel.snapshot().busy);
}
