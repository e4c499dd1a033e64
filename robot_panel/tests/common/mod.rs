// Shared helpers for the panel integration tests.
#![allow(dead_code)]

use std::time::Duration;

use robot_panel::{PanelConfig, PanelEvent, RobotPanel};
use serde_json::Value;
use sim::{SimConfig, SimHandle};
use tokio::sync::broadcast::{self, error::TryRecvError};

/// Panel settings scaled down for tests: no auto home, short waits and grace period.
pub fn test_config(sim: &SimHandle) -> PanelConfig {
    let mut config = PanelConfig::default();
    config.robot.host = sim.host();
    config.robot.port = sim.port();
    config.robot.request_timeout_ms = 2_000;
    config.home.auto_home_on_connect = false;
    config.idle.max_wait_ms = 2_000;
    config.idle.poll_interval_ms = 10;
    config.teaching.completion_grace_ms = 100;
    config
}

pub async fn start_sim(config: SimConfig) -> SimHandle {
    sim::spawn(config).await.expect("simulator starts")
}

/// Connects a panel built from `config` and forgets the handshake traffic.
pub async fn connect(sim: &SimHandle, config: PanelConfig) -> RobotPanel {
    let panel = RobotPanel::new(config).expect("valid config");
    panel
        .connect(&sim.host(), sim.port())
        .await
        .expect("handshake succeeds");
    sim.clear_calls().await;
    panel
}

pub async fn connected_panel(sim: &SimHandle) -> RobotPanel {
    connect(sim, test_config(sim)).await
}

/// Waits for the first event matching `pred`, skipping everything else.
pub async fn wait_for(
    rx: &mut broadcast::Receiver<PanelEvent>,
    timeout: Duration,
    pred: impl Fn(&PanelEvent) -> bool,
) -> Option<PanelEvent> {
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Everything published so far.
pub fn drain(rx: &mut broadcast::Receiver<PanelEvent>) -> Vec<PanelEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => {}
            Err(_) => return events,
        }
    }
}

pub fn statuses(events: &[PanelEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            PanelEvent::Status(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

pub fn teaching_statuses(events: &[PanelEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            PanelEvent::TeachingStatus(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

/// Target of a recorded `move_joint` call, in degrees.
pub fn move_target_deg(params: &Value) -> [f64; 6] {
    let joints = params[0]["pose"]["joint"]["joint"]
        .as_array()
        .expect("move_joint carries six joints");
    let mut out = [0.0; 6];
    for (slot, value) in out.iter_mut().zip(joints) {
        *slot = value.as_f64().expect("numeric joint").to_degrees();
    }
    out
}

pub fn assert_pose_near(actual: [f64; 6], expected: [f64; 6]) {
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!((a - e).abs() < 1e-6, "J{}: {} != {} in {:?}", i + 1, a, e, actual);
    }
}

/// Lets detached sends reach the simulator.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
