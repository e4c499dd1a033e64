use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use lebai_rpc::protocol::{MoveJoint, SetClaw, SetDigitalOutput};
use lebai_rpc::GripperCommand;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::SimConfig;

pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const ROBOT_NOT_STARTED: i64 = -32000;
pub const INJECTED_FAULT: i64 = -32001;

/// One request as seen by the simulator, in arrival order.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// JSON-RPC id the request carried, if it was a number.
    pub id: Option<u64>,
    pub method: String,
    pub params: Value,
    pub at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcFault {
    pub code: i64,
    pub message: String,
}

impl RpcFault {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Motion {
    from: [f64; 6],
    to: [f64; 6],
    started: Instant,
    duration: Duration,
}

impl Motion {
    fn position_at(&self, now: Instant) -> [f64; 6] {
        if self.duration.is_zero() {
            return self.to;
        }
        let progress = (now.saturating_duration_since(self.started).as_secs_f64()
            / self.duration.as_secs_f64())
        .clamp(0.0, 1.0);

        let mut out = [0.0; 6];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.from[i] + (self.to[i] - self.from[i]) * progress;
        }
        out
    }

    fn finished(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.duration
    }
}

/// State of the simulated arm. Joint values are radians, as on the wire.
#[derive(Debug, Clone)]
pub struct SimRobot {
    config: SimConfig,
    joints: [f64; 6],
    motion: Option<Motion>,
    started: bool,
    claw_ready: bool,
    claw: GripperCommand,
    outputs: BTreeMap<(String, u32), u32>,
    calls: Vec<RecordedCall>,
}

impl SimRobot {
    pub fn new(config: SimConfig) -> Self {
        Self {
            joints: config.initial_joints_deg.map(f64::to_radians),
            started: config.started,
            config,
            motion: None,
            claw_ready: false,
            claw: GripperCommand::closed(),
            outputs: BTreeMap::new(),
            calls: Vec::new(),
        }
    }

    /// Executes one JSON-RPC method and returns the `result` member.
    pub fn handle(&mut self, method: &str, params: &Value) -> Result<Value, RpcFault> {
        self.handle_request(None, method, params)
    }

    /// Like [`SimRobot::handle`], also recording the request id.
    pub fn handle_request(
        &mut self,
        id: Option<u64>,
        method: &str,
        params: &Value,
    ) -> Result<Value, RpcFault> {
        let now = Instant::now();
        self.calls.push(RecordedCall {
            id,
            method: method.to_string(),
            params: params.clone(),
            at: now,
        });
        self.settle(now);

        if self.config.fails(method) {
            return Err(RpcFault::new(
                INJECTED_FAULT,
                format!("injected failure for {}", method),
            ));
        }

        match method {
            "get_robot_state" => {
                let state = self.state_name(now);
                if self.config.bare_state {
                    Ok(json!(state))
                } else {
                    Ok(json!({ "state": state }))
                }
            }
            "start_sys" => {
                self.started = true;
                info!("System started");
                Ok(json!({}))
            }
            "stop_sys" | "powerdown" => {
                self.freeze(now);
                self.started = false;
                info!("System stopped by {}", method);
                Ok(json!({}))
            }
            "init_claw" => {
                self.claw_ready = true;
                Ok(json!({}))
            }
            "set_claw" => {
                let claw: SetClaw = options(params)?;
                self.claw = claw.into();
                debug!("Claw -> {:?}", self.claw);
                Ok(json!({}))
            }
            "move_joint" => {
                self.require_started()?;
                let cmd: MoveJoint = options(params)?;
                self.start_motion(now, &cmd);
                Ok(json!({}))
            }
            "stop_move" => {
                self.freeze(now);
                Ok(json!({}))
            }
            "get_kin_data" => {
                let actual = self.current_joints(now);
                if self.config.malformed_kin_data {
                    return Ok(json!({ "actual_joint_pose": [actual[0]] }));
                }
                let target = self.motion.map(|m| m.to).unwrap_or(actual);
                Ok(json!({
                    "actual_joint_pose": actual,
                    "target_joint_pose": target,
                }))
            }
            "set_do" => {
                let output: SetDigitalOutput = options(params)?;
                self.outputs.insert((output.device, output.pin), output.value);
                Ok(json!({}))
            }
            other => Err(RpcFault::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        }
    }

    fn require_started(&self) -> Result<(), RpcFault> {
        if self.started {
            Ok(())
        } else {
            Err(RpcFault::new(ROBOT_NOT_STARTED, "robot is not started"))
        }
    }

    fn start_motion(&mut self, now: Instant, cmd: &MoveJoint) {
        let from = self.current_joints(now);
        let to = cmd.pose.joint.joint;

        let seconds = match cmd.param.t {
            Some(t) => t,
            None => {
                let travel = from
                    .iter()
                    .zip(to.iter())
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0, f64::max);
                travel / cmd.param.velocity.max(0.01)
            }
        };
        let scaled = seconds * self.config.time_scale;
        let duration = if scaled.is_finite() && scaled > 0.0 {
            Duration::from_secs_f64(scaled)
        } else {
            Duration::ZERO
        };

        debug!("Moving to {:?} over {:?}", to, duration);
        self.motion = Some(Motion {
            from,
            to,
            started: now,
            duration,
        });
    }

    fn settle(&mut self, now: Instant) {
        if let Some(motion) = self.motion {
            if motion.finished(now) {
                self.joints = motion.to;
                self.motion = None;
            }
        }
    }

    fn freeze(&mut self, now: Instant) {
        if let Some(motion) = self.motion.take() {
            self.joints = motion.position_at(now);
        }
    }

    fn state_name(&self, now: Instant) -> &'static str {
        if self.config.stuck_moving {
            "MOVING"
        } else if !self.started {
            "ROBOT_OFF"
        } else if self.is_moving(now) {
            "MOVING"
        } else {
            "IDLE"
        }
    }

    pub fn is_moving(&self, now: Instant) -> bool {
        self.motion.map(|m| !m.finished(now)).unwrap_or(false)
    }

    pub fn current_joints(&self, now: Instant) -> [f64; 6] {
        match self.motion {
            Some(motion) => motion.position_at(now),
            None => self.joints,
        }
    }

    pub fn joints_deg(&self) -> [f64; 6] {
        self.current_joints(Instant::now()).map(f64::to_degrees)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn claw_ready(&self) -> bool {
        self.claw_ready
    }

    pub fn claw(&self) -> GripperCommand {
        self.claw
    }

    pub fn output(&self, device: &str, pin: u32) -> Option<u32> {
        self.outputs.get(&(device.to_string(), pin)).copied()
    }

    pub fn calls(&self) -> &[RecordedCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn set_stuck_moving(&mut self, stuck: bool) {
        self.config.stuck_moving = stuck;
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }
}

fn options<T: DeserializeOwned>(params: &Value) -> Result<T, RpcFault> {
    let first = params
        .get(0)
        .cloned()
        .ok_or_else(|| RpcFault::new(INVALID_PARAMS, "params must be a one-element array"))?;
    serde_json::from_value(first).map_err(|e| RpcFault::new(INVALID_PARAMS, e.to_string()))
}
