use serde::Serialize;
use serde_json::Value;

use crate::commands::*;

/// Every controller method the panel issues.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetRobotState,
    StartSys,
    StopSys,
    InitClaw,
    SetClaw(SetClaw),
    MoveJoint(MoveJoint),
    StopMove,
    GetKinData,
    PowerDown,
    SetDo(SetDigitalOutput),
}

impl Command {
    pub fn method(&self) -> &'static str {
        match self {
            Command::GetRobotState => "get_robot_state",
            Command::StartSys => "start_sys",
            Command::StopSys => "stop_sys",
            Command::InitClaw => "init_claw",
            Command::SetClaw(_) => "set_claw",
            Command::MoveJoint(_) => "move_joint",
            Command::StopMove => "stop_move",
            Command::GetKinData => "get_kin_data",
            Command::PowerDown => "powerdown",
            Command::SetDo(_) => "set_do",
        }
    }

    /// Params are always a one-element array holding the options object.
    pub fn params(&self) -> Result<Value, serde_json::Error> {
        let options = match self {
            Command::SetClaw(p) => to_options(p)?,
            Command::MoveJoint(p) => to_options(p)?,
            Command::SetDo(p) => to_options(p)?,
            Command::GetRobotState
            | Command::StartSys
            | Command::StopSys
            | Command::InitClaw
            | Command::StopMove
            | Command::GetKinData
            | Command::PowerDown => to_options(&NoParams::default())?,
        };
        Ok(Value::Array(vec![options]))
    }
}

fn to_options<T: Serialize>(value: &T) -> Result<Value, serde_json::Error> {
    serde_json::to_value(value)
}
