use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::LebaiError;

/// Controller state reported by `get_robot_state`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RobotState {
    Disconnected,
    Estop,
    Booting,
    RobotOff,
    RobotOn,
    Idle,
    Paused,
    Moving,
    Updating,
    Starting,
    Stopping,
    Teaching,
    Stop,
    #[serde(other)]
    Unknown,
}

impl RobotState {
    /// Decodes the `result` member of a `get_robot_state` response.
    ///
    /// Firmware versions differ: some return the bare state name, others an object carrying
    /// it in a `state` field.
    pub fn from_result(result: &Value) -> Result<Self, LebaiError> {
        let name = match result {
            Value::String(name) => name.as_str(),
            Value::Object(map) => match map.get("state") {
                Some(Value::String(name)) => name.as_str(),
                Some(Value::Number(_)) => return Ok(RobotState::Unknown),
                _ => {
                    return Err(LebaiError::Protocol(format!(
                        "robot state object without state field: {}",
                        result
                    )))
                }
            },
            Value::Number(_) => return Ok(RobotState::Unknown),
            other => {
                return Err(LebaiError::Protocol(format!(
                    "unexpected robot state result: {}",
                    other
                )))
            }
        };
        Ok(serde_json::from_value(Value::String(name.to_uppercase()))
            .unwrap_or(RobotState::Unknown))
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, RobotState::Idle)
    }
}

/// Legacy idle check used by older firmware integrations: the raw body contains `"IDLE"`.
///
/// False positives are possible when nested data happens to contain the token.
pub fn body_reports_idle(body: &str) -> bool {
    body.contains("\"IDLE\"")
}
