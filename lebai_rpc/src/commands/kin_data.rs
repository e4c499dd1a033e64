use serde::Deserialize;
use serde_json::Value;

use crate::{JointPose, LebaiError};

#[derive(Deserialize)]
#[serde(untagged)]
enum JointArray {
    Flat(Vec<f64>),
    Nested { joint: Vec<f64> },
}

impl JointArray {
    fn into_values(self) -> Vec<f64> {
        match self {
            JointArray::Flat(values) => values,
            JointArray::Nested { joint } => joint,
        }
    }
}

/// Kinematic snapshot returned by `get_kin_data`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinData {
    /// Measured joint angles in radians.
    pub actual_joint_pose: [f64; 6],
}

impl KinData {
    /// Decodes the `result` member of a `get_kin_data` response.
    ///
    /// Accepts `actual_joint_pose` as a flat array or as `{"joint": [...]}`; a result that is
    /// itself an array is taken as the joint list.
    pub fn from_result(result: &Value) -> Result<Self, LebaiError> {
        let raw = match result {
            Value::Object(map) => map.get("actual_joint_pose").cloned().ok_or_else(|| {
                LebaiError::Protocol("kin data without actual_joint_pose".to_string())
            })?,
            Value::Array(_) => result.clone(),
            other => {
                return Err(LebaiError::Protocol(format!(
                    "unexpected kin data result: {}",
                    other
                )))
            }
        };

        let values = serde_json::from_value::<JointArray>(raw)
            .map_err(|e| LebaiError::Protocol(format!("joint array: {}", e)))?
            .into_values();

        if values.len() < 6 {
            return Err(LebaiError::Protocol(format!(
                "expected 6 joint values, got {}",
                values.len()
            )));
        }
        if values.iter().take(6).any(|v| !v.is_finite()) {
            return Err(LebaiError::Protocol("non-finite joint value".to_string()));
        }

        let mut actual_joint_pose = [0.0; 6];
        actual_joint_pose.copy_from_slice(&values[..6]);
        Ok(Self { actual_joint_pose })
    }

    pub fn joint_pose(&self) -> JointPose {
        JointPose::from_radians(self.actual_joint_pose)
    }
}
