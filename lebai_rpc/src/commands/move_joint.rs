use int_enum::IntEnum;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{JointPose, MotionParameters};

/// Pose encoding understood by `move_joint`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntEnum)]
pub enum PoseKind {
    Cartesian = 0,
    Joint = 1,
}

impl Serialize for PoseKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8((*self).into())
    }
}

impl<'de> Deserialize<'de> for PoseKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        PoseKind::try_from(raw)
            .map_err(|_| serde::de::Error::custom(format!("unknown pose kind {}", raw)))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JointValues {
    /// Joint angles in radians, J1 first.
    pub joint: [f64; 6],
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PoseTarget {
    pub kind: PoseKind,
    pub joint: JointValues,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MoveParam {
    pub velocity: f64,
    pub acc: f64,
    /// Fixed move time in seconds; omitted from the wire when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<f64>,
}

/// Parameters of `move_joint`.
///
/// ```json
/// {"pose": {"kind": 1, "joint": {"joint": [0.0, 0.0, 0.0, 0.0, 0.0, 0.0]}},
///  "param": {"velocity": 0.5, "acc": 1.0, "t": 2.0}}
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MoveJoint {
    pub pose: PoseTarget,
    pub param: MoveParam,
}

impl MoveJoint {
    pub fn new(pose: &JointPose, motion: &MotionParameters) -> Self {
        Self {
            pose: PoseTarget {
                kind: PoseKind::Joint,
                joint: JointValues {
                    joint: pose.to_radians(),
                },
            },
            param: MoveParam {
                velocity: motion.velocity(),
                acc: motion.acceleration(),
                t: motion.duration,
            },
        }
    }

    /// Target pose in degrees (clamped).
    pub fn target(&self) -> JointPose {
        JointPose::from_radians(self.pose.joint.joint)
    }
}
