use serde::Serialize;

pub mod drivers;

pub mod packets;
pub mod commands;
pub mod errors;
pub use errors::*;

/// JSON-RPC protocol types used to communicate with the Lebai controller.
pub mod protocol {
    pub use super::commands::*;
    pub use super::packets::*;
}

/// Mechanical limit applied to every joint, in degrees.
pub const JOINT_LIMIT_DEG: f64 = 175.0;

pub const VELOCITY_MIN: f64 = 0.1;
pub const VELOCITY_MAX: f64 = 3.0;
pub const ACCELERATION_MIN: f64 = 0.1;
pub const ACCELERATION_MAX: f64 = 5.0;

pub const GRIPPER_MIN: f64 = 0.0;
pub const GRIPPER_MAX: f64 = 100.0;

/// Force used whenever a gripper command does not name one.
pub const DEFAULT_GRIPPER_FORCE: f64 = 50.0;

/// Six ordered joint angles in degrees.
///
/// Every constructor saturates to [`JOINT_LIMIT_DEG`]; out-of-range input is never rejected.
/// Conversion to radians happens only at the wire boundary via [`JointPose::to_radians`].
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct JointPose {
    degrees: [f64; 6],
}

impl JointPose {
    pub fn new(degrees: [f64; 6]) -> Self {
        Self {
            degrees: degrees.map(clamp_joint),
        }
    }

    /// Builds a pose from wire values (radians).
    pub fn from_radians(radians: [f64; 6]) -> Self {
        Self::new(radians.map(f64::to_degrees))
    }

    pub fn degrees(&self) -> [f64; 6] {
        self.degrees
    }

    pub fn joint(&self, index: usize) -> Option<f64> {
        self.degrees.get(index).copied()
    }

    pub fn to_radians(&self) -> [f64; 6] {
        self.degrees.map(f64::to_radians)
    }

    /// Returns a copy with one joint replaced. Out-of-range indices leave the pose untouched.
    pub fn with_joint(mut self, index: usize, degrees: f64) -> Self {
        if let Some(slot) = self.degrees.get_mut(index) {
            *slot = clamp_joint(degrees);
        }
        self
    }

    /// Largest absolute per-joint difference in degrees.
    pub fn max_deviation(&self, other: &JointPose) -> f64 {
        self.degrees
            .iter()
            .zip(other.degrees.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}

pub fn clamp_joint(degrees: f64) -> f64 {
    if degrees.is_nan() {
        return 0.0;
    }
    degrees.clamp(-JOINT_LIMIT_DEG, JOINT_LIMIT_DEG)
}

/// Velocity / acceleration pair sent with every joint move, plus an optional fixed duration.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct MotionParameters {
    velocity: f64,
    acceleration: f64,
    /// Explicit move duration in seconds. When set the controller ignores velocity/acc.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl MotionParameters {
    pub fn new(velocity: f64, acceleration: f64) -> Self {
        Self {
            velocity: clamp_or(velocity, VELOCITY_MIN, VELOCITY_MAX),
            acceleration: clamp_or(acceleration, ACCELERATION_MIN, ACCELERATION_MAX),
            duration: None,
        }
    }

    pub fn timed(self, seconds: f64) -> Self {
        Self {
            duration: Some(seconds.max(0.0)),
            ..self
        }
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }
}

impl Default for MotionParameters {
    fn default() -> Self {
        Self::new(0.5, 1.0)
    }
}

/// Gripper opening (0 = closed, 100 = fully open) and grip force, both in percent.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct GripperCommand {
    amplitude: f64,
    force: f64,
}

impl GripperCommand {
    pub fn new(amplitude: f64, force: f64) -> Self {
        Self {
            amplitude: clamp_or(amplitude, GRIPPER_MIN, GRIPPER_MAX),
            force: clamp_or(force, GRIPPER_MIN, GRIPPER_MAX),
        }
    }

    pub fn closed() -> Self {
        Self::new(0.0, DEFAULT_GRIPPER_FORCE)
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn force(&self) -> f64 {
        self.force
    }

    pub fn with_amplitude(self, amplitude: f64) -> Self {
        Self::new(amplitude, self.force)
    }

    pub fn with_force(self, force: f64) -> Self {
        Self::new(self.amplitude, force)
    }
}

impl Default for GripperCommand {
    fn default() -> Self {
        Self::closed()
    }
}

fn clamp_or(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}
