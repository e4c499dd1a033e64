//! Teaching program files.
//!
//! A program is a JSON document with timed steps:
//!
//! ```json
//! {
//!   "name": "Puzzle demo",
//!   "totalDuration": 6.0,
//!   "steps": [
//!     {"stepNumber": 1, "name": "reach", "time": 0, "duration": 2,
//!      "action": {"type": "move_joint", "joints": [0, 30, 60, 0, 45, 0]}},
//!     {"stepNumber": 2, "name": "grip", "time": 5, "duration": 1,
//!      "action": {"type": "set_gripper", "gripperPosition": 100}}
//!   ]
//! }
//! ```
//!
//! Parsing rules:
//! - `time` and `startTime` are synonyms; times and durations are seconds
//! - action `type` is matched case-insensitively, with or without underscores
//! - negative optional numbers (the `-1` convention) mean "use the session default"
//! - steps that could never send anything are dropped with a warning
//! - steps are stably sorted by start time

use std::fmt;
use std::path::{Path, PathBuf};

use lebai_rpc::protocol::SetDigitalOutput;
use lebai_rpc::{JointPose, JOINT_LIMIT_DEG};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("failed to read teaching file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("teaching file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("teaching program has no steps")]
    MissingSteps,
    #[error("teaching program has no executable steps")]
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TeachingAction {
    /// Timed joint move; `None` falls back to the session's motion parameters.
    MoveJoint {
        joints: JointPose,
        velocity: Option<f64>,
        acceleration: Option<f64>,
    },
    /// `None` falls back to amplitude 0 / force 50.
    SetGripper {
        position: Option<f64>,
        force: Option<f64>,
    },
    SetDigitalOutput(SetDigitalOutput),
    Wait,
}

impl TeachingAction {
    pub fn kind(&self) -> &'static str {
        match self {
            TeachingAction::MoveJoint { .. } => "move_joint",
            TeachingAction::SetGripper { .. } => "set_gripper",
            TeachingAction::SetDigitalOutput(_) => "set_do",
            TeachingAction::Wait => "wait",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeachingStep {
    pub step_number: u32,
    pub name: String,
    /// Seconds after playback start.
    pub start_time: f64,
    pub duration: f64,
    pub action: TeachingAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeachingProgram {
    pub name: String,
    pub description: Option<String>,
    pub total_duration: f64,
    pub steps: Vec<TeachingStep>,
}

impl TeachingProgram {
    /// Builds a program from already-typed steps, sorted by start time.
    pub fn new(name: impl Into<String>, steps: Vec<TeachingStep>) -> Self {
        let mut program = Self {
            name: name.into(),
            description: None,
            total_duration: steps
                .iter()
                .map(|s| s.start_time + s.duration)
                .fold(0.0, f64::max),
            steps,
        };
        program.sort_steps();
        program
    }

    /// Replaces negative or non-finite step times with zero, then sorts.
    pub fn normalize(&mut self) {
        for step in &mut self.steps {
            step.start_time = non_negative(step.start_time);
            step.duration = non_negative(step.duration);
        }
        self.sort_steps();
    }

    /// Stable: steps with equal start times keep their file order.
    pub fn sort_steps(&mut self) {
        self.steps
            .sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    }
}

/// Non-fatal problem found while loading a program.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    pub step: Option<u32>,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step {
            Some(step) => write!(f, "Step {}: {}", step, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParseResult {
    pub program: TeachingProgram,
    pub warnings: Vec<ParseWarning>,
    /// Steps present in the file, before dropping.
    pub step_count: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProgram {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    total_duration: Option<f64>,
    #[serde(default)]
    steps: Option<Vec<RawStep>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    #[serde(default)]
    step_number: Option<u32>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "startTime")]
    time: f64,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    action: Option<RawAction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAction {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    joints: Option<Vec<f64>>,
    #[serde(default, alias = "position")]
    gripper_position: Option<f64>,
    #[serde(default, alias = "force")]
    gripper_force: Option<f64>,
    #[serde(default)]
    velocity: Option<f64>,
    #[serde(default)]
    acceleration: Option<f64>,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    pin: Option<i64>,
    #[serde(default)]
    value: Option<i64>,
}

pub fn load_program(path: &Path) -> Result<ParseResult, ProgramError> {
    let text = std::fs::read_to_string(path).map_err(|source| ProgramError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_program(&text)
}

pub fn parse_program(json: &str) -> Result<ParseResult, ProgramError> {
    let raw: RawProgram = serde_json::from_str(json)?;
    let raw_steps = raw.steps.ok_or(ProgramError::MissingSteps)?;
    let step_count = raw_steps.len();

    let mut warnings = Vec::new();
    let mut steps = Vec::with_capacity(step_count);

    for (index, raw_step) in raw_steps.into_iter().enumerate() {
        let step_number = raw_step.step_number.unwrap_or(index as u32 + 1);
        let mut warn = |message: String| {
            warnings.push(ParseWarning {
                step: Some(step_number),
                message,
            })
        };

        let Some(raw_action) = raw_step.action else {
            warn("no action, step skipped".to_string());
            continue;
        };

        let Some(action) = parse_action(raw_action, &mut warn) else {
            continue;
        };

        steps.push(TeachingStep {
            step_number,
            name: raw_step.name.unwrap_or_default(),
            start_time: non_negative(raw_step.time),
            duration: non_negative(raw_step.duration),
            action,
        });
    }

    if steps.is_empty() {
        return Err(ProgramError::Empty);
    }

    let total_duration = raw.total_duration.filter(|d| *d >= 0.0);
    let mut program = TeachingProgram::new(raw.name.unwrap_or_default(), steps);
    program.description = raw.description;
    if let Some(total) = total_duration {
        program.total_duration = total;
    }

    Ok(ParseResult {
        program,
        warnings,
        step_count,
    })
}

fn parse_action(raw: RawAction, warn: &mut impl FnMut(String)) -> Option<TeachingAction> {
    let kind: String = raw
        .kind
        .chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect();

    match kind.as_str() {
        "movejoint" => {
            let joints = raw.joints.unwrap_or_default();
            if joints.len() < 6 {
                warn(format!(
                    "move_joint needs 6 joints, got {}; step skipped",
                    joints.len()
                ));
                return None;
            }
            let mut degrees = [0.0; 6];
            degrees.copy_from_slice(&joints[..6]);
            for (i, value) in degrees.iter().enumerate() {
                if value.abs() > JOINT_LIMIT_DEG {
                    warn(format!(
                        "J{} = {} exceeds ±{}°, clamped",
                        i + 1,
                        value,
                        JOINT_LIMIT_DEG
                    ));
                }
            }
            Some(TeachingAction::MoveJoint {
                joints: JointPose::new(degrees),
                velocity: unset_if_negative(raw.velocity),
                acceleration: unset_if_negative(raw.acceleration),
            })
        }
        "setgripper" => Some(TeachingAction::SetGripper {
            position: unset_if_negative(raw.gripper_position),
            force: unset_if_negative(raw.gripper_force),
        }),
        "setdo" => {
            let pin = raw.pin.unwrap_or(0);
            let value = raw.value.unwrap_or(0);
            match (u32::try_from(pin), u32::try_from(value)) {
                (Ok(pin), Ok(value)) => Some(TeachingAction::SetDigitalOutput(
                    SetDigitalOutput::new(raw.device.as_deref().unwrap_or_default(), pin, value),
                )),
                _ => {
                    warn(format!(
                        "set_do pin {} / value {} out of range; step skipped",
                        pin, value
                    ));
                    None
                }
            }
        }
        "wait" => Some(TeachingAction::Wait),
        _ => {
            warn(format!("unknown action type '{}'; step skipped", raw.kind));
            None
        }
    }
}

fn unset_if_negative(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
