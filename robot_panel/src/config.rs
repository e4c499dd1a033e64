//! Panel configuration.
//!
//! Every field has a default, so an empty or partial TOML file is valid:
//!
//! ```toml
//! [robot]
//! host = "192.168.0.3"
//! port = 3021
//!
//! [home]
//! strategy = "sequential"
//! auto_home_on_connect = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use lebai_rpc::drivers::{IdleDetection, LebaiDriverConfig};
use lebai_rpc::{
    GripperCommand, JointPose, MotionParameters, ACCELERATION_MAX, ACCELERATION_MIN,
    JOINT_LIMIT_DEG, VELOCITY_MAX, VELOCITY_MIN,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PanelConfig {
    pub robot: RobotSection,
    pub motion: MotionSection,
    pub home: HomeSection,
    pub idle: IdleSection,
    pub gripper: GripperSection,
    pub jog: JogSection,
    pub teaching: TeachingSection,
    pub log: LogSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RobotSection {
    pub host: String,
    pub port: u16,
    pub request_timeout_ms: u64,
    pub idle_detection: IdleDetection,
}

impl Default for RobotSection {
    fn default() -> Self {
        let driver = LebaiDriverConfig::default();
        Self {
            host: driver.addr,
            port: driver.port,
            request_timeout_ms: driver.request_timeout_ms,
            idle_detection: driver.idle_detection,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MotionSection {
    pub velocity: f64,
    pub acceleration: f64,
}

impl Default for MotionSection {
    fn default() -> Self {
        Self {
            velocity: 0.5,
            acceleration: 1.0,
        }
    }
}

/// How the arm is brought back to the home pose.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HomeStrategy {
    /// One timed move of all six joints.
    #[default]
    Direct,
    /// One joint at a time: wrist, elbow up, shoulder, base, elbow down.
    Sequential,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HomeSection {
    pub pose_deg: [f64; 6],
    pub move_time_s: f64,
    pub auto_home_on_connect: bool,
    pub strategy: HomeStrategy,
    /// J3 angle held while the shoulder and base swing during a sequential reset.
    pub raised_forearm_deg: f64,
    pub tolerance_deg: f64,
}

impl Default for HomeSection {
    fn default() -> Self {
        Self {
            pose_deg: [0.0; 6],
            move_time_s: 5.0,
            auto_home_on_connect: true,
            strategy: HomeStrategy::Direct,
            raised_forearm_deg: 90.0,
            tolerance_deg: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IdleSection {
    pub max_wait_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for IdleSection {
    fn default() -> Self {
        Self {
            max_wait_ms: 30_000,
            poll_interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GripperSection {
    pub command_interval_ms: u64,
    pub initial_amplitude: f64,
    pub initial_force: f64,
}

impl Default for GripperSection {
    fn default() -> Self {
        Self {
            command_interval_ms: 100,
            initial_amplitude: 0.0,
            initial_force: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JogSection {
    pub joint_step_deg: f64,
    pub motion_step: f64,
    pub gripper_step: f64,
    /// Minimum spacing between moves sent while a joint slider is dragged.
    pub slider_interval_ms: u64,
}

impl Default for JogSection {
    fn default() -> Self {
        Self {
            joint_step_deg: 0.1,
            motion_step: 0.1,
            gripper_step: 5.0,
            slider_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TeachingSection {
    /// Relative paths are resolved against the executable's directory.
    pub file: PathBuf,
    pub completion_grace_ms: u64,
}

impl Default for TeachingSection {
    fn default() -> Self {
        Self {
            file: PathBuf::from("robot_teaching.json"),
            completion_grace_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogSection {
    /// Relative paths are resolved against the executable's directory.
    pub file: PathBuf,
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            file: PathBuf::from("LebaiRobotLog.txt"),
            level: "info".to_string(),
        }
    }
}

impl PanelConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.driver_config().validate().map_err(ConfigError::Invalid)?;

        let checks: [(bool, &str); 10] = [
            (
                in_range(self.motion.velocity, VELOCITY_MIN, VELOCITY_MAX),
                "motion.velocity out of range",
            ),
            (
                in_range(self.motion.acceleration, ACCELERATION_MIN, ACCELERATION_MAX),
                "motion.acceleration out of range",
            ),
            (
                self.home
                    .pose_deg
                    .iter()
                    .all(|j| in_range(*j, -JOINT_LIMIT_DEG, JOINT_LIMIT_DEG)),
                "home.pose_deg exceeds joint limit",
            ),
            (
                in_range(self.home.raised_forearm_deg, -JOINT_LIMIT_DEG, JOINT_LIMIT_DEG),
                "home.raised_forearm_deg exceeds joint limit",
            ),
            (
                self.home.move_time_s.is_finite() && self.home.move_time_s > 0.0,
                "home.move_time_s must be positive",
            ),
            (
                self.home.tolerance_deg.is_finite() && self.home.tolerance_deg >= 0.0,
                "home.tolerance_deg must not be negative",
            ),
            (
                self.idle.poll_interval_ms > 0,
                "idle.poll_interval_ms must be positive",
            ),
            (
                self.gripper.command_interval_ms > 0,
                "gripper.command_interval_ms must be positive",
            ),
            (
                in_range(self.gripper.initial_amplitude, 0.0, 100.0)
                    && in_range(self.gripper.initial_force, 0.0, 100.0),
                "gripper initial values must be within 0-100",
            ),
            (
                !self.log.level.trim().is_empty(),
                "log.level must not be empty",
            ),
        ];

        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, message)) => Err(ConfigError::Invalid(message.to_string())),
            None => Ok(()),
        }
    }

    pub fn driver_config(&self) -> LebaiDriverConfig {
        LebaiDriverConfig {
            addr: self.robot.host.clone(),
            port: self.robot.port,
            request_timeout_ms: self.robot.request_timeout_ms,
            idle_detection: self.robot.idle_detection,
        }
    }

    pub fn motion_defaults(&self) -> MotionParameters {
        MotionParameters::new(self.motion.velocity, self.motion.acceleration)
    }

    pub fn home_pose(&self) -> JointPose {
        JointPose::new(self.home.pose_deg)
    }

    pub fn initial_gripper(&self) -> GripperCommand {
        GripperCommand::new(self.gripper.initial_amplitude, self.gripper.initial_force)
    }

    pub fn idle_max_wait(&self) -> Duration {
        Duration::from_millis(self.idle.max_wait_ms)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle.poll_interval_ms)
    }

    pub fn gripper_interval(&self) -> Duration {
        Duration::from_millis(self.gripper.command_interval_ms)
    }

    pub fn slider_interval(&self) -> Duration {
        Duration::from_millis(self.jog.slider_interval_ms)
    }

    pub fn completion_grace(&self) -> Duration {
        Duration::from_millis(self.teaching.completion_grace_ms)
    }

    /// Resolves the teaching file against `base` when it is relative.
    pub fn teaching_file_in(&self, base: &Path) -> PathBuf {
        resolve(base, &self.teaching.file)
    }

    pub fn log_file_in(&self, base: &Path) -> PathBuf {
        resolve(base, &self.log.file)
    }
}

fn in_range(value: f64, min: f64, max: f64) -> bool {
    value.is_finite() && value >= min && value <= max
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Directory holding the running executable, falling back to the working directory.
pub fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
