//! Behaviour knobs for the simulated controller.

use serde::{Deserialize, Serialize};

/// How the simulated controller behaves.
///
/// The defaults describe a healthy, powered arm resting at the zero pose.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Joint angles in degrees at startup.
    pub initial_joints_deg: [f64; 6],

    /// Whether the system is started (`IDLE`) or off (`ROBOT_OFF`) at startup.
    pub started: bool,

    /// Scales every simulated motion duration. `0.01` turns a 5 s move into 50 ms.
    pub time_scale: f64,

    /// Report `MOVING` forever, regardless of motion.
    pub stuck_moving: bool,

    /// Return `get_robot_state` as a bare string instead of `{"state": ...}`.
    pub bare_state: bool,

    /// Return a truncated `actual_joint_pose` from `get_kin_data`.
    pub malformed_kin_data: bool,

    /// Methods answered with a JSON-RPC error object.
    pub fail_methods: Vec<String>,

    /// Methods answered with HTTP 500.
    pub http_error_methods: Vec<String>,
}

impl SimConfig {
    /// Fast motion, suitable for integration tests.
    pub fn fast() -> Self {
        Self {
            time_scale: 0.01,
            ..Self::default()
        }
    }

    pub fn fails(&self, method: &str) -> bool {
        self.fail_methods.iter().any(|m| m == method)
    }

    pub fn http_fails(&self, method: &str) -> bool {
        self.http_error_methods.iter().any(|m| m == method)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            initial_joints_deg: [0.0; 6],
            started: true,
            time_scale: 1.0,
            stuck_moving: false,
            bare_state: false,
            malformed_kin_data: false,
            fail_methods: Vec::new(),
            http_error_methods: Vec::new(),
        }
    }
}
