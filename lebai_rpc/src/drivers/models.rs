use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How an idle controller is recognised in `get_robot_state` responses.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdleDetection {
    /// Decode the state and compare against `IDLE`.
    #[default]
    Structured,
    /// Match the literal `"IDLE"` anywhere in the body.
    LegacySubstring,
}

/// Outcome of an idle wait. A timeout is not an error; callers proceed optimistically.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IdleWait {
    Idle { waited: Duration },
    TimedOut { waited: Duration },
}

impl IdleWait {
    pub fn is_idle(&self) -> bool {
        matches!(self, IdleWait::Idle { .. })
    }
}
