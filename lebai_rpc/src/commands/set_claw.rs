use serde::{Deserialize, Serialize};

use crate::GripperCommand;

/// Parameters of `set_claw`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SetClaw {
    pub amplitude: f64,
    pub force: f64,
}

impl From<GripperCommand> for SetClaw {
    fn from(cmd: GripperCommand) -> Self {
        Self {
            amplitude: cmd.amplitude(),
            force: cmd.force(),
        }
    }
}

impl From<SetClaw> for GripperCommand {
    fn from(claw: SetClaw) -> Self {
        GripperCommand::new(claw.amplitude, claw.force)
    }
}
