mod move_joint;
mod set_claw;
mod set_do;
mod robot_state;
mod kin_data;

pub use move_joint::*;
pub use set_claw::*;
pub use set_do::*;
pub use robot_state::*;
pub use kin_data::*;

use serde::{Deserialize, Serialize};

/// Options object for methods that take no arguments; serializes as `{}`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoParams {}
