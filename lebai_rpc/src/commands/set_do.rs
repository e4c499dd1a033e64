use serde::{Deserialize, Serialize};

pub const DEFAULT_IO_DEVICE: &str = "FLANGE";

/// Parameters of `set_do` (digital output, e.g. a vacuum gripper valve).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SetDigitalOutput {
    /// `ROBOT`, `FLANGE` or `EXTRA`.
    pub device: String,
    pub pin: u32,
    pub value: u32,
}

impl SetDigitalOutput {
    /// Device names are upper-cased; an empty name selects the flange.
    pub fn new(device: &str, pin: u32, value: u32) -> Self {
        let device = device.trim();
        let device = if device.is_empty() {
            DEFAULT_IO_DEVICE.to_string()
        } else {
            device.to_uppercase()
        };
        Self { device, pin, value }
    }
}
