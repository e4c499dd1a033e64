//! Motion-control and teaching-playback engine for a Lebai exhibit arm.
//!
//! [`RobotPanel`] is the entry point. UI code calls its operations and renders the
//! [`PanelEvent`]s it publishes.

pub mod config;
pub mod events;
pub mod home;
pub mod logging;
pub mod panel;
pub mod session;
pub mod teaching;
pub mod throttle;

pub use config::{ConfigError, HomeStrategy, PanelConfig};
pub use events::{EventBus, PanelEvent};
pub use home::{sequential_plan, ResetMove};
pub use panel::{PanelError, RobotPanel};
pub use session::{ConnectionPhase, Endpoint, JogSteps, SessionSnapshot, StateConflict};
pub use teaching::{
    load_program, parse_program, ParseResult, ParseWarning, PlaybackOutcome, PlaybackState,
    ProgramError, TeachingAction, TeachingHandle, TeachingProgram, TeachingStep,
};
pub use throttle::CommandThrottle;
