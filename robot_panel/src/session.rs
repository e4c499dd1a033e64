//! Connection, busy and teaching flags shared by every panel operation.
//!
//! The session is the single source of truth for what the panel may do next. It lives behind
//! one mutex that is never held across an `.await`.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lebai_rpc::drivers::LebaiDriver;
use lebai_rpc::{GripperCommand, JointPose, MotionParameters};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::PanelConfig;
use crate::events::{EventBus, PanelEvent};
use crate::teaching::PlaybackState;
use crate::throttle::CommandThrottle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
}

/// Why an operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateConflict {
    #[error("robot is not connected")]
    NotConnected,
    #[error("robot is busy")]
    Busy,
    #[error("teaching program is running")]
    TeachingRunning,
}

impl StateConflict {
    /// Status line shown when an operation is refused.
    pub fn status_text(&self) -> &'static str {
        match self {
            StateConflict::NotConnected => "Robot not connected",
            StateConflict::Busy => "Robot is busy",
            StateConflict::TeachingRunning => "Teaching is running",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

pub const JOINT_STEP_RANGE: (f64, f64) = (0.01, 180.0);
pub const MOTION_STEP_RANGE: (f64, f64) = (0.01, 5.0);
pub const GRIPPER_STEP_RANGE: (f64, f64) = (0.1, 20.0);

/// Increments used by the jog and nudge buttons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JogSteps {
    joint_deg: f64,
    motion: f64,
    gripper: f64,
}

impl JogSteps {
    pub fn new(joint_deg: f64, motion: f64, gripper: f64) -> Self {
        Self {
            joint_deg: clamp_step(joint_deg, JOINT_STEP_RANGE),
            motion: clamp_step(motion, MOTION_STEP_RANGE),
            gripper: clamp_step(gripper, GRIPPER_STEP_RANGE),
        }
    }

    pub fn joint_deg(&self) -> f64 {
        self.joint_deg
    }

    pub fn motion(&self) -> f64 {
        self.motion
    }

    pub fn gripper(&self) -> f64 {
        self.gripper
    }
}

fn clamp_step(value: f64, (min, max): (f64, f64)) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

#[derive(Debug)]
pub(crate) struct ActiveRun {
    pub id: u64,
    pub token: CancellationToken,
}

#[derive(Debug)]
pub(crate) struct SessionState {
    pub phase: ConnectionPhase,
    pub busy: bool,
    pub moving_home: bool,
    pub teaching: Option<ActiveRun>,
    pub playback: PlaybackState,
    pub position_synced: bool,
    pub endpoint: Option<Endpoint>,
    pub driver: Option<LebaiDriver>,
    pub joints: JointPose,
    pub gripper: GripperCommand,
    pub motion: MotionParameters,
    pub jog: JogSteps,
    pub gripper_throttle: CommandThrottle,
    pub slider_throttle: CommandThrottle,
    next_run_id: u64,
}

impl SessionState {
    pub fn new(config: &PanelConfig) -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            busy: false,
            moving_home: false,
            teaching: None,
            playback: PlaybackState::Idle,
            position_synced: false,
            endpoint: None,
            driver: None,
            joints: JointPose::default(),
            gripper: config.initial_gripper(),
            motion: config.motion_defaults(),
            jog: JogSteps::new(
                config.jog.joint_step_deg,
                config.jog.motion_step,
                config.jog.gripper_step,
            ),
            gripper_throttle: CommandThrottle::new(config.gripper_interval()),
            slider_throttle: CommandThrottle::new(config.slider_interval()),
            next_run_id: 1,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    pub fn is_teaching(&self) -> bool {
        self.teaching.is_some()
    }

    /// Gate for manual motion, resets and teaching start.
    pub fn check_ready(&self) -> Result<LebaiDriver, StateConflict> {
        if self.busy {
            return Err(StateConflict::Busy);
        }
        if self.is_teaching() {
            return Err(StateConflict::TeachingRunning);
        }
        match (&self.driver, self.is_connected()) {
            (Some(driver), true) => Ok(driver.clone()),
            _ => Err(StateConflict::NotConnected),
        }
    }

    /// Gripper slider commands are dropped rather than refused while anything else drives the
    /// arm.
    pub fn gripper_suppressed(&self) -> bool {
        !self.is_connected() || self.busy || self.moving_home || self.is_teaching()
    }

    /// Registers a new run. Fails under the same conditions as [`Self::check_ready`].
    pub fn begin_teaching(
        &mut self,
    ) -> Result<(u64, CancellationToken, LebaiDriver), StateConflict> {
        let driver = self.check_ready()?;
        let id = self.next_run_id;
        self.next_run_id += 1;
        let token = CancellationToken::new();
        self.teaching = Some(ActiveRun {
            id,
            token: token.clone(),
        });
        self.playback = PlaybackState::Loading;
        self.gripper_throttle.discard_pending();
        Ok((id, token, driver))
    }

    /// Records playback progress of the active run; stale runs are ignored.
    pub fn update_playback(&mut self, id: u64, playback: PlaybackState) {
        if matches!(&self.teaching, Some(run) if run.id == id) {
            self.playback = playback;
        }
    }

    /// Clears the run if it is still the active one. Returns whether it was.
    pub fn finish_teaching(&mut self, id: u64, outcome: PlaybackState) -> bool {
        match &self.teaching {
            Some(run) if run.id == id => {
                self.teaching = None;
                self.playback = outcome;
                true
            }
            _ => false,
        }
    }

    /// Cancels and clears the active run, if any.
    pub fn cancel_teaching(&mut self) -> bool {
        match self.teaching.take() {
            Some(run) => {
                run.token.cancel();
                self.playback = PlaybackState::Cancelled;
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            busy: self.busy,
            moving_home: self.moving_home,
            teaching_running: self.is_teaching(),
            position_synced: self.position_synced,
            endpoint: self.endpoint.clone(),
            joints: self.joints,
            gripper: self.gripper,
            motion: self.motion,
            jog: self.jog,
            gripper_pending: self.gripper_throttle.has_pending(),
            playback: self.playback.clone(),
        }
    }
}

/// Point-in-time copy of the session for display and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: ConnectionPhase,
    pub busy: bool,
    pub moving_home: bool,
    pub teaching_running: bool,
    pub position_synced: bool,
    pub endpoint: Option<Endpoint>,
    pub joints: JointPose,
    pub gripper: GripperCommand,
    pub motion: MotionParameters,
    pub jog: JogSteps,
    /// A throttled gripper value is waiting for the next tick.
    pub gripper_pending: bool,
    pub playback: PlaybackState,
}

impl SessionSnapshot {
    pub fn connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }
}

#[derive(Debug)]
pub(crate) struct Session {
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(config: &PanelConfig) -> Self {
        Self {
            state: Mutex::new(SessionState::new(config)),
        }
    }

    /// Every field is valid on its own, so a poisoned lock is recovered.
    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            warn!("Session mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Holds the busy flag for one operation and releases it on drop, whatever the outcome.
pub(crate) struct BusyGuard<'a> {
    session: &'a Session,
    events: &'a EventBus,
}

impl<'a> BusyGuard<'a> {
    /// Marks the session busy. Callers must have checked readiness under the same lock.
    pub fn engage(
        state: &mut SessionState,
        session: &'a Session,
        events: &'a EventBus,
        moving_home: bool,
    ) -> Self {
        state.busy = true;
        state.moving_home = moving_home;
        state.gripper_throttle.discard_pending();
        events.publish(PanelEvent::Busy(true));
        Self { session, events }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.session.lock();
            state.busy = false;
            state.moving_home = false;
        }
        self.events.publish(PanelEvent::Busy(false));
    }
}
