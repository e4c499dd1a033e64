//! The robot control panel: every operation a UI can trigger.
//!
//! Operations never panic on robot or state problems. Refusals come back as
//! [`StateConflict`], robot failures as [`LebaiError`], and both are also published as status
//! text on the event bus.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use lebai_rpc::drivers::{IdleWait, LebaiDriver};
use lebai_rpc::protocol::Command;
use lebai_rpc::{GripperCommand, JointPose, LebaiError, MotionParameters};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::{executable_dir, ConfigError, HomeStrategy, PanelConfig};
use crate::events::{EventBus, PanelEvent};
use crate::home;
use crate::session::{
    BusyGuard, ConnectionPhase, Endpoint, JogSteps, Session, SessionSnapshot, StateConflict,
};
use crate::teaching::{
    load_program, run_program, ProgramError, TeachingHandle, TeachingProgram,
};

#[derive(Debug, Error)]
pub enum PanelError {
    #[error(transparent)]
    Conflict(#[from] StateConflict),
    #[error("robot communication failed: {0}")]
    Robot(#[from] LebaiError),
    #[error("invalid teaching program: {0}")]
    Program(#[from] ProgramError),
    #[error("joint index {0} out of range (expected 0-5)")]
    InvalidJoint(usize),
    #[error("{0} is not a usable value")]
    NotFinite(f64),
    #[error("no tokio runtime to send commands on")]
    NoRuntime,
}

/// Sign of a jog or nudge direction. Zero means no step.
fn direction_sign(direction: f64) -> Result<Option<f64>, PanelError> {
    if !direction.is_finite() {
        return Err(PanelError::NotFinite(direction));
    }
    Ok(if direction > 0.0 {
        Some(1.0)
    } else if direction < 0.0 {
        Some(-1.0)
    } else {
        None
    })
}

pub(crate) struct PanelInner {
    pub config: PanelConfig,
    pub session: Session,
    pub events: EventBus,
}

impl PanelInner {
    pub fn set_joints(&self, pose: JointPose) {
        self.session.lock().joints = pose;
        self.events.publish(PanelEvent::Joints(pose));
    }

    pub fn set_gripper(&self, command: GripperCommand) {
        self.session.lock().gripper = command;
        self.events.publish(PanelEvent::Gripper(command));
    }

    pub fn joints(&self) -> JointPose {
        self.session.lock().joints
    }

    pub fn motion(&self) -> MotionParameters {
        self.session.lock().motion
    }

    pub async fn wait_idle(&self, driver: &LebaiDriver) -> IdleWait {
        driver
            .wait_until_idle(self.config.idle_max_wait(), self.config.idle_poll_interval())
            .await
    }

    /// Reads the measured pose and makes it the local one. On failure local state is kept.
    pub async fn apply_actual_position(
        &self,
        driver: &LebaiDriver,
    ) -> Result<JointPose, LebaiError> {
        let pose = driver.read_kin_data().await?.joint_pose();
        info!("Actual position: {:?}", pose.degrees());
        self.set_joints(pose);
        Ok(pose)
    }
}

/// Cloneable handle to one panel; clones share the same session.
#[derive(Clone)]
pub struct RobotPanel {
    inner: Arc<PanelInner>,
}

impl RobotPanel {
    pub fn new(config: PanelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let session = Session::new(&config);
        Ok(Self {
            inner: Arc::new(PanelInner {
                config,
                session,
                events: EventBus::default(),
            }),
        })
    }

    pub fn config(&self) -> &PanelConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.session.lock().snapshot()
    }

    fn refuse(&self, conflict: StateConflict) -> PanelError {
        info!("Refused: {}", conflict);
        self.inner.events.status(conflict.status_text());
        conflict.into()
    }

    fn reject_value(&self, error: PanelError) -> PanelError {
        warn!("Rejected input: {}", error);
        self.inner.events.status("Invalid value ignored");
        error
    }

    fn connected_driver(&self) -> Option<LebaiDriver> {
        let state = self.inner.session.lock();
        if state.is_connected() {
            state.driver.clone()
        } else {
            None
        }
    }

    // ---- connection ----

    /// Connects to `host:port` and runs the handshake.
    ///
    /// Refused while busy or teaching. A failed probe leaves the panel disconnected; every
    /// later handshake step only logs its failures.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), PanelError> {
        let inner = &self.inner;
        let mut driver_config = inner.config.driver_config();
        driver_config.addr = host.trim().to_string();
        driver_config.port = port;
        let endpoint = Endpoint {
            host: driver_config.addr.clone(),
            port,
        };

        let (driver, _busy) = {
            let mut state = inner.session.lock();
            if state.busy {
                return Err(self.refuse(StateConflict::Busy));
            }
            if state.is_teaching() {
                return Err(self.refuse(StateConflict::TeachingRunning));
            }
            let driver = match LebaiDriver::new(driver_config) {
                Ok(driver) => driver,
                Err(e) => {
                    inner
                        .events
                        .status(format!("Invalid endpoint {}: {}", endpoint, e));
                    return Err(e.into());
                }
            };
            if state.endpoint.as_ref() != Some(&endpoint) {
                state.position_synced = false;
            }
            state.endpoint = Some(endpoint.clone());
            state.phase = ConnectionPhase::Connecting;
            state.driver = None;
            let guard = BusyGuard::engage(&mut state, &inner.session, &inner.events, false);
            (driver, guard)
        };

        inner
            .events
            .status(format!("Connecting to {}...", endpoint));

        let probe = driver
            .send(&Command::GetRobotState)
            .await
            .and_then(|raw| raw.result().map(|_| ()));
        if let Err(e) = probe {
            {
                let mut state = inner.session.lock();
                state.phase = ConnectionPhase::Disconnected;
                state.driver = None;
            }
            error!("Connection to {} failed: {}", endpoint, e);
            inner.events.status(format!("Connection failed: {}", e));
            return Err(e.into());
        }

        {
            let mut state = inner.session.lock();
            if state.phase != ConnectionPhase::Connecting {
                info!("Connect to {} superseded by disconnect", endpoint);
                return Err(StateConflict::NotConnected.into());
            }
            state.phase = ConnectionPhase::Connected;
            state.driver = Some(driver.clone());
        }
        inner.events.status(format!("Connected to {}", endpoint));

        if let Err(e) = driver.start_system().await {
            warn!("start_sys failed: {}", e);
        }
        if let Err(e) = driver.init_claw().await {
            warn!("init_claw failed: {}", e);
        }

        let synced = inner.session.lock().position_synced;
        if synced {
            debug!("Position already synced for {}", endpoint);
        } else {
            match inner.apply_actual_position(&driver).await {
                Ok(_) => inner.session.lock().position_synced = true,
                Err(e) => warn!("Initial position read failed: {}", e),
            }
        }

        if inner.config.home.auto_home_on_connect {
            inner.session.lock().moving_home = true;
            if let Err(e) = home::run(inner, &driver, inner.config.home.strategy).await {
                warn!("Auto home after connect failed: {}", e);
            }
        }

        inner.events.status("Ready");
        Ok(())
    }

    /// Stops the robot system and forgets the connection. Always permitted.
    pub async fn disconnect(&self) {
        self.shut_down(Command::StopSys, "Disconnected").await;
    }

    /// Powers the controller down and forgets the connection. Always permitted.
    pub async fn power_off(&self) {
        self.shut_down(Command::PowerDown, "Robot powered off").await;
    }

    async fn shut_down(&self, command: Command, status: &str) {
        let (driver, was_teaching) = {
            let mut state = self.inner.session.lock();
            let was_teaching = state.cancel_teaching();
            state.phase = ConnectionPhase::Disconnected;
            (state.driver.take(), was_teaching)
        };

        if was_teaching {
            self.inner.events.publish(PanelEvent::TeachingMode(false));
            self.inner.events.teaching_status("Stopped: disconnected");
        }

        if let Some(driver) = driver {
            if let Err(e) = driver.call(&command).await {
                warn!("{} failed: {}", command.method(), e);
            }
        }
        self.inner.events.status(status);
    }

    /// Sends `stop_move`. Permitted while busy; does not end a teaching run.
    pub async fn stop_motion(&self) -> Result<(), PanelError> {
        let Some(driver) = self.connected_driver() else {
            return Err(self.refuse(StateConflict::NotConnected));
        };
        match driver.stop_move().await {
            Ok(_) => {
                self.inner.events.status("Stop command sent");
                Ok(())
            }
            Err(e) => {
                self.inner.events.status(format!("Stop failed: {}", e));
                Err(e.into())
            }
        }
    }

    /// Reads the actual joint angles into the local pose.
    pub async fn sync_position(&self) -> Result<JointPose, PanelError> {
        let Some(driver) = self.connected_driver() else {
            return Err(self.refuse(StateConflict::NotConnected));
        };
        match self.inner.apply_actual_position(&driver).await {
            Ok(pose) => {
                self.inner.session.lock().position_synced = true;
                self.inner.events.status("Position synced");
                Ok(pose)
            }
            Err(e) => {
                self.inner
                    .events
                    .status(format!("Position read failed: {}", e));
                Err(e.into())
            }
        }
    }

    // ---- manual joints ----

    /// Sets one joint (degrees, clamped) and sends the full pose.
    pub async fn set_joint_angle(&self, index: usize, degrees: f64) -> Result<(), PanelError> {
        let (driver, pose, motion) = self.update_joint(index, |_| degrees)?;
        self.send_pose(&driver, pose, motion).await
    }

    /// Moves one joint by the jog step in the direction of `direction`'s sign. A zero
    /// direction sends nothing.
    pub async fn jog_joint(&self, index: usize, direction: f64) -> Result<(), PanelError> {
        let Some(sign) = direction_sign(direction).map_err(|e| self.reject_value(e))? else {
            return Ok(());
        };
        let step = self.inner.session.lock().jog.joint_deg();
        let delta = step * sign;
        let (driver, pose, motion) = self.update_joint(index, |current| current + delta)?;
        self.send_pose(&driver, pose, motion).await
    }

    /// Slider drag: local state always follows, moves are rate limited without a trailing
    /// flush. Returns whether a move was sent.
    pub async fn drag_joint(&self, index: usize, degrees: f64) -> Result<bool, PanelError> {
        let (driver, pose, motion) = self.update_joint(index, |_| degrees)?;
        let send = self
            .inner
            .session
            .lock()
            .slider_throttle
            .try_send(Instant::now());
        if send {
            self.send_pose(&driver, pose, motion).await?;
        }
        Ok(send)
    }

    fn update_joint(
        &self,
        index: usize,
        value: impl FnOnce(f64) -> f64,
    ) -> Result<(LebaiDriver, JointPose, MotionParameters), PanelError> {
        if index >= 6 {
            return Err(PanelError::InvalidJoint(index));
        }
        let (driver, pose, motion) = {
            let mut state = self.inner.session.lock();
            let driver = state.check_ready().map_err(|c| self.refuse(c))?;
            let current = state.joints.joint(index).unwrap_or_default();
            let target = value(current);
            if !target.is_finite() {
                return Err(self.reject_value(PanelError::NotFinite(target)));
            }
            state.joints = state.joints.with_joint(index, target);
            (driver, state.joints, state.motion)
        };
        self.inner.events.publish(PanelEvent::Joints(pose));
        Ok((driver, pose, motion))
    }

    async fn send_pose(
        &self,
        driver: &LebaiDriver,
        pose: JointPose,
        motion: MotionParameters,
    ) -> Result<(), PanelError> {
        debug!("move_joint {:?}", pose.degrees());
        match driver.move_joint(&pose, &motion).await {
            Ok(_) => {
                self.inner.events.status("Move command sent");
                Ok(())
            }
            Err(e) => {
                self.inner.events.status(format!("Move failed: {}", e));
                Err(e.into())
            }
        }
    }

    // ---- motion parameters and jog steps ----

    pub fn set_velocity(&self, velocity: f64) -> MotionParameters {
        self.update_motion(|m| MotionParameters::new(velocity, m.acceleration()))
    }

    pub fn set_acceleration(&self, acceleration: f64) -> MotionParameters {
        self.update_motion(|m| MotionParameters::new(m.velocity(), acceleration))
    }

    /// Steps the velocity by the motion step. Zero or non-finite directions change nothing.
    pub fn nudge_velocity(&self, direction: f64) -> MotionParameters {
        let step = self.motion_step(direction);
        self.update_motion(|m| MotionParameters::new(m.velocity() + step, m.acceleration()))
    }

    pub fn nudge_acceleration(&self, direction: f64) -> MotionParameters {
        let step = self.motion_step(direction);
        self.update_motion(|m| MotionParameters::new(m.velocity(), m.acceleration() + step))
    }

    fn motion_step(&self, direction: f64) -> f64 {
        match direction_sign(direction) {
            Ok(Some(sign)) => self.inner.session.lock().jog.motion() * sign,
            _ => 0.0,
        }
    }

    fn update_motion(
        &self,
        update: impl FnOnce(MotionParameters) -> MotionParameters,
    ) -> MotionParameters {
        let motion = {
            let mut state = self.inner.session.lock();
            state.motion = update(state.motion);
            state.motion
        };
        self.inner.events.publish(PanelEvent::Motion(motion));
        motion
    }

    pub fn set_jog_steps(&self, steps: JogSteps) {
        self.inner.session.lock().jog = steps;
    }

    // ---- gripper ----

    /// Slider input for the gripper opening. Refused with [`PanelError::NoRuntime`] outside a
    /// tokio runtime.
    ///
    /// `Ok(true)` means the value went out immediately, `Ok(false)` that it is pending until
    /// the next [`RobotPanel::tick`] after the interval.
    pub fn set_gripper_amplitude(&self, amplitude: f64) -> Result<bool, PanelError> {
        self.finite(amplitude)?;
        self.update_gripper(|g, _| g.with_amplitude(amplitude))
    }

    pub fn set_gripper_force(&self, force: f64) -> Result<bool, PanelError> {
        self.finite(force)?;
        self.update_gripper(|g, _| g.with_force(force))
    }

    /// A zero direction sends nothing and returns `Ok(false)`.
    pub fn nudge_gripper_amplitude(&self, direction: f64) -> Result<bool, PanelError> {
        let Some(sign) = direction_sign(direction).map_err(|e| self.reject_value(e))? else {
            return Ok(false);
        };
        self.update_gripper(|g, step| g.with_amplitude(g.amplitude() + step * sign))
    }

    pub fn nudge_gripper_force(&self, direction: f64) -> Result<bool, PanelError> {
        let Some(sign) = direction_sign(direction).map_err(|e| self.reject_value(e))? else {
            return Ok(false);
        };
        self.update_gripper(|g, step| g.with_force(g.force() + step * sign))
    }

    fn finite(&self, value: f64) -> Result<(), PanelError> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(self.reject_value(PanelError::NotFinite(value)))
        }
    }

    fn update_gripper(
        &self,
        update: impl FnOnce(GripperCommand, f64) -> GripperCommand,
    ) -> Result<bool, PanelError> {
        if Handle::try_current().is_err() {
            warn!("Gripper input refused: {}", PanelError::NoRuntime);
            return Err(PanelError::NoRuntime);
        }
        let (send, gripper, driver) = {
            let mut state = self.inner.session.lock();
            if state.gripper_suppressed() {
                let conflict = if !state.is_connected() {
                    StateConflict::NotConnected
                } else if state.is_teaching() {
                    StateConflict::TeachingRunning
                } else {
                    StateConflict::Busy
                };
                debug!("Gripper input suppressed: {}", conflict);
                return Err(conflict.into());
            }
            let step = state.jog.gripper();
            state.gripper = update(state.gripper, step);
            let send = state.gripper_throttle.offer(Instant::now());
            (send, state.gripper, state.driver.clone())
        };

        self.inner.events.publish(PanelEvent::Gripper(gripper));
        let sent = match driver {
            Some(driver) if send => driver.send_detached(Command::SetClaw(gripper.into())),
            _ => false,
        };
        Ok(sent)
    }

    /// Periodic hook for the UI loop: flushes a pending gripper value once its interval has
    /// passed. Returns whether a command was sent.
    pub fn tick(&self) -> bool {
        if Handle::try_current().is_err() {
            debug!("tick outside a tokio runtime ignored");
            return false;
        }
        let (gripper, driver) = {
            let mut state = self.inner.session.lock();
            if state.gripper_suppressed() {
                state.gripper_throttle.discard_pending();
                return false;
            }
            if !state.gripper_throttle.poll(Instant::now()) {
                return false;
            }
            (state.gripper, state.driver.clone())
        };

        match driver {
            Some(driver) => {
                debug!("Flushing pending gripper command {:?}", gripper);
                driver.send_detached(Command::SetClaw(gripper.into()))
            }
            None => false,
        }
    }

    // ---- home ----

    /// Moves to the home pose using the configured strategy.
    pub async fn move_home(&self) -> Result<(), PanelError> {
        self.run_home(self.inner.config.home.strategy).await
    }

    /// Moves to the home pose one joint at a time.
    pub async fn reset_sequential(&self) -> Result<(), PanelError> {
        self.run_home(HomeStrategy::Sequential).await
    }

    async fn run_home(&self, strategy: HomeStrategy) -> Result<(), PanelError> {
        let inner = &self.inner;
        let (driver, _busy) = {
            let mut state = inner.session.lock();
            let driver = state.check_ready().map_err(|c| self.refuse(c))?;
            let guard = BusyGuard::engage(&mut state, &inner.session, &inner.events, true);
            (driver, guard)
        };
        home::run(inner, &driver, strategy).await?;
        Ok(())
    }

    // ---- teaching ----

    /// Loads a teaching file and starts playback. `None` uses the configured file next to the
    /// executable.
    pub fn start_teaching_file(
        &self,
        path: Option<PathBuf>,
    ) -> Result<TeachingHandle, PanelError> {
        let events = &self.inner.events;

        let ready = self.inner.session.lock().check_ready();
        if let Err(conflict) = ready {
            events.teaching_status(conflict.status_text());
            return Err(conflict.into());
        }

        let path = path.unwrap_or_else(|| self.inner.config.teaching_file_in(&executable_dir()));
        info!("Loading teaching file {}", path.display());

        let parsed = match load_program(&path) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("Teaching file {} rejected: {}", path.display(), e);
                match &e {
                    ProgramError::Io { .. } => events
                        .teaching_status(format!("Teaching file not found: {}", path.display())),
                    _ => events.teaching_status(format!("Invalid teaching file: {}", e)),
                }
                return Err(e.into());
            }
        };

        for warning in &parsed.warnings {
            warn!("[TEACH] {}", warning);
        }
        info!(
            "Loaded '{}': {} of {} steps executable",
            parsed.program.name,
            parsed.program.steps.len(),
            parsed.step_count
        );
        self.start_teaching(parsed.program)
    }

    /// Starts playback of an in-memory program.
    pub fn start_teaching(&self, program: TeachingProgram) -> Result<TeachingHandle, PanelError> {
        let events = &self.inner.events;
        let mut program = program;
        program.normalize();

        if program.steps.is_empty() {
            events.teaching_status("Invalid teaching program: no steps");
            return Err(ProgramError::Empty.into());
        }

        let begun = self.inner.session.lock().begin_teaching();
        let (run_id, token, driver) = match begun {
            Ok(run) => run,
            Err(conflict) => {
                events.teaching_status(conflict.status_text());
                return Err(conflict.into());
            }
        };

        events.publish(PanelEvent::TeachingMode(true));
        let name = program.name.clone();
        let task = tokio::spawn(run_program(
            self.inner.clone(),
            driver,
            program,
            run_id,
            token,
        ));
        Ok(TeachingHandle::new(run_id, name, task))
    }

    /// Cancels the active run, stops the arm and unlocks manual controls. No-op when nothing
    /// is running.
    pub async fn stop_teaching(&self) -> bool {
        let (cancelled, driver) = {
            let mut state = self.inner.session.lock();
            (state.cancel_teaching(), state.driver.clone())
        };
        if !cancelled {
            return false;
        }

        info!("Teaching stopped by user");
        if let Some(driver) = driver {
            if let Err(e) = driver.stop_move().await {
                warn!("stop_move after teaching stop failed: {}", e);
            }
        }
        self.inner.events.teaching_status("Stopped by user");
        self.inner.events.publish(PanelEvent::TeachingMode(false));
        true
    }
}
