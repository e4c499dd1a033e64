//! Playback of a loaded teaching program.
//!
//! Each step starts at its scheduled offset from playback start. Cancellation is observed at
//! step boundaries and during the wait before a step; a step that has started always runs to
//! the end of its own duration.

use std::sync::Arc;
use std::time::Duration;

use lebai_rpc::drivers::LebaiDriver;
use lebai_rpc::{GripperCommand, MotionParameters, DEFAULT_GRIPPER_FORCE};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{TeachingAction, TeachingProgram, TeachingStep};
use crate::events::PanelEvent;
use crate::panel::PanelInner;

/// Playback state as shown to the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackState {
    /// Nothing has been played yet.
    Idle,
    /// Program accepted, playback task not started yet.
    Loading,
    /// `step` counts steps already started.
    Running {
        program: String,
        step: usize,
        total_steps: usize,
    },
    Completed {
        elapsed: Duration,
    },
    Cancelled,
}

/// How a playback task ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackOutcome {
    Completed { elapsed: Duration },
    Cancelled,
}

/// Handle to a running playback task.
#[derive(Debug)]
pub struct TeachingHandle {
    run_id: u64,
    program: String,
    task: JoinHandle<PlaybackOutcome>,
}

impl TeachingHandle {
    pub(crate) fn new(run_id: u64, program: String, task: JoinHandle<PlaybackOutcome>) -> Self {
        Self {
            run_id,
            program,
            task,
        }
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the playback task to end.
    pub async fn join(self) -> PlaybackOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Teaching task {} failed: {}", self.run_id, e);
                PlaybackOutcome::Cancelled
            }
        }
    }
}

pub(crate) async fn run_program(
    inner: Arc<PanelInner>,
    driver: LebaiDriver,
    program: TeachingProgram,
    run_id: u64,
    token: CancellationToken,
) -> PlaybackOutcome {
    let _release = RunRelease {
        inner: &inner,
        run_id,
    };
    let started = Instant::now();
    let total_steps = program.steps.len();

    info!(
        "Teaching '{}' started: {} steps, {:.1}s planned",
        program.name, total_steps, program.total_duration
    );
    inner.events.teaching_status(format!("Started: {}", program.name));
    inner.session.lock().update_playback(
        run_id,
        PlaybackState::Running {
            program: program.name.clone(),
            step: 0,
            total_steps,
        },
    );

    for (index, step) in program.steps.iter().enumerate() {
        if token.is_cancelled() {
            return cancelled(run_id);
        }

        let wait = step.start_time - started.elapsed().as_secs_f64();
        if wait > 0.0 {
            inner.events.teaching_status(format!(
                "Waiting... ({:.1}s until step {})",
                wait, step.step_number
            ));
            tokio::select! {
                _ = token.cancelled() => return cancelled(run_id),
                _ = sleep(seconds(wait)) => {}
            }
        }

        if token.is_cancelled() {
            return cancelled(run_id);
        }

        inner.session.lock().update_playback(
            run_id,
            PlaybackState::Running {
                program: program.name.clone(),
                step: index + 1,
                total_steps,
            },
        );
        inner
            .events
            .teaching_status(format!("Step {}: {}", step.step_number, step.name));
        execute_step(&inner, &driver, step).await;
    }

    if token.is_cancelled() {
        return cancelled(run_id);
    }

    let elapsed = started.elapsed();
    inner
        .events
        .teaching_status(format!("Completed! ({:.1}s total)", elapsed.as_secs_f64()));

    tokio::select! {
        _ = token.cancelled() => return cancelled(run_id),
        _ = sleep(inner.config.completion_grace()) => {}
    }

    let finished = inner
        .session
        .lock()
        .finish_teaching(run_id, PlaybackState::Completed { elapsed });
    if finished {
        inner.events.publish(PanelEvent::TeachingMode(false));
    }
    info!("Teaching run {} completed in {:?}", run_id, elapsed);
    PlaybackOutcome::Completed { elapsed }
}

/// Converts a step time to a sleep. Values from hand-built steps may be negative, NaN or too
/// large for `Duration`; the first two mean no wait, the last waits indefinitely.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(if value > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

/// Clears the run from the session however the task ends, including a panic or an abort.
/// Normal completion and user cancellation have already cleared it, so this is a no-op then.
struct RunRelease<'a> {
    inner: &'a PanelInner,
    run_id: u64,
}

impl Drop for RunRelease<'_> {
    fn drop(&mut self) {
        let released = self
            .inner
            .session
            .lock()
            .finish_teaching(self.run_id, PlaybackState::Cancelled);
        if released {
            error!("Teaching run {} ended abnormally", self.run_id);
            self.inner.events.teaching_status("Stopped: playback failed");
            self.inner.events.publish(PanelEvent::TeachingMode(false));
        }
    }
}

fn cancelled(run_id: u64) -> PlaybackOutcome {
    info!("Teaching run {} cancelled", run_id);
    PlaybackOutcome::Cancelled
}

async fn execute_step(inner: &PanelInner, driver: &LebaiDriver, step: &TeachingStep) {
    info!(
        "Executing step {} '{}' ({})",
        step.step_number,
        step.name,
        step.action.kind()
    );
    let duration = seconds(step.duration);

    match &step.action {
        TeachingAction::MoveJoint {
            joints,
            velocity,
            acceleration,
        } => {
            let defaults = inner.session.lock().motion;
            let motion = MotionParameters::new(
                velocity.unwrap_or(defaults.velocity()),
                acceleration.unwrap_or(defaults.acceleration()),
            )
            .timed(step.duration);

            if let Err(e) = driver.move_joint(joints, &motion).await {
                warn!("Step {} move_joint failed: {}", step.step_number, e);
            }
            sleep(duration).await;
            inner.set_joints(*joints);
        }
        TeachingAction::SetGripper { position, force } => {
            let command = GripperCommand::new(
                position.unwrap_or(0.0),
                force.unwrap_or(DEFAULT_GRIPPER_FORCE),
            );
            if let Err(e) = driver.set_claw(command).await {
                warn!("Step {} set_claw failed: {}", step.step_number, e);
            }
            inner.set_gripper(command);
            if !duration.is_zero() {
                sleep(duration).await;
            }
        }
        TeachingAction::SetDigitalOutput(output) => {
            if let Err(e) = driver.set_digital_output(output.clone()).await {
                warn!("Step {} set_do failed: {}", step.step_number, e);
            }
            if !duration.is_zero() {
                sleep(duration).await;
            }
        }
        TeachingAction::Wait => sleep(duration).await,
    }
}
