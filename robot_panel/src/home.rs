//! Bringing the arm back to its home pose.
//!
//! Both strategies end the same way: gripper to its closed default, then the measured pose
//! replaces the local one.

use lebai_rpc::drivers::{IdleWait, LebaiDriver};
use lebai_rpc::{clamp_joint, GripperCommand, JointPose, LebaiError};
use tracing::{error, info, warn};

use crate::config::HomeStrategy;
use crate::panel::PanelInner;

/// One single-joint move of a sequential reset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResetMove {
    pub joint: usize,
    pub target_deg: f64,
}

const WRIST: [usize; 3] = [3, 4, 5];
const ELBOW: usize = 2;
const SHOULDER: usize = 1;
const BASE: usize = 0;

/// Orders the moves of a sequential reset from `current` to `home`.
///
/// Wrist joints first, then the elbow is raised to `raised_forearm_deg` so the forearm clears
/// the body while the shoulder and base swing, and finally lowered to its home angle. Joints
/// already within `tolerance_deg` of their target are skipped; the elbow is only raised when
/// the shoulder or base actually has to move.
pub fn sequential_plan(
    current: &JointPose,
    home: &JointPose,
    raised_forearm_deg: f64,
    tolerance_deg: f64,
) -> Vec<ResetMove> {
    let home = home.degrees();
    let mut pose = current.degrees();
    let mut plan = Vec::new();

    let mut step = |pose: &mut [f64; 6], joint: usize, target: f64| {
        if (pose[joint] - target).abs() > tolerance_deg {
            plan.push(ResetMove {
                joint,
                target_deg: target,
            });
            pose[joint] = target;
        }
    };

    for joint in WRIST {
        step(&mut pose, joint, home[joint]);
    }

    let arm_swings = [SHOULDER, BASE]
        .iter()
        .any(|&j| (pose[j] - home[j]).abs() > tolerance_deg);
    if arm_swings {
        step(&mut pose, ELBOW, clamp_joint(raised_forearm_deg));
        step(&mut pose, SHOULDER, home[SHOULDER]);
        step(&mut pose, BASE, home[BASE]);
    }
    step(&mut pose, ELBOW, home[ELBOW]);

    plan
}

pub(crate) async fn run(
    inner: &PanelInner,
    driver: &LebaiDriver,
    strategy: HomeStrategy,
) -> Result<(), LebaiError> {
    info!("Home move ({:?})", strategy);
    let result = match strategy {
        HomeStrategy::Direct => direct(inner, driver).await,
        HomeStrategy::Sequential => sequential(inner, driver).await,
    };

    match &result {
        Ok(()) => inner.events.status("Home position reached"),
        Err(e) => {
            error!("Home move failed: {}", e);
            inner.events.status(format!("Home move failed: {}", e));
        }
    }
    result
}

async fn direct(inner: &PanelInner, driver: &LebaiDriver) -> Result<(), LebaiError> {
    let home = inner.config.home_pose();
    let seconds = inner.config.home.move_time_s;
    let motion = inner.motion().timed(seconds);

    inner
        .events
        .status(format!("Moving to home position ({:.1}s)...", seconds));
    driver.move_joint(&home, &motion).await?;
    log_wait(inner.wait_idle(driver).await);

    finish(inner, driver).await;
    Ok(())
}

async fn sequential(inner: &PanelInner, driver: &LebaiDriver) -> Result<(), LebaiError> {
    let start = match driver.read_kin_data().await {
        Ok(kin) => kin.joint_pose(),
        Err(e) => {
            warn!("Could not read actual pose, planning from local state: {}", e);
            inner.joints()
        }
    };

    let plan = sequential_plan(
        &start,
        &inner.config.home_pose(),
        inner.config.home.raised_forearm_deg,
        inner.config.home.tolerance_deg,
    );
    info!("Sequential reset plan: {:?}", plan);
    if plan.is_empty() {
        inner.events.status("Already at home position");
    }

    let motion = inner.motion();
    let mut pose = start;
    for (n, reset) in plan.iter().enumerate() {
        inner.events.status(format!(
            "Reset {}/{}: J{} -> {:.1}°",
            n + 1,
            plan.len(),
            reset.joint + 1,
            reset.target_deg
        ));
        pose = pose.with_joint(reset.joint, reset.target_deg);
        driver.move_joint(&pose, &motion).await?;
        log_wait(inner.wait_idle(driver).await);
    }

    finish(inner, driver).await;
    Ok(())
}

async fn finish(inner: &PanelInner, driver: &LebaiDriver) {
    let closed = GripperCommand::closed();
    match driver.set_claw(closed).await {
        Ok(_) => inner.set_gripper(closed),
        Err(e) => warn!("Gripper reset failed: {}", e),
    }

    if let Err(e) = inner.apply_actual_position(driver).await {
        warn!("Position reconcile failed, keeping local joints: {}", e);
    }
}

fn log_wait(wait: IdleWait) {
    if let IdleWait::TimedOut { waited } = wait {
        warn!("Continuing after idle timeout ({:?})", waited);
    }
}
