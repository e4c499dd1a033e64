use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{info, warn};

pub use crate::commands::*;
pub use crate::packets::*;
pub use crate::{GripperCommand, JointPose, LebaiError, MotionParameters};

use super::{IdleDetection, IdleWait, LebaiDriverConfig};

/// HTTP JSON-RPC client for one controller endpoint.
///
/// Cloning is cheap; clones share the HTTP connection pool and the request id counter, so ids
/// stay unique and increasing across every clone for the lifetime of the driver.
#[derive(Debug, Clone)]
pub struct LebaiDriver {
    pub config: LebaiDriverConfig,
    pub log_channel: broadcast::Sender<String>,
    http: reqwest::Client,
    base_url: String,
    next_request_id: Arc<AtomicU64>,
}

impl LebaiDriver {
    /// Builds a driver for the configured endpoint.
    ///
    /// No traffic is generated here; the first request doubles as the reachability probe.
    ///
    /// # Errors
    ///
    /// Returns [`LebaiError::Configuration`] if the address or port is unusable or the HTTP
    /// client cannot be created.
    pub fn new(config: LebaiDriverConfig) -> Result<LebaiDriver, LebaiError> {
        config.validate().map_err(LebaiError::Configuration)?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| LebaiError::Configuration(e.to_string()))?;

        let (log_channel, _rx) = broadcast::channel(100);

        Ok(Self {
            base_url: config.connection_url(),
            config,
            log_channel,
            http,
            next_request_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn log_message<T: Into<String>>(&self, message: T) {
        let message = message.into();
        #[cfg(feature = "logging")]
        tracing::debug!(target: "lebai_rpc::wire", "{}", message);
        let _ = self.log_channel.send(message);
    }

    fn give_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Posts one request and waits for the reply or the request timeout.
    ///
    /// Non-2xx statuses, connection failures and timeouts all come back as `Err`; a reply
    /// carrying an RPC `error` member is still `Ok` and must be inspected by the caller.
    pub async fn send(&self, command: &Command) -> Result<RawResponse, LebaiError> {
        let request = RpcRequest::new(command, self.give_request_id())
            .map_err(|e| LebaiError::Serialization(e.to_string()))?;
        let body = serde_json::to_string(&request)
            .map_err(|e| LebaiError::Serialization(e.to_string()))?;

        self.log_message(format!("Sent: {}", body));

        let response = self
            .http
            .post(&self.base_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            self.log_message(format!("HTTP error {} for {}", status, command.method()));
            return Err(LebaiError::HttpStatus(status.as_u16()));
        }

        let text = response.text().await.map_err(|e| self.classify(e))?;
        self.log_message(format!("Received: {}", text));

        RawResponse::parse(text)
    }

    /// Sends without suspending the caller. Failures are only logged.
    ///
    /// Returns `false` when there is no tokio runtime to run the request on.
    pub fn send_detached(&self, command: Command) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("{} dropped: no tokio runtime", command.method());
            return false;
        };
        let driver = self.clone();
        runtime.spawn(async move {
            match driver.send(&command).await {
                Ok(raw) if raw.is_success() => {}
                Ok(raw) => warn!("{} rejected: {}", command.method(), raw.body),
                Err(e) => warn!("{} (fire-and-forget) failed: {}", command.method(), e),
            }
        });
        true
    }

    /// Sends and returns the `result` member.
    pub async fn call(&self, command: &Command) -> Result<Value, LebaiError> {
        let raw = self.send(command).await?;
        raw.result().cloned()
    }

    fn classify(&self, error: reqwest::Error) -> LebaiError {
        if error.is_timeout() {
            LebaiError::Timeout(self.config.request_timeout_ms)
        } else if error.is_connect() || error.is_request() || error.is_builder() {
            LebaiError::FailedToSend(error.to_string())
        } else {
            LebaiError::FailedToReceive(error.to_string())
        }
    }

    pub async fn robot_state(&self) -> Result<RobotState, LebaiError> {
        let result = self.call(&Command::GetRobotState).await?;
        RobotState::from_result(&result)
    }

    /// Single idle probe using the configured detection mode.
    pub async fn is_idle(&self) -> Result<bool, LebaiError> {
        let raw = self.send(&Command::GetRobotState).await?;
        match self.config.idle_detection {
            IdleDetection::LegacySubstring => Ok(body_reports_idle(&raw.body)),
            IdleDetection::Structured => Ok(RobotState::from_result(raw.result()?)?.is_idle()),
        }
    }

    pub async fn start_system(&self) -> Result<Value, LebaiError> {
        self.call(&Command::StartSys).await
    }

    pub async fn stop_system(&self) -> Result<Value, LebaiError> {
        self.call(&Command::StopSys).await
    }

    pub async fn power_down(&self) -> Result<Value, LebaiError> {
        self.call(&Command::PowerDown).await
    }

    pub async fn init_claw(&self) -> Result<Value, LebaiError> {
        self.call(&Command::InitClaw).await
    }

    pub async fn set_claw(&self, gripper: GripperCommand) -> Result<Value, LebaiError> {
        self.call(&Command::SetClaw(gripper.into())).await
    }

    pub async fn move_joint(
        &self,
        pose: &JointPose,
        motion: &MotionParameters,
    ) -> Result<Value, LebaiError> {
        self.call(&Command::MoveJoint(MoveJoint::new(pose, motion))).await
    }

    pub async fn stop_move(&self) -> Result<Value, LebaiError> {
        self.call(&Command::StopMove).await
    }

    pub async fn set_digital_output(&self, output: SetDigitalOutput) -> Result<Value, LebaiError> {
        self.call(&Command::SetDo(output)).await
    }

    pub async fn read_kin_data(&self) -> Result<KinData, LebaiError> {
        let result = self.call(&Command::GetKinData).await?;
        KinData::from_result(&result)
    }

    /// Polls `get_robot_state` until the controller reports idle or `max_wait` elapses.
    ///
    /// Poll failures count as "not idle yet". Timing out is logged and reported through the
    /// return value; it never aborts the caller.
    pub async fn wait_until_idle(&self, max_wait: Duration, poll_interval: Duration) -> IdleWait {
        let started = Instant::now();
        self.log_message("Waiting for robot to become idle");

        while started.elapsed() < max_wait {
            match self.is_idle().await {
                Ok(true) => {
                    let waited = started.elapsed();
                    info!("Robot idle after {:?}", waited);
                    return IdleWait::Idle { waited };
                }
                Ok(false) => {}
                Err(e) => self.log_message(format!("Idle poll failed: {}", e)),
            }
            sleep(poll_interval).await;
        }

        let waited = started.elapsed();
        warn!("Robot not idle after {:?}, proceeding anyway", waited);
        IdleWait::TimedOut { waited }
    }
}
