use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::robot::{RecordedCall, SimRobot};
use crate::SimConfig;

const PARSE_ERROR: i64 = -32700;

type SharedRobot = Arc<Mutex<SimRobot>>;

pub fn router(robot: SharedRobot) -> Router {
    Router::new().route("/", post(handle_rpc)).with_state(robot)
}

async fn handle_rpc(State(robot): State<SharedRobot>, body: String) -> Response {
    debug!("Request: {}", body);

    let request: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to parse JSON: {}", e);
            let reply = json!({
                "jsonrpc": "2.0",
                "error": {"code": PARSE_ERROR, "message": e.to_string()},
                "id": Value::Null,
            });
            return Json(reply).into_response();
        }
    };

    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let outcome = {
        let mut robot = robot.lock().await;
        let outcome = robot.handle_request(id.as_u64(), &method, &params);
        if robot.config().http_fails(&method) {
            None
        } else {
            Some(outcome)
        }
    };

    let reply = match outcome {
        None => {
            return (StatusCode::INTERNAL_SERVER_ERROR, "simulated controller fault")
                .into_response()
        }
        Some(Ok(result)) => json!({"jsonrpc": "2.0", "result": result, "id": id}),
        Some(Err(fault)) => json!({
            "jsonrpc": "2.0",
            "error": {"code": fault.code, "message": fault.message},
            "id": id,
        }),
    };

    debug!("Response: {}", reply);
    Json(reply).into_response()
}

/// Serves the simulator on `addr` until the process exits.
pub async fn serve(addr: SocketAddr, config: SimConfig) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Simulated Lebai controller listening on {}", listener.local_addr()?);
    let robot = Arc::new(Mutex::new(SimRobot::new(config)));
    axum::serve(listener, router(robot)).await
}

/// Starts a simulator on an ephemeral loopback port.
pub async fn spawn(config: SimConfig) -> io::Result<SimHandle> {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    let robot = Arc::new(Mutex::new(SimRobot::new(config)));
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let app = router(robot.clone());
    let task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        if let Err(e) = server.await {
            error!("Simulator stopped: {}", e);
        }
    });

    Ok(SimHandle {
        addr,
        robot,
        shutdown: Some(shutdown_tx),
        task,
    })
}

/// Running in-process simulator. Dropping the handle stops the server.
pub struct SimHandle {
    addr: SocketAddr,
    robot: SharedRobot,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SimHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.robot.lock().await.calls().to_vec()
    }

    /// Method names of every recorded call, oldest first.
    pub async fn methods(&self) -> Vec<String> {
        self.robot
            .lock()
            .await
            .calls()
            .iter()
            .map(|c| c.method.clone())
            .collect()
    }

    /// Request ids of every recorded call, oldest first.
    pub async fn ids(&self) -> Vec<Option<u64>> {
        self.robot.lock().await.calls().iter().map(|c| c.id).collect()
    }

    pub async fn clear_calls(&self) {
        self.robot.lock().await.clear_calls();
    }

    pub async fn joints_deg(&self) -> [f64; 6] {
        self.robot.lock().await.joints_deg()
    }

    pub async fn claw(&self) -> lebai_rpc::GripperCommand {
        self.robot.lock().await.claw()
    }

    pub async fn output(&self, device: &str, pin: u32) -> Option<u32> {
        self.robot.lock().await.output(device, pin)
    }

    pub async fn is_started(&self) -> bool {
        self.robot.lock().await.is_started()
    }

    pub async fn set_stuck_moving(&self, stuck: bool) {
        self.robot.lock().await.set_stuck_moving(stuck);
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for SimHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.abort();
    }
}
