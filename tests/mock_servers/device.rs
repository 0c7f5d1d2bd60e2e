//! Mock TPMS controller
//!
//! Serves `GET /data` (scriptable body and status) and `POST /command`
//! (records the raw body and content type, replies with plain text).

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// A command as it arrived on the wire
#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub body: String,
    pub content_type: Option<String>,
}

/// Mock device state
struct MockDeviceState {
    data_status: u16,
    data_body: String,
    data_requests: usize,
    command_status: u16,
    command_reply: String,
    commands: Vec<RecordedCommand>,
}

/// `/data` body for the given (pressure, temperature) per wheel, FL FR RL RR order
pub fn sample_data(wheels: [(f64, f64); 4]) -> Value {
    let [fl, fr, rl, rr] = wheels;
    json!({
        "tireData": {
            "FL": { "pressure": fl.0, "temperature": fl.1 },
            "FR": { "pressure": fr.0, "temperature": fr.1 },
            "RL": { "pressure": rl.0, "temperature": rl.1 },
            "RR": { "pressure": rr.0, "temperature": rr.1 },
        }
    })
}

/// Mock TPMS controller
pub struct MockDevice {
    addr: SocketAddr,
    state: Arc<RwLock<MockDeviceState>>,
    handle: JoinHandle<()>,
}

impl MockDevice {
    /// Start a mock device on a random port, initially reporting no data
    pub async fn start() -> Self {
        let state = Arc::new(RwLock::new(MockDeviceState {
            data_status: 200,
            data_body: json!({ "status": "starting" }).to_string(),
            data_requests: 0,
            command_status: 200,
            command_reply: "OK".to_string(),
            commands: Vec::new(),
        }));

        let app = Router::new()
            .route("/data", get(handle_data))
            .route("/command", post(handle_command))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Address in the form the session expects (`host:port`)
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Serve this JSON document from `/data` with status 200
    pub async fn set_data(&self, body: Value) {
        self.set_raw_data(200, &body.to_string()).await;
    }

    /// Serve an arbitrary body and status from `/data`
    pub async fn set_raw_data(&self, status: u16, body: &str) {
        let mut state = self.state.write().await;
        state.data_status = status;
        state.data_body = body.to_string();
    }

    pub async fn set_command_response(&self, status: u16, reply: &str) {
        let mut state = self.state.write().await;
        state.command_status = status;
        state.command_reply = reply.to_string();
    }

    pub async fn data_requests(&self) -> usize {
        self.state.read().await.data_requests
    }

    pub async fn commands(&self) -> Vec<RecordedCommand> {
        self.state.read().await.commands.clone()
    }

    /// Stop the mock device
    pub async fn stop(self) {
        self.handle.abort();
    }
}

async fn handle_data(State(state): State<Arc<RwLock<MockDeviceState>>>) -> impl IntoResponse {
    let mut state = state.write().await;
    state.data_requests += 1;

    let status = StatusCode::from_u16(state.data_status).unwrap();
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        state.data_body.clone(),
    )
}

async fn handle_command(
    State(state): State<Arc<RwLock<MockDeviceState>>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let mut state = state.write().await;
    state.commands.push(RecordedCommand {
        body,
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    let status = StatusCode::from_u16(state.command_status).unwrap();
    (status, state.command_reply.clone())
}
