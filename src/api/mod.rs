//! HTTP API handlers
//!
//! Local control surface for the presentation layer: session state,
//! connect/disconnect, commands, and a live event stream.

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::{Duration, Instant};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::bus::SharedBus;
use crate::device::{Command, DeviceSession, DispatchOutcome, SessionState};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session: DeviceSession,
    pub bus: SharedBus,
    started_at: Instant,
}

impl AppState {
    pub fn new(session: DeviceSession, bus: SharedBus) -> Self {
        Self {
            session,
            bus,
            started_at: Instant::now(),
        }
    }
}

/// Build the API router with middleware attached
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/status", get(status_handler))
        // Device session
        .route("/session", get(session_handler))
        .route("/session/connect", post(connect_handler))
        .route("/session/disconnect", post(disconnect_handler))
        .route("/session/command", post(command_handler))
        // Event stream (SSE)
        .route("/events", get(events_handler))
        // Middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// General status response
#[derive(Serialize, Deserialize)]
pub struct StatusResponse {
    pub service: String,
    pub version: String,
    pub git_sha: String,
    pub uptime_secs: u64,
    pub connected: bool,
    pub address: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
    pub bus_subscribers: usize,
}

/// GET /status - Service health check
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let session = state.session.state().await;

    Json(StatusResponse {
        service: "tpms-control".to_string(),
        version: env!("TPMS_VERSION").to_string(),
        git_sha: env!("TPMS_GIT_SHA").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        connected: session.is_connected(),
        address: session.address().map(str::to_string),
        last_update: session.last_update(),
        bus_subscribers: state.bus.subscriber_count(),
    })
}

// =============================================================================
// Session handlers
// =============================================================================

/// GET /session - Connection state and latest readings
pub async fn session_handler(State(state): State<AppState>) -> Json<SessionState> {
    Json(state.session.state().await)
}

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub address: String,
}

/// POST /session/connect - Start polling a controller (replaces any current session)
pub async fn connect_handler(
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> impl IntoResponse {
    if req.address.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "address must not be empty");
    }

    let session = state.session.connect(&req.address).await;
    (StatusCode::OK, Json(session)).into_response()
}

/// POST /session/disconnect - Stop polling
pub async fn disconnect_handler(State(state): State<AppState>) -> Json<SessionState> {
    state.session.disconnect().await;
    Json(state.session.state().await)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandAccepted {
    pub queued: bool,
    pub command: Command,
}

/// POST /session/command - Queue an adjustment for one wheel
///
/// Returns 202 once queued; the device's reply arrives on /events.
pub async fn command_handler(
    State(state): State<AppState>,
    Json(command): Json<Command>,
) -> impl IntoResponse {
    match state.session.try_dispatch(command).await {
        DispatchOutcome::Queued => (
            StatusCode::ACCEPTED,
            Json(CommandAccepted {
                queued: true,
                command,
            }),
        )
            .into_response(),
        DispatchOutcome::NotConnected => {
            error_response(StatusCode::CONFLICT, "not connected to a device")
        }
        DispatchOutcome::QueueFull => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "command queue full")
        }
    }
}

// =============================================================================
// Event stream
// =============================================================================

/// GET /events - Server-Sent Events stream of bus events
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.bus.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json) => Some(Ok(Event::default().data(json))),
            Err(_) => None,
        },
        Err(_) => None, // Skip lagged messages
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
