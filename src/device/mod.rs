//! TPMS controller client: wire types, HTTP transport, and the polling session

pub mod session;
pub mod transport;
pub mod types;

pub use session::{
    DeviceSession, DispatchOutcome, SessionConfig, SessionState, DEFAULT_POLL_INTERVAL,
};
pub use transport::{DeviceTransport, HttpTransport, TransportError};
pub use types::{Action, Command, Reading, ReadingSet, TelemetryPayload, WheelId};
