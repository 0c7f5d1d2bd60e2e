//! TPMS Control - Rust Implementation
//!
//! Client for a network-attached tire pressure monitoring controller.
//!
//! This library provides:
//! - A polling session against the controller's `/data` endpoint
//! - Typed per-wheel pressure/temperature readings
//! - Adjustment commands posted to `/command`
//! - An event bus for readings, failures and lifecycle changes
//! - A local HTTP control API with Server-Sent Events (server feature)

pub mod bus;
pub mod device;

#[cfg(feature = "server")]
pub mod api;
#[cfg(feature = "server")]
pub mod config;
