//! Mock servers for integration testing
//!
//! Simulate a TPMS controller on loopback so the real HTTP transport can be
//! exercised without hardware.

#![allow(dead_code)]

pub mod device;

pub use device::{sample_data, MockDevice, RecordedCommand};
