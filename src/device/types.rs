//! Typed model of what a TPMS controller reports and accepts.
//!
//! The wire format is fixed by the controller firmware:
//! - readings arrive as `{"tireData": {"FL": {"pressure": .., "temperature": ..}, ...}}`
//! - commands leave as `{"wheel": "FR", "command": "INCREASE"}`

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// WheelId - Closed set of mounting positions
// =============================================================================

/// One of the four wheel positions on the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WheelId {
    #[serde(rename = "FL")]
    FrontLeft,
    #[serde(rename = "FR")]
    FrontRight,
    #[serde(rename = "RL")]
    RearLeft,
    #[serde(rename = "RR")]
    RearRight,
}

impl WheelId {
    /// All positions, in display order (front row first, left to right)
    pub const ALL: [WheelId; 4] = [
        WheelId::FrontLeft,
        WheelId::FrontRight,
        WheelId::RearLeft,
        WheelId::RearRight,
    ];

    /// Wire name used by the controller
    pub fn as_str(&self) -> &'static str {
        match self {
            WheelId::FrontLeft => "FL",
            WheelId::FrontRight => "FR",
            WheelId::RearLeft => "RL",
            WheelId::RearRight => "RR",
        }
    }
}

impl fmt::Display for WheelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Readings
// =============================================================================

/// Pressure (PSI) and temperature (°C) reported for a single wheel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub pressure: f64,
    pub temperature: f64,
}

impl Reading {
    pub fn new(pressure: f64, temperature: f64) -> Self {
        Self {
            pressure,
            temperature,
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} PSI / {:.2} °C", self.pressure, self.temperature)
    }
}

/// Readings for all four wheels.
///
/// Every position is always present: the key set is the struct's fields,
/// so a poll can only ever replace values, never add or drop wheels.
/// Deserializing requires all four keys; extra keys are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingSet {
    #[serde(rename = "FL")]
    pub front_left: Reading,
    #[serde(rename = "FR")]
    pub front_right: Reading,
    #[serde(rename = "RL")]
    pub rear_left: Reading,
    #[serde(rename = "RR")]
    pub rear_right: Reading,
}

impl ReadingSet {
    /// Reading for one wheel
    pub fn get(&self, wheel: WheelId) -> &Reading {
        match wheel {
            WheelId::FrontLeft => &self.front_left,
            WheelId::FrontRight => &self.front_right,
            WheelId::RearLeft => &self.rear_left,
            WheelId::RearRight => &self.rear_right,
        }
    }

    /// Wheels whose reading differs from `previous`.
    /// Lets a presentation layer highlight only the values that moved.
    pub fn changed_wheels(&self, previous: &ReadingSet) -> Vec<WheelId> {
        WheelId::ALL
            .into_iter()
            .filter(|w| self.get(*w) != previous.get(*w))
            .collect()
    }
}

/// Outcome of decoding a `/data` response body.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryPayload {
    /// A complete `tireData` object
    Readings(ReadingSet),
    /// `tireData` missing: the device had nothing new
    Absent,
    /// `tireData` present but not a valid four-wheel reading set
    Malformed(String),
}

impl TelemetryPayload {
    /// Field carrying the wheel map in a `/data` response
    pub const FIELD: &'static str = "tireData";

    /// Interpret an already-parsed JSON document.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value.get(Self::FIELD) {
            None | Some(serde_json::Value::Null) => TelemetryPayload::Absent,
            Some(data) => match serde_json::from_value::<ReadingSet>(data.clone()) {
                Ok(readings) => TelemetryPayload::Readings(readings),
                Err(e) => TelemetryPayload::Malformed(e.to_string()),
            },
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Adjustment requested for a wheel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Increase,
    Decrease,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Increase => f.write_str("INCREASE"),
            Action::Decrease => f.write_str("DECREASE"),
        }
    }
}

/// Command sent to `POST /command`.
///
/// The action goes out under the key `command`, matching the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub wheel: WheelId,
    #[serde(rename = "command")]
    pub action: Action,
}

impl Command {
    pub fn new(wheel: WheelId, action: Action) -> Self {
        Self { wheel, action }
    }

    pub fn increase(wheel: WheelId) -> Self {
        Self::new(wheel, Action::Increase)
    }

    pub fn decrease(wheel: WheelId) -> Self {
        Self::new(wheel, Action::Decrease)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.wheel, self.action)
    }
}
