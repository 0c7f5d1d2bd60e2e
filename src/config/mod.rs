//! Configuration management
//!
//! Precedence (highest first):
//! 1. `TPMS_PORT` / legacy `PORT`, and legacy `DEVICE_IP`
//! 2. `TPMS_*` environment variables (`__` separates nesting, e.g. `TPMS_DEVICE__POLL_INTERVAL_MS`)
//! 3. `config.{toml,json,yaml}` in the config directory
//! 4. Built-in defaults

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::device::SessionConfig;

const APP_DIR_NAME: &str = "tpms-control";

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub device: DeviceConfig,
}

fn default_port() -> u16 {
    8090
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Controller address to connect to at startup (hostname, IP, or host:port)
    pub address: Option<String>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    5000
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: None,
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl DeviceConfig {
    /// Startup address, ignoring blank values
    pub fn startup_address(&self) -> Option<&str> {
        self.address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

/// Get config directory (TPMS_CONFIG_DIR or platform default)
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TPMS_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library/Application Support")
                .join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join(APP_DIR_NAME);
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".config").join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join(APP_DIR_NAME);
        }
    }

    // Fallback to current directory
    PathBuf::from(".")
}

pub fn load_config() -> Result<Config> {
    let config_dir = get_config_dir();

    let mut builder = ::config::Config::builder()
        .set_default("port", default_port() as i64)?
        .set_default("device.poll_interval_ms", default_poll_interval_ms() as i64)?
        .set_default(
            "device.request_timeout_ms",
            default_request_timeout_ms() as i64,
        )?
        .add_source(
            ::config::File::with_name(&config_dir.join("config").to_string_lossy())
                .required(false),
        )
        .add_source(
            ::config::Environment::with_prefix("TPMS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    // TPMS_PORT > PORT > config > default
    if let Ok(port) = std::env::var("TPMS_PORT") {
        if let Ok(port_num) = port.parse::<u16>() {
            builder = builder.set_override("port", port_num as i64)?;
        }
    } else if let Ok(port) = std::env::var("PORT") {
        if let Ok(port_num) = port.parse::<u16>() {
            builder = builder.set_override("port", port_num as i64)?;
        }
    }

    // Shorthand for the common case: just point at the controller
    if let Ok(address) = std::env::var("DEVICE_IP") {
        if !address.trim().is_empty() {
            builder = builder.set_override("device.address", address)?;
        }
    }

    let config = builder.build()?;

    Ok(config.try_deserialize()?)
}
