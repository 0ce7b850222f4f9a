//! Connection and protocol tuning parameters.
//!
//! Both structs derive `Deserialize` with per-field defaults so a host
//! application can embed them in its own TOML tables:
//!
//! ```toml
//! [attenuator]
//! port = "/dev/ttyUSB0"
//! # baud_rate and read_timeout_ms fall back to the device defaults
//! ```

use serde::Deserialize;
use std::time::Duration;

/// Factory baud rate of the Watt Pilot USB-serial bridge.
pub const DEFAULT_BAUD_RATE: u32 = 38_400;

/// Serial connection parameters. Immutable once the port is open.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Serial port path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,

    /// Line speed. The device only speaks 38400 baud; this is overridable
    /// for bench setups with an interposed converter.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// How long a single line read may block before reporting silence.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl ConnectionConfig {
    /// Configuration for `port` with the device defaults.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }

    /// Read timeout as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Timing and retry budget of the command protocol.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolSettings {
    /// Minimum spacing between two transmissions, send time to send time.
    /// The controller firmware drops commands that arrive faster.
    #[serde(default = "default_command_interval_ms")]
    pub command_interval_ms: u64,

    /// Line reads spent waiting for a command echo before giving up. Each
    /// read is itself bounded by the transport read timeout.
    #[serde(default = "default_echo_attempts")]
    pub echo_attempts: u32,

    /// Spacing of run-state polls while waiting for motion to finish.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Overall deadline for a motion wait. `None` polls until the motor
    /// reports stopped, however long that takes.
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            command_interval_ms: default_command_interval_ms(),
            echo_attempts: default_echo_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            wait_timeout_ms: None,
        }
    }
}

impl ProtocolSettings {
    /// Inter-command floor as a [`Duration`].
    pub fn command_interval(&self) -> Duration {
        Duration::from_millis(self.command_interval_ms)
    }

    /// Motion poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Motion wait deadline, if one is configured.
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_timeout_ms() -> u64 {
    2_000
}

fn default_command_interval_ms() -> u64 {
    50
}

fn default_echo_attempts() -> u32 {
    20
}

fn default_poll_interval_ms() -> u64 {
    100
}
