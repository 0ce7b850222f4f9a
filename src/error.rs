//! Custom error types for the driver.
//!
//! This module defines the primary error type, [`WattPilotError`], using the
//! `thiserror` crate. The taxonomy separates four kinds of failure:
//!
//! - **Transport**: the port could not be opened, dropped the connection, or
//!   an I/O call failed. Fatal for the triggering operation; not retried
//!   automatically.
//! - **`NoData`**: the device stayed silent within the read timeout. The
//!   caller decides whether to retry.
//! - **Validation**: an argument was rejected before anything was written to
//!   the wire, so the device state is untouched.
//! - **Decoding**: the device answered, but the line did not parse, or a
//!   derived settings field hit a degenerate register value.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type Result<T> = std::result::Result<T, WattPilotError>;

/// All failure modes of the Watt Pilot driver.
#[derive(Error, Debug)]
pub enum WattPilotError {
    /// The serial port could not be opened.
    #[error("Failed to open serial port '{port}': {reason}")]
    PortUnavailable {
        /// Port path that was requested.
        port: String,
        /// Message reported by the serial stack.
        reason: String,
    },

    /// An I/O operation on the open port failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation was attempted after the transport was closed.
    #[error("Serial port not connected")]
    NotConnected,

    /// The port reported end-of-file, which a live serial line never does.
    #[error("Unexpected EOF from serial port")]
    UnexpectedEof,

    /// The real transport was requested from a build without it.
    #[error("Serial support not enabled. Rebuild with --features serial")]
    SerialFeatureDisabled,

    /// The blocking I/O task died before producing a result.
    #[error("Serial I/O task panicked")]
    IoTaskPanicked,

    /// The device returned nothing where a payload line was required.
    #[error("Device returned no data")]
    NoData,

    /// The command echo never arrived within the configured attempt budget.
    #[error("No echo for command '{command}' after {attempts} read attempts")]
    EchoTimeout {
        /// Command whose echo was expected.
        command: String,
        /// Number of reads performed before giving up.
        attempts: u32,
    },

    /// The motor was still running when the wait deadline expired.
    #[error("Motor still running after {0:?}")]
    MotionTimeout(Duration),

    /// Command text failed canonicalization.
    #[error("Invalid command text: {0}")]
    InvalidCommand(&'static str),

    /// An operation argument was rejected before transmission.
    #[error("Invalid {name} value {value}: expected {allowed}")]
    InvalidArgument {
        /// Name of the rejected parameter.
        name: &'static str,
        /// Value that was passed in.
        value: i64,
        /// Human-readable description of the accepted range.
        allowed: &'static str,
    },

    /// A response line did not match the shape the command promises.
    #[error("Malformed response '{response}': {reason}")]
    MalformedResponse {
        /// The offending line, trimmed.
        response: String,
        /// What was expected instead.
        reason: &'static str,
    },

    /// A derived settings field would require dividing by zero.
    #[error("Division by zero while deriving '{0}'")]
    DivisionByZero(&'static str),
}

impl WattPilotError {
    /// Whether the same operation may reasonably succeed on a retry.
    ///
    /// Silence, a garbled line, or a missed echo are transient on a shared
    /// lab bench; transport failures and rejected arguments are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WattPilotError::NoData
                | WattPilotError::EchoTimeout { .. }
                | WattPilotError::MotionTimeout(_)
                | WattPilotError::MalformedResponse { .. }
                | WattPilotError::DivisionByZero(_)
        )
    }
}
