//! Command framing, rate limiting and echo verification.
//!
//! The device is a half-duplex conversational peer: it reflects every
//! command line back before (or instead of) answering, and it drops
//! commands that arrive less than 50 ms after the previous one. The
//! [`CommandChannel`] turns a logical command into a verified round trip:
//!
//! 1. flush stale input,
//! 2. sleep out the remainder of the inter-command floor,
//! 3. transmit the command with CRLF and stamp the rate-limit clock,
//! 4. optionally read until the echo comes back, discarding anything else.
//!
//! Status queries whose response line is the payload rather than an echo
//! are sent with [`CommandChannel::send_unechoed`].

use crate::config::ProtocolSettings;
use crate::error::{Result, WattPilotError};
use crate::transport::LineTransport;
use log::debug;
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// A canonical device command: trimmed ASCII text, never empty, with no
/// embedded line terminators or control bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command(String);

impl Command {
    /// Normalize `text` into a command, trimming surrounding whitespace.
    pub fn new(text: impl AsRef<str>) -> Result<Self> {
        let trimmed = text.as_ref().trim();
        if trimmed.is_empty() {
            return Err(WattPilotError::InvalidCommand("command is empty"));
        }
        if !trimmed.is_ascii() {
            return Err(WattPilotError::InvalidCommand("command must be ASCII"));
        }
        if trimmed.bytes().any(|b| b.is_ascii_control()) {
            return Err(WattPilotError::InvalidCommand(
                "command must not contain control characters",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Normalize a byte sequence into a command.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| WattPilotError::InvalidCommand("command bytes are not valid text"))?;
        Self::new(text)
    }

    /// The canonical command text, without the CRLF terminator.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialized command/response access to one device.
pub struct CommandChannel<T> {
    transport: T,
    min_interval: Duration,
    echo_attempts: u32,
    last_sent: Option<Instant>,
}

impl<T: LineTransport> CommandChannel<T> {
    /// Wrap `transport` with the timing budget from `settings`.
    pub fn new(transport: T, settings: &ProtocolSettings) -> Self {
        Self {
            transport,
            min_interval: settings.command_interval(),
            echo_attempts: settings.echo_attempts,
            last_sent: None,
        }
    }

    /// Transmit `command` and wait for the device to echo it back.
    ///
    /// Lines that are not the echo are logged and discarded; after
    /// `echo_attempts` reads without a match the round trip fails with
    /// [`WattPilotError::EchoTimeout`].
    pub async fn send(&mut self, command: &Command) -> Result<()> {
        self.transmit(command).await?;
        self.clear_echo(command).await
    }

    /// Transmit `command` without echo verification.
    ///
    /// Used for queries whose response line is the payload, not an echo.
    pub async fn send_unechoed(&mut self, command: &Command) -> Result<()> {
        self.transmit(command).await
    }

    /// Read one payload line from the device.
    pub async fn read_line(&mut self) -> Result<String> {
        self.transport.read_line().await
    }

    /// The wrapped transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Release the transport. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }

    async fn transmit(&mut self, command: &Command) -> Result<()> {
        self.transport.flush_input().await?;

        // 50 ms floor between transmissions, send time to send time. The
        // sleep is a scheduling yield, not a busy spin.
        if let Some(last) = self.last_sent {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }

        self.transport.write_line(command.as_str()).await?;
        self.last_sent = Some(Instant::now());
        Ok(())
    }

    async fn clear_echo(&mut self, command: &Command) -> Result<()> {
        for _ in 0..self.echo_attempts {
            let line = self.transport.read_line().await?;
            if line == command.as_str() {
                return Ok(());
            }
            if line.is_empty() {
                debug!("still waiting for echo of '{}'", command);
            } else {
                debug!("discarding '{}' while waiting for echo of '{}'", line, command);
            }
        }
        Err(WattPilotError::EchoTimeout {
            command: command.as_str().to_string(),
            attempts: self.echo_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_normalizes_whitespace() {
        let command = Command::new("  m 100 \r\n").unwrap();
        assert_eq!(command.as_str(), "m 100");
    }

    #[test]
    fn command_rejects_empty_input() {
        assert!(matches!(
            Command::new("   "),
            Err(WattPilotError::InvalidCommand(_))
        ));
    }

    #[test]
    fn command_rejects_embedded_terminators() {
        assert!(Command::new("m 100\rzp").is_err());
        assert!(Command::new("m\t100").is_err());
    }

    #[test]
    fn command_from_bytes_matches_text_form() {
        let from_bytes = Command::from_bytes(b"zp\r\n").unwrap();
        let from_text = Command::new("zp").unwrap();
        assert_eq!(from_bytes, from_text);
    }

    #[test]
    fn command_rejects_non_ascii() {
        assert!(Command::new("m 10\u{00b5}").is_err());
    }
}
