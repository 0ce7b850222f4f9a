//! Serial port transport for the Watt Pilot.
//!
//! Wraps the `serialport` crate and provides async line I/O by running the
//! synchronous serial operations on Tokio's blocking task executor. The
//! port sits behind `Arc<Mutex<..>>` so the blocking closures can take it
//! with them.

use crate::config::ConnectionConfig;
use crate::error::{Result, WattPilotError};
use crate::transport::LineTransport;
use async_trait::async_trait;
use log::debug;
use std::time::Duration;

#[cfg(feature = "serial")]
use log::trace;
#[cfg(feature = "serial")]
use serialport::{ClearBuffer, SerialPort};
#[cfg(feature = "serial")]
use std::sync::Arc;
#[cfg(feature = "serial")]
use tokio::sync::Mutex;

/// Command/response line terminator used by the device.
const LINE_TERMINATOR: &str = "\r\n";

/// Inner serialport timeout. The outer read deadline comes from
/// [`ConnectionConfig::read_timeout_ms`]; the short inner timeout just
/// keeps the read loop responsive.
#[cfg(feature = "serial")]
const PORT_TIMEOUT: Duration = Duration::from_millis(100);

/// [`LineTransport`] backed by a real serial port.
pub struct SerialTransport {
    port_name: String,
    read_timeout: Duration,
    #[cfg(feature = "serial")]
    port: Option<Arc<Mutex<Box<dyn SerialPort>>>>,
}

impl SerialTransport {
    /// Open the port described by `config`.
    ///
    /// The USB bridge on the device does not use RTS/CTS, so flow control
    /// is disabled.
    #[cfg(feature = "serial")]
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(PORT_TIMEOUT)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| WattPilotError::PortUnavailable {
                port: config.port.clone(),
                reason: e.to_string(),
            })?;

        debug!(
            "Serial port '{}' opened at {} baud",
            config.port, config.baud_rate
        );

        Ok(Self {
            port_name: config.port.clone(),
            read_timeout: config.read_timeout(),
            port: Some(Arc::new(Mutex::new(port))),
        })
    }

    /// Open the port described by `config`.
    #[cfg(not(feature = "serial"))]
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let _ = config;
        Err(WattPilotError::SerialFeatureDisabled)
    }

    #[cfg(feature = "serial")]
    fn port(&self) -> Result<Arc<Mutex<Box<dyn SerialPort>>>> {
        self.port.clone().ok_or(WattPilotError::NotConnected)
    }
}

#[cfg(feature = "serial")]
#[async_trait]
impl LineTransport for SerialTransport {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        let port = self.port()?;
        let framed = format!("{line}{LINE_TERMINATOR}");

        tokio::task::spawn_blocking(move || -> Result<()> {
            use std::io::Write;

            let mut guard = port.blocking_lock();
            guard.write_all(framed.as_bytes())?;
            guard.flush()?;
            Ok(())
        })
        .await
        .map_err(|_| WattPilotError::IoTaskPanicked)??;

        trace!("-> {}", line);
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String> {
        let port = self.port()?;
        let deadline = self.read_timeout;

        let line = tokio::task::spawn_blocking(move || -> Result<String> {
            use std::io::Read;

            let mut guard = port.blocking_lock();
            let mut response = String::new();
            let mut buffer = [0u8; 1];
            let start = std::time::Instant::now();

            loop {
                if start.elapsed() > deadline {
                    // Deadline reached; hand back whatever arrived, which
                    // for a silent device is nothing.
                    break;
                }

                match guard.read(&mut buffer) {
                    Ok(1) => {
                        let ch = buffer[0] as char;
                        if ch == '\n' {
                            break;
                        }
                        response.push(ch);
                    }
                    Ok(0) => return Err(WattPilotError::UnexpectedEof),
                    Ok(_) => continue,
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                        // Port timeout is shorter than our overall deadline
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            Ok(response.trim().to_string())
        })
        .await
        .map_err(|_| WattPilotError::IoTaskPanicked)??;

        if !line.is_empty() {
            trace!("<- {}", line);
        }
        Ok(line)
    }

    async fn flush_input(&mut self) -> Result<()> {
        let port = self.port()?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            port.blocking_lock()
                .clear(ClearBuffer::Input)
                .map_err(|e| WattPilotError::Io(e.into()))
        })
        .await
        .map_err(|_| WattPilotError::IoTaskPanicked)?
    }

    async fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!("Serial port '{}' closed", self.port_name);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

#[cfg(not(feature = "serial"))]
#[async_trait]
impl LineTransport for SerialTransport {
    async fn write_line(&mut self, _line: &str) -> Result<()> {
        Err(WattPilotError::SerialFeatureDisabled)
    }

    async fn read_line(&mut self) -> Result<String> {
        Err(WattPilotError::SerialFeatureDisabled)
    }

    async fn flush_input(&mut self) -> Result<()> {
        Err(WattPilotError::SerialFeatureDisabled)
    }

    async fn close(&mut self) -> Result<()> {
        debug!("Serial port '{}' closed", self.port_name);
        Ok(())
    }

    fn is_open(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "serial")]
    #[test]
    fn open_nonexistent_port_reports_port_unavailable() {
        let config = ConnectionConfig::new("/dev/ttyWATTPILOT-does-not-exist");
        let result = SerialTransport::open(&config);
        match result {
            Err(WattPilotError::PortUnavailable { port, .. }) => {
                assert_eq!(port, "/dev/ttyWATTPILOT-does-not-exist");
            }
            other => panic!("expected PortUnavailable, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn terminator_is_crlf() {
        assert_eq!(LINE_TERMINATOR, "\r\n");
    }
}
