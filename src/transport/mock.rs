//! Scripted transport for testing without hardware.
//!
//! The mock answers each written command from a queued reply script and
//! records every write with a timestamp, so tests can assert on command
//! ordering and on the inter-command spacing. A one-shot failure can be
//! injected to exercise transport error paths.

use crate::error::{Result, WattPilotError};
use crate::transport::LineTransport;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

#[derive(Default)]
struct Inner {
    auto_echo: bool,
    closed: bool,
    fail_next_write: bool,
    script: VecDeque<Vec<String>>,
    read_buffer: VecDeque<String>,
    writes: Vec<(Instant, String)>,
    flush_count: u32,
}

/// Scripted [`LineTransport`] double.
///
/// Cloning shares the underlying state, so a test can keep one handle for
/// scripting and inspection while the controller owns the other.
///
/// # Example
/// ```
/// use watt_pilot::transport::{LineTransport, MockTransport};
///
/// # tokio_test::block_on(async {
/// let mut transport = MockTransport::new();
/// transport.push_replies(["o", "0;1200"]); // echo, then payload
/// transport.write_line("o").await.unwrap();
/// assert_eq!(transport.read_line().await.unwrap(), "o");
/// assert_eq!(transport.read_line().await.unwrap(), "0;1200");
/// assert_eq!(transport.read_line().await.unwrap(), ""); // silence
/// # })
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    /// Create a mock with no scripted replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reflect every written line back as the first read, the way the
    /// device echoes commands. Scripted replies follow the echo.
    pub fn with_auto_echo(self) -> Self {
        self.lock().auto_echo = true;
        self
    }

    /// Queue the reply lines for the next unanswered write.
    ///
    /// Each call scripts one command round trip; calls are consumed in
    /// write order.
    pub fn push_replies<I, S>(&self, replies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock()
            .script
            .push_back(replies.into_iter().map(Into::into).collect());
    }

    /// Queue a command round trip that the device leaves unanswered.
    pub fn push_silence(&self) {
        self.lock().script.push_back(Vec::new());
    }

    /// Make the next write fail with an I/O error.
    pub fn fail_next_write(&self) {
        self.lock().fail_next_write = true;
    }

    /// Every line written so far, in order.
    pub fn writes(&self) -> Vec<String> {
        self.lock().writes.iter().map(|(_, w)| w.clone()).collect()
    }

    /// Transmission timestamps matching [`writes`](Self::writes).
    pub fn write_instants(&self) -> Vec<Instant> {
        self.lock().writes.iter().map(|(t, _)| *t).collect()
    }

    /// How many times the input buffer was flushed.
    pub fn flush_count(&self) -> u32 {
        self.lock().flush_count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }
}

#[async_trait]
impl LineTransport for MockTransport {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(WattPilotError::NotConnected);
        }
        if std::mem::take(&mut inner.fail_next_write) {
            return Err(WattPilotError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected write failure",
            )));
        }

        inner.writes.push((Instant::now(), line.to_string()));

        if inner.auto_echo {
            let echo = line.to_string();
            inner.read_buffer.push_back(echo);
        }
        if let Some(replies) = inner.script.pop_front() {
            inner.read_buffer.extend(replies);
        }
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(WattPilotError::NotConnected);
        }
        // An exhausted buffer models the read timeout elapsing.
        Ok(inner.read_buffer.pop_front().unwrap_or_default())
    }

    async fn flush_input(&mut self) -> Result<()> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(WattPilotError::NotConnected);
        }
        inner.flush_count += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replies_follow_writes() {
        let mut transport = MockTransport::new();
        transport.push_replies(["first"]);
        transport.push_replies(["second"]);

        transport.write_line("a 10").await.unwrap();
        transport.write_line("d 10").await.unwrap();

        assert_eq!(transport.read_line().await.unwrap(), "first");
        assert_eq!(transport.read_line().await.unwrap(), "second");
        assert_eq!(transport.writes(), vec!["a 10", "d 10"]);
    }

    #[tokio::test]
    async fn auto_echo_precedes_payload() {
        let mut transport = MockTransport::new().with_auto_echo();
        transport.push_replies(["0;42"]);

        transport.write_line("o").await.unwrap();
        assert_eq!(transport.read_line().await.unwrap(), "o");
        assert_eq!(transport.read_line().await.unwrap(), "0;42");
    }

    #[tokio::test]
    async fn exhausted_script_reads_as_silence() {
        let mut transport = MockTransport::new();
        assert_eq!(transport.read_line().await.unwrap(), "");
    }

    #[tokio::test]
    async fn injected_failure_is_one_shot() {
        let mut transport = MockTransport::new();
        transport.fail_next_write();

        assert!(transport.write_line("st").await.is_err());
        assert!(transport.write_line("st").await.is_ok());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_rejects_io() {
        let mut transport = MockTransport::new();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_open());
        assert!(matches!(
            transport.write_line("st").await,
            Err(WattPilotError::NotConnected)
        ));
    }
}
