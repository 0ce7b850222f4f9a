//! Byte-level line transports.
//!
//! The transport owns the serial connection and frames traffic into ASCII
//! lines. It never interprets command semantics; rate limiting and echo
//! handling live one layer up in [`crate::channel`].

use crate::error::Result;
use async_trait::async_trait;

pub mod mock;
pub mod serial;

pub use mock::MockTransport;
pub use serial::SerialTransport;

/// A line-oriented connection to the device.
///
/// Reads decode as ASCII with surrounding whitespace stripped; writes are
/// terminated with CRLF by the implementation.
#[async_trait]
pub trait LineTransport: Send + Sync {
    /// Write one command line, appending the CRLF terminator.
    async fn write_line(&mut self, line: &str) -> Result<()>;

    /// Read one line, blocking up to the configured read timeout.
    ///
    /// Returns an empty string when the device had nothing to say within
    /// the timeout; silence is not an error at this layer.
    async fn read_line(&mut self) -> Result<String>;

    /// Discard any buffered unread input ahead of a new transaction.
    async fn flush_input(&mut self) -> Result<()>;

    /// Release the underlying handle. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;

    /// Whether the transport currently holds an open handle.
    fn is_open(&self) -> bool;
}
