//! # Error Types
//!
//! Error handling for the frame server.
//!
//! This module defines every error variant that can surface while accepting,
//! decoding, routing or publishing, from low-level I/O failures up to lock
//! timeouts inside the event bus.
//!
//! ## Error Categories
//! - **I/O Errors**: socket and file system failures
//! - **Protocol Errors**: bad handshakes, oversized frames, closed connections
//! - **Capacity Errors**: connection registry exhausted
//! - **Concurrency Errors**: bounded lock acquisition timed out
//! - **Handler Errors**: failures reported by packet or event handlers
//!
//! None of these are fatal to the process. Callers log them and keep serving.
//!
//! ## Example Usage
//! ```rust
//! use framegate::error::{ProtocolError, Result};
//! use tracing::{error, info};
//!
//! fn read_language(path: &str) -> Result<String> {
//!     let contents = std::fs::read_to_string(path).map_err(ProtocolError::Io)?;
//!     Ok(contents)
//! }
//!
//! fn main() {
//!     match read_language("lang.txt") {
//!         Ok(contents) => info!(len = contents.len(), "Loaded language file"),
//!         Err(e) => error!(error=%e, "Error reading language file"),
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Router-related error messages
    pub const ERR_ROUTER_WRITE_LOCK: &str = "Failed to acquire write lock on packet router";
    pub const ERR_ROUTER_READ_LOCK: &str = "Failed to acquire read lock on packet router";

    /// Event bus lock errors
    pub const ERR_EVENT_READ_LOCK: &str = "Timed out acquiring event bus read lock";
    pub const ERR_EVENT_WRITE_LOCK: &str = "Timed out acquiring event bus write lock";

    /// Handshake errors
    pub const ERR_MISSING_KEY: &str = "Sec-WebSocket-Key header not found";
    pub const ERR_SHORT_KEY: &str = "Sec-WebSocket-Key value is shorter than 24 characters";
    pub const ERR_HANDSHAKE_TIMEOUT: &str = "Handshake request not received in time";
    pub const ERR_EMPTY_HANDSHAKE: &str = "Peer closed before sending a handshake";

    /// Connection errors
    pub const ERR_NO_ENDPOINT: &str = "No listen endpoint configured";
    pub const ERR_NOT_CONFIGURED: &str = "Socket has not been created";

    /// Handler errors
    pub const ERR_HANDLER_PANICKED: &str = "Handler panicked";
}

/// Primary error type for every fallible operation in the crate.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Connection registry full ({0} slots)")]
    CapacityExceeded(usize),

    #[error("Lock timeout: {0}")]
    LockTimeout(&'static str),

    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether the error is an I/O condition the read loop should ride out.
    pub fn is_transient(&self) -> bool {
        match self {
            ProtocolError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
