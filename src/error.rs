//! # Error Types
//!
//! Comprehensive error handling for the ADB protocol engine.
//!
//! This module defines all error variants that can occur during a session,
//! from low-level framing failures to handshake and stream-level refusals.
//!
//! ## Error Categories
//! - **I/O Errors**: transport read/write failures
//! - **Framing Errors**: bad magic, checksum mismatch, oversized payloads —
//!   always fatal to the session, since byte alignment is lost
//! - **Handshake Errors**: authentication exhausted its single fallback
//! - **Stream Errors**: a peer refused an OPEN, or a stream is gone
//! - **Protocol Errors**: a command arrived in an invalid phase
//!
//! All errors implement `std::error::Error` for interoperability.

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
/// Static strings are borrowed, avoiding heap allocations for common cases.
pub mod constants {
    /// Handshake errors
    pub const ERR_SIGNATURE_REJECTED: &str =
        "Peer rejected signature and public key; waiting on out-of-band approval";
    pub const ERR_AUTH_SUBTYPE: &str = "Unexpected AUTH subtype from peer";
    pub const ERR_HANDSHAKE_COMMAND: &str = "Command not valid before session is connected";
    pub const ERR_HANDSHAKE_FINISHED: &str = "Handshake already finished";

    /// Session errors
    pub const ERR_SESSION_NOT_CONNECTED: &str = "Session is not connected";
    pub const ERR_COMMAND_AFTER_CONNECT: &str = "Handshake command received after connect";

    /// Stream errors
    pub const ERR_WRITE_NOT_ACKED: &str = "Write acknowledgment lost";
}

/// Primary error type for all engine operations.
#[derive(Error, Debug)]
pub enum AdbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("bad magic 0x{magic:08x} for command word 0x{command:08x}")]
    BadMagic { command: u32, magic: u32 },

    #[error("payload checksum mismatch: header 0x{expected:08x}, computed 0x{actual:08x}")]
    BadChecksum { expected: u32, actual: u32 },

    #[error("payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("unknown command word 0x{0:08x}")]
    UnknownCommand(u32),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("stream open refused by peer: {service}")]
    StreamOpenRefused { service: String },

    #[error("stream closed")]
    StreamClosed,

    #[error("transport closed")]
    TransportClosed,

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("connection timed out")]
    ConnectionTimeout,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("key provider error: {0}")]
    KeyProvider(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl AdbError {
    /// Whether this error tears down the whole session rather than a single
    /// operation. Framing errors lose byte alignment; protocol violations
    /// mean the peer and engine disagree about the session phase.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AdbError::Io(_)
                | AdbError::BadMagic { .. }
                | AdbError::BadChecksum { .. }
                | AdbError::PayloadTooLarge { .. }
                | AdbError::UnknownCommand(_)
                | AdbError::TransportClosed
                | AdbError::TransportError(_)
                | AdbError::ProtocolViolation(_)
        )
    }
}

/// Type alias for Results using AdbError
pub type Result<T> = std::result::Result<T, AdbError>;
