//! # adb-protocol
//!
//! Client-side engine for the Android Debug Bridge wire protocol: packet
//! framing with the protocol's additive checksum, the CNXN/AUTH handshake
//! (RSA-challenge signing through an abstract key provider), and a stream
//! multiplexer that turns one byte-oriented transport into many concurrent
//! logical command/data streams with per-stream flow control.
//!
//! The engine owns nothing physical: device discovery, USB lifecycle, and
//! the RSA primitives are external collaborators behind small seams
//! ([`transport::AdbTransport`], [`keys::KeyProvider`]).
//!
//! ## Example
//!
//! ```no_run
//! use adb_protocol::{Session, SessionConfig};
//! use adb_protocol::keys::KeyProvider;
//!
//! # async fn run(keys: &dyn KeyProvider) -> adb_protocol::Result<()> {
//! let transport = adb_protocol::transport::tcp::connect("192.168.1.20:5555").await?;
//! let session = Session::connect(transport, keys, SessionConfig::default()).await?;
//!
//! let mut shell = session.open_service("shell:exec getprop").await?;
//! while let Some(chunk) = shell.read().await? {
//!     print!("{}", String::from_utf8_lossy(&chunk));
//! }
//!
//! session.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//! - [`core`]: packet model and tokio codec
//! - [`protocol`]: handshake state machine
//! - [`mux`]: stream table and caller handles
//! - [`session`]: reader loop, write gate, public API
//! - [`transport`]: byte-channel seam plus a TCP implementation
//! - [`keys`]: RSA capability contract

#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod config;
pub mod core;
pub mod error;
pub mod keys;
pub mod mux;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-export main types
pub use crate::config::SessionConfig;
pub use crate::core::codec::PacketCodec;
pub use crate::core::packet::{AuthType, Command, Packet};
pub use crate::error::{AdbError, Result};
pub use crate::keys::KeyProvider;
pub use crate::mux::AdbStream;
pub use crate::protocol::handshake::{ConnectionInfo, HandshakeState};
pub use crate::session::Session;
