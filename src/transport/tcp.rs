//! TCP transport for devices in ADB-over-TCP mode.
//!
//! A device listening on port 5555 speaks exactly the wire protocol this
//! engine implements; only the byte channel differs from USB.

use std::time::Duration;

use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{info, instrument};

use crate::error::{AdbError, Result};

/// Port a device listens on in TCP mode.
pub const DEFAULT_PORT: u16 = 5555;

/// Connect to a device over TCP.
///
/// Nagle's algorithm is disabled: the protocol is small-packet
/// request/response and flow control stalls on delayed acknowledgments.
#[instrument(skip(addr))]
pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    if let Ok(peer) = stream.peer_addr() {
        info!(peer = %peer, "transport connected");
    }
    Ok(stream)
}

/// Connect with an upper bound on connection establishment.
pub async fn connect_timeout<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<TcpStream> {
    tokio::time::timeout(timeout, connect(addr))
        .await
        .map_err(|_| AdbError::ConnectionTimeout)?
}
