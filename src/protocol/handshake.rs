//! CNXN/AUTH handshake state machine.
//!
//! **Per-Session State**: handshake state is a session-scoped structure
//! driven entirely by inbound packet commands — no globals, no implicit
//! retries. The machine allows exactly one signature attempt; a second
//! challenge while a signature is outstanding means the peer rejected it,
//! and the only fallback is a single public-key offer. After that the peer
//! is expected to prompt its user out-of-band, so a further challenge (or
//! silence) fails the handshake.
//!
//! The machine is pure with respect to I/O: it consumes packets and yields
//! [`HandshakeEvent`]s telling the session what to send. This keeps every
//! transition unit-testable without a transport.

use bytes::Bytes;
use tracing::debug;

use crate::config::{SessionConfig, MAX_PAYLOAD, MAX_PAYLOAD_V1};
use crate::core::packet::{AuthType, Command, Packet};
use crate::error::{constants, AdbError, Result};
use crate::keys::KeyProvider;

/// Handshake phases, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet
    Init,
    /// Our CNXN is out; the peer will answer CNXN or AUTH
    AwaitAuthOrConnect,
    /// Challenge signed and returned; awaiting the peer's verdict
    SignatureSent,
    /// Signature rejected; public key offered, awaiting out-of-band approval
    PublicKeySent,
    /// Session established, negotiated parameters recorded
    Connected,
    /// Terminal failure
    Failed,
}

/// Session parameters recorded from the peer's CNXN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Peer protocol version (CNXN arg0)
    pub version: u32,
    /// Negotiated payload bound: the peer's advertised value clamped to the
    /// protocol maximum
    pub max_payload: usize,
    /// Peer identity banner
    pub banner: String,
}

/// What the session must do after feeding a packet to the machine.
#[derive(Debug)]
pub enum HandshakeEvent {
    /// Write this packet and keep reading
    Send(Packet),
    /// Handshake complete
    Established(ConnectionInfo),
}

/// Client-side handshake driver.
pub struct Handshaker {
    state: HandshakeState,
    version: u32,
    advertised_max_payload: u32,
    banner: String,
}

impl Handshaker {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            state: HandshakeState::Init,
            version: crate::config::ADB_VERSION,
            advertised_max_payload: config.max_payload as u32,
            banner: config.banner.clone(),
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The opening CNXN. Moves Init → AwaitAuthOrConnect.
    pub fn connect_packet(&mut self) -> Packet {
        debug_assert_eq!(self.state, HandshakeState::Init);
        self.state = HandshakeState::AwaitAuthOrConnect;
        Packet::cnxn(self.version, self.advertised_max_payload, &self.banner)
    }

    /// Drive the machine with one inbound packet.
    ///
    /// # Errors
    /// Any error is terminal: the machine moves to `Failed` and the session
    /// must drop the transport.
    pub fn on_packet(&mut self, packet: &Packet, keys: &dyn KeyProvider) -> Result<HandshakeEvent> {
        match (self.state, packet.command) {
            // The peer may accept at any point: directly, after our
            // signature, or after its user approves the offered key.
            (
                HandshakeState::AwaitAuthOrConnect
                | HandshakeState::SignatureSent
                | HandshakeState::PublicKeySent,
                Command::Cnxn,
            ) => {
                let info = ConnectionInfo {
                    version: packet.arg0,
                    max_payload: negotiate_max_payload(packet.arg1),
                    banner: banner_from_payload(&packet.payload),
                };
                debug!(
                    version = info.version,
                    max_payload = info.max_payload,
                    banner = %info.banner,
                    "handshake established"
                );
                self.state = HandshakeState::Connected;
                Ok(HandshakeEvent::Established(info))
            }

            (HandshakeState::AwaitAuthOrConnect, Command::Auth) => {
                self.expect_token(packet)?;
                let signature = self.fail_on_err(keys.sign(&packet.payload))?;
                debug!(token_len = packet.payload.len(), "signing auth challenge");
                self.state = HandshakeState::SignatureSent;
                Ok(HandshakeEvent::Send(Packet::auth(
                    AuthType::Signature,
                    Bytes::from(signature),
                )))
            }

            // A second challenge means the signature was rejected; fall back
            // to offering the public key, exactly once.
            (HandshakeState::SignatureSent, Command::Auth) => {
                self.expect_token(packet)?;
                let key = self.fail_on_err(keys.public_key())?;
                debug!(key_len = key.len(), "signature rejected, offering public key");
                self.state = HandshakeState::PublicKeySent;
                Ok(HandshakeEvent::Send(Packet::auth(
                    AuthType::RsaPublicKey,
                    Bytes::from(key),
                )))
            }

            (HandshakeState::PublicKeySent, Command::Auth) => {
                self.state = HandshakeState::Failed;
                Err(AdbError::AuthenticationFailed(
                    constants::ERR_SIGNATURE_REJECTED.to_string(),
                ))
            }

            (HandshakeState::Init | HandshakeState::Connected | HandshakeState::Failed, _) => {
                self.state = HandshakeState::Failed;
                Err(AdbError::ProtocolViolation(
                    constants::ERR_HANDSHAKE_FINISHED.to_string(),
                ))
            }

            (_, command) => {
                self.state = HandshakeState::Failed;
                Err(AdbError::ProtocolViolation(format!(
                    "{}: {command}",
                    constants::ERR_HANDSHAKE_COMMAND
                )))
            }
        }
    }

    /// Only the Token subtype is ever peer-initiated.
    fn expect_token(&mut self, packet: &Packet) -> Result<()> {
        if AuthType::from_u32(packet.arg0) != Some(AuthType::Token) {
            self.state = HandshakeState::Failed;
            return Err(AdbError::ProtocolViolation(format!(
                "{} ({})",
                constants::ERR_AUTH_SUBTYPE,
                packet.arg0
            )));
        }
        Ok(())
    }

    fn fail_on_err<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.state = HandshakeState::Failed;
        }
        result
    }
}

/// Clamp the peer's advertised bound to the protocol maximum; a zero advert
/// (never sent by real peers, but cheap to handle) falls back to the
/// version-1 bound.
fn negotiate_max_payload(advertised: u32) -> usize {
    if advertised == 0 {
        MAX_PAYLOAD_V1
    } else {
        (advertised as usize).min(MAX_PAYLOAD)
    }
}

/// Peer banners are NUL-terminated strings; tolerate arbitrary bytes.
fn banner_from_payload(payload: &[u8]) -> String {
    let end = payload
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).into_owned()
}
