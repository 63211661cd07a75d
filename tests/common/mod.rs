//! Shared helpers: a deterministic key provider and a scripted peer that
//! speaks the device side of the protocol over an in-memory duplex.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

use adb_protocol::core::packet::{AuthType, Command, Packet};
use adb_protocol::{KeyProvider, PacketCodec, Result};

/// Deterministic provider: the signature is the token reversed, the public
/// key a fixed ADB-format blob. The scripted peer verifies against the same
/// rule, so no real RSA is involved.
pub struct FakeKeys;

impl FakeKeys {
    pub fn expected_signature(token: &[u8]) -> Vec<u8> {
        let mut sig = token.to_vec();
        sig.reverse();
        sig
    }

    pub const PUBLIC_KEY: &'static [u8] = b"QUFBQQ== tester@host\0";
}

impl KeyProvider for FakeKeys {
    fn generate_keys(&self) -> Result<()> {
        Ok(())
    }

    fn public_key(&self) -> Result<Vec<u8>> {
        Ok(Self::PUBLIC_KEY.to_vec())
    }

    fn sign(&self, token: &[u8]) -> Result<Vec<u8>> {
        Ok(Self::expected_signature(token))
    }
}

/// Device side of the wire, driven explicitly by each test.
pub struct ScriptedPeer {
    framed: Framed<DuplexStream, PacketCodec>,
}

pub const PEER_VERSION: u32 = 0x0100_0001;
pub const PEER_MAX_PAYLOAD: u32 = 4096;
pub const PEER_BANNER: &str = "device::ro.product.name=sdk;";

impl ScriptedPeer {
    /// Build both ends of an in-memory transport.
    pub fn transport() -> (DuplexStream, ScriptedPeer) {
        let (engine_side, peer_side) = tokio::io::duplex(256 * 1024);
        (
            engine_side,
            ScriptedPeer {
                framed: Framed::new(peer_side, PacketCodec::new()),
            },
        )
    }

    pub async fn send(&mut self, packet: Packet) {
        self.framed.send(packet).await.expect("peer send");
    }

    pub async fn recv(&mut self) -> Packet {
        self.framed
            .next()
            .await
            .expect("peer transport closed")
            .expect("peer decode")
    }

    /// Receive and assert the command word in one step.
    pub async fn expect(&mut self, command: Command) -> Packet {
        let packet = self.recv().await;
        assert_eq!(packet.command, command, "unexpected {}", packet.command);
        packet
    }

    /// Wait until the engine drops its end of the transport.
    pub async fn recv_closed(&mut self) {
        loop {
            match self.framed.next().await {
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return,
            }
        }
    }

    /// Assert that nothing arrives for a little while.
    pub async fn expect_silence(&mut self) {
        let wait = tokio::time::timeout(std::time::Duration::from_millis(100), self.framed.next());
        assert!(wait.await.is_err(), "peer received an unexpected packet");
    }

    /// The device's CNXN, advertising its own parameters.
    pub fn cnxn() -> Packet {
        Packet::cnxn(PEER_VERSION, PEER_MAX_PAYLOAD, PEER_BANNER)
    }

    /// Accept the engine's CNXN without requiring authentication.
    pub async fn accept_without_auth(&mut self) {
        self.expect(Command::Cnxn).await;
        self.send(Self::cnxn()).await;
    }

    /// Challenge the engine, verify its signature, then accept.
    pub async fn accept_after_challenge(&mut self, token: [u8; 20]) {
        self.expect(Command::Cnxn).await;
        self.send(Packet::auth(AuthType::Token, Bytes::copy_from_slice(&token)))
            .await;

        let signature = self.expect(Command::Auth).await;
        assert_eq!(signature.arg0, AuthType::Signature as u32);
        assert_eq!(
            signature.payload.as_ref(),
            &FakeKeys::expected_signature(&token)[..]
        );

        self.send(Self::cnxn()).await;
    }

    /// Grant a pending OPEN, returning (remote_id, local_id).
    pub async fn grant_open(&mut self, remote_id: u32) -> (u32, u32) {
        let open = self.expect(Command::Open).await;
        let local_id = open.arg0;
        assert_ne!(local_id, 0, "local ids are non-zero");
        assert_eq!(open.payload.last(), Some(&0u8), "service is NUL-terminated");
        self.send(Packet::okay(remote_id, local_id)).await;
        (remote_id, local_id)
    }
}
