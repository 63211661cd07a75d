//! Handshake behavior against a scripted peer.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::time::Duration;

use bytes::Bytes;

use adb_protocol::core::packet::{AuthType, Command, Packet};
use adb_protocol::{AdbError, Session, SessionConfig};
use common::{FakeKeys, ScriptedPeer, PEER_BANNER, PEER_MAX_PAYLOAD, PEER_VERSION};

fn quick_config() -> SessionConfig {
    SessionConfig::default_with_overrides(|c| c.connect_timeout = Duration::from_millis(500))
}

#[tokio::test]
async fn connect_without_auth_records_peer_parameters() {
    let (transport, mut peer) = ScriptedPeer::transport();

    let peer_task = tokio::spawn(async move {
        let cnxn = peer.expect(Command::Cnxn).await;
        assert_eq!(cnxn.arg0, 0x0100_0000);
        assert_eq!(cnxn.payload.as_ref(), b"host::\0");
        peer.send(ScriptedPeer::cnxn()).await;
        peer
    });

    let session = Session::connect(transport, &FakeKeys, quick_config())
        .await
        .unwrap();

    let info = session.info();
    assert_eq!(info.version, PEER_VERSION);
    assert_eq!(info.max_payload, PEER_MAX_PAYLOAD as usize);
    assert_eq!(info.banner, PEER_BANNER);
    assert!(session.is_alive());

    peer_task.await.unwrap();
}

#[tokio::test]
async fn connect_signs_challenge_and_reaches_connected() {
    let (transport, mut peer) = ScriptedPeer::transport();

    let peer_task = tokio::spawn(async move {
        peer.accept_after_challenge([0x5a; 20]).await;
    });

    let session = Session::connect(transport, &FakeKeys, quick_config())
        .await
        .unwrap();
    assert_eq!(session.info().banner, PEER_BANNER);

    peer_task.await.unwrap();
}

#[tokio::test]
async fn rejected_signature_sends_public_key_exactly_once() {
    let (transport, mut peer) = ScriptedPeer::transport();

    let peer_task = tokio::spawn(async move {
        peer.expect(Command::Cnxn).await;
        peer.send(Packet::auth(AuthType::Token, Bytes::from_static(&[1u8; 20])))
            .await;
        peer.expect(Command::Auth).await; // signature

        // reject it with a fresh challenge
        peer.send(Packet::auth(AuthType::Token, Bytes::from_static(&[2u8; 20])))
            .await;
        let fallback = peer.expect(Command::Auth).await;
        assert_eq!(fallback.arg0, AuthType::RsaPublicKey as u32);
        assert_eq!(fallback.payload.as_ref(), FakeKeys::PUBLIC_KEY);

        // no signature is ever re-sent while we stay silent
        peer.expect_silence().await;

        // user approved the key on the device
        peer.send(ScriptedPeer::cnxn()).await;
        peer
    });

    let session = Session::connect(transport, &FakeKeys, quick_config())
        .await
        .unwrap();
    assert!(session.is_alive());

    peer_task.await.unwrap();
}

#[tokio::test]
async fn unanswered_public_key_fails_authentication() {
    let (transport, mut peer) = ScriptedPeer::transport();

    let peer_task = tokio::spawn(async move {
        peer.expect(Command::Cnxn).await;
        peer.send(Packet::auth(AuthType::Token, Bytes::from_static(&[1u8; 20])))
            .await;
        peer.expect(Command::Auth).await;
        peer.send(Packet::auth(AuthType::Token, Bytes::from_static(&[2u8; 20])))
            .await;
        peer.expect(Command::Auth).await; // public key, then silence
        peer
    });

    let err = Session::connect(transport, &FakeKeys, quick_config())
        .await
        .unwrap_err();
    assert!(matches!(err, AdbError::AuthenticationFailed(_)));

    // the engine dropped the transport on failure
    let mut peer = peer_task.await.unwrap();
    assert!(
        tokio::time::timeout(Duration::from_secs(1), peer.recv_closed())
            .await
            .is_ok(),
        "transport should be closed after authentication failure"
    );
}

#[tokio::test]
async fn third_challenge_fails_without_resending_signature() {
    let (transport, mut peer) = ScriptedPeer::transport();

    let peer_task = tokio::spawn(async move {
        peer.expect(Command::Cnxn).await;
        for round in 1u8..=3 {
            peer.send(Packet::auth(
                AuthType::Token,
                Bytes::from(vec![round; 20]),
            ))
            .await;
            if round < 3 {
                peer.expect(Command::Auth).await;
            }
        }
    });

    let err = Session::connect(transport, &FakeKeys, quick_config())
        .await
        .unwrap_err();
    assert!(matches!(err, AdbError::AuthenticationFailed(_)));

    peer_task.await.unwrap();
}

#[tokio::test]
async fn stream_command_during_handshake_is_protocol_violation() {
    let (transport, mut peer) = ScriptedPeer::transport();

    let peer_task = tokio::spawn(async move {
        peer.expect(Command::Cnxn).await;
        peer.send(Packet::okay(1, 1)).await;
    });

    let err = Session::connect(transport, &FakeKeys, quick_config())
        .await
        .unwrap_err();
    assert!(matches!(err, AdbError::ProtocolViolation(_)));

    peer_task.await.unwrap();
}

#[tokio::test]
async fn peer_closing_during_handshake_is_transport_closed() {
    let (transport, peer) = ScriptedPeer::transport();
    drop(peer);

    let err = Session::connect(transport, &FakeKeys, quick_config())
        .await
        .unwrap_err();
    assert!(matches!(err, AdbError::TransportClosed));
}
