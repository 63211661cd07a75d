#![no_main]

use libfuzzer_sys::fuzz_target;

use adb_protocol::{Packet, SessionConfig};
use adb_protocol::keys::KeyProvider;
use adb_protocol::protocol::handshake::Handshaker;

struct NullKeys;

impl KeyProvider for NullKeys {
    fn generate_keys(&self) -> adb_protocol::Result<()> {
        Ok(())
    }

    fn public_key(&self) -> adb_protocol::Result<Vec<u8>> {
        Ok(vec![0u8; 64])
    }

    fn sign(&self, token: &[u8]) -> adb_protocol::Result<Vec<u8>> {
        Ok(token.to_vec())
    }
}

fuzz_target!(|data: &[u8]| {
    // Drive the handshake machine with arbitrary decoded packets; it must
    // never panic, only transition or fail.
    let Ok(packet) = Packet::from_bytes(data) else {
        return;
    };

    let mut handshaker = Handshaker::new(&SessionConfig::default());
    let _ = handshaker.connect_packet();
    let _ = handshaker.on_packet(&packet, &NullKeys);
});
