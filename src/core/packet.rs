//! ADB packet model and wire header.
//!
//! A packet is a fixed 24-byte little-endian header followed by a payload:
//!
//! ```text
//! [command:u32] [arg0:u32] [arg1:u32] [payload_length:u32] [checksum:u32] [magic:u32]
//! ```
//!
//! `checksum` is the unsigned sum of payload bytes modulo 2^32 and `magic`
//! is the bitwise complement of `command`. Both are derived from the command
//! and payload at encode time, never taken from the caller, so a packet on
//! the wire is always internally consistent.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::MAX_PAYLOAD;
use crate::error::{AdbError, Result};

/// Size of the packet header in bytes
pub const HEADER_SIZE: usize = 24;

/// ADB command words (little-endian ASCII)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    /// Legacy synchronize word, kept for wire compatibility
    Sync = 0x434e_5953,
    /// Connect / session description
    Cnxn = 0x4e58_4e43,
    /// Authentication exchange
    Auth = 0x4854_5541,
    /// Open a logical stream
    Open = 0x4e45_504f,
    /// Ready / acknowledgment
    Okay = 0x5941_4b4f,
    /// Close a logical stream
    Clse = 0x4553_4c43,
    /// Stream payload
    Wrte = 0x4554_5257,
}

impl Command {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x434e_5953 => Some(Command::Sync),
            0x4e58_4e43 => Some(Command::Cnxn),
            0x4854_5541 => Some(Command::Auth),
            0x4e45_504f => Some(Command::Open),
            0x5941_4b4f => Some(Command::Okay),
            0x4553_4c43 => Some(Command::Clse),
            0x4554_5257 => Some(Command::Wrte),
            _ => None,
        }
    }

    /// Bitwise complement carried in the header's magic field.
    pub fn magic(self) -> u32 {
        self as u32 ^ 0xffff_ffff
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Sync => "SYNC",
            Command::Cnxn => "CNXN",
            Command::Auth => "AUTH",
            Command::Open => "OPEN",
            Command::Okay => "OKAY",
            Command::Clse => "CLSE",
            Command::Wrte => "WRTE",
        };
        f.write_str(name)
    }
}

/// AUTH packet subtypes, carried in `arg0`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AuthType {
    /// Challenge token from the peer
    Token = 1,
    /// RSA signature over the challenge
    Signature = 2,
    /// RSA public key, sent when the signature was rejected
    RsaPublicKey = 3,
}

impl AuthType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(AuthType::Token),
            2 => Some(AuthType::Signature),
            3 => Some(AuthType::RsaPublicKey),
            _ => None,
        }
    }
}

/// Unsigned sum of payload bytes modulo 2^32.
///
/// Protocol-historical, not cryptographic; preserved exactly for
/// interoperability with real peers.
pub fn payload_checksum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
}

/// A single framed protocol message.
///
/// Checksum and magic are not stored; they are recomputed on encode and
/// validated on decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub command: Command,
    pub arg0: u32,
    pub arg1: u32,
    pub payload: Bytes,
}

impl Packet {
    /// Create a new packet
    pub fn new(command: Command, arg0: u32, arg1: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            arg0,
            arg1,
            payload: payload.into(),
        }
    }

    /// CNXN carrying our declared version, payload bound, and identity.
    /// The banner is NUL-terminated on the wire.
    pub fn cnxn(version: u32, max_payload: u32, banner: &str) -> Self {
        let mut payload = BytesMut::with_capacity(banner.len() + 1);
        payload.put_slice(banner.as_bytes());
        payload.put_u8(0);
        Self::new(Command::Cnxn, version, max_payload, payload.freeze())
    }

    /// AUTH packet of the given subtype
    pub fn auth(kind: AuthType, payload: impl Into<Bytes>) -> Self {
        Self::new(Command::Auth, kind as u32, 0, payload)
    }

    /// OPEN for a named service. The service string is NUL-terminated.
    pub fn open(local_id: u32, service: &str) -> Self {
        let mut payload = BytesMut::with_capacity(service.len() + 1);
        payload.put_slice(service.as_bytes());
        payload.put_u8(0);
        Self::new(Command::Open, local_id, 0, payload.freeze())
    }

    /// OKAY acknowledgment from our stream to the peer's
    pub fn okay(local_id: u32, remote_id: u32) -> Self {
        Self::new(Command::Okay, local_id, remote_id, Bytes::new())
    }

    /// WRTE carrying stream payload
    pub fn wrte(local_id: u32, remote_id: u32, payload: impl Into<Bytes>) -> Self {
        Self::new(Command::Wrte, local_id, remote_id, payload)
    }

    /// CLSE for a stream pair
    pub fn clse(local_id: u32, remote_id: u32) -> Self {
        Self::new(Command::Clse, local_id, remote_id, Bytes::new())
    }

    /// Checksum of this packet's payload
    pub fn checksum(&self) -> u32 {
        payload_checksum(&self.payload)
    }

    /// Serialize header and payload (little-endian), recomputing checksum
    /// and magic from the command and payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&(self.command as u32).to_le_bytes());
        buf.extend_from_slice(&self.arg0.to_le_bytes());
        buf.extend_from_slice(&self.arg1.to_le_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.checksum().to_le_bytes());
        buf.extend_from_slice(&self.command.magic().to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse and validate one complete packet.
    ///
    /// Fails on a short buffer, an unknown command word, a magic that is not
    /// the command's complement, a payload length beyond [`MAX_PAYLOAD`], or
    /// a checksum mismatch. Streaming decode with a negotiated cap lives in
    /// [`crate::core::codec::PacketCodec`]; this entry point is for whole
    /// buffers (tests, fuzzing).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(AdbError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "packet header truncated",
            )));
        }

        let header = RawHeader::parse(bytes)?;
        header.validate(MAX_PAYLOAD)?;

        let payload_len = header.payload_length as usize;
        let body = &bytes[HEADER_SIZE..];
        if body.len() < payload_len {
            return Err(AdbError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "packet payload truncated",
            )));
        }

        let payload = Bytes::copy_from_slice(&body[..payload_len]);
        header.verify_payload(&payload)?;

        // command validated by RawHeader::validate
        let command = Command::from_u32(header.command)
            .ok_or(AdbError::UnknownCommand(header.command))?;

        Ok(Self {
            command,
            arg0: header.arg0,
            arg1: header.arg1,
            payload,
        })
    }
}

/// Header fields as read off the wire, before validation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawHeader {
    pub command: u32,
    pub arg0: u32,
    pub arg1: u32,
    pub payload_length: u32,
    pub checksum: u32,
    pub magic: u32,
}

impl RawHeader {
    /// Read the six header words from a buffer of at least HEADER_SIZE bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        debug_assert!(bytes.len() >= HEADER_SIZE);
        let word = |i: usize| {
            u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
        };
        Ok(Self {
            command: word(0),
            arg0: word(4),
            arg1: word(8),
            payload_length: word(12),
            checksum: word(16),
            magic: word(20),
        })
    }

    /// Validate everything checkable before the payload arrives: magic,
    /// command word, and the payload length against `max_payload`.
    pub fn validate(&self, max_payload: usize) -> Result<()> {
        if self.magic != self.command ^ 0xffff_ffff {
            return Err(AdbError::BadMagic {
                command: self.command,
                magic: self.magic,
            });
        }
        if Command::from_u32(self.command).is_none() {
            return Err(AdbError::UnknownCommand(self.command));
        }
        let size = self.payload_length as usize;
        if size > max_payload {
            return Err(AdbError::PayloadTooLarge {
                size,
                max: max_payload,
            });
        }
        Ok(())
    }

    /// Check the header checksum against the received payload.
    pub fn verify_payload(&self, payload: &[u8]) -> Result<()> {
        let actual = payload_checksum(payload);
        if actual != self.checksum {
            return Err(AdbError::BadChecksum {
                expected: self.checksum,
                actual,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ADB_VERSION;

    #[test]
    fn command_word_conversion() {
        assert_eq!(Command::from_u32(0x434e_5953), Some(Command::Sync));
        assert_eq!(Command::from_u32(0x4e58_4e43), Some(Command::Cnxn));
        assert_eq!(Command::from_u32(0x4854_5541), Some(Command::Auth));
        assert_eq!(Command::from_u32(0x4e45_504f), Some(Command::Open));
        assert_eq!(Command::from_u32(0x5941_4b4f), Some(Command::Okay));
        assert_eq!(Command::from_u32(0x4553_4c43), Some(Command::Clse));
        assert_eq!(Command::from_u32(0x4554_5257), Some(Command::Wrte));
        assert_eq!(Command::from_u32(0x1234_5678), None);
    }

    #[test]
    fn roundtrip_all_commands() {
        let cases: Vec<(Command, u32, u32, &[u8])> = vec![
            (Command::Cnxn, ADB_VERSION, 4096, b"host::" as &[u8]),
            (Command::Auth, 1, 0, b"twenty-byte-token..."),
            (Command::Open, 5, 0, b"shell:exec pm\0"),
            (Command::Okay, 5, 10, b""),
            (Command::Wrte, 5, 10, b"package:com.example\n"),
            (Command::Clse, 5, 10, b""),
        ];

        for (command, arg0, arg1, payload) in cases {
            let packet = Packet::new(command, arg0, arg1, Bytes::copy_from_slice(payload));
            let decoded = Packet::from_bytes(&packet.to_bytes()).unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn checksum_is_additive_sum() {
        let data = b"Hello, ADB!";
        let expected: u32 = data.iter().map(|&b| b as u32).sum();
        assert_eq!(payload_checksum(data), expected);
        assert_eq!(payload_checksum(b""), 0);
    }

    #[test]
    fn checksum_wraps_instead_of_overflowing() {
        let data = vec![0xff; 1000];
        assert_eq!(payload_checksum(&data), 0xff * 1000);
    }

    #[test]
    fn magic_is_command_complement() {
        assert_eq!(Command::Cnxn.magic(), 0x4e58_4e43 ^ 0xffff_ffff);
        let bytes = Packet::okay(1, 2).to_bytes();
        let magic = u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
        assert_eq!(magic, Command::Okay.magic());
    }

    #[test]
    fn rejects_tampered_magic() {
        let mut bytes = Packet::cnxn(ADB_VERSION, 4096, "host::").to_bytes();
        bytes[20..24].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(AdbError::BadMagic { .. })
        ));
    }

    #[test]
    fn rejects_tampered_payload() {
        let mut bytes = Packet::wrte(1, 2, Bytes::from_static(b"payload")).to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(AdbError::BadChecksum { .. })
        ));
    }

    #[test]
    fn rejects_unknown_command() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&0xdead_beefu32.to_le_bytes());
        // keep magic consistent so the command check is what fires
        bytes[20..24].copy_from_slice(&(0xdead_beefu32 ^ 0xffff_ffff).to_le_bytes());
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(AdbError::UnknownCommand(0xdead_beef))
        ));
    }

    #[test]
    fn rejects_oversized_length_claim() {
        let mut bytes = Packet::okay(1, 2).to_bytes();
        bytes[12..16].copy_from_slice(&(MAX_PAYLOAD as u32 + 1).to_le_bytes());
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(AdbError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(Packet::from_bytes(&[0u8; HEADER_SIZE - 1]).is_err());
        assert!(Packet::from_bytes(&[]).is_err());
    }

    #[test]
    fn open_and_cnxn_payloads_are_nul_terminated() {
        let open = Packet::open(3, "shell:exec pm");
        assert_eq!(open.payload.last(), Some(&0u8));
        assert_eq!(&open.payload[..open.payload.len() - 1], b"shell:exec pm");

        let cnxn = Packet::cnxn(ADB_VERSION, 4096, "host::");
        assert_eq!(cnxn.payload.as_ref(), b"host::\0");
    }
}
