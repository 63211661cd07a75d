//! Tokio codec for framed ADB packets.
//!
//! Header validation happens as soon as the 24 header bytes arrive, before
//! waiting for the payload; a framing failure at that point means byte
//! alignment with the peer is already lost, so every codec error is fatal
//! to the session.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_PAYLOAD;
use crate::core::packet::{Command, Packet, RawHeader, HEADER_SIZE};
use crate::error::AdbError;

/// Codec for encoding/decoding ADB packets over a byte stream.
///
/// The payload cap starts at the protocol maximum and is tightened to the
/// negotiated max_payload once the handshake completes.
#[derive(Debug)]
pub struct PacketCodec {
    max_payload: usize,
    /// Validated header awaiting its payload bytes
    pending_header: Option<RawHeader>,
}

impl PacketCodec {
    /// Create a codec with the pre-negotiation payload cap.
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD)
    }

    /// Create a codec with an explicit payload cap.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload,
            pending_header: None,
        }
    }

    /// Current payload cap.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Tighten (or relax, up to the protocol maximum) the payload cap.
    pub fn set_max_payload(&mut self, max_payload: usize) {
        self.max_payload = max_payload.min(MAX_PAYLOAD);
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = AdbError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => {
                if src.len() < HEADER_SIZE {
                    return Ok(None);
                }
                let header = RawHeader::parse(&src[..HEADER_SIZE])?;
                header.validate(self.max_payload)?;
                src.advance(HEADER_SIZE);
                header
            }
        };

        let payload_len = header.payload_length as usize;
        if src.len() < payload_len {
            src.reserve(payload_len - src.len());
            self.pending_header = Some(header);
            return Ok(None);
        }

        let payload = src.split_to(payload_len).freeze();
        header.verify_payload(&payload)?;

        // validate() already established the command word is known
        let command =
            Command::from_u32(header.command).ok_or(AdbError::UnknownCommand(header.command))?;

        Ok(Some(Packet {
            command,
            arg0: header.arg0,
            arg1: header.arg1,
            payload,
        }))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = AdbError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload_len = packet.payload.len();
        if payload_len > self.max_payload {
            return Err(AdbError::PayloadTooLarge {
                size: payload_len,
                max: self.max_payload,
            });
        }

        dst.reserve(HEADER_SIZE + payload_len);
        dst.extend_from_slice(&(packet.command as u32).to_le_bytes());
        dst.extend_from_slice(&packet.arg0.to_le_bytes());
        dst.extend_from_slice(&packet.arg1.to_le_bytes());
        dst.extend_from_slice(&(payload_len as u32).to_le_bytes());
        dst.extend_from_slice(&packet.checksum().to_le_bytes());
        dst.extend_from_slice(&packet.command.magic().to_le_bytes());
        dst.extend_from_slice(&packet.payload);
        Ok(())
    }
}
