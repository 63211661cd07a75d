//! # Core Protocol Components
//!
//! Low-level packet handling and framing.
//!
//! ## Components
//! - **Packet**: the fixed 24-byte header format with additive checksum and
//!   magic complement
//! - **Codec**: tokio codec for framing packets over byte streams
//!
//! ## Wire Format
//! ```text
//! [command:u32] [arg0:u32] [arg1:u32] [length:u32] [checksum:u32] [magic:u32] [payload(N)]
//! ```
//! All header fields are little-endian.
//!
//! ## Security
//! - Length validation against the negotiated max_payload before allocation
//! - Magic complement check prevents misaligned reinterpretation
//! - The additive checksum is protocol-historical, not cryptographic

pub mod codec;
pub mod packet;
