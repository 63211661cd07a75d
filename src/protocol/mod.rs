//! # Protocol Layer
//!
//! The connect-and-authenticate handshake.
//!
//! [`handshake::Handshaker`] is a pure state machine: the session feeds it
//! inbound packets and performs the I/O its events request. Stream-phase
//! dispatch lives in [`crate::mux`].

pub mod handshake;
