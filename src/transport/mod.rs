//! # Transport Layer
//!
//! The engine needs only a connected, readable/writable byte channel; who
//! opened it and how it closes is the caller's concern. Any
//! `AsyncRead + AsyncWrite` value qualifies — a USB bulk endpoint wrapper,
//! a TCP socket, or an in-memory duplex in tests.

pub mod tcp;

use tokio::io::{AsyncRead, AsyncWrite};

/// Duplex byte channel a session can run over.
///
/// Blanket-implemented for every `AsyncRead + AsyncWrite + Send + Unpin`
/// type; implementors never need to name this trait.
pub trait AdbTransport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AdbTransport for T {}

/// Type-erased transport the session owns after connect.
pub(crate) type BoxedTransport = Box<dyn AdbTransport>;
