//! # Session Orchestrator
//!
//! Owns the one reader task and the exclusive write gate, wires the
//! handshake and the stream multiplexer together, and exposes the public
//! entry points: [`Session::connect`], [`Session::open_service`], and
//! [`Session::shutdown`].
//!
//! ## Ordering and concurrency
//! A single task decodes packets off the transport for the lifetime of the
//! session — packet arrival order is the protocol's only sequencing signal,
//! so there must be exactly one reader. Writers on arbitrary tasks
//! serialize through one async mutex around the sink half, keeping each
//! header+payload write atomic on the shared full-duplex channel. The
//! stream table uses a std mutex that is never held across an await point.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, instrument, warn};

use crate::config::SessionConfig;
use crate::core::codec::PacketCodec;
use crate::core::packet::{Command, Packet};
use crate::error::{constants, AdbError, Result};
use crate::keys::KeyProvider;
use crate::mux::{AdbStream, OpenReply, StreamTable};
use crate::protocol::handshake::{ConnectionInfo, HandshakeEvent, HandshakeState, Handshaker};
use crate::transport::{AdbTransport, BoxedTransport};

type FramedTransport = Framed<BoxedTransport, PacketCodec>;
type PacketSink = SplitSink<FramedTransport, Packet>;
type PacketStream = SplitStream<FramedTransport>;

/// Why the session stopped, for surfacing to later callers.
#[derive(Debug, Clone)]
enum Failure {
    Closed,
    Error(String),
}

/// State shared between the session handle, stream handles, and the reader
/// task.
pub(crate) struct SessionShared {
    /// Exclusive write gate: one packet write at a time on the transport.
    sink: AsyncMutex<PacketSink>,
    streams: StdMutex<StreamTable>,
    failure: StdMutex<Option<Failure>>,
    info: ConnectionInfo,
}

impl SessionShared {
    pub(crate) fn lock_streams(&self) -> MutexGuard<'_, StreamTable> {
        self.streams.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn max_payload(&self) -> usize {
        self.info.max_payload
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// The error a caller should see for an operation on a dead session.
    pub(crate) fn session_error(&self) -> AdbError {
        match self
            .failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            Some(Failure::Error(reason)) => AdbError::TransportError(reason),
            // either the peer closed the transport or the session was shut
            // down locally; both end every stream
            _ => AdbError::TransportClosed,
        }
    }

    /// Record the failure and wake everything blocked on this session.
    fn fail(&self, err: &AdbError) {
        let failure = match err {
            AdbError::TransportClosed => Failure::Closed,
            other => Failure::Error(other.to_string()),
        };
        {
            let mut slot = self.failure.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_none() {
                *slot = Some(failure);
            }
        }
        self.lock_streams().fail_all();
    }

    /// Write one packet through the exclusive gate.
    pub(crate) async fn send_packet(&self, packet: Packet) -> Result<()> {
        if self.is_failed() {
            return Err(self.session_error());
        }
        let mut sink = self.sink.lock().await;
        sink.send(packet).await
    }
}

/// An authenticated ADB session over one transport.
///
/// Created by [`Session::connect`]; destroyed by [`Session::shutdown`] or
/// drop (which aborts the reader and closes the transport without notifying
/// peers of individual streams).
pub struct Session {
    shared: Arc<SessionShared>,
    reader: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("reader", &self.reader)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Establish an authenticated session on a connected transport.
    ///
    /// Drives the CNXN/AUTH exchange to completion: at most one signature
    /// attempt, then one public-key offer. The whole exchange is bounded by
    /// [`SessionConfig::connect_timeout`]; expiry while waiting on
    /// out-of-band key approval surfaces as `AuthenticationFailed`. On any
    /// failure the transport is dropped, which closes it.
    #[instrument(skip_all, fields(banner = %config.banner))]
    pub async fn connect<T>(
        transport: T,
        keys: &dyn KeyProvider,
        config: SessionConfig,
    ) -> Result<Session>
    where
        T: AdbTransport + 'static,
    {
        config.validate_strict()?;

        let boxed: BoxedTransport = Box::new(transport);
        let mut framed = Framed::new(boxed, PacketCodec::new());
        let mut handshaker = Handshaker::new(&config);

        framed.send(handshaker.connect_packet()).await?;

        let outcome = tokio::time::timeout(
            config.connect_timeout,
            drive_handshake(&mut framed, &mut handshaker, keys),
        )
        .await;

        let info = match outcome {
            Ok(result) => result?,
            Err(_elapsed) => {
                return Err(match handshaker.state() {
                    // the peer never answered our public key: its user did
                    // not approve this host
                    HandshakeState::PublicKeySent => AdbError::AuthenticationFailed(
                        constants::ERR_SIGNATURE_REJECTED.to_string(),
                    ),
                    _ => AdbError::ConnectionTimeout,
                });
            }
        };

        // inbound packets are now bounded by what the peer may send us
        framed.codec_mut().set_max_payload(info.max_payload);

        let (sink, stream) = framed.split();
        let shared = Arc::new(SessionShared {
            sink: AsyncMutex::new(sink),
            streams: StdMutex::new(StreamTable::new()),
            failure: StdMutex::new(None),
            info,
        });
        let reader = tokio::spawn(read_loop(stream, Arc::clone(&shared)));

        Ok(Session {
            shared,
            reader: Some(reader),
        })
    }

    /// Parameters negotiated during the handshake.
    pub fn info(&self) -> &ConnectionInfo {
        &self.shared.info
    }

    /// Whether the reader loop is still serving packets.
    pub fn is_alive(&self) -> bool {
        !self.shared.is_failed()
    }

    /// Number of currently tracked streams.
    pub fn open_streams(&self) -> usize {
        self.shared.lock_streams().len()
    }

    /// Open a logical stream to a named service (e.g. `"shell:exec pm"`).
    ///
    /// Blocks until the peer answers: OKAY yields the stream handle, CLSE
    /// yields [`AdbError::StreamOpenRefused`] and frees the local id. A
    /// refusal affects neither other streams nor the session.
    #[instrument(skip(self))]
    pub async fn open_service(&self, service: &str) -> Result<AdbStream> {
        if self.shared.is_failed() {
            return Err(self.shared.session_error());
        }

        let alloc = self.shared.lock_streams().allocate(service);

        if let Err(err) = self
            .shared
            .send_packet(Packet::open(alloc.local_id, service))
            .await
        {
            self.shared.lock_streams().remove(alloc.local_id);
            return Err(err);
        }

        match alloc.open_rx.await {
            Ok(OpenReply::Granted { remote_id }) => Ok(AdbStream::new(
                alloc.local_id,
                remote_id,
                service.to_string(),
                Arc::clone(&self.shared),
                alloc.data_rx,
            )),
            Ok(OpenReply::Refused) => Err(AdbError::StreamOpenRefused {
                service: service.to_string(),
            }),
            Err(_) => Err(self.shared.session_error()),
        }
    }

    /// Close every open stream and the transport.
    ///
    /// Blocked readers wake with end-of-stream; the peer receives CLSE for
    /// each stream that was fully open.
    #[instrument(skip(self))]
    pub async fn shutdown(mut self) -> Result<()> {
        debug!("session shutting down");
        let pairs = self.shared.lock_streams().close_all();
        for (local_id, remote_id) in pairs {
            let _ = self
                .shared
                .send_packet(Packet::clse(local_id, remote_id))
                .await;
        }

        if let Some(reader) = self.reader.take() {
            reader.abort();
            let _ = reader.await;
        }
        self.shared.fail(&AdbError::TransportClosed);

        let mut sink = self.shared.sink.lock().await;
        let _ = sink.close().await;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.shared.fail(&AdbError::TransportClosed);
    }
}

/// Run the handshake until established or failed.
async fn drive_handshake(
    framed: &mut FramedTransport,
    handshaker: &mut Handshaker,
    keys: &dyn KeyProvider,
) -> Result<ConnectionInfo> {
    loop {
        let packet = match framed.next().await {
            Some(Ok(packet)) => packet,
            Some(Err(err)) => return Err(err),
            None => return Err(AdbError::TransportClosed),
        };

        match handshaker.on_packet(&packet, keys)? {
            HandshakeEvent::Send(reply) => framed.send(reply).await?,
            HandshakeEvent::Established(info) => return Ok(info),
        }
    }
}

/// The single reader: decode one packet, dispatch, repeat until the
/// transport ends or a fatal error occurs.
async fn read_loop(mut stream: PacketStream, shared: Arc<SessionShared>) {
    loop {
        match stream.next().await {
            Some(Ok(packet)) => {
                if let Err(err) = dispatch(&shared, packet).await {
                    warn!(error = %err, "session terminated by dispatch error");
                    shared.fail(&err);
                    break;
                }
            }
            Some(Err(err)) => {
                warn!(error = %err, "session terminated by transport error");
                shared.fail(&err);
                break;
            }
            None => {
                debug!("transport closed by peer");
                shared.fail(&AdbError::TransportClosed);
                break;
            }
        }
    }
}

/// Route one post-handshake packet.
async fn dispatch(shared: &Arc<SessionShared>, packet: Packet) -> Result<()> {
    match packet.command {
        Command::Okay => {
            shared.lock_streams().handle_okay(packet.arg0, packet.arg1);
            Ok(())
        }

        Command::Wrte => {
            // queue first, then acknowledge: the OKAY is the flow-control
            // signal permitting the peer's next WRTE on this stream
            let ack = shared
                .lock_streams()
                .handle_wrte(packet.arg1, packet.payload);
            if let Some((local_id, remote_id)) = ack {
                shared.send_packet(Packet::okay(local_id, remote_id)).await?;
            }
            Ok(())
        }

        Command::Clse => {
            shared.lock_streams().handle_clse(packet.arg1);
            Ok(())
        }

        Command::Open => {
            // this engine hosts no services; refuse reverse streams
            warn!(remote_id = packet.arg0, "refusing peer-initiated OPEN");
            shared.send_packet(Packet::clse(0, packet.arg0)).await
        }

        Command::Cnxn | Command::Auth | Command::Sync => Err(AdbError::ProtocolViolation(
            format!("{}: {}", constants::ERR_COMMAND_AFTER_CONNECT, packet.command),
        )),
    }
}
