//! Caller handle for one logical stream.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::core::packet::Packet;
use crate::error::{AdbError, Result};
use crate::mux::StreamData;
use crate::session::SessionShared;
use std::sync::Arc;

/// One open logical stream on a session.
///
/// The handle owns the inbound queue receiver and is the sole writer for its
/// stream, so the protocol's single-outstanding-write discipline falls out
/// of `&mut self`: [`AdbStream::write`] does not return until the peer's
/// OKAY arrives. Multiplexer bookkeeping stays inside the session; dropping
/// the handle closes the stream.
pub struct AdbStream {
    local_id: u32,
    remote_id: u32,
    service: String,
    shared: Arc<SessionShared>,
    data_rx: mpsc::UnboundedReceiver<StreamData>,
    eof: bool,
    closed: bool,
}

impl std::fmt::Debug for AdbStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdbStream")
            .field("local_id", &self.local_id)
            .field("remote_id", &self.remote_id)
            .field("service", &self.service)
            .field("eof", &self.eof)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl AdbStream {
    pub(crate) fn new(
        local_id: u32,
        remote_id: u32,
        service: String,
        shared: Arc<SessionShared>,
        data_rx: mpsc::UnboundedReceiver<StreamData>,
    ) -> Self {
        Self {
            local_id,
            remote_id,
            service,
            shared,
            data_rx,
            eof: false,
            closed: false,
        }
    }

    /// Id this engine allocated for the stream.
    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    /// Id the peer assigned in its OKAY.
    pub fn remote_id(&self) -> u32 {
        self.remote_id
    }

    /// Service string this stream was opened with.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Receive the next payload chunk.
    ///
    /// Blocks until data is queued, the stream ends, or the session fails.
    /// `Ok(None)` is clean end-of-stream (peer CLSE, local close, or session
    /// shutdown); a dead session surfaces as an error instead.
    pub async fn read(&mut self) -> Result<Option<Bytes>> {
        if self.eof || self.closed {
            return Ok(None);
        }
        match self.data_rx.recv().await {
            Some(StreamData::Chunk(payload)) => Ok(Some(payload)),
            Some(StreamData::Eof) => {
                self.eof = true;
                Ok(None)
            }
            // channel dropped without an EOF marker: the session died
            None => {
                self.eof = true;
                Err(self.shared.session_error())
            }
        }
    }

    /// Send payload on the stream.
    ///
    /// Buffers larger than the negotiated max_payload are split into chunks;
    /// each chunk is one WRTE, and the next is not sent until the peer's
    /// OKAY for the previous one arrives. Returns once every chunk is
    /// acknowledged.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(AdbError::StreamClosed);
        }

        let max_payload = self.shared.max_payload();
        for chunk in data.chunks(max_payload.max(1)) {
            let ack_rx = self
                .shared
                .lock_streams()
                .register_ack(self.local_id)
                .ok_or(AdbError::StreamClosed)?;

            self.shared
                .send_packet(Packet::wrte(
                    self.local_id,
                    self.remote_id,
                    Bytes::copy_from_slice(chunk),
                ))
                .await?;
            trace!(
                local_id = self.local_id,
                len = chunk.len(),
                "WRTE sent, awaiting OKAY"
            );

            if ack_rx.await.is_err() {
                // slot dropped: peer CLSE or session teardown
                return Err(if self.shared.is_failed() {
                    self.shared.session_error()
                } else {
                    AdbError::StreamClosed
                });
            }
        }
        Ok(())
    }

    /// Close the stream. Idempotent; the peer is notified with CLSE if the
    /// stream was still tracked.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let pair = self.shared.lock_streams().remove(self.local_id);
        if let Some((local_id, remote_id)) = pair {
            debug!(local_id, service = %self.service, "closing stream");
            // best-effort: the peer may already be gone
            let _ = self
                .shared
                .send_packet(Packet::clse(local_id, remote_id))
                .await;
        }
        Ok(())
    }
}

impl Drop for AdbStream {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Some((local_id, remote_id)) = self.shared.lock_streams().remove(self.local_id) {
            let shared = Arc::clone(&self.shared);
            // notify the peer when a runtime is still around to do it
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = shared.send_packet(Packet::clse(local_id, remote_id)).await;
                });
            }
        }
    }
}
