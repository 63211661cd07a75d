//! # Stream Multiplexer
//!
//! Bookkeeping that turns one physical channel into N logical streams.
//!
//! [`StreamTable`] exclusively owns the id→stream map: local id allocation,
//! the OPEN/OKAY/CLSE lifecycle, inbound payload queues, and the
//! single-outstanding-write flow-control slot. Callers never touch the
//! table; they hold an [`AdbStream`] handle whose channels the table feeds.
//! The table performs no I/O — its methods return what the session must
//! send, which keeps every transition testable without a transport.
//!
//! Wire id convention: every stream-phase packet carries the sender's id in
//! `arg0` and the receiver's id in `arg1`, so inbound packets address our
//! streams via `arg1`.

mod stream;

pub use stream::AdbStream;

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

/// One queued item on a stream's inbound path.
#[derive(Debug)]
pub(crate) enum StreamData {
    Chunk(Bytes),
    /// Peer closed the stream; readers see end-of-stream, not an error.
    Eof,
}

/// Outcome of a pending OPEN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenReply {
    Granted { remote_id: u32 },
    Refused,
}

/// Lifecycle of a tracked stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamState {
    /// OPEN sent, waiting for OKAY or CLSE
    Opening,
    /// Peer acknowledged; remote id known
    Open,
}

pub(crate) struct StreamEntry {
    service: String,
    state: StreamState,
    remote_id: u32,
    data_tx: mpsc::UnboundedSender<StreamData>,
    open_tx: Option<oneshot::Sender<OpenReply>>,
    /// Occupied while a WRTE from this side is unacknowledged.
    ack_tx: Option<oneshot::Sender<()>>,
}

/// Channels handed to the caller side of a newly allocated stream.
pub(crate) struct Allocation {
    pub local_id: u32,
    pub open_rx: oneshot::Receiver<OpenReply>,
    pub data_rx: mpsc::UnboundedReceiver<StreamData>,
}

/// Id→stream map and allocator. Owned by the session behind a mutex that is
/// never held across an await point.
pub(crate) struct StreamTable {
    next_id: u32,
    entries: HashMap<u32, StreamEntry>,
}

impl StreamTable {
    pub fn new() -> Self {
        Self {
            // 0 is reserved: a zero arg0 on an inbound packet means "no stream"
            next_id: 1,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Allocate the next unused local id and register an Opening entry.
    ///
    /// Ids increase monotonically and wrap only after exhausting the id
    /// space; an id still present in the map is never handed out again, so
    /// the loop terminates as long as fewer than 2^32-1 streams are open.
    pub fn allocate(&mut self, service: &str) -> Allocation {
        let local_id = loop {
            let candidate = self.next_id;
            self.next_id = match self.next_id.checked_add(1) {
                Some(next) => next,
                None => 1,
            };
            if !self.entries.contains_key(&candidate) {
                break candidate;
            }
        };

        let (open_tx, open_rx) = oneshot::channel();
        let (data_tx, data_rx) = mpsc::unbounded_channel();
        self.entries.insert(
            local_id,
            StreamEntry {
                service: service.to_string(),
                state: StreamState::Opening,
                remote_id: 0,
                data_tx,
                open_tx: Some(open_tx),
                ack_tx: None,
            },
        );
        debug!(local_id, service, "stream allocated");

        Allocation {
            local_id,
            open_rx,
            data_rx,
        }
    }

    /// Inbound OKAY: either the grant for a pending OPEN or the
    /// acknowledgment of our outstanding WRTE. Unknown ids are ignored —
    /// the peer is referencing a stream this side already discarded.
    pub fn handle_okay(&mut self, remote_id: u32, local_id: u32) {
        let Some(entry) = self.entries.get_mut(&local_id) else {
            trace!(local_id, "OKAY for unknown stream, ignoring");
            return;
        };

        if let Some(open_tx) = entry.open_tx.take() {
            entry.remote_id = remote_id;
            entry.state = StreamState::Open;
            debug!(local_id, remote_id, service = %entry.service, "stream open");
            let _ = open_tx.send(OpenReply::Granted { remote_id });
        } else if let Some(ack_tx) = entry.ack_tx.take() {
            let _ = ack_tx.send(());
        } else {
            trace!(local_id, "spurious OKAY, ignoring");
        }
    }

    /// Inbound WRTE: queue the payload and report the (local, remote) pair
    /// the session must acknowledge with OKAY — the sole flow-control signal
    /// the peer waits for before its next WRTE on this stream.
    pub fn handle_wrte(&mut self, local_id: u32, payload: Bytes) -> Option<(u32, u32)> {
        let Some(entry) = self.entries.get_mut(&local_id) else {
            trace!(local_id, "WRTE for unknown stream, ignoring");
            return None;
        };
        if entry.state != StreamState::Open {
            trace!(local_id, "WRTE before OKAY, ignoring");
            return None;
        }

        let _ = entry.data_tx.send(StreamData::Chunk(payload));
        Some((local_id, entry.remote_id))
    }

    /// Inbound CLSE: a pending OPEN is refused, an open stream sees
    /// end-of-stream. Either way the id leaves the map and becomes reusable.
    pub fn handle_clse(&mut self, local_id: u32) {
        let Some(mut entry) = self.entries.remove(&local_id) else {
            trace!(local_id, "CLSE for unknown stream, ignoring");
            return;
        };
        debug!(local_id, service = %entry.service, "stream closed by peer");

        if let Some(open_tx) = entry.open_tx.take() {
            let _ = open_tx.send(OpenReply::Refused);
        } else {
            let _ = entry.data_tx.send(StreamData::Eof);
        }
        // a dropped ack sender wakes any blocked writer with StreamClosed
    }

    /// Reserve the flow-control slot for an outbound WRTE.
    ///
    /// Returns `None` if the stream is gone. The slot is freed by the
    /// matching inbound OKAY; a caller never sends a second WRTE while it is
    /// occupied.
    pub fn register_ack(&mut self, local_id: u32) -> Option<oneshot::Receiver<()>> {
        let entry = self.entries.get_mut(&local_id)?;
        debug_assert!(entry.ack_tx.is_none(), "one WRTE in flight per stream");
        let (ack_tx, ack_rx) = oneshot::channel();
        entry.ack_tx = Some(ack_tx);
        Some(ack_rx)
    }

    /// Local close: drop the entry, reporting the id pair for the CLSE
    /// packet if the stream was still known. Idempotent.
    pub fn remove(&mut self, local_id: u32) -> Option<(u32, u32)> {
        self.entries
            .remove(&local_id)
            .map(|entry| (local_id, entry.remote_id))
    }

    /// Session shutdown: every reader sees end-of-stream; returns the id
    /// pairs of streams that were fully open so CLSE can be sent for each.
    /// Pending opens are dropped, waking their callers with a
    /// session-closed signal rather than a refusal.
    pub fn close_all(&mut self) -> Vec<(u32, u32)> {
        let mut open_pairs = Vec::new();
        for (local_id, entry) in self.entries.drain() {
            if entry.open_tx.is_none() {
                let _ = entry.data_tx.send(StreamData::Eof);
                open_pairs.push((local_id, entry.remote_id));
            }
        }
        open_pairs
    }

    /// Session failure: drop every channel without an EOF marker so blocked
    /// readers, openers, and writers wake with a session-level error.
    pub fn fail_all(&mut self) {
        self.entries.clear();
    }
}
