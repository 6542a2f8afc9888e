//! Control-client connection handles and the connection registry.
//!
//! The event core never opens or closes a client; it observes handles
//! that the I/O layer registers here. Each handle carries the client's
//! event mask, its outbound buffer, and its close/flush flags.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use tracing::warn;

use super::event::EventMask;
use crate::config::Limits;

/// Authentication state of a control client. Only `Open` clients
/// receive events or contribute to the global mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnState {
    NeedAuth = 0,
    Open = 1,
}

impl ConnState {
    fn from_u8(raw: u8) -> ConnState {
        if raw == ConnState::Open as u8 {
            ConnState::Open
        } else {
            ConnState::NeedAuth
        }
    }
}

/// One administrative connection, as seen by the event core.
pub struct ControlConn {
    id: u64,
    state: AtomicU8,
    event_mask: AtomicU64,
    marked_for_close: AtomicBool,
    flush_requested: AtomicBool,
    outbuf: Mutex<BytesMut>,
    outbuf_warn_bytes: usize,
}

impl ControlConn {
    pub fn new(id: u64) -> ControlConn {
        ControlConn::with_limits(id, &Limits::default())
    }

    pub fn with_limits(id: u64, limits: &Limits) -> ControlConn {
        ControlConn {
            id,
            state: AtomicU8::new(ConnState::NeedAuth as u8),
            event_mask: AtomicU64::new(0),
            marked_for_close: AtomicBool::new(false),
            flush_requested: AtomicBool::new(false),
            outbuf: Mutex::new(BytesMut::new()),
            outbuf_warn_bytes: limits.outbuf_warn_bytes,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, state: ConnState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnState::Open && !self.is_marked_for_close()
    }

    pub fn event_mask(&self) -> EventMask {
        EventMask::from_bits(self.event_mask.load(Ordering::Relaxed))
    }

    pub fn set_event_mask(&self, mask: EventMask) {
        self.event_mask.store(mask.bits(), Ordering::Relaxed);
    }

    pub fn is_marked_for_close(&self) -> bool {
        self.marked_for_close.load(Ordering::Relaxed)
    }

    pub fn mark_for_close(&self) {
        self.marked_for_close.store(true, Ordering::Relaxed);
    }

    /// Ask the I/O layer to drain this client's buffer promptly.
    pub fn request_flush(&self) {
        self.flush_requested.store(true, Ordering::Relaxed);
    }

    /// Consume a pending flush request.
    pub fn take_flush_request(&self) -> bool {
        self.flush_requested.swap(false, Ordering::Relaxed)
    }

    /// Append bytes to the outbound buffer.
    pub fn append(&self, bytes: &[u8]) {
        let mut outbuf = self.outbuf.lock().unwrap_or_else(|e| e.into_inner());
        let before = outbuf.len();
        outbuf.extend_from_slice(bytes);
        if before < self.outbuf_warn_bytes && outbuf.len() >= self.outbuf_warn_bytes {
            warn!(
                conn = self.id,
                len = outbuf.len(),
                "control client outbound buffer is not draining"
            );
        }
    }

    pub fn outbuf_len(&self) -> usize {
        self.outbuf.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Hand the accumulated output to the I/O layer.
    pub fn take_outbuf(&self) -> BytesMut {
        std::mem::take(&mut *self.outbuf.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// The iterable set of control connections, maintained by the I/O
/// layer and observed by the registry and dispatcher.
#[derive(Default)]
pub struct ConnRegistry {
    conns: Mutex<Vec<Arc<ControlConn>>>,
}

impl ConnRegistry {
    pub fn new() -> ConnRegistry {
        ConnRegistry::default()
    }

    pub fn register(&self, conn: Arc<ControlConn>) {
        self.lock().push(conn);
    }

    pub fn remove(&self, id: u64) {
        self.lock().retain(|conn| conn.id() != id);
    }

    /// Snapshot of clients that are open and not marked for close.
    pub fn open_conns(&self) -> Vec<Arc<ControlConn>> {
        self.lock()
            .iter()
            .filter(|conn| conn.is_open())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<ControlConn>>> {
        self.conns.lock().unwrap_or_else(|e| e.into_inner())
    }
}
