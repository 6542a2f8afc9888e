//! In-process broadcast of OR-connection state changes.
//!
//! One-way and synchronous: `publish` invokes every registered
//! receiver on the publisher's thread, in registration order. The bus
//! holds no queue.

use std::sync::Mutex;

/// Progress of an OR connection toward an open channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrConnState {
    Connecting,
    ProxyHandshaking,
    TlsHandshaking,
    TlsClientRenegotiating,
    OrHandshakingV2,
    OrHandshakingV3,
    Open,
}

/// One state-change message. `gid` is the connection's global
/// identifier; `chan` the channel bound to it, zero if none yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrConnStateMsg {
    pub gid: u64,
    pub chan: u64,
    pub state: OrConnState,
}

/// Receiver callback. Plain fn pointers, so duplicate registrations
/// can be recognized by identity.
pub type StateRcvr = fn(&OrConnStateMsg);

#[derive(Default)]
pub struct StateBus {
    rcvrs: Mutex<Vec<StateRcvr>>,
}

impl StateBus {
    pub fn new() -> StateBus {
        StateBus::default()
    }

    /// Register a receiver. Duplicate registrations are ignored.
    pub fn subscribe(&self, rcvr: StateRcvr) {
        let mut rcvrs = self.lock();
        if rcvrs
            .iter()
            .any(|existing| std::ptr::fn_addr_eq(*existing, rcvr))
        {
            return;
        }
        rcvrs.push(rcvr);
    }

    pub fn publish(&self, msg: &OrConnStateMsg) {
        // Snapshot first: receivers may subscribe from inside a callback.
        let rcvrs = self.lock().clone();
        for rcvr in rcvrs {
            rcvr(msg);
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<StateRcvr>> {
        self.rcvrs.lock().unwrap_or_else(|e| e.into_inner())
    }
}
