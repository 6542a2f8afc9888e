//! Thread-safe queued event dispatch.
//!
//! Producers enqueue formatted payloads from any thread and return at
//! once; delivery happens later on the mainloop thread. The queue
//! exists to break the call graph between the code that generates
//! events and the network layer that owns the clients receiving them;
//! without it nearly every interesting part of the router would call
//! every other interesting part.

use std::cell::Cell;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crossbeam::channel::{Receiver, Sender, bounded};

use super::conn::ConnRegistry;
use super::event::EventCode;
use super::registry::GlobalMask;
use crate::telemetry::LogBridge;

thread_local! {
    // Nonzero while this thread is inside enqueue or flush. Publishes
    // made in that window are dropped to stop feedback loops, e.g. a
    // log event whose delivery logs.
    static BLOCK_EVENT_QUEUE: Cell<u32> = const { Cell::new(0) };
}

/// Single-shot activation handle for the mainloop flush callback.
/// Activation is idempotent: at most one flush may be pending.
pub trait FlushScheduler: Send + Sync {
    fn activate(&self);
}

/// [`FlushScheduler`] over a wake channel. A bounded(1) `try_send`
/// satisfies `activate`; a pending wake absorbs further activations.
pub struct WakeChannel {
    tx: Sender<()>,
}

impl WakeChannel {
    pub fn new() -> (WakeChannel, Receiver<()>) {
        let (tx, rx) = bounded(1);
        (WakeChannel { tx }, rx)
    }
}

impl FlushScheduler for WakeChannel {
    fn activate(&self) {
        let _ = self.tx.try_send(());
    }
}

struct QueuedEvent {
    code: EventCode,
    payload: String,
}

struct QueueState {
    events: Vec<QueuedEvent>,
    flush_scheduled: bool,
    // Dropped at teardown; `None` marks the queue as closed.
    scheduler: Option<Arc<dyn FlushScheduler>>,
}

/// The queued event dispatcher. Clones share one queue.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<DispatchInner>,
}

struct DispatchInner {
    mask: Arc<GlobalMask>,
    conns: Arc<ConnRegistry>,
    log: Arc<dyn LogBridge>,
    queue: Mutex<QueueState>,
    main_thread: ThreadId,
}

impl EventDispatcher {
    /// Construct on the mainloop thread: only publishes from that
    /// thread schedule the flush.
    pub fn new(
        mask: Arc<GlobalMask>,
        conns: Arc<ConnRegistry>,
        log: Arc<dyn LogBridge>,
        scheduler: Arc<dyn FlushScheduler>,
    ) -> EventDispatcher {
        EventDispatcher {
            inner: Arc::new(DispatchInner {
                mask,
                conns,
                log,
                queue: Mutex::new(QueueState {
                    events: Vec::new(),
                    flush_scheduled: false,
                    scheduler: Some(scheduler),
                }),
                main_thread: thread::current().id(),
            }),
        }
    }

    pub fn is_interesting(&self, ev: EventCode) -> bool {
        self.inner.mask.contains(ev)
    }

    pub fn queued_len(&self) -> usize {
        self.lock_queue().events.len()
    }

    /// Queue a formatted event for delivery to every interested client.
    ///
    /// Ownership of `payload` moves in; it is dropped on the
    /// uninterested, reentrant, and post-teardown paths.
    pub fn publish(&self, code: EventCode, payload: String) {
        // Last-ditch interest check; producers normally short-circuit
        // before formatting.
        if !self.inner.mask.contains(code) {
            return;
        }
        if BLOCK_EVENT_QUEUE.with(|b| b.get()) > 0 {
            return;
        }

        // No queueing an event while queueing an event.
        BLOCK_EVENT_QUEUE.with(|b| b.set(b.get() + 1));

        let mut activate = None;
        {
            let mut queue = self.lock_queue();
            if queue.scheduler.is_some() {
                queue.events.push(QueuedEvent { code, payload });
                if !queue.flush_scheduled && self.on_main_thread() {
                    queue.flush_scheduled = true;
                    activate = queue.scheduler.clone();
                }
            }
        }

        BLOCK_EVENT_QUEUE.with(|b| b.set(b.get() - 1));

        // Off-main producers enqueue without scheduling; an already
        // pending flush or a later main-thread publish drains them.
        if let Some(scheduler) = activate {
            scheduler.activate();
        }
    }

    /// Called by the log bridge when it buffers a record, so a flush is
    /// coming even if nothing else gets published.
    pub(crate) fn note_log_pending(&self) {
        if !self.on_main_thread() {
            return;
        }
        let scheduler = self.lock_queue().scheduler.clone();
        if let Some(scheduler) = scheduler {
            scheduler.activate();
        }
    }

    /// Mainloop callback: deliver every queued event, in enqueue order,
    /// to every open client whose mask covers it. With `force`, also
    /// ask each of those clients for an immediate outbound flush.
    pub fn flush(&self, force: bool) {
        // Pull pending log records in first so they join this batch.
        self.inner.log.flush_pending();

        BLOCK_EVENT_QUEUE.with(|b| b.set(b.get() + 1));

        let drained = {
            let mut queue = self.lock_queue();
            queue.flush_scheduled = false;
            mem::take(&mut queue.events)
        };

        let sinks = self.inner.conns.open_conns();
        for event in &drained {
            for conn in &sinks {
                if conn.event_mask().contains(event.code) {
                    conn.append(event.payload.as_bytes());
                }
            }
        }
        drop(drained);

        if force {
            for conn in &sinks {
                conn.request_flush();
            }
        }

        BLOCK_EVENT_QUEUE.with(|b| b.set(b.get() - 1));
    }

    /// Teardown: drop everything queued, release the mainloop handle,
    /// and zero the global mask. Idempotent; later publishes are
    /// discarded.
    pub fn free_all(&self) {
        let (events, scheduler) = {
            let mut queue = self.lock_queue();
            queue.flush_scheduled = false;
            (mem::take(&mut queue.events), queue.scheduler.take())
        };
        drop(events);
        drop(scheduler);
        self.inner.mask.clear();
    }

    fn on_main_thread(&self) -> bool {
        thread::current().id() == self.inner.main_thread
    }

    fn lock_queue(&self) -> MutexGuard<'_, QueueState> {
        self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn flush_scheduled(&self) -> bool {
        self.lock_queue().flush_scheduled
    }
}

#[cfg(test)]
pub(crate) fn with_blocked_queue<R>(f: impl FnOnce() -> R) -> R {
    BLOCK_EVENT_QUEUE.with(|b| b.set(b.get() + 1));
    let out = f();
    BLOCK_EVENT_QUEUE.with(|b| b.set(b.get() - 1));
    out
}
