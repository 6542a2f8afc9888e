//! Event interest tracking: per-client masks, the global union mask,
//! and the side effects of interest transitions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::conn::{ConnRegistry, ControlConn};
use super::event::{EventCode, EventMask, UnrecognizedEvent, parse_event_list};
use crate::telemetry::{LogBridge, Severity};

/// Union of every open client's mask. Producers consult it from any
/// thread before doing event-formatting work; the value is advisory, so
/// relaxed loads are enough.
#[derive(Default)]
pub struct GlobalMask(AtomicU64);

impl GlobalMask {
    pub fn load(&self) -> EventMask {
        EventMask::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn contains(&self, ev: EventCode) -> bool {
        self.load().contains(ev)
    }

    pub(crate) fn store(&self, mask: EventMask) {
        self.0.store(mask.bits(), Ordering::Relaxed);
    }

    pub(crate) fn clear(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

/// Side effects run when interest in particular events switches on,
/// plus the periodic-event rescan notification. Defaults do nothing so
/// tools and tests can plug in only what they have.
pub trait InterestHooks: Send + Sync {
    /// STREAM_BW newly enabled: zero application-stream byte counters.
    fn clear_stream_bw_counters(&self) {}
    /// CIRC_BW newly enabled: zero origin-circuit bandwidth counters.
    fn clear_circ_bw_counters(&self) {}
    /// BW newly enabled: sample the cumulative totals so the next tick
    /// reports a zero-based delta.
    fn sample_bw_totals(&self) {}
    /// The "any per-second event enabled" predicate changed value.
    fn periodic_events_rescan(&self) {}
}

pub struct NullHooks;

impl InterestHooks for NullHooks {}

pub struct InterestRegistry {
    mask: Arc<GlobalMask>,
    conns: Arc<ConnRegistry>,
    log: Arc<dyn LogBridge>,
    hooks: Box<dyn InterestHooks>,
}

impl InterestRegistry {
    pub fn new(
        mask: Arc<GlobalMask>,
        conns: Arc<ConnRegistry>,
        log: Arc<dyn LogBridge>,
        hooks: Box<dyn InterestHooks>,
    ) -> InterestRegistry {
        InterestRegistry {
            mask,
            conns,
            log,
            hooks,
        }
    }

    pub fn global_mask(&self) -> EventMask {
        self.mask.load()
    }

    /// True if any open client wants events of this kind. Producers use
    /// this to skip formatting work nobody will see.
    pub fn is_interesting(&self, ev: EventCode) -> bool {
        self.mask.contains(ev)
    }

    pub fn any_per_second_enabled(&self) -> bool {
        self.mask.load().intersects(EventMask::PER_SECOND)
    }

    /// Store `mask` on `conn`, then refold the global mask.
    pub fn set_conn_mask(&self, conn: &ControlConn, mask: EventMask) {
        conn.set_event_mask(mask);
        self.recompute_global_mask();
    }

    /// Fold every open client's mask into the global mask, then handle
    /// the aftermath: retune the log callback, arm newly enabled
    /// bandwidth accounting, and wake the periodic scheduler when the
    /// per-second predicate flips.
    pub fn recompute_global_mask(&self) {
        let old = self.mask.load();
        let had_per_second = old.intersects(EventMask::PER_SECOND);

        let mut new = EventMask::EMPTY;
        for conn in self.conns.open_conns() {
            new |= conn.event_mask();
        }
        self.mask.store(new);

        self.adjust_log_severity();

        let newly = |ev: EventCode| !old.contains(ev) && new.contains(ev);
        if newly(EventCode::StreamBandwidthUsed) {
            self.hooks.clear_stream_bw_counters();
        }
        if newly(EventCode::CircBandwidthUsed) {
            self.hooks.clear_circ_bw_counters();
        }
        if newly(EventCode::BandwidthUsed) {
            self.hooks.sample_bw_totals();
        }
        if had_per_second != new.intersects(EventMask::PER_SECOND) {
            self.hooks.periodic_events_rescan();
        }
    }

    /// Install the narrowest severity window covering every subscribed
    /// log-message event. STATUS_GENERAL widens the window to at least
    /// [Notice, Err]; with nothing relevant subscribed it collapses to
    /// [Err, Err].
    fn adjust_log_severity(&self) {
        let mask = self.mask.load();
        let mut min = None;
        let mut max = None;
        for severity in Severity::ALL {
            if mask.contains(severity.event_code()) {
                if min.is_none() {
                    min = Some(*severity);
                }
                max = Some(*severity);
            }
        }
        if mask.contains(EventCode::StatusGeneral) {
            min = Some(min.map_or(Severity::Notice, |m| m.min(Severity::Notice)));
            max = Some(max.map_or(Severity::Err, |m| m.max(Severity::Err)));
        }
        match (min, max) {
            (Some(min), Some(max)) => self.log.set_severity_window(min, max),
            _ => self.log.set_severity_window(Severity::Err, Severity::Err),
        }
    }

    /// SETEVENTS entry point: parse the argument list, store the mask,
    /// and reply. An unknown name aborts with 552 and leaves the
    /// client's mask untouched.
    pub fn handle_setevents(&self, conn: &ControlConn, body: &str) {
        match parse_event_list(body) {
            Ok(mask) => {
                self.set_conn_mask(conn, mask);
                conn.send_done();
            }
            Err(UnrecognizedEvent(name)) => {
                conn.write_onereply_fmt(552, format_args!("Unrecognized event \"{name}\""));
            }
        }
    }
}
