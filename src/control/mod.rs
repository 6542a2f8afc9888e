//! The control channel's asynchronous event delivery core.
//!
//! Three pieces work together here:
//! - interest tracking ([`registry`]): who wants which events, folded
//!   into one global mask producers can test cheaply;
//! - queued dispatch ([`dispatch`]): producers on any thread enqueue
//!   formatted payloads, the mainloop delivers them in batches;
//! - wire encoding ([`fmt`], [`proto`]): escaped-data blocks, quoted
//!   strings, and numbered reply lines.

pub mod conn;
pub mod dispatch;
pub mod event;
pub mod fmt;
pub mod proto;
pub mod registry;

pub use conn::{ConnRegistry, ConnState, ControlConn};
pub use dispatch::{EventDispatcher, FlushScheduler, WakeChannel};
pub use event::{EventCode, EventMask, UnrecognizedEvent, event_names, parse_event_list};
pub use proto::ReplyLine;
pub use registry::{GlobalMask, InterestHooks, InterestRegistry, NullHooks};

use std::sync::Arc;

use crate::telemetry::LogBridge;

/// The event core: one interest registry and one dispatcher wired to a
/// client set, a log bridge, and a mainloop handle.
///
/// Initialize on the mainloop thread at startup and call [`shutdown`]
/// once at exit; the lifecycle is explicit so teardown and tests stay
/// deterministic.
///
/// [`shutdown`]: ControlEvents::shutdown
pub struct ControlEvents {
    conns: Arc<ConnRegistry>,
    registry: InterestRegistry,
    dispatcher: EventDispatcher,
}

impl ControlEvents {
    pub fn initialize(
        conns: Arc<ConnRegistry>,
        log: Arc<dyn LogBridge>,
        hooks: Box<dyn InterestHooks>,
        scheduler: Arc<dyn FlushScheduler>,
    ) -> ControlEvents {
        let mask = Arc::new(GlobalMask::default());
        let registry = InterestRegistry::new(
            Arc::clone(&mask),
            Arc::clone(&conns),
            Arc::clone(&log),
            hooks,
        );
        let dispatcher =
            EventDispatcher::new(mask, Arc::clone(&conns), Arc::clone(&log), scheduler);
        log.attach_dispatcher(dispatcher.clone());
        ControlEvents {
            conns,
            registry,
            dispatcher,
        }
    }

    pub fn conns(&self) -> &Arc<ConnRegistry> {
        &self.conns
    }

    pub fn registry(&self) -> &InterestRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Release queued events and the mainloop handle; zero the mask.
    pub fn shutdown(&self) {
        self.dispatcher.free_all();
    }
}
