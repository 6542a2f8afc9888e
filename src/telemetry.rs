//! Tracing setup and the controller log bridge.
//!
//! Log records inside the installed severity window are buffered here
//! and republished as DEBUG/INFO/NOTICE/WARN/ERR control events when
//! the dispatcher drains the buffer at the head of a flush.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::{Directive, EnvFilter, LevelFilter};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;
use crate::control::dispatch::EventDispatcher;
use crate::control::event::EventCode;
use crate::control::fmt::write_escaped;

/// Control-protocol log severity, least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Severity {
    Debug = 0,
    Info = 1,
    Notice = 2,
    Warn = 3,
    Err = 4,
}

impl Severity {
    pub const ALL: &'static [Severity] = &[
        Severity::Debug,
        Severity::Info,
        Severity::Notice,
        Severity::Warn,
        Severity::Err,
    ];

    /// Tracing has no NOTICE level; INFO takes its place as the default
    /// "normal" severity, and DEBUG/TRACE shift down one step.
    pub fn from_tracing(level: &Level) -> Severity {
        if *level == Level::ERROR {
            Severity::Err
        } else if *level == Level::WARN {
            Severity::Warn
        } else if *level == Level::INFO {
            Severity::Notice
        } else if *level == Level::DEBUG {
            Severity::Info
        } else {
            Severity::Debug
        }
    }

    pub const fn event_code(self) -> EventCode {
        match self {
            Severity::Debug => EventCode::DebugMsg,
            Severity::Info => EventCode::InfoMsg,
            Severity::Notice => EventCode::NoticeMsg,
            Severity::Warn => EventCode::WarnMsg,
            Severity::Err => EventCode::ErrMsg,
        }
    }

    pub const fn wire_name(self) -> &'static str {
        self.event_code().name()
    }

    fn from_u8(raw: u8) -> Severity {
        match raw {
            0 => Severity::Debug,
            1 => Severity::Info,
            2 => Severity::Notice,
            3 => Severity::Warn,
            _ => Severity::Err,
        }
    }
}

/// Seam between the event core and the log subsystem: the interest
/// registry installs the severity window, the dispatcher drains
/// buffered records at the head of each flush.
pub trait LogBridge: Send + Sync {
    fn set_severity_window(&self, min: Severity, max: Severity);
    fn flush_pending(&self);
    /// Called once at event-core initialization.
    fn attach_dispatcher(&self, _dispatcher: EventDispatcher) {}
}

/// Bridge for embeddings that do not forward logs to controllers.
pub struct NullLogBridge;

impl LogBridge for NullLogBridge {
    fn set_severity_window(&self, _min: Severity, _max: Severity) {}
    fn flush_pending(&self) {}
}

/// A cloneable tracing layer implementing [`LogBridge`]. One clone goes
/// into the subscriber stack; another is handed to the event core.
#[derive(Clone)]
pub struct ControlLogLayer {
    inner: Arc<LogLayerInner>,
}

struct LogLayerInner {
    min: AtomicU8,
    max: AtomicU8,
    max_pending: usize,
    dropped: AtomicUsize,
    pending: Mutex<VecDeque<(Severity, String)>>,
    dispatcher: OnceLock<EventDispatcher>,
}

impl ControlLogLayer {
    /// The window starts at [Err, Err], the disabled position.
    pub fn new(max_pending: usize) -> ControlLogLayer {
        ControlLogLayer {
            inner: Arc::new(LogLayerInner {
                min: AtomicU8::new(Severity::Err as u8),
                max: AtomicU8::new(Severity::Err as u8),
                max_pending: max_pending.max(1),
                dropped: AtomicUsize::new(0),
                pending: Mutex::new(VecDeque::new()),
                dispatcher: OnceLock::new(),
            }),
        }
    }

    /// Records dropped because the pending buffer was full.
    pub fn dropped(&self) -> usize {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }

    fn window(&self) -> (Severity, Severity) {
        (
            Severity::from_u8(self.inner.min.load(Ordering::Relaxed)),
            Severity::from_u8(self.inner.max.load(Ordering::Relaxed)),
        )
    }

    fn push(&self, severity: Severity, message: String) {
        {
            let mut pending = self.lock_pending();
            if pending.len() == self.inner.max_pending {
                pending.pop_front();
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            }
            pending.push_back((severity, message));
        }
        if let Some(dispatcher) = self.inner.dispatcher.get() {
            dispatcher.note_log_pending();
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, VecDeque<(Severity, String)>> {
        self.inner.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LogBridge for ControlLogLayer {
    fn set_severity_window(&self, min: Severity, max: Severity) {
        self.inner.min.store(min as u8, Ordering::Relaxed);
        self.inner.max.store(max as u8, Ordering::Relaxed);
    }

    fn flush_pending(&self) {
        let Some(dispatcher) = self.inner.dispatcher.get() else {
            return;
        };
        let drained: Vec<(Severity, String)> = self.lock_pending().drain(..).collect();
        for (severity, message) in drained {
            dispatcher.publish(severity.event_code(), format_log_event(severity, &message));
        }
    }

    fn attach_dispatcher(&self, dispatcher: EventDispatcher) {
        let _ = self.inner.dispatcher.set(dispatcher);
    }
}

impl<S: Subscriber> Layer<S> for ControlLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let severity = Severity::from_tracing(event.metadata().level());
        let (min, max) = self.window();
        if severity < min || severity > max {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        if let Some(message) = visitor.message {
            self.push(severity, message);
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        }
    }
}

/// `650 SEV line\r\n`, or a `650+SEV` data block for multi-line text.
fn format_log_event(severity: Severity, message: &str) -> String {
    if message.contains('\n') {
        let escaped = write_escaped(message.as_bytes());
        format!(
            "650+{}\r\n{}",
            severity.wire_name(),
            String::from_utf8_lossy(&escaped)
        )
    } else {
        format!("650 {} {}\r\n", severity.wire_name(), message)
    }
}

/// Install the global subscriber: a filtered stderr layer plus the
/// controller bridge. Returns the bridge handle for the event core.
pub fn init(config: &Config) -> ControlLogLayer {
    let layer = ControlLogLayer::new(config.limits.max_pending_log_events);
    let default_directive = config
        .logging
        .default_filter
        .parse::<Directive>()
        .unwrap_or_else(|_| LevelFilter::INFO.into());
    let filter = EnvFilter::builder()
        .with_default_directive(default_directive)
        .with_env_var("LOG")
        .from_env_lossy();
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(config.logging.with_target)
        .with_writer(std::io::stderr)
        .with_filter(filter);
    // A second init (tests, embedding) keeps the existing subscriber.
    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(layer.clone())
        .try_init();
    layer
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::control::conn::{ConnRegistry, ConnState, ControlConn};
    use crate::control::dispatch::{EventDispatcher, FlushScheduler};
    use crate::control::event::{EventCode, EventMask};
    use crate::control::registry::GlobalMask;

    struct NoopScheduler;
    impl FlushScheduler for NoopScheduler {
        fn activate(&self) {}
    }

    fn dispatcher_for(mask: EventMask, layer: &ControlLogLayer) -> (EventDispatcher, Arc<ControlConn>) {
        let global = Arc::new(GlobalMask::default());
        global.store(mask);
        let conns = Arc::new(ConnRegistry::new());
        let conn = Arc::new(ControlConn::new(1));
        conn.set_state(ConnState::Open);
        conn.set_event_mask(mask);
        conns.register(Arc::clone(&conn));
        let dispatcher = EventDispatcher::new(
            global,
            conns,
            Arc::new(layer.clone()),
            Arc::new(NoopScheduler),
        );
        layer.attach_dispatcher(dispatcher.clone());
        (dispatcher, conn)
    }

    #[test]
    fn severity_ordering_matches_the_ladder() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Info < Severity::Notice);
        assert!(Severity::Notice < Severity::Warn);
        assert!(Severity::Warn < Severity::Err);
    }

    #[test]
    fn tracing_levels_map_onto_the_ladder() {
        assert_eq!(Severity::from_tracing(&Level::ERROR), Severity::Err);
        assert_eq!(Severity::from_tracing(&Level::WARN), Severity::Warn);
        assert_eq!(Severity::from_tracing(&Level::INFO), Severity::Notice);
        assert_eq!(Severity::from_tracing(&Level::DEBUG), Severity::Info);
        assert_eq!(Severity::from_tracing(&Level::TRACE), Severity::Debug);
    }

    #[test]
    fn single_line_messages_are_plain_events() {
        assert_eq!(
            format_log_event(Severity::Warn, "something odd"),
            "650 WARN something odd\r\n"
        );
    }

    #[test]
    fn multi_line_messages_become_data_blocks() {
        let event = format_log_event(Severity::Err, "first\nsecond");
        assert_eq!(event, "650+ERR\r\nfirst\r\nsecond\r\n.\r\n");
    }

    #[test]
    fn layer_captures_only_inside_the_window() {
        let layer = ControlLogLayer::new(16);
        layer.set_severity_window(Severity::Warn, Severity::Err);
        let subscriber = tracing_subscriber::registry().with(layer.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::info!("not captured");
        assert_eq!(layer.pending_len(), 0);
        tracing::warn!("captured");
        assert_eq!(layer.pending_len(), 1);
    }

    #[test]
    fn flush_pending_publishes_buffered_records() {
        let layer = ControlLogLayer::new(16);
        layer.set_severity_window(Severity::Warn, Severity::Err);
        let (dispatcher, conn) =
            dispatcher_for(EventMask::of(EventCode::WarnMsg), &layer);

        {
            let subscriber = tracing_subscriber::registry().with(layer.clone());
            let _guard = tracing::subscriber::set_default(subscriber);
            tracing::warn!("watch out");
        }
        layer.flush_pending();
        assert_eq!(layer.pending_len(), 0);

        dispatcher.flush(false);
        assert_eq!(&conn.take_outbuf()[..], b"650 WARN watch out\r\n");
    }

    #[test]
    fn pending_buffer_drops_oldest_beyond_cap() {
        let layer = ControlLogLayer::new(2);
        layer.set_severity_window(Severity::Debug, Severity::Err);
        layer.push(Severity::Warn, "one".to_string());
        layer.push(Severity::Warn, "two".to_string());
        layer.push(Severity::Warn, "three".to_string());
        assert_eq!(layer.pending_len(), 2);
        assert_eq!(layer.dropped(), 1);
        let drained: Vec<String> = layer
            .lock_pending()
            .drain(..)
            .map(|(_, message)| message)
            .collect();
        assert_eq!(drained, ["two", "three"]);
    }
}
