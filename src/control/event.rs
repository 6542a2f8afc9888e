//! Event codes, masks, and the SETEVENTS name table.

use thiserror::Error;
use tracing::warn;

use crate::telemetry::Severity;

/// One kind of asynchronous control event.
///
/// Discriminants are wire-stable: they double as bit positions in an
/// [`EventMask`], and the name mapping below backs both SETEVENTS and
/// GETINFO events/names. Gaps in the numbering belong to retired
/// events and stay unused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventCode {
    CircuitStatus = 0x01,
    StreamStatus = 0x02,
    OrConnStatus = 0x03,
    BandwidthUsed = 0x04,
    CircuitStatusMinor = 0x05,
    NewDesc = 0x06,
    DebugMsg = 0x07,
    InfoMsg = 0x08,
    NoticeMsg = 0x09,
    WarnMsg = 0x0a,
    ErrMsg = 0x0b,
    AddrMap = 0x0c,
    // 0x0d belonged to AUTHDIR_NEWDESCS and is retired.
    DescChanged = 0x0e,
    NetworkStatus = 0x0f,
    StatusClient = 0x10,
    StatusServer = 0x11,
    StatusGeneral = 0x12,
    Guard = 0x13,
    StreamBandwidthUsed = 0x14,
    ClientsSeen = 0x15,
    NewConsensus = 0x16,
    BuildtimeoutSet = 0x17,
    GotSignal = 0x18,
    ConfChanged = 0x19,
    ConnBandwidth = 0x1a,
    CellStats = 0x1b,
    // 0x1c, 0x1e, 0x1f unused.
    CircBandwidthUsed = 0x1d,
    TransportLaunched = 0x20,
    HsDesc = 0x21,
    HsDescContent = 0x22,
    NetworkLiveness = 0x23,
}

// The mask is a u64; event codes must stay below its width.
const _: () = assert!((EventCode::NetworkLiveness as u8) < 64);

impl EventCode {
    pub const MIN: u8 = EventCode::CircuitStatus as u8;
    pub const MAX: u8 = EventCode::NetworkLiveness as u8;

    /// Every defined event, in wire-code order.
    pub const ALL: &'static [EventCode] = &[
        EventCode::CircuitStatus,
        EventCode::StreamStatus,
        EventCode::OrConnStatus,
        EventCode::BandwidthUsed,
        EventCode::CircuitStatusMinor,
        EventCode::NewDesc,
        EventCode::DebugMsg,
        EventCode::InfoMsg,
        EventCode::NoticeMsg,
        EventCode::WarnMsg,
        EventCode::ErrMsg,
        EventCode::AddrMap,
        EventCode::DescChanged,
        EventCode::NetworkStatus,
        EventCode::StatusClient,
        EventCode::StatusServer,
        EventCode::StatusGeneral,
        EventCode::Guard,
        EventCode::StreamBandwidthUsed,
        EventCode::ClientsSeen,
        EventCode::NewConsensus,
        EventCode::BuildtimeoutSet,
        EventCode::GotSignal,
        EventCode::ConfChanged,
        EventCode::ConnBandwidth,
        EventCode::CellStats,
        EventCode::CircBandwidthUsed,
        EventCode::TransportLaunched,
        EventCode::HsDesc,
        EventCode::HsDescContent,
        EventCode::NetworkLiveness,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            EventCode::CircuitStatus => "CIRC",
            EventCode::StreamStatus => "STREAM",
            EventCode::OrConnStatus => "ORCONN",
            EventCode::BandwidthUsed => "BW",
            EventCode::CircuitStatusMinor => "CIRC_MINOR",
            EventCode::NewDesc => "NEWDESC",
            EventCode::DebugMsg => "DEBUG",
            EventCode::InfoMsg => "INFO",
            EventCode::NoticeMsg => "NOTICE",
            EventCode::WarnMsg => "WARN",
            EventCode::ErrMsg => "ERR",
            EventCode::AddrMap => "ADDRMAP",
            EventCode::DescChanged => "DESCCHANGED",
            EventCode::NetworkStatus => "NS",
            EventCode::StatusClient => "STATUS_CLIENT",
            EventCode::StatusServer => "STATUS_SERVER",
            EventCode::StatusGeneral => "STATUS_GENERAL",
            EventCode::Guard => "GUARD",
            EventCode::StreamBandwidthUsed => "STREAM_BW",
            EventCode::ClientsSeen => "CLIENTS_SEEN",
            EventCode::NewConsensus => "NEWCONSENSUS",
            EventCode::BuildtimeoutSet => "BUILDTIMEOUT_SET",
            EventCode::GotSignal => "SIGNAL",
            EventCode::ConfChanged => "CONF_CHANGED",
            EventCode::ConnBandwidth => "CONN_BW",
            EventCode::CellStats => "CELL_STATS",
            EventCode::CircBandwidthUsed => "CIRC_BW",
            EventCode::TransportLaunched => "TRANSPORT_LAUNCHED",
            EventCode::HsDesc => "HS_DESC",
            EventCode::HsDescContent => "HS_DESC_CONTENT",
            EventCode::NetworkLiveness => "NETWORK_LIVENESS",
        }
    }

    /// Case-insensitive lookup by wire name.
    pub fn from_name(name: &str) -> Option<EventCode> {
        EventCode::ALL
            .iter()
            .copied()
            .find(|ev| ev.name().eq_ignore_ascii_case(name))
    }

    /// The log severity carried by the five log-message events.
    pub const fn log_severity(self) -> Option<Severity> {
        match self {
            EventCode::DebugMsg => Some(Severity::Debug),
            EventCode::InfoMsg => Some(Severity::Info),
            EventCode::NoticeMsg => Some(Severity::Notice),
            EventCode::WarnMsg => Some(Severity::Warn),
            EventCode::ErrMsg => Some(Severity::Err),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A 64-bit set of event codes; bit `c` set means interest in code `c`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventMask(u64);

impl EventMask {
    pub const EMPTY: EventMask = EventMask(0);

    /// Events that fire on the once-per-second timer.
    pub const PER_SECOND: EventMask = EventMask(
        Self::bit(EventCode::BandwidthUsed)
            | Self::bit(EventCode::CellStats)
            | Self::bit(EventCode::CircBandwidthUsed)
            | Self::bit(EventCode::ConnBandwidth)
            | Self::bit(EventCode::StreamBandwidthUsed),
    );

    const fn bit(ev: EventCode) -> u64 {
        1u64 << (ev as u8)
    }

    pub const fn of(ev: EventCode) -> EventMask {
        EventMask(Self::bit(ev))
    }

    pub const fn from_bits(bits: u64) -> EventMask {
        EventMask(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, ev: EventCode) -> bool {
        self.0 & Self::bit(ev) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, ev: EventCode) {
        self.0 |= Self::bit(ev);
    }

    pub const fn intersects(self, other: EventMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for EventMask {
    type Output = EventMask;
    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: EventMask) {
        self.0 |= rhs.0;
    }
}

impl From<EventCode> for EventMask {
    fn from(ev: EventCode) -> EventMask {
        EventMask::of(ev)
    }
}

/// SETEVENTS arguments accepted and ignored for backward compatibility.
const LEGACY_EVENT_NAMES: &[&str] = &["EXTENDED", "AUTHDIR_NEWDESCS"];

#[derive(Debug, PartialEq, Eq, Error)]
#[error("unrecognized event \"{0}\"")]
pub struct UnrecognizedEvent(pub String);

/// Parse a SETEVENTS argument list into a mask. Names are matched
/// case-insensitively; legacy names are skipped with a warning; the
/// first unknown name aborts the whole parse.
pub fn parse_event_list(body: &str) -> Result<EventMask, UnrecognizedEvent> {
    let mut mask = EventMask::EMPTY;
    for name in body.split_ascii_whitespace() {
        if LEGACY_EVENT_NAMES
            .iter()
            .any(|legacy| legacy.eq_ignore_ascii_case(name))
        {
            warn!(name, "this SETEVENTS argument is no longer supported");
            continue;
        }
        match EventCode::from_name(name) {
            Some(ev) => mask.insert(ev),
            None => return Err(UnrecognizedEvent(name.to_string())),
        }
    }
    Ok(mask)
}

/// Space-separated names of every recognized event (GETINFO
/// events/names).
pub fn event_names() -> String {
    EventCode::ALL
        .iter()
        .map(|ev| ev.name())
        .collect::<Vec<_>>()
        .join(" ")
}
