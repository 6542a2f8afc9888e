//! ORCONN status events and GETINFO rendering for OR connections.

use std::fmt::Write as _;

use crate::control::dispatch::EventDispatcher;
use crate::control::event::EventCode;

/// Length of a relay identity digest.
pub const DIGEST_LEN: usize = 20;

/// A relay identity digest. All-zero means "unknown".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RelayDigest(pub [u8; DIGEST_LEN]);

impl RelayDigest {
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    pub fn to_hex_upper(&self) -> String {
        let mut out = String::with_capacity(DIGEST_LEN * 2);
        for byte in self.0 {
            let _ = write!(out, "{byte:02X}");
        }
        out
    }
}

/// What the control channel needs to know about one OR connection.
#[derive(Clone, Debug)]
pub struct OrConnDesc {
    pub identity: RelayDigest,
    pub nickname: Option<String>,
    pub address: String,
    pub port: u16,
    pub global_id: u64,
    /// Circuits pending on or attached to the connection.
    pub n_circuits: usize,
    pub open: bool,
    pub marked_for_close: bool,
}

/// Status transition reported in an ORCONN event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrConnStatus {
    New,
    Launched,
    Connected,
    Failed,
    Closed,
}

impl OrConnStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            OrConnStatus::New => "NEW",
            OrConnStatus::Launched => "LAUNCHED",
            OrConnStatus::Connected => "CONNECTED",
            OrConnStatus::Failed => "FAILED",
            OrConnStatus::Closed => "CLOSED",
        }
    }
}

/// Why an OR connection ended, in control-channel vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrConnEndReason {
    Misc,
    Done,
    ConnectRefused,
    Identity,
    ConnectReset,
    Timeout,
    NoRoute,
    IoError,
    ResourceLimit,
    PtMissing,
}

impl OrConnEndReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            OrConnEndReason::Misc => "MISC",
            OrConnEndReason::Done => "DONE",
            OrConnEndReason::ConnectRefused => "CONNECTREFUSED",
            OrConnEndReason::Identity => "IDENTITY",
            OrConnEndReason::ConnectReset => "CONNECTRESET",
            OrConnEndReason::Timeout => "TIMEOUT",
            OrConnEndReason::NoRoute => "NOROUTE",
            OrConnEndReason::IoError => "IOERROR",
            OrConnEndReason::ResourceLimit => "RESOURCELIMIT",
            OrConnEndReason::PtMissing => "PT_MISSING",
        }
    }
}

/// Node-table seam: verbose nicknames for relays we have a descriptor
/// or consensus entry for.
pub trait NodeDirectory {
    fn verbose_nickname(&self, identity: &RelayDigest) -> Option<String>;
}

/// Directory for embeddings without a node table.
pub struct EmptyNodeDirectory;

impl NodeDirectory for EmptyNodeDirectory {
    fn verbose_nickname(&self, _identity: &RelayDigest) -> Option<String> {
        None
    }
}

/// Best display name for the target of an OR connection: a known
/// node's verbose nickname, else `$` plus the hex identity, else
/// `address:port`.
pub fn target_name(nodes: &dyn NodeDirectory, conn: &OrConnDesc) -> String {
    if let Some(nickname) = nodes.verbose_nickname(&conn.identity) {
        nickname
    } else if !conn.identity.is_zero() {
        format!("${}", conn.identity.to_hex_upper())
    } else {
        format!("{}:{}", conn.address, conn.port)
    }
}

fn event_line(
    nodes: &dyn NodeDirectory,
    conn: &OrConnDesc,
    status: OrConnStatus,
    reason: Option<OrConnEndReason>,
) -> String {
    let mut extra = String::new();
    if let Some(reason) = reason {
        let _ = write!(extra, " REASON={}", reason.as_str());
    }
    // Circuit counts are only interesting at teardown.
    if conn.n_circuits > 0 && matches!(status, OrConnStatus::Failed | OrConnStatus::Closed) {
        let _ = write!(extra, " NCIRCS={}", conn.n_circuits);
    }
    format!(
        "650 ORCONN {} {}{} ID={}\r\n",
        target_name(nodes, conn),
        status.as_str(),
        extra,
        conn.global_id,
    )
}

/// Tell interested controllers that the status of an OR connection
/// changed. Best-effort; does nothing when nobody subscribed.
pub fn or_conn_status_event(
    dispatcher: &EventDispatcher,
    nodes: &dyn NodeDirectory,
    conn: &OrConnDesc,
    status: OrConnStatus,
    reason: Option<OrConnEndReason>,
) {
    if !dispatcher.is_interesting(EventCode::OrConnStatus) {
        return;
    }
    dispatcher.publish(EventCode::OrConnStatus, event_line(nodes, conn, status, reason));
}

/// GETINFO orconn-status: one `<name> <state>` line per live OR
/// connection, CRLF-separated.
pub fn orconn_status<'a>(
    nodes: &dyn NodeDirectory,
    conns: impl IntoIterator<Item = &'a OrConnDesc>,
) -> String {
    let mut lines = Vec::new();
    for conn in conns {
        if conn.marked_for_close {
            continue;
        }
        let state = if conn.open {
            "CONNECTED"
        } else if conn.nickname.is_some() {
            "LAUNCHED"
        } else {
            "NEW"
        };
        lines.push(format!("{} {}", target_name(nodes, conn), state));
    }
    lines.join("\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(global_id: u64) -> OrConnDesc {
        OrConnDesc {
            identity: RelayDigest::default(),
            nickname: None,
            address: "1.2.3.4".to_string(),
            port: 9001,
            global_id,
            n_circuits: 0,
            open: false,
            marked_for_close: false,
        }
    }

    struct OneNode {
        identity: RelayDigest,
        nickname: &'static str,
    }

    impl NodeDirectory for OneNode {
        fn verbose_nickname(&self, identity: &RelayDigest) -> Option<String> {
            if *identity == self.identity {
                Some(self.nickname.to_string())
            } else {
                None
            }
        }
    }

    #[test]
    fn failed_event_carries_reason_and_circuit_count() {
        let mut conn = desc(42);
        conn.n_circuits = 3;
        let line = event_line(
            &EmptyNodeDirectory,
            &conn,
            OrConnStatus::Failed,
            Some(OrConnEndReason::Timeout),
        );
        assert_eq!(line, "650 ORCONN 1.2.3.4:9001 FAILED REASON=TIMEOUT NCIRCS=3 ID=42\r\n");
    }

    #[test]
    fn ncircs_is_suppressed_outside_teardown() {
        let mut conn = desc(1);
        conn.n_circuits = 5;
        let line = event_line(&EmptyNodeDirectory, &conn, OrConnStatus::Connected, None);
        assert_eq!(line, "650 ORCONN 1.2.3.4:9001 CONNECTED ID=1\r\n");

        let launched = event_line(&EmptyNodeDirectory, &conn, OrConnStatus::Launched, None);
        assert!(!launched.contains("NCIRCS"));
    }

    #[test]
    fn ncircs_is_suppressed_when_zero() {
        let conn = desc(1);
        let line = event_line(
            &EmptyNodeDirectory,
            &conn,
            OrConnStatus::Closed,
            Some(OrConnEndReason::Done),
        );
        assert_eq!(line, "650 ORCONN 1.2.3.4:9001 CLOSED REASON=DONE ID=1\r\n");
    }

    #[test]
    fn name_prefers_directory_nickname() {
        let mut conn = desc(1);
        conn.identity = RelayDigest([0xab; DIGEST_LEN]);
        let nodes = OneNode {
            identity: conn.identity,
            nickname: "$ABAB...=guardian",
        };
        assert_eq!(target_name(&nodes, &conn), "$ABAB...=guardian");
    }

    #[test]
    fn name_falls_back_to_hex_identity() {
        let mut conn = desc(1);
        conn.identity = RelayDigest([0xab; DIGEST_LEN]);
        assert_eq!(
            target_name(&EmptyNodeDirectory, &conn),
            format!("${}", "AB".repeat(DIGEST_LEN))
        );
    }

    #[test]
    fn name_falls_back_to_address_port() {
        assert_eq!(target_name(&EmptyNodeDirectory, &desc(1)), "1.2.3.4:9001");
    }

    #[test]
    fn orconn_status_derives_states_and_skips_marked() {
        let mut connected = desc(1);
        connected.open = true;
        let mut launched = desc(2);
        launched.nickname = Some("peer".to_string());
        launched.address = "5.6.7.8".to_string();
        let mut fresh = desc(3);
        fresh.address = "9.9.9.9".to_string();
        let mut dead = desc(4);
        dead.marked_for_close = true;

        let status = orconn_status(&EmptyNodeDirectory, [&connected, &launched, &fresh, &dead]);
        assert_eq!(
            status,
            "1.2.3.4:9001 CONNECTED\r\n5.6.7.8:9001 LAUNCHED\r\n9.9.9.9:9001 NEW"
        );
    }

    #[test]
    fn end_reasons_use_control_vocabulary() {
        assert_eq!(OrConnEndReason::ConnectRefused.as_str(), "CONNECTREFUSED");
        assert_eq!(OrConnEndReason::PtMissing.as_str(), "PT_MISSING");
        assert_eq!(OrConnEndReason::Timeout.as_str(), "TIMEOUT");
    }
}
