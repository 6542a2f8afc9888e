#![forbid(unsafe_code)]

pub mod config;
pub mod control;
pub mod error;
pub mod orconn;
pub mod subsys;
pub mod telemetry;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the event-core surface at the crate root for convenience
pub use crate::control::{
    ConnRegistry, ConnState, ControlConn, ControlEvents, EventCode, EventDispatcher, EventMask,
    FlushScheduler, GlobalMask, InterestHooks, InterestRegistry, NullHooks, ReplyLine, WakeChannel,
    event_names, parse_event_list,
};
pub use crate::orconn::{
    EmptyNodeDirectory, NodeDirectory, OrConnDesc, OrConnEndReason, OrConnState, OrConnStateMsg,
    OrConnStatus, OrConnSubsys, RelayDigest, StateBus, or_conn_status_event, orconn_status,
};
pub use crate::subsys::{SubsysError, Subsystem, SubsystemSet};
pub use crate::telemetry::{ControlLogLayer, LogBridge, NullLogBridge, Severity};
