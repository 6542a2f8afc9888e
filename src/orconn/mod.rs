//! OR-connection reporting: the state bus and the control-channel
//! producer for ORCONN events.

pub mod control;
pub mod state;

pub use control::{
    DIGEST_LEN, EmptyNodeDirectory, NodeDirectory, OrConnDesc, OrConnEndReason, OrConnStatus,
    RelayDigest, or_conn_status_event, orconn_status, target_name,
};
pub use state::{OrConnState, OrConnStateMsg, StateBus, StateRcvr};

use std::sync::{Arc, Mutex};

use crate::subsys::{Subsystem, SubsysError};

/// Subsystem owning the state bus. Level -40 puts it after logging,
/// threads, networking, crypto, and TLS, and before application logic.
#[derive(Default)]
pub struct OrConnSubsys {
    bus: Mutex<Option<Arc<StateBus>>>,
}

impl OrConnSubsys {
    pub fn new() -> OrConnSubsys {
        OrConnSubsys::default()
    }

    /// The live bus, if the subsystem is initialized.
    pub fn bus(&self) -> Option<Arc<StateBus>> {
        self.bus.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Subsystem for OrConnSubsys {
    fn name(&self) -> &'static str {
        "orconn"
    }

    fn level(&self) -> i8 {
        -40
    }

    fn initialize(&self) -> Result<(), SubsysError> {
        *self.bus.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(StateBus::new()));
        Ok(())
    }

    fn shutdown(&self) {
        self.bus.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_creates_the_bus_and_shutdown_releases_it() {
        let subsys = OrConnSubsys::new();
        assert_eq!(subsys.name(), "orconn");
        assert_eq!(subsys.level(), -40);
        assert!(subsys.bus().is_none());

        subsys.initialize().unwrap();
        let bus = subsys.bus().expect("bus after initialize");
        assert_eq!(bus.receiver_count(), 0);

        subsys.shutdown();
        assert!(subsys.bus().is_none());
    }
}
