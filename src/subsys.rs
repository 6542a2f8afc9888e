//! Subsystem lifecycle: ordered initialization and teardown.

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("subsystem {name} failed to initialize: {reason}")]
pub struct SubsysError {
    pub name: &'static str,
    pub reason: String,
}

/// One initializable module. Lower levels initialize earlier and shut
/// down later.
pub trait Subsystem: Send + Sync {
    fn name(&self) -> &'static str;
    fn level(&self) -> i8;
    fn initialize(&self) -> Result<(), SubsysError>;
    fn shutdown(&self);
}

/// The process's subsystems, kept in initialization order.
#[derive(Default)]
pub struct SubsystemSet {
    subsystems: Vec<Arc<dyn Subsystem>>,
}

impl SubsystemSet {
    pub fn new() -> SubsystemSet {
        SubsystemSet::default()
    }

    /// Insert sorted by level; equal levels keep registration order.
    pub fn register(&mut self, subsystem: Arc<dyn Subsystem>) {
        let at = self
            .subsystems
            .partition_point(|existing| existing.level() <= subsystem.level());
        self.subsystems.insert(at, subsystem);
    }

    pub fn initialize_all(&self) -> Result<(), SubsysError> {
        for subsystem in &self.subsystems {
            subsystem.initialize()?;
        }
        Ok(())
    }

    /// Shut down in reverse initialization order.
    pub fn shutdown_all(&self) {
        for subsystem in self.subsystems.iter().rev() {
            subsystem.shutdown();
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.subsystems.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.subsystems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subsystems.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Recorder {
        name: &'static str,
        level: i8,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Subsystem for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }
        fn level(&self) -> i8 {
            self.level
        }
        fn initialize(&self) -> Result<(), SubsysError> {
            self.log.lock().unwrap().push(format!("init {}", self.name));
            Ok(())
        }
        fn shutdown(&self) {
            self.log.lock().unwrap().push(format!("down {}", self.name));
        }
    }

    #[test]
    fn register_sorts_by_level() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut set = SubsystemSet::new();
        for (name, level) in [("app", 10i8), ("logging", -90), ("orconn", -40)] {
            set.register(Arc::new(Recorder {
                name,
                level,
                log: Arc::clone(&log),
            }));
        }
        assert_eq!(set.names(), ["logging", "orconn", "app"]);
    }

    #[test]
    fn shutdown_runs_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut set = SubsystemSet::new();
        for (name, level) in [("logging", -90i8), ("orconn", -40)] {
            set.register(Arc::new(Recorder {
                name,
                level,
                log: Arc::clone(&log),
            }));
        }
        set.initialize_all().unwrap();
        set.shutdown_all();
        assert_eq!(
            *log.lock().unwrap(),
            ["init logging", "init orconn", "down orconn", "down logging"]
        );
    }

    #[test]
    fn initialize_stops_at_first_failure() {
        struct Failing;
        impl Subsystem for Failing {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn level(&self) -> i8 {
                0
            }
            fn initialize(&self) -> Result<(), SubsysError> {
                Err(SubsysError {
                    name: "broken",
                    reason: "no bus".to_string(),
                })
            }
            fn shutdown(&self) {}
        }
        let mut set = SubsystemSet::new();
        set.register(Arc::new(Failing));
        let err = set.initialize_all().unwrap_err();
        assert_eq!(err.name, "broken");
    }
}
