//! Per-logical-socket connection status, reduced from events the transport
//! reports at each state transition.
//!
//! There is no inproc monitor socket to poll here — the Transport layer
//! calls [`ConnectionMonitor::report`] directly at each connect/disconnect
//! transition instead.

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Connected,
    ConnectDelayed,
    ConnectRetried,
    Disconnected,
    MonitorStopped,
    Unknown,
}

/// Raised by the Transport at each lifecycle transition; reduced into a
/// [`ConnectionStatus`] by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    Connected,
    ConnectDelayed,
    ConnectRetried,
    Disconnected,
}

impl From<ConnectionEvent> for ConnectionStatus {
    fn from(event: ConnectionEvent) -> Self {
        match event {
            ConnectionEvent::Connected => ConnectionStatus::Connected,
            ConnectionEvent::ConnectDelayed => ConnectionStatus::ConnectDelayed,
            ConnectionEvent::ConnectRetried => ConnectionStatus::ConnectRetried,
            ConnectionEvent::Disconnected => ConnectionStatus::Disconnected,
        }
    }
}

/// Observes connect/delay/retry/disconnect events per logical socket name
/// and exposes a lock-taken, copy-out read of its status.
#[derive(Debug, Default)]
pub struct ConnectionMonitor {
    statuses: RwLock<HashMap<String, ConnectionStatus>>,
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        ConnectionMonitor {
            statuses: RwLock::new(HashMap::new()),
        }
    }

    /// Register `name` as a tracked logical socket, defaulting to `Unknown`
    /// until the first event arrives.
    pub fn attach(&self, name: &str) {
        self.statuses
            .write()
            .unwrap()
            .entry(name.to_string())
            .or_insert(ConnectionStatus::Unknown);
    }

    /// Idempotent: removing an already-detached name is a no-op.
    pub fn detach(&self, name: &str) {
        self.statuses
            .write()
            .unwrap()
            .insert(name.to_string(), ConnectionStatus::MonitorStopped);
    }

    /// Record a lifecycle transition for `name`, creating the entry if
    /// `attach` was never called — spurious events are never fatal.
    pub fn report(&self, name: &str, event: ConnectionEvent) {
        self.statuses
            .write()
            .unwrap()
            .insert(name.to_string(), event.into());
    }

    pub fn status(&self, name: &str) -> ConnectionStatus {
        self.statuses
            .read()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(ConnectionStatus::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unattached_socket_is_unknown() {
        let monitor = ConnectionMonitor::new();
        assert_eq!(monitor.status("push"), ConnectionStatus::Unknown);
    }

    #[test]
    fn report_then_status_reflects_latest_event() {
        let monitor = ConnectionMonitor::new();
        monitor.attach("req");
        monitor.report("req", ConnectionEvent::Connected);
        assert_eq!(monitor.status("req"), ConnectionStatus::Connected);
        monitor.report("req", ConnectionEvent::Disconnected);
        assert_eq!(monitor.status("req"), ConnectionStatus::Disconnected);
    }

    #[test]
    fn detach_is_idempotent() {
        let monitor = ConnectionMonitor::new();
        monitor.attach("sub");
        monitor.detach("sub");
        monitor.detach("sub");
        assert_eq!(monitor.status("sub"), ConnectionStatus::MonitorStopped);
    }
}
