//! Process-wide session registry
//!
//! Maps printer identities to their [`DeviceSession`]. Sessions are created on
//! first use under one mutex, so concurrent first requests for a printer get
//! the same session and the printer is never claimed twice.

use crate::usb::session::{DeviceSession, SessionSettings};
use common::Connector;
use protocol::UsbDeviceIdentity;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

type SessionMap = HashMap<UsbDeviceIdentity, Arc<DeviceSession>>;

pub struct SessionRegistry {
    sessions: Mutex<SessionMap>,
    connector: Arc<dyn Connector>,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(connector: Arc<dyn Connector>, settings: SessionSettings) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            connector,
            settings,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, SessionMap> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Existing session for `identity`, or a newly started one
    pub fn get_session(&self, identity: UsbDeviceIdentity) -> std::io::Result<Arc<DeviceSession>> {
        let mut sessions = self.sessions();
        if let Some(session) = sessions.get(&identity) {
            return Ok(session.clone());
        }

        let session = DeviceSession::start(identity, self.connector.clone(), self.settings)?;
        sessions.insert(identity, session.clone());
        Ok(session)
    }

    /// Session for `identity` if one was already created
    pub fn get(&self, identity: UsbDeviceIdentity) -> Option<Arc<DeviceSession>> {
        self.sessions().get(&identity).cloned()
    }

    pub fn contains(&self, identity: UsbDeviceIdentity) -> bool {
        self.sessions().contains_key(&identity)
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    /// Shut every session down and clear the registry
    ///
    /// Blocks for up to the shutdown timeout per session.
    pub fn shutdown_all(&self) {
        let sessions: Vec<_> = self.sessions().drain().map(|(_, s)| s).collect();
        if sessions.is_empty() {
            return;
        }

        info!("Shutting down {} print sessions", sessions.len());
        for session in sessions {
            session.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::session::WorkerState;
    use common::test_utils::{DEFAULT_TEST_TIMEOUT, MockConnector};
    use std::time::{Duration, Instant};

    const RECEIPT: UsbDeviceIdentity = UsbDeviceIdentity::new(0x0fe6, 0x811e);
    const LABEL: UsbDeviceIdentity = UsbDeviceIdentity::new(0x0a5f, 0x0187);

    fn registry(connector: &MockConnector) -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            Arc::new(connector.clone()),
            SessionSettings {
                settle_delay: Duration::from_millis(1),
                ..SessionSettings::default()
            },
        ))
    }

    #[test]
    fn test_same_identity_same_session() {
        let registry = registry(&MockConnector::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.get_session(RECEIPT).unwrap())
            })
            .collect();
        let sessions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(registry.len(), 1);
        registry.shutdown_all();
    }

    #[test]
    fn test_distinct_devices_do_not_block_each_other() {
        let connector = MockConnector::new();
        connector.set_write_delay(RECEIPT, Duration::from_millis(300));
        let registry = registry(&connector);

        let slow = registry.get_session(RECEIPT).unwrap();
        let fast = registry.get_session(LABEL).unwrap();
        assert!(!Arc::ptr_eq(&slow, &fast));

        slow.print_raw_blocking(vec![1]).unwrap();
        slow.print_raw_blocking(vec![2]).unwrap();
        let started = Instant::now();
        fast.print_raw_blocking(vec![3]).unwrap();

        assert!(connector.wait_for_writes(LABEL, 1, DEFAULT_TEST_TIMEOUT));
        assert!(started.elapsed() < Duration::from_millis(250));
        assert!(connector.writes_for(RECEIPT).len() < 2);

        assert!(connector.wait_for_writes(RECEIPT, 2, DEFAULT_TEST_TIMEOUT));
        registry.shutdown_all();
    }

    #[test]
    fn test_shutdown_all_clears() {
        let connector = MockConnector::new();
        let registry = registry(&connector);

        let a = registry.get_session(RECEIPT).unwrap();
        let b = registry.get_session(LABEL).unwrap();
        a.print_raw_blocking(vec![1]).unwrap();
        assert!(connector.wait_for_writes(RECEIPT, 1, DEFAULT_TEST_TIMEOUT));

        registry.shutdown_all();
        assert!(registry.is_empty());
        assert_eq!(a.state(), WorkerState::Stopped);
        assert_eq!(b.state(), WorkerState::Stopped);
        assert_eq!(connector.release_count(), 1);
        assert!(registry.get(RECEIPT).is_none());
    }
}
