//! [`BusSession`] – connection lifecycle to the vision device.
//!
//! A session is created in the [`SessionState::Unopened`] state and moves to
//! [`SessionState::Open`] exactly once.  There is no observable closed state:
//! dropping the session stops the bus client and nothing else.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};
use xnav_middleware::TableBus;
use xnav_types::XNavError;

use crate::config::validate_address;

/// Externally observable session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Open,
}

/// Owns the bus client for one [`XNav`][crate::XNav] instance.
pub struct BusSession {
    bus: Arc<dyn TableBus>,
    identity: String,
    open: AtomicBool,
}

impl BusSession {
    pub fn new(bus: Arc<dyn TableBus>, identity: impl Into<String>) -> Self {
        Self {
            bus,
            identity: identity.into(),
            open: AtomicBool::new(false),
        }
    }

    /// Start the bus client, targeting `server` when given and the bus's
    /// default discovery otherwise.
    ///
    /// Opening an already open session logs a warning and does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`XNavError::InvalidAddress`] for a malformed `server`, or the
    /// bus's own error if the client cannot be started.  Being unable to reach
    /// the server is *not* an error.
    pub fn open(&self, server: Option<&str>) -> Result<(), XNavError> {
        let server = server.map(validate_address).transpose()?;
        if self
            .open
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(identity = %self.identity, "bus session already open; ignoring");
            return Ok(());
        }
        if let Err(e) = self.bus.start_client(&self.identity, server.as_deref()) {
            self.open.store(false, Ordering::SeqCst);
            return Err(e);
        }
        match server.as_deref() {
            Some(addr) => info!(identity = %self.identity, server = addr, "bus session open"),
            None => info!(identity = %self.identity, "bus session open (default discovery)"),
        }
        Ok(())
    }

    /// `true` while the bus reports at least one peer connection.
    pub fn is_connected(&self) -> bool {
        self.bus.connections() > 0
    }

    pub fn state(&self) -> SessionState {
        if self.open.load(Ordering::SeqCst) {
            SessionState::Open
        } else {
            SessionState::Unopened
        }
    }

    pub fn bus(&self) -> &Arc<dyn TableBus> {
        &self.bus
    }
}

impl Drop for BusSession {
    fn drop(&mut self) {
        if self.open.load(Ordering::SeqCst) {
            self.bus.stop_client();
        }
    }
}
