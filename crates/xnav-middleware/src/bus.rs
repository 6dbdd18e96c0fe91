//! Key/value table bus abstraction.
//!
//! A [`TableBus`] is a hierarchical key/value store shared with a remote peer.
//! Subscribing to a key yields a [`TopicSlot`] – a cell holding the last value
//! the bus delivered for that key – so reads never wait on the network.
//! Every write, local or remote, is also announced as a [`TableUpdate`] on a
//! broadcast channel so listeners can react to fresh data.
//!
//! [`LocalTableBus`] implements the trait entirely in-process.  Both sides of
//! the link (robot client and vision device) share one store, and the link
//! state is toggled explicitly with [`LocalTableBus::set_link`].

use std::collections::HashMap;
use std::mem::discriminant;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};
use xnav_types::{TableUpdate, Value, XNavError};

/// Default update channel capacity (number of buffered updates before old
/// ones are dropped for slow listeners).
const DEFAULT_CAPACITY: usize = 1024;

/// Cached last value of a single key.
///
/// Slots are shared between the bus (writer) and any number of subscribers
/// (readers).  A slot that never received a value reads as `None`.
#[derive(Debug, Default)]
pub struct TopicSlot {
    value: RwLock<Option<Value>>,
}

impl TopicSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the last delivered value.
    pub fn get(&self) -> Option<Value> {
        self.value.read().clone()
    }

    /// Run `f` against the last delivered value without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(Option<&Value>) -> R) -> R {
        f(self.value.read().as_ref())
    }

    /// Replace the cached value.
    pub fn store(&self, value: Value) {
        *self.value.write() = Some(value);
    }
}

/// The pub/sub key/value transport seen from one endpoint.
///
/// # Contract
///
/// * `start_client` – begin connecting under `identity`.  With `server` the
///   bus targets that address, otherwise it falls back to its own discovery.
///   Connectivity failures are never reported here; they surface only through
///   [`connections`](TableBus::connections).
/// * `subscribe` – returns the cache cell for `key`.  Repeated calls for the
///   same key return the same cell.
/// * `set` – last-value-wins write.  Values are retained locally while the
///   link is down.
/// * `connections` – number of active peer connections, a cached snapshot.
/// * `listen` – stream of every value change.
pub trait TableBus: Send + Sync {
    fn start_client(&self, identity: &str, server: Option<&str>) -> Result<(), XNavError>;

    fn stop_client(&self);

    fn subscribe(&self, key: &str) -> Arc<TopicSlot>;

    fn set(&self, key: &str, value: Value) -> Result<(), XNavError>;

    fn connections(&self) -> usize;

    fn listen(&self) -> broadcast::Receiver<TableUpdate>;
}

#[derive(Debug, Default)]
struct ClientState {
    identity: Option<String>,
    server: Option<String>,
    running: bool,
}

/// In-process [`TableBus`] used by tests, the simulator, and the monitor.
#[derive(Debug)]
pub struct LocalTableBus {
    topics: RwLock<HashMap<String, Arc<TopicSlot>>>,
    updates: broadcast::Sender<TableUpdate>,
    client: RwLock<ClientState>,
    link_up: AtomicBool,
}

impl LocalTableBus {
    /// Create a bus whose update channel buffers `capacity` notifications.
    pub fn new(capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(capacity);
        Self {
            topics: RwLock::new(HashMap::new()),
            updates,
            client: RwLock::new(ClientState::default()),
            link_up: AtomicBool::new(false),
        }
    }

    /// Bring the emulated peer link up or down.
    pub fn set_link(&self, up: bool) {
        let was_up = self.link_up.swap(up, Ordering::SeqCst);
        if was_up != up {
            info!(connected = up, "table bus link changed");
        }
    }

    /// Address passed to the last `start_client`, if any.
    pub fn server(&self) -> Option<String> {
        self.client.read().server.clone()
    }

    /// Identity passed to the last `start_client`, if any.
    pub fn identity(&self) -> Option<String> {
        self.client.read().identity.clone()
    }

    pub fn is_client_running(&self) -> bool {
        self.client.read().running
    }

    /// Number of live [`listen`](TableBus::listen) receivers.
    pub fn listener_count(&self) -> usize {
        self.updates.receiver_count()
    }

    /// Number of keys that have been subscribed or written.
    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn slot(&self, key: &str) -> Arc<TopicSlot> {
        if let Some(slot) = self.topics.read().get(key) {
            return slot.clone();
        }
        self.topics
            .write()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(TopicSlot::new()))
            .clone()
    }
}

impl Default for LocalTableBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TableBus for LocalTableBus {
    fn start_client(&self, identity: &str, server: Option<&str>) -> Result<(), XNavError> {
        let mut client = self.client.write();
        client.identity = Some(identity.to_string());
        client.server = server.map(str::to_string);
        client.running = true;
        Ok(())
    }

    fn stop_client(&self) {
        self.client.write().running = false;
    }

    fn subscribe(&self, key: &str) -> Arc<TopicSlot> {
        self.slot(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), XNavError> {
        let slot = self.slot(key);
        {
            let mut current = slot.value.write();
            if let Some(existing) = current.as_ref()
                && discriminant(existing) != discriminant(&value)
            {
                return Err(XNavError::TypeMismatch {
                    key: key.to_string(),
                    existing: existing.type_name().to_string(),
                    attempted: value.type_name().to_string(),
                });
            }
            *current = Some(value.clone());
        }
        let update = TableUpdate {
            key: key.to_string(),
            value,
            timestamp: Utc::now(),
        };
        // No listeners is a normal condition, not an error.
        if self.updates.send(update).is_err() {
            debug!(key, "table update had no listeners");
        }
        Ok(())
    }

    fn connections(&self) -> usize {
        let running = self.client.read().running;
        usize::from(running && self.link_up.load(Ordering::SeqCst))
    }

    fn listen(&self) -> broadcast::Receiver<TableUpdate> {
        self.updates.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_before_write_reads_none() {
        let bus = LocalTableBus::default();
        let slot = bus.subscribe("/XNav/fps");
        assert!(slot.get().is_none());
    }

    #[test]
    fn listener_count_tracks_receivers() {
        let bus = LocalTableBus::default();
        assert_eq!(bus.listener_count(), 0);
        let rx = bus.listen();
        assert_eq!(bus.listener_count(), 1);
        drop(rx);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn write_is_visible_through_existing_slot() -> Result<(), Box<dyn std::error::Error>> {
        let bus = LocalTableBus::default();
        let slot = bus.subscribe("/XNav/fps");
        bus.set("/XNav/fps", Value::Double(30.0))?;
        assert_eq!(slot.get(), Some(Value::Double(30.0)));
        Ok(())
    }

    #[test]
    fn repeated_subscribe_shares_one_slot() {
        let bus = LocalTableBus::default();
        let a = bus.subscribe("/XNav/status");
        let b = bus.subscribe("/XNav/status");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(bus.topic_count(), 1);
    }

    #[test]
    fn type_change_is_rejected_and_keeps_old_value() -> Result<(), Box<dyn std::error::Error>> {
        let bus = LocalTableBus::default();
        bus.set("/XNav/fps", Value::Double(30.0))?;
        let result = bus.set("/XNav/fps", Value::String("fast".into()));
        assert!(matches!(result, Err(XNavError::TypeMismatch { .. })));
        assert_eq!(bus.subscribe("/XNav/fps").get(), Some(Value::Double(30.0)));
        Ok(())
    }

    #[test]
    fn connections_require_client_and_link() -> Result<(), Box<dyn std::error::Error>> {
        let bus = LocalTableBus::default();
        assert_eq!(bus.connections(), 0);

        bus.start_client("XNavLib", Some("10.12.34.2"))?;
        assert_eq!(bus.connections(), 0);
        assert_eq!(bus.server().as_deref(), Some("10.12.34.2"));
        assert_eq!(bus.identity().as_deref(), Some("XNavLib"));

        bus.set_link(true);
        assert_eq!(bus.connections(), 1);

        bus.stop_client();
        assert_eq!(bus.connections(), 0);
        Ok(())
    }

    #[test]
    fn writes_while_link_down_are_retained() -> Result<(), Box<dyn std::error::Error>> {
        let bus = LocalTableBus::default();
        bus.start_client("XNavLib", None)?;
        bus.set("/XNav/input/matchMode", Value::Boolean(true))?;
        bus.set_link(false);
        assert_eq!(
            bus.subscribe("/XNav/input/matchMode").get(),
            Some(Value::Boolean(true))
        );
        Ok(())
    }

    #[test]
    fn set_without_listeners_is_ok() {
        let bus = LocalTableBus::default();
        assert!(bus.set("/XNav/hasTarget", Value::Boolean(false)).is_ok());
    }

    #[tokio::test]
    async fn listeners_receive_updates() -> Result<(), Box<dyn std::error::Error>> {
        let bus = LocalTableBus::default();
        let mut rx = bus.listen();

        bus.set("/XNav/tagIds", Value::IntegerArray(vec![1, 7]))?;

        let update = rx.recv().await?;
        assert_eq!(update.key, "/XNav/tagIds");
        assert_eq!(update.value, Value::IntegerArray(vec![1, 7]));
        Ok(())
    }

    /// Flooding a low-capacity channel while a listener sleeps must produce a
    /// `Lagged` error rather than blocking the writer.
    #[tokio::test]
    async fn slow_listener_lags_instead_of_blocking() -> Result<(), Box<dyn std::error::Error>> {
        let bus = LocalTableBus::new(16);
        let mut slow = bus.listen();

        for i in 0..1_000 {
            bus.set("/XNav/fps", Value::Double(f64::from(i)))?;
        }

        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
        Ok(())
    }
}
