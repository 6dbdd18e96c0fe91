//! [`XNav`] – the robot-side handle to one vision device.
//!
//! Construct one per device, pass it to the control loop, and call
//! [`XNav::init`] once.  Every read accessor is total: it returns the last
//! value the bus delivered, or a documented default, and never returns an
//! error or waits on the network.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use xnav_client::XNav;
//! use xnav_middleware::LocalTableBus;
//!
//! let bus = Arc::new(LocalTableBus::default());
//! let mut vision = XNav::new(bus, "XNav");
//! vision.init().unwrap();
//!
//! // Nothing published yet: defaults everywhere.
//! assert!(!vision.has_target());
//! assert_eq!(vision.primary_target().id, -1);
//! assert!(!vision.robot_pose().valid);
//! ```

use std::sync::{Arc, Weak};

use tracing::{info, warn};
use xnav_middleware::{Subscriber, Table, TableBus};
use xnav_types::{
    OffsetPoint, RobotPose, SystemStatus, TagResult, XNavError, keys,
};

use crate::cache::SubscriptionCache;
use crate::config::ClientConfig;
use crate::control::ControlPublisher;
use crate::notifier::{DeliveryHandle, EventNotifier, TargetEvents, spawn_delivery};
use crate::session::{BusSession, SessionState};
use crate::state::SharedState;

// ─────────────────────────────────────────────────────────────────────────────
// Fixed subscriptions
// ─────────────────────────────────────────────────────────────────────────────

struct StatusSubs {
    status: Subscriber<String>,
    fps: Subscriber<f64>,
    latency_ms: Subscriber<f64>,
    has_target: Subscriber<bool>,
    num_targets: Subscriber<i64>,
    tag_ids: Subscriber<Vec<i64>>,
    primary_tag_id: Subscriber<i64>,
    robot_pose: Subscriber<Vec<f64>>,
}

impl StatusSubs {
    fn new(root: &Table) -> Self {
        Self {
            status: root.subscribe(keys::STATUS, keys::DEFAULT_STATUS.to_string()),
            fps: root.subscribe(keys::FPS, 0.0),
            latency_ms: root.subscribe(keys::LATENCY_MS, 0.0),
            has_target: root.subscribe(keys::HAS_TARGET, false),
            num_targets: root.subscribe(keys::NUM_TARGETS, 0),
            tag_ids: root.subscribe(keys::TAG_IDS, Vec::new()),
            primary_tag_id: root.subscribe(keys::PRIMARY_TAG_ID, -1),
            robot_pose: root.subscribe(keys::ROBOT_POSE, Vec::new()),
        }
    }
}

struct OffsetSubs {
    valid: Subscriber<bool>,
    tag_id: Subscriber<i64>,
    x: Subscriber<f64>,
    y: Subscriber<f64>,
    z: Subscriber<f64>,
    direct_distance: Subscriber<f64>,
    tx: Subscriber<f64>,
    ty: Subscriber<f64>,
}

impl OffsetSubs {
    fn new(root: &Table) -> Self {
        use keys::offset::*;

        let op = root.sub_table(keys::OFFSET_POINT);
        Self {
            valid: op.subscribe(VALID, false),
            tag_id: op.subscribe(TAG_ID, -1),
            x: op.subscribe(X, 0.0),
            y: op.subscribe(Y, 0.0),
            z: op.subscribe(Z, 0.0),
            direct_distance: op.subscribe(DIRECT_DISTANCE, 0.0),
            tx: op.subscribe(TX, 0.0),
            ty: op.subscribe(TY, 0.0),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared inner state
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the delivery thread needs a handle to.
struct ClientInner {
    config: ClientConfig,
    root: Table,
    session: BusSession,
    cache: SubscriptionCache,
    notifier: EventNotifier,
    control: ControlPublisher,
    status: StatusSubs,
    offset: OffsetSubs,
}

impl ClientInner {
    fn tag_ids(&self) -> Vec<i32> {
        self.status
            .tag_ids
            .get()
            .into_iter()
            .filter_map(|id| i32::try_from(id).ok())
            .collect()
    }

    fn all_targets(&self) -> Vec<TagResult> {
        self.tag_ids()
            .into_iter()
            .map(|id| self.cache.read(id))
            .collect()
    }

    /// Called on the delivery thread after fresh detection data arrived.
    fn deliver(&self) {
        if !self.notifier.has_consumers() {
            return;
        }
        self.notifier.notify(self.all_targets());
    }

    fn is_detection_key(&self) -> impl Fn(&str) -> bool + Send + 'static {
        let tag_ids_key = self.root.key(keys::TAG_IDS);
        let targets_prefix = format!("{}/", self.root.key(keys::TARGETS));
        move |key: &str| key == tag_ids_key || key.starts_with(&targets_prefix)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// XNav
// ─────────────────────────────────────────────────────────────────────────────

/// Robot-side client for one XNav vision device.
pub struct XNav {
    inner: Arc<ClientInner>,
    /// Dropped after `inner`, which stops the delivery thread.
    delivery: Option<DeliveryHandle>,
}

impl XNav {
    /// Client for table `table_name` on `bus`, all other settings defaulted.
    pub fn new(bus: Arc<dyn TableBus>, table_name: &str) -> Self {
        Self::with_config(bus, ClientConfig::for_table(table_name))
    }

    /// Client built from `config`.  Bounds beyond [`ClientConfig::validate`]
    /// limits are clamped with a warning.  The session stays unopened until
    /// [`init`](Self::init) or [`init_with_server`](Self::init_with_server).
    pub fn with_config(bus: Arc<dyn TableBus>, config: ClientConfig) -> Self {
        let config = config.clamped();
        let root = Table::new(bus.clone(), &config.table_name);
        let state = SharedState::new(config.tag_id_limit);
        let inner = ClientInner {
            session: BusSession::new(bus, config.client_name.clone()),
            cache: SubscriptionCache::new(&root, state.clone()),
            notifier: EventNotifier::new(state, config.event_queue_capacity),
            control: ControlPublisher::new(&root),
            status: StatusSubs::new(&root),
            offset: OffsetSubs::new(&root),
            root,
            config,
        };
        Self {
            inner: Arc::new(inner),
            delivery: None,
        }
    }

    // ── Initialization ───────────────────────────────────────────────────────

    /// Open the session using the configured address, the configured team
    /// number, or the bus's default discovery, in that order.
    ///
    /// # Errors
    ///
    /// Returns [`XNavError::InvalidAddress`] when the configured address or
    /// team number is unusable.  An unreachable server is not an error.
    pub fn init(&mut self) -> Result<(), XNavError> {
        let server = self.inner.config.resolve_server()?;
        self.open(server.as_deref())
    }

    /// Open the session against `server_address` (IP or hostname).
    ///
    /// # Errors
    ///
    /// Returns [`XNavError::InvalidAddress`] for a malformed address.
    pub fn init_with_server(&mut self, server_address: &str) -> Result<(), XNavError> {
        self.open(Some(server_address))
    }

    fn open(&mut self, server: Option<&str>) -> Result<(), XNavError> {
        if self.inner.session.state() == SessionState::Open {
            warn!(table = self.inner.root.path(), "XNav already initialised; ignoring");
            return Ok(());
        }
        self.inner.session.open(server)?;

        let updates = self.inner.session.bus().listen();
        let weak: Weak<ClientInner> = Arc::downgrade(&self.inner);
        self.delivery = spawn_delivery(updates, self.inner.is_detection_key(), move || {
            match weak.upgrade() {
                Some(inner) => {
                    inner.deliver();
                    true
                }
                None => false,
            }
        });
        info!(table = self.inner.root.path(), "XNav client initialised");
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.inner.session.state()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // ── Detection results ────────────────────────────────────────────────────

    /// `true` if the device currently sees at least one tag.
    pub fn has_target(&self) -> bool {
        self.inner.status.has_target.get()
    }

    /// Number of tags the device currently sees.
    pub fn num_targets(&self) -> i32 {
        i32::try_from(self.inner.status.num_targets.get()).unwrap_or(0)
    }

    /// Ids of every visible tag, re-read on each call.  Ids that do not fit
    /// an `i32` are skipped.
    pub fn tag_ids(&self) -> Vec<i32> {
        self.inner.tag_ids()
    }

    /// The primary (closest) tag.  Check `id != -1` before using it.
    ///
    /// The primary id is not checked against [`tag_ids`](Self::tag_ids): the
    /// device publishes the two keys independently, so for one cycle this may
    /// describe a tag that has just left view.  Use
    /// [`primary_target_checked`](Self::primary_target_checked) to require
    /// both to agree.
    pub fn primary_target(&self) -> TagResult {
        match self.primary_id() {
            Some(id) => self.inner.cache.read(id),
            None => TagResult::default(),
        }
    }

    /// The primary tag, only if its id is also in the current
    /// [`tag_ids`](Self::tag_ids).
    pub fn primary_target_checked(&self) -> Option<TagResult> {
        let id = self.primary_id()?;
        self.tag_ids()
            .contains(&id)
            .then(|| self.inner.cache.read(id))
    }

    /// Data for tag `tag_id`, or `None` if it is not currently visible.
    ///
    /// Visibility is checked against the id list at call time; the values
    /// themselves are the latest delivered and may belong to a slightly
    /// different frame.
    pub fn target(&self, tag_id: i32) -> Option<TagResult> {
        self.tag_ids()
            .contains(&tag_id)
            .then(|| self.inner.cache.read(tag_id))
    }

    /// Every visible tag, resolved from a single read of the id list.
    pub fn all_targets(&self) -> Vec<TagResult> {
        self.inner.all_targets()
    }

    fn primary_id(&self) -> Option<i32> {
        let id = self.inner.status.primary_tag_id.get();
        if id < 0 {
            return None;
        }
        i32::try_from(id).ok()
    }

    // ── Robot pose ───────────────────────────────────────────────────────────

    /// Field-centric robot pose.  `valid` is `false` unless the device
    /// published a complete `[x, y, z, roll, pitch, yaw]` array.
    pub fn robot_pose(&self) -> RobotPose {
        match self.inner.status.robot_pose.get().as_slice() {
            [x, y, z, roll, pitch, yaw_deg, ..] => RobotPose {
                x: *x,
                y: *y,
                z: *z,
                roll: *roll,
                pitch: *pitch,
                yaw_deg: *yaw_deg,
                valid: true,
            },
            _ => RobotPose::default(),
        }
    }

    // ── Offset point ─────────────────────────────────────────────────────────

    /// Distance and angles to the configured offset point.  `valid` is read
    /// from the device, not inferred from the other fields.
    pub fn offset_point(&self) -> OffsetPoint {
        let op = &self.inner.offset;
        OffsetPoint {
            tag_id: i32::try_from(op.tag_id.get()).unwrap_or(-1),
            x: op.x.get(),
            y: op.y.get(),
            z: op.z.get(),
            direct_distance: op.direct_distance.get(),
            tx: op.tx.get(),
            ty: op.ty.get(),
            valid: op.valid.get(),
        }
    }

    // ── Turret control / match mode ──────────────────────────────────────────

    /// Send the turret angle (degrees, CCW positive from above) for pose
    /// compensation.
    pub fn set_turret_angle(&self, angle_deg: f64) {
        self.inner.control.set_turret_angle(angle_deg);
    }

    /// Enable or disable turret compensation on the device.
    pub fn set_turret_enabled(&self, enabled: bool) {
        self.inner.control.set_turret_enabled(enabled);
    }

    /// Ask the device to run at maximum performance.
    pub fn set_match_mode(&self, enabled: bool) {
        self.inner.control.set_match_mode(enabled);
    }

    // ── System status ────────────────────────────────────────────────────────

    pub fn status(&self) -> SystemStatus {
        let status = &self.inner.status;
        SystemStatus {
            status: status.status.get(),
            fps: status.fps.get(),
            latency_ms: status.latency_ms.get(),
            num_targets: self.num_targets(),
            nt_connected: self.is_connected(),
        }
    }

    /// `true` while the bus has an active connection to the device.
    pub fn is_connected(&self) -> bool {
        self.inner.session.is_connected()
    }

    /// Number of tags with live subscriptions in the cache.
    pub fn cached_tag_count(&self) -> usize {
        self.inner.cache.len()
    }

    // ── Notifications ────────────────────────────────────────────────────────

    /// Register `callback` for fresh detection data, replacing any previous
    /// one.
    ///
    /// The callback runs on the bus delivery thread, not the control loop.
    /// It must not block for long; heavy work belongs in the control loop via
    /// [`target_events`](Self::target_events).
    pub fn on_new_targets<F>(&self, callback: F)
    where
        F: Fn(&[TagResult]) + Send + Sync + 'static,
    {
        self.inner.notifier.set_callback(Arc::new(callback));
    }

    /// Remove the callback installed by [`on_new_targets`](Self::on_new_targets).
    pub fn clear_on_new_targets(&self) {
        self.inner.notifier.clear_callback();
    }

    /// Bounded queue of detection batches for the control loop to drain.
    /// Calling this again detaches the previous queue.
    pub fn target_events(&self) -> TargetEvents {
        self.inner.notifier.subscribe()
    }
}
