//! Per-tag subscription cache.
//!
//! The first time a tag id is referenced, [`SubscriptionCache::get_or_create`]
//! subscribes to every field under `targets/<id>/` and stores the resulting
//! [`TagBundle`] in a [`TagArena`].  Bundles are never evicted: tags that
//! flicker in and out of view keep their subscriptions, so there is no
//! subscribe/unsubscribe churn at loop rate.
//!
//! The arena is indexed by tag id and sized once from
//! [`ClientConfig::tag_id_limit`][crate::ClientConfig::tag_id_limit], which
//! makes the memory ceiling explicit.  Ids outside `0..limit` are served with
//! default values and never cached.

use std::sync::Arc;

use tracing::debug;
use xnav_middleware::{Subscriber, Table};
use xnav_types::{TagResult, keys};

use crate::state::SharedStateRef;

/// Subscriptions for every field of one tag.
pub(crate) struct TagBundle {
    tx: Subscriber<f64>,
    ty: Subscriber<f64>,
    x: Subscriber<f64>,
    y: Subscriber<f64>,
    z: Subscriber<f64>,
    distance: Subscriber<f64>,
    yaw: Subscriber<f64>,
    pitch: Subscriber<f64>,
    roll: Subscriber<f64>,
}

impl TagBundle {
    /// Subscribe to the fields of tag `id` under `targets`.
    fn subscribe(targets: &Table, id: i32) -> Self {
        use keys::target::*;

        let tag = targets.sub_table(&id.to_string());
        Self {
            tx: tag.subscribe(TX, 0.0),
            ty: tag.subscribe(TY, 0.0),
            x: tag.subscribe(X, 0.0),
            y: tag.subscribe(Y, 0.0),
            z: tag.subscribe(Z, 0.0),
            distance: tag.subscribe(DISTANCE, 0.0),
            yaw: tag.subscribe(YAW, 0.0),
            pitch: tag.subscribe(PITCH, 0.0),
            roll: tag.subscribe(ROLL, 0.0),
        }
    }

    /// Snapshot of the latest delivered values.  Fields are read one by one,
    /// so a frame arriving mid-read can yield a mix of old and new values.
    pub(crate) fn read(&self, id: i32) -> TagResult {
        TagResult {
            id,
            tx: self.tx.get(),
            ty: self.ty.get(),
            x: self.x.get(),
            y: self.y.get(),
            z: self.z.get(),
            distance: self.distance.get(),
            yaw: self.yaw.get(),
            pitch: self.pitch.get(),
            roll: self.roll.get(),
        }
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

/// Fixed-size, id-indexed storage for bundles.  Grows monotonically.
pub(crate) struct TagArena {
    slots: Vec<Option<Arc<TagBundle>>>,
    len: usize,
}

impl TagArena {
    pub(crate) fn with_limit(limit: usize) -> Self {
        Self {
            slots: vec![None; limit],
            len: 0,
        }
    }

    pub(crate) fn limit(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn get(&self, index: usize) -> Option<Arc<TagBundle>> {
        self.slots.get(index).and_then(Clone::clone)
    }

    /// Store `bundle` at `index` unless another bundle got there first; the
    /// bundle that ends up stored is returned.
    pub(crate) fn insert(&mut self, index: usize, bundle: Arc<TagBundle>) -> Arc<TagBundle> {
        match &mut self.slots[index] {
            Some(existing) => existing.clone(),
            empty => {
                *empty = Some(bundle.clone());
                self.len += 1;
                bundle
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Lazily populated id → [`TagBundle`] map shared with the delivery thread.
pub(crate) struct SubscriptionCache {
    targets: Table,
    state: SharedStateRef,
    limit: usize,
}

impl SubscriptionCache {
    /// Cache rooted at `root/targets`.
    pub(crate) fn new(root: &Table, state: SharedStateRef) -> Self {
        let limit = state.lock().arena.limit();
        Self {
            targets: root.sub_table(keys::TARGETS),
            state,
            limit,
        }
    }

    /// Bundle for `id`, subscribing on first use.  `None` for ids outside the
    /// arena bounds.
    pub(crate) fn get_or_create(&self, id: i32) -> Option<Arc<TagBundle>> {
        let Some(index) = usize::try_from(id).ok().filter(|&i| i < self.limit) else {
            debug!(tag_id = id, limit = self.limit, "tag id outside cache bounds");
            return None;
        };

        if let Some(bundle) = self.state.lock().arena.get(index) {
            return Some(bundle);
        }

        // Subscribe without holding the lock; if another thread raced us the
        // arena keeps the first bundle and ours is dropped.
        let bundle = Arc::new(TagBundle::subscribe(&self.targets, id));
        let mut state = self.state.lock();
        let stored = state.arena.insert(index, bundle);
        debug!(tag_id = id, cached = state.arena.len(), "tag subscriptions created");
        Some(stored)
    }

    /// Current values of tag `id`, or an all-default record carrying `id` when
    /// the id cannot be cached.
    pub(crate) fn read(&self, id: i32) -> TagResult {
        match self.get_or_create(id) {
            Some(bundle) => bundle.read(id),
            None => TagResult::unmeasured(id),
        }
    }

    /// Number of tags with live subscriptions.
    pub(crate) fn len(&self) -> usize {
        self.state.lock().arena.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SharedState;
    use std::thread;
    use xnav_middleware::{LocalTableBus, TableBus};
    use xnav_types::Value;

    fn cache(limit: usize) -> (Arc<LocalTableBus>, SubscriptionCache) {
        let bus = Arc::new(LocalTableBus::default());
        let root = Table::new(bus.clone(), "XNav");
        (bus, SubscriptionCache::new(&root, SharedState::new(limit)))
    }

    #[test]
    fn first_access_subscribes_every_field_once() {
        let (bus, cache) = cache(32);
        assert_eq!(bus.topic_count(), 0);

        cache.get_or_create(5);
        assert_eq!(bus.topic_count(), keys::target::FIELDS.len());
        assert_eq!(cache.len(), 1);

        cache.get_or_create(5);
        assert_eq!(bus.topic_count(), keys::target::FIELDS.len());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn repeated_access_returns_the_same_bundle() {
        let (_, cache) = cache(32);
        let a = cache.get_or_create(3).expect("in range");
        let b = cache.get_or_create(3).expect("in range");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn fresh_bundle_reads_defaults_with_id() {
        let (_, cache) = cache(32);
        let tag = cache.read(9);
        assert_eq!(tag, TagResult::unmeasured(9));
    }

    #[test]
    fn read_reflects_delivered_values() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, cache) = cache(32);
        bus.set("/XNav/targets/4/tx", Value::Double(-2.5))?;
        bus.set("/XNav/targets/4/distance", Value::Double(3.25))?;

        let tag = cache.read(4);
        assert_eq!(tag.id, 4);
        assert_eq!(tag.tx, -2.5);
        assert_eq!(tag.distance, 3.25);
        assert_eq!(tag.roll, 0.0);
        Ok(())
    }

    #[test]
    fn values_arriving_after_creation_are_visible() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, cache) = cache(32);
        assert_eq!(cache.read(2).yaw, 0.0);
        bus.set("/XNav/targets/2/yaw", Value::Double(45.0))?;
        assert_eq!(cache.read(2).yaw, 45.0);
        Ok(())
    }

    #[test]
    fn out_of_range_ids_are_not_cached() {
        let (bus, cache) = cache(8);
        assert!(cache.get_or_create(8).is_none());
        assert!(cache.get_or_create(-3).is_none());
        assert_eq!(cache.read(8), TagResult::unmeasured(8));
        assert_eq!(cache.len(), 0);
        assert_eq!(bus.topic_count(), 0);
    }

    #[test]
    fn arena_keeps_first_insert() {
        let bus: Arc<dyn TableBus> = Arc::new(LocalTableBus::default());
        let targets = Table::new(bus, "XNav").sub_table("targets");
        let mut arena = TagArena::with_limit(4);

        let first = Arc::new(TagBundle::subscribe(&targets, 1));
        let second = Arc::new(TagBundle::subscribe(&targets, 1));
        let stored = arena.insert(1, first.clone());
        assert!(Arc::ptr_eq(&stored, &first));
        let stored = arena.insert(1, second);
        assert!(Arc::ptr_eq(&stored, &first));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.limit(), 4);
    }

    #[test]
    fn concurrent_creation_converges_on_one_bundle() {
        let (_, cache) = cache(64);
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || cache.get_or_create(11).expect("in range"))
            })
            .collect();
        let bundles: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .collect();

        assert!(bundles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cache.len(), 1);
    }
}
