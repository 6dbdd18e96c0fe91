//! The client's single lock domain.
//!
//! Everything mutable that both the control loop and the delivery thread
//! touch lives in [`SharedState`] behind one [`Mutex`].  The lock is only held
//! for a lookup, an insert, or a pointer swap; never across a bus call or a
//! user callback.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use xnav_types::{TagResult, TargetBatch};

use crate::cache::TagArena;

/// Callback invoked on the delivery thread with each fresh detection batch.
pub type TargetCallback = dyn Fn(&[TagResult]) + Send + Sync;

pub(crate) struct SharedState {
    pub(crate) arena: TagArena,
    pub(crate) on_new_targets: Option<Arc<TargetCallback>>,
    pub(crate) events: Option<mpsc::Sender<TargetBatch>>,
}

pub(crate) type SharedStateRef = Arc<Mutex<SharedState>>;

impl SharedState {
    pub(crate) fn new(tag_id_limit: usize) -> SharedStateRef {
        Arc::new(Mutex::new(Self {
            arena: TagArena::with_limit(tag_id_limit),
            on_new_targets: None,
            events: None,
        }))
    }
}
