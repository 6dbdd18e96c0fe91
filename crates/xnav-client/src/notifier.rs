//! Push-based delivery of fresh detections.
//!
//! Two consumers are supported and both may be active at once:
//!
//! * **Callback** – [`EventNotifier::set_callback`] installs a single
//!   callback (a new one replaces the old).  It runs on the delivery thread,
//!   never on the control loop, and receives an immutable snapshot.
//! * **Queue** – [`EventNotifier::subscribe`] hands out a bounded
//!   [`TargetEvents`] receiver that the control loop drains at its own pace.
//!   When the queue is full new batches are dropped, never blocking the
//!   delivery thread.
//!
//! The delivery thread itself is started by [`spawn_delivery`].  It listens
//! to the bus update stream, coalesces bursts of updates into one wake-up,
//! and fires only when detection keys changed.  A panicking callback is
//! logged and does not stop delivery.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, error, trace, warn};
use xnav_types::{TableUpdate, TagResult, TargetBatch};

use crate::state::{SharedStateRef, TargetCallback};

/// Owns the callback slot and the batch queue sender.
pub(crate) struct EventNotifier {
    state: SharedStateRef,
    capacity: usize,
}

impl EventNotifier {
    pub(crate) fn new(state: SharedStateRef, capacity: usize) -> Self {
        Self {
            state,
            capacity: capacity.max(1),
        }
    }

    /// Install `callback`, replacing any previous one.
    pub(crate) fn set_callback(&self, callback: Arc<TargetCallback>) {
        self.state.lock().on_new_targets = Some(callback);
    }

    pub(crate) fn clear_callback(&self) {
        self.state.lock().on_new_targets = None;
    }

    /// Open a fresh batch queue.  Any previously handed out receiver stops
    /// receiving.
    pub(crate) fn subscribe(&self) -> TargetEvents {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.state.lock().events = Some(tx);
        TargetEvents { rx }
    }

    /// `true` when a callback or queue is waiting for batches.
    pub(crate) fn has_consumers(&self) -> bool {
        let state = self.state.lock();
        state.on_new_targets.is_some() || state.events.is_some()
    }

    /// Hand `targets` to the callback and the queue.
    pub(crate) fn notify(&self, targets: Vec<TagResult>) {
        let (callback, events) = {
            let state = self.state.lock();
            (state.on_new_targets.clone(), state.events.clone())
        };

        if let Some(callback) = callback
            && panic::catch_unwind(AssertUnwindSafe(|| callback(&targets))).is_err()
        {
            error!(
                targets = targets.len(),
                "on_new_targets callback panicked; batch still queued"
            );
        }

        let Some(events) = events else {
            return;
        };
        match events.try_send(TargetBatch::new(targets)) {
            Ok(()) => {}
            Err(TrySendError::Full(batch)) => {
                warn!(
                    batch = %batch.id,
                    capacity = self.capacity,
                    "target event queue full; dropping batch"
                );
            }
            Err(TrySendError::Closed(_)) => {
                debug!("target event receiver dropped");
                let mut state = self.state.lock();
                if state.events.as_ref().is_some_and(|tx| tx.same_channel(&events)) {
                    state.events = None;
                }
            }
        }
    }
}

/// Bounded queue of [`TargetBatch`] values for the control loop.
///
/// Obtained from [`XNav::target_events`][crate::XNav::target_events].
pub struct TargetEvents {
    rx: mpsc::Receiver<TargetBatch>,
}

impl TargetEvents {
    /// Next queued batch without waiting.
    pub fn try_recv(&mut self) -> Option<TargetBatch> {
        self.rx.try_recv().ok()
    }

    /// Every batch queued so far, oldest first.
    pub fn drain(&mut self) -> Vec<TargetBatch> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Newest queued batch, discarding older ones.
    pub fn latest(&mut self) -> Option<TargetBatch> {
        std::iter::from_fn(|| self.try_recv()).last()
    }

    /// Wait for the next batch.  Returns `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<TargetBatch> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// Delivery thread
// ---------------------------------------------------------------------------

/// Handle to the delivery thread.  Dropping it stops the thread, even when
/// the bus is idle, and waits for an in-flight delivery to finish.
pub(crate) struct DeliveryHandle {
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DeliveryHandle {
    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for DeliveryHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let Some(thread) = self.thread.take() else {
            return;
        };
        // Dropped from inside a callback: the thread exits on its own.
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            error!("delivery thread panicked");
        }
    }
}

/// Start the delivery thread.
///
/// `is_detection_key` selects which keys count as fresh detection data.
/// `deliver` is called after each burst containing such a key and returns
/// `false` once its owner is gone, which ends the thread.  The thread also
/// ends when the bus closes its update channel or the returned handle is
/// dropped.
pub(crate) fn spawn_delivery<K, D>(
    mut updates: broadcast::Receiver<TableUpdate>,
    is_detection_key: K,
    deliver: D,
) -> Option<DeliveryHandle>
where
    K: Fn(&str) -> bool + Send + 'static,
    D: Fn() -> bool + Send + 'static,
{
    let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
    let spawned = thread::Builder::new()
        .name("xnav-delivery".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!(error = %e, "failed to build delivery runtime; notifications disabled");
                    return;
                }
            };
            runtime.block_on(async move {
                loop {
                    let received = tokio::select! {
                        biased;
                        _ = &mut shutdown_rx => break,
                        received = updates.recv() => received,
                    };
                    let (fresh, closed) = match received {
                        Ok(update) => {
                            let (more, closed) = drain_pending(&mut updates, &is_detection_key);
                            (is_detection_key(&update.key) || more, closed)
                        }
                        Err(RecvError::Lagged(n)) => {
                            warn!(lagged_by = n, "delivery thread lagged behind bus updates");
                            (true, false)
                        }
                        Err(RecvError::Closed) => break,
                    };
                    if fresh && !deliver() {
                        break;
                    }
                    if closed {
                        break;
                    }
                }
            });
            trace!("delivery thread exiting");
        });

    match spawned {
        Ok(thread) => Some(DeliveryHandle {
            shutdown: Some(shutdown),
            thread: Some(thread),
        }),
        Err(e) => {
            error!(error = %e, "failed to spawn delivery thread; push notifications disabled");
            None
        }
    }
}

/// Consume every update already queued.  Returns whether any of them touched a
/// detection key, and whether the channel closed.
fn drain_pending(
    updates: &mut broadcast::Receiver<TableUpdate>,
    is_detection_key: &impl Fn(&str) -> bool,
) -> (bool, bool) {
    let mut fresh = false;
    loop {
        match updates.try_recv() {
            Ok(update) => fresh |= is_detection_key(&update.key),
            Err(TryRecvError::Lagged(_)) => fresh = true,
            Err(TryRecvError::Empty) => return (fresh, false),
            Err(TryRecvError::Closed) => return (fresh, true),
        }
    }
}
