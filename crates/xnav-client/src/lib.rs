//! `xnav-client` – robot-side mirror of an XNav vision device.
//!
//! The device publishes its detections and status on a key/value table bus.
//! This crate turns those raw keys into typed snapshots that are safe to poll
//! every control-loop cycle, and carries a few control values back.
//!
//! # Modules
//!
//! - [`client`] – [`XNav`]: the handle robot code owns.  Total read
//!   accessors (`target`, `all_targets`, `robot_pose`, `status`, …), the
//!   control setters, and the notification hooks.
//! - [`session`] – [`BusSession`]: starts the bus client, reports
//!   connectivity.
//! - [`config`] – [`ClientConfig`]: table name, server address or team
//!   number, cache bound, event queue size.
//! - [`notifier`] – [`TargetEvents`]: bounded queue of fresh detection
//!   batches for the control loop; the single-slot callback lives alongside.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: process-wide
//!   `tracing` setup with optional OTLP export.
//!
//! Per-tag subscriptions are created lazily in a bounded, id-indexed cache
//! that is private to the client.
//!
//! # Threads
//!
//! Accessors run on the caller's thread and only read cached values.  A
//! delivery thread started by [`XNav::init`] watches the bus for fresh
//! detections and feeds the callback and the event queue.  Dropping the
//! [`XNav`] stops that thread.

mod cache;
pub mod client;
pub mod config;
mod control;
pub mod notifier;
pub mod session;
mod state;
pub mod telemetry;

pub use client::XNav;
pub use config::{
    ClientConfig, DEFAULT_TAG_ID_LIMIT, MAX_EVENT_QUEUE_CAPACITY, MAX_TAG_ID_LIMIT, team_address,
};
pub use notifier::TargetEvents;
pub use session::{BusSession, SessionState};
pub use state::TargetCallback;
pub use telemetry::{TracerProviderGuard, init_tracing};

pub use xnav_types::{
    OffsetPoint, RobotPose, SystemStatus, TagResult, TargetBatch, XNavError,
};
