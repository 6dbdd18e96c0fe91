//! `xnav-sim` – a stand-in vision device for tests and bench runs.
//!
//! Lets the full client stack run headless, without a camera or a coprocessor
//! on the network.
//!
//! # Modules
//!
//! - [`device`] – [`SimDevice`]: writes detection frames and status to a
//!   [`LocalTableBus`][xnav_middleware::LocalTableBus] using the same key
//!   layout as the real device, and reads back the robot's control inputs.
//! - [`scene`] – [`SimScene`]: a builder for deterministic, tick-driven
//!   detection sequences (sweeping tags, tags dropping in and out of view).

pub mod device;
pub mod scene;

pub use device::{DeviceInputs, SimDevice, SimFrame};
pub use scene::SimScene;
