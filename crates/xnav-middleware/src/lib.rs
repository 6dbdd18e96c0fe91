//! `xnav-middleware` – the table bus seam.
//!
//! The real transport (NetworkTables-style pub/sub with its own reconnection
//! logic) lives outside this workspace.  Everything above this crate talks to
//! it through the [`TableBus`] trait.
//!
//! # Modules
//!
//! - [`bus`] – the [`TableBus`] trait, the per-key [`TopicSlot`] cache cell,
//!   and [`LocalTableBus`], an in-process implementation built on Tokio
//!   broadcast channels for tests and simulation.
//! - [`table`] – typed views over a bus: [`Table`] namespaces,
//!   [`Subscriber`] and [`Publisher`] handles.

pub mod bus;
pub mod table;

pub use bus::{LocalTableBus, TableBus, TopicSlot};
pub use table::{Publisher, Subscriber, Table, TopicValue};
