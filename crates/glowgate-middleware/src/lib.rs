//! `glowgate-middleware` – The event relay
//!
//! Routes device-originated signals to any number of HTTP listeners without
//! caring about the events' meaning.
//!
//! # Modules
//!
//! - [`bus`] – per-topic publish/subscribe relay; every listener owns an
//!   unbounded queue, so bursts are never dropped.
//! - [`bridge`] – [`DeviceBridge`]: the sole subscriber to the device's signal
//!   stream, flattening batches onto the relay topics.

pub mod bridge;
pub mod bus;

pub use bridge::DeviceBridge;
pub use bus::{RelayBus, RelayMessage, Topic, TopicReceiver};
