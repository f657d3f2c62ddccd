//! `glowgate-hal` – Device capability layer.
//!
//! # Modules
//!
//! - [`device`] – the [`Device`] trait: every operation the gateway may
//!   sequence against the controller, plus the signal subscription.
//! - [`sim`] – [`SimDevice`]: an in-process simulated controller for tests,
//!   CI, and running without hardware.

pub mod device;
pub mod sim;

pub use device::Device;
pub use sim::{SimDevice, SimDeviceBuilder};
