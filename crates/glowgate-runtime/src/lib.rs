//! `glowgate-runtime` – process-level concerns.
//!
//! # Modules
//!
//! - [`telemetry`] – [`TelemetryConfig`]: tracing subscriber, log format and
//!   optional OTLP span export.
//! - [`supervisor`] – [`Supervisor`]: turns restart requests raised by
//!   request handlers into a delayed process exit.

pub mod supervisor;
pub mod telemetry;

pub use supervisor::{RestartRequest, RestartTrigger, Supervisor};
pub use telemetry::{LogFormat, TelemetryConfig, TracerProviderGuard, init_tracing};
