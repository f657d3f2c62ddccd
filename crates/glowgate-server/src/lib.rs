//! `glowgate-server` – Command gateway and HTTP/SSE surface.
//!
//! # Modules
//!
//! - [`gateway`] – [`Gateway`]: validates commands, holds the session guards
//!   and sequences [`Device`][glowgate_hal::Device] calls.
//! - [`routes`] – axum router mapping gateway outcomes to response
//!   envelopes and status codes, and relay topics to SSE streams.
//! - [`server`] – [`GatewayServer`]: binds the router to a TCP port with
//!   graceful shutdown.

pub mod gateway;
pub mod routes;
pub mod server;

#[cfg(test)]
mod mock;

pub use gateway::{ConnectRequest, EmitCommand, Gateway, VariableBatch, VariableQuery};
pub use routes::{AppState, router};
pub use server::{DEFAULT_PORT, GatewayServer, ServerError};
