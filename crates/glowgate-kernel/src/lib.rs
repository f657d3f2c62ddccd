//! `glowgate-kernel` – Session state & mutual exclusion
//!
//! Enforces the single-flight rules of the gateway. It does not talk to the
//! device; it only records where the session stands and who may act next.
//!
//! # Modules
//!
//! - [`session`] – [`SessionState`][session::SessionState]: the connection
//!   phase plus the connect and firmware guards, acquired through RAII
//!   [`GuardToken`][session::GuardToken]s.

pub mod session;

pub use session::{GuardKind, GuardToken, SessionSnapshot, SessionState};
