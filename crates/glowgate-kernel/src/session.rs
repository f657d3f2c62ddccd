//! [`SessionState`] – the single mutable record of the device session.
//!
//! Holds the authoritative [`ConnectionPhase`] and two independent
//! single-flight guards:
//!
//! | Guard | Protects | Busy error |
//! |---|---|---|
//! | [`GuardKind::Connect`] | scan → connect sequence | `ConnectingInProgress` |
//! | [`GuardKind::Firmware`] | firmware upload | `AlreadingUploadingFW` |
//!
//! A guard admits at most one in-flight operation. A second caller is
//! rejected immediately, never queued. Acquisition returns a
//! [`GuardToken`] whose `Drop` releases the guard, so the flag is cleared on
//! success, on error, and when the owning future is dropped mid-await.
//!
//! # Example
//!
//! ```
//! use glowgate_kernel::session::{GuardKind, SessionState};
//!
//! let state = SessionState::new();
//! let token = state.try_acquire(GuardKind::Connect).unwrap();
//! assert!(state.try_acquire(GuardKind::Connect).is_err());
//! // The firmware guard is independent.
//! assert!(state.try_acquire(GuardKind::Firmware).is_ok());
//!
//! token.release();
//! assert!(!state.is_held(GuardKind::Connect));
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use glowgate_types::{ConnectionPhase, GatewayError};
use serde::Serialize;
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Names one of the two single-flight guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardKind {
    Connect,
    Firmware,
}

impl GuardKind {
    /// The error a caller receives while this guard is held.
    pub fn busy_error(self) -> GatewayError {
        match self {
            GuardKind::Connect => GatewayError::ConnectingInProgress,
            GuardKind::Firmware => GatewayError::AlreadyUploadingFirmware,
        }
    }
}

impl fmt::Display for GuardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardKind::Connect => f.write_str("connect"),
            GuardKind::Firmware => f.write_str("firmware"),
        }
    }
}

/// Point-in-time view of the session, served by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: ConnectionPhase,
    pub connecting: bool,
    pub firmware_uploading: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// SessionState
// ────────────────────────────────────────────────────────────────────────────

/// Process-wide session record. Share it behind an `Arc`.
///
/// All fields are atomics; acquisition is a single compare-exchange, so no
/// two callers can both observe a guard as free.
#[derive(Debug, Default)]
pub struct SessionState {
    phase: AtomicU8,
    connecting: AtomicBool,
    firmware_uploading: AtomicBool,
}

impl SessionState {
    /// Fresh state: `Disconnected`, both guards free.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ConnectionPhase {
        ConnectionPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn set_phase(&self, phase: ConnectionPhase) {
        let previous = ConnectionPhase::from_u8(self.phase.swap(phase.as_u8(), Ordering::SeqCst));
        if previous != phase {
            debug!(from = %previous, to = %phase, "connection phase changed");
        }
    }

    /// Return from a transient `Scanning`/`Connecting` phase to `previous`.
    /// A phase a device signal set in the meantime is left untouched.
    pub fn restore_phase(&self, previous: ConnectionPhase) {
        let restored = self
            .phase
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                matches!(
                    ConnectionPhase::from_u8(raw),
                    ConnectionPhase::Scanning | ConnectionPhase::Connecting
                )
                .then_some(previous.as_u8())
            })
            .is_ok();
        if restored {
            debug!(to = %previous, "connection phase restored");
        }
    }

    /// Whether `kind` is currently held.
    pub fn is_held(&self, kind: GuardKind) -> bool {
        self.flag(kind).load(Ordering::SeqCst)
    }

    /// Atomically take `kind` if it is free.
    ///
    /// # Errors
    ///
    /// The guard's busy error ([`GuardKind::busy_error`]) when another
    /// operation already holds it.
    pub fn try_acquire(&self, kind: GuardKind) -> Result<GuardToken<'_>, GatewayError> {
        self.flag(kind)
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| kind.busy_error())?;
        debug!(guard = %kind, "guard acquired");
        Ok(GuardToken { state: self, kind })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase(),
            connecting: self.is_held(GuardKind::Connect),
            firmware_uploading: self.is_held(GuardKind::Firmware),
        }
    }

    fn flag(&self, kind: GuardKind) -> &AtomicBool {
        match kind {
            GuardKind::Connect => &self.connecting,
            GuardKind::Firmware => &self.firmware_uploading,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RAII token
// ────────────────────────────────────────────────────────────────────────────

/// Proof that a guard is held. Dropping it releases the guard.
#[must_use = "dropping the token releases the guard immediately"]
#[derive(Debug)]
pub struct GuardToken<'a> {
    state: &'a SessionState,
    kind: GuardKind,
}

impl GuardToken<'_> {
    pub fn kind(&self) -> GuardKind {
        self.kind
    }

    /// Release explicitly. Equivalent to dropping the token.
    pub fn release(self) {}
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.state.flag(self.kind).store(false, Ordering::SeqCst);
        debug!(guard = %self.kind, "guard released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_disconnected_and_free() {
        let state = SessionState::new();
        assert_eq!(state.phase(), ConnectionPhase::Disconnected);
        assert!(!state.is_held(GuardKind::Connect));
        assert!(!state.is_held(GuardKind::Firmware));
    }

    #[test]
    fn second_acquire_is_rejected_with_busy_error() {
        let state = SessionState::new();
        let _token = state.try_acquire(GuardKind::Connect).unwrap();
        let err = state.try_acquire(GuardKind::Connect).unwrap_err();
        assert_eq!(err, GatewayError::ConnectingInProgress);

        let _fw = state.try_acquire(GuardKind::Firmware).unwrap();
        let err = state.try_acquire(GuardKind::Firmware).unwrap_err();
        assert_eq!(err, GatewayError::AlreadyUploadingFirmware);
    }

    #[test]
    fn drop_releases_guard() {
        let state = SessionState::new();
        {
            let _token = state.try_acquire(GuardKind::Firmware).unwrap();
            assert!(state.is_held(GuardKind::Firmware));
        }
        assert!(!state.is_held(GuardKind::Firmware));
        assert!(state.try_acquire(GuardKind::Firmware).is_ok());
    }

    #[test]
    fn guard_released_on_error_path() {
        fn guarded(state: &SessionState) -> Result<(), GatewayError> {
            let _token = state.try_acquire(GuardKind::Connect)?;
            Err(GatewayError::DeviceNotFound)
        }

        let state = SessionState::new();
        assert!(guarded(&state).is_err());
        assert!(!state.is_held(GuardKind::Connect));
    }

    #[test]
    fn guards_are_independent() {
        let state = SessionState::new();
        let connect = state.try_acquire(GuardKind::Connect).unwrap();
        assert!(!state.is_held(GuardKind::Firmware));
        let firmware = state.try_acquire(GuardKind::Firmware).unwrap();
        connect.release();
        assert!(state.is_held(GuardKind::Firmware));
        assert_eq!(firmware.kind(), GuardKind::Firmware);
    }

    #[test]
    fn failed_acquire_does_not_release_holder() {
        let state = SessionState::new();
        let _token = state.try_acquire(GuardKind::Connect).unwrap();
        let _ = state.try_acquire(GuardKind::Connect);
        assert!(state.is_held(GuardKind::Connect));
    }

    #[test]
    fn phase_updates_are_visible() {
        let state = SessionState::new();
        state.set_phase(ConnectionPhase::Scanning);
        assert_eq!(state.phase(), ConnectionPhase::Scanning);
        state.set_phase(ConnectionPhase::Connected);
        assert_eq!(state.phase(), ConnectionPhase::Connected);
    }

    #[test]
    fn restore_only_leaves_transient_phases() {
        let state = SessionState::new();
        state.set_phase(ConnectionPhase::Connecting);
        state.restore_phase(ConnectionPhase::Connected);
        assert_eq!(state.phase(), ConnectionPhase::Connected);

        state.set_phase(ConnectionPhase::Disconnected);
        state.restore_phase(ConnectionPhase::Connected);
        assert_eq!(state.phase(), ConnectionPhase::Disconnected);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let state = SessionState::new();
        let _fw = state.try_acquire(GuardKind::Firmware).unwrap();
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["phase"], "disconnected");
        assert_eq!(json["connecting"], false);
        assert_eq!(json["firmwareUploading"], true);
    }

    #[test]
    fn concurrent_acquire_admits_exactly_one() {
        use std::sync::Arc;
        use std::sync::atomic::AtomicUsize;
        use std::thread;

        let state = Arc::new(SessionState::new());
        let winners = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                let winners = Arc::clone(&winners);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    if let Ok(token) = state.try_acquire(GuardKind::Connect) {
                        winners.fetch_add(1, Ordering::SeqCst);
                        // Hold until every contender has tried.
                        thread::sleep(std::time::Duration::from_millis(50));
                        drop(token);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(!state.is_held(GuardKind::Connect));
    }
}
