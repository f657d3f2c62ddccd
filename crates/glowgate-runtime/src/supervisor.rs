//! [`Supervisor`] – process-level recovery.
//!
//! Some device failures leave the transport in a state that cannot be
//! recovered in-process. Request handlers never exit the process themselves:
//! they call [`RestartTrigger::request_restart`], and the supervisor, awaited
//! by `main`, decides when the process goes down. The grace period lets the
//! failing request's error response reach the client first.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use glowgate_runtime::supervisor::Supervisor;
//!
//! # tokio_test_block_on(async {
//! let (mut supervisor, trigger) = Supervisor::new(Duration::from_millis(1));
//! trigger.request_restart("ScanFailed");
//! let request = supervisor.wait().await.unwrap();
//! assert_eq!(request.reason, "ScanFailed");
//! assert_eq!(request.exit_code(), 1);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::error;

/// Default delay between a restart request and process exit.
pub const DEFAULT_GRACE: Duration = Duration::from_millis(10);

/// A pending request to restart the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRequest {
    pub reason: String,
}

impl RestartRequest {
    /// Exit status the process should terminate with so that the service
    /// manager starts a fresh instance.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Cloneable handle used by request handlers to ask for a restart.
#[derive(Debug, Clone)]
pub struct RestartTrigger {
    tx: mpsc::UnboundedSender<RestartRequest>,
}

impl RestartTrigger {
    /// Ask the supervisor to restart the process. Never blocks.
    pub fn request_restart(&self, reason: impl Into<String>) {
        let request = RestartRequest {
            reason: reason.into(),
        };
        error!(reason = %request.reason, "unrecoverable transport state, restart requested");
        // A closed channel means the supervisor is already shutting down.
        let _ = self.tx.send(request);
    }
}

/// Awaits restart requests on behalf of `main`.
pub struct Supervisor {
    rx: mpsc::UnboundedReceiver<RestartRequest>,
    grace: Duration,
}

impl Supervisor {
    pub fn new(grace: Duration) -> (Self, RestartTrigger) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx, grace }, RestartTrigger { tx })
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Wait for the first restart request, then for the grace period.
    ///
    /// Returns `None` once every [`RestartTrigger`] has been dropped.
    pub async fn wait(&mut self) -> Option<RestartRequest> {
        let request = self.rx.recv().await?;
        tokio::time::sleep(self.grace).await;
        Some(request)
    }
}
