//! Device-to-relay bridge.
//!
//! [`DeviceBridge`] is the only subscriber to the device's signal stream. It
//! translates each [`DeviceSignal`] into relay frames and keeps the session's
//! connection phase in step with `connected` / `disconnected` signals:
//!
//! | Signal | Topic | Frames |
//! |---|---|---|
//! | `Emitted(batch)` | `Events` | one JSON frame per event |
//! | `EmittedLocal(batch)` | `LocalEvents` | one JSON frame per event |
//! | `Connected` | `Connection` | `connected` |
//! | `Disconnected` | `Connection` | `disconnected` |
//! | `OtaProgress(p)` | `OtaProgress` | JSON of `p` |

use std::sync::Arc;

use glowgate_kernel::SessionState;
use glowgate_types::{ConnectionPhase, DeviceSignal, EmittedEvent};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{RelayBus, Topic};

pub const CONNECTED_TOKEN: &str = "connected";
pub const DISCONNECTED_TOKEN: &str = "disconnected";

/// Fans device signals out to the [`RelayBus`].
#[derive(Clone)]
pub struct DeviceBridge {
    bus: Arc<RelayBus>,
    session: Arc<SessionState>,
}

impl DeviceBridge {
    pub fn new(bus: Arc<RelayBus>, session: Arc<SessionState>) -> Self {
        Self { bus, session }
    }

    /// Spawn a task draining `rx` until the device closes its channel.
    pub fn start(&self, mut rx: broadcast::Receiver<DeviceSignal>) -> JoinHandle<()> {
        let bridge = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(signal) => bridge.handle(signal),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "device bridge lagged, dropped signals");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("device signal channel closed");
                        break;
                    }
                }
            }
        })
    }

    /// Translate one signal. Synchronous so ordering within a topic follows
    /// the order signals were received.
    pub fn handle(&self, signal: DeviceSignal) {
        match signal {
            DeviceSignal::Emitted(batch) => self.relay_batch(Topic::Events, &batch),
            DeviceSignal::EmittedLocal(batch) => self.relay_batch(Topic::LocalEvents, &batch),
            DeviceSignal::Connected => {
                self.session.set_phase(ConnectionPhase::Connected);
                self.bus.publish(Topic::Connection, CONNECTED_TOKEN);
            }
            DeviceSignal::Disconnected => {
                self.session.set_phase(ConnectionPhase::Disconnected);
                self.bus.publish(Topic::Connection, DISCONNECTED_TOKEN);
            }
            DeviceSignal::OtaProgress(progress) => {
                self.bus.publish(Topic::OtaProgress, progress.to_string());
            }
        }
    }

    fn relay_batch(&self, topic: Topic, batch: &[EmittedEvent]) {
        for event in batch {
            match serde_json::to_string(event) {
                Ok(json) => {
                    let delivered = self.bus.publish(topic, json);
                    debug!(topic = ?topic, label = %event.label, delivered, "relayed device event");
                }
                Err(e) => warn!(topic = ?topic, error = %e, "failed to encode device event"),
            }
        }
    }
}
