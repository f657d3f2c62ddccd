//! [`SimDevice`] – in-process simulated controller.
//!
//! Lets the full gateway run in tests, CI, and on a workstation without a
//! physical controller or radio. Every operation succeeds with plausible
//! results unless the simulation was told otherwise.
//!
//! # Simulated behaviour
//!
//! | Operation | Behaviour |
//! |---|---|
//! | `scan` | Returns the configured controllers matching the filter; fails with `ScanFailed` when armed via [`SimDevice::fail_scans`]. |
//! | `connect` / `disconnect` | Track the session and send `Connected` / `Disconnected` signals. |
//! | `emit_*` | Require a session; echo the event back as `Emitted` and `EmittedLocal` signals and append it to the history. |
//! | `read_variable` | Looks up values seeded with [`SimDeviceBuilder::with_variable`]. |
//! | `update_firmware` | Sends `OtaProgress` signals from 0 to 100 percent. |
//! | `read_event_history` | Replays the most recent [`HISTORY_CAPACITY`] events as one `Emitted` batch. |
//!
//! # Example
//!
//! ```rust
//! use glowgate_hal::sim::SimDevice;
//!
//! let device = SimDevice::builder()
//!     .with_controller("kitchen", "12:34:56:78:9a:bc")
//!     .with_variable("brightness", 1, serde_json::json!(80))
//!     .build();
//! assert!(!device.is_connected());
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use glowgate_types::{
    Controller, Destination, DeviceError, DeviceSignal, EmittedEvent, EventKind, EventValue,
    ScanFilter,
};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::device::Device;

/// Segment id the simulation reports for broadcast events.
pub const BROADCAST_ID: u32 = 255;

const SIGNAL_CAPACITY: usize = 256;

/// Emitted events kept for `read_event_history`; older ones are evicted.
pub const HISTORY_CAPACITY: usize = 128;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for a [`SimDevice`].
#[derive(Default)]
pub struct SimDeviceBuilder {
    controllers: Vec<Controller>,
    variables: HashMap<(String, u32), Value>,
    latency: Duration,
    history_capacity: Option<usize>,
}

impl SimDeviceBuilder {
    /// Make a controller discoverable by scans.
    pub fn with_controller(mut self, name: impl Into<String>, mac: impl Into<String>) -> Self {
        self.controllers.push(Controller {
            name: Some(name.into()),
            mac: mac.into(),
        });
        self
    }

    /// Seed a readable variable on a segment.
    pub fn with_variable(mut self, name: impl Into<String>, segment_id: u32, value: Value) -> Self {
        self.variables.insert((name.into(), segment_id), value);
        self
    }

    /// Delay applied before every async operation completes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of emitted events retained for replay (at least one).
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = Some(capacity.max(1));
        self
    }

    pub fn build(self) -> SimDevice {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        let history_capacity = self.history_capacity.unwrap_or(HISTORY_CAPACITY);
        SimDevice {
            controllers: self.controllers,
            variables: self.variables,
            latency: self.latency,
            session: Mutex::new(None),
            owner_key: Mutex::new(None),
            owner_signature: Mutex::new(None),
            tngl: Mutex::new(None),
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            fail_scans: AtomicBool::new(false),
            signals,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SimDevice
// ─────────────────────────────────────────────────────────────────────────────

/// A simulated controller implementing [`Device`].
pub struct SimDevice {
    controllers: Vec<Controller>,
    variables: HashMap<(String, u32), Value>,
    latency: Duration,
    session: Mutex<Option<Controller>>,
    owner_key: Mutex<Option<String>>,
    owner_signature: Mutex<Option<String>>,
    tngl: Mutex<Option<String>>,
    history: Mutex<VecDeque<EmittedEvent>>,
    history_capacity: usize,
    fail_scans: AtomicBool,
    signals: broadcast::Sender<DeviceSignal>,
}

impl SimDevice {
    pub fn builder() -> SimDeviceBuilder {
        SimDeviceBuilder::default()
    }

    /// A simulation with one discoverable controller, used by the binary
    /// when no physical transport is linked in.
    pub fn demo() -> Self {
        Self::builder()
            .with_controller("glowgate-sim", "00:00:00:00:00:01")
            .with_variable("brightness", 1, json!(100))
            .with_latency(Duration::from_millis(50))
            .build()
    }

    /// Make every following scan fail with [`DeviceError::ScanFailed`].
    pub fn fail_scans(&self, fail: bool) {
        self.fail_scans.store(fail, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.session).is_some()
    }

    pub fn owner_signature(&self) -> Option<String> {
        lock(&self.owner_signature).clone()
    }

    pub fn owner_key(&self) -> Option<String> {
        lock(&self.owner_key).clone()
    }

    pub fn tngl(&self) -> Option<String> {
        lock(&self.tngl).clone()
    }

    async fn settle(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn require_session(&self) -> Result<Controller, DeviceError> {
        lock(&self.session)
            .clone()
            .ok_or(DeviceError::DeviceDisconnected)
    }

    // A send with no receivers is not an error for the device.
    fn signal(&self, signal: DeviceSignal) {
        let _ = self.signals.send(signal);
    }

    async fn emit(
        &self,
        label: &str,
        kind: EventKind,
        value: Option<EventValue>,
        destination: Option<&Destination>,
    ) -> Result<Value, DeviceError> {
        self.settle().await;
        self.require_session()?;

        let ids = match destination {
            None => vec![BROADCAST_ID],
            Some(Destination::One(id)) => vec![*id],
            Some(Destination::Many(ids)) => ids.clone(),
        };
        let events: Vec<EmittedEvent> = ids
            .into_iter()
            .map(|id| EmittedEvent {
                label: label.to_string(),
                kind,
                value: value.clone(),
                id,
                timestamp: None,
            })
            .collect();

        {
            let mut history = lock(&self.history);
            for event in &events {
                if history.len() == self.history_capacity {
                    history.pop_front();
                }
                history.push_back(event.clone());
            }
        }
        debug!(label, count = events.len(), "sim device emitted event");
        self.signal(DeviceSignal::EmittedLocal(events.clone()));
        self.signal(DeviceSignal::Emitted(events));
        Ok(Value::Null)
    }
}

#[async_trait]
impl Device for SimDevice {
    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<Controller>, DeviceError> {
        self.settle().await;
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(DeviceError::ScanFailed);
        }
        Ok(self
            .controllers
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    async fn connect(&self, target: &Controller) -> Result<Value, DeviceError> {
        self.settle().await;
        let known = self
            .controllers
            .iter()
            .find(|c| c.mac.eq_ignore_ascii_case(&target.mac))
            .cloned()
            .ok_or(DeviceError::ConnectionFailed)?;

        info!(mac = %known.mac, "sim device connected");
        *lock(&self.session) = Some(known.clone());
        self.signal(DeviceSignal::Connected);
        Ok(json!({ "connector": "simulated", "mac": known.mac, "name": known.name }))
    }

    async fn disconnect(&self) -> Result<Value, DeviceError> {
        self.settle().await;
        let previous = lock(&self.session).take();
        if previous.is_some() {
            self.signal(DeviceSignal::Disconnected);
        }
        Ok(json!({ "disconnected": previous.map(|c| c.mac) }))
    }

    fn assign_owner_signature(&self, signature: &str) -> Result<(), DeviceError> {
        if signature.trim().is_empty() {
            return Err(DeviceError::Other("InvalidSignature".to_string()));
        }
        *lock(&self.owner_signature) = Some(signature.to_string());
        Ok(())
    }

    fn assign_owner_key(&self, key: &str) -> Result<(), DeviceError> {
        if key.trim().is_empty() {
            return Err(DeviceError::Other("InvalidKey".to_string()));
        }
        *lock(&self.owner_key) = Some(key.to_string());
        Ok(())
    }

    async fn emit_event(
        &self,
        label: &str,
        destination: Option<&Destination>,
    ) -> Result<Value, DeviceError> {
        self.emit(label, EventKind::Undefined, None, destination).await
    }

    async fn emit_percentage_event(
        &self,
        label: &str,
        value: f64,
        destination: Option<&Destination>,
    ) -> Result<Value, DeviceError> {
        let value = Some(EventValue::Number(value));
        self.emit(label, EventKind::Percentage, value, destination).await
    }

    async fn emit_color_event(
        &self,
        label: &str,
        value: &str,
        destination: Option<&Destination>,
    ) -> Result<Value, DeviceError> {
        let value = Some(EventValue::Text(value.to_string()));
        self.emit(label, EventKind::Color, value, destination).await
    }

    async fn emit_timestamp_event(
        &self,
        label: &str,
        value: f64,
        destination: Option<&Destination>,
    ) -> Result<Value, DeviceError> {
        let value = Some(EventValue::Number(value));
        self.emit(label, EventKind::Timestamp, value, destination).await
    }

    async fn read_variable(&self, name: &str, segment_id: u32) -> Result<Value, DeviceError> {
        self.settle().await;
        self.variables
            .get(&(name.to_string(), segment_id))
            .cloned()
            .ok_or_else(|| DeviceError::Other("VariableNotFound".to_string()))
    }

    async fn write_tngl(&self, tngl: &str) -> Result<Value, DeviceError> {
        self.settle().await;
        self.require_session()?;
        *lock(&self.tngl) = Some(tngl.to_string());
        Ok(json!({ "bytes": tngl.len() }))
    }

    async fn update_firmware(&self, image: &[u8]) -> Result<Value, DeviceError> {
        self.require_session()?;
        if image.is_empty() {
            return Err(DeviceError::Other("InvalidFirmware".to_string()));
        }
        self.signal(DeviceSignal::OtaProgress(json!({ "status": "begin" })));
        for percentage in (0..=100).step_by(25) {
            self.settle().await;
            self.signal(DeviceSignal::OtaProgress(json!({ "percentage": percentage })));
        }
        self.signal(DeviceSignal::OtaProgress(json!({ "status": "success" })));
        Ok(json!({ "bytes": image.len() }))
    }

    async fn read_event_history(&self) -> Result<(), DeviceError> {
        self.settle().await;
        self.require_session()?;
        let history: Vec<EmittedEvent> = lock(&self.history).iter().cloned().collect();
        if !history.is_empty() {
            self.signal(DeviceSignal::Emitted(history));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<DeviceSignal> {
        self.signals.subscribe()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> SimDevice {
        SimDevice::builder()
            .with_controller("kitchen", "aa:bb:cc:dd:ee:01")
            .with_controller("garage", "aa:bb:cc:dd:ee:02")
            .with_variable("brightness", 3, json!(42))
            .build()
    }

    async fn connected_device() -> SimDevice {
        let device = device();
        device
            .connect(&Controller::from_mac("aa:bb:cc:dd:ee:01"))
            .await
            .unwrap();
        device
    }

    #[tokio::test]
    async fn scan_filters_by_name() {
        let device = device();
        let all = device.scan(&ScanFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let garage = device.scan(&ScanFilter::by_name("garage")).await.unwrap();
        assert_eq!(garage.len(), 1);
        assert_eq!(garage[0].mac, "aa:bb:cc:dd:ee:02");

        let none = device.scan(&ScanFilter::by_name("attic")).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn armed_scan_failure_returns_scan_failed() {
        let device = device();
        device.fail_scans(true);
        let err = device.scan(&ScanFilter::default()).await.unwrap_err();
        assert_eq!(err, DeviceError::ScanFailed);
    }

    #[tokio::test]
    async fn connect_sends_connected_signal() {
        let device = device();
        let mut rx = device.subscribe();
        device
            .connect(&Controller::from_mac("AA:BB:CC:DD:EE:01"))
            .await
            .unwrap();
        assert!(device.is_connected());
        assert_eq!(rx.recv().await.unwrap(), DeviceSignal::Connected);
    }

    #[tokio::test]
    async fn connect_to_unknown_mac_fails() {
        let device = device();
        let err = device
            .connect(&Controller::from_mac("ff:ff:ff:ff:ff:ff"))
            .await
            .unwrap_err();
        assert_eq!(err, DeviceError::ConnectionFailed);
        assert!(!device.is_connected());
    }

    #[tokio::test]
    async fn disconnect_sends_signal_only_when_connected() {
        let device = connected_device().await;
        let mut rx = device.subscribe();
        device.disconnect().await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), DeviceSignal::Disconnected);

        device.disconnect().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn emit_requires_session() {
        let device = device();
        let err = device.emit_event("toggl", None).await.unwrap_err();
        assert_eq!(err, DeviceError::DeviceDisconnected);
    }

    #[tokio::test]
    async fn emit_echoes_one_event_per_destination() {
        let device = connected_device().await;
        let mut rx = device.subscribe();
        device
            .emit_percentage_event("brigh", 40.0, Some(&Destination::Many(vec![1, 2])))
            .await
            .unwrap();

        let DeviceSignal::EmittedLocal(events) = rx.recv().await.unwrap() else {
            panic!("expected local batch first");
        };
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Percentage);
        assert_eq!(events[1].id, 2);

        assert!(matches!(rx.recv().await.unwrap(), DeviceSignal::Emitted(_)));
    }

    #[tokio::test]
    async fn broadcast_emit_uses_broadcast_id() {
        let device = connected_device().await;
        let mut rx = device.subscribe();
        device.emit_color_event("color", "#ff0000", None).await.unwrap();
        let DeviceSignal::EmittedLocal(events) = rx.recv().await.unwrap() else {
            panic!("expected local batch");
        };
        assert_eq!(events[0].id, BROADCAST_ID);
        assert_eq!(events[0].value, Some(EventValue::Text("#ff0000".into())));
    }

    #[tokio::test]
    async fn read_variable_hits_and_misses() {
        let device = device();
        assert_eq!(device.read_variable("brightness", 3).await.unwrap(), json!(42));
        assert!(device.read_variable("brightness", 4).await.is_err());
    }

    #[tokio::test]
    async fn firmware_update_reports_progress() {
        let device = connected_device().await;
        let mut rx = device.subscribe();
        device.update_firmware(&[1, 2, 3]).await.unwrap();

        let mut progress = Vec::new();
        while let Ok(DeviceSignal::OtaProgress(p)) = rx.try_recv() {
            progress.push(p);
        }
        assert_eq!(progress.first(), Some(&json!({ "status": "begin" })));
        assert_eq!(progress.last(), Some(&json!({ "status": "success" })));
        assert!(progress.contains(&json!({ "percentage": 100 })));
    }

    #[tokio::test]
    async fn empty_firmware_image_is_rejected() {
        let device = connected_device().await;
        assert!(device.update_firmware(&[]).await.is_err());
    }

    #[tokio::test]
    async fn event_history_replays_emitted_events() {
        let device = connected_device().await;
        device.emit_event("toggl", None).await.unwrap();
        let mut rx = device.subscribe();
        device.read_event_history().await.unwrap();
        let DeviceSignal::Emitted(events) = rx.recv().await.unwrap() else {
            panic!("expected history batch");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].label, "toggl");
    }

    #[tokio::test]
    async fn event_history_keeps_only_the_newest_events() {
        let device = SimDevice::builder()
            .with_controller("kitchen", "aa:bb:cc:dd:ee:01")
            .with_history_capacity(3)
            .build();
        device
            .connect(&Controller::from_mac("aa:bb:cc:dd:ee:01"))
            .await
            .unwrap();
        for i in 0..5 {
            device.emit_event(&format!("e{i}"), None).await.unwrap();
        }

        let mut rx = device.subscribe();
        device.read_event_history().await.unwrap();
        let DeviceSignal::Emitted(events) = rx.recv().await.unwrap() else {
            panic!("expected history batch");
        };
        let labels: Vec<_> = events.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, ["e2", "e3", "e4"]);
    }

    #[test]
    fn owner_credentials_are_recorded() {
        let device = device();
        device.assign_owner_signature("00000000000000000000000000000000").unwrap();
        device.assign_owner_key("ffffffffffffffffffffffffffffffff").unwrap();
        assert!(device.owner_signature().is_some());
        assert!(device.owner_key().is_some());
        assert!(device.assign_owner_key("  ").is_err());
    }
}
