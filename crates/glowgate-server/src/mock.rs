//! Scriptable [`Device`] double shared by the unit tests of this crate.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use glowgate_hal::Device;
use glowgate_types::{Controller, Destination, DeviceError, DeviceSignal, ScanFilter};
use serde_json::{Value, json};
use tokio::sync::{Notify, broadcast};

/// Records every call as `"<operation>:<args>"` and can park `connect` and
/// `update_firmware` until [`MockDevice::release`] is notified.
pub(crate) struct MockDevice {
    calls: Mutex<Vec<String>>,
    pub controllers: Mutex<Vec<Controller>>,
    pub scan_error: Mutex<Option<DeviceError>>,
    pub connect_error: Mutex<Option<DeviceError>>,
    pub emit_error: Mutex<Option<DeviceError>>,
    pub failing_variables: Mutex<HashSet<String>>,
    parked: bool,
    /// Notified when a parked operation has started.
    pub entered: Notify,
    /// Notify once to let a parked operation finish.
    pub release: Notify,
    signals: broadcast::Sender<DeviceSignal>,
}

impl MockDevice {
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(16);
        Self {
            calls: Mutex::new(Vec::new()),
            controllers: Mutex::new(vec![Controller {
                name: Some("kitchen".into()),
                mac: "aa:bb:cc:dd:ee:01".into(),
            }]),
            scan_error: Mutex::new(None),
            connect_error: Mutex::new(None),
            emit_error: Mutex::new(None),
            failing_variables: Mutex::new(HashSet::new()),
            parked: false,
            entered: Notify::new(),
            release: Notify::new(),
            signals,
        }
    }

    pub fn parked() -> Self {
        Self {
            parked: true,
            ..Self::new()
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls whose operation is `op`.
    pub fn count(&self, op: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(':').next() == Some(op))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn park(&self) {
        if self.parked {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }

    fn emit_result(&self) -> Result<Value, DeviceError> {
        match self.emit_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(json!("emitted")),
        }
    }
}

fn dest(destination: Option<&Destination>) -> String {
    match destination {
        None => "all".into(),
        Some(Destination::One(id)) => id.to_string(),
        Some(Destination::Many(ids)) => format!("{ids:?}"),
    }
}

#[async_trait]
impl Device for MockDevice {
    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<Controller>, DeviceError> {
        self.record(format!("scan:{}", filter.name.as_deref().unwrap_or("*")));
        if let Some(e) = self.scan_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self
            .controllers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    async fn connect(&self, target: &Controller) -> Result<Value, DeviceError> {
        self.record(format!("connect:{}", target.mac));
        self.park().await;
        match self.connect_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(json!({ "mac": target.mac })),
        }
    }

    async fn disconnect(&self) -> Result<Value, DeviceError> {
        self.record("disconnect".into());
        Ok(json!("disconnected"))
    }

    fn assign_owner_signature(&self, signature: &str) -> Result<(), DeviceError> {
        self.record(format!("assign_owner_signature:{signature}"));
        Ok(())
    }

    fn assign_owner_key(&self, key: &str) -> Result<(), DeviceError> {
        self.record(format!("assign_owner_key:{key}"));
        Ok(())
    }

    async fn emit_event(
        &self,
        label: &str,
        destination: Option<&Destination>,
    ) -> Result<Value, DeviceError> {
        self.record(format!("emit_event:{label}:{}", dest(destination)));
        self.emit_result()
    }

    async fn emit_percentage_event(
        &self,
        label: &str,
        value: f64,
        destination: Option<&Destination>,
    ) -> Result<Value, DeviceError> {
        self.record(format!("emit_percentage_event:{label}:{value}:{}", dest(destination)));
        self.emit_result()
    }

    async fn emit_color_event(
        &self,
        label: &str,
        value: &str,
        destination: Option<&Destination>,
    ) -> Result<Value, DeviceError> {
        self.record(format!("emit_color_event:{label}:{value}:{}", dest(destination)));
        self.emit_result()
    }

    async fn emit_timestamp_event(
        &self,
        label: &str,
        value: f64,
        destination: Option<&Destination>,
    ) -> Result<Value, DeviceError> {
        self.record(format!("emit_timestamp_event:{label}:{value}:{}", dest(destination)));
        self.emit_result()
    }

    async fn read_variable(&self, name: &str, segment_id: u32) -> Result<Value, DeviceError> {
        self.record(format!("read_variable:{name}:{segment_id}"));
        if self.failing_variables.lock().unwrap().contains(name) {
            return Err(DeviceError::Other("VariableNotFound".into()));
        }
        Ok(json!(segment_id * 10))
    }

    async fn write_tngl(&self, tngl: &str) -> Result<Value, DeviceError> {
        self.record(format!("write_tngl:{}", tngl.len()));
        Ok(json!("written"))
    }

    async fn update_firmware(&self, image: &[u8]) -> Result<Value, DeviceError> {
        self.record(format!("update_firmware:{}", image.len()));
        self.park().await;
        Ok(json!("updated"))
    }

    async fn read_event_history(&self) -> Result<(), DeviceError> {
        self.record("read_event_history".into());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<DeviceSignal> {
        self.signals.subscribe()
    }
}
