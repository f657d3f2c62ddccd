//! [`Gateway`] – the command gateway.
//!
//! Validates inbound commands, sequences calls to the [`Device`], and owns
//! every transition of the [`SessionState`] that is not driven by a device
//! signal. It knows nothing about HTTP: each operation returns a
//! `Result<_, GatewayError>` and the router decides the status code.
//!
//! # Connect sequence
//!
//! ```text
//! acquire connect guard ──► remember credentials (best effort)
//!        │                          │
//!        │                  assign signature / key
//!        │                          │
//!        │       mac? ──► connect(mac)
//!        │       name? ─► scan(name) ─► connect(first)
//!        │       else ──► scan(*)    ─► connect(first)
//!        │                          │
//!        └────── guard released on every path (token drop)
//! ```
//!
//! A `ScanFailed` anywhere in the sequence is returned as
//! [`GatewayError::FatalTransport`]; the caller hands it to the process
//! supervisor.

use std::path::PathBuf;
use std::sync::Arc;

use glowgate_hal::Device;
use glowgate_kernel::{GuardKind, SessionState};
use glowgate_store::{CredentialStore, OwnerInfo, Record};
use glowgate_types::{
    ConnectionPhase, Controller, Destination, DeviceError, DeviceEvent, EventKind, EventValue,
    GatewayError, ScanFilter,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// Body of a connect request. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub remember: bool,
    #[serde(default)]
    pub network: Option<String>,
}

/// Query of a single-variable read. Both parameters are required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VariableQuery {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub seg_id: Option<String>,
}

/// One validated `(name, segment)` pair of a batch read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSpec {
    pub name: String,
    pub segment_id: u32,
}

impl VariableSpec {
    /// Accepts `{"name": "...", "segId": 3}`; `segId` may also be a numeric
    /// string.
    pub fn from_json(item: &Value) -> Option<Self> {
        let name = present(item.get("name")?.as_str())?;
        let segment_id = match item.get("segId")? {
            Value::Number(n) => u32::try_from(n.as_u64()?).ok()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        Some(Self {
            name: name.to_string(),
            segment_id,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableValue {
    pub name: String,
    pub seg_id: u32,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableFailure {
    pub name: String,
    pub seg_id: u32,
    pub error: DeviceError,
}

/// Outcome of a batch read: successes and per-item failures side by side.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VariableBatch {
    pub data: Vec<VariableValue>,
    pub fails: Vec<VariableFailure>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Event dispatch
// ─────────────────────────────────────────────────────────────────────────────

/// The typed emit operation an event resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum EmitCommand {
    Trigger,
    Percentage(f64),
    Color(String),
    Timestamp(f64),
}

impl EmitCommand {
    /// Pick the emit operation for `value` and `kind`.
    ///
    /// No value means a trigger. A value with an absent or unrecognised
    /// kind is also sent as a trigger and the value is dropped.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidEventValue`] when a percentage or timestamp
    /// value is not numeric.
    pub fn resolve(value: Option<&EventValue>, kind: Option<EventKind>) -> Result<Self, GatewayError> {
        let Some(value) = value else {
            return Ok(EmitCommand::Trigger);
        };
        match kind.unwrap_or_default() {
            EventKind::Percentage => value
                .as_number()
                .map(EmitCommand::Percentage)
                .ok_or(GatewayError::InvalidEventValue),
            EventKind::Color => Ok(EmitCommand::Color(value.as_text())),
            EventKind::Timestamp => value
                .as_number()
                .map(EmitCommand::Timestamp)
                .ok_or(GatewayError::InvalidEventValue),
            EventKind::Undefined => Ok(EmitCommand::Trigger),
        }
    }
}

/// Parse the textual notifier form, e.g. `label=brigh value=50 type=percentage`.
///
/// Tokens are separated by single spaces. Only the first two `=`-separated
/// parts of a token are used, tokens missing either part are skipped, and
/// keys are lower-cased.
pub fn parse_notifier(message: &str) -> DeviceEvent {
    let mut event = DeviceEvent::default();
    for token in message.split(' ') {
        let mut parts = token.split('=');
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        if key.is_empty() || value.is_empty() {
            continue;
        }
        match key.to_lowercase().as_str() {
            "label" => event.label = Some(value.to_string()),
            "value" => event.value = Some(EventValue::Text(value.to_string())),
            "type" => event.kind = Some(EventKind::from(value)),
            _ => {}
        }
    }
    event
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────────────────────────

/// Sequences device operations on behalf of HTTP handlers. Share it behind
/// an `Arc`.
pub struct Gateway {
    device: Arc<dyn Device>,
    session: Arc<SessionState>,
    store: CredentialStore,
    firmware_path: PathBuf,
}

impl Gateway {
    pub fn new(
        device: Arc<dyn Device>,
        session: Arc<SessionState>,
        store: CredentialStore,
        firmware_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            device,
            session,
            store,
            firmware_path: firmware_path.into(),
        }
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    // ── Session ─────────────────────────────────────────────────────────────

    /// Run the connect sequence.
    ///
    /// # Errors
    ///
    /// * [`GatewayError::ConnectingInProgress`] – another connect is in flight.
    /// * [`GatewayError::DeviceNotFound`] – the scan returned nothing.
    /// * [`GatewayError::FatalTransport`] – the device reported `ScanFailed`.
    /// * [`GatewayError::Device`] – any other device failure.
    pub async fn connect(&self, request: &ConnectRequest) -> Result<Value, GatewayError> {
        let _guard = self.session.try_acquire(GuardKind::Connect)?;
        let entry_phase = self.session.phase();

        if request.remember {
            self.remember_credentials(request).await;
        }

        let outcome = self.run_connect(request).await;
        match &outcome {
            Ok(_) => self.session.set_phase(ConnectionPhase::Connected),
            Err(e) => {
                warn!(error = %e, "connect failed");
                // A live session survives a failed reconnect attempt.
                self.session.restore_phase(entry_phase);
            }
        }
        outcome
    }

    async fn run_connect(&self, request: &ConnectRequest) -> Result<Value, GatewayError> {
        if let Some(signature) = present(request.signature.as_deref()) {
            self.device
                .assign_owner_signature(signature)
                .map_err(connect_failure)?;
            info!("owner signature assigned");
        }
        if let Some(key) = present(request.key.as_deref()) {
            self.device.assign_owner_key(key).map_err(connect_failure)?;
        }

        let target = match present(request.mac.as_deref()) {
            Some(mac) => Controller::from_mac(mac),
            None => {
                let filter = match present(request.name.as_deref()) {
                    Some(name) => ScanFilter::by_name(name),
                    None => ScanFilter::default(),
                };
                self.session.set_phase(ConnectionPhase::Scanning);
                let controllers = self.device.scan(&filter).await.map_err(connect_failure)?;
                controllers
                    .into_iter()
                    .next()
                    .ok_or(GatewayError::DeviceNotFound)?
            }
        };

        self.session.set_phase(ConnectionPhase::Connecting);
        info!(mac = %target.mac, "connecting");
        let result = self.device.connect(&target).await.map_err(connect_failure)?;

        if request.remember {
            self.remember(Record::Mac, &target.mac).await;
        }
        Ok(result)
    }

    async fn remember_credentials(&self, request: &ConnectRequest) {
        let records = [
            (Record::OwnerSignature, &request.signature),
            (Record::OwnerKey, &request.key),
            (Record::Network, &request.network),
        ];
        for (record, value) in records {
            if let Some(value) = present(value.as_deref()) {
                self.remember(record, value).await;
            }
        }
    }

    async fn remember(&self, record: Record, value: &str) {
        if let Err(e) = self.store.write(record, value).await {
            warn!(record = ?record, error = %e, "failed to remember value");
        }
    }

    pub async fn disconnect(&self) -> Result<Value, GatewayError> {
        let result = self.device.disconnect().await?;
        self.session.set_phase(ConnectionPhase::Disconnected);
        Ok(result)
    }

    // ── Events ──────────────────────────────────────────────────────────────

    /// Validate `event` and forward it to the matching emit operation.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NoEventLabelSpecified`] and
    /// [`GatewayError::InvalidEventValue`] are raised before the device is
    /// touched.
    pub async fn emit_event(&self, event: &DeviceEvent) -> Result<Value, GatewayError> {
        let label = present(event.label.as_deref()).ok_or(GatewayError::NoEventLabelSpecified)?;
        let command = EmitCommand::resolve(event.value.as_ref(), event.kind)?;
        self.dispatch(label, command, event.destination.as_ref()).await
    }

    /// Parse a notifier message and dispatch it like [`Gateway::emit_event`].
    pub async fn notify(&self, message: &str) -> Result<Value, GatewayError> {
        self.emit_event(&parse_notifier(message)).await
    }

    async fn dispatch(
        &self,
        label: &str,
        command: EmitCommand,
        destination: Option<&Destination>,
    ) -> Result<Value, GatewayError> {
        let device = &self.device;
        let result = match command {
            EmitCommand::Trigger => device.emit_event(label, destination).await,
            EmitCommand::Percentage(v) => device.emit_percentage_event(label, v, destination).await,
            EmitCommand::Color(v) => device.emit_color_event(label, &v, destination).await,
            EmitCommand::Timestamp(v) => device.emit_timestamp_event(label, v, destination).await,
        };
        Ok(result?)
    }

    /// Ask the device to replay its event history.
    pub async fn emit_history(&self) -> Result<(), GatewayError> {
        Ok(self.device.read_event_history().await?)
    }

    // ── Program & firmware ──────────────────────────────────────────────────

    /// Store `tngl`, write it to the device, then replay the event history.
    pub async fn write_tngl(&self, tngl: Option<&str>) -> Result<Value, GatewayError> {
        let tngl = tngl.ok_or(GatewayError::NoTnglSpecified)?;
        self.store
            .write(Record::Tngl, tngl)
            .await
            .map_err(|e| GatewayError::Store(e.to_string()))?;
        let result = self.device.write_tngl(tngl).await?;
        self.device.read_event_history().await?;
        Ok(result)
    }

    /// Upload the firmware image at the configured path.
    ///
    /// # Errors
    ///
    /// * [`GatewayError::AlreadyUploadingFirmware`] – an upload is in flight.
    /// * [`GatewayError::FirmwareImage`] – the image could not be read.
    /// * [`GatewayError::Device`] – the device rejected the update.
    pub async fn upload_firmware(&self) -> Result<Value, GatewayError> {
        let _guard = self.session.try_acquire(GuardKind::Firmware)?;
        let image = tokio::fs::read(&self.firmware_path).await.map_err(|e| {
            GatewayError::FirmwareImage(format!("{}: {e}", self.firmware_path.display()))
        })?;
        info!(bytes = image.len(), "uploading firmware");
        Ok(self.device.update_firmware(&image).await?)
    }

    // ── Reads ───────────────────────────────────────────────────────────────

    pub async fn owner(&self) -> Result<OwnerInfo, GatewayError> {
        self.store
            .owner()
            .await
            .map_err(|e| GatewayError::Store(e.to_string()))
    }

    /// Read one variable.
    ///
    /// # Errors
    ///
    /// * [`GatewayError::MissingVariableParams`] – `name` or a numeric
    ///   `seg_id` is missing; the device is not called.
    /// * [`GatewayError::VariableOrSegmentNotFound`] – the device failed.
    pub async fn read_variable(&self, query: &VariableQuery) -> Result<Value, GatewayError> {
        let missing = GatewayError::MissingVariableParams("seg_id");
        let name = present(query.name.as_deref()).ok_or(missing.clone())?;
        let segment_id = query
            .seg_id
            .as_deref()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .ok_or(missing)?;

        self.device
            .read_variable(name, segment_id)
            .await
            .map_err(|e| {
                warn!(name, segment_id, error = %e, "variable read failed");
                GatewayError::VariableOrSegmentNotFound
            })
    }

    /// Read every item of a batch. All items are validated before the first
    /// device call; per-item device failures are collected, never fatal.
    pub async fn read_variables(&self, items: &[Value]) -> Result<VariableBatch, GatewayError> {
        let specs = items
            .iter()
            .map(VariableSpec::from_json)
            .collect::<Option<Vec<_>>>()
            .ok_or(GatewayError::MissingVariableParams("segId"))?;

        let mut batch = VariableBatch::default();
        for VariableSpec { name, segment_id } in specs {
            match self.device.read_variable(&name, segment_id).await {
                Ok(value) => batch.data.push(VariableValue {
                    name,
                    seg_id: segment_id,
                    value,
                }),
                Err(error) => {
                    warn!(name = %name, segment_id, error = %error, "variable read failed");
                    batch.fails.push(VariableFailure {
                        name,
                        seg_id: segment_id,
                        error,
                    });
                }
            }
        }
        Ok(batch)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn connect_failure(error: DeviceError) -> GatewayError {
    match error {
        DeviceError::ScanFailed => GatewayError::FatalTransport(error),
        other => GatewayError::Device(other),
    }
}
