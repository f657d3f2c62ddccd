//! `glowgate-types` – shared data model for the gateway.
//!
//! Everything that crosses a crate boundary lives here: inbound events,
//! device-originated signals, scan results, the connection phase and the
//! error taxonomy.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Selects how an event value is encoded on the device.
///
/// Unknown strings deserialize to [`EventKind::Undefined`], which the
/// gateway treats as a trigger-only event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EventKind {
    Percentage,
    Color,
    Timestamp,
    #[default]
    Undefined,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Percentage => "percentage",
            EventKind::Color => "color",
            EventKind::Timestamp => "timestamp",
            EventKind::Undefined => "undefined",
        }
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        match s {
            "percentage" => EventKind::Percentage,
            "color" => EventKind::Color,
            "timestamp" => EventKind::Timestamp,
            _ => EventKind::Undefined,
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(EventKind::from(raw.as_str()))
    }
}

/// Payload attached to an event. Clients send either a JSON number or a
/// string; which one is valid depends on the [`EventKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Number(f64),
    Text(String),
}

impl EventValue {
    /// Numeric view of the value. Numeric strings are parsed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            EventValue::Number(n) => Some(*n),
            EventValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    /// Textual view of the value, used for color events.
    pub fn as_text(&self) -> String {
        match self {
            EventValue::Number(n) => n.to_string(),
            EventValue::Text(s) => s.clone(),
        }
    }
}

/// Addressing for an emitted event: one id or a set of ids.
/// An absent destination means broadcast to every segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Destination {
    One(u32),
    Many(Vec<u32>),
}

/// Inbound event as posted by an HTTP client.
///
/// Every field is optional on the wire; the gateway rejects events without
/// a label before anything reaches the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub value: Option<EventValue>,
    #[serde(default, rename = "type")]
    pub kind: Option<EventKind>,
    #[serde(default)]
    pub destination: Option<Destination>,
}

/// An event reported by the device (emitted by it or relayed through it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedEvent {
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<EventValue>,
    /// Segment id the event was addressed to.
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Discovery & session
// ─────────────────────────────────────────────────────────────────────────────

/// A controller found by a scan, or addressed directly by MAC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controller {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub mac: String,
}

impl Controller {
    pub fn from_mac(mac: impl Into<String>) -> Self {
        Self {
            name: None,
            mac: mac.into(),
        }
    }
}

/// Criteria narrowing a scan. The default filter matches every controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ScanFilter {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    pub fn matches(&self, controller: &Controller) -> bool {
        match &self.name {
            Some(wanted) => controller.name.as_deref() == Some(wanted.as_str()),
            None => true,
        }
    }
}

/// Where the single device session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConnectionPhase {
    #[default]
    Disconnected = 0,
    Scanning = 1,
    Connecting = 2,
    Connected = 3,
}

impl ConnectionPhase {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of [`ConnectionPhase::as_u8`]; unknown values read as
    /// `Disconnected`.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ConnectionPhase::Scanning,
            2 => ConnectionPhase::Connecting,
            3 => ConnectionPhase::Connected,
            _ => ConnectionPhase::Disconnected,
        }
    }
}

/// Asynchronous notifications pushed by the device module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", content = "payload", rename_all = "snake_case")]
pub enum DeviceSignal {
    /// Batch of events emitted on the network.
    Emitted(Vec<EmittedEvent>),
    /// Batch of events emitted locally on the connected controller.
    EmittedLocal(Vec<EmittedEvent>),
    Connected,
    Disconnected,
    /// Firmware upload progress; the payload shape belongs to the device.
    OtaProgress(serde_json::Value),
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failure reported by the device module. Opaque apart from the variants the
/// gateway reacts to; everything else is carried verbatim as its code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Discovery failed; the transport is assumed unrecoverable.
    #[error("ScanFailed")]
    ScanFailed,
    #[error("ConnectionFailed")]
    ConnectionFailed,
    #[error("DeviceDisconnected")]
    DeviceDisconnected,
    #[error("Timeout")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

impl DeviceError {
    /// Stable code surfaced to HTTP callers.
    pub fn code(&self) -> &str {
        match self {
            DeviceError::ScanFailed => "ScanFailed",
            DeviceError::ConnectionFailed => "ConnectionFailed",
            DeviceError::DeviceDisconnected => "DeviceDisconnected",
            DeviceError::Timeout => "Timeout",
            DeviceError::Other(code) => code,
        }
    }
}

impl From<&str> for DeviceError {
    fn from(code: &str) -> Self {
        match code {
            "ScanFailed" => DeviceError::ScanFailed,
            "ConnectionFailed" => DeviceError::ConnectionFailed,
            "DeviceDisconnected" => DeviceError::DeviceDisconnected,
            "Timeout" => DeviceError::Timeout,
            other => DeviceError::Other(other.to_string()),
        }
    }
}

impl Serialize for DeviceError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for DeviceError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(DeviceError::from(raw.as_str()))
    }
}

/// Broad class of a [`GatewayError`], used for logging and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A guard is already held; retry later.
    Busy,
    /// Malformed input, rejected before any device call.
    Validation,
    NotFound,
    /// Opaque failure propagated from the device module.
    DeviceFailure,
    /// The transport is unrecoverable and the process must restart.
    Fatal,
    Internal,
    NotImplemented,
}

/// Every failure the command gateway can produce.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("ConnectingInProgress")]
    ConnectingInProgress,

    #[error("AlreadingUploadingFW")]
    AlreadyUploadingFirmware,

    #[error("NoEventLabelSpecified")]
    NoEventLabelSpecified,

    #[error("InvalidEventValue")]
    InvalidEventValue,

    #[error("NoTnglSpecified")]
    NoTnglSpecified,

    /// `0` names the segment parameter as spelled by the endpoint.
    #[error("Both 'name' and '{0}' parameters are required")]
    MissingVariableParams(&'static str),

    #[error("DeviceNotFound")]
    DeviceNotFound,

    #[error("Variable or segment not found")]
    VariableOrSegmentNotFound,

    #[error("{0}")]
    Device(#[from] DeviceError),

    /// A device failure after which the process must restart.
    #[error("{0}")]
    FatalTransport(DeviceError),

    #[error("{0}")]
    FirmwareImage(String),

    #[error("{0}")]
    Store(String),

    #[error("NotImplemented")]
    NotImplemented,
}

impl GatewayError {
    /// Code placed in the `error` field of a response envelope.
    pub fn code(&self) -> String {
        match self {
            GatewayError::Device(e) | GatewayError::FatalTransport(e) => e.code().to_string(),
            other => other.to_string(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            GatewayError::ConnectingInProgress | GatewayError::AlreadyUploadingFirmware => {
                ErrorClass::Busy
            }
            GatewayError::NoEventLabelSpecified
            | GatewayError::InvalidEventValue
            | GatewayError::NoTnglSpecified
            | GatewayError::MissingVariableParams(_) => ErrorClass::Validation,
            GatewayError::DeviceNotFound | GatewayError::VariableOrSegmentNotFound => {
                ErrorClass::NotFound
            }
            GatewayError::Device(_) => ErrorClass::DeviceFailure,
            GatewayError::FatalTransport(_) => ErrorClass::Fatal,
            GatewayError::FirmwareImage(_) | GatewayError::Store(_) => ErrorClass::Internal,
            GatewayError::NotImplemented => ErrorClass::NotImplemented,
        }
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionPhase::Disconnected => "disconnected",
            ConnectionPhase::Scanning => "scanning",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Connected => "connected",
        };
        f.write_str(s)
    }
}
