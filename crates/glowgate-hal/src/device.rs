//! The `Device` capability interface.
//!
//! The gateway never speaks a wire protocol itself. It sequences calls to a
//! [`Device`] implementation, which owns discovery, transport, retries and
//! timing. Implementations live outside this workspace (Bluetooth, serial,
//! network bridges); [`SimDevice`][crate::sim::SimDevice] is the in-process
//! stand-in.

use async_trait::async_trait;
use glowgate_types::{Controller, Destination, DeviceError, DeviceSignal, ScanFilter};
use serde_json::Value;
use tokio::sync::broadcast;

/// Operations the orchestration layer may invoke on the physical controller.
///
/// # Contract
///
/// * Every async operation may suspend for as long as the transport needs;
///   the caller has no way to cancel it once dispatched.
/// * Owner credentials are assigned locally and take effect on the next
///   connect.
/// * Device-originated notifications are delivered through
///   [`Device::subscribe`]. Each call returns an independent receiver that
///   sees every signal sent after it was created.
#[async_trait]
pub trait Device: Send + Sync {
    /// Discover controllers matching `filter`.
    ///
    /// # Errors
    ///
    /// [`DeviceError::ScanFailed`] when discovery itself broke down.
    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<Controller>, DeviceError>;

    /// Open a session with `target`. The returned payload is device specific.
    async fn connect(&self, target: &Controller) -> Result<Value, DeviceError>;

    async fn disconnect(&self) -> Result<Value, DeviceError>;

    fn assign_owner_signature(&self, signature: &str) -> Result<(), DeviceError>;

    fn assign_owner_key(&self, key: &str) -> Result<(), DeviceError>;

    /// Emit a value-less event. `None` destination broadcasts.
    async fn emit_event(
        &self,
        label: &str,
        destination: Option<&Destination>,
    ) -> Result<Value, DeviceError>;

    async fn emit_percentage_event(
        &self,
        label: &str,
        value: f64,
        destination: Option<&Destination>,
    ) -> Result<Value, DeviceError>;

    async fn emit_color_event(
        &self,
        label: &str,
        value: &str,
        destination: Option<&Destination>,
    ) -> Result<Value, DeviceError>;

    async fn emit_timestamp_event(
        &self,
        label: &str,
        value: f64,
        destination: Option<&Destination>,
    ) -> Result<Value, DeviceError>;

    /// Read variable `name` on segment `segment_id`.
    async fn read_variable(&self, name: &str, segment_id: u32) -> Result<Value, DeviceError>;

    /// Upload a TNGL program.
    async fn write_tngl(&self, tngl: &str) -> Result<Value, DeviceError>;

    /// Push a raw firmware image. Progress is reported through
    /// [`DeviceSignal::OtaProgress`].
    async fn update_firmware(&self, image: &[u8]) -> Result<Value, DeviceError>;

    /// Ask the device to replay its event history as emitted signals.
    async fn read_event_history(&self) -> Result<(), DeviceError>;

    /// Register for device-originated signals.
    fn subscribe(&self) -> broadcast::Receiver<DeviceSignal>;
}
