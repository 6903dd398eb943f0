use serde::{Deserialize, Serialize};

/// Transport type for a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    BuiltIn,
    Bluetooth,
    BluetoothLE,
    Usb,
    Virtual,
    Unknown,
}

/// A capture-capable hardware endpoint, as reported by enumeration.
///
/// Devices are snapshots: a `Microphone` copies the name and id it needs
/// and never refers back to the `Device` it was created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    /// Opaque platform handle. Empty means "use the system default".
    pub id: String,
    pub is_default: bool,
    pub is_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_type: Option<TransportType>,
}

impl Device {
    pub fn new(name: impl Into<String>, id: impl Into<String>, is_default: bool, is_enabled: bool) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            is_default,
            is_enabled,
            transport_type: None,
        }
    }

    pub fn with_transport(mut self, transport: TransportType) -> Self {
        self.transport_type = Some(transport);
        self
    }

    /// Whether this device qualifies as the default microphone.
    pub fn is_usable_default(&self) -> bool {
        self.is_default && self.is_enabled
    }
}
